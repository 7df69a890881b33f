use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// License tier for a single play/use of a track. Determines the price
/// multiplier applied by the pricing schedule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseType {
    #[default]
    Personal,
    Remix,
    Commercial,
}

impl LicenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Remix => "remix",
            Self::Commercial => "commercial",
        }
    }
}

impl std::fmt::Display for LicenseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LicenseType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "personal" => Ok(Self::Personal),
            "remix" => Ok(Self::Remix),
            "commercial" => Ok(Self::Commercial),
            other => Err(DomainError::UnknownLicenseType(other.to_string())),
        }
    }
}
