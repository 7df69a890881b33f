use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::license::LicenseType;
use crate::domain::listing::StemType;
use crate::domain::track::TrackId;
use crate::errors::DomainError;

/// Callers cap `recent_track_ids` at this many entries, most recent first.
pub const RECENT_TRACKS_CAP: usize = 20;

/// Play history longer than this qualifies the session for the volume
/// discount tier.
pub const VOLUME_HISTORY_THRESHOLD: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

impl EnergyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for EnergyLevel {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(DomainError::UnknownEnergyLevel(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPreferences {
    #[serde(default)]
    pub genres: Vec<String>,
    pub mood: Option<String>,
    pub energy: Option<EnergyLevel>,
    pub license_type: Option<LicenseType>,
    #[serde(default)]
    pub allow_explicit: bool,
    #[serde(default)]
    pub stem_types: Vec<StemType>,
}

/// One curation request: the listening session's taste profile plus the
/// budget still available to spend on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionInput {
    pub session_id: String,
    pub user_id: String,
    pub recent_track_ids: Vec<TrackId>,
    pub budget_remaining_usd: Decimal,
    pub preferences: SessionPreferences,
}

impl SessionInput {
    /// Catalog query facets: every requested genre plus the mood, each
    /// queried independently. Deduplicated, order preserved.
    pub fn query_facets(&self) -> Vec<String> {
        let mut facets = Vec::new();
        for genre in &self.preferences.genres {
            let trimmed = genre.trim();
            if !trimmed.is_empty() && !facets.iter().any(|f| f == trimmed) {
                facets.push(trimmed.to_string());
            }
        }
        if let Some(mood) = &self.preferences.mood {
            let trimmed = mood.trim();
            if !trimmed.is_empty() && !facets.iter().any(|f| f == trimmed) {
                facets.push(trimmed.to_string());
            }
        }
        facets
    }

    /// Embedding re-rank is worthwhile only when there is taste signal to
    /// rank against.
    pub fn use_embeddings(&self) -> bool {
        !self.preferences.genres.is_empty() || self.preferences.mood.is_some()
    }

    pub fn volume_eligible(&self) -> bool {
        self.recent_track_ids.len() > VOLUME_HISTORY_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{EnergyLevel, SessionInput, SessionPreferences};
    use crate::domain::track::TrackId;

    fn session(genres: Vec<&str>, mood: Option<&str>, recent: usize) -> SessionInput {
        SessionInput {
            session_id: "sess-1".to_string(),
            user_id: "user-1".to_string(),
            recent_track_ids: (0..recent).map(|n| TrackId::new(format!("trk-{n}"))).collect(),
            budget_remaining_usd: Decimal::new(100, 2),
            preferences: SessionPreferences {
                genres: genres.into_iter().map(str::to_string).collect(),
                mood: mood.map(str::to_string),
                ..SessionPreferences::default()
            },
        }
    }

    #[test]
    fn query_facets_flatten_genres_and_mood_without_duplicates() {
        let input = session(vec!["techno", "ambient", "techno"], Some("dreamy"), 0);
        assert_eq!(input.query_facets(), vec!["techno", "ambient", "dreamy"]);
    }

    #[test]
    fn mood_matching_a_genre_is_not_duplicated() {
        let input = session(vec!["ambient"], Some("ambient"), 0);
        assert_eq!(input.query_facets(), vec!["ambient"]);
    }

    #[test]
    fn embeddings_used_only_with_taste_signal() {
        assert!(session(vec!["techno"], None, 0).use_embeddings());
        assert!(session(vec![], Some("dreamy"), 0).use_embeddings());
        assert!(!session(vec![], None, 0).use_embeddings());
    }

    #[test]
    fn volume_discount_requires_listening_history() {
        assert!(!session(vec![], None, 5).volume_eligible());
        assert!(session(vec![], None, 6).volume_eligible());
    }

    #[test]
    fn energy_level_parses_and_rejects() {
        assert_eq!("High".parse::<EnergyLevel>().expect("parse"), EnergyLevel::High);
        assert!("frantic".parse::<EnergyLevel>().is_err());
    }
}
