use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unsupported license type `{0}` (expected personal|remix|commercial)")]
    UnknownLicenseType(String),
    #[error("unsupported energy level `{0}` (expected low|medium|high)")]
    UnknownEnergyLevel(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}
