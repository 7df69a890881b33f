pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod pricing;
pub mod wallet;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, RuntimeMode};
pub use domain::decision::{
    DecisionReason, DecisionResult, DecisionStatus, MixPlan, NegotiationReason, NegotiationResult,
    TrackDecision, Transition,
};
pub use domain::license::LicenseType;
pub use domain::listing::{
    Listing, ListingId, ListingStatus, OnChainListing, StemType, ZERO_ADDRESS,
};
pub use domain::session::{
    EnergyLevel, SessionInput, SessionPreferences, RECENT_TRACKS_CAP, VOLUME_HISTORY_THRESHOLD,
};
pub use domain::track::{Candidate, TrackId};
pub use errors::DomainError;
pub use events::{AgentEvent, EventBus, EventEnvelope, EVENT_VERSION};
pub use pricing::{quote_price, PricingSchedule};
pub use wallet::{
    alert_level, emit_budget_alert, BudgetAlertLevel, SpendOutcome, WalletRecord, WalletStore,
};
