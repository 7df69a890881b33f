use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::license::LicenseType;
use crate::domain::listing::Listing;
use crate::domain::track::TrackId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transition {
    HardCut,
    Crossfade,
    CrossfadeLong,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HardCut => "hard-cut",
            Self::Crossfade => "crossfade",
            Self::CrossfadeLong => "crossfade-long",
        }
    }
}

/// Deterministic transition plan between the previous track and the next.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixPlan {
    pub track_id: TrackId,
    pub previous_track_id: Option<TrackId>,
    pub transition: Transition,
    pub notes: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationReason {
    WithinBudget,
    OverBudget,
}

/// Outcome of one price negotiation. The negotiator only proposes; it
/// never debits the wallet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NegotiationResult {
    pub license_type: LicenseType,
    pub price_usd: Decimal,
    pub allowed: bool,
    pub reason: NegotiationReason,
    /// Chain-confirmed listings only.
    pub listings: Vec<Listing>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Approved,
    Rejected,
    AllRejected,
    NoTracks,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    LocalPipeline,
    LlmToolCalling,
    LlmNoTrackSelected,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackDecision {
    pub track_id: TrackId,
    pub mix_plan: MixPlan,
    pub negotiation: NegotiationResult,
}

/// The result of one curation pass, whichever runtime produced it.
/// Terminal outcomes (`no_tracks`, `all_rejected`, ...) are values here,
/// never errors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub status: DecisionStatus,
    /// Every candidate that was attempted, in evaluation order. Accepted
    /// ones carry `negotiation.allowed == true`.
    pub tracks: Vec<TrackDecision>,
    pub total_spend_usd: Decimal,
    pub reason: Option<DecisionReason>,
    /// Model-supplied curation rationale, LLM runtime only.
    pub reasoning: Option<String>,
    pub latency_ms: Option<u64>,
}

impl DecisionResult {
    pub fn no_tracks() -> Self {
        Self {
            status: DecisionStatus::NoTracks,
            tracks: Vec::new(),
            total_spend_usd: Decimal::ZERO,
            reason: None,
            reasoning: None,
            latency_ms: None,
        }
    }

    pub fn accepted(&self) -> impl Iterator<Item = &TrackDecision> {
        self.tracks.iter().filter(|track| track.negotiation.allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::{DecisionResult, DecisionStatus, Transition};

    #[test]
    fn transitions_serialize_kebab_case() {
        assert_eq!(
            serde_json::to_value(Transition::CrossfadeLong).expect("serialize"),
            serde_json::json!("crossfade-long")
        );
        assert_eq!(Transition::HardCut.as_str(), "hard-cut");
    }

    #[test]
    fn no_tracks_is_a_terminal_value() {
        let decision = DecisionResult::no_tracks();
        assert_eq!(decision.status, DecisionStatus::NoTracks);
        assert!(decision.tracks.is_empty());
        assert_eq!(decision.accepted().count(), 0);
    }
}
