use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::decision::{DecisionStatus, NegotiationReason, Transition};
use crate::domain::license::LicenseType;
use crate::domain::track::TrackId;
use crate::wallet::BudgetAlertLevel;

pub const EVENT_VERSION: u32 = 1;

/// Versioned payloads published by the decision pipeline. Delivery is
/// fire-and-forget: at-least-attempted, no acknowledgement. Subscribers
/// are external collaborators; the pipeline only needs `publish`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_name")]
pub enum AgentEvent {
    #[serde(rename = "agent.selection")]
    Selection { session_id: String, track_id: TrackId, candidates: Vec<TrackId> },
    #[serde(rename = "agent.mix_planned")]
    MixPlanned { session_id: String, track_id: TrackId, transition: Transition },
    #[serde(rename = "agent.negotiated")]
    Negotiated {
        session_id: String,
        track_id: TrackId,
        license_type: LicenseType,
        price_usd: Decimal,
        reason: NegotiationReason,
    },
    #[serde(rename = "agent.decision_made")]
    DecisionMade {
        session_id: String,
        status: DecisionStatus,
        accepted: usize,
        total_spend_usd: Decimal,
    },
    #[serde(rename = "agent.evaluation_completed")]
    EvaluationCompleted {
        total: usize,
        approved: usize,
        rejected: usize,
        approval_rate: f64,
        avg_price_usd: Decimal,
        repeat_rate: f64,
    },
    #[serde(rename = "agent.budget_alert")]
    BudgetAlert {
        user_id: String,
        level: BudgetAlertLevel,
        percent_used: u32,
        spent_usd: Decimal,
        monthly_cap_usd: Decimal,
        remaining_usd: Decimal,
    },
}

impl AgentEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Selection { .. } => "agent.selection",
            Self::MixPlanned { .. } => "agent.mix_planned",
            Self::Negotiated { .. } => "agent.negotiated",
            Self::DecisionMade { .. } => "agent.decision_made",
            Self::EvaluationCompleted { .. } => "agent.evaluation_completed",
            Self::BudgetAlert { .. } => "agent.budget_alert",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AgentEvent,
}

type Handler = Box<dyn Fn(&EventEnvelope) + Send + Sync>;

/// In-process pub/sub. Created at startup, lives for the process; handler
/// registration is the only mutation after that, so publishing never
/// blocks on more than the handler-map lock.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<String, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, event_name: &str, handler: F)
    where
        F: Fn(&EventEnvelope) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.entry(event_name.to_string()).or_default().push(Box::new(handler));
    }

    pub fn publish(&self, event: AgentEvent) {
        let envelope = EventEnvelope {
            event_id: Uuid::new_v4(),
            event_version: EVENT_VERSION,
            occurred_at: Utc::now(),
            event,
        };
        let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(subscribed) = handlers.get(envelope.event.name()) {
            for handler in subscribed {
                handler(&envelope);
            }
        }
    }
}
