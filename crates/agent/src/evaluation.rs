use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stemline_core::{AgentEvent, DecisionResult, EventBus, SessionInput};

use crate::orchestrator::Orchestrator;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
    pub approval_rate: f64,
    pub avg_price_usd: Decimal,
    pub repeat_rate: f64,
}

#[derive(Debug)]
pub struct EvaluationReport {
    pub metrics: EvaluationMetrics,
    pub results: Vec<DecisionResult>,
}

/// Replays a batch of sessions through the deterministic pipeline and
/// aggregates decision quality metrics.
pub struct AgentEvaluation {
    orchestrator: Orchestrator,
    events: Arc<EventBus>,
}

impl AgentEvaluation {
    pub fn new(orchestrator: Orchestrator, events: Arc<EventBus>) -> Self {
        Self { orchestrator, events }
    }

    pub async fn evaluate(&self, sessions: &[SessionInput]) -> Result<EvaluationReport> {
        let mut results = Vec::with_capacity(sessions.len());
        let mut approved = 0usize;
        let mut rejected = 0usize;
        let mut total_price = Decimal::ZERO;
        let mut repeat_count = 0usize;
        let mut seen_tracks: HashSet<String> = HashSet::new();

        for session in sessions {
            let result = self.orchestrator.orchestrate(session).await?;
            for track in &result.tracks {
                if track.negotiation.allowed {
                    approved += 1;
                    total_price += track.negotiation.price_usd;
                } else {
                    rejected += 1;
                }
                if !seen_tracks.insert(track.track_id.0.clone()) {
                    repeat_count += 1;
                }
            }
            if result.tracks.is_empty() {
                rejected += 1;
            }
            results.push(result);
        }

        let total = sessions.len();
        let metrics = EvaluationMetrics {
            total,
            approved,
            rejected,
            approval_rate: if total > 0 { approved as f64 / total as f64 } else { 0.0 },
            avg_price_usd: if approved > 0 {
                total_price / Decimal::from(approved)
            } else {
                Decimal::ZERO
            },
            repeat_rate: if total > 0 { repeat_count as f64 / total as f64 } else { 0.0 },
        };

        self.events.publish(AgentEvent::EvaluationCompleted {
            total: metrics.total,
            approved: metrics.approved,
            rejected: metrics.rejected,
            approval_rate: metrics.approval_rate,
            avg_price_usd: metrics.avg_price_usd,
            repeat_rate: metrics.repeat_rate,
        });

        Ok(EvaluationReport { metrics, results })
    }
}
