use std::sync::Arc;

use anyhow::Result;
use rust_decimal::Decimal;
use stemline_core::{
    AgentEvent, DecisionReason, DecisionResult, DecisionStatus, EventBus, SessionInput,
    TrackDecision, TrackId,
};

use crate::mixer;
use crate::negotiator::{NegotiateInput, Negotiator};
use crate::selector::{SelectInput, Selector};

/// Sequences Selector → Mixer → Negotiator across candidates under one
/// running budget. The candidate loop is strictly sequential: the budget
/// is threaded through in order, and `budget_left` is owned exclusively
/// by one `orchestrate` call.
pub struct Orchestrator {
    selector: Selector,
    negotiator: Negotiator,
    events: Arc<EventBus>,
    candidate_limit: usize,
}

impl Orchestrator {
    pub fn new(
        selector: Selector,
        negotiator: Negotiator,
        events: Arc<EventBus>,
        candidate_limit: usize,
    ) -> Self {
        Self { selector, negotiator, events, candidate_limit }
    }

    pub async fn orchestrate(&self, input: &SessionInput) -> Result<DecisionResult> {
        let selection = self
            .selector
            .select(SelectInput {
                queries: input.query_facets(),
                recent_track_ids: input.recent_track_ids.clone(),
                allow_explicit: input.preferences.allow_explicit,
                use_embeddings: input.use_embeddings(),
                limit: self.candidate_limit,
            })
            .await?;

        let Some(first) = selection.selected.first() else {
            // Empty catalog result is a terminal decision, not an error.
            return Ok(DecisionResult::no_tracks());
        };

        self.events.publish(AgentEvent::Selection {
            session_id: input.session_id.clone(),
            track_id: first.id.clone(),
            candidates: selection.candidates.iter().map(|c| c.id.clone()).collect(),
        });

        let mut budget_left = input.budget_remaining_usd;
        let mut previous: Option<TrackId> = input.recent_track_ids.first().cloned();
        let mut tracks: Vec<TrackDecision> = Vec::new();
        let mut total_spend_usd = Decimal::ZERO;
        let mut accepted = 0usize;

        for candidate in &selection.selected {
            let mix_plan = mixer::plan(
                &candidate.id,
                previous.as_ref(),
                input.preferences.mood.as_deref(),
                input.preferences.energy,
            );
            self.events.publish(AgentEvent::MixPlanned {
                session_id: input.session_id.clone(),
                track_id: candidate.id.clone(),
                transition: mix_plan.transition,
            });

            let negotiation = self
                .negotiator
                .negotiate(NegotiateInput {
                    track_id: candidate.id.clone(),
                    license_type: input.preferences.license_type.unwrap_or_default(),
                    budget_remaining_usd: budget_left,
                    stem_types: input.preferences.stem_types.clone(),
                    volume_eligible: input.volume_eligible(),
                })
                .await?;
            self.events.publish(AgentEvent::Negotiated {
                session_id: input.session_id.clone(),
                track_id: candidate.id.clone(),
                license_type: negotiation.license_type,
                price_usd: negotiation.price_usd,
                reason: negotiation.reason,
            });

            if negotiation.allowed {
                budget_left -= negotiation.price_usd;
                total_spend_usd += negotiation.price_usd;
                accepted += 1;
            }
            // Mix continuity is independent of purchase success.
            previous = Some(candidate.id.clone());
            tracks.push(TrackDecision {
                track_id: candidate.id.clone(),
                mix_plan,
                negotiation,
            });

            if budget_left <= Decimal::ZERO {
                break;
            }
        }

        let status =
            if accepted > 0 { DecisionStatus::Approved } else { DecisionStatus::AllRejected };
        self.events.publish(AgentEvent::DecisionMade {
            session_id: input.session_id.clone(),
            status,
            accepted,
            total_spend_usd,
        });
        tracing::info!(
            session_id = %input.session_id,
            ?status,
            accepted,
            %total_spend_usd,
            "orchestration pass complete"
        );

        Ok(DecisionResult {
            status,
            tracks,
            total_spend_usd,
            reason: Some(DecisionReason::LocalPipeline),
            reasoning: None,
            latency_ms: None,
        })
    }
}
