use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use rust_decimal::Decimal;
use stemline_core::config::RuntimeMode;
use stemline_core::{
    DecisionReason, DecisionResult, DecisionStatus, LicenseType, NegotiationReason,
    NegotiationResult, SessionInput, TrackDecision, TrackId,
};

use crate::llm::{
    registry_tool_name, tool_declarations, ChatModel, Content, GeminiChatModel, LlmError, Part,
};
use crate::mixer;
use crate::orchestrator::Orchestrator;
use crate::tools::ToolRegistry;

/// Upper bound on tool-calling rounds in one exchange.
pub const MAX_TOOL_ROUNDS: usize = 6;

/// Wall-clock budget for the whole multi-turn exchange.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// The strategy used to make a curation decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeKind {
    Local,
    LlmToolCalling,
}

impl From<RuntimeMode> for RuntimeKind {
    fn from(mode: RuntimeMode) -> Self {
        match mode {
            RuntimeMode::Local => Self::Local,
            RuntimeMode::Llm => Self::LlmToolCalling,
        }
    }
}

/// The only entry point external callers invoke. `Local` delegates to the
/// deterministic orchestrator; `LlmToolCalling` runs the bounded
/// tool-calling exchange and, on ANY failure, retries the same input
/// through the local pipeline exactly once. A failure of the local
/// pipeline itself propagates; there is no further fallback.
pub struct AgentRuntime {
    kind: RuntimeKind,
    orchestrator: Orchestrator,
    curator: Option<ToolCallingCurator>,
}

impl AgentRuntime {
    pub fn local(orchestrator: Orchestrator) -> Self {
        Self { kind: RuntimeKind::Local, orchestrator, curator: None }
    }

    pub fn llm(orchestrator: Orchestrator, curator: ToolCallingCurator) -> Self {
        Self { kind: RuntimeKind::LlmToolCalling, orchestrator, curator: Some(curator) }
    }

    /// Wire the runtime the configuration asks for. A missing or empty
    /// model credential leaves the LLM runtime without a curator, so every
    /// `run` degrades to the local pipeline.
    pub fn from_config(
        config: &stemline_core::AppConfig,
        orchestrator: Orchestrator,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        match RuntimeKind::from(config.runtime.mode) {
            RuntimeKind::Local => Self::local(orchestrator),
            RuntimeKind::LlmToolCalling => match GeminiChatModel::from_config(&config.llm) {
                Ok(model) => {
                    let curator = ToolCallingCurator::new(Arc::new(model), tools)
                        .with_timeout(Duration::from_secs(config.llm.timeout_secs));
                    Self::llm(orchestrator, curator)
                }
                Err(error) => {
                    tracing::warn!(%error, "llm runtime unavailable, decisions will use the local pipeline");
                    Self { kind: RuntimeKind::LlmToolCalling, orchestrator, curator: None }
                }
            },
        }
    }

    pub fn kind(&self) -> RuntimeKind {
        self.kind
    }

    pub async fn run(&self, input: &SessionInput) -> Result<DecisionResult> {
        match (self.kind, &self.curator) {
            (RuntimeKind::Local, _) => self.orchestrator.orchestrate(input).await,
            (RuntimeKind::LlmToolCalling, None) => {
                tracing::warn!(
                    session_id = %input.session_id,
                    "llm runtime selected but no curator is configured, using local pipeline"
                );
                self.orchestrator.orchestrate(input).await
            }
            (RuntimeKind::LlmToolCalling, Some(curator)) => {
                match curator.run(input).await {
                    Ok(decision) => Ok(decision),
                    Err(error) => {
                        // Cold retry: nothing from the failed exchange is
                        // carried over.
                        tracing::warn!(
                            session_id = %input.session_id,
                            %error,
                            "llm exchange failed, retrying with local pipeline"
                        );
                        self.orchestrator.orchestrate(input).await
                    }
                }
            }
        }
    }
}

/// LLM-driven curation: a bounded tool-calling loop over a chat model,
/// raced against a wall-clock timeout, with a line-grammar contract on the
/// final reply.
pub struct ToolCallingCurator {
    model: Arc<dyn ChatModel>,
    tools: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolCallingCurator {
    pub fn new(model: Arc<dyn ChatModel>, tools: Arc<ToolRegistry>) -> Self {
        Self { model, tools, timeout: DEFAULT_EXCHANGE_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn run(&self, input: &SessionInput) -> Result<DecisionResult> {
        let started = Instant::now();
        // The timeout cancels the in-flight exchange: dropping the future
        // aborts any pending request, so no partial state survives.
        let text = tokio::time::timeout(self.timeout, self.exchange(input))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))??;
        let latency_ms = started.elapsed().as_millis() as u64;

        let picks = parse_track_picks(&text, input.budget_remaining_usd);
        let reasoning = parse_reasoning(&text);
        tracing::info!(
            session_id = %input.session_id,
            picks = picks.len(),
            latency_ms,
            "llm exchange complete"
        );
        Ok(build_decision(input, picks, reasoning, latency_ms))
    }

    async fn exchange(&self, input: &SessionInput) -> Result<String> {
        let system = build_system_prompt(&self.tools);
        let declarations = tool_declarations();
        let mut contents = vec![Content::user(vec![Part::text(build_user_message(input))])];

        let mut turn = self.model.send(&system, &declarations, &contents).await?;
        for _round in 0..MAX_TOOL_ROUNDS {
            let calls = turn.function_calls();
            if calls.is_empty() {
                break;
            }

            contents.push(turn.clone());
            // Execute every requested call, then feed all results back as
            // one batched reply before the next turn.
            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                let registry_name = registry_tool_name(&call.name);
                tracing::debug!(tool = %registry_name, args = %call.args, "tool call");
                let tool = self.tools.get(&registry_name)?;
                let result = tool.run(call.args).await?;
                responses.push(Part::function_response(call.name, result));
            }
            contents.push(Content::user(responses));

            turn = self.model.send(&system, &declarations, &contents).await?;
        }

        Ok(turn.text())
    }
}

fn build_system_prompt(tools: &ToolRegistry) -> String {
    let mut tool_names = tools.names();
    tool_names.sort_unstable();
    let lines = vec![
        "You are a music curation DJ agent.".to_string(),
        "Your job is to find ALL tracks that match the user's taste and genre preferences."
            .to_string(),
        String::new(),
        format!("Available tools: {}.", tool_names.join(", ")),
        String::new(),
        "Guidelines:".to_string(),
        "- Use catalog_search to find tracks matching EACH of the user's genre/mood preferences."
            .to_string(),
        "- Search for each genre separately to get comprehensive results.".to_string(),
        "- Use pricing_quote to check if tracks fit within the remaining budget.".to_string(),
        "- Avoid recommending tracks the user has recently listened to.".to_string(),
        "- Stay within the user's budget.".to_string(),
        String::new(),
        "After using tools, respond with ALL matching tracks.".to_string(),
        "List each track on its own line using this exact format:".to_string(),
        String::new(),
        "TRACK: <trackId> | LICENSE: <personal|remix|commercial> | PRICE: <price in USD>"
            .to_string(),
        "...".to_string(),
        String::new(),
        "Then on a new line:".to_string(),
        "REASONING: <1-2 sentence explanation of your overall curation strategy>".to_string(),
    ];
    lines.join("\n")
}

fn build_user_message(input: &SessionInput) -> String {
    let mut parts = vec![
        format!("Session: {}", input.session_id),
        format!("Budget remaining: ${:.2}", input.budget_remaining_usd),
    ];
    if let Some(mood) = &input.preferences.mood {
        parts.push(format!("Mood: {mood}"));
    }
    if let Some(energy) = input.preferences.energy {
        parts.push(format!("Energy: {}", energy.as_str()));
    }
    if !input.preferences.genres.is_empty() {
        parts.push(format!("Genres: {}", input.preferences.genres.join(", ")));
    }
    if let Some(license_type) = input.preferences.license_type {
        parts.push(format!("License type: {license_type}"));
    }
    if !input.recent_track_ids.is_empty() {
        let recent: Vec<&str> =
            input.recent_track_ids.iter().map(|id| id.as_str()).collect();
        parts.push(format!("Recently played (avoid these): {}", recent.join(", ")));
    }
    parts.push(String::new());
    parts.push("Please find and recommend the best tracks for me.".to_string());
    parts.join("\n")
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackPick {
    pub track_id: TrackId,
    pub license_type: LicenseType,
    pub price_usd: Decimal,
}

/// Parse the line grammar `TRACK: <id> | LICENSE: <type> | PRICE: <usd>`,
/// accepting picks only while the cumulative price stays within budget.
/// Falls back to the legacy single-line format when no line matches: a
/// compatibility shim for older model replies, not a guaranteed contract.
fn parse_track_picks(text: &str, budget_usd: Decimal) -> Vec<TrackPick> {
    let mut picks = Vec::new();
    let mut budget_left = budget_usd;

    for line in text.lines() {
        let Some((track_id, license_type, price_usd)) = parse_pick_line(line) else {
            continue;
        };
        if price_usd <= budget_left {
            budget_left -= price_usd;
            picks.push(TrackPick { track_id, license_type, price_usd });
        }
    }

    if !picks.is_empty() {
        return picks;
    }

    // Legacy single-line format: bare TRACK/LICENSE/PRICE lines.
    if let Some(track_id) = find_labeled_value(text, "TRACK") {
        let license_type = find_labeled_value(text, "LICENSE")
            .and_then(|value| value.parse::<LicenseType>().ok())
            .unwrap_or_default();
        let price_usd = find_labeled_value(text, "PRICE")
            .and_then(|value| parse_price(&value))
            .unwrap_or(Decimal::ZERO);
        if price_usd <= budget_usd {
            picks.push(TrackPick {
                track_id: TrackId::new(track_id),
                license_type,
                price_usd,
            });
        }
    }

    picks
}

fn parse_pick_line(line: &str) -> Option<(TrackId, LicenseType, Decimal)> {
    let rest = strip_label(line.trim(), "TRACK")?;
    let mut segments = rest.split('|');

    let track_id = segments.next()?.trim();
    if track_id.is_empty() {
        return None;
    }
    let license_type = labeled_segment(segments.next()?, "LICENSE")?.parse().ok()?;
    let price_usd = parse_price(&labeled_segment(segments.next()?, "PRICE")?)?;

    Some((TrackId::new(track_id), license_type, price_usd))
}

/// `"LICENSE: remix "` → `"remix"`, label match is case-insensitive.
fn labeled_segment(segment: &str, label: &str) -> Option<String> {
    strip_label(segment.trim(), label).map(|value| value.trim().to_string())
}

fn strip_label<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    let head = text.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    let tail = text.get(label.len()..)?.trim_start();
    tail.strip_prefix(':').map(str::trim_start)
}

fn parse_price(value: &str) -> Option<Decimal> {
    value.trim().trim_start_matches('$').trim().parse().ok()
}

/// Legacy helper: the value after `LABEL:` on whichever line carries it.
fn find_labeled_value(text: &str, label: &str) -> Option<String> {
    for line in text.lines() {
        let lowered = line.to_ascii_lowercase();
        let needle = format!("{}:", label.to_ascii_lowercase());
        if let Some(index) = lowered.find(&needle) {
            let value = line[index + needle.len()..].trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn parse_reasoning(text: &str) -> Option<String> {
    if let Some(reasoning) = find_labeled_value(text, "REASONING") {
        return Some(reasoning);
    }
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(200).collect())
}

fn build_decision(
    input: &SessionInput,
    picks: Vec<TrackPick>,
    reasoning: Option<String>,
    latency_ms: u64,
) -> DecisionResult {
    if picks.is_empty() {
        return DecisionResult {
            status: DecisionStatus::Rejected,
            tracks: Vec::new(),
            total_spend_usd: Decimal::ZERO,
            reason: Some(DecisionReason::LlmNoTrackSelected),
            reasoning,
            latency_ms: Some(latency_ms),
        };
    }

    let mut previous: Option<TrackId> = input.recent_track_ids.first().cloned();
    let mut tracks = Vec::with_capacity(picks.len());
    let mut total_spend_usd = Decimal::ZERO;

    for pick in picks {
        let mix_plan = mixer::plan(
            &pick.track_id,
            previous.as_ref(),
            input.preferences.mood.as_deref(),
            input.preferences.energy,
        );
        total_spend_usd += pick.price_usd;
        previous = Some(pick.track_id.clone());
        tracks.push(TrackDecision {
            track_id: pick.track_id.clone(),
            mix_plan,
            negotiation: NegotiationResult {
                license_type: pick.license_type,
                price_usd: pick.price_usd,
                allowed: true,
                reason: NegotiationReason::WithinBudget,
                listings: Vec::new(),
            },
        });
    }

    DecisionResult {
        status: DecisionStatus::Approved,
        tracks,
        total_spend_usd,
        reason: Some(DecisionReason::LlmToolCalling),
        reasoning,
        latency_ms: Some(latency_ms),
    }
}
