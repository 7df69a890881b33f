use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use stemline_core::{quote_price, Candidate, LicenseType, PricingSchedule, TrackId};
use thiserror::Error;

use crate::catalog::{Catalog, MAX_SEARCH_LIMIT};
use crate::embeddings::{EmbeddingService, EmbeddingStore, RankedTrack};

#[derive(Debug, Error)]
pub enum ToolError {
    /// Requesting an unregistered tool is a programmer error, surfaced
    /// immediately rather than degraded.
    #[error("tool not found: {0}")]
    NotFound(String),
}

/// A named, pluggable operation over structured input/output. Tools own no
/// shared mutable state beyond the read-through caches they explicitly
/// hold (e.g. the embedding store).
#[async_trait]
pub trait Tool: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;
    async fn run(&self, input: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.tools.get(name).cloned().ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Registry wired with the four built-in tools.
pub fn builtin_registry(
    catalog: Arc<dyn Catalog>,
    schedule: PricingSchedule,
    embeddings: Arc<EmbeddingStore>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CatalogSearchTool { catalog: Arc::clone(&catalog) });
    registry.register(PricingQuoteTool { schedule });
    registry.register(AnalyticsSignalTool);
    registry.register(EmbeddingSimilarityTool {
        catalog,
        service: EmbeddingService::new(),
        store: embeddings,
    });
    registry
}

// ── catalog.search ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CatalogSearchInput {
    #[serde(default)]
    query: String,
    limit: Option<usize>,
    #[serde(default)]
    allow_explicit: bool,
}

#[derive(Debug, Serialize)]
struct CatalogSearchOutput {
    items: Vec<Candidate>,
}

#[derive(Debug)]
struct CatalogSearchTool {
    catalog: Arc<dyn Catalog>,
}

#[async_trait]
impl Tool for CatalogSearchTool {
    fn name(&self) -> &'static str {
        "catalog.search"
    }

    async fn run(&self, input: Value) -> Result<Value> {
        let input: CatalogSearchInput = serde_json::from_value(input)?;
        let limit = input.limit.unwrap_or(20).clamp(1, MAX_SEARCH_LIMIT);
        let items = self.catalog.search(&input.query, limit, input.allow_explicit).await?;
        Ok(serde_json::to_value(CatalogSearchOutput { items })?)
    }
}

// ── pricing.quote ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PricingQuoteInput {
    #[serde(default)]
    license_type: LicenseType,
    #[serde(default)]
    volume: bool,
}

#[derive(Debug)]
struct PricingQuoteTool {
    schedule: PricingSchedule,
}

#[async_trait]
impl Tool for PricingQuoteTool {
    fn name(&self) -> &'static str {
        "pricing.quote"
    }

    async fn run(&self, input: Value) -> Result<Value> {
        let input: PricingQuoteInput = serde_json::from_value(input)?;
        let price_usd = quote_price(input.license_type, &self.schedule, input.volume);
        Ok(json!({ "price_usd": price_usd }))
    }
}

// ── analytics.signal ────────────────────────────────────────────────────

/// Popularity signal stub. The analytics backend is an external
/// collaborator; until it is wired up, every track reports zero.
#[derive(Debug)]
struct AnalyticsSignalTool;

#[async_trait]
impl Tool for AnalyticsSignalTool {
    fn name(&self) -> &'static str {
        "analytics.signal"
    }

    async fn run(&self, input: Value) -> Result<Value> {
        let track_id = input.get("track_id").cloned().unwrap_or(Value::Null);
        Ok(json!({ "track_id": track_id, "plays": 0, "score": 0 }))
    }
}

// ── embeddings.similarity ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SimilarityInput {
    #[serde(default)]
    query: String,
    #[serde(default)]
    candidates: Vec<TrackId>,
}

#[derive(Debug, Serialize)]
struct SimilarityOutput {
    ranked: Vec<RankedTrack>,
}

#[derive(Debug)]
struct EmbeddingSimilarityTool {
    catalog: Arc<dyn Catalog>,
    service: EmbeddingService,
    store: Arc<EmbeddingStore>,
}

#[async_trait]
impl Tool for EmbeddingSimilarityTool {
    fn name(&self) -> &'static str {
        "embeddings.similarity"
    }

    async fn run(&self, input: Value) -> Result<Value> {
        let input: SimilarityInput = serde_json::from_value(input)?;
        let query_vector = self.service.embed(&input.query);

        // Lazily populate the cache for candidates we have not seen yet.
        for track_id in &input.candidates {
            if self.store.get(track_id).is_some() {
                continue;
            }
            if let Some(track) = self.catalog.find(track_id).await? {
                let text = track.embedding_text();
                if !text.trim().is_empty() {
                    self.store.upsert(track_id, self.service.embed(&text));
                }
            }
        }

        let ranked = self.store.similarity(&query_vector, &input.candidates);
        Ok(serde_json::to_value(SimilarityOutput { ranked })?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::json;
    use stemline_core::{PricingSchedule, TrackId};

    use super::{builtin_registry, ToolError};
    use crate::catalog::{CatalogTrack, InMemoryCatalog};
    use crate::embeddings::EmbeddingStore;

    fn track(id: &str, title: &str, genre: &str) -> CatalogTrack {
        CatalogTrack {
            id: TrackId::new(id),
            title: title.to_string(),
            genre: Some(genre.to_string()),
            explicit: false,
            created_at: Utc::now(),
        }
    }

    fn registry() -> super::ToolRegistry {
        let catalog = Arc::new(InMemoryCatalog::with_tracks(vec![
            track("trk-1", "Neon Tide", "techno"),
            track("trk-2", "Glass Garden", "ambient"),
        ]));
        builtin_registry(catalog, PricingSchedule::default(), Arc::new(EmbeddingStore::new()))
    }

    #[test]
    fn registry_registers_all_builtin_tools() {
        let registry = registry();
        assert_eq!(registry.len(), 4);
        for name in
            ["catalog.search", "pricing.quote", "analytics.signal", "embeddings.similarity"]
        {
            assert!(registry.get(name).is_ok(), "missing tool {name}");
        }
    }

    #[test]
    fn unregistered_tool_fails_fast() {
        let registry = registry();
        let error = registry.get("catalog.missing").expect_err("should fail");
        assert!(matches!(error, ToolError::NotFound(name) if name == "catalog.missing"));
    }

    #[tokio::test]
    async fn catalog_search_returns_items() {
        let registry = registry();
        let tool = registry.get("catalog.search").expect("tool");
        let output = tool
            .run(json!({ "query": "techno", "limit": 10, "allow_explicit": false }))
            .await
            .expect("run");
        let items = output["items"].as_array().expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "trk-1");
    }

    #[tokio::test]
    async fn pricing_quote_applies_multiplier_schedule() {
        let registry = registry();
        let tool = registry.get("pricing.quote").expect("tool");

        let output = tool
            .run(json!({ "license_type": "commercial", "volume": false }))
            .await
            .expect("run");
        let price: Decimal = serde_json::from_value(output["price_usd"].clone()).expect("decimal");
        assert_eq!(price, Decimal::new(10, 2));
    }

    #[tokio::test]
    async fn analytics_signal_is_a_zero_stub() {
        let registry = registry();
        let tool = registry.get("analytics.signal").expect("tool");
        let output = tool.run(json!({ "track_id": "trk-1" })).await.expect("run");
        assert_eq!(output["plays"], 0);
        assert_eq!(output["score"], 0);
    }

    #[tokio::test]
    async fn similarity_populates_cache_lazily_and_ranks() {
        let registry = registry();
        let tool = registry.get("embeddings.similarity").expect("tool");
        let output = tool
            .run(json!({ "query": "glass garden ambient", "candidates": ["trk-1", "trk-2"] }))
            .await
            .expect("run");
        let ranked = output["ranked"].as_array().expect("ranked");
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0]["track_id"], "trk-2");
    }
}
