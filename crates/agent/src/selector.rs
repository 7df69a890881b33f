use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use stemline_core::{Candidate, TrackId};

use crate::tools::ToolRegistry;

/// How many hits each catalog facet query asks for before dedup.
const FACET_SEARCH_LIMIT: usize = 20;

#[derive(Clone, Debug)]
pub struct SelectInput {
    pub queries: Vec<String>,
    pub recent_track_ids: Vec<TrackId>,
    pub allow_explicit: bool,
    pub use_embeddings: bool,
    pub limit: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Selection {
    /// Every deduplicated candidate found, in (possibly re-ranked) order.
    pub candidates: Vec<Candidate>,
    /// Up to `limit` picks from the fresh-first pool. Empty when the
    /// catalog produced nothing, which is a valid outcome, not an error.
    pub selected: Vec<Candidate>,
}

/// Turns session preferences into an ordered candidate list.
pub struct Selector {
    tools: Arc<ToolRegistry>,
}

impl Selector {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    pub async fn select(&self, input: SelectInput) -> Result<Selection> {
        let queries: Vec<String> =
            input.queries.iter().filter(|q| !q.trim().is_empty()).cloned().collect();

        // One search per facet; a preference-less session still gets the
        // blank catalog query.
        let mut seen = HashSet::new();
        let mut candidates: Vec<Candidate> = Vec::new();
        let facets: Vec<String> =
            if queries.is_empty() { vec![String::new()] } else { queries.clone() };

        let search = self.tools.get("catalog.search")?;
        for query in &facets {
            let output = search
                .run(json!({
                    "query": query,
                    "limit": FACET_SEARCH_LIMIT,
                    "allow_explicit": input.allow_explicit,
                }))
                .await?;
            let items: Vec<Candidate> = serde_json::from_value(output["items"].clone())?;
            for item in items {
                if seen.insert(item.id.clone()) {
                    candidates.push(item);
                }
            }
        }

        if candidates.is_empty() {
            return Ok(Selection::default());
        }

        if input.use_embeddings && candidates.len() > 1 && !queries.is_empty() {
            candidates = self.rerank(candidates, &queries).await;
        }

        let fresh: Vec<Candidate> = candidates
            .iter()
            .filter(|candidate| !input.recent_track_ids.contains(&candidate.id))
            .cloned()
            .collect();
        let pool = if fresh.is_empty() { candidates.clone() } else { fresh };
        let selected = pool.into_iter().take(input.limit).collect();

        Ok(Selection { candidates, selected })
    }

    /// Re-rank by similarity to the combined facet text. Any failure (or
    /// an empty ranking) silently keeps the catalog order.
    async fn rerank(&self, candidates: Vec<Candidate>, queries: &[String]) -> Vec<Candidate> {
        let combined = queries.join(" ");
        let ids: Vec<TrackId> = candidates.iter().map(|c| c.id.clone()).collect();

        let ranked_ids: Vec<TrackId> = match self.similarity(&combined, &ids).await {
            Ok(ranked) => ranked,
            Err(error) => {
                tracing::debug!(%error, "similarity ranking failed, keeping catalog order");
                return candidates;
            }
        };

        let ordered: Vec<Candidate> = ranked_ids
            .iter()
            .filter_map(|id| candidates.iter().find(|c| &c.id == id).cloned())
            .collect();
        if ordered.is_empty() {
            candidates
        } else {
            ordered
        }
    }

    async fn similarity(&self, query: &str, candidates: &[TrackId]) -> Result<Vec<TrackId>> {
        let tool = self.tools.get("embeddings.similarity")?;
        let output = tool.run(json!({ "query": query, "candidates": candidates })).await?;
        let ranked = output["ranked"].as_array().cloned().unwrap_or_default();
        Ok(ranked
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry["track_id"].clone()).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use stemline_core::{PricingSchedule, TrackId};

    use super::{SelectInput, Selector};
    use crate::catalog::{CatalogTrack, InMemoryCatalog};
    use crate::embeddings::EmbeddingStore;
    use crate::tools::builtin_registry;

    fn track(id: &str, title: &str, genre: &str, age_mins: i64) -> CatalogTrack {
        CatalogTrack {
            id: TrackId::new(id),
            title: title.to_string(),
            genre: Some(genre.to_string()),
            explicit: false,
            created_at: Utc::now() - Duration::minutes(age_mins),
        }
    }

    fn selector(tracks: Vec<CatalogTrack>) -> Selector {
        let registry = builtin_registry(
            Arc::new(InMemoryCatalog::with_tracks(tracks)),
            PricingSchedule::default(),
            Arc::new(EmbeddingStore::new()),
        );
        Selector::new(Arc::new(registry))
    }

    fn select_input(queries: Vec<&str>, recent: Vec<&str>) -> SelectInput {
        SelectInput {
            queries: queries.into_iter().map(str::to_string).collect(),
            recent_track_ids: recent.into_iter().map(TrackId::new).collect(),
            allow_explicit: false,
            use_embeddings: false,
            limit: 5,
        }
    }

    #[tokio::test]
    async fn gathers_candidates_across_facets_without_duplicates() {
        let selector = selector(vec![
            track("trk-1", "Neon Tide", "techno", 10),
            track("trk-2", "Neon Garden ambient mix", "techno", 20),
            track("trk-3", "Glass Garden", "ambient", 30),
        ]);

        let selection =
            selector.select(select_input(vec!["techno", "ambient"], vec![])).await.expect("select");
        assert_eq!(selection.candidates.len(), 3);
        assert_eq!(selection.selected.len(), 3);
    }

    #[tokio::test]
    async fn avoids_recently_played_while_alternatives_exist() {
        let selector = selector(vec![
            track("trk-1", "Neon Tide", "techno", 10),
            track("trk-2", "Copper Sky", "techno", 20),
        ]);

        let selection =
            selector.select(select_input(vec!["techno"], vec!["trk-1"])).await.expect("select");
        assert_eq!(selection.selected[0].id, TrackId::new("trk-2"));
        assert!(selection.selected.iter().all(|c| c.id != TrackId::new("trk-1")));
    }

    #[tokio::test]
    async fn repeats_when_everything_was_recently_played() {
        let selector = selector(vec![track("trk-1", "Neon Tide", "techno", 10)]);

        let selection =
            selector.select(select_input(vec!["techno"], vec!["trk-1"])).await.expect("select");
        assert_eq!(selection.selected.len(), 1);
        assert_eq!(selection.selected[0].id, TrackId::new("trk-1"));
    }

    #[tokio::test]
    async fn empty_catalog_yields_empty_selection() {
        let selector = selector(vec![]);
        let selection =
            selector.select(select_input(vec!["techno"], vec![])).await.expect("select");
        assert!(selection.candidates.is_empty());
        assert!(selection.selected.is_empty());
    }

    #[tokio::test]
    async fn embedding_rerank_prefers_similar_titles() {
        let mut input = select_input(vec!["glass"], vec![]);
        input.use_embeddings = true;

        // Catalog order alone would put the newer trk-1 first; the
        // re-rank pulls the closer match ahead.
        let selector = selector(vec![
            track("trk-1", "Neon Tide glass", "techno", 10),
            track("trk-2", "Glass Garden", "ambient", 20),
        ]);

        let selection = selector.select(input).await.expect("select");
        assert_eq!(selection.selected[0].id, TrackId::new("trk-2"));
        assert_eq!(selection.selected[1].id, TrackId::new("trk-1"));
    }

    #[tokio::test]
    async fn selection_is_capped_at_limit() {
        let tracks = (0..10).map(|n| track(&format!("trk-{n}"), "Neon", "techno", n)).collect();
        let selector = selector(tracks);
        let mut input = select_input(vec!["techno"], vec![]);
        input.limit = 3;

        let selection = selector.select(input).await.expect("select");
        assert_eq!(selection.selected.len(), 3);
        assert_eq!(selection.candidates.len(), 10);
    }
}
