use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use stemline_core::{Candidate, TrackId};

/// Search is clamped to this window regardless of what the caller asks for.
pub const MAX_SEARCH_LIMIT: usize = 50;

/// A track as the catalog knows it. `created_at` drives the default
/// recency ordering of search results.
#[derive(Clone, Debug, PartialEq)]
pub struct CatalogTrack {
    pub id: TrackId,
    pub title: String,
    pub genre: Option<String>,
    pub explicit: bool,
    pub created_at: DateTime<Utc>,
}

impl CatalogTrack {
    pub fn to_candidate(&self) -> Candidate {
        Candidate {
            id: self.id.clone(),
            title: self.title.clone(),
            genre: self.genre.clone(),
            explicit: self.explicit,
        }
    }

    /// Text the embedding cache is keyed on.
    pub fn embedding_text(&self) -> String {
        match &self.genre {
            Some(genre) => format!("{} {genre}", self.title),
            None => self.title.clone(),
        }
    }
}

/// External catalog capability. Full-text search itself is out of scope;
/// this is the seam the pipeline consumes it through.
#[async_trait]
pub trait Catalog: Send + Sync + std::fmt::Debug {
    async fn search(
        &self,
        query: &str,
        limit: usize,
        allow_explicit: bool,
    ) -> anyhow::Result<Vec<Candidate>>;

    async fn find(&self, id: &TrackId) -> anyhow::Result<Option<CatalogTrack>>;
}

/// Catalog backed by a process-local list. Created at startup, mutated
/// only by explicit inserts; used by tools, tests, and the evaluation
/// harness.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    tracks: Mutex<Vec<CatalogTrack>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracks(tracks: Vec<CatalogTrack>) -> Self {
        Self { tracks: Mutex::new(tracks) }
    }

    pub fn insert(&self, track: CatalogTrack) {
        let mut tracks = self.tracks.lock().unwrap_or_else(|e| e.into_inner());
        tracks.push(track);
    }

    fn matches(track: &CatalogTrack, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let query = query.to_lowercase();
        track.title.to_lowercase().contains(&query)
            || track
                .genre
                .as_ref()
                .map(|genre| genre.to_lowercase().contains(&query))
                .unwrap_or(false)
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn search(
        &self,
        query: &str,
        limit: usize,
        allow_explicit: bool,
    ) -> anyhow::Result<Vec<Candidate>> {
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
        let tracks = self.tracks.lock().unwrap_or_else(|e| e.into_inner());

        let mut matched: Vec<&CatalogTrack> = tracks
            .iter()
            .filter(|track| allow_explicit || !track.explicit)
            .filter(|track| Self::matches(track, query.trim()))
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matched.into_iter().take(limit).map(CatalogTrack::to_candidate).collect())
    }

    async fn find(&self, id: &TrackId) -> anyhow::Result<Option<CatalogTrack>> {
        let tracks = self.tracks.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tracks.iter().find(|track| &track.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use stemline_core::TrackId;

    use super::{Catalog, CatalogTrack, InMemoryCatalog};

    fn track(id: &str, title: &str, genre: Option<&str>, explicit: bool, age_mins: i64) -> CatalogTrack {
        CatalogTrack {
            id: TrackId::new(id),
            title: title.to_string(),
            genre: genre.map(str::to_string),
            explicit,
            created_at: Utc::now() - Duration::minutes(age_mins),
        }
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::with_tracks(vec![
            track("trk-1", "Neon Tide", Some("techno"), false, 30),
            track("trk-2", "Smoke Signals", Some("techno"), true, 20),
            track("trk-3", "Glass Garden", Some("ambient"), false, 10),
        ])
    }

    #[tokio::test]
    async fn search_matches_title_or_genre_case_insensitively() {
        let catalog = catalog();
        let hits = catalog.search("TECHNO", 10, true).await.expect("search");
        assert_eq!(hits.len(), 2);

        let hits = catalog.search("glass", 10, false).await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, TrackId::new("trk-3"));
    }

    #[tokio::test]
    async fn explicit_tracks_are_filtered_unless_allowed() {
        let catalog = catalog();
        let hits = catalog.search("techno", 10, false).await.expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, TrackId::new("trk-1"));
    }

    #[tokio::test]
    async fn results_are_newest_first_and_limited() {
        let catalog = catalog();
        let hits = catalog.search("", 2, true).await.expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, TrackId::new("trk-3"));
        assert_eq!(hits[1].id, TrackId::new("trk-2"));
    }

    #[tokio::test]
    async fn find_returns_embedding_text_source() {
        let catalog = catalog();
        let found = catalog.find(&TrackId::new("trk-1")).await.expect("find").expect("some");
        assert_eq!(found.embedding_text(), "Neon Tide techno");
        assert!(catalog.find(&TrackId::new("missing")).await.expect("find").is_none());
    }
}
