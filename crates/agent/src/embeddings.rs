use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use stemline_core::TrackId;

pub const EMBEDDING_DIMENSION: usize = 16;

/// Deterministic hashed bag-of-tokens embedding. Not semantically deep,
/// but stable across processes and cheap enough to compute inline.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddingService;

impl EmbeddingService {
    pub fn new() -> Self {
        Self
    }

    /// Lowercase-tokenize, hash each token into one of the fixed buckets,
    /// accumulate counts, L2-normalize. Zero vector when no tokens.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; EMBEDDING_DIMENSION];
        let lowered = text.to_lowercase();
        let tokens =
            lowered.split(|c: char| !c.is_ascii_alphanumeric()).filter(|t| !t.is_empty());

        let mut any = false;
        for token in tokens {
            any = true;
            let index = (token_hash(token) as usize) % EMBEDDING_DIMENSION;
            vector[index] += 1.0;
        }
        if !any {
            return vector;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

fn token_hash(token: &str) -> u32 {
    let mut hash = 0u32;
    for ch in token.chars() {
        hash = hash.wrapping_mul(31).wrapping_add(ch as u32);
    }
    hash
}

/// Cosine similarity; 0 when either vector has zero norm.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b).sqrt()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedTrack {
    pub track_id: TrackId,
    pub score: f32,
}

/// Read-through cache of track embeddings. Entries are created lazily on
/// first similarity request and never invalidated within the process;
/// redundant writes are idempotent, so races are harmless.
#[derive(Debug, Default)]
pub struct EmbeddingStore {
    embeddings: Mutex<HashMap<String, Vec<f32>>>,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, track_id: &TrackId, vector: Vec<f32>) {
        let mut embeddings = self.embeddings.lock().unwrap_or_else(|e| e.into_inner());
        embeddings.insert(track_id.0.clone(), vector);
    }

    pub fn get(&self, track_id: &TrackId) -> Option<Vec<f32>> {
        let embeddings = self.embeddings.lock().unwrap_or_else(|e| e.into_inner());
        embeddings.get(&track_id.0).cloned()
    }

    /// Rank `candidates` by cosine similarity to `query`, descending.
    /// Candidates without a cached vector are skipped. The sort is stable,
    /// so ties keep input order.
    pub fn similarity(&self, query: &[f32], candidates: &[TrackId]) -> Vec<RankedTrack> {
        let embeddings = self.embeddings.lock().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<RankedTrack> = candidates
            .iter()
            .filter_map(|track_id| {
                embeddings.get(&track_id.0).map(|vector| RankedTrack {
                    track_id: track_id.clone(),
                    score: cosine(query, vector),
                })
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }
}

#[cfg(test)]
mod tests {
    use stemline_core::TrackId;

    use super::{cosine, EmbeddingService, EmbeddingStore, EMBEDDING_DIMENSION};

    #[test]
    fn embeddings_are_normalized_and_deterministic() {
        let service = EmbeddingService::new();
        let a = service.embed("Deep House Sunset");
        let b = service.embed("deep house sunset");

        assert_eq!(a.len(), EMBEDDING_DIMENSION);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let service = EmbeddingService::new();
        let vector = service.embed("  --- !!! ");
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn cosine_self_similarity_is_one() {
        let service = EmbeddingService::new();
        let vector = service.embed("late night techno");
        assert!((cosine(&vector, &vector) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_of_zero_vector_is_zero() {
        let zero = vec![0.0f32; EMBEDDING_DIMENSION];
        let service = EmbeddingService::new();
        let other = service.embed("anything");
        assert_eq!(cosine(&zero, &other), 0.0);
    }

    #[test]
    fn ranking_places_own_source_text_first() {
        let service = EmbeddingService::new();
        let store = EmbeddingStore::new();
        store.upsert(&TrackId::new("trk-1"), service.embed("dreamy ambient pads"));
        store.upsert(&TrackId::new("trk-2"), service.embed("hard industrial drums"));

        let ranked = store.similarity(
            &service.embed("dreamy ambient pads"),
            &[TrackId::new("trk-2"), TrackId::new("trk-1")],
        );
        assert_eq!(ranked[0].track_id, TrackId::new("trk-1"));
        assert!((ranked[0].score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn unknown_candidates_are_skipped() {
        let service = EmbeddingService::new();
        let store = EmbeddingStore::new();
        store.upsert(&TrackId::new("trk-1"), service.embed("known"));

        let ranked =
            store.similarity(&service.embed("known"), &[TrackId::new("missing"), TrackId::new("trk-1")]);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn redundant_writes_are_idempotent() {
        let service = EmbeddingService::new();
        let store = EmbeddingStore::new();
        let track = TrackId::new("trk-1");
        store.upsert(&track, service.embed("same text"));
        store.upsert(&track, service.embed("same text"));
        assert_eq!(store.get(&track), Some(service.embed("same text")));
    }
}
