use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use stemline_core::{Listing, ListingId, ListingStatus, OnChainListing, TrackId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("chain rpc failure for listing {listing_id}: {message}")]
    Rpc { listing_id: ListingId, message: String },
}

/// Read-only view of the marketplace contract. The contract itself is an
/// external collaborator; only `listings(listingId)` is consumed.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn listing(&self, listing_id: ListingId) -> Result<OnChainListing, ChainError>;
}

/// Locally cached listings keyed by track. The chain is the source of
/// truth; records flip to `Stale` when verification disagrees.
pub trait ListingStore: Send + Sync {
    fn active_for_track(&self, track_id: &TrackId) -> Vec<Listing>;
    fn mark_stale(&self, listing_id: ListingId);
}

#[derive(Default)]
pub struct InMemoryListingStore {
    listings: Mutex<HashMap<u64, (TrackId, Listing)>>,
}

impl InMemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, track_id: TrackId, listing: Listing) {
        let mut listings = self.listings.lock().unwrap_or_else(|e| e.into_inner());
        listings.insert(listing.listing_id.0, (track_id, listing));
    }

    pub fn get(&self, listing_id: ListingId) -> Option<Listing> {
        let listings = self.listings.lock().unwrap_or_else(|e| e.into_inner());
        listings.get(&listing_id.0).map(|(_, listing)| listing.clone())
    }
}

impl ListingStore for InMemoryListingStore {
    fn active_for_track(&self, track_id: &TrackId) -> Vec<Listing> {
        let listings = self.listings.lock().unwrap_or_else(|e| e.into_inner());
        let mut active: Vec<Listing> = listings
            .values()
            .filter(|(track, listing)| track == track_id && listing.status == ListingStatus::Active)
            .map(|(_, listing)| listing.clone())
            .collect();
        active.sort_by_key(|listing| listing.listing_id.0);
        active
    }

    fn mark_stale(&self, listing_id: ListingId) {
        let mut listings = self.listings.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, listing)) = listings.get_mut(&listing_id.0) {
            listing.status = ListingStatus::Stale;
        }
    }
}

/// Chain reader over a fixed map of listing states, with per-listing
/// failure injection. Stands in for the RPC client in tests and local
/// runs.
#[derive(Default)]
pub struct InMemoryChainReader {
    listings: Mutex<HashMap<u64, OnChainListing>>,
    failing: Mutex<HashSet<u64>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl InMemoryChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listing(&self, listing_id: ListingId, listing: OnChainListing) {
        let mut listings = self.listings.lock().unwrap_or_else(|e| e.into_inner());
        listings.insert(listing_id.0, listing);
    }

    pub fn fail_listing(&self, listing_id: ListingId) {
        let mut failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        failing.insert(listing_id.0);
    }

    /// Number of view calls issued so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for InMemoryChainReader {
    async fn listing(&self, listing_id: ListingId) -> Result<OnChainListing, ChainError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        {
            let failing = self.failing.lock().unwrap_or_else(|e| e.into_inner());
            if failing.contains(&listing_id.0) {
                return Err(ChainError::Rpc {
                    listing_id,
                    message: "connection refused".to_string(),
                });
            }
        }
        let listings = self.listings.lock().unwrap_or_else(|e| e.into_inner());
        listings.get(&listing_id.0).cloned().ok_or(ChainError::Rpc {
            listing_id,
            message: "listing not found on chain".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use stemline_core::{Listing, ListingId, ListingStatus, OnChainListing, StemType, TrackId};

    use super::{ChainReader, InMemoryChainReader, InMemoryListingStore, ListingStore};

    fn listing(id: u64, status: ListingStatus) -> Listing {
        Listing {
            listing_id: ListingId(id),
            token_id: id * 10,
            chain_id: 84532,
            stem_type: StemType::new("vocals"),
            price_per_unit_usd: Decimal::new(5, 2),
            status,
        }
    }

    #[test]
    fn active_for_track_filters_status_and_orders_by_id() {
        let store = InMemoryListingStore::new();
        let track = TrackId::new("trk-1");
        store.insert(track.clone(), listing(3, ListingStatus::Active));
        store.insert(track.clone(), listing(1, ListingStatus::Active));
        store.insert(track.clone(), listing(2, ListingStatus::Stale));
        store.insert(TrackId::new("trk-2"), listing(4, ListingStatus::Active));

        let active = store.active_for_track(&track);
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].listing_id, ListingId(1));
        assert_eq!(active[1].listing_id, ListingId(3));
    }

    #[test]
    fn mark_stale_flips_status_in_place() {
        let store = InMemoryListingStore::new();
        let track = TrackId::new("trk-1");
        store.insert(track.clone(), listing(7, ListingStatus::Active));

        store.mark_stale(ListingId(7));
        assert!(store.active_for_track(&track).is_empty());
        assert_eq!(store.get(ListingId(7)).expect("listing").status, ListingStatus::Stale);
    }

    #[tokio::test]
    async fn reader_returns_states_and_injected_failures() {
        let reader = InMemoryChainReader::new();
        reader.set_listing(
            ListingId(1),
            OnChainListing {
                seller: "0x00000000000000000000000000000000000000ff".to_string(),
                token_id: 10,
                amount: 5,
                price_per_unit: 20_000,
                payment_token: "0x00000000000000000000000000000000000000aa".to_string(),
                expiry: i64::MAX,
            },
        );
        reader.fail_listing(ListingId(2));

        assert_eq!(reader.listing(ListingId(1)).await.expect("listing").amount, 5);
        assert!(reader.listing(ListingId(2)).await.is_err());
        assert!(reader.listing(ListingId(3)).await.is_err());
    }
}
