use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Marketplace listing identifier (the contract's `uint256 listingId`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingId(pub u64);

impl std::fmt::Display for ListingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// An individually licensable audio component of a track (vocals, drums,
/// bass, ...). Open set; the marketplace does not constrain the taxonomy.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StemType(pub String);

impl StemType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }
}

/// Derived validity of a locally cached listing. The chain is the source
/// of truth; `Stale` records have been auto-healed after the chain
/// disagreed with the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Stale,
}

/// Locally cached view of a marketplace offer to sell units of a stem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub listing_id: ListingId,
    pub token_id: u64,
    pub chain_id: u64,
    pub stem_type: StemType,
    pub price_per_unit_usd: Decimal,
    pub status: ListingStatus,
}

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// The raw `listings(listingId)` view-call result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnChainListing {
    pub seller: String,
    pub token_id: u64,
    pub amount: u64,
    pub price_per_unit: u128,
    pub payment_token: String,
    /// Unix seconds (the contract's `uint40 expiry`).
    pub expiry: i64,
}

impl OnChainListing {
    /// Invalid iff the seller slot was cleared, the remaining amount is
    /// zero, or the offer expired before `now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.seller.eq_ignore_ascii_case(ZERO_ADDRESS)
            && self.amount > 0
            && self.expiry >= now.timestamp()
    }
}
