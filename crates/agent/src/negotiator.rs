use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use stemline_core::{
    LicenseType, NegotiationReason, NegotiationResult, StemType, TrackId,
};

use crate::chain::{ChainReader, ListingStore};
use crate::tools::ToolRegistry;

#[derive(Clone, Debug)]
pub struct NegotiateInput {
    pub track_id: TrackId,
    pub license_type: LicenseType,
    pub budget_remaining_usd: Decimal,
    /// Non-empty list narrows the confirmed listings to these stems.
    pub stem_types: Vec<StemType>,
    pub volume_eligible: bool,
}

/// Price/budget check plus on-chain listing reconciliation. Proposes a
/// price; debiting is the caller's concern.
pub struct Negotiator {
    tools: Arc<ToolRegistry>,
    listings: Arc<dyn ListingStore>,
    chain: Arc<dyn ChainReader>,
}

impl Negotiator {
    pub fn new(
        tools: Arc<ToolRegistry>,
        listings: Arc<dyn ListingStore>,
        chain: Arc<dyn ChainReader>,
    ) -> Self {
        Self { tools, listings, chain }
    }

    pub async fn negotiate(&self, input: NegotiateInput) -> Result<NegotiationResult> {
        let quote = self
            .tools
            .get("pricing.quote")?
            .run(json!({
                "license_type": input.license_type,
                "volume": input.volume_eligible,
            }))
            .await?;
        let price_usd: Decimal = serde_json::from_value(quote["price_usd"].clone())?;

        // A price over budget settles the negotiation outright; the chain
        // is never consulted.
        if price_usd > input.budget_remaining_usd {
            return Ok(NegotiationResult {
                license_type: input.license_type,
                price_usd,
                allowed: false,
                reason: NegotiationReason::OverBudget,
                listings: Vec::new(),
            });
        }

        let listings = self.confirmed_listings(&input).await;
        Ok(NegotiationResult {
            license_type: input.license_type,
            price_usd,
            allowed: true,
            reason: NegotiationReason::WithinBudget,
            listings,
        })
    }

    /// Verify every cached-active listing of the track against the chain,
    /// each at most once. Chain-invalid records are healed to stale.
    /// RPC failures only shrink the result: the cause is ambiguous, so
    /// the cache is left untouched.
    async fn confirmed_listings(
        &self,
        input: &NegotiateInput,
    ) -> Vec<stemline_core::Listing> {
        let cached = self.listings.active_for_track(&input.track_id);
        let now = Utc::now();

        let mut confirmed = Vec::with_capacity(cached.len());
        for listing in cached {
            match self.chain.listing(listing.listing_id).await {
                Ok(on_chain) if on_chain.is_valid(now) => confirmed.push(listing),
                Ok(_) => {
                    tracing::debug!(
                        listing_id = listing.listing_id.0,
                        track_id = %input.track_id,
                        "cached listing invalid on chain, healing to stale"
                    );
                    self.listings.mark_stale(listing.listing_id);
                }
                Err(error) => {
                    tracing::warn!(
                        listing_id = listing.listing_id.0,
                        track_id = %input.track_id,
                        %error,
                        "listing verification failed, excluding without healing"
                    );
                }
            }
        }

        if !input.stem_types.is_empty() {
            confirmed.retain(|listing| input.stem_types.contains(&listing.stem_type));
        }
        confirmed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use stemline_core::{
        LicenseType, Listing, ListingId, ListingStatus, NegotiationReason, OnChainListing,
        PricingSchedule, StemType, TrackId, ZERO_ADDRESS,
    };

    use super::{NegotiateInput, Negotiator};
    use crate::catalog::InMemoryCatalog;
    use crate::chain::{InMemoryChainReader, InMemoryListingStore};
    use crate::embeddings::EmbeddingStore;
    use crate::tools::builtin_registry;

    fn listing(id: u64, stem: &str) -> Listing {
        Listing {
            listing_id: ListingId(id),
            token_id: id * 10,
            chain_id: 84532,
            stem_type: StemType::new(stem),
            price_per_unit_usd: Decimal::new(5, 2),
            status: ListingStatus::Active,
        }
    }

    fn valid_on_chain() -> OnChainListing {
        OnChainListing {
            seller: "0x00000000000000000000000000000000000000ff".to_string(),
            token_id: 10,
            amount: 3,
            price_per_unit: 20_000,
            payment_token: "0x00000000000000000000000000000000000000aa".to_string(),
            expiry: i64::MAX,
        }
    }

    fn harness() -> (Negotiator, Arc<InMemoryListingStore>, Arc<InMemoryChainReader>) {
        let tools = builtin_registry(
            Arc::new(InMemoryCatalog::new()),
            PricingSchedule::default(),
            Arc::new(EmbeddingStore::new()),
        );
        let listings = Arc::new(InMemoryListingStore::new());
        let chain = Arc::new(InMemoryChainReader::new());
        let negotiator = Negotiator::new(
            Arc::new(tools),
            Arc::clone(&listings) as Arc<dyn crate::chain::ListingStore>,
            Arc::clone(&chain) as Arc<dyn crate::chain::ChainReader>,
        );
        (negotiator, listings, chain)
    }

    fn input(license: LicenseType, budget_cents: i64) -> NegotiateInput {
        NegotiateInput {
            track_id: TrackId::new("trk-1"),
            license_type: license,
            budget_remaining_usd: Decimal::new(budget_cents, 2),
            stem_types: Vec::new(),
            volume_eligible: false,
        }
    }

    #[tokio::test]
    async fn over_budget_short_circuits_without_chain_lookup() {
        let (negotiator, listings, chain) = harness();
        listings.insert(TrackId::new("trk-1"), listing(1, "vocals"));

        // commercial = 0.02 * 5 = 0.10 > 0.05 budget
        let result =
            negotiator.negotiate(input(LicenseType::Commercial, 5)).await.expect("negotiate");
        assert!(!result.allowed);
        assert_eq!(result.reason, NegotiationReason::OverBudget);
        assert_eq!(result.price_usd, Decimal::new(10, 2));
        assert!(result.listings.is_empty());
        assert_eq!(chain.calls(), 0, "no view call may happen once the price fails budget");
        assert_eq!(listings.get(ListingId(1)).expect("listing").status, ListingStatus::Active);
    }

    #[tokio::test]
    async fn confirmed_listings_survive_negotiation() {
        let (negotiator, listings, chain) = harness();
        listings.insert(TrackId::new("trk-1"), listing(1, "vocals"));
        chain.set_listing(ListingId(1), valid_on_chain());

        let result =
            negotiator.negotiate(input(LicenseType::Personal, 100)).await.expect("negotiate");
        assert!(result.allowed);
        assert_eq!(result.reason, NegotiationReason::WithinBudget);
        assert_eq!(result.listings.len(), 1);
    }

    #[tokio::test]
    async fn zero_seller_listing_is_auto_healed_and_excluded() {
        let (negotiator, listings, chain) = harness();
        listings.insert(TrackId::new("trk-1"), listing(1, "vocals"));
        chain.set_listing(
            ListingId(1),
            OnChainListing { seller: ZERO_ADDRESS.to_string(), ..valid_on_chain() },
        );

        let result =
            negotiator.negotiate(input(LicenseType::Personal, 100)).await.expect("negotiate");
        assert!(result.allowed);
        assert!(result.listings.is_empty());
        assert_eq!(listings.get(ListingId(1)).expect("listing").status, ListingStatus::Stale);
    }

    #[tokio::test]
    async fn rpc_failure_excludes_but_does_not_heal() {
        let (negotiator, listings, chain) = harness();
        listings.insert(TrackId::new("trk-1"), listing(1, "vocals"));
        listings.insert(TrackId::new("trk-1"), listing(2, "drums"));
        chain.set_listing(ListingId(1), valid_on_chain());
        chain.fail_listing(ListingId(2));

        let result =
            negotiator.negotiate(input(LicenseType::Personal, 100)).await.expect("negotiate");
        assert!(result.allowed, "lookup failures degrade, never abort");
        assert_eq!(result.listings.len(), 1);
        assert_eq!(result.listings[0].listing_id, ListingId(1));
        assert_eq!(
            listings.get(ListingId(2)).expect("listing").status,
            ListingStatus::Active,
            "ambiguous failures must not be healed",
        );
    }

    #[tokio::test]
    async fn stem_type_preference_filters_confirmed_listings() {
        let (negotiator, listings, chain) = harness();
        listings.insert(TrackId::new("trk-1"), listing(1, "vocals"));
        listings.insert(TrackId::new("trk-1"), listing(2, "drums"));
        chain.set_listing(ListingId(1), valid_on_chain());
        chain.set_listing(ListingId(2), valid_on_chain());

        let mut request = input(LicenseType::Personal, 100);
        request.stem_types = vec![StemType::new("drums")];
        let result = negotiator.negotiate(request).await.expect("negotiate");
        assert_eq!(result.listings.len(), 1);
        assert_eq!(result.listings[0].stem_type, StemType::new("drums"));
    }

    #[tokio::test]
    async fn volume_discount_reaches_the_quote() {
        let (negotiator, _, _) = harness();
        let mut request = input(LicenseType::Remix, 100);
        request.volume_eligible = true;
        let result = negotiator.negotiate(request).await.expect("negotiate");
        // 0.06 * 0.95 = 0.057 → 0.06 at cent precision
        assert_eq!(result.price_usd, Decimal::new(6, 2));
    }
}
