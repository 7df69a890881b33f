use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::license::LicenseType;

/// Fixed multiplier schedule for per-play licensing. Values mirror the
/// marketplace defaults; they can be overridden from configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingSchedule {
    pub base_play_price_usd: Decimal,
    pub remix_multiplier: Decimal,
    pub commercial_multiplier: Decimal,
    pub volume_discount_percent: Decimal,
    pub floor_usd: Decimal,
    pub ceiling_usd: Decimal,
}

impl Default for PricingSchedule {
    fn default() -> Self {
        Self {
            base_play_price_usd: Decimal::new(2, 2),
            remix_multiplier: Decimal::new(3, 0),
            commercial_multiplier: Decimal::new(5, 0),
            volume_discount_percent: Decimal::new(5, 0),
            floor_usd: Decimal::new(1, 2),
            ceiling_usd: Decimal::ONE,
        }
    }
}

/// Quote a license price: base × license multiplier, volume discount when
/// the caller's history qualifies, clamped to [floor, ceiling], rounded to
/// cents.
pub fn quote_price(
    license_type: LicenseType,
    schedule: &PricingSchedule,
    volume_eligible: bool,
) -> Decimal {
    let mut price = schedule.base_play_price_usd;
    match license_type {
        LicenseType::Personal => {}
        LicenseType::Remix => price *= schedule.remix_multiplier,
        LicenseType::Commercial => price *= schedule.commercial_multiplier,
    }

    if volume_eligible {
        price *= Decimal::ONE - schedule.volume_discount_percent / Decimal::ONE_HUNDRED;
    }

    if price < schedule.floor_usd {
        return schedule.floor_usd;
    }
    if price > schedule.ceiling_usd {
        return schedule.ceiling_usd;
    }
    price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
