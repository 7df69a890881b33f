use std::collections::HashMap;
use std::sync::Mutex;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::events::{AgentEvent, EventBus};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub user_id: String,
    pub balance_usd: Decimal,
    pub monthly_cap_usd: Decimal,
    pub spent_usd: Decimal,
}

impl WalletRecord {
    fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            balance_usd: Decimal::ZERO,
            monthly_cap_usd: Decimal::ZERO,
            spent_usd: Decimal::ZERO,
        }
    }

    pub fn remaining_usd(&self) -> Decimal {
        (self.monthly_cap_usd - self.spent_usd).max(Decimal::ZERO)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetAlertLevel {
    None,
    Warning,
    Critical,
    Exhausted,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpendOutcome {
    pub allowed: bool,
    pub remaining_usd: Decimal,
    /// Alert level computed from the post-debit spend percentage.
    pub alert: BudgetAlertLevel,
}

/// In-memory wallet spend guard. One mutex over the whole store linearizes
/// every check-and-debit per user: both conditions (`balance >= amount`,
/// `spent + amount <= cap`) are evaluated and applied inside a single
/// critical section, so concurrent sessions cannot double-spend.
#[derive(Default)]
pub struct WalletStore {
    wallets: Mutex<HashMap<String, WalletRecord>>,
}

impl WalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fund(&self, user_id: &str, amount_usd: Decimal) -> WalletRecord {
        let mut wallets = self.wallets.lock().unwrap_or_else(|e| e.into_inner());
        let wallet =
            wallets.entry(user_id.to_string()).or_insert_with(|| WalletRecord::empty(user_id));
        wallet.balance_usd += amount_usd;
        wallet.clone()
    }

    pub fn set_monthly_cap(&self, user_id: &str, monthly_cap_usd: Decimal) -> WalletRecord {
        let mut wallets = self.wallets.lock().unwrap_or_else(|e| e.into_inner());
        let wallet =
            wallets.entry(user_id.to_string()).or_insert_with(|| WalletRecord::empty(user_id));
        wallet.monthly_cap_usd = monthly_cap_usd;
        wallet.clone()
    }

    pub fn get(&self, user_id: &str) -> WalletRecord {
        let mut wallets = self.wallets.lock().unwrap_or_else(|e| e.into_inner());
        wallets.entry(user_id.to_string()).or_insert_with(|| WalletRecord::empty(user_id)).clone()
    }

    /// Atomic check-and-debit. On success both the balance debit and the
    /// spend increment happen in the same update.
    pub fn spend(&self, user_id: &str, amount_usd: Decimal) -> SpendOutcome {
        let mut wallets = self.wallets.lock().unwrap_or_else(|e| e.into_inner());
        let wallet =
            wallets.entry(user_id.to_string()).or_insert_with(|| WalletRecord::empty(user_id));

        let over_cap = wallet.spent_usd + amount_usd > wallet.monthly_cap_usd;
        let insufficient = amount_usd > wallet.balance_usd;
        if over_cap || insufficient {
            return SpendOutcome {
                allowed: false,
                remaining_usd: wallet.remaining_usd(),
                alert: alert_level(wallet.spent_usd, wallet.monthly_cap_usd),
            };
        }

        wallet.spent_usd += amount_usd;
        wallet.balance_usd -= amount_usd;
        SpendOutcome {
            allowed: true,
            remaining_usd: wallet.remaining_usd(),
            alert: alert_level(wallet.spent_usd, wallet.monthly_cap_usd),
        }
    }
}

/// Thresholds are inclusive and computed on the post-debit percentage.
pub fn alert_level(spent_usd: Decimal, monthly_cap_usd: Decimal) -> BudgetAlertLevel {
    if monthly_cap_usd <= Decimal::ZERO {
        return BudgetAlertLevel::None;
    }
    let percent = spent_usd / monthly_cap_usd * Decimal::ONE_HUNDRED;
    if percent >= Decimal::ONE_HUNDRED {
        BudgetAlertLevel::Exhausted
    } else if percent >= Decimal::new(95, 0) {
        BudgetAlertLevel::Critical
    } else if percent >= Decimal::new(80, 0) {
        BudgetAlertLevel::Warning
    } else {
        BudgetAlertLevel::None
    }
}

/// Publish `agent.budget_alert` when the wallet has crossed a threshold.
pub fn emit_budget_alert(bus: &EventBus, wallet: &WalletRecord) {
    let level = alert_level(wallet.spent_usd, wallet.monthly_cap_usd);
    if level == BudgetAlertLevel::None {
        return;
    }
    let percent_used = (wallet.spent_usd / wallet.monthly_cap_usd * Decimal::ONE_HUNDRED)
        .round()
        .to_u32()
        .unwrap_or(u32::MAX);
    bus.publish(AgentEvent::BudgetAlert {
        user_id: wallet.user_id.clone(),
        level,
        percent_used,
        spent_usd: wallet.spent_usd,
        monthly_cap_usd: wallet.monthly_cap_usd,
        remaining_usd: wallet.remaining_usd(),
    });
}
