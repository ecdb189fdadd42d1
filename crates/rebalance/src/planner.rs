use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use common::{OrderIntent, TradingPair, MIN_ORDER_VALUE};

use crate::snapshot::{PairValuation, PortfolioSnapshot};

/// Knobs for the rebalance planner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannerSettings {
    /// Differences below this value, in quote currency, are ignored.
    pub min_order_value: Decimal,
    /// Minimum relative drift (0.05 = 5%) before an order is placed.
    /// `None` disables gating.
    pub threshold: Option<Decimal>,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            min_order_value: MIN_ORDER_VALUE,
            threshold: None,
        }
    }
}

/// How far one pair sits from the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drift {
    pub coin: String,
    pub value: Decimal,
    /// `value - target`; positive means over target.
    pub difference: Decimal,
    pub deviation_pct: Decimal,
}

/// Orders that bring every surviving pair back to an equal share.
/// Sells are kept apart from buys so they can be executed first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancePlan {
    pub target_per_coin: Decimal,
    pub sells: Vec<OrderIntent>,
    pub buys: Vec<OrderIntent>,
    pub drifts: Vec<Drift>,
}

impl RebalancePlan {
    pub fn is_empty(&self) -> bool {
        self.sells.is_empty() && self.buys.is_empty()
    }

    pub fn order_count(&self) -> usize {
        self.sells.len() + self.buys.len()
    }
}

/// Result of planning an accumulation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BuyPlan {
    /// One buy per configured pair.
    Orders(Vec<OrderIntent>),
    /// Not enough unreserved quote currency; nothing is bought.
    Shortfall { available: Decimal, required: Decimal },
}

/// Relative distance of `value` from `target`, in percent.
///
/// Over target the difference is measured against the target, under target
/// against the current value. An empty pair is exactly 100% off.
pub fn deviation_pct(value: Decimal, target: Decimal) -> Decimal {
    let base = if value > target { target } else { value };
    if base.is_zero() {
        return Decimal::ONE_HUNDRED;
    }
    (value - target).abs() / base * Decimal::ONE_HUNDRED
}

/// Plan an accumulation cycle: buy `buy_order_value` of every pair, or
/// nothing at all when the unreserved quote balance cannot cover every pair.
///
/// `snapshot` must include the quote-currency balance as its reserve.
pub fn plan_buy(
    snapshot: &PortfolioSnapshot,
    pairs: &[TradingPair],
    reserve_fraction: Decimal,
    buy_order_value: Decimal,
) -> BuyPlan {
    let quote_balance = snapshot.reserve_balance.unwrap_or(Decimal::ZERO);
    let reserved = snapshot.total_value() * reserve_fraction;
    let available = quote_balance - reserved;
    let required = buy_order_value * Decimal::from(pairs.len());

    if available < required {
        return BuyPlan::Shortfall {
            available,
            required,
        };
    }

    BuyPlan::Orders(
        pairs
            .iter()
            .map(|pair| OrderIntent::buy(pair, buy_order_value))
            .collect(),
    )
}

/// Plan a rebalance of every pair in `snapshot` toward an equal share of the
/// pairs value.
pub fn plan_rebalance(snapshot: &PortfolioSnapshot, settings: &PlannerSettings) -> RebalancePlan {
    let Some(target) = snapshot.target_per_coin() else {
        return RebalancePlan {
            target_per_coin: Decimal::ZERO,
            sells: Vec::new(),
            buys: Vec::new(),
            drifts: Vec::new(),
        };
    };

    let mut sells = Vec::new();
    let mut buys = Vec::new();
    let mut drifts = Vec::new();

    for position in &snapshot.positions {
        let value = position.value();
        if value == target {
            continue;
        }

        let difference = (value - target).abs();
        if difference < settings.min_order_value {
            continue;
        }

        let deviation = deviation_pct(value, target);
        drifts.push(Drift {
            coin: position.pair.base_coin.clone(),
            value,
            difference: value - target,
            deviation_pct: deviation,
        });

        if let Some(threshold) = settings.threshold {
            if deviation < threshold * Decimal::ONE_HUNDRED {
                continue;
            }
        }

        if value > target {
            sells.push(sell_intent(position, difference));
        } else {
            buys.push(OrderIntent::buy(&position.pair, difference));
        }
    }

    RebalancePlan {
        target_per_coin: target,
        sells,
        buys,
        drifts,
    }
}

fn sell_intent(position: &PairValuation, difference: Decimal) -> OrderIntent {
    // value > target >= 0 guarantees a positive price here
    let quantity = difference / position.price;
    OrderIntent::sell(&position.pair, quantity, difference)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
