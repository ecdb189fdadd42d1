use proptest::prelude::*;
use rust_decimal::Decimal;

use common::{OrderSide, SizeKind, TradingPair, MIN_ORDER_VALUE};
use rebalance::{
    deviation_pct, plan_buy, plan_rebalance, BuyPlan, PairValuation, PlannerSettings,
    PortfolioSnapshot,
};

/// Balances with 4 decimals, prices with 2, both strictly positive.
fn holdings() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0i64..50_000_000, 1i64..10_000_000), 1..8)
}

fn snapshot_from(holdings: &[(i64, i64)]) -> PortfolioSnapshot {
    PortfolioSnapshot::new(
        holdings
            .iter()
            .enumerate()
            .map(|(i, (balance, price))| {
                PairValuation::new(
                    TradingPair::new(format!("C{i}"), format!("C{i}_USDT")),
                    Decimal::new(*balance, 4),
                    Decimal::new(*price, 2),
                )
            })
            .collect(),
    )
}

proptest! {
    /// Without gating, what the plan sells and what it buys differ by at most
    /// the differences that fell under the floor.
    #[test]
    fn plan_neither_creates_nor_destroys_value(h in holdings()) {
        let snapshot = snapshot_from(&h);
        let plan = plan_rebalance(&snapshot, &PlannerSettings::default());

        let sold: Decimal = plan.sells.iter().map(|o| o.display_value).sum();
        let bought: Decimal = plan.buys.iter().map(|o| o.display_value).sum();
        let slack = MIN_ORDER_VALUE * Decimal::from(h.len());

        prop_assert!((sold - bought).abs() <= slack, "sold {} bought {} slack {}", sold, bought, slack);
    }

    /// No order is ever worth less than the minimum order value.
    #[test]
    fn no_intent_below_floor(h in holdings(), t in prop::option::of(1i64..50)) {
        let settings = PlannerSettings {
            threshold: t.map(|pct| Decimal::new(pct, 2)),
            ..PlannerSettings::default()
        };
        let plan = plan_rebalance(&snapshot_from(&h), &settings);

        for intent in plan.sells.iter().chain(plan.buys.iter()) {
            prop_assert!(intent.display_value >= MIN_ORDER_VALUE);
            prop_assert!(intent.size > Decimal::ZERO);
        }
    }

    /// With a threshold every emitted order clears it; without one, every
    /// pair off target by at least the floor gets an order.
    #[test]
    fn threshold_gating(h in holdings(), pct in 1i64..50) {
        let snapshot = snapshot_from(&h);
        let target = snapshot.target_per_coin().unwrap();

        let gated = plan_rebalance(&snapshot, &PlannerSettings {
            threshold: Some(Decimal::new(pct, 2)),
            ..PlannerSettings::default()
        });
        for intent in gated.sells.iter().chain(gated.buys.iter()) {
            let position = snapshot.positions.iter().find(|p| p.pair.base_coin == intent.coin).unwrap();
            prop_assert!(deviation_pct(position.value(), target) >= Decimal::from(pct));
        }

        let ungated = plan_rebalance(&snapshot, &PlannerSettings::default());
        let eligible = snapshot
            .positions
            .iter()
            .filter(|p| (p.value() - target).abs() >= MIN_ORDER_VALUE)
            .count();
        prop_assert_eq!(ungated.order_count(), eligible);
    }

    /// Sells and buys never end up in each other's list.
    #[test]
    fn sells_and_buys_are_separated(h in holdings()) {
        let plan = plan_rebalance(&snapshot_from(&h), &PlannerSettings::default());
        prop_assert!(plan.sells.iter().all(|o| o.side == OrderSide::Sell && o.size_kind == SizeKind::Quantity));
        prop_assert!(plan.buys.iter().all(|o| o.side == OrderSide::Buy && o.size_kind == SizeKind::Notional));
    }

    /// An underfunded buy cycle places nothing; a funded one places one order per pair.
    #[test]
    fn buy_is_all_or_nothing(
        h in holdings(),
        quote in 0i64..1_000_000,
        reserve_pct in 0i64..=80,
        order_value in 25i64..10_000,
    ) {
        let snapshot = snapshot_from(&h).with_reserve(Decimal::new(quote, 2));
        let pairs: Vec<TradingPair> = snapshot.positions.iter().map(|p| p.pair.clone()).collect();
        let reserve = Decimal::new(reserve_pct, 2);
        let order_value = Decimal::new(order_value, 2);

        let available = Decimal::new(quote, 2) - snapshot.total_value() * reserve;
        let required = order_value * Decimal::from(pairs.len());

        match plan_buy(&snapshot, &pairs, reserve, order_value) {
            BuyPlan::Orders(orders) => {
                prop_assert!(available >= required);
                prop_assert_eq!(orders.len(), pairs.len());
                prop_assert!(orders.iter().all(|o| o.size == order_value));
            }
            BuyPlan::Shortfall { .. } => prop_assert!(available < required),
        }
    }
}
