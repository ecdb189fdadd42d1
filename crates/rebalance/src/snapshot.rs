use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use common::TradingPair;

/// Balance and price of one configured pair at the time of a refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairValuation {
    pub pair: TradingPair,
    pub balance: Decimal,
    pub price: Decimal,
}

impl PairValuation {
    pub fn new(pair: TradingPair, balance: Decimal, price: Decimal) -> Self {
        Self {
            pair,
            balance,
            price,
        }
    }

    /// Value in quote currency.
    pub fn value(&self) -> Decimal {
        self.balance * self.price
    }
}

/// Point-in-time valuation of the managed pairs, optionally with the
/// quote-currency reserve. Rebuilt on every workflow run, never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub positions: Vec<PairValuation>,
    /// Quote-currency balance, when it should count toward the total.
    pub reserve_balance: Option<Decimal>,
    /// Pairs left out of this snapshot because a price or balance was unavailable.
    pub skipped: Vec<TradingPair>,
}

impl PortfolioSnapshot {
    pub fn new(positions: Vec<PairValuation>) -> Self {
        Self {
            positions,
            ..Self::default()
        }
    }

    pub fn with_reserve(mut self, reserve_balance: Decimal) -> Self {
        self.reserve_balance = Some(reserve_balance);
        self
    }

    /// Sum of the managed pairs' values.
    pub fn pairs_value(&self) -> Decimal {
        self.positions.iter().map(PairValuation::value).sum()
    }

    /// Pairs value plus the reserve balance, if one was included.
    pub fn total_value(&self) -> Decimal {
        self.pairs_value() + self.reserve_balance.unwrap_or(Decimal::ZERO)
    }

    /// Equal share of the pairs value each surviving pair should hold.
    /// `None` when no pair survived the lookups.
    pub fn target_per_coin(&self) -> Option<Decimal> {
        if self.positions.is_empty() {
            return None;
        }
        Some(self.pairs_value() / Decimal::from(self.positions.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn valuation(coin: &str, balance: Decimal, price: Decimal) -> PairValuation {
        PairValuation::new(
            TradingPair::new(coin, format!("{coin}_USDT")),
            balance,
            price,
        )
    }

    #[test]
    fn total_includes_reserve_only_when_present() {
        let snapshot = PortfolioSnapshot::new(vec![
            valuation("BTC", dec!(0.002), dec!(50000)),
            valuation("ETH", dec!(0.05), dec!(2000)),
        ]);
        assert_eq!(snapshot.pairs_value(), dec!(200));
        assert_eq!(snapshot.total_value(), dec!(200));

        let snapshot = snapshot.with_reserve(dec!(150));
        assert_eq!(snapshot.total_value(), dec!(350));
        assert_eq!(snapshot.target_per_coin(), Some(dec!(100)));
    }

    #[test]
    fn empty_snapshot_has_no_target() {
        assert_eq!(PortfolioSnapshot::default().target_per_coin(), None);
        assert_eq!(PortfolioSnapshot::default().total_value(), Decimal::ZERO);
    }
}
