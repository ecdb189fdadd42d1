use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Smallest order value, in quote currency, the bot will ever emit.
/// Any computed difference below this is treated as noise.
pub const MIN_ORDER_VALUE: Decimal = dec!(0.25);

/// A configured coin and the exchange instrument it is traded through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair {
    /// Base coin, e.g. "BTC".
    pub base_coin: String,
    /// Exchange instrument symbol, e.g. "BTC_USDT".
    pub instrument: String,
}

impl TradingPair {
    pub fn new(base_coin: impl Into<String>, instrument: impl Into<String>) -> Self {
        Self {
            base_coin: base_coin.into(),
            instrument: instrument.into(),
        }
    }
}

impl std::fmt::Display for TradingPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.base_coin, self.instrument)
    }
}

/// Whether a held coin belongs to the configured pair set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinState {
    Managed,
    Unmanaged,
}

impl CoinState {
    pub fn of(coin: &str, pairs: &[TradingPair]) -> Self {
        if pairs.iter().any(|p| p.base_coin == coin) {
            CoinState::Managed
        } else {
            CoinState::Unmanaged
        }
    }

    pub fn is_managed(&self) -> bool {
        matches!(self, CoinState::Managed)
    }
}

impl std::fmt::Display for CoinState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoinState::Managed => write!(f, "managed"),
            CoinState::Unmanaged => write!(f, "unmanaged"),
        }
    }
}

/// One coin held on the account, as reported by the account summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountPosition {
    pub coin: String,
    pub balance: Decimal,
    /// Price in quote currency.
    pub price: Decimal,
    pub state: CoinState,
}

impl AccountPosition {
    pub fn value(&self) -> Decimal {
        self.balance * self.price
    }
}

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// How the size of a market order is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeKind {
    /// Size is a quote-currency amount to spend.
    Notional,
    /// Size is a base-asset quantity.
    Quantity,
}

/// A market order the bot wants placed. Consumed once, never retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub side: OrderSide,
    pub coin: String,
    pub instrument: String,
    pub size_kind: SizeKind,
    pub size: Decimal,
    /// Order value in quote currency, used for reporting.
    pub display_value: Decimal,
}

impl OrderIntent {
    /// Market buy spending `notional` of the quote currency.
    pub fn buy(pair: &TradingPair, notional: Decimal) -> Self {
        Self {
            side: OrderSide::Buy,
            coin: pair.base_coin.clone(),
            instrument: pair.instrument.clone(),
            size_kind: SizeKind::Notional,
            size: notional,
            display_value: notional,
        }
    }

    /// Market sell of `quantity` base units worth roughly `value`.
    pub fn sell(pair: &TradingPair, quantity: Decimal, value: Decimal) -> Self {
        Self {
            side: OrderSide::Sell,
            coin: pair.base_coin.clone(),
            instrument: pair.instrument.clone(),
            size_kind: SizeKind::Quantity,
            size: quantity,
            display_value: value,
        }
    }
}

/// What the exchange said about a submitted order. Observational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub confirmed: bool,
    pub http_status: u16,
    pub reason: String,
    pub body: String,
}

/// Decimal places an instrument accepts for notional and quantity fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentPrecision {
    pub quote_decimals: u32,
    pub quantity_decimals: u32,
}

/// Whether orders reach the real exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TradingMode {
    Production,
    DryRun,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Production => write!(f, "production"),
            TradingMode::DryRun => write!(f, "dry-run"),
        }
    }
}

/// Units of work the scheduler can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    Buy,
    Rebalance,
    RefreshMetrics,
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::Buy => write!(f, "buy"),
            Task::Rebalance => write!(f, "rebalance"),
            Task::RefreshMetrics => write!(f, "refresh-metrics"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coin_state_follows_configured_pairs() {
        let pairs = vec![TradingPair::new("BTC", "BTC_USDT")];
        assert_eq!(CoinState::of("BTC", &pairs), CoinState::Managed);
        assert_eq!(CoinState::of("DOGE", &pairs), CoinState::Unmanaged);
        assert_eq!(CoinState::of("BTC", &[]), CoinState::Unmanaged);
    }

    #[test]
    fn sell_intent_reports_quote_value() {
        let pair = TradingPair::new("ETH", "ETH_USDT");
        let intent = OrderIntent::sell(&pair, dec!(0.01), dec!(20));
        assert_eq!(intent.size_kind, SizeKind::Quantity);
        assert_eq!(intent.display_value, dec!(20));
        assert_eq!(intent.side.to_string(), "SELL");
    }
}
