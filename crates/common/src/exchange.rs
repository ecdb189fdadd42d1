use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::{AccountPosition, InstrumentPrecision, OrderIntent, OrderResult, Result, TradingPair};

/// Abstraction over the exchange account.
///
/// `CryptoComClient` implements this against the live REST API.
/// `DryRunClient` and `PaperExchange` implement it for dry runs and tests.
///
/// Business-level misses (unknown instrument, no balance entry) come back as
/// `Ok(None)`. `Err` is reserved for transport failures and bodies that do
/// not match the expected schema.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Available (unreserved) balance of a coin.
    async fn balance(&self, coin: &str) -> Result<Option<Decimal>>;

    /// Best bid for an instrument, falling back to the latest trade price.
    async fn price(&self, instrument: &str) -> Result<Option<Decimal>>;

    /// Decimal places accepted by an instrument's order fields.
    async fn instrument_precision(&self, instrument: &str) -> Result<InstrumentPrecision>;

    /// Submit a market order. A rejected order is an `Ok` with
    /// `confirmed == false`.
    async fn submit_order(&self, intent: &OrderIntent) -> Result<OrderResult>;

    /// Every held coin with a positive balance (plus the quote currency),
    /// priced in quote currency and sorted by coin.
    async fn account_summary(&self, pairs: &[TradingPair]) -> Result<Vec<AccountPosition>>;

    /// Signed probe used at startup to confirm the credentials work.
    async fn check_credentials(&self) -> Result<()>;
}
