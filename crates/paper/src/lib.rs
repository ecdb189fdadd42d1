use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{
    AccountPosition, CoinState, Error, ExchangeClient, InstrumentPrecision, OrderIntent,
    OrderResult, OrderSide, Result, SizeKind, TradingPair,
};

/// Precision assumed for instruments that were given a price but no
/// explicit precision.
const DEFAULT_PRECISION: InstrumentPrecision = InstrumentPrecision {
    quote_decimals: 2,
    quantity_decimals: 8,
};

// ─── Dry run ──────────────────────────────────────────────────────────────────

/// Exchange client for dry runs.
///
/// Balances, prices and account data come from the wrapped client. Orders are
/// logged and reported as confirmed, but never sent.
pub struct DryRunClient {
    inner: Arc<dyn ExchangeClient>,
    submitted: Arc<RwLock<Vec<OrderIntent>>>,
}

impl DryRunClient {
    pub fn new(inner: Arc<dyn ExchangeClient>) -> Self {
        info!("DryRunClient initialized, orders will not be sent");
        Self {
            inner,
            submitted: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Orders that would have been placed, in submission order.
    pub async fn submitted(&self) -> Vec<OrderIntent> {
        self.submitted.read().await.clone()
    }
}

#[async_trait]
impl ExchangeClient for DryRunClient {
    async fn balance(&self, coin: &str) -> Result<Option<Decimal>> {
        self.inner.balance(coin).await
    }

    async fn price(&self, instrument: &str) -> Result<Option<Decimal>> {
        self.inner.price(instrument).await
    }

    async fn instrument_precision(&self, instrument: &str) -> Result<InstrumentPrecision> {
        self.inner.instrument_precision(instrument).await
    }

    async fn submit_order(&self, intent: &OrderIntent) -> Result<OrderResult> {
        debug!(
            instrument = %intent.instrument,
            side = %intent.side,
            size = %intent.size,
            "Dry run, order not sent"
        );
        self.submitted.write().await.push(intent.clone());
        Ok(OrderResult {
            confirmed: true,
            http_status: 200,
            reason: "OK (dry run)".to_string(),
            body: String::new(),
        })
    }

    async fn account_summary(&self, pairs: &[TradingPair]) -> Result<Vec<AccountPosition>> {
        self.inner.account_summary(pairs).await
    }

    async fn check_credentials(&self) -> Result<()> {
        self.inner.check_credentials().await
    }
}

// ─── In-memory exchange ───────────────────────────────────────────────────────

/// Fully simulated exchange account.
///
/// Market orders fill instantly at the configured price with no fees.
/// Orders the account cannot afford are rejected with HTTP 400, like the
/// real exchange would.
pub struct PaperExchange {
    quote_currency: String,
    /// Balance per coin.
    balances: RwLock<HashMap<String, Decimal>>,
    /// Latest price per instrument.
    prices: RwLock<HashMap<String, Decimal>>,
    precisions: RwLock<HashMap<String, InstrumentPrecision>>,
    submitted: RwLock<Vec<OrderIntent>>,
}

impl PaperExchange {
    pub fn new(quote_currency: impl Into<String>) -> Self {
        Self {
            quote_currency: quote_currency.into(),
            balances: RwLock::new(HashMap::new()),
            prices: RwLock::new(HashMap::new()),
            precisions: RwLock::new(HashMap::new()),
            submitted: RwLock::new(Vec::new()),
        }
    }

    pub async fn set_balance(&self, coin: &str, amount: Decimal) {
        self.balances.write().await.insert(coin.to_string(), amount);
    }

    pub async fn set_price(&self, instrument: &str, price: Decimal) {
        self.prices.write().await.insert(instrument.to_string(), price);
    }

    pub async fn set_precision(&self, instrument: &str, precision: InstrumentPrecision) {
        self.precisions
            .write()
            .await
            .insert(instrument.to_string(), precision);
    }

    /// Every order that reached `submit_order`, filled or not.
    pub async fn submitted(&self) -> Vec<OrderIntent> {
        self.submitted.read().await.clone()
    }

    fn rejection(message: &str) -> OrderResult {
        OrderResult {
            confirmed: false,
            http_status: 400,
            reason: "Bad Request".to_string(),
            body: json!({ "code": 306, "message": message }).to_string(),
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn balance(&self, coin: &str) -> Result<Option<Decimal>> {
        Ok(self.balances.read().await.get(coin).copied())
    }

    async fn price(&self, instrument: &str) -> Result<Option<Decimal>> {
        Ok(self.prices.read().await.get(instrument).copied())
    }

    async fn instrument_precision(&self, instrument: &str) -> Result<InstrumentPrecision> {
        if let Some(precision) = self.precisions.read().await.get(instrument) {
            return Ok(*precision);
        }
        if self.prices.read().await.contains_key(instrument) {
            return Ok(DEFAULT_PRECISION);
        }
        Err(Error::NotFound(format!("instrument {instrument}")))
    }

    async fn submit_order(&self, intent: &OrderIntent) -> Result<OrderResult> {
        self.submitted.write().await.push(intent.clone());

        let price = self
            .prices
            .read()
            .await
            .get(&intent.instrument)
            .copied()
            .ok_or_else(|| Error::NotFound(format!("instrument {}", intent.instrument)))?;
        if price <= Decimal::ZERO {
            return Ok(Self::rejection("Instrument has no price"));
        }

        let (quote_delta, base_delta) = match (intent.side, intent.size_kind) {
            (OrderSide::Buy, SizeKind::Notional) => (-intent.size, intent.size / price),
            (OrderSide::Buy, SizeKind::Quantity) => (-(intent.size * price), intent.size),
            (OrderSide::Sell, SizeKind::Quantity) => (intent.size * price, -intent.size),
            (OrderSide::Sell, SizeKind::Notional) => (intent.size, -(intent.size / price)),
        };

        let mut balances = self.balances.write().await;
        let quote = balances.get(&self.quote_currency).copied().unwrap_or_default();
        let base = balances.get(&intent.coin).copied().unwrap_or_default();

        if quote + quote_delta < Decimal::ZERO || base + base_delta < Decimal::ZERO {
            debug!(coin = %intent.coin, side = %intent.side, "Paper order rejected, insufficient balance");
            return Ok(Self::rejection("Insufficient balance"));
        }

        balances.insert(self.quote_currency.clone(), quote + quote_delta);
        balances.insert(intent.coin.clone(), base + base_delta);

        debug!(
            coin = %intent.coin,
            side = %intent.side,
            %price,
            quantity = %base_delta.abs(),
            "Paper fill simulated"
        );

        Ok(OrderResult {
            confirmed: true,
            http_status: 200,
            reason: "OK".to_string(),
            body: json!({ "code": 0, "result": { "instrument_name": intent.instrument } })
                .to_string(),
        })
    }

    async fn account_summary(&self, pairs: &[TradingPair]) -> Result<Vec<AccountPosition>> {
        let balances = self.balances.read().await;
        let prices = self.prices.read().await;

        let mut positions: Vec<AccountPosition> = balances
            .iter()
            .filter_map(|(coin, balance)| {
                if *coin == self.quote_currency {
                    return Some(AccountPosition {
                        coin: coin.clone(),
                        balance: *balance,
                        price: Decimal::ONE,
                        state: CoinState::Unmanaged,
                    });
                }
                if *balance <= Decimal::ZERO {
                    return None;
                }
                let price = prices.get(&format!("{coin}_{}", self.quote_currency))?;
                Some(AccountPosition {
                    coin: coin.clone(),
                    balance: *balance,
                    price: *price,
                    state: CoinState::of(coin, pairs),
                })
            })
            .collect();

        positions.sort_by(|a, b| a.coin.cmp(&b.coin));
        Ok(positions)
    }

    async fn check_credentials(&self) -> Result<()> {
        Ok(())
    }
}
