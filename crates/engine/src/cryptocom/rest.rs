use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use common::{
    AccountPosition, CoinState, Error, ExchangeClient, InstrumentPrecision, OrderIntent,
    OrderResult, Result, SizeKind, TradingPair,
};

use super::responses::{
    AccountSummary, ApiResponse, DataList, Instrument, Ticker, UserBalance,
};
use super::signer::RequestSigner;

const V1_BASE_URL: &str = "https://api.crypto.com/exchange/v1";
const V2_BASE_URL: &str = "https://api.crypto.com/v2";

/// Request id used for everything except order creation.
const READ_REQUEST_ID: u64 = 100;

const INVALID_INSTRUMENT: &str = "Invalid instrument_name";

/// REST client for the Crypto.com Exchange. Used for account queries,
/// market data and order placement.
pub struct CryptoComClient {
    signer: RequestSigner,
    http: Client,
    quote_currency: String,
    v1_url: String,
    v2_url: String,
}

/// Status line and body of a response, kept whole for order reporting.
struct RawResponse {
    status: StatusCode,
    body: String,
}

impl CryptoComClient {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(
        api_key: impl Into<String>,
        secret: impl Into<String>,
        quote_currency: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            signer: RequestSigner::new(api_key, secret),
            http,
            quote_currency: quote_currency.into(),
            v1_url: V1_BASE_URL.to_string(),
            v2_url: V2_BASE_URL.to_string(),
        })
    }

    /// Point the client at different API hosts.
    pub fn with_base_urls(mut self, v1: impl Into<String>, v2: impl Into<String>) -> Self {
        self.v1_url = v1.into();
        self.v2_url = v2.into();
        self
    }

    fn nonce() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn order_id() -> u64 {
        Utc::now()
            .timestamp_nanos_opt()
            .map(|n| n as u64)
            .unwrap_or_else(|| Self::nonce() as u64)
    }

    async fn signed_post(
        &self,
        base: &str,
        method: &str,
        id: u64,
        params: &[(&str, String)],
    ) -> Result<RawResponse> {
        let request = self.signer.envelope(method, id, params, Self::nonce());
        let url = format!("{base}/{method}");

        let resp = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Network(e.to_string()))?;
        Ok(RawResponse { status, body })
    }

    async fn public_get(&self, url: &str) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        resp.text().await.map_err(|e| Error::Network(e.to_string()))
    }

    async fn instruments(&self) -> Result<Vec<Instrument>> {
        let body = self
            .public_get(&format!("{}/public/get-instruments", self.v1_url))
            .await?;
        let resp: ApiResponse<DataList<Instrument>> = decode(&body)?;
        resp.result
            .map(|r| r.data)
            .ok_or_else(|| exchange_error("public/get-instruments", resp.code, resp.message))
    }
}

#[async_trait]
impl ExchangeClient for CryptoComClient {
    async fn balance(&self, coin: &str) -> Result<Option<Decimal>> {
        let params = [("currency", coin.to_string())];
        let raw = self
            .signed_post(&self.v1_url, "private/user-balance", READ_REQUEST_ID, &params)
            .await?;
        parse_balance(&raw.body, coin)
    }

    async fn price(&self, instrument: &str) -> Result<Option<Decimal>> {
        let url = format!(
            "{}/public/get-tickers?instrument_name={instrument}",
            self.v1_url
        );
        let body = self.public_get(&url).await?;
        parse_price(&body)
    }

    async fn instrument_precision(&self, instrument: &str) -> Result<InstrumentPrecision> {
        let instruments = self.instruments().await?;
        find_precision(&instruments, instrument)
    }

    async fn submit_order(&self, intent: &OrderIntent) -> Result<OrderResult> {
        let precision = self.instrument_precision(&intent.instrument).await?;
        let size = format_size(intent.size, intent.size_kind, precision);
        let size_field = match intent.size_kind {
            SizeKind::Notional => "notional",
            SizeKind::Quantity => "quantity",
        };

        let params = [
            ("instrument_name", intent.instrument.clone()),
            ("side", intent.side.to_string()),
            ("type", "MARKET".to_string()),
            (size_field, size.clone()),
        ];

        debug!(instrument = %intent.instrument, side = %intent.side, %size, "Submitting order to Crypto.com");
        let raw = self
            .signed_post(&self.v1_url, "private/create-order", Self::order_id(), &params)
            .await?;

        Ok(OrderResult {
            confirmed: raw.status == StatusCode::OK,
            http_status: raw.status.as_u16(),
            reason: raw.status.canonical_reason().unwrap_or_default().to_string(),
            body: raw.body,
        })
    }

    async fn account_summary(&self, pairs: &[TradingPair]) -> Result<Vec<AccountPosition>> {
        let raw = self
            .signed_post(&self.v2_url, "private/get-account-summary", READ_REQUEST_ID, &[])
            .await?;
        if !raw.status.is_success() {
            return Err(Error::Exchange(format!(
                "private/get-account-summary returned HTTP {}: {}",
                raw.status, raw.body
            )));
        }

        let tickers = self
            .public_get(&format!("{}/public/get-ticker", self.v2_url))
            .await?;

        merge_account_summary(&raw.body, &tickers, pairs, &self.quote_currency)
    }

    async fn check_credentials(&self) -> Result<()> {
        let params = [("currency", self.quote_currency.clone())];
        let raw = self
            .signed_post(
                &self.v2_url,
                "private/get-account-summary",
                READ_REQUEST_ID,
                &params,
            )
            .await?;

        if raw.status != StatusCode::OK {
            return Err(Error::Exchange(format!(
                "account probe returned HTTP {}; check that the API key and secret are correct and have the right privileges",
                raw.status
            )));
        }
        Ok(())
    }
}

// ─── Response handling ────────────────────────────────────────────────────────

fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::MalformedResponse(format!("{e}: {body}")))
}

fn exchange_error(endpoint: &str, code: i64, message: Option<String>) -> Error {
    Error::Exchange(format!(
        "{endpoint} failed with code {code}: {}",
        message.unwrap_or_default()
    ))
}

/// Available balance of `coin`: quantity minus reserved quantity.
///
/// Uses the position entry named after the coin. Unnamed entries are taken
/// to be the requested currency and the first one is used. A coin the
/// account does not hold has a zero balance; `None` when the account has no
/// balance data at all.
fn parse_balance(body: &str, coin: &str) -> Result<Option<Decimal>> {
    let resp: ApiResponse<DataList<UserBalance>> = decode(body)?;
    let Some(result) = resp.result else {
        return Err(exchange_error("private/user-balance", resp.code, resp.message));
    };

    let Some(account) = result.data.first() else {
        return Ok(None);
    };

    let positions = &account.position_balances;
    let named = positions.iter().any(|p| p.instrument_name.is_some());
    let entry = if named {
        positions
            .iter()
            .find(|p| p.instrument_name.as_deref() == Some(coin))
    } else {
        positions.first()
    };

    Ok(Some(
        entry.map_or(Decimal::ZERO, |p| p.quantity - p.reserved_qty),
    ))
}

/// Best bid, or the latest trade price when there is no bid.
/// `None` for unknown instruments.
fn parse_price(body: &str) -> Result<Option<Decimal>> {
    let resp: ApiResponse<DataList<Ticker>> = decode(body)?;

    if resp.message.as_deref() == Some(INVALID_INSTRUMENT) {
        return Ok(None);
    }
    let Some(result) = resp.result else {
        return Err(exchange_error("public/get-tickers", resp.code, resp.message));
    };

    Ok(result
        .data
        .first()
        .and_then(|t| t.best_bid.or(t.last_trade)))
}

/// Look up an instrument's precision, retrying with the `USD` symbol when a
/// `USDT` instrument has been migrated.
fn find_precision(instruments: &[Instrument], instrument: &str) -> Result<InstrumentPrecision> {
    let lookup = |symbol: &str| {
        instruments
            .iter()
            .find(|i| i.symbol == symbol)
            .map(|i| InstrumentPrecision {
                quote_decimals: i.quote_decimals,
                quantity_decimals: i.quantity_decimals,
            })
    };

    if let Some(precision) = lookup(instrument) {
        return Ok(precision);
    }

    let fallback = instrument.replace("USDT", "USD");
    if fallback != instrument {
        if let Some(precision) = lookup(&fallback) {
            warn!(%instrument, %fallback, "Instrument not listed, using fallback symbol precision");
            return Ok(precision);
        }
    }

    Err(Error::NotFound(format!("instrument {instrument}")))
}

/// Render an order size with the number of decimals the instrument accepts.
/// Quantities are truncated so a sell never exceeds the holding; notionals
/// are rounded half-to-even.
fn format_size(size: Decimal, kind: SizeKind, precision: InstrumentPrecision) -> String {
    let (dp, strategy) = match kind {
        SizeKind::Notional => (precision.quote_decimals, RoundingStrategy::MidpointNearestEven),
        SizeKind::Quantity => (precision.quantity_decimals, RoundingStrategy::ToZero),
    };
    let rounded = size.round_dp_with_strategy(dp, strategy);
    format!("{:.*}", dp as usize, rounded)
}

/// Combine account balances with the ticker snapshot into positions.
///
/// The quote currency is always listed at price 1. Other coins need a
/// positive balance and a `<COIN>_<QUOTE>` ticker, priced at the latest
/// trade.
fn merge_account_summary(
    summary_body: &str,
    ticker_body: &str,
    pairs: &[TradingPair],
    quote_currency: &str,
) -> Result<Vec<AccountPosition>> {
    let summary: ApiResponse<AccountSummary> = decode(summary_body)?;
    let Some(summary) = summary.result else {
        return Err(exchange_error(
            "private/get-account-summary",
            summary.code,
            summary.message,
        ));
    };

    let tickers: ApiResponse<DataList<Ticker>> = decode(ticker_body)?;
    let tickers = tickers.result.map(|r| r.data).unwrap_or_default();

    let mut accounts = summary.accounts;
    accounts.sort_by(|a, b| a.currency.cmp(&b.currency));

    let mut positions = Vec::new();
    for account in accounts {
        if account.currency == quote_currency {
            positions.push(AccountPosition {
                coin: account.currency,
                balance: account.balance,
                price: Decimal::ONE,
                state: CoinState::Unmanaged,
            });
            continue;
        }
        if account.balance <= Decimal::ZERO {
            continue;
        }

        let instrument = format!("{}_{quote_currency}", account.currency);
        let price = tickers
            .iter()
            .find(|t| t.instrument == instrument)
            .and_then(|t| t.last_trade);

        match price {
            Some(price) => positions.push(AccountPosition {
                state: CoinState::of(&account.currency, pairs),
                coin: account.currency,
                balance: account.balance,
                price,
            }),
            None => debug!(coin = %account.currency, "No ticker for held coin, leaving it out"),
        }
    }

    Ok(positions)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn balance_is_quantity_minus_reserved() {
        let body = r#"{"id":100,"method":"private/user-balance","code":0,"result":{"data":[
            {"total_available_balance":"10","position_balances":[
                {"instrument_name":"USDT","quantity":"150.5","reserved_qty":"0.5"},
                {"instrument_name":"BTC","quantity":"0.01","reserved_qty":"0.002"}
            ]}]}}"#;
        assert_eq!(parse_balance(body, "BTC").unwrap(), Some(dec!(0.008)));
        assert_eq!(parse_balance(body, "USDT").unwrap(), Some(dec!(150)));
    }

    #[test]
    fn coin_missing_from_named_positions_has_zero_balance() {
        let body = r#"{"code":0,"result":{"data":[{"position_balances":[
            {"instrument_name":"USDT","quantity":"150","reserved_qty":"0"}
        ]}]}}"#;
        assert_eq!(parse_balance(body, "ETH").unwrap(), Some(Decimal::ZERO));
        assert_eq!(parse_balance(body, "USDT").unwrap(), Some(dec!(150)));
    }

    #[test]
    fn unnamed_positions_use_the_first_entry() {
        let body = r#"{"code":0,"result":{"data":[{"position_balances":[
            {"quantity":"2.5","reserved_qty":"0.5"}
        ]}]}}"#;
        assert_eq!(parse_balance(body, "BTC").unwrap(), Some(dec!(2)));

        let empty = r#"{"code":0,"result":{"data":[{"position_balances":[]}]}}"#;
        assert_eq!(parse_balance(empty, "BTC").unwrap(), Some(Decimal::ZERO));
    }

    #[test]
    fn empty_balance_data_is_a_soft_miss() {
        let body = r#"{"code":0,"result":{"data":[]}}"#;
        assert_eq!(parse_balance(body, "BTC").unwrap(), None);
    }

    #[test]
    fn balance_error_envelope_is_hard_failure() {
        let body = r#"{"code":40101,"message":"Not authenticated"}"#;
        assert!(matches!(parse_balance(body, "BTC"), Err(Error::Exchange(_))));
        assert!(matches!(parse_balance("<html>", "BTC"), Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn price_prefers_best_bid() {
        let body = r#"{"code":0,"result":{"data":[{"i":"BTC_USDT","b":"50000.1","k":"50001","a":"50000.5"}]}}"#;
        assert_eq!(parse_price(body).unwrap(), Some(dec!(50000.1)));
    }

    #[test]
    fn price_falls_back_to_last_trade_without_bid() {
        let body = r#"{"code":0,"result":{"data":[{"i":"CRO_USDT","b":null,"k":"3.3","a":"3.21"}]}}"#;
        assert_eq!(parse_price(body).unwrap(), Some(dec!(3.21)));
    }

    #[test]
    fn unknown_instrument_has_no_price() {
        let body = r#"{"id":-1,"code":40004,"message":"Invalid instrument_name"}"#;
        assert_eq!(parse_price(body).unwrap(), None);
    }

    fn instruments() -> Vec<Instrument> {
        vec![
            Instrument {
                symbol: "BTC_USDT".into(),
                quote_decimals: 2,
                quantity_decimals: 5,
            },
            Instrument {
                symbol: "HNT_USD".into(),
                quote_decimals: 4,
                quantity_decimals: 2,
            },
        ]
    }

    #[test]
    fn precision_lookup_with_usd_fallback() {
        let direct = find_precision(&instruments(), "BTC_USDT").unwrap();
        assert_eq!(direct.quantity_decimals, 5);

        let migrated = find_precision(&instruments(), "HNT_USDT").unwrap();
        assert_eq!(migrated.quote_decimals, 4);

        assert!(matches!(
            find_precision(&instruments(), "XYZ_USDT"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn sizes_are_formatted_to_instrument_precision() {
        let precision = InstrumentPrecision {
            quote_decimals: 2,
            quantity_decimals: 4,
        };
        assert_eq!(format_size(dec!(50), SizeKind::Notional, precision), "50.00");
        assert_eq!(format_size(dec!(20.125), SizeKind::Notional, precision), "20.12");
        assert_eq!(format_size(dec!(0.123456), SizeKind::Quantity, precision), "0.1234");
        assert_eq!(format_size(dec!(3), SizeKind::Quantity, precision), "3.0000");
    }

    #[test]
    fn account_summary_is_filtered_priced_and_sorted() {
        let summary = r#"{"code":0,"result":{"accounts":[
            {"currency":"ETH","balance":0.5,"available":0.5,"order":0,"stake":0},
            {"currency":"USDT","balance":0,"available":0,"order":0,"stake":0},
            {"currency":"DOGE","balance":0,"available":0,"order":0,"stake":0},
            {"currency":"BTC","balance":0.25,"available":0.25,"order":0,"stake":0},
            {"currency":"XYZ","balance":3,"available":3,"order":0,"stake":0}
        ]}}"#;
        let tickers = r#"{"code":0,"result":{"data":[
            {"i":"BTC_USDT","b":40000,"a":40100},
            {"i":"ETH_USDT","b":2000,"a":2001}
        ]}}"#;
        let pairs = vec![TradingPair::new("BTC", "BTC_USDT")];

        let positions = merge_account_summary(summary, tickers, &pairs, "USDT").unwrap();
        let coins: Vec<&str> = positions.iter().map(|p| p.coin.as_str()).collect();
        assert_eq!(coins, vec!["BTC", "ETH", "USDT"]);

        assert_eq!(positions[0].price, dec!(40100));
        assert_eq!(positions[0].state, CoinState::Managed);
        assert_eq!(positions[1].state, CoinState::Unmanaged);
        assert_eq!(positions[2].price, Decimal::ONE);
        assert_eq!(positions[2].state, CoinState::Unmanaged);
    }
}
