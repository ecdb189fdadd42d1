//! Response schemas for the Crypto.com REST endpoints the bot uses.
//!
//! Only the fields the bot reads are modelled; serde ignores the rest.

use rust_decimal::Decimal;
use serde::Deserialize;

/// Envelope shared by every endpoint. Errors carry a non-zero `code` and a
/// `message`, usually without a `result`.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    pub result: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct DataList<T> {
    #[serde(default)]
    pub data: Vec<T>,
}

/// `private/user-balance` entry.
#[derive(Debug, Deserialize)]
pub struct UserBalance {
    #[serde(default)]
    pub position_balances: Vec<PositionBalance>,
}

#[derive(Debug, Deserialize)]
pub struct PositionBalance {
    #[serde(default)]
    pub instrument_name: Option<String>,
    pub quantity: Decimal,
    #[serde(default)]
    pub reserved_qty: Decimal,
}

/// `public/get-tickers` (v1) and `public/get-ticker` (v2) entry.
#[derive(Debug, Deserialize)]
pub struct Ticker {
    #[serde(rename = "i")]
    pub instrument: String,
    #[serde(rename = "b", default)]
    pub best_bid: Option<Decimal>,
    #[serde(rename = "a", default)]
    pub last_trade: Option<Decimal>,
}

/// `public/get-instruments` entry.
#[derive(Debug, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub quote_decimals: u32,
    pub quantity_decimals: u32,
}

/// `private/get-account-summary` (v2) result.
#[derive(Debug, Deserialize)]
pub struct AccountSummary {
    #[serde(default)]
    pub accounts: Vec<CurrencyAccount>,
}

#[derive(Debug, Deserialize)]
pub struct CurrencyAccount {
    pub currency: String,
    pub balance: Decimal,
}
