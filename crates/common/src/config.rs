use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

use crate::{TradingMode, TradingPair, MIN_ORDER_VALUE};

/// Largest share of the portfolio that may be held back as reserve.
pub const MAX_RESERVE_FRACTION: Decimal = dec!(0.8);

const DEFAULT_QUOTE_CURRENCY: &str = "USDT";
const DEFAULT_ACCOUNT_NAME: &str = "main";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_METRICS_PORT: u16 = 19000;

/// Every problem found while validating the environment.
#[derive(Debug, Error)]
#[error("invalid configuration: {}", .0.join("; "))]
pub struct ConfigErrors(pub Vec<String>);

/// All settings, validated once at startup. Nothing downstream reads the
/// environment directly.
#[derive(Clone)]
pub struct Config {
    pub trading_mode: TradingMode,

    // Exchange credentials
    pub api_key: String,
    pub api_secret: String,

    // Portfolio
    pub pairs: Vec<TradingPair>,
    pub quote_currency: String,
    pub account_name: String,

    // Scheduling, in hours. A rebalance frequency of 0 disables rebalancing.
    pub buy_frequency_hours: u32,
    pub rebalance_frequency_hours: u32,

    // Order sizing
    pub buy_order_value: Decimal,
    /// Fraction of total portfolio value kept in the quote currency.
    pub reserve_fraction: Decimal,
    /// Minimum relative drift before a rebalance order is placed.
    /// `None` disables gating.
    pub rebalance_threshold: Option<Decimal>,

    // Plumbing
    pub http_timeout: Duration,
    pub metrics_port: u16,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("trading_mode", &self.trading_mode)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("pairs", &self.pairs)
            .field("quote_currency", &self.quote_currency)
            .field("account_name", &self.account_name)
            .field("buy_frequency_hours", &self.buy_frequency_hours)
            .field("rebalance_frequency_hours", &self.rebalance_frequency_hours)
            .field("buy_order_value", &self.buy_order_value)
            .field("reserve_fraction", &self.reserve_fraction)
            .field("rebalance_threshold", &self.rebalance_threshold)
            .field("http_timeout", &self.http_timeout)
            .field("metrics_port", &self.metrics_port)
            .finish()
    }
}

impl Config {
    /// Load and validate configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self, ConfigErrors> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Validate configuration read through `lookup`. Collects every violation
    /// instead of stopping at the first.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigErrors>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = EnvReader::new(lookup);

        let trading_mode = env.required("ENVIRONMENT").and_then(|raw| {
            match raw.to_lowercase().as_str() {
                "production" => Some(TradingMode::Production),
                "dry-run" | "dryrun" | "dry_run" | "test" => Some(TradingMode::DryRun),
                other => env.violation(format!(
                    "ENVIRONMENT must be 'production' or 'dry-run', got: '{other}'"
                )),
            }
        });

        let api_key = env.required("API_KEY");
        let api_secret = env.required("API_SECRET");

        let quote_currency = env
            .optional("QUOTE_CURRENCY")
            .map(|q| q.to_uppercase())
            .unwrap_or_else(|| DEFAULT_QUOTE_CURRENCY.to_string());
        let account_name = env
            .optional("ACCOUNT_NAME")
            .unwrap_or_else(|| DEFAULT_ACCOUNT_NAME.to_string());

        let pairs = env
            .required("TRADING_PAIRS")
            .and_then(|raw| match parse_pairs(&raw) {
                Ok(pairs) if pairs.is_empty() => {
                    env.violation("TRADING_PAIRS must contain at least one pair".to_string())
                }
                Ok(pairs) => Some(pairs),
                Err(e) => env.violation(e),
            });

        let buy_frequency_hours = env
            .required_parsed::<u32>("BUY_FREQUENCY_HOURS")
            .and_then(|h| {
                if h < 1 {
                    env.violation("BUY_FREQUENCY_HOURS must be at least 1 hour".to_string())
                } else {
                    Some(h)
                }
            });

        // u32 already rules out negative values
        let rebalance_frequency_hours = env.required_parsed::<u32>("REBALANCE_FREQUENCY_HOURS");

        let buy_order_value = env
            .required_parsed::<Decimal>("BUY_ORDER_VALUE")
            .and_then(|v| {
                if v < MIN_ORDER_VALUE {
                    env.violation(format!(
                        "BUY_ORDER_VALUE cannot be smaller than the minimum order value ({MIN_ORDER_VALUE})"
                    ))
                } else {
                    Some(v)
                }
            });

        let reserve_fraction = env
            .required_parsed::<Decimal>("RESERVE_FRACTION")
            .and_then(|r| {
                if r < Decimal::ZERO {
                    env.violation(
                        "RESERVE_FRACTION cannot be negative; use 0 for no reserve".to_string(),
                    )
                } else if r > MAX_RESERVE_FRACTION {
                    env.violation(format!(
                        "RESERVE_FRACTION must be {MAX_RESERVE_FRACTION} or lower"
                    ))
                } else {
                    Some(r)
                }
            });

        let rebalance_threshold = match env.optional_parsed::<Decimal>("REBALANCE_THRESHOLD") {
            Some(t) if t < Decimal::ZERO => {
                env.violation::<()>("REBALANCE_THRESHOLD cannot be negative".to_string());
                None
            }
            Some(t) if t.is_zero() => None,
            other => other,
        };

        let http_timeout_secs = env
            .optional_parsed::<u64>("HTTP_TIMEOUT_SECS")
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);
        if http_timeout_secs < 1 {
            env.violation::<()>("HTTP_TIMEOUT_SECS must be at least 1".to_string());
        }

        let metrics_port = env
            .optional_parsed::<u16>("METRICS_PORT")
            .unwrap_or(DEFAULT_METRICS_PORT);

        match (
            trading_mode,
            api_key,
            api_secret,
            pairs,
            buy_frequency_hours,
            rebalance_frequency_hours,
            buy_order_value,
            reserve_fraction,
        ) {
            (
                Some(trading_mode),
                Some(api_key),
                Some(api_secret),
                Some(pairs),
                Some(buy_frequency_hours),
                Some(rebalance_frequency_hours),
                Some(buy_order_value),
                Some(reserve_fraction),
            ) if env.violations.is_empty() => Ok(Config {
                trading_mode,
                api_key,
                api_secret,
                pairs,
                quote_currency,
                account_name,
                buy_frequency_hours,
                rebalance_frequency_hours,
                buy_order_value,
                reserve_fraction,
                rebalance_threshold,
                http_timeout: Duration::from_secs(http_timeout_secs),
                metrics_port,
            }),
            _ => Err(ConfigErrors(env.violations)),
        }
    }

    /// True when the rebalance workflow should be scheduled.
    pub fn rebalance_enabled(&self) -> bool {
        self.rebalance_frequency_hours > 0
    }
}

/// Parse `TRADING_PAIRS`: a comma separated list of instruments
/// (`BTC_USDT`) or explicit `COIN:INSTRUMENT` entries.
pub fn parse_pairs(raw: &str) -> Result<Vec<TradingPair>, String> {
    let mut pairs: Vec<TradingPair> = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let pair = match entry.split_once(':') {
            Some((coin, instrument)) => {
                TradingPair::new(coin.trim().to_uppercase(), instrument.trim().to_uppercase())
            }
            None => match entry.split_once('_') {
                Some((coin, _)) if !coin.is_empty() => {
                    TradingPair::new(coin.to_uppercase(), entry.to_uppercase())
                }
                _ => {
                    return Err(format!(
                        "TRADING_PAIRS entry '{entry}' must look like BTC_USDT or BTC:BTC_USDT"
                    ))
                }
            },
        };

        if pair.base_coin.is_empty() || pair.instrument.is_empty() {
            return Err(format!("TRADING_PAIRS entry '{entry}' is incomplete"));
        }
        if pairs.iter().any(|p| p.instrument == pair.instrument) {
            return Err(format!("TRADING_PAIRS lists '{}' more than once", pair.instrument));
        }
        pairs.push(pair);
    }

    Ok(pairs)
}

struct EnvReader<F> {
    lookup: F,
    violations: Vec<String>,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn new(lookup: F) -> Self {
        Self {
            lookup,
            violations: Vec::new(),
        }
    }

    fn violation<T>(&mut self, message: String) -> Option<T> {
        self.violations.push(message);
        None
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&mut self, key: &str) -> Option<String> {
        match self.optional(key) {
            Some(v) => Some(v),
            None => self.violation(format!("Required environment variable '{key}' is not set")),
        }
    }

    fn parse<T>(&mut self, key: &str, raw: String) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match raw.parse::<T>() {
            Ok(v) => Some(v),
            Err(e) => self.violation(format!("{key} has an invalid value '{raw}': {e}")),
        }
    }

    fn required_parsed<T>(&mut self, key: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.required(key)?;
        self.parse(key, raw)
    }

    fn optional_parsed<T>(&mut self, key: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let raw = self.optional(key)?;
        self.parse(key, raw)
    }
}
