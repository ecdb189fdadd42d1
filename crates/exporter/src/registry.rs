use std::collections::BTreeMap;
use std::fmt::Write;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use common::{AccountPosition, CoinState, MetricsSink};

const STATES: [CoinState; 2] = [CoinState::Managed, CoinState::Unmanaged];

#[derive(Debug, Clone, Copy, PartialEq)]
struct CoinSample {
    balance: Decimal,
    price: Decimal,
    state: CoinState,
}

/// Latest balance, price and management state per (account, coin).
///
/// Series are overwritten on every refresh and never removed, so a coin that
/// was sold off keeps reporting its last values.
#[derive(Default)]
pub struct MetricsRegistry {
    samples: RwLock<BTreeMap<(String, String), CoinSample>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of (account, coin) series currently exported.
    pub async fn series_count(&self) -> usize {
        self.samples.read().await.len()
    }

    /// Prometheus text exposition of every series.
    pub async fn render(&self) -> String {
        let samples = self.samples.read().await;
        let mut out = String::new();

        let _ = writeln!(out, "# HELP coin_balance The amount of coins");
        let _ = writeln!(out, "# TYPE coin_balance gauge");
        for ((account, coin), s) in samples.iter() {
            let _ = writeln!(
                out,
                "coin_balance{} {}",
                labels(coin, account, None),
                s.balance.normalize()
            );
        }

        let _ = writeln!(out, "# HELP coin_price The price of a coin in the quote currency");
        let _ = writeln!(out, "# TYPE coin_price gauge");
        for ((account, coin), s) in samples.iter() {
            let _ = writeln!(
                out,
                "coin_price{} {}",
                labels(coin, account, None),
                s.price.normalize()
            );
        }

        let _ = writeln!(out, "# HELP coin_state The management state of a coin");
        let _ = writeln!(out, "# TYPE coin_state gauge");
        for ((account, coin), s) in samples.iter() {
            for state in STATES {
                let active = if s.state == state { 1 } else { 0 };
                let _ = writeln!(
                    out,
                    "coin_state{} {active}",
                    labels(coin, account, Some(state))
                );
            }
        }

        out
    }
}

fn labels(coin: &str, account: &str, state: Option<CoinState>) -> String {
    let mut set = format!(
        "{{coin=\"{}\",account=\"{}\"",
        escape_label(coin),
        escape_label(account)
    );
    if let Some(state) = state {
        let _ = write!(set, ",coin_state=\"{state}\"");
    }
    set.push('}');
    set
}

/// Backslash, double quote and newline must be escaped inside label values.
fn escape_label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[async_trait]
impl MetricsSink for MetricsRegistry {
    async fn record(&self, account: &str, positions: &[AccountPosition]) {
        let mut samples = self.samples.write().await;
        for p in positions {
            samples.insert(
                (account.to_string(), p.coin.clone()),
                CoinSample {
                    balance: p.balance,
                    price: p.price,
                    state: p.state,
                },
            );
        }
    }
}
