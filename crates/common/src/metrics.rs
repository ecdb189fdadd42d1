use async_trait::async_trait;

use crate::AccountPosition;

/// Destination for the per-coin balance, price and state observed on every
/// metrics refresh. Values overwrite the previous observation.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn record(&self, account: &str, positions: &[AccountPosition]);
}

/// Sink that drops everything. Used by one-shot runs.
pub struct NoopMetrics;

#[async_trait]
impl MetricsSink for NoopMetrics {
    async fn record(&self, _account: &str, _positions: &[AccountPosition]) {}
}
