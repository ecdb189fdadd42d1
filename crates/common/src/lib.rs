pub mod config;
pub mod error;
pub mod exchange;
pub mod metrics;
pub mod types;

pub use config::{Config, ConfigErrors};
pub use error::{Error, Result};
pub use exchange::ExchangeClient;
pub use metrics::{MetricsSink, NoopMetrics};
pub use types::*;
