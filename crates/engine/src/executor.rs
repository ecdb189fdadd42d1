use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use common::{ExchangeClient, OrderIntent, OrderResult};

/// Pause after each submitted order.
pub const ORDER_SPACING: Duration = Duration::from_millis(100);

/// One intent and what happened to it.
#[derive(Debug, Clone)]
pub struct Execution {
    pub intent: OrderIntent,
    /// `None` when the request never got a response.
    pub result: Option<OrderResult>,
}

impl Execution {
    pub fn confirmed(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.confirmed)
    }
}

/// Submits planned orders to the exchange, one at a time and in order.
///
/// Every intent gets exactly one attempt. A rejection or transport failure is
/// logged and the next intent is still submitted.
pub struct OrderExecutor {
    client: Arc<dyn ExchangeClient>,
    quote_currency: String,
    spacing: Duration,
}

impl OrderExecutor {
    pub fn new(client: Arc<dyn ExchangeClient>, quote_currency: impl Into<String>) -> Self {
        Self {
            client,
            quote_currency: quote_currency.into(),
            spacing: ORDER_SPACING,
        }
    }

    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.spacing = spacing;
        self
    }

    /// Submit `intents` sequentially. The returned executions keep the input
    /// order.
    pub async fn execute(&self, intents: &[OrderIntent]) -> Vec<Execution> {
        let mut executions = Vec::with_capacity(intents.len());

        for intent in intents {
            let result = match self.client.submit_order(intent).await {
                Ok(result) => {
                    info!(
                        "[{}] {:.2} {} - {}",
                        intent.side, intent.display_value, self.quote_currency, intent.coin
                    );
                    if !result.confirmed {
                        error!(
                            coin = %intent.coin,
                            status = result.http_status,
                            reason = %result.reason,
                            body = %result.body,
                            "Order was not confirmed"
                        );
                    }
                    Some(result)
                }
                Err(e) => {
                    error!(coin = %intent.coin, side = %intent.side, error = %e, "Order submission failed");
                    None
                }
            };

            executions.push(Execution {
                intent: intent.clone(),
                result,
            });

            if !self.spacing.is_zero() {
                tokio::time::sleep(self.spacing).await;
            }
        }

        executions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::TradingPair;
    use paper::PaperExchange;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn executes_every_intent_in_order() {
        let exchange = Arc::new(PaperExchange::new("USDT"));
        exchange.set_balance("USDT", dec!(100)).await;
        exchange.set_price("BTC_USDT", dec!(50000)).await;
        exchange.set_price("ETH_USDT", dec!(2000)).await;

        let executor = OrderExecutor::new(exchange.clone(), "USDT").with_spacing(Duration::ZERO);
        let intents = vec![
            OrderIntent::buy(&TradingPair::new("BTC", "BTC_USDT"), dec!(10)),
            OrderIntent::buy(&TradingPair::new("ETH", "ETH_USDT"), dec!(20)),
        ];

        let executions = executor.execute(&intents).await;
        assert_eq!(executions.len(), 2);
        assert!(executions.iter().all(Execution::confirmed));
        assert_eq!(executions[1].intent.coin, "ETH");
        assert_eq!(exchange.submitted().await.len(), 2);
    }

    #[tokio::test]
    async fn rejected_order_does_not_stop_the_batch() {
        let exchange = Arc::new(PaperExchange::new("USDT"));
        exchange.set_balance("USDT", dec!(15)).await;
        exchange.set_price("BTC_USDT", dec!(50000)).await;
        exchange.set_price("ETH_USDT", dec!(2000)).await;

        let executor = OrderExecutor::new(exchange.clone(), "USDT").with_spacing(Duration::ZERO);
        let intents = vec![
            // more than the paper account holds
            OrderIntent::buy(&TradingPair::new("BTC", "BTC_USDT"), dec!(20)),
            OrderIntent::buy(&TradingPair::new("ETH", "ETH_USDT"), dec!(10)),
        ];

        let executions = executor.execute(&intents).await;
        assert!(!executions[0].confirmed());
        assert_eq!(executions[0].result.as_ref().unwrap().http_status, 400);
        assert!(executions[1].confirmed());
    }

    #[tokio::test]
    async fn transport_failure_is_recorded_without_result() {
        let exchange = Arc::new(PaperExchange::new("USDT"));
        // no price configured for the instrument => submit_order errors
        let executor = OrderExecutor::new(exchange, "USDT").with_spacing(Duration::ZERO);
        let intents = vec![OrderIntent::buy(&TradingPair::new("BTC", "BTC_USDT"), dec!(1))];

        let executions = executor.execute(&intents).await;
        assert!(executions[0].result.is_none());
        assert!(!executions[0].confirmed());
    }
}
