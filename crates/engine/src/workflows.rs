use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

use common::{
    AccountPosition, Config, ExchangeClient, MetricsSink, Result, Task, TradingPair,
};
use rebalance::{
    plan_buy, plan_rebalance, BuyPlan, PairValuation, PlannerSettings, PortfolioSnapshot,
    RebalancePlan,
};

use crate::executor::{Execution, OrderExecutor};

/// Runs one unit of scheduled work. The scheduler only knows this trait.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: Task) -> Result<()>;
}

/// The subset of `Config` the workflows need.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub pairs: Vec<TradingPair>,
    pub quote_currency: String,
    pub account_name: String,
    pub buy_order_value: Decimal,
    pub reserve_fraction: Decimal,
    pub planner: PlannerSettings,
}

impl From<&Config> for WorkflowSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            pairs: cfg.pairs.clone(),
            quote_currency: cfg.quote_currency.clone(),
            account_name: cfg.account_name.clone(),
            buy_order_value: cfg.buy_order_value,
            reserve_fraction: cfg.reserve_fraction,
            planner: PlannerSettings {
                threshold: cfg.rebalance_threshold,
                ..PlannerSettings::default()
            },
        }
    }
}

/// What a snapshot is taken for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Valuation {
    /// Rebalance planning: pairs without a price or a balance are left out
    /// and the quote currency is not counted.
    Rebalance,
    /// Portfolio total: a missing balance counts as zero and the quote
    /// currency balance is included.
    Total,
}

/// What a buy cycle did.
#[derive(Debug, Clone)]
pub enum BuyOutcome {
    Placed(Vec<Execution>),
    Shortfall { available: Decimal, required: Decimal },
}

/// What a rebalance cycle did.
#[derive(Debug, Clone)]
pub struct RebalanceOutcome {
    pub plan: RebalancePlan,
    pub sells: Vec<Execution>,
    pub buys: Vec<Execution>,
    /// Pairs left out because their price or balance was unavailable.
    pub skipped: Vec<TradingPair>,
}

/// The buy, rebalance and metrics workflows, wired to an exchange client and
/// a metrics sink.
pub struct Workflows {
    client: Arc<dyn ExchangeClient>,
    metrics: Arc<dyn MetricsSink>,
    executor: OrderExecutor,
    settings: WorkflowSettings,
}

impl Workflows {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        metrics: Arc<dyn MetricsSink>,
        settings: WorkflowSettings,
    ) -> Self {
        let executor = OrderExecutor::new(client.clone(), settings.quote_currency.clone());
        Self {
            client,
            metrics,
            executor,
            settings,
        }
    }

    /// Replace the executor, e.g. to drop the pause between orders.
    pub fn with_executor(mut self, executor: OrderExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Value every configured pair. A pair without a price is always skipped
    /// with a warning; a missing balance skips it only for rebalancing.
    pub async fn snapshot(&self, valuation: Valuation) -> Result<PortfolioSnapshot> {
        let mut snapshot = PortfolioSnapshot::default();

        for pair in &self.settings.pairs {
            let Some(price) = self.client.price(&pair.instrument).await? else {
                warn!(pair = %pair, "Please check if this pair really exists, skipping it");
                snapshot.skipped.push(pair.clone());
                continue;
            };

            let balance = match self.client.balance(&pair.base_coin).await? {
                Some(balance) => balance,
                None if valuation == Valuation::Rebalance => {
                    warn!(pair = %pair, "No balance data, skipping it");
                    snapshot.skipped.push(pair.clone());
                    continue;
                }
                None => {
                    warn!(coin = %pair.base_coin, "No balance data, assuming 0");
                    Decimal::ZERO
                }
            };

            snapshot
                .positions
                .push(PairValuation::new(pair.clone(), balance, price));
        }

        if valuation == Valuation::Total {
            let quote = &self.settings.quote_currency;
            let reserve = match self.client.balance(quote).await? {
                Some(balance) => balance,
                None => {
                    warn!(coin = %quote, "No balance data for quote currency, assuming 0");
                    Decimal::ZERO
                }
            };
            snapshot = snapshot.with_reserve(reserve);
        }

        Ok(snapshot)
    }

    /// Accumulation: buy a fixed notional of every pair, or nothing when the
    /// unreserved quote balance cannot cover all of them.
    pub async fn buy(&self) -> Result<BuyOutcome> {
        info!("Buy: placing orders...");
        let quote = &self.settings.quote_currency;

        let snapshot = self.snapshot(Valuation::Total).await?;
        let plan = plan_buy(
            &snapshot,
            &self.settings.pairs,
            self.settings.reserve_fraction,
            self.settings.buy_order_value,
        );

        let outcome = match plan {
            BuyPlan::Orders(intents) => BuyOutcome::Placed(self.executor.execute(&intents).await),
            BuyPlan::Shortfall {
                available,
                required,
            } => {
                warn!("Not enough {quote} available (have {available:.4}, need {required:.4})");
                BuyOutcome::Shortfall {
                    available,
                    required,
                }
            }
        };

        match self.snapshot(Valuation::Total).await {
            Ok(after) => info!(
                "Total portfolio value is {:.4} {quote} ({:.4} {quote} available)",
                after.total_value(),
                after.reserve_balance.unwrap_or_default()
            ),
            Err(e) => warn!(error = %e, "Could not compute portfolio value after buying"),
        }

        Ok(outcome)
    }

    /// Rebalance every configured pair toward an equal share of their
    /// combined value. Sells run to completion before any buy is placed.
    pub async fn rebalance(&self) -> Result<RebalanceOutcome> {
        info!("Rebalance: placing orders...");
        let quote = &self.settings.quote_currency;

        let snapshot = self.snapshot(Valuation::Rebalance).await?;
        let plan = plan_rebalance(&snapshot, &self.settings.planner);
        info!("Target per coin is {:.4} {quote}", plan.target_per_coin);

        for drift in &plan.drifts {
            info!(
                "Difference of {} is {:.2} ({:.2}%)",
                drift.coin, drift.difference, drift.deviation_pct
            );
        }

        let sells = self.executor.execute(&plan.sells).await;
        let buys = self.executor.execute(&plan.buys).await;

        if plan.is_empty() {
            info!("No coins were eligible to be rebalanced");
        }

        match self.snapshot(Valuation::Total).await {
            Ok(after) => info!("Total portfolio value is {:.4} {quote}", after.total_value()),
            Err(e) => warn!(error = %e, "Could not compute portfolio value after rebalancing"),
        }

        Ok(RebalanceOutcome {
            plan,
            sells,
            buys,
            skipped: snapshot.skipped,
        })
    }

    /// Push the current account summary to the metrics sink.
    pub async fn refresh_metrics(&self) -> Result<Vec<AccountPosition>> {
        let positions = self.client.account_summary(&self.settings.pairs).await?;
        self.metrics
            .record(&self.settings.account_name, &positions)
            .await;
        Ok(positions)
    }
}

#[async_trait]
impl TaskRunner for Workflows {
    async fn run(&self, task: Task) -> Result<()> {
        match task {
            Task::Buy => self.buy().await.map(|_| ()),
            Task::Rebalance => self.rebalance().await.map(|_| ()),
            Task::RefreshMetrics => self.refresh_metrics().await.map(|_| ()),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
