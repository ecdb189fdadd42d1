//! Order planning for the accumulate and rebalance workflows.
//!
//! Everything here is a pure function of a [`PortfolioSnapshot`]: no network,
//! no clock. The engine crate gathers balances and prices, hands them over,
//! and executes whatever plan comes back.

pub mod planner;
pub mod snapshot;

pub use planner::{
    deviation_pct, plan_buy, plan_rebalance, BuyPlan, Drift, PlannerSettings, RebalancePlan,
};
pub use snapshot::{PairValuation, PortfolioSnapshot};
