pub mod cryptocom;
pub mod executor;
pub mod lifecycle;
pub mod schedule;
pub mod workflows;

pub use cryptocom::CryptoComClient;
pub use executor::{Execution, OrderExecutor};
pub use lifecycle::{run_once, Scheduler};
pub use schedule::{Cadence, Job, Schedule};
pub use workflows::{
    BuyOutcome, RebalanceOutcome, TaskRunner, Valuation, WorkflowSettings, Workflows,
};
