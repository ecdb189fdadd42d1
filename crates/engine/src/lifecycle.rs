use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::watch;
use tracing::{error, info};

use common::{Result, Task};

use crate::schedule::Schedule;
use crate::workflows::TaskRunner;

/// How often the scheduler looks for due jobs.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Drives the recurring jobs until shutdown.
///
/// Jobs run one at a time on the scheduler's task, so two workflows never
/// overlap. A job that overruns simply delays the next poll.
pub struct Scheduler<R: TaskRunner> {
    runner: R,
    schedule: Schedule,
    clock: Clock,
    poll_interval: Duration,
}

impl<R: TaskRunner> Scheduler<R> {
    pub fn new(runner: R, schedule: Schedule) -> Self {
        Self {
            runner,
            schedule,
            clock: Box::new(|| Local::now().naive_local()),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDateTime + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Run every job due now. Failures are logged and the job is rescheduled
    /// as if it had succeeded. Returns the tasks that ran, in order.
    pub async fn run_pending(&mut self) -> Vec<Task> {
        let mut ran = Vec::new();

        for index in self.schedule.due((self.clock)()) {
            let task = self.schedule.jobs()[index].task;
            info!(%task, "Running scheduled job");

            if let Err(e) = self.runner.run(task).await {
                error!(%task, error = %e, "Scheduled job failed");
            }

            self.schedule.mark_ran(index, (self.clock)());
            ran.push(task);
        }

        ran
    }

    /// Poll until `shutdown` flips to `true` or its sender goes away. A job
    /// already running is allowed to finish.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        for job in self.schedule.jobs() {
            info!(task = %job.task, next_run = %job.next_run, "Job scheduled");
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received, scheduler stopping");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    self.run_pending().await;
                }
            }
        }
    }
}

/// Run a single task immediately, outside any schedule.
pub async fn run_once<R: TaskRunner + ?Sized>(runner: &R, task: Task) -> Result<()> {
    info!(%task, "Running task once");
    runner.run(task).await
}
