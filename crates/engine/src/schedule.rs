use chrono::{Duration, NaiveDateTime, Timelike};

use common::{Config, Task};

/// Minute past the hour at which buy cycles fire.
pub const BUY_AT_MINUTE: u32 = 30;
/// Minute past the hour at which rebalance cycles fire.
pub const REBALANCE_AT_MINUTE: u32 = 0;
/// Minutes between metrics refreshes.
pub const METRICS_EVERY_MINUTES: u32 = 5;

/// How often a job repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Every `every` hours, on minute `at_minute` of the hour.
    Hours { every: u32, at_minute: u32 },
    /// Every `every` minutes, counted from the previous run.
    Minutes { every: u32 },
}

/// A recurring task and when it is next due. Times are wall-clock local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub task: Task,
    pub cadence: Cadence,
    pub next_run: NaiveDateTime,
    pub last_run: Option<NaiveDateTime>,
}

impl Job {
    pub fn new(task: Task, cadence: Cadence, now: NaiveDateTime) -> Self {
        let mut job = Self {
            task,
            cadence,
            next_run: now,
            last_run: None,
        };
        job.next_run = job.next_after(now);
        job
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now >= self.next_run
    }

    /// Record a completed run and schedule the next one from `finished_at`.
    pub fn mark_ran(&mut self, finished_at: NaiveDateTime) {
        self.last_run = Some(finished_at);
        self.next_run = self.next_after(finished_at);
    }

    fn next_after(&self, now: NaiveDateTime) -> NaiveDateTime {
        match self.cadence {
            Cadence::Minutes { every } => now + Duration::minutes(i64::from(every)),
            Cadence::Hours { every, at_minute } => {
                let next = on_minute(now + Duration::hours(i64::from(every)), at_minute);
                // A job that has never run may fire later in the current hour.
                if self.last_run.is_none() && at_minute > now.minute() {
                    next - Duration::hours(1)
                } else {
                    next
                }
            }
        }
    }
}

/// `t` moved to minute `minute` of the same hour, seconds cleared.
fn on_minute(t: NaiveDateTime, minute: u32) -> NaiveDateTime {
    let within_hour = Duration::minutes(i64::from(t.minute()))
        + Duration::seconds(i64::from(t.second()))
        + Duration::nanoseconds(i64::from(t.nanosecond()));
    t - within_hour + Duration::minutes(i64::from(minute % 60))
}

/// The bot's recurring jobs.
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    jobs: Vec<Job>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buy every `buy_frequency_hours` at :30, rebalance every
    /// `rebalance_frequency_hours` at :00 (unless disabled) and refresh
    /// metrics every five minutes.
    pub fn from_config(cfg: &Config, now: NaiveDateTime) -> Self {
        let mut schedule = Self::new();
        schedule.add(Job::new(
            Task::Buy,
            Cadence::Hours {
                every: cfg.buy_frequency_hours,
                at_minute: BUY_AT_MINUTE,
            },
            now,
        ));
        if cfg.rebalance_enabled() {
            schedule.add(Job::new(
                Task::Rebalance,
                Cadence::Hours {
                    every: cfg.rebalance_frequency_hours,
                    at_minute: REBALANCE_AT_MINUTE,
                },
                now,
            ));
        }
        schedule.add(Job::new(
            Task::RefreshMetrics,
            Cadence::Minutes {
                every: METRICS_EVERY_MINUTES,
            },
            now,
        ));
        schedule
    }

    pub fn add(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Indices of the jobs due at `now`, earliest `next_run` first. Ties keep
    /// registration order.
    pub fn due(&self, now: NaiveDateTime) -> Vec<usize> {
        let mut due: Vec<usize> = (0..self.jobs.len())
            .filter(|&i| self.jobs[i].is_due(now))
            .collect();
        due.sort_by_key(|&i| self.jobs[i].next_run);
        due
    }

    pub fn mark_ran(&mut self, index: usize, finished_at: NaiveDateTime) {
        if let Some(job) = self.jobs.get_mut(index) {
            job.mark_ran(finished_at);
        }
    }

    /// Earliest upcoming run across all jobs.
    pub fn next_run(&self) -> Option<NaiveDateTime> {
        self.jobs.iter().map(|j| j.next_run).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn hourly(every: u32, at_minute: u32) -> Cadence {
        Cadence::Hours { every, at_minute }
    }

    #[test]
    fn first_run_later_this_hour() {
        let job = Job::new(Task::Buy, hourly(1, 30), at(10, 15, 0));
        assert_eq!(job.next_run, at(10, 30, 0));
    }

    #[test]
    fn first_run_next_hour_once_minute_has_passed() {
        let job = Job::new(Task::Buy, hourly(1, 30), at(10, 45, 12));
        assert_eq!(job.next_run, at(11, 30, 0));
    }

    #[test]
    fn first_run_of_multi_hour_job_is_pulled_back_one_hour() {
        let job = Job::new(Task::Buy, hourly(6, 30), at(10, 15, 0));
        assert_eq!(job.next_run, at(15, 30, 0));
    }

    #[test]
    fn top_of_hour_job_started_mid_hour() {
        let job = Job::new(Task::Rebalance, hourly(2, 0), at(10, 15, 0));
        assert_eq!(job.next_run, at(12, 0, 0));
    }

    #[test]
    fn later_runs_count_from_completion() {
        let mut job = Job::new(Task::Buy, hourly(6, 30), at(10, 15, 0));
        job.mark_ran(at(15, 30, 7));
        assert_eq!(job.next_run, at(21, 30, 0));
        assert_eq!(job.last_run, Some(at(15, 30, 7)));

        // the pull-back only applies before the first run
        job.mark_ran(at(21, 20, 0));
        assert_eq!(job.next_run, at(3, 30, 0) + Duration::days(1));
    }

    #[test]
    fn minute_cadence_counts_from_previous_run() {
        let mut job = Job::new(Task::RefreshMetrics, Cadence::Minutes { every: 5 }, at(10, 0, 30));
        assert_eq!(job.next_run, at(10, 5, 30));
        assert!(!job.is_due(at(10, 5, 29)));
        assert!(job.is_due(at(10, 5, 30)));
        job.mark_ran(at(10, 5, 31));
        assert_eq!(job.next_run, at(10, 10, 31));
    }

    #[test]
    fn due_jobs_come_back_earliest_first() {
        let now = at(10, 15, 0);
        let mut schedule = Schedule::new();
        schedule.add(Job::new(Task::Buy, hourly(1, 30), now));
        schedule.add(Job::new(Task::RefreshMetrics, Cadence::Minutes { every: 5 }, now));
        schedule.add(Job::new(Task::Rebalance, hourly(1, 0), now));

        assert!(schedule.due(at(10, 19, 59)).is_empty());
        assert_eq!(schedule.due(at(10, 20, 0)), vec![1]);
        assert_eq!(schedule.due(at(11, 0, 0)), vec![1, 0, 2]);
        assert_eq!(schedule.next_run(), Some(at(10, 20, 0)));

        schedule.mark_ran(1, at(10, 20, 1));
        assert_eq!(schedule.jobs()[1].next_run, at(10, 25, 1));
    }
}
