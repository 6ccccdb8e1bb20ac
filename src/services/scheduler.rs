//! Daily scheduler - fires the capture job at fixed local wall-clock times
//!
//! Runs once at startup (unless disabled), then sleeps until the next
//! configured `HH:MM` slot. Runs are serial: a slot that passes while a run
//! is still in progress is skipped, the next fire is always strictly after
//! the moment the previous run finished.

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime, TimeZone};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct Scheduler {
    times: Vec<NaiveTime>,
    run_at_startup: bool,
}

impl Scheduler {
    /// `times` is sorted and de-duplicated here
    pub fn new(mut times: Vec<NaiveTime>, run_at_startup: bool) -> Self {
        times.sort();
        times.dedup();
        Self { times, run_at_startup }
    }

    /// Run `job` on schedule until `shutdown` flips to true.
    /// An in-flight job always completes; shutdown is observed between runs.
    pub async fn run<F, Fut>(&self, job: F, mut shutdown: watch::Receiver<bool>)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ()>,
    {
        let schedule: Vec<String> = self.times.iter().map(|t| t.format("%H:%M").to_string()).collect();
        info!(times = ?schedule, run_at_startup = %self.run_at_startup, "scheduler_started");

        if self.run_at_startup {
            info!("startup_run");
            job().await;
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            let Some(next) = next_fire_local(Local::now(), &self.times) else {
                // Nothing scheduled: idle until shutdown
                debug!("scheduler_idle");
                if shutdown.changed().await.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            };

            let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
            info!(next_run = %next.format("%Y-%m-%d %H:%M:%S"), wait_secs = %wait.as_secs(), "next_run_scheduled");

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            info!(slot = %next.format("%H:%M"), "scheduled_run");
            job().await;
        }

        info!("scheduler_stopped");
    }
}

/// Next slot strictly after `now` (naive local time); `None` when `times`
/// is empty
pub fn next_fire(now: NaiveDateTime, times: &[NaiveTime]) -> Option<NaiveDateTime> {
    let today = now.date();
    if let Some(time) = times.iter().filter(|t| **t > now.time()).min() {
        return Some(today.and_time(*time));
    }
    let first = times.iter().min()?;
    let tomorrow = today.succ_opt()?;
    Some(tomorrow.and_time(*first))
}

/// [`next_fire`] resolved to a local instant. A slot that falls into a DST
/// gap is shifted forward by the gap.
fn next_fire_local(now: DateTime<Local>, times: &[NaiveTime]) -> Option<DateTime<Local>> {
    let naive = next_fire(now.naive_local(), times)?;
    match Local.from_local_datetime(&naive).earliest() {
        Some(at) => Some(at),
        None => {
            warn!(slot = %naive, "scheduled_time_skipped_by_dst");
            Local.from_local_datetime(&(naive + ChronoDuration::hours(1))).earliest()
        }
    }
}
