use chrono::{DateTime, Local};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::cycle::{Ingestor, PassReport};
use crate::storage::DatabaseError;

/// Top of every hour from 07:00 through 23:00, plus midnight (local time).
pub const DEFAULT_SCHEDULE: &str = "0 0 7-23,0 * * *";

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The calendar expression did not parse
    #[error("Invalid schedule '{expr}': {reason}")]
    InvalidSchedule { expr: String, reason: String },

    /// A pass was already running, so this trigger did nothing
    #[error("An ingestion pass is already running; trigger skipped")]
    PassSkipped,

    /// The configured sources could not be read
    #[error("Failed to load sources: {0}")]
    Database(#[from] DatabaseError),
}

/// Parse a 6-field cron expression (seconds first).
pub fn parse_schedule(expr: &str) -> Result<Schedule, SchedulerError> {
    Schedule::from_str(expr).map_err(|e| SchedulerError::InvalidSchedule {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Fires full ingestion passes on a wall-clock calendar.
///
/// The timer lives in a spawned task that sleeps until the next calendar
/// point, runs a pass, and re-arms. Calendar points that go by while a pass
/// is running are skipped, never queued. Dropping the scheduler (or calling
/// [`shutdown`](Self::shutdown)) cancels the timer.
pub struct Scheduler {
    ingestor: Arc<Ingestor>,
    schedule: Schedule,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Validate `expr` and start the timer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(ingestor: Arc<Ingestor>, expr: &str) -> Result<Self, SchedulerError> {
        let schedule = parse_schedule(expr)?;
        let handle = tokio::spawn(run_timer(Arc::clone(&ingestor), schedule.clone()));

        tracing::info!(
            schedule = expr,
            next = ?schedule.upcoming(Local).next(),
            "Scheduler started"
        );
        Ok(Self {
            ingestor,
            schedule,
            handle,
        })
    }

    /// Next calendar point, if the expression has any left
    pub fn next_fire(&self) -> Option<DateTime<Local>> {
        self.schedule.upcoming(Local).next()
    }

    /// Run a pass right now, with the same semantics as a calendar firing.
    ///
    /// Returns [`SchedulerError::PassSkipped`] immediately if a pass is
    /// already running.
    pub async fn trigger_now(&self) -> Result<PassReport, SchedulerError> {
        self.ingestor.run_pass().await
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the timer. A pass in flight is abandoned at its next await
    /// point; an open commit transaction rolls back when dropped.
    pub fn shutdown(&self) {
        if !self.handle.is_finished() {
            tracing::info!("Scheduler stopping");
        }
        self.handle.abort();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_timer(ingestor: Arc<Ingestor>, schedule: Schedule) {
    let mut last_fire: Option<DateTime<Local>> = None;

    loop {
        // Never fire the same calendar point twice, even if the wall clock
        // reads slightly behind the timer on wake-up
        let now = Local::now();
        let after = match last_fire {
            Some(last) if last > now => last,
            _ => now,
        };
        let Some(next) = schedule.after(&after).next() else {
            tracing::info!("Schedule has no further fire times");
            return;
        };

        let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(next = %next, wait_secs = wait.as_secs(), "Waiting for next pass");
        tokio::time::sleep(wait).await;
        last_fire = Some(next);

        match ingestor.run_pass().await {
            Ok(_) => {}
            Err(SchedulerError::PassSkipped) => {
                tracing::warn!(scheduled_for = %next, "Previous pass still running; skipping");
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduled pass failed");
            }
        }
    }
}
