//! Runs the recurring transaction engine periodically, never two passes at once.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use rusqlite::Connection;
use time::OffsetDateTime;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

use crate::{
    Error,
    recurring::{BatchReport, run_once},
    timezone::get_offset_at,
};

/// Tracks whether a pass of the engine is running.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    /// Create a guard with no pass running.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to run a pass.
    ///
    /// Returns `None` if a pass is already running. The claim is released
    /// when the returned permit is dropped.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                running: self.running.clone(),
            })
    }

    /// Whether a pass is running right now.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Proof that the holder is the only pass running, see [RunGuard::try_acquire].
#[derive(Debug)]
pub struct RunPermit {
    running: Arc<AtomicBool>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Runs passes of the engine against the shared database connection.
///
/// Both scheduled and on-demand passes go through the same [RunGuard].
#[derive(Debug, Clone)]
pub struct BatchRunner {
    db_connection: Arc<Mutex<Connection>>,
    local_timezone: String,
    guard: RunGuard,
}

impl BatchRunner {
    /// Create a runner that decides which day it is in `local_timezone`, a
    /// canonical timezone name such as "Pacific/Auckland".
    pub fn new(db_connection: Arc<Mutex<Connection>>, local_timezone: &str) -> Self {
        Self {
            db_connection,
            local_timezone: local_timezone.to_owned(),
            guard: RunGuard::new(),
        }
    }

    /// The guard shared by every pass of this runner.
    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    /// Run one pass as of `now`.
    ///
    /// The pass runs on the blocking thread pool since SQLite calls block.
    /// Returns `None` without doing anything if a pass is already running.
    pub async fn run_now(&self, now: OffsetDateTime) -> Option<BatchReport> {
        let Some(permit) = self.guard.try_acquire() else {
            tracing::debug!("a recurring transaction run is already in progress");
            return None;
        };

        let db_connection = self.db_connection.clone();
        let local_timezone = self.local_timezone.clone();

        let report = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            run_locked(now, &local_timezone, &db_connection)
        })
        .await
        .unwrap_or_else(|error| {
            tracing::error!("recurring transaction run did not complete: {error}");
            BatchReport::failed_to_start(now, error)
        });

        Some(report)
    }
}

fn run_locked(
    now: OffsetDateTime,
    local_timezone: &str,
    db_connection: &Mutex<Connection>,
) -> BatchReport {
    let Some(local_offset) = get_offset_at(local_timezone, now) else {
        let error = Error::InvalidTimezoneError(local_timezone.to_owned());
        tracing::error!("{error}");
        return BatchReport::failed_to_start(now, error);
    };

    let connection = match db_connection.lock() {
        Ok(connection) => connection,
        Err(error) => {
            tracing::error!("could not acquire database lock: {error}");
            return BatchReport::failed_to_start(now, Error::DatabaseLockError);
        }
    };

    run_once(now, local_offset, &connection)
}

/// A background task that runs the engine every `period`.
///
/// The first pass happens as soon as the scheduler starts. Ticks that come
/// due while a pass is still running are skipped rather than queued.
#[derive(Debug)]
pub struct Scheduler {
    runner: BatchRunner,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Scheduler {
    /// Spawn the scheduler task on the current tokio runtime.
    ///
    /// A zero `period` is treated as one millisecond.
    pub fn start(runner: BatchRunner, period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task_runner = runner.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if task_runner.run_now(OffsetDateTime::now_utc()).await.is_none() {
                            tracing::info!("skipping scheduled run, the previous run has not finished");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            tracing::debug!("recurring transaction scheduler stopped");
        });

        tracing::info!("recurring transaction scheduler started, running every {period:?}");

        Self {
            runner,
            shutdown_tx,
            task,
        }
    }

    /// Run a pass now through the same guard as the scheduled passes.
    ///
    /// Returns `None` if a pass is already running.
    pub async fn run_now(&self) -> Option<BatchReport> {
        self.runner.run_now(OffsetDateTime::now_utc()).await
    }

    /// Stop the scheduler, waiting for a pass in progress to finish.
    pub async fn stop(self) {
        // The task may have already exited, in which case there is nobody to tell.
        let _ = self.shutdown_tx.send(true);

        if let Err(error) = self.task.await {
            tracing::error!("recurring transaction scheduler task failed: {error}");
        }
    }
}

#[cfg(test)]
mod scheduler_tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use rusqlite::Connection;
    use time::{Date, OffsetDateTime, macros::{date, datetime}};

    use crate::{
        category::{CategoryName, create_category},
        db::initialize,
        recurring::{
            BatchRunner, Recurrence, RecurringForm, RunGuard, Scheduler, create_recurring,
        },
        transaction::count_transactions,
    };

    fn get_test_connection(next_occurrence: Date) -> Arc<Mutex<Connection>> {
        let connection = Connection::open_in_memory().unwrap();
        initialize(&connection).unwrap();
        let category = create_category(CategoryName::new_unchecked("Internet"), &connection)
            .unwrap();
        let form = RecurringForm {
            amount: 80.0,
            category_id: category.id,
            recurrence: Recurrence::Monthly,
            next_occurrence,
        };
        create_recurring(1, &form, &connection).unwrap();

        Arc::new(Mutex::new(connection))
    }

    fn transaction_count(connection: &Arc<Mutex<Connection>>) -> u32 {
        count_transactions(&connection.lock().unwrap()).unwrap()
    }

    #[test]
    fn guard_allows_one_permit_at_a_time() {
        let guard = RunGuard::new();

        let permit = guard.try_acquire();
        assert!(permit.is_some());
        assert!(guard.is_running());
        assert!(guard.clone().try_acquire().is_none());

        drop(permit);

        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }

    #[tokio::test]
    async fn run_now_materializes_due_definitions() {
        let connection = get_test_connection(date!(2024 - 06 - 01));
        let runner = BatchRunner::new(connection.clone(), "Etc/UTC");

        let report = runner
            .run_now(datetime!(2024 - 06 - 03 12:00 UTC))
            .await
            .expect("Run should not be blocked");

        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(transaction_count(&connection), 1);
        assert!(!runner.guard().is_running());
    }

    #[tokio::test]
    async fn run_now_returns_none_while_running() {
        let connection = get_test_connection(date!(2024 - 06 - 01));
        let runner = BatchRunner::new(connection.clone(), "Etc/UTC");
        let permit = runner.guard().try_acquire().unwrap();

        let report = runner.run_now(datetime!(2024 - 06 - 03 12:00 UTC)).await;

        assert_eq!(report, None);
        assert_eq!(transaction_count(&connection), 0);
        drop(permit);
    }

    #[tokio::test]
    async fn run_now_reports_invalid_timezone() {
        let connection = get_test_connection(date!(2024 - 06 - 01));
        let runner = BatchRunner::new(connection.clone(), "Middle/Earth");

        let report = runner
            .run_now(datetime!(2024 - 06 - 03 12:00 UTC))
            .await
            .unwrap();

        assert_eq!(report.error, Some("invalid timezone Middle/Earth".to_owned()));
        assert_eq!(transaction_count(&connection), 0);
    }

    #[tokio::test]
    async fn scheduler_runs_on_start_and_stops() {
        let connection = get_test_connection(OffsetDateTime::now_utc().date());
        let runner = BatchRunner::new(connection.clone(), "Etc/UTC");
        let scheduler = Scheduler::start(runner.clone(), Duration::from_millis(10));

        for _ in 0..200 {
            if transaction_count(&connection) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        scheduler.stop().await;

        assert_eq!(transaction_count(&connection), 1);
        assert!(!runner.guard().is_running());
    }

    #[tokio::test]
    async fn scheduler_run_now_is_blocked_by_running_pass() {
        let connection = get_test_connection(date!(2024 - 06 - 01));
        let runner = BatchRunner::new(connection, "Etc/UTC");
        let scheduler = Scheduler::start(runner.clone(), Duration::from_secs(3600));
        let permit = loop {
            if let Some(permit) = runner.guard().try_acquire() {
                break permit;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };

        let report = scheduler.run_now().await;

        assert_eq!(report, None);
        drop(permit);
        scheduler.stop().await;
    }
}
