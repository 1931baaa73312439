//! Scheduler driver: runs the four sweeps on their cadences.
//!
//! One tokio task per job:
//! - Generate: daily at `generation_time` (and once at startup if enabled)
//! - Dispatch: every `dispatch_interval`
//! - MissedSweep: every `missed_sweep_interval`
//! - RefillCheck: daily at `refill_check_time`
//!
//! Each run executes on the blocking pool. A job never overlaps itself;
//! different jobs may run concurrently and rely on conditional updates.
//! An error or panic inside a run is logged and the job keeps its schedule.

use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::engine::ReminderEngine;
use super::error::ReminderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Generate,
    Dispatch,
    MissedSweep,
    RefillCheck,
}

impl Job {
    pub const ALL: [Job; 4] = [Job::Generate, Job::Dispatch, Job::MissedSweep, Job::RefillCheck];

    pub fn as_str(&self) -> &'static str {
        match self {
            Job::Generate => "generate",
            Job::Dispatch => "dispatch",
            Job::MissedSweep => "missed_sweep",
            Job::RefillCheck => "refill_check",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cadence {
    Every(Duration),
    DailyAt(NaiveTime),
}

fn cadence(engine: &ReminderEngine, job: Job) -> Cadence {
    let config = engine.config();
    match job {
        Job::Generate => Cadence::DailyAt(config.generation_time),
        Job::Dispatch => Cadence::Every(config.dispatch_interval),
        Job::MissedSweep => Cadence::Every(config.missed_sweep_interval),
        Job::RefillCheck => Cadence::DailyAt(config.refill_check_time),
    }
}

/// Handle for the running scheduler tasks.
///
/// Dropping it without `shutdown()` also stops the tasks, but does not
/// wait for an in-flight run to finish.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Signal every job to stop and wait for in-flight runs to complete.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Scheduler task ended abnormally");
            }
        }
        tracing::info!("Reminder scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }
}

/// Spawn one task per job on the current tokio runtime.
pub fn start_scheduler(engine: ReminderEngine) -> SchedulerHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tasks = Job::ALL
        .into_iter()
        .map(|job| {
            let engine = engine.clone();
            let shutdown = shutdown_rx.clone();
            tokio::spawn(job_loop(engine, job, shutdown))
        })
        .collect();

    let config = engine.config();
    tracing::info!(
        dispatch_every_s = config.dispatch_interval.as_secs(),
        missed_sweep_every_s = config.missed_sweep_interval.as_secs(),
        generation_at = %config.generation_time,
        refill_check_at = %config.refill_check_time,
        "Reminder scheduler started"
    );

    SchedulerHandle { shutdown_tx, tasks }
}

async fn job_loop(engine: ReminderEngine, job: Job, mut shutdown: watch::Receiver<bool>) {
    if job == Job::Generate && engine.config().generate_on_startup {
        run_once(&engine, job).await;
    }

    match cadence(&engine, job) {
        Cadence::Every(period) => {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => run_once(&engine, job).await,
                    _ = shutdown.changed() => break,
                }
            }
        }
        Cadence::DailyAt(at) => loop {
            let delay = until_next(engine.now(), at);
            tracing::debug!(job = job.as_str(), delay_s = delay.as_secs(), "Next daily run scheduled");
            tokio::select! {
                _ = tokio::time::sleep(delay) => run_once(&engine, job).await,
                _ = shutdown.changed() => break,
            }
        },
    }

    tracing::debug!(job = job.as_str(), "Scheduler job stopped");
}

async fn run_once(engine: &ReminderEngine, job: Job) {
    let worker = engine.clone();
    match tokio::task::spawn_blocking(move || run_job(&worker, job)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(job = job.as_str(), error = %e, "Scheduled job failed"),
        Err(e) => tracing::error!(job = job.as_str(), error = %e, "Scheduled job panicked"),
    }
}

/// Run `job` synchronously. Summaries are logged by the sweeps themselves.
pub fn run_job(engine: &ReminderEngine, job: Job) -> Result<(), ReminderError> {
    match job {
        Job::Generate => engine.generate_daily_reminders().map(|_| ()),
        Job::Dispatch => engine.dispatch_due_reminders().map(|_| ()),
        Job::MissedSweep => engine.sweep_missed_reminders().map(|_| ()),
        Job::RefillCheck => engine.check_refills().map(|_| ()),
    }
}

/// Time until the next `at` strictly after `now`.
fn until_next(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let mut next = now.date().and_time(at);
    if next <= now {
        next += chrono::Duration::days(1);
    }
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::models::Medication;
    use crate::reminders::engine::Collaborators;
    use crate::reminders::store::SqliteStore;
    use crate::reminders::test_support::{at, TestEnv};
    use crate::reminders::traits::{MedicationReader, ReminderStore};
    use crate::reminders::types::EngineConfig;

    fn fast_config() -> EngineConfig {
        EngineConfig {
            dispatch_interval: Duration::from_millis(20),
            missed_sweep_interval: Duration::from_millis(20),
            ..EngineConfig::default()
        }
    }

    async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[test]
    fn until_next_rolls_over_midnight() {
        let midnight = NaiveTime::MIN;
        assert_eq!(until_next(at(23, 0), midnight), Duration::from_secs(3600));
        assert_eq!(
            until_next(at(0, 0), midnight),
            Duration::from_secs(24 * 3600)
        );
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(until_next(at(8, 30), nine), Duration::from_secs(1800));
    }

    #[tokio::test]
    async fn startup_generation_then_dispatch_and_sweep() {
        let env = TestEnv::with_config(at(8, 56), fast_config());
        let owner = env.add_user("driver@example.com");
        let med = env.add_medication(&owner, "Metformin", &["09:00"]);
        let stale = env.add_reminder(&owner, &med, at(7, 0));

        let handle = start_scheduler(env.engine.clone());
        assert!(handle.is_running());

        let store = env.store.clone();
        let (user_id, med_id) = (owner.id, med.id);
        let notified = wait_for(|| {
            store
                .find_by_key(&user_id, &med_id, &at(9, 0))
                .ok()
                .flatten()
                .is_some_and(|r| r.notification_sent)
        })
        .await;
        assert!(notified);

        let stale_id = stale.id;
        let store = env.store.clone();
        let missed = wait_for(|| {
            store
                .get(&stale_id)
                .ok()
                .flatten()
                .is_some_and(|r| r.status == crate::models::enums::ReminderStatus::Missed)
        })
        .await;
        assert!(missed);

        handle.shutdown().await;
    }

    struct PanickingMedications(Arc<SqliteStore>);

    impl MedicationReader for PanickingMedications {
        fn list_active(&self) -> Result<Vec<Medication>, ReminderError> {
            panic!("medication source crashed")
        }

        fn get_medication(&self, id: &Uuid) -> Result<Option<Medication>, ReminderError> {
            self.0.get_medication(id)
        }
    }

    #[tokio::test]
    async fn panicking_job_does_not_stop_the_others() {
        let env = TestEnv::at(at(8, 56));
        let owner = env.add_user("panic@example.com");
        let med = env.add_medication(&owner, "Metformin", &["09:00"]);
        let reminder = env.add_reminder(&owner, &med, at(9, 0));

        let engine = ReminderEngine::new(
            Collaborators {
                medications: Arc::new(PanickingMedications(env.store.clone())),
                reminders: env.store.clone(),
                users: env.store.clone(),
                refill_log: env.store.clone(),
                channels: env.notifier.clone(),
                clock: env.clock.clone(),
            },
            fast_config(),
        )
        .unwrap();

        let handle = start_scheduler(engine);
        let store = env.store.clone();
        let id = reminder.id;
        let notified = wait_for(|| {
            store.get(&id).ok().flatten().is_some_and(|r| r.notification_sent)
        })
        .await;
        assert!(notified);
        assert!(handle.is_running());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_all_jobs() {
        let env = TestEnv::with_config(
            at(8, 0),
            EngineConfig {
                generate_on_startup: false,
                ..fast_config()
            },
        );
        let handle = start_scheduler(env.engine.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("scheduler did not stop");
    }
}
