//! Job scheduler.
//!
//! A single polling thread evaluates the triggers of every enabled job and
//! launches due jobs, each on its own worker thread with its own
//! `BackupEngine`. `run_now` uses the same launch path. A job is never run
//! twice at once: launching claims the job id, and the claim is released when
//! the worker finishes, however it finishes.
//!
//! Status writes go through the job store: `running` when the worker picks
//! the job up, then `completed` (with `last_run`) or `failed`.

use crate::config::EngineConfig;
use crate::engine::{BackupEngine, BackupRequest};
use crate::error::EngineError;
use crate::model::{now_local, BackupJob, BackupRunMetadata};
use crate::store::JobStore;
use crate::trigger::Trigger;
use chrono::NaiveDateTime;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

type StartedHook = Arc<dyn Fn(&BackupJob) + Send + Sync>;
type CompletedHook = Arc<dyn Fn(&BackupJob, &BackupRunMetadata) + Send + Sync>;
type FailedHook = Arc<dyn Fn(&BackupJob, &EngineError) + Send + Sync>;

/// Callbacks invoked on the worker thread around every run.
#[derive(Clone, Default)]
pub struct SchedulerHooks {
    started: Option<StartedHook>,
    completed: Option<CompletedHook>,
    failed: Option<FailedHook>,
}

impl SchedulerHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the job (status `running`) before the backup starts.
    pub fn on_job_started(mut self, hook: impl Fn(&BackupJob) + Send + Sync + 'static) -> Self {
        self.started = Some(Arc::new(hook));
        self
    }

    /// Called with the job (status `completed`) and the run's metadata.
    pub fn on_job_completed(
        mut self,
        hook: impl Fn(&BackupJob, &BackupRunMetadata) + Send + Sync + 'static,
    ) -> Self {
        self.completed = Some(Arc::new(hook));
        self
    }

    /// Called with the job (status `failed`) and the error that ended the run.
    pub fn on_job_failed(
        mut self,
        hook: impl Fn(&BackupJob, &EngineError) + Send + Sync + 'static,
    ) -> Self {
        self.failed = Some(Arc::new(hook));
        self
    }

    fn job_started(&self, job: &BackupJob) {
        if let Some(hook) = &self.started {
            hook(job);
        }
    }

    fn job_completed(&self, job: &BackupJob, metadata: &BackupRunMetadata) {
        if let Some(hook) = &self.completed {
            hook(job, metadata);
        }
    }

    fn job_failed(&self, job: &BackupJob, error: &EngineError) {
        if let Some(hook) = &self.failed {
            hook(job, error);
        }
    }
}

impl fmt::Debug for SchedulerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHooks")
            .field("started", &self.started.is_some())
            .field("completed", &self.completed.is_some())
            .field("failed", &self.failed.is_some())
            .finish()
    }
}

/// Timing knobs for the scheduler and the engines it creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub poll_interval: Duration,
    pub stop_timeout: Duration,
    pub pause_poll: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        SchedulerOptions {
            poll_interval: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(5),
            pause_poll: Duration::from_millis(100),
        }
    }
}

impl From<&EngineConfig> for SchedulerOptions {
    fn from(config: &EngineConfig) -> Self {
        SchedulerOptions {
            poll_interval: config.poll_interval(),
            stop_timeout: config.stop_timeout(),
            pause_poll: config.pause_poll(),
        }
    }
}

#[derive(Debug)]
struct ScheduledJob {
    trigger: Trigger,
    next_tick: NaiveDateTime,
}

/// State shared by the scheduler handle, the polling thread and the workers.
struct Shared {
    store: Arc<JobStore>,
    hooks: SchedulerHooks,
    options: SchedulerOptions,
    triggers: Mutex<HashMap<String, ScheduledJob>>,
    in_flight: Mutex<HashMap<String, Arc<BackupEngine>>>,
}

/// Exclusive right to run one job. Released on drop.
struct Claim {
    shared: Arc<Shared>,
    job_id: String,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.shared.in_flight().remove(&self.job_id);
        debug!(job_id = %self.job_id, "Job released");
    }
}

struct Poller {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

impl Shared {
    fn triggers(&self) -> MutexGuard<'_, HashMap<String, ScheduledJob>> {
        self.triggers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, Arc<BackupEngine>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn engine_for(&self, job_id: &str) -> Option<Arc<BackupEngine>> {
        self.in_flight().get(job_id).cloned()
    }

    /// Recompute every enabled job's trigger as of `now`.
    fn rebuild_triggers(&self, now: NaiveDateTime) -> Result<usize, EngineError> {
        let mut triggers = HashMap::new();

        for job in self.store.enabled_jobs() {
            let scheduled = Trigger::from_schedule(&job.schedule).and_then(|trigger| {
                trigger
                    .map(|trigger| trigger.first_tick(now).map(|tick| (trigger, tick)))
                    .transpose()
            });
            match scheduled {
                Ok(Some((trigger, next_tick))) => {
                    let next_run = trigger.next_fire(next_tick);
                    self.store.set_next_run(&job.job_id, next_run)?;
                    info!(
                        job_id = %job.job_id,
                        schedule = job.schedule.kind(),
                        next_run = ?next_run,
                        "Job scheduled"
                    );
                    triggers.insert(job.job_id.clone(), ScheduledJob { trigger, next_tick });
                }
                Ok(None) => debug!(job_id = %job.job_id, "Manual job, not scheduled"),
                Err(e) => {
                    warn!(job_id = %job.job_id, error = %e, "Invalid schedule, job not scheduled")
                }
            }
        }

        let count = triggers.len();
        *self.triggers() = triggers;
        Ok(count)
    }

    /// Launch every job whose trigger fired at or before `now`.
    fn tick(self: &Arc<Self>, now: NaiveDateTime) {
        let mut due = Vec::new();
        let mut rescheduled = Vec::new();
        {
            let mut triggers = self.triggers();
            triggers.retain(|job_id, scheduled| {
                if scheduled.next_tick > now {
                    return true;
                }
                if scheduled.trigger.fires_on(scheduled.next_tick) {
                    due.push(job_id.clone());
                }
                match scheduled.trigger.advance(scheduled.next_tick, now) {
                    Some(next_tick) => {
                        scheduled.next_tick = next_tick;
                        rescheduled.push((job_id.clone(), scheduled.trigger.next_fire(next_tick)));
                        true
                    }
                    None => {
                        warn!(job_id = %job_id, "No further ticks representable, job unscheduled");
                        rescheduled.push((job_id.clone(), None));
                        false
                    }
                }
            });
        }

        for (job_id, next_run) in rescheduled {
            if let Err(e) = self.store.set_next_run(&job_id, next_run) {
                warn!(job_id = %job_id, error = %e, "Failed to record next run");
            }
        }

        for job_id in due {
            match self.store.get(&job_id) {
                Some(job) if job.enabled => {}
                Some(_) => {
                    debug!(job_id = %job_id, "Job disabled, skipping scheduled run");
                    continue;
                }
                None => {
                    warn!(job_id = %job_id, "Scheduled job no longer exists");
                    continue;
                }
            }

            match self.launch(&job_id) {
                Ok(()) => info!(job_id = %job_id, "Starting scheduled backup"),
                Err(EngineError::JobAlreadyRunning { .. }) => {
                    warn!(job_id = %job_id, "Skipping scheduled run: job already running")
                }
                Err(e) => error!(job_id = %job_id, error = %e, "Failed to launch scheduled backup"),
            }
        }
    }

    /// Claim `job_id` and run it on a new worker thread.
    fn launch(self: &Arc<Self>, job_id: &str) -> Result<(), EngineError> {
        if self.store.get(job_id).is_none() {
            return Err(EngineError::JobNotFound {
                id: job_id.to_string(),
            });
        }

        let engine = Arc::new(BackupEngine::with_pause_poll(self.options.pause_poll));
        {
            let mut in_flight = self.in_flight();
            if in_flight.contains_key(job_id) {
                return Err(EngineError::JobAlreadyRunning {
                    id: job_id.to_string(),
                });
            }
            in_flight.insert(job_id.to_string(), Arc::clone(&engine));
        }
        let claim = Claim {
            shared: Arc::clone(self),
            job_id: job_id.to_string(),
        };

        // A failed spawn drops the closure, and with it the claim
        thread::Builder::new()
            .name(format!("backup-{}", job_id))
            .spawn(move || claim.shared.execute(&claim.job_id, &engine))
            .map(|_| ())
            .map_err(|e| EngineError::Unknown {
                message: format!("Failed to spawn backup worker: {}", e),
            })
    }

    /// Run one job to completion and record the outcome.
    fn execute(&self, job_id: &str, engine: &BackupEngine) {
        let job = match self.store.mark_running(job_id) {
            Ok(job) => job,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Cannot start backup job");
                return;
            }
        };
        info!(job_id = %job.job_id, name = %job.name, "Backup job started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.hooks.job_started(&job);
            engine.perform_backup(&BackupRequest::from_job(&job), None)
        }))
        .unwrap_or_else(|payload| {
            Err(EngineError::Unknown {
                message: format!("Backup worker panicked: {}", panic_message(payload.as_ref())),
            })
        });

        match outcome {
            Ok(metadata) => {
                if metadata.cancelled {
                    warn!(job_id = %job_id, "Backup job cancelled, partial backup kept");
                }
                let job = self
                    .store
                    .mark_completed(job_id, now_local())
                    .unwrap_or_else(|e| {
                        error!(job_id = %job_id, error = %e, "Failed to record completion");
                        job.clone()
                    });
                info!(
                    job_id = %job_id,
                    files = metadata.total_files,
                    bytes = metadata.total_size,
                    "Backup job completed"
                );
                self.hooks.job_completed(&job, &metadata);
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Backup job failed");
                let job = self.store.mark_failed(job_id).unwrap_or_else(|store_error| {
                    error!(job_id = %job_id, error = %store_error, "Failed to record failure");
                    job.clone()
                });
                self.hooks.job_failed(&job, &e);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs saved jobs on their schedules and on demand.
pub struct Scheduler {
    shared: Arc<Shared>,
    poller: Mutex<Option<Poller>>,
}

impl Scheduler {
    pub fn new(store: Arc<JobStore>, options: SchedulerOptions) -> Self {
        Self::with_hooks(store, options, SchedulerHooks::default())
    }

    pub fn with_hooks(store: Arc<JobStore>, options: SchedulerOptions, hooks: SchedulerHooks) -> Self {
        Scheduler {
            shared: Arc::new(Shared {
                store,
                hooks,
                options,
                triggers: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
            poller: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.shared.store
    }

    fn poller(&self) -> MutexGuard<'_, Option<Poller>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule every enabled job and start polling. Calling it again while
    /// running does nothing.
    ///
    /// # Errors
    /// Returns EngineError if next run times cannot be saved or the polling
    /// thread cannot be spawned
    pub fn start(&self) -> Result<(), EngineError> {
        let mut poller = self.poller();
        if poller.is_some() {
            debug!("Scheduler already running");
            return Ok(());
        }

        let scheduled = self.shared.rebuild_triggers(now_local())?;

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let shared = Arc::clone(&self.shared);
        let poll_interval = self.shared.options.poll_interval;

        let handle = thread::Builder::new()
            .name("backup-scheduler".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(poll_interval) {
                        Err(RecvTimeoutError::Timeout) => shared.tick(now_local()),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                let _ = done_tx.send(());
            })
            .map_err(|e| EngineError::Unknown {
                message: format!("Failed to spawn scheduler thread: {}", e),
            })?;

        *poller = Some(Poller {
            stop_tx,
            done_rx,
            handle,
        });
        info!(jobs = scheduled, "Scheduler started");
        Ok(())
    }

    /// Stop polling and forget all triggers. Runs already in progress finish
    /// on their own.
    pub fn stop(&self) {
        let Some(poller) = self.poller().take() else {
            return;
        };

        let _ = poller.stop_tx.send(());
        match poller.done_rx.recv_timeout(self.shared.options.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if poller.handle.join().is_err() {
                    warn!("Scheduler thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.shared.options.stop_timeout.as_millis() as u64,
                    "Scheduler thread did not stop in time, detaching"
                );
            }
        }

        self.shared.triggers().clear();
        info!("Scheduler stopped");
    }

    /// Re-read the store and rebuild all triggers. Does nothing when stopped.
    ///
    /// # Errors
    /// Returns EngineError if next run times cannot be saved
    pub fn refresh(&self) -> Result<(), EngineError> {
        let poller = self.poller();
        if poller.is_none() {
            return Ok(());
        }
        let scheduled = self.shared.rebuild_triggers(now_local())?;
        info!(jobs = scheduled, "Schedules refreshed");
        Ok(())
    }

    /// Start `job_id` now on its own worker. Its schedule is left alone.
    ///
    /// # Errors
    /// Returns EngineError if the job does not exist or is already running
    pub fn run_now(&self, job_id: &str) -> Result<(), EngineError> {
        self.shared.launch(job_id)?;
        info!(job_id = %job_id, "Manual backup launched");
        Ok(())
    }

    /// When a scheduled job will next run. None for unscheduled jobs.
    pub fn next_run_time(&self, job_id: &str) -> Option<NaiveDateTime> {
        self.shared
            .triggers()
            .get(job_id)
            .and_then(|scheduled| scheduled.trigger.next_fire(scheduled.next_tick))
    }

    /// Ask an in-flight run to stop. Returns false if the job is not running.
    pub fn cancel_job(&self, job_id: &str) -> bool {
        self.signal(job_id, BackupEngine::cancel)
    }

    /// Hold an in-flight run. Returns false if the job is not running.
    pub fn pause_job(&self, job_id: &str) -> bool {
        self.signal(job_id, BackupEngine::pause)
    }

    pub fn resume_job(&self, job_id: &str) -> bool {
        self.signal(job_id, BackupEngine::resume)
    }

    fn signal(&self, job_id: &str, send: impl FnOnce(&BackupEngine)) -> bool {
        match self.shared.engine_for(job_id) {
            Some(engine) => {
                send(&engine);
                true
            }
            None => false,
        }
    }

    /// Whether the polling loop is active.
    pub fn is_running(&self) -> bool {
        self.poller().is_some()
    }

    pub fn is_job_running(&self, job_id: &str) -> bool {
        self.shared.in_flight().contains_key(job_id)
    }

    /// Ids of jobs with a run in progress.
    pub fn running_jobs(&self) -> Vec<String> {
        let mut jobs: Vec<String> = self.shared.in_flight().keys().cloned().collect();
        jobs.sort();
        jobs
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("running", &self.is_running())
            .field("in_flight", &self.running_jobs())
            .finish()
    }
}
