//! Process-level wiring: one configuration, one job store, one scheduler.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::scheduler::{Scheduler, SchedulerHooks, SchedulerOptions};
use crate::store::JobStore;
use std::sync::Arc;

/// Owns everything a host process needs to run scheduled backups.
#[derive(Debug)]
pub struct AppContext {
    pub config: EngineConfig,
    pub store: Arc<JobStore>,
    pub scheduler: Scheduler,
}

impl AppContext {
    /// Open the configured job store and build a stopped scheduler over it.
    ///
    /// # Errors
    /// Returns EngineError if the job store cannot be loaded
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_hooks(config, SchedulerHooks::default())
    }

    pub fn with_hooks(config: EngineConfig, hooks: SchedulerHooks) -> Result<Self, EngineError> {
        let store = Arc::new(JobStore::open(&config.jobs_file)?);
        let scheduler = Scheduler::with_hooks(
            Arc::clone(&store),
            SchedulerOptions::from(&config),
            hooks,
        );
        Ok(AppContext {
            config,
            store,
            scheduler,
        })
    }
}
