//! Job persistence.
//!
//! All jobs live in one JSON object keyed by job id. The whole map is written
//! back after every mutation: serialized to a sibling temp file, then renamed
//! over the real one so a crash never leaves a half-written store.

use crate::error::EngineError;
use crate::fs_ops;
use crate::model::{BackupJob, JobPatch, JobStatus};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

type JobMap = BTreeMap<String, BackupJob>;

/// Thread-safe store of saved backup jobs.
#[derive(Debug)]
pub struct JobStore {
    /// None for a store that is never written to disk
    path: Option<PathBuf>,
    jobs: Mutex<JobMap>,
}

impl JobStore {
    /// Load the store at `path`. A missing file is an empty store.
    ///
    /// # Errors
    /// Returns EngineError if the file exists but cannot be read or parsed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let path = path.into();
        let jobs = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<JobMap>(&text).map_err(|e| {
                EngineError::StoreFailed {
                    path: path.clone(),
                    message: e.to_string(),
                }
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => JobMap::new(),
            Err(e) => {
                return Err(EngineError::StoreFailed {
                    path,
                    message: e.to_string(),
                })
            }
        };

        info!(path = %path.display(), jobs = jobs.len(), "Job store loaded");
        Ok(JobStore {
            path: Some(path),
            jobs: Mutex::new(jobs),
        })
    }

    /// A store that keeps jobs in memory only.
    pub fn in_memory() -> Self {
        JobStore {
            path: None,
            jobs: Mutex::new(JobMap::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Add a new job and persist it.
    ///
    /// # Errors
    /// Returns `JobAlreadyExists` for a duplicate id, or EngineError if saving fails
    pub fn create(&self, job: BackupJob) -> Result<BackupJob, EngineError> {
        let mut jobs = self.lock();
        if jobs.contains_key(&job.job_id) {
            return Err(EngineError::JobAlreadyExists {
                id: job.job_id.clone(),
            });
        }
        let mut staged = jobs.clone();
        staged.insert(job.job_id.clone(), job.clone());
        self.commit(&mut jobs, staged)?;
        info!(job_id = %job.job_id, name = %job.name, "Job created");
        Ok(job)
    }

    pub fn get(&self, job_id: &str) -> Option<BackupJob> {
        self.lock().get(job_id).cloned()
    }

    /// Every job, oldest first.
    pub fn list(&self) -> Vec<BackupJob> {
        let mut jobs: Vec<BackupJob> = self.lock().values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        jobs
    }

    pub fn enabled_jobs(&self) -> Vec<BackupJob> {
        self.list().into_iter().filter(|job| job.enabled).collect()
    }

    pub fn jobs_by_status(&self, status: JobStatus) -> Vec<BackupJob> {
        self.list()
            .into_iter()
            .filter(|job| job.status == status)
            .collect()
    }

    /// Apply a configuration patch and persist the job.
    ///
    /// # Errors
    /// Returns EngineError if the job does not exist or saving fails
    pub fn update(&self, job_id: &str, patch: JobPatch) -> Result<BackupJob, EngineError> {
        let job = self.mutate(job_id, |job| job.apply_patch(patch))?;
        info!(job_id = %job_id, "Job updated");
        Ok(job)
    }

    /// Remove a job. Returns false if it did not exist.
    ///
    /// # Errors
    /// Returns EngineError if saving fails
    pub fn delete(&self, job_id: &str) -> Result<bool, EngineError> {
        let mut jobs = self.lock();
        let mut staged = jobs.clone();
        if staged.remove(job_id).is_none() {
            return Ok(false);
        }
        self.commit(&mut jobs, staged)?;
        info!(job_id = %job_id, "Job deleted");
        Ok(true)
    }

    pub(crate) fn mark_running(&self, job_id: &str) -> Result<BackupJob, EngineError> {
        self.mutate(job_id, |job| job.status = JobStatus::Running)
    }

    pub(crate) fn mark_completed(
        &self,
        job_id: &str,
        finished_at: NaiveDateTime,
    ) -> Result<BackupJob, EngineError> {
        self.mutate(job_id, |job| {
            job.status = JobStatus::Completed;
            job.last_run = Some(finished_at);
        })
    }

    pub(crate) fn mark_failed(&self, job_id: &str) -> Result<BackupJob, EngineError> {
        self.mutate(job_id, |job| job.status = JobStatus::Failed)
    }

    pub(crate) fn set_next_run(
        &self,
        job_id: &str,
        next_run: Option<NaiveDateTime>,
    ) -> Result<BackupJob, EngineError> {
        self.mutate(job_id, |job| job.next_run = next_run)
    }

    fn mutate(
        &self,
        job_id: &str,
        change: impl FnOnce(&mut BackupJob),
    ) -> Result<BackupJob, EngineError> {
        let mut jobs = self.lock();
        let mut updated = jobs.get(job_id).cloned().ok_or_else(|| EngineError::JobNotFound {
            id: job_id.to_string(),
        })?;
        change(&mut updated);
        updated.touch();

        let mut staged = jobs.clone();
        staged.insert(job_id.to_string(), updated.clone());
        self.commit(&mut jobs, staged)?;
        Ok(updated)
    }

    /// Persist `staged` and only then make it the live map. A failed save
    /// leaves memory matching what is on disk.
    fn commit(&self, jobs: &mut JobMap, staged: JobMap) -> Result<(), EngineError> {
        self.save(&staged)?;
        *jobs = staged;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, JobMap> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, jobs: &JobMap) -> Result<(), EngineError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let store_error = |message: String| EngineError::StoreFailed {
            path: path.clone(),
            message,
        };

        fs_ops::ensure_parent_dir_exists(path)?;
        let json = serde_json::to_string_pretty(jobs).map_err(|e| store_error(e.to_string()))?;

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        fs::write(&temp_path, json).map_err(|e| store_error(e.to_string()))?;
        fs::rename(&temp_path, path).map_err(|e| store_error(e.to_string()))?;

        debug!(path = %path.display(), jobs = jobs.len(), "Job store saved");
        Ok(())
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
