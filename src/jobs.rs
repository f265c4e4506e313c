//! Job tracker: the latest progress snapshot of every job, by id.
//!
//! Exactly one worker writes a given job; any number of pollers read it.
//! Only the latest snapshot is kept. Entries are never evicted, so the map
//! grows for the lifetime of the process.

use crate::progress::ProgressSink;
use crate::results::ResultRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Complete,
    Error,
    NotFound,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }
}

/// Latest known state of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: String,
    pub status: JobStatus,
    pub current_page: usize,
    pub total_pages: usize,
    pub message: String,
    /// Present only once the job is `complete`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultRef>,
    /// Windows dropped because their render or transcription failed.
    pub skipped_windows: usize,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    fn processing(job_id: &str, current_page: usize, total_pages: usize, message: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Processing,
            current_page,
            total_pages,
            message: message.to_string(),
            result: None,
            skipped_windows: 0,
            updated_at: Utc::now(),
        }
    }

    /// Sentinel returned for ids the tracker has never seen.
    pub fn not_found(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::NotFound,
            current_page: 0,
            total_pages: 0,
            message: "Job not found".to_string(),
            result: None,
            skipped_windows: 0,
            updated_at: Utc::now(),
        }
    }
}

/// Process-wide map from job id to its latest snapshot.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<String, JobSnapshot>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the initial `processing` snapshot.
    pub fn create(&self, job_id: &str, total_pages: usize) {
        self.create_at(job_id, 0, total_pages, "Starting...");
    }

    /// Insert the initial `processing` snapshot at a given position.
    pub fn create_at(&self, job_id: &str, current_page: usize, total_pages: usize, message: &str) {
        let snapshot = JobSnapshot::processing(job_id, current_page, total_pages, message);
        self.write().insert(job_id.to_string(), snapshot);
        debug!(job_id, total_pages, "Job created");
    }

    /// Overwrite the progress of a running job. Last write wins.
    ///
    /// Unknown or already-terminal jobs are left untouched.
    pub fn update(&self, job_id: &str, current_page: usize, total_pages: usize, message: &str) {
        self.modify(job_id, |s| {
            s.current_page = current_page;
            s.total_pages = total_pages;
            s.message = message.to_string();
        });
    }

    /// Count one more dropped window against a running job.
    pub fn note_skipped_window(&self, job_id: &str) {
        self.modify(job_id, |s| s.skipped_windows += 1);
    }

    /// Terminal success.
    pub fn complete(&self, job_id: &str, result: ResultRef, skipped_windows: usize) {
        self.modify(job_id, |s| {
            s.status = JobStatus::Complete;
            s.current_page = s.current_page.max(s.total_pages);
            s.skipped_windows = skipped_windows;
            s.message = match skipped_windows {
                0 => "Processing complete!".to_string(),
                n => format!("Processing complete! ({n} window(s) skipped)"),
            };
            s.result = Some(result);
        });
    }

    /// Terminal failure.
    pub fn fail(&self, job_id: &str, message: &str) {
        self.modify(job_id, |s| {
            s.status = JobStatus::Error;
            s.message = message.to_string();
        });
    }

    /// Current snapshot, or the `not_found` sentinel.
    pub fn get(&self, job_id: &str) -> JobSnapshot {
        self.read()
            .get(job_id)
            .cloned()
            .unwrap_or_else(|| JobSnapshot::not_found(job_id))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn modify(&self, job_id: &str, f: impl FnOnce(&mut JobSnapshot)) {
        let mut jobs = self.write();
        match jobs.get_mut(job_id) {
            Some(s) if !s.status.is_terminal() => {
                f(s);
                s.updated_at = Utc::now();
            }
            Some(_) => debug!(job_id, "Ignoring write to finished job"),
            None => warn!(job_id, "Ignoring write to unknown job"),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, JobSnapshot>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, JobSnapshot>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Progress sink that writes into a [`JobTracker`] entry.
pub struct JobProgress {
    tracker: Arc<JobTracker>,
    job_id: String,
}

impl JobProgress {
    pub fn new(tracker: Arc<JobTracker>, job_id: impl Into<String>) -> Self {
        Self {
            tracker,
            job_id: job_id.into(),
        }
    }
}

impl ProgressSink for JobProgress {
    fn on_window_start(&self, current_page: usize, total_pages: usize, message: &str) {
        self.tracker
            .update(&self.job_id, current_page, total_pages, message);
    }

    fn on_window_failed(&self, _first: usize, _last: usize, _error: &str) {
        self.tracker.note_skipped_window(&self.job_id);
    }
}
