//! Job table for background execution
//!
//! Every `cmd &` runs on a subshell in its own task; the table keeps the
//! handles so `wait` can join them. Jobs still running when the table is
//! dropped are detached, not aborted.

use std::collections::BTreeMap;

use tokio::task::JoinHandle;

use crate::logging::log_debug;

/// Job table for tracking background jobs
#[derive(Debug)]
pub struct JobTable {
    /// Active jobs indexed by ID
    jobs: BTreeMap<usize, JoinHandle<i32>>,
    /// Next job ID to assign
    next_id: usize,
    /// Last spawned job ID (for $!)
    last_job_id: Option<usize>,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    /// Create a new empty job table
    pub fn new() -> Self {
        Self {
            jobs: BTreeMap::new(),
            next_id: 1,
            last_job_id: None,
        }
    }

    /// Track a spawned job. Returns the ID `wait` and `$!` use.
    pub fn spawn(&mut self, handle: JoinHandle<i32>) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.insert(id, handle);
        self.last_job_id = Some(id);
        log_debug!(job = id, "background job started");
        id
    }

    /// Get the last spawned job ID (for $!)
    pub fn last_job_id(&self) -> Option<usize> {
        self.last_job_id
    }

    /// Wait for one job. `None` when no such job is being tracked.
    pub async fn wait_for(&mut self, job_id: usize) -> Option<i32> {
        let handle = self.jobs.remove(&job_id)?;
        Some(join(job_id, handle).await)
    }

    /// Wait for every job, in start order. Returns the exit code of the
    /// last one, or 0 without jobs.
    pub async fn wait_all(&mut self) -> i32 {
        let mut last_exit_code = 0;
        let jobs = std::mem::take(&mut self.jobs);
        for (id, handle) in jobs {
            last_exit_code = join(id, handle).await;
        }
        last_exit_code
    }

    /// Check if there are any active jobs
    pub fn has_jobs(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// Get the number of active jobs
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }
}

async fn join(id: usize, handle: JoinHandle<i32>) -> i32 {
    let code = handle.await.unwrap_or(1);
    log_debug!(job = id, code, "background job joined");
    let _ = id;
    code
}
