use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::{ErrorKind, LauncherError, LauncherResult};

/// Concurrency and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Jobs allowed to run at the same time.
    pub max_concurrency: usize,
    /// Extra attempts after the first failure.
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            max_retries: 5,
        }
    }
}

/// One mod to download into one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadJob {
    pub mod_id: String,
    pub mod_name: String,
    pub instance_name: String,
    /// Attempts that already failed.
    pub attempts: u32,
}

impl DownloadJob {
    pub fn new(
        mod_id: impl Into<String>,
        mod_name: impl Into<String>,
        instance_name: impl Into<String>,
    ) -> Self {
        Self {
            mod_id: mod_id.into(),
            mod_name: mod_name.into(),
            instance_name: instance_name.into(),
            attempts: 0,
        }
    }

    pub(crate) fn key(&self) -> JobKey {
        (self.instance_name.clone(), self.mod_id.clone())
    }
}

/// `(instance name, mod id)`; at most one job per key is queued or running.
pub(crate) type JobKey = (String, String);

/// Terminal failure of a job, kept until the drain cycle reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub mod_id: String,
    pub mod_name: String,
    pub instance_name: String,
    pub error: String,
    pub kind: ErrorKind,
    /// Total attempts made, including the first.
    pub attempts: u32,
}

impl FailureRecord {
    pub(crate) fn new(job: &DownloadJob, error: &LauncherError) -> Self {
        Self {
            mod_id: job.mod_id.clone(),
            mod_name: job.mod_name.clone(),
            instance_name: job.instance_name.clone(),
            error: error.to_string(),
            kind: error.kind(),
            attempts: job.attempts + 1,
        }
    }
}

/// Outcome of handing a job to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Submission {
    Accepted,
    /// The same mod is already queued or running for this instance.
    Duplicate,
}

/// Executes a single job. Implemented by the mod installer.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, job: &DownloadJob) -> LauncherResult<()>;
}
