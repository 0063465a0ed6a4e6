//! Remote job queue
//!
//! Submitted features are pushed onto a Redis list and picked up by an
//! external worker pool. Job state lives under per-job status and result
//! keys with a fixed TTL; callers poll for the result payload.

pub mod broker;

pub use broker::{Broker, MemoryBroker, RedisBroker};

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{ApipulseError, Result};

pub const JOB_QUEUE_KEY: &str = "karate:jobs";
pub const STATUS_KEY_PREFIX: &str = "karate:status:";
pub const RESULT_KEY_PREFIX: &str = "karate:results:";

/// Status and result keys expire after an hour.
pub const KEY_TTL_SECS: u64 = 3600;

pub const DEFAULT_RESULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Complete,
    Error,
    Timeout,
    Cancelled,
    Unknown,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
            JobStatus::Timeout => "timeout",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Unknown => "unknown",
        }
    }

    fn from_label(label: &str) -> JobStatus {
        match label {
            "pending" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "complete" => JobStatus::Complete,
            "error" => JobStatus::Error,
            "timeout" => JobStatus::Timeout,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Unknown,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload pushed onto the job list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub feature: String,

    #[serde(default)]
    pub config: JsonValue,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env_vars: IndexMap<String, JsonValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Extra files the worker materializes next to the feature, keyed by
    /// relative path.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub additional_files: IndexMap<String, String>,

    pub submitted_at: DateTime<Utc>,
}

/// What a submission consists of before it gets an id.
#[derive(Debug, Clone, Default)]
pub struct JobSpec {
    pub feature: String,
    pub config: JsonValue,
    pub env_vars: IndexMap<String, JsonValue>,
    pub tags: Vec<String>,
    pub additional_files: IndexMap<String, String>,
}

/// Result payload written by a worker under the job's result key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(default)]
    pub job_id: String,

    #[serde(default = "complete_status")]
    pub status: JobStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Cucumber JSON report, absent when the worker failed outright
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_captures: Vec<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn complete_status() -> JobStatus {
    JobStatus::Complete
}

impl JobResult {
    fn failure(job_id: &str, status: JobStatus, message: impl Into<String>) -> Self {
        JobResult {
            job_id: job_id.to_string(),
            status,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            report: None,
            http_captures: Vec::new(),
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue_length: usize,
    /// No worker registry exists; workers only show up through results.
    pub workers_active: usize,
}

pub struct JobQueue<B> {
    broker: B,
    result_timeout: Duration,
    poll_interval: Duration,
}

impl<B: Broker> JobQueue<B> {
    pub fn new(broker: B) -> Self {
        JobQueue {
            broker,
            result_timeout: Duration::from_secs(DEFAULT_RESULT_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enqueue a feature for execution, returning the job id.
    pub async fn submit(&self, spec: JobSpec) -> Result<String> {
        let job = Job {
            id: Uuid::new_v4().to_string(),
            feature: spec.feature,
            config: spec.config,
            env_vars: spec.env_vars,
            tags: spec.tags,
            additional_files: spec.additional_files,
            submitted_at: Utc::now(),
        };
        let payload = serde_json::to_string(&job).map_err(ApipulseError::Json)?;

        self.broker
            .set_ex(&status_key(&job.id), JobStatus::Pending.as_str(), KEY_TTL_SECS)
            .await?;
        self.broker.push_job(JOB_QUEUE_KEY, &payload).await?;
        info!(job_id = %job.id, "Submitted feature job");

        Ok(job.id)
    }

    pub async fn status(&self, job_id: &str) -> Result<JobStatus> {
        let label = self.broker.get(&status_key(job_id)).await?;
        Ok(label.map_or(JobStatus::Unknown, |l| JobStatus::from_label(&l)))
    }

    /// Single poll of the result key.
    pub async fn try_fetch_result(&self, job_id: &str) -> Result<Option<JobResult>> {
        let Some(payload) = self.broker.get(&result_key(job_id)).await? else {
            return Ok(None);
        };
        let mut result: JobResult =
            serde_json::from_str(&payload).map_err(ApipulseError::Json)?;
        if result.job_id.is_empty() {
            result.job_id = job_id.to_string();
        }
        Ok(Some(result))
    }

    /// Poll until the worker publishes a result, the status key flips to
    /// error, or the timeout elapses. Timeouts and worker failures come back
    /// as a `JobResult`, not an `Err`.
    pub async fn wait_for_result(&self, job_id: &str) -> Result<JobResult> {
        let deadline = Instant::now() + self.result_timeout;
        loop {
            if let Some(result) = self.try_fetch_result(job_id).await? {
                debug!(job_id, status = %result.status, "Job result received");
                return Ok(result);
            }

            if self.status(job_id).await? == JobStatus::Error {
                return Ok(JobResult::failure(
                    job_id,
                    JobStatus::Error,
                    "Job failed before producing results",
                ));
            }

            if Instant::now() >= deadline {
                warn!(
                    job_id,
                    timeout_secs = self.result_timeout.as_secs(),
                    "Job did not complete in time"
                );
                return Ok(JobResult::failure(
                    job_id,
                    JobStatus::Timeout,
                    format!(
                        "Job did not complete within {} seconds",
                        self.result_timeout.as_secs()
                    ),
                ));
            }

            sleep(self.poll_interval).await;
        }
    }

    /// Cancel a job that has not been picked up yet. Jobs already running
    /// or finished cannot be cancelled.
    pub async fn cancel(&self, job_id: &str) -> Result<bool> {
        let status = self.status(job_id).await?;
        if matches!(
            status,
            JobStatus::Complete | JobStatus::Error | JobStatus::Running
        ) {
            return Ok(false);
        }
        self.broker
            .set_ex(&status_key(job_id), JobStatus::Cancelled.as_str(), KEY_TTL_SECS)
            .await?;
        Ok(true)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        Ok(QueueStats {
            queue_length: self.broker.queue_len(JOB_QUEUE_KEY).await?,
            workers_active: 0,
        })
    }

    /// Worker side: take the oldest queued job.
    pub async fn take_job(&self) -> Result<Option<Job>> {
        let Some(payload) = self.broker.pop_job(JOB_QUEUE_KEY).await? else {
            return Ok(None);
        };
        let job = serde_json::from_str(&payload).map_err(ApipulseError::Json)?;
        Ok(Some(job))
    }

    /// Worker side: flip the status key to running.
    pub async fn mark_running(&self, job_id: &str) -> Result<()> {
        self.broker
            .set_ex(&status_key(job_id), JobStatus::Running.as_str(), KEY_TTL_SECS)
            .await
    }

    /// Worker side: publish the result and final status.
    pub async fn store_result(&self, result: &JobResult) -> Result<()> {
        let payload = serde_json::to_string(result).map_err(ApipulseError::Json)?;
        self.broker
            .set_ex(&result_key(&result.job_id), &payload, KEY_TTL_SECS)
            .await?;
        self.broker
            .set_ex(&status_key(&result.job_id), result.status.as_str(), KEY_TTL_SECS)
            .await
    }
}

fn status_key(job_id: &str) -> String {
    format!("{}{}", STATUS_KEY_PREFIX, job_id)
}

fn result_key(job_id: &str) -> String {
    format!("{}{}", RESULT_KEY_PREFIX, job_id)
}
