use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ApiError;

/// Which backend agent pipeline a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Complete,
    Scan,
    Priority,
    Plan,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 4] = [
        AnalysisKind::Complete,
        AnalysisKind::Scan,
        AnalysisKind::Priority,
        AnalysisKind::Plan,
    ];

    pub fn endpoint(self) -> &'static str {
        match self {
            AnalysisKind::Complete => "/analyze",
            AnalysisKind::Scan => "/scan",
            AnalysisKind::Priority => "/prioritize",
            AnalysisKind::Plan => "/plan",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisKind::Complete => "complete",
            AnalysisKind::Scan => "scan",
            AnalysisKind::Priority => "priority",
            AnalysisKind::Plan => "plan",
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complete" => Ok(AnalysisKind::Complete),
            "scan" => Ok(AnalysisKind::Scan),
            "priority" => Ok(AnalysisKind::Priority),
            "plan" => Ok(AnalysisKind::Plan),
            other => Err(ApiError::UnknownAnalysisType(other.to_string())),
        }
    }
}

/// Lifecycle: `Started -> Running* -> (Completed | Failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Started,
    #[default]
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Started => "started",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

// Statuses the client does not know are still in progress.
impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "started" => JobStatus::Started,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Running,
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `GET /status/{job_id}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StatusReport {
    /// A body without a status is still in progress.
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatusReport {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            stage: None,
            message: None,
            extra: Map::new(),
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    /// Message to surface for a failed job. The backend writes the reason to
    /// `error`; `message` wins when both are present.
    pub fn failure_message(&self) -> String {
        self.message
            .clone()
            .or_else(|| {
                self.extra
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "Analysis failed".to_string())
    }
}

/// Client-side record of a submitted job.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Job {
    pub job_id: String,
    pub kind: AnalysisKind,
    pub region: String,
    pub started_at: DateTime<Utc>,
    pub status: JobStatus,
    pub stage: Option<String>,
}

impl Job {
    pub fn new(job_id: impl Into<String>, kind: AnalysisKind, region: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            region: region.into(),
            started_at: Utc::now(),
            status: JobStatus::Started,
            stage: None,
        }
    }

    pub fn apply(&mut self, update: &JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(stage) = &update.stage {
            self.stage = Some(stage.clone());
        }
    }
}

/// Shallow patch applied to a job; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub stage: Option<String>,
}

impl From<&StatusReport> for JobUpdate {
    fn from(report: &StatusReport) -> Self {
        Self {
            status: Some(report.status),
            stage: report.stage.clone(),
        }
    }
}

/// In-memory map of job id to job metadata. Cloning shares the same map.
#[derive(Clone, Debug, Default)]
pub struct JobRegistry {
    jobs: Arc<DashMap<String, Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job: Job) {
        debug!(job_id = %job.job_id, kind = %job.kind, region = %job.region, "registered job");
        self.jobs.insert(job.job_id.clone(), job);
    }

    /// Merges `update` into the job. Unknown ids are ignored; the return
    /// value tells whether the job was found.
    pub fn update(&self, job_id: &str, update: &JobUpdate) -> bool {
        match self.jobs.get_mut(job_id) {
            Some(mut job) => {
                job.apply(update);
                true
            }
            None => {
                debug!(job_id, "ignoring update for unknown job");
                false
            }
        }
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.get(job_id).map(|job| job.value().clone())
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|entry| entry.value().clone()).collect();
        jobs.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        jobs
    }

    pub fn active(&self) -> Vec<Job> {
        self.list()
            .into_iter()
            .filter(|job| !job.status.is_terminal())
            .collect()
    }

    /// Removes completed and failed jobs, returning their ids.
    pub fn purge_terminal(&self) -> Vec<String> {
        let terminal: Vec<String> = self
            .jobs
            .iter()
            .filter(|entry| entry.status.is_terminal())
            .map(|entry| entry.key().clone())
            .collect();

        for job_id in &terminal {
            self.jobs.remove(job_id);
        }
        terminal
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
