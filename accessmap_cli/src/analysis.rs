use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::ApiError;
use crate::http::HttpClient;
use crate::jobs::{AnalysisKind, Job, JobRegistry, StatusReport};
use crate::poller::JobSource;
use crate::{AnalysisResults, DEFAULT_REGION};

/// Body posted to the four submission endpoints.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_summary: Option<bool>,
}

impl AnalysisRequest {
    pub fn new(region: &str) -> Self {
        Self {
            state: region.trim().to_uppercase(),
            include_summary: None,
        }
    }
}

/// Caller-side options for `AnalysisService::start`.
#[derive(Debug, Clone, Default)]
pub struct AnalysisPayload {
    pub state: Option<String>,
    pub include_summary: Option<bool>,
}

impl AnalysisPayload {
    pub fn for_region(region: impl Into<String>) -> Self {
        Self {
            state: Some(region.into()),
            include_summary: None,
        }
    }

    fn region(&self) -> &str {
        self.state.as_deref().unwrap_or(DEFAULT_REGION)
    }
}

/// What the backend answers when a job is accepted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SubmissionReceipt {
    pub job_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Typed entry points to the analysis backend. Every accepted job is recorded
/// in the shared `JobRegistry`.
#[derive(Clone, Debug)]
pub struct AnalysisService {
    http: HttpClient,
    registry: JobRegistry,
}

impl AnalysisService {
    pub fn new(base_url: impl Into<String>, registry: JobRegistry) -> Self {
        Self {
            http: HttpClient::new(base_url),
            registry,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub async fn health_check(&self) -> Result<Value, ApiError> {
        self.http.get("/health").await
    }

    pub async fn start_complete_analysis(
        &self,
        region: &str,
        include_summary: bool,
    ) -> Result<SubmissionReceipt, ApiError> {
        let mut request = AnalysisRequest::new(region);
        request.include_summary = Some(include_summary);
        self.submit(AnalysisKind::Complete, request).await
    }

    pub async fn start_scan_analysis(&self, region: &str) -> Result<SubmissionReceipt, ApiError> {
        self.submit(AnalysisKind::Scan, AnalysisRequest::new(region)).await
    }

    pub async fn start_priority_analysis(&self, region: &str) -> Result<SubmissionReceipt, ApiError> {
        self.submit(AnalysisKind::Priority, AnalysisRequest::new(region)).await
    }

    pub async fn start_planning_analysis(&self, region: &str) -> Result<SubmissionReceipt, ApiError> {
        self.submit(AnalysisKind::Plan, AnalysisRequest::new(region)).await
    }

    /// Dispatches to the start function for `kind`.
    pub async fn start(
        &self,
        kind: AnalysisKind,
        payload: &AnalysisPayload,
    ) -> Result<SubmissionReceipt, ApiError> {
        let region = payload.region();
        match kind {
            AnalysisKind::Complete => {
                self.start_complete_analysis(region, payload.include_summary != Some(false))
                    .await
            }
            AnalysisKind::Scan => self.start_scan_analysis(region).await,
            AnalysisKind::Priority => self.start_priority_analysis(region).await,
            AnalysisKind::Plan => self.start_planning_analysis(region).await,
        }
    }

    async fn submit(
        &self,
        kind: AnalysisKind,
        request: AnalysisRequest,
    ) -> Result<SubmissionReceipt, ApiError> {
        let receipt: SubmissionReceipt = self.http.post(kind.endpoint(), &request).await?;

        self.registry
            .register(Job::new(receipt.job_id.clone(), kind, request.state.clone()));
        info!(job_id = %receipt.job_id, %kind, region = %request.state, "analysis submitted");

        Ok(receipt)
    }

    pub async fn get_status(&self, job_id: &str) -> Result<StatusReport, ApiError> {
        self.http.get(&format!("/status/{}", job_id)).await
    }

    pub async fn get_results(&self, job_id: &str) -> Result<AnalysisResults, ApiError> {
        self.http.get(&format!("/results/{}", job_id)).await
    }

    pub async fn get_latest_results(&self, region: &str) -> Result<AnalysisResults, ApiError> {
        self.http
            .get(&format!("/latest/{}", region.trim().to_uppercase()))
            .await
    }
}

#[async_trait]
impl JobSource for AnalysisService {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusReport, ApiError> {
        self.get_status(job_id).await
    }

    async fn fetch_results(&self, job_id: &str) -> Result<AnalysisResults, ApiError> {
        self.get_results(job_id).await
    }
}
