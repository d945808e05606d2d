//! Application state: a pure reducer over typed actions, published through a
//! `watch` channel, plus the async orchestration that drives it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analysis::{AnalysisPayload, AnalysisService, SubmissionReceipt};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::jobs::{AnalysisKind, Job, JobRegistry, JobUpdate, StatusReport};
use crate::poller::{JobSource, PollObserver, StatusPoller};
use crate::utils::{load_json, save_json};
use crate::{AnalysisResults, Recommendation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Checking,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub cost: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A plan item as authored, before the store assigns an id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanItemDraft {
    pub title: String,
    pub description: Option<String>,
    pub kind: Option<String>,
    pub priority: Option<String>,
    pub cost: Option<String>,
    pub duration: Option<String>,
    pub status: Option<String>,
    pub add_as_recommendation: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanItemUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<String>,
    pub cost: Option<String>,
    pub duration: Option<String>,
    pub status: Option<String>,
}

impl PlanItem {
    fn apply(&mut self, update: &PlanItemUpdate) {
        if let Some(title) = &update.title {
            self.title = title.clone();
        }
        if update.description.is_some() {
            self.description = update.description.clone();
        }
        if update.priority.is_some() {
            self.priority = update.priority.clone();
        }
        if update.cost.is_some() {
            self.cost = update.cost.clone();
        }
        if update.duration.is_some() {
            self.duration = update.duration.clone();
        }
        if update.status.is_some() {
            self.status = update.status.clone();
        }
    }
}

/// A community survey report recorded locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyRecord {
    pub id: String,
    pub submitted_at: DateTime<Utc>,
    pub status: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// A recommendation the user kept from a chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedRecommendation {
    pub id: String,
    pub saved_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppState {
    pub loading: bool,
    pub error: Option<String>,
    pub results: Option<AnalysisResults>,
    pub active_jobs: Vec<Job>,
    pub connection_status: ConnectionStatus,
    pub last_updated: Option<DateTime<Utc>>,
    pub plan_items: Vec<PlanItem>,
    pub survey_submissions: Vec<SurveyRecord>,
    pub saved_chat_recommendations: Vec<SavedRecommendation>,
}

impl AppState {
    pub fn is_connected(&self) -> bool {
        self.connection_status == ConnectionStatus::Connected
    }

    pub fn is_checking(&self) -> bool {
        self.connection_status == ConnectionStatus::Checking
    }

    /// Jobs that have not reached a terminal status.
    pub fn running_jobs(&self) -> impl Iterator<Item = &Job> {
        self.active_jobs.iter().filter(|job| !job.status.is_terminal())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetLoading(bool),
    SetError(String),
    /// Replaces results wholesale; `None` clears them.
    SetResults(Option<AnalysisResults>),
    SetActiveJobs(Vec<Job>),
    UpdateJobStatus { job_id: String, updates: JobUpdate },
    ClearError,
    SetConnectionStatus(ConnectionStatus),
    AddRecommendation(Recommendation),
    AddSurveySubmission(SurveyRecord),
    AddPlanItem(PlanItem),
    UpdatePlanItem { id: String, updates: PlanItemUpdate },
    AddSavedChatRecommendation(SavedRecommendation),
    UpdateSavedChatRecommendation { id: String, updates: Map<String, Value> },
    ClearSavedChatRecommendations,
}

impl Action {
    fn touches_saved_recommendations(&self) -> bool {
        matches!(
            self,
            Action::AddSavedChatRecommendation(_)
                | Action::UpdateSavedChatRecommendation { .. }
                | Action::ClearSavedChatRecommendations
        )
    }
}

/// Pure state transition. `now` stamps `last_updated` when results arrive.
pub fn reduce(mut state: AppState, action: Action, now: DateTime<Utc>) -> AppState {
    match action {
        Action::SetLoading(loading) => state.loading = loading,
        Action::SetError(message) => {
            state.error = Some(message);
            state.loading = false;
        }
        Action::SetResults(results) => {
            state.results = results;
            state.loading = false;
            state.error = None;
            state.last_updated = Some(now);
        }
        Action::SetActiveJobs(jobs) => state.active_jobs = jobs,
        Action::UpdateJobStatus { job_id, updates } => {
            for job in state.active_jobs.iter_mut().filter(|job| job.job_id == job_id) {
                job.apply(&updates);
            }
        }
        Action::ClearError => state.error = None,
        Action::SetConnectionStatus(status) => state.connection_status = status,
        Action::AddRecommendation(recommendation) => {
            state
                .results
                .get_or_insert_with(AnalysisResults::empty)
                .recommendations
                .push(recommendation);
        }
        Action::AddSurveySubmission(record) => {
            if let Some(results) = state.results.as_mut() {
                if let Ok(value) = serde_json::to_value(&record) {
                    results.survey_submissions.push(value);
                }
            }
            state.survey_submissions.push(record);
        }
        Action::AddPlanItem(item) => state.plan_items.push(item),
        Action::UpdatePlanItem { id, updates } => {
            for item in state.plan_items.iter_mut().filter(|item| item.id == id) {
                item.apply(&updates);
            }
        }
        Action::AddSavedChatRecommendation(saved) => state.saved_chat_recommendations.push(saved),
        Action::UpdateSavedChatRecommendation { id, updates } => {
            for saved in state
                .saved_chat_recommendations
                .iter_mut()
                .filter(|saved| saved.id == id)
            {
                for (key, value) in &updates {
                    saved.fields.insert(key.clone(), value.clone());
                }
            }
        }
        Action::ClearSavedChatRecommendations => state.saved_chat_recommendations.clear(),
    }
    state
}

#[derive(Clone)]
struct Dispatcher {
    state: Arc<watch::Sender<AppState>>,
    notices: broadcast::Sender<Notice>,
    saved_path: PathBuf,
    last_stamp: Arc<AtomicI64>,
}

impl Dispatcher {
    fn dispatch(&self, action: Action) {
        let persist = action.touches_saved_recommendations();
        self.state.send_modify(|state| {
            let current = std::mem::take(state);
            *state = reduce(current, action, Utc::now());
        });
        if persist {
            self.persist_saved_recommendations();
        }
    }

    fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Success => info!(%message, "notice"),
            NoticeLevel::Error => warn!(%message, "notice"),
        }
        // No subscribers is fine.
        let _ = self.notices.send(Notice { level, message });
    }

    fn persist_saved_recommendations(&self) {
        let saved = self.state.borrow().saved_chat_recommendations.clone();
        if let Err(e) = save_json(&saved, &self.saved_path) {
            error!(path = %self.saved_path.display(), error = %e, "could not save chat recommendations");
        }
    }

    /// Millisecond timestamp for generated ids, strictly increasing per store.
    fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_stamp.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match self
                .last_stamp
                .compare_exchange(last, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Feeds poll loop callbacks back into the store.
struct StoreObserver {
    dispatcher: Dispatcher,
}

impl PollObserver for StoreObserver {
    fn on_status(&self, job_id: &str, report: &StatusReport) {
        self.dispatcher.dispatch(Action::UpdateJobStatus {
            job_id: job_id.to_string(),
            updates: JobUpdate::from(report),
        });
    }

    fn on_complete(&self, _job_id: &str, results: AnalysisResults) {
        self.dispatcher.dispatch(Action::SetResults(Some(results)));
        self.dispatcher
            .notify(NoticeLevel::Success, "Analysis completed successfully!");
    }

    fn on_error(&self, _job_id: &str, error: ApiError) {
        let message = error.to_string();
        self.dispatcher.dispatch(Action::SetError(message.clone()));
        self.dispatcher
            .notify(NoticeLevel::Error, format!("Analysis failed: {}", message));
    }
}

pub struct Store {
    service: Arc<AnalysisService>,
    poller: Arc<StatusPoller>,
    dispatcher: Dispatcher,
}

impl Store {
    /// Builds the store and its owned registry, facade and poller. Saved chat
    /// recommendations are loaded from `config.saved_recommendations_path`.
    pub fn new(config: &ClientConfig) -> Self {
        let registry = JobRegistry::new();
        let service = Arc::new(AnalysisService::new(
            config.analysis_base_url.clone(),
            registry.clone(),
        ));
        let source: Arc<dyn JobSource> = service.clone();
        let poller = Arc::new(StatusPoller::new(source, registry, config.poll_interval));

        let saved = match load_json::<Vec<SavedRecommendation>>(&config.saved_recommendations_path) {
            Ok(saved) => saved.unwrap_or_default(),
            Err(e) => {
                warn!(
                    path = %config.saved_recommendations_path.display(),
                    error = %e,
                    "could not load saved chat recommendations"
                );
                Vec::new()
            }
        };

        let initial = AppState {
            saved_chat_recommendations: saved,
            ..AppState::default()
        };
        let (state, _) = watch::channel(initial);
        let (notices, _) = broadcast::channel(64);

        Self {
            service,
            poller,
            dispatcher: Dispatcher {
                state: Arc::new(state),
                notices,
                saved_path: config.saved_recommendations_path.clone(),
                last_stamp: Arc::new(AtomicI64::new(0)),
            },
        }
    }

    pub fn service(&self) -> &AnalysisService {
        &self.service
    }

    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    pub fn registry(&self) -> &JobRegistry {
        self.service.registry()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.dispatcher.state.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.dispatcher.notices.subscribe()
    }

    pub fn snapshot(&self) -> AppState {
        self.dispatcher.state.borrow().clone()
    }

    pub fn dispatch(&self, action: Action) {
        self.dispatcher.dispatch(action);
    }

    pub fn is_connected(&self) -> bool {
        self.dispatcher.state.borrow().is_connected()
    }

    pub fn is_checking(&self) -> bool {
        self.dispatcher.state.borrow().is_checking()
    }

    /// Submits an analysis of `kind` (`complete`, `scan`, `priority` or
    /// `plan`) and polls it until it finishes. Submission errors are stored
    /// in the state and returned.
    pub async fn start_analysis(
        &self,
        kind: &str,
        payload: AnalysisPayload,
    ) -> Result<SubmissionReceipt, ApiError> {
        self.dispatch(Action::SetLoading(true));
        self.dispatch(Action::ClearError);

        match self.submit(kind, &payload).await {
            Ok(receipt) => {
                self.dispatcher.notify(
                    NoticeLevel::Success,
                    format!("Analysis started successfully! Job ID: {}", receipt.job_id),
                );
                Ok(receipt)
            }
            Err(e) => {
                self.dispatch(Action::SetError(e.to_string()));
                self.dispatcher
                    .notify(NoticeLevel::Error, format!("Failed to start analysis: {}", e));
                Err(e)
            }
        }
    }

    pub async fn start_complete_analysis(&self, region: &str) -> Result<SubmissionReceipt, ApiError> {
        self.start_analysis(
            AnalysisKind::Complete.as_str(),
            AnalysisPayload::for_region(region),
        )
        .await
    }

    async fn submit(
        &self,
        kind: &str,
        payload: &AnalysisPayload,
    ) -> Result<SubmissionReceipt, ApiError> {
        let kind: AnalysisKind = kind.parse()?;
        let receipt = self.service.start(kind, payload).await?;

        self.refresh_active_jobs();
        self.poller.start_polling(
            &receipt.job_id,
            Arc::new(StoreObserver {
                dispatcher: self.dispatcher.clone(),
            }),
        );
        Ok(receipt)
    }

    /// Loads the stored results for `region` without submitting a job.
    pub async fn get_latest_results(&self, region: &str) -> Result<AnalysisResults, ApiError> {
        self.dispatch(Action::SetLoading(true));
        self.dispatch(Action::ClearError);

        match self.service.get_latest_results(region).await {
            Ok(results) => {
                self.dispatch(Action::SetResults(Some(results.clone())));
                Ok(results)
            }
            Err(e) => {
                self.dispatch(Action::SetError(e.to_string()));
                self.dispatcher
                    .notify(NoticeLevel::Error, format!("Failed to load results: {}", e));
                Err(e)
            }
        }
    }

    pub async fn check_backend_connection(&self) -> ConnectionStatus {
        self.dispatch(Action::SetConnectionStatus(ConnectionStatus::Checking));

        let status = match self.service.health_check().await {
            Ok(_) => ConnectionStatus::Connected,
            Err(e) => {
                error!(error = %e, "backend connection failed");
                self.dispatcher
                    .notify(NoticeLevel::Error, "Unable to connect to backend server");
                ConnectionStatus::Disconnected
            }
        };

        self.dispatch(Action::SetConnectionStatus(status));
        status
    }

    pub fn clear_error(&self) {
        self.dispatch(Action::ClearError);
    }

    pub fn clear_results(&self) {
        self.dispatch(Action::SetResults(None));
    }

    /// Copies the registry's job list into the state.
    pub fn refresh_active_jobs(&self) {
        self.dispatch(Action::SetActiveJobs(self.registry().list()));
    }

    /// Forgets completed and failed jobs and makes sure none of them is
    /// still polled.
    pub fn clear_completed_jobs(&self) -> Vec<String> {
        let purged = self.registry().purge_terminal();
        for job_id in &purged {
            self.poller.stop_polling(job_id);
        }
        self.refresh_active_jobs();
        purged
    }

    pub fn add_recommendation(&self, recommendation: Recommendation) -> Recommendation {
        let stamp = self.dispatcher.next_stamp();
        let recommendation = Recommendation {
            id: Some(format!("rec-{}", stamp)),
            created_at: Some(Utc::now()),
            source: recommendation
                .source
                .clone()
                .or_else(|| Some("planning_tool".to_string())),
            ..recommendation
        };
        self.dispatch(Action::AddRecommendation(recommendation.clone()));
        recommendation
    }

    pub fn add_survey_submission(&self, data: Map<String, Value>) -> SurveyRecord {
        let record = SurveyRecord {
            id: format!("survey-{}", self.dispatcher.next_stamp()),
            submitted_at: Utc::now(),
            status: "submitted".to_string(),
            data,
        };
        self.dispatch(Action::AddSurveySubmission(record.clone()));
        record
    }

    /// Adds a plan item. Completed items, and items flagged for it, are also
    /// added to the results as a recommendation.
    pub fn add_plan_item(&self, draft: PlanItemDraft) -> PlanItem {
        let item = PlanItem {
            id: format!("plan-{}", self.dispatcher.next_stamp()),
            title: draft.title.clone(),
            description: draft.description.clone(),
            kind: draft.kind.clone(),
            priority: draft.priority.clone(),
            cost: draft.cost.clone(),
            duration: draft.duration.clone(),
            status: draft.status.clone(),
            created_at: Utc::now(),
        };
        self.dispatch(Action::AddPlanItem(item.clone()));

        if draft.status.as_deref() == Some("completed") || draft.add_as_recommendation {
            self.add_recommendation(Recommendation {
                title: Some(draft.title),
                description: draft.description,
                kind: draft.kind,
                priority_level: draft.priority,
                cost_estimate: draft.cost,
                timeline: draft.duration,
                implementation_status: draft.status,
                source: Some("planning_tool".to_string()),
                ..Recommendation::default()
            });
        }

        item
    }

    pub fn update_plan_item(&self, id: &str, updates: PlanItemUpdate) {
        self.dispatch(Action::UpdatePlanItem {
            id: id.to_string(),
            updates,
        });
    }

    pub fn add_saved_chat_recommendation(&self, fields: Map<String, Value>) -> SavedRecommendation {
        let suffix = Uuid::new_v4().simple().to_string();
        let saved = SavedRecommendation {
            id: format!("saved-{}-{}", self.dispatcher.next_stamp(), &suffix[..9]),
            saved_at: Utc::now(),
            fields,
        };
        self.dispatch(Action::AddSavedChatRecommendation(saved.clone()));
        saved
    }

    pub fn update_saved_chat_recommendation(&self, id: &str, updates: Map<String, Value>) {
        self.dispatch(Action::UpdateSavedChatRecommendation {
            id: id.to_string(),
            updates,
        });
    }

    pub fn clear_saved_chat_recommendations(&self) {
        self.dispatch(Action::ClearSavedChatRecommendations);
    }

    /// Stops every poll loop.
    pub fn shutdown(&self) {
        self.poller.stop_all_polling();
    }
}
