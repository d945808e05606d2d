use axum::{extract::Path, http::StatusCode, response::IntoResponse, Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::fixtures;
use crate::state::{ScriptStep, StubJob, StubState};

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn detail(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "detail": message.into() })))
}

#[derive(Debug, Deserialize)]
pub struct AnalysisRequest {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub include_summary: Option<bool>,
}

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "accessmap-stub",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn submit(state: StubState, kind: &str, label: &str, payload: AnalysisRequest) -> impl IntoResponse {
    let region = payload
        .state
        .unwrap_or_else(|| "CA".to_string())
        .to_uppercase();
    let uuid = Uuid::new_v4().simple().to_string();
    let job_id = format!("{}_{}_{}", kind, region, &uuid[..8]);

    state
        .jobs
        .insert(job_id.clone(), StubJob::new(kind, &region, state.script()));
    info!(job_id = %job_id, include_summary = ?payload.include_summary, "job accepted");

    Json(json!({
        "job_id": job_id,
        "status": "started",
        "message": format!("{} started for {}", label, region),
    }))
}

pub async fn analyze(
    Extension(state): Extension<StubState>,
    Json(payload): Json<AnalysisRequest>,
) -> impl IntoResponse {
    submit(state, "complete", "Complete analysis", payload).await
}

pub async fn scan(
    Extension(state): Extension<StubState>,
    Json(payload): Json<AnalysisRequest>,
) -> impl IntoResponse {
    submit(state, "scan", "Scan analysis", payload).await
}

pub async fn prioritize(
    Extension(state): Extension<StubState>,
    Json(payload): Json<AnalysisRequest>,
) -> impl IntoResponse {
    submit(state, "priority", "Priority analysis", payload).await
}

pub async fn plan(
    Extension(state): Extension<StubState>,
    Json(payload): Json<AnalysisRequest>,
) -> impl IntoResponse {
    submit(state, "plan", "Planning analysis", payload).await
}

/// GET /status/{job_id}
pub async fn job_status(Extension(state): Extension<StubState>, Path(job_id): Path<String>) -> ApiResult {
    state.record_status_query();

    let mut job = state
        .jobs
        .get_mut(&job_id)
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Job not found"))?;

    let mut body = json!({ "job_id": job_id });
    match job.advance() {
        None => {}
        Some(ScriptStep::Running(stage)) => {
            job.status = "running".into();
            job.stage = Some(stage);
        }
        Some(ScriptStep::Completed) => {
            if job.results.is_none() {
                let mut results = fixtures::analysis_results(&job.region, &job.kind);
                fixtures::merge_surveys(&mut results, &state.surveys());
                state.latest.insert(job.region.clone(), results.clone());
                job.results = Some(results);
            }
            job.status = "completed".into();
            job.stage = Some("done".into());
        }
        Some(ScriptStep::Failed { message, error }) => {
            job.status = "failed".into();
            job.stage = Some("error".into());
            if let Some(message) = message {
                body["message"] = json!(message);
            }
            if let Some(error) = error {
                body["error"] = json!(error);
            }
        }
        Some(ScriptStep::StatusError(code, message)) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return Err(detail(status, message));
        }
    }

    body["status"] = json!(job.status);
    body["stage"] = json!(job.stage);
    body["analysis_type"] = json!(job.kind);
    Ok(Json(body))
}

/// GET /results/{job_id}
pub async fn job_results(Extension(state): Extension<StubState>, Path(job_id): Path<String>) -> ApiResult {
    let job = state
        .jobs
        .get(&job_id)
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, "Job not found"))?;

    match (&job.results, job.status.as_str()) {
        (Some(results), "completed") => Ok(Json(results.clone())),
        _ => Err(detail(StatusCode::TOO_EARLY, "Analysis not completed yet")),
    }
}

/// GET /latest/{state}
pub async fn latest_results(Extension(state): Extension<StubState>, Path(region): Path<String>) -> ApiResult {
    let region = region.to_uppercase();
    let mut results = state
        .latest
        .get(&region)
        .map(|r| r.value().clone())
        .ok_or_else(|| detail(StatusCode::NOT_FOUND, format!("No results found for state: {}", region)))?;

    fixtures::merge_surveys(&mut results, &state.surveys());
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
pub struct ChatPayload {
    pub message: String,
    #[serde(default)]
    pub history: Vec<Value>,
    #[serde(default)]
    pub context: Value,
}

pub async fn chatbot(Json(payload): Json<ChatPayload>) -> ApiResult {
    if payload.message.trim().is_empty() {
        return Err(detail(StatusCode::BAD_REQUEST, "Message is required"));
    }

    let counts = &payload.context["results"];
    let message = match counts["gaps_count"].as_u64() {
        Some(gaps) => format!(
            "There are {} accessibility gaps and {} recommendations in the current analysis. Start with the critical gaps near transit.",
            gaps,
            counts["recommendations_count"].as_u64().unwrap_or(0)
        ),
        None => "Run an analysis first so I can point you to the most urgent gaps.".to_string(),
    };

    Ok(Json(json!({
        "message": message,
        "context_used": { "results": counts, "history_turns": payload.history.len() },
        "suggestions": [
            "Which gaps are critical?",
            "What would curb ramps cost?",
            "Show survey reports"
        ]
    })))
}

/// POST /survey
pub async fn submit_survey(Extension(state): Extension<StubState>, Json(survey): Json<Value>) -> ApiResult {
    let coordinates = survey["location"]["coordinates"].clone();
    if coordinates.is_null() {
        return Err(detail(
            StatusCode::BAD_REQUEST,
            "Location coordinates are required. Please select a location on the map.",
        ));
    }

    let mut surveys = state.surveys.lock().map_err(|_| {
        warn!("survey store poisoned");
        detail(StatusCode::INTERNAL_SERVER_ERROR, "Failed to submit survey")
    })?;

    let mut record = json!({
        "id": format!("survey_{}", surveys.len() + 1),
        "submitted_at": Utc::now().to_rfc3339(),
        "location": survey["location"],
        "issue": survey["issue"],
        "impact": survey["impact"],
        "demographics": survey["demographics"],
        "contact": survey["contact"],
    });
    let recommendation = fixtures::survey_recommendation(&record);
    record["ai_recommendation"] = recommendation.clone();
    let survey_id = record["id"].clone();
    surveys.push(record);
    info!(survey_id = %survey_id, "survey submitted");

    Ok(Json(json!({
        "status": "success",
        "message": "Survey submitted successfully",
        "survey_id": survey_id,
        "coordinates": coordinates,
        "ai_recommendation": recommendation,
    })))
}

pub async fn list_surveys(Extension(state): Extension<StubState>) -> impl IntoResponse {
    let surveys = state.surveys();
    let total = surveys.len();
    Json(json!({ "surveys": surveys, "total": total }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(region: &str) -> AnalysisRequest {
        AnalysisRequest {
            state: Some(region.to_string()),
            include_summary: Some(true),
        }
    }

    async fn status_of(state: &StubState, job_id: &str) -> ApiResult {
        job_status(Extension(state.clone()), Path(job_id.to_string())).await
    }

    #[tokio::test]
    async fn test_job_walks_script_and_publishes_latest() {
        let state = StubState::with_script(vec![ScriptStep::running("fetching_data"), ScriptStep::Completed]);
        submit(state.clone(), "scan", "Scan analysis", request("ca")).await;
        let job_id = state.jobs.iter().next().map(|j| j.key().clone()).unwrap();
        assert!(job_id.starts_with("scan_CA_"));

        let early = job_results(Extension(state.clone()), Path(job_id.clone())).await.unwrap_err();
        assert_eq!(early.0, StatusCode::TOO_EARLY);

        let Json(first) = status_of(&state, &job_id).await.unwrap();
        assert_eq!(first["status"], "running");
        assert_eq!(first["stage"], "fetching_data");

        let Json(second) = status_of(&state, &job_id).await.unwrap();
        assert_eq!(second["status"], "completed");

        let Json(results) = job_results(Extension(state.clone()), Path(job_id)).await.unwrap();
        assert_eq!(results["scan_results"].as_array().unwrap().len(), 4);
        assert!(state.latest.contains_key("CA"));
        assert_eq!(state.status_queries(), 2);
    }

    #[tokio::test]
    async fn test_failed_step_carries_message() {
        let state = StubState::with_script(vec![ScriptStep::failed("Data source unavailable")]);
        submit(state.clone(), "complete", "Complete analysis", request("CA")).await;
        let job_id = state.jobs.iter().next().map(|j| j.key().clone()).unwrap();

        let Json(body) = status_of(&state, &job_id).await.unwrap();
        assert_eq!(body["status"], "failed");
        assert_eq!(body["message"], "Data source unavailable");
    }

    #[tokio::test]
    async fn test_unknown_ids_and_regions_are_404() {
        let state = StubState::new();
        let (code, Json(body)) = status_of(&state, "nope").await.unwrap_err();
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Job not found");

        let (code, Json(body)) = latest_results(Extension(state), Path("tx".to_string()))
            .await
            .unwrap_err();
        assert_eq!(code, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "No results found for state: TX");
    }

    #[tokio::test]
    async fn test_survey_without_coordinates_is_rejected() {
        let state = StubState::new();
        let survey = json!({ "location": { "city": "Fresno" }, "issue": { "type": "Broken Sidewalk" } });
        let (code, _) = submit_survey(Extension(state.clone()), Json(survey)).await.unwrap_err();
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert!(state.surveys().is_empty());
    }
}
