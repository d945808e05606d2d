use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{
    analyze, chatbot, health, job_results, job_status, latest_results, list_surveys, plan,
    prioritize, scan, submit_survey,
};

pub fn analysis_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .route("/scan", post(scan))
        .route("/prioritize", post(prioritize))
        .route("/plan", post(plan))
        .route("/status/{job_id}", get(job_status))
        .route("/results/{job_id}", get(job_results))
        .route("/latest/{state}", get(latest_results))
}

// Served by a separate process on port 8003 in production.
pub fn community_routes() -> Router {
    Router::new()
        .route("/chatbot", post(chatbot))
        .route("/survey", post(submit_survey))
        .route("/surveys", get(list_surveys))
}
