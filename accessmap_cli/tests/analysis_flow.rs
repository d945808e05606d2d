mod common;

use std::time::Duration;

use accessmap_cli::analysis::AnalysisPayload;
use accessmap_cli::error::ApiError;
use accessmap_cli::jobs::JobStatus;
use accessmap_cli::store::{ConnectionStatus, NoticeLevel};
use accessmap_stub::ScriptStep;
use common::{harness, settled, POLL_INTERVAL};
use futures::future::join_all;

#[tokio::test]
async fn test_complete_analysis_delivers_results_once() {
    let h = harness(vec![
        ScriptStep::running("fetching_data"),
        ScriptStep::running("running_agents"),
        ScriptStep::Completed,
    ])
    .await;
    let store = h.store();
    let mut rx = store.subscribe();
    let mut notices = store.notices();

    let receipt = store.start_complete_analysis("ca").await.unwrap();
    assert!(receipt.job_id.starts_with("complete_CA_"));
    assert!(store.snapshot().loading);
    assert_eq!(store.snapshot().active_jobs.len(), 1);

    let state = settled(&mut rx).await;
    assert!(state.error.is_none());
    assert!(state.last_updated.is_some());
    let results = state.results.expect("results stored");
    assert_eq!(results.scan_results.len(), 4);

    let job = store.registry().get(&receipt.job_id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(state.active_jobs[0].status, JobStatus::Completed);
    assert!(!store.poller().is_polling(&receipt.job_id));

    // Latest results for the region are the ones the job produced.
    let latest = store.service().get_latest_results("CA").await.unwrap();
    assert_eq!(latest.recommendations.len(), results.recommendations.len());

    // No further polls once the job finished.
    let queries = h.stub.status_queries();
    tokio::time::sleep(POLL_INTERVAL * 5).await;
    assert_eq!(h.stub.status_queries(), queries);

    let mut messages = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        messages.push((notice.level, notice.message));
    }
    assert_eq!(
        messages.last(),
        Some(&(NoticeLevel::Success, "Analysis completed successfully!".to_string()))
    );
    assert_eq!(
        messages
            .iter()
            .filter(|(_, m)| m == "Analysis completed successfully!")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_failed_job_surfaces_backend_message() {
    let h = harness(vec![
        ScriptStep::running("fetching_data"),
        ScriptStep::failed("Census data source unavailable"),
    ])
    .await;
    let store = h.store();
    let mut rx = store.subscribe();

    let receipt = store
        .start_analysis("scan", AnalysisPayload::for_region("CA"))
        .await
        .unwrap();

    let state = settled(&mut rx).await;
    assert_eq!(state.error.as_deref(), Some("Census data source unavailable"));
    assert!(state.results.is_none());
    assert_eq!(
        store.registry().get(&receipt.job_id).unwrap().status,
        JobStatus::Failed
    );
}

#[tokio::test]
async fn test_failed_job_without_message_uses_default() {
    let h = harness(vec![ScriptStep::Failed {
        message: None,
        error: None,
    }])
    .await;
    let store = h.store();
    let mut rx = store.subscribe();

    store
        .start_analysis("plan", AnalysisPayload::for_region("CA"))
        .await
        .unwrap();

    let state = settled(&mut rx).await;
    assert_eq!(state.error.as_deref(), Some("Analysis failed"));
}

#[tokio::test]
async fn test_failed_job_falls_back_to_error_field() {
    let h = harness(vec![ScriptStep::Failed {
        message: None,
        error: Some("Agent pipeline crashed".into()),
    }])
    .await;
    let store = h.store();
    let mut rx = store.subscribe();

    store
        .start_analysis("priority", AnalysisPayload::for_region("CA"))
        .await
        .unwrap();

    let state = settled(&mut rx).await;
    assert_eq!(state.error.as_deref(), Some("Agent pipeline crashed"));
}

#[tokio::test]
async fn test_status_error_stops_polling() {
    let h = harness(vec![ScriptStep::StatusError(500, "Status store offline".into())]).await;
    let store = h.store();
    let mut rx = store.subscribe();

    let receipt = store.start_complete_analysis("CA").await.unwrap();
    let state = settled(&mut rx).await;

    assert_eq!(state.error.as_deref(), Some("Status store offline"));
    assert!(!store.poller().is_polling(&receipt.job_id));
    let queries = h.stub.status_queries();
    tokio::time::sleep(POLL_INTERVAL * 5).await;
    assert_eq!(h.stub.status_queries(), queries);
}

#[tokio::test]
async fn test_unknown_analysis_type_is_rejected_without_request() {
    let h = harness(Vec::new()).await;
    let store = h.store();

    let err = store
        .start_analysis("census", AnalysisPayload::for_region("CA"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::UnknownAnalysisType(ref kind) if kind == "census"));

    let state = store.snapshot();
    assert!(!state.loading);
    assert_eq!(state.error.as_deref(), Some("Unknown analysis type: census"));
    assert!(h.stub.jobs.is_empty());
    assert!(store.registry().is_empty());
}

#[tokio::test]
async fn test_latest_results_missing_region_reports_detail() {
    let h = harness(Vec::new()).await;
    let store = h.store();

    let err = store.get_latest_results("tx").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "No results found for state: TX");
    assert_eq!(
        store.snapshot().error.as_deref(),
        Some("No results found for state: TX")
    );
}

#[tokio::test]
async fn test_results_before_completion_are_too_early() {
    let h = harness(vec![ScriptStep::running("fetching_data")]).await;
    let store = h.store();

    let receipt = store
        .service()
        .start_scan_analysis("CA")
        .await
        .unwrap();
    let err = store.service().get_results(&receipt.job_id).await.unwrap_err();
    assert_eq!(err.status(), Some(425));
}

#[tokio::test]
async fn test_stopped_job_is_not_polled_again() {
    let h = harness(vec![ScriptStep::running("fetching_data")]).await;
    let store = h.store();

    let receipt = store.start_complete_analysis("CA").await.unwrap();
    assert!(store.poller().is_polling(&receipt.job_id));
    tokio::time::sleep(POLL_INTERVAL * 3).await;

    assert!(store.poller().stop_polling(&receipt.job_id));
    // Let a request that was already on the wire land.
    tokio::time::sleep(POLL_INTERVAL).await;
    let queries = h.stub.status_queries();
    tokio::time::sleep(POLL_INTERVAL * 5).await;

    assert_eq!(h.stub.status_queries(), queries);
    assert_eq!(store.poller().active_count(), 0);
    assert!(store.snapshot().loading);
}

#[tokio::test]
async fn test_concurrent_jobs_are_tracked_independently() {
    let h = harness(vec![ScriptStep::running("fetching_data"), ScriptStep::Completed]).await;
    let store = h.store();

    let receipts = join_all(["CA", "NY", "TX"].map(|region| {
        store.start_analysis("scan", AnalysisPayload::for_region(region))
    }))
    .await;
    let ids: Vec<String> = receipts.into_iter().map(|r| r.unwrap().job_id).collect();
    assert_eq!(store.registry().len(), 3);

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.poller().active_count() > 0 {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .expect("all jobs finished");

    for id in &ids {
        assert_eq!(store.registry().get(id).unwrap().status, JobStatus::Completed);
    }
    assert_eq!(store.clear_completed_jobs().len(), 3);
    assert!(store.snapshot().active_jobs.is_empty());
}

#[tokio::test]
async fn test_connection_check() {
    let h = harness(Vec::new()).await;
    let store = h.store();
    assert_eq!(store.snapshot().connection_status, ConnectionStatus::Checking);

    assert_eq!(store.check_backend_connection().await, ConnectionStatus::Connected);
    assert!(store.is_connected());
    assert!(!store.is_checking());
}
