//! Per-job status polling.
//!
//! Each polled job gets its own tokio task and `CancellationToken`. The task
//! stops itself on a terminal status or on the first error; nothing is retried.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::jobs::{JobRegistry, JobStatus, JobUpdate, StatusReport};
use crate::AnalysisResults;

/// Where the poller reads job status and results from.
#[async_trait]
pub trait JobSource: Send + Sync + 'static {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusReport, ApiError>;
    async fn fetch_results(&self, job_id: &str) -> Result<AnalysisResults, ApiError>;
}

/// Receives the outcome of a poll loop.
///
/// `on_status` fires for every status fetched; exactly one of `on_complete`
/// or `on_error` fires when the loop ends on its own.
pub trait PollObserver: Send + Sync + 'static {
    fn on_status(&self, job_id: &str, report: &StatusReport);
    fn on_complete(&self, job_id: &str, results: AnalysisResults);
    fn on_error(&self, job_id: &str, error: ApiError);
}

struct PollHandle {
    token: CancellationToken,
    generation: u64,
}

pub struct StatusPoller {
    source: Arc<dyn JobSource>,
    registry: JobRegistry,
    interval: Duration,
    tasks: Arc<DashMap<String, PollHandle>>,
    generation: AtomicU64,
}

impl StatusPoller {
    pub fn new(source: Arc<dyn JobSource>, registry: JobRegistry, interval: Duration) -> Self {
        Self {
            source,
            registry,
            interval,
            tasks: Arc::new(DashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts polling `job_id`, replacing any poll loop already running for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_polling(&self, job_id: &str, observer: Arc<dyn PollObserver>) {
        self.stop_polling(job_id);

        let token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        self.tasks.insert(
            job_id.to_string(),
            PollHandle {
                token: token.clone(),
                generation,
            },
        );

        let poll = PollLoop {
            job_id: job_id.to_string(),
            generation,
            token,
            interval: self.interval,
            source: Arc::clone(&self.source),
            registry: self.registry.clone(),
            tasks: Arc::clone(&self.tasks),
            observer,
        };

        info!(job_id, interval_ms = self.interval.as_millis() as u64, "started status polling");
        tokio::spawn(poll.run());
    }

    /// Cancels polling for `job_id`. Safe on unknown or already stopped ids.
    pub fn stop_polling(&self, job_id: &str) -> bool {
        match self.tasks.remove(job_id) {
            Some((_, handle)) => {
                handle.token.cancel();
                debug!(job_id, "stopped status polling");
                true
            }
            None => false,
        }
    }

    pub fn stop_all_polling(&self) {
        let job_ids: Vec<String> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        for job_id in job_ids {
            self.stop_polling(&job_id);
        }
    }

    pub fn is_polling(&self, job_id: &str) -> bool {
        self.tasks.contains_key(job_id)
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.stop_all_polling();
    }
}

struct PollLoop {
    job_id: String,
    generation: u64,
    token: CancellationToken,
    interval: Duration,
    source: Arc<dyn JobSource>,
    registry: JobRegistry,
    tasks: Arc<DashMap<String, PollHandle>>,
    observer: Arc<dyn PollObserver>,
}

impl PollLoop {
    async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.tick().await.is_break() {
                break;
            }
        }

        self.release();
    }

    async fn tick(&self) -> ControlFlow<()> {
        // Dropping the fetch on cancel means a stopped job never sees a late response.
        let fetched = tokio::select! {
            _ = self.token.cancelled() => return ControlFlow::Break(()),
            fetched = self.source.fetch_status(&self.job_id) => fetched,
        };

        let report = match fetched {
            Ok(report) => report,
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "status fetch failed");
                self.release();
                self.observer.on_error(&self.job_id, e);
                return ControlFlow::Break(());
            }
        };

        self.registry.update(&self.job_id, &JobUpdate::from(&report));
        self.observer.on_status(&self.job_id, &report);

        match report.status {
            JobStatus::Completed => {
                // Still stoppable until the results are in.
                let fetched = tokio::select! {
                    _ = self.token.cancelled() => return ControlFlow::Break(()),
                    fetched = self.source.fetch_results(&self.job_id) => fetched,
                };
                self.release();
                match fetched {
                    Ok(results) => {
                        info!(job_id = %self.job_id, "analysis completed");
                        self.observer.on_complete(&self.job_id, results);
                    }
                    Err(e) => {
                        warn!(job_id = %self.job_id, error = %e, "results fetch failed");
                        self.observer.on_error(&self.job_id, e);
                    }
                }
                ControlFlow::Break(())
            }
            JobStatus::Failed => {
                self.release();
                let message = report.failure_message();
                warn!(job_id = %self.job_id, %message, "analysis failed");
                self.observer.on_error(&self.job_id, ApiError::JobFailed(message));
                ControlFlow::Break(())
            }
            JobStatus::Started | JobStatus::Running => ControlFlow::Continue(()),
        }
    }

    /// Drops this loop's map entry unless a newer loop has replaced it.
    fn release(&self) {
        self.tasks
            .remove_if(&self.job_id, |_, handle| handle.generation == self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{AnalysisKind, Job};
    use crate::Recommendation;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    const TICK: Duration = Duration::from_millis(10);

    struct ScriptedSource {
        statuses: Mutex<VecDeque<Result<StatusReport, ApiError>>>,
        results: Mutex<Option<Result<AnalysisResults, ApiError>>>,
        status_calls: AtomicU64,
        delay: Duration,
        results_delay: Duration,
    }

    impl ScriptedSource {
        fn new(statuses: Vec<Result<StatusReport, ApiError>>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                results: Mutex::new(None),
                status_calls: AtomicU64::new(0),
                delay: Duration::ZERO,
                results_delay: Duration::ZERO,
            }
        }

        fn with_results(self, results: Result<AnalysisResults, ApiError>) -> Self {
            *self.results.lock().unwrap() = Some(results);
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn with_results_delay(mut self, delay: Duration) -> Self {
            self.results_delay = delay;
            self
        }
    }

    #[async_trait]
    impl JobSource for ScriptedSource {
        async fn fetch_status(&self, _job_id: &str) -> Result<StatusReport, ApiError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(StatusReport::new(JobStatus::Running)))
        }

        async fn fetch_results(&self, _job_id: &str) -> Result<AnalysisResults, ApiError> {
            if !self.results_delay.is_zero() {
                tokio::time::sleep(self.results_delay).await;
            }
            self.results
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(AnalysisResults::default()))
        }
    }

    #[derive(Debug)]
    enum Event {
        Status(JobStatus),
        Complete(usize),
        Error(String),
    }

    struct ChannelObserver(mpsc::UnboundedSender<Event>);

    impl PollObserver for ChannelObserver {
        fn on_status(&self, _job_id: &str, report: &StatusReport) {
            let _ = self.0.send(Event::Status(report.status));
        }

        fn on_complete(&self, _job_id: &str, results: AnalysisResults) {
            let _ = self.0.send(Event::Complete(results.recommendations.len()));
        }

        fn on_error(&self, _job_id: &str, error: ApiError) {
            let _ = self.0.send(Event::Error(error.to_string()));
        }
    }

    fn setup(source: ScriptedSource) -> (StatusPoller, JobRegistry, Arc<ScriptedSource>) {
        let registry = JobRegistry::new();
        registry.register(Job::new("job-1", AnalysisKind::Complete, "CA"));
        let source = Arc::new(source);
        let poller = StatusPoller::new(source.clone(), registry.clone(), TICK);
        (poller, registry, source)
    }

    async fn collect_until_terminal(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("poll loop stalled")
                .expect("observer dropped");
            let done = matches!(event, Event::Complete(_) | Event::Error(_));
            events.push(event);
            if done {
                return events;
            }
        }
    }

    fn results_with(n: usize) -> AnalysisResults {
        AnalysisResults {
            recommendations: (0..n).map(|i| Recommendation::new(format!("rec {}", i))).collect(),
            ..AnalysisResults::default()
        }
    }

    #[tokio::test]
    async fn test_running_then_completed_delivers_results_once() {
        let source = ScriptedSource::new(vec![
            Ok(StatusReport::new(JobStatus::Running).with_stage("fetching_data")),
            Ok(StatusReport::new(JobStatus::Running).with_stage("running_agents")),
            Ok(StatusReport::new(JobStatus::Completed)),
        ])
        .with_results(Ok(results_with(3)));
        let (poller, registry, _) = setup(source);
        let (tx, mut rx) = mpsc::unbounded_channel();

        poller.start_polling("job-1", Arc::new(ChannelObserver(tx)));
        assert!(poller.is_polling("job-1"));

        let events = collect_until_terminal(&mut rx).await;
        assert!(matches!(
            events.as_slice(),
            [
                Event::Status(JobStatus::Running),
                Event::Status(JobStatus::Running),
                Event::Status(JobStatus::Completed),
                Event::Complete(3)
            ]
        ));

        assert!(!poller.is_polling("job-1"));
        let job = registry.get("job-1").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.stage.as_deref(), Some("running_agents"));

        tokio::time::sleep(TICK * 5).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_status_surfaces_message() {
        let mut failed = StatusReport::new(JobStatus::Failed);
        failed.message = Some("X".into());
        let (poller, _, _) = setup(ScriptedSource::new(vec![Ok(failed)]));
        let (tx, mut rx) = mpsc::unbounded_channel();

        poller.start_polling("job-1", Arc::new(ChannelObserver(tx)));
        let events = collect_until_terminal(&mut rx).await;

        assert!(matches!(events.last(), Some(Event::Error(msg)) if msg == "X"));
        assert_eq!(poller.active_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_status_without_message_uses_default() {
        let (poller, _, _) = setup(ScriptedSource::new(vec![Ok(StatusReport::new(JobStatus::Failed))]));
        let (tx, mut rx) = mpsc::unbounded_channel();

        poller.start_polling("job-1", Arc::new(ChannelObserver(tx)));
        let events = collect_until_terminal(&mut rx).await;

        assert!(matches!(events.last(), Some(Event::Error(msg)) if msg == "Analysis failed"));
    }

    #[tokio::test]
    async fn test_status_fetch_error_stops_loop() {
        let source = ScriptedSource::new(vec![Err(ApiError::Http {
            status: 404,
            message: "Job not found".into(),
        })]);
        let (poller, _, source) = setup(source);
        let (tx, mut rx) = mpsc::unbounded_channel();

        poller.start_polling("job-1", Arc::new(ChannelObserver(tx)));
        let events = collect_until_terminal(&mut rx).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::Error(msg) if msg == "Job not found"));

        tokio::time::sleep(TICK * 5).await;
        assert_eq!(source.status_calls.load(Ordering::SeqCst), 1);
        assert!(!poller.is_polling("job-1"));
    }

    #[tokio::test]
    async fn test_results_fetch_error_goes_to_on_error() {
        let source = ScriptedSource::new(vec![Ok(StatusReport::new(JobStatus::Completed))])
            .with_results(Err(ApiError::Http {
                status: 425,
                message: "Analysis not yet completed".into(),
            }));
        let (poller, _, _) = setup(source);
        let (tx, mut rx) = mpsc::unbounded_channel();

        poller.start_polling("job-1", Arc::new(ChannelObserver(tx)));
        let events = collect_until_terminal(&mut rx).await;

        assert!(matches!(
            events.as_slice(),
            [Event::Status(JobStatus::Completed), Event::Error(msg)] if msg == "Analysis not yet completed"
        ));
    }

    #[tokio::test]
    async fn test_stop_polling_silences_callbacks() {
        let (poller, _, source) = setup(ScriptedSource::new(Vec::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        poller.start_polling("job-1", Arc::new(ChannelObserver(tx)));
        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        assert!(matches!(first, Some(Event::Status(JobStatus::Running))));

        assert!(poller.stop_polling("job-1"));
        assert!(!poller.stop_polling("job-1"));
        assert!(!poller.stop_polling("never-started"));

        // Drain anything that was already queued before the stop.
        tokio::time::sleep(TICK).await;
        while rx.try_recv().is_ok() {}
        let calls = source.status_calls.load(Ordering::SeqCst);

        tokio::time::sleep(TICK * 10).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(source.status_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_stop_discards_in_flight_response() {
        let source = ScriptedSource::new(vec![Ok(StatusReport::new(JobStatus::Completed))])
            .with_delay(Duration::from_millis(100));
        let (poller, registry, source) = setup(source);
        let (tx, mut rx) = mpsc::unbounded_channel();

        poller.start_polling("job-1", Arc::new(ChannelObserver(tx)));
        while source.status_calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        poller.stop_polling("job-1");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(registry.get("job-1").unwrap().status, JobStatus::Started);
    }

    #[tokio::test]
    async fn test_stop_during_results_fetch_suppresses_completion() {
        let source = ScriptedSource::new(vec![Ok(StatusReport::new(JobStatus::Completed))])
            .with_results(Ok(results_with(2)))
            .with_results_delay(TICK * 10);
        let (poller, _, _) = setup(source);
        let (tx, mut rx) = mpsc::unbounded_channel();

        poller.start_polling("job-1", Arc::new(ChannelObserver(tx)));
        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("status delivered")
            .expect("observer alive");
        assert!(matches!(first, Event::Status(JobStatus::Completed)));

        // The results request is on the wire and the loop is still stoppable.
        assert!(poller.is_polling("job-1"));
        assert!(poller.stop_polling("job-1"));

        tokio::time::sleep(TICK * 15).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(poller.active_count(), 0);
    }

    #[tokio::test]
    async fn test_restart_replaces_previous_loop() {
        let (poller, _, _) = setup(ScriptedSource::new(Vec::new()));
        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();

        poller.start_polling("job-1", Arc::new(ChannelObserver(old_tx)));
        poller.start_polling("job-1", Arc::new(ChannelObserver(new_tx)));
        assert_eq!(poller.active_count(), 1);

        let event = tokio::time::timeout(Duration::from_secs(2), new_rx.recv()).await.unwrap();
        assert!(event.is_some());
        assert!(old_rx.try_recv().is_err());
        assert!(poller.is_polling("job-1"));
        poller.stop_all_polling();
        assert_eq!(poller.active_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_all_polling_cancels_every_job() {
        let (poller, registry, _) = setup(ScriptedSource::new(Vec::new()));
        registry.register(Job::new("job-2", AnalysisKind::Scan, "CA"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let observer: Arc<dyn PollObserver> = Arc::new(ChannelObserver(tx));

        poller.start_polling("job-1", observer.clone());
        poller.start_polling("job-2", observer);
        assert_eq!(poller.active_count(), 2);

        poller.stop_all_polling();
        assert_eq!(poller.active_count(), 0);
        assert!(!poller.is_polling("job-2"));
    }
}
