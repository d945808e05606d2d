use dashmap::DashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One answer of a scripted job, handed out per status query.
#[derive(Clone, Debug, PartialEq)]
pub enum ScriptStep {
    Running(String),
    Completed,
    Failed {
        message: Option<String>,
        error: Option<String>,
    },
    /// The status endpoint itself answers with this HTTP error.
    StatusError(u16, String),
}

impl ScriptStep {
    pub fn running(stage: &str) -> Self {
        ScriptStep::Running(stage.to_string())
    }

    pub fn failed(message: &str) -> Self {
        ScriptStep::Failed {
            message: Some(message.to_string()),
            error: None,
        }
    }
}

pub fn default_script() -> Vec<ScriptStep> {
    vec![
        ScriptStep::running("fetching_data"),
        ScriptStep::running("running_agents"),
        ScriptStep::Completed,
    ]
}

#[derive(Clone, Debug)]
pub struct StubJob {
    pub kind: String,
    pub region: String,
    pub status: String,
    pub stage: Option<String>,
    pub results: Option<Value>,
    pending: VecDeque<ScriptStep>,
    last: Option<ScriptStep>,
}

impl StubJob {
    pub fn new(kind: &str, region: &str, script: Vec<ScriptStep>) -> Self {
        StubJob {
            kind: kind.to_string(),
            region: region.to_string(),
            status: "started".to_string(),
            stage: Some("initializing".to_string()),
            results: None,
            pending: script.into(),
            last: None,
        }
    }

    /// Moves one step along the script. Once the script runs out the last
    /// step keeps being answered.
    pub fn advance(&mut self) -> Option<ScriptStep> {
        if let Some(step) = self.pending.pop_front() {
            self.last = Some(step);
        }
        self.last.clone()
    }
}

// job_id -> job, region -> latest results
#[derive(Clone, Debug)]
pub struct StubState {
    pub jobs: Arc<DashMap<String, StubJob>>,
    pub latest: Arc<DashMap<String, Value>>,
    pub surveys: Arc<Mutex<Vec<Value>>>,
    script: Arc<Mutex<Vec<ScriptStep>>>,
    status_queries: Arc<AtomicUsize>,
}

impl StubState {
    pub fn new() -> Self {
        Self::with_script(default_script())
    }

    pub fn with_script(script: Vec<ScriptStep>) -> Self {
        StubState {
            jobs: Arc::new(DashMap::new()),
            latest: Arc::new(DashMap::new()),
            surveys: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(script)),
            status_queries: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script handed to jobs submitted from now on.
    pub fn set_script(&self, script: Vec<ScriptStep>) {
        if let Ok(mut current) = self.script.lock() {
            *current = script;
        }
    }

    pub fn script(&self) -> Vec<ScriptStep> {
        self.script.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn seed_latest(&self, region: &str, results: Value) {
        self.latest.insert(region.to_uppercase(), results);
    }

    pub fn surveys(&self) -> Vec<Value> {
        self.surveys.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn record_status_query(&self) {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
    }

    /// Status requests answered so far, including those for unknown jobs.
    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }
}

impl Default for StubState {
    fn default() -> Self {
        Self::new()
    }
}
