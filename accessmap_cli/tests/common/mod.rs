#![allow(dead_code)]

use std::time::Duration;

use accessmap_cli::store::AppState;
use accessmap_cli::{ClientConfig, Store};
use accessmap_stub::{ScriptStep, StubState};
use tempfile::TempDir;
use tokio::sync::watch;

pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub struct Harness {
    pub stub: StubState,
    pub config: ClientConfig,
    pub base_url: String,
    _dir: TempDir,
}

/// Starts a stub backend on an ephemeral port with `script` as the status
/// sequence of every submitted job.
pub async fn harness(script: Vec<ScriptStep>) -> Harness {
    let stub = StubState::with_script(script);
    let (addr, _) = accessmap_stub::spawn("127.0.0.1:0", stub.clone())
        .await
        .expect("bind stub server");
    let base_url = format!("http://{}", addr);

    let dir = tempfile::tempdir().expect("tempdir");
    let config = ClientConfig::default()
        .with_analysis_url(&base_url)
        .and_then(|c| c.with_chatbot_url(&base_url))
        .and_then(|c| c.with_survey_url(&base_url))
        .and_then(|c| c.with_poll_interval(POLL_INTERVAL))
        .expect("valid config")
        .with_saved_recommendations_path(dir.path().join("saved.json"));

    Harness {
        stub,
        config,
        base_url,
        _dir: dir,
    }
}

impl Harness {
    pub fn store(&self) -> Store {
        Store::new(&self.config)
    }
}

/// Waits until the store is no longer loading and returns that state.
pub async fn settled(rx: &mut watch::Receiver<AppState>) -> AppState {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|state| !state.loading))
        .await
        .expect("store settled in time")
        .expect("store alive")
        .clone()
}
