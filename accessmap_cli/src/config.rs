use std::env;
use std::path::PathBuf;
use std::time::Duration;

use dotenv::dotenv;
use url::Url;

use crate::error::ApiError;

pub const DEFAULT_ANALYSIS_URL: &str = "http://localhost:8002";
pub const DEFAULT_CHATBOT_URL: &str = "http://localhost:8003";
pub const DEFAULT_SURVEY_URL: &str = "http://localhost:8003";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_SAVED_RECOMMENDATIONS: &str = "saved_chat_recommendations.json";

/// Where the client finds its three remote services and how often it polls.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub analysis_base_url: String,
    pub chatbot_base_url: String,
    pub survey_base_url: String,
    pub poll_interval: Duration,
    pub saved_recommendations_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            analysis_base_url: DEFAULT_ANALYSIS_URL.to_string(),
            chatbot_base_url: DEFAULT_CHATBOT_URL.to_string(),
            survey_base_url: DEFAULT_SURVEY_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            saved_recommendations_path: PathBuf::from(DEFAULT_SAVED_RECOMMENDATIONS),
        }
    }
}

impl ClientConfig {
    /// Reads `.env` and the `ACCESSMAP_*` variables on top of the defaults.
    pub fn from_env() -> Result<Self, ApiError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = lookup("ACCESSMAP_API_URL") {
            config = config.with_analysis_url(url)?;
        }
        if let Some(url) = lookup("ACCESSMAP_CHATBOT_URL") {
            config = config.with_chatbot_url(url)?;
        }
        if let Some(url) = lookup("ACCESSMAP_SURVEY_URL") {
            config = config.with_survey_url(url)?;
        }
        if let Some(ms) = lookup("ACCESSMAP_POLL_INTERVAL_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .map_err(|_| ApiError::Config(format!("ACCESSMAP_POLL_INTERVAL_MS is not a number: {}", ms)))?;
            config = config.with_poll_interval(Duration::from_millis(ms))?;
        }
        if let Some(path) = lookup("ACCESSMAP_SAVED_RECOMMENDATIONS") {
            config.saved_recommendations_path = PathBuf::from(path);
        }

        Ok(config)
    }

    pub fn with_analysis_url(mut self, url: impl AsRef<str>) -> Result<Self, ApiError> {
        self.analysis_base_url = normalize_base_url(url.as_ref())?;
        Ok(self)
    }

    pub fn with_chatbot_url(mut self, url: impl AsRef<str>) -> Result<Self, ApiError> {
        self.chatbot_base_url = normalize_base_url(url.as_ref())?;
        Ok(self)
    }

    pub fn with_survey_url(mut self, url: impl AsRef<str>) -> Result<Self, ApiError> {
        self.survey_base_url = normalize_base_url(url.as_ref())?;
        Ok(self)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Result<Self, ApiError> {
        if interval.is_zero() {
            return Err(ApiError::Config("poll interval must be greater than zero".into()));
        }
        self.poll_interval = interval;
        Ok(self)
    }

    pub fn with_saved_recommendations_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.saved_recommendations_path = path.into();
        self
    }
}

/// Validates an http(s) base URL and strips trailing slashes so endpoints can
/// be appended with a leading `/`.
fn normalize_base_url(raw: &str) -> Result<String, ApiError> {
    let parsed = Url::parse(raw.trim())
        .map_err(|e| ApiError::Config(format!("invalid base URL {:?}: {}", raw, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::Config(format!(
            "base URL must use http or https: {}",
            raw
        )));
    }

    Ok(raw.trim().trim_end_matches('/').to_string())
}
