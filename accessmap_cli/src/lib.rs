pub mod analysis;
pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod jobs;
pub mod poller;
pub mod store;
pub mod survey;
pub mod utils;
pub mod views;

pub use analysis::AnalysisService;
pub use config::ClientConfig;
pub use error::ApiError;
pub use jobs::{AnalysisKind, Job, JobRegistry, JobStatus};
pub use poller::StatusPoller;
pub use store::{AppState, Store};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use chrono::{DateTime, Utc};

/// Region used when the caller does not name one.
pub const DEFAULT_REGION: &str = "CA";

/// Result document produced by the analysis backend.
///
/// Only the collections the client reads are typed; every other key the
/// backend sends (metadata, summary, SDG alignment, ...) is kept in `extra`
/// so nothing is lost when results are re-serialized.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct AnalysisResults {
    #[serde(default)]
    pub scan_results: Vec<Gap>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub priority_areas: Vec<PriorityArea>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub survey_submissions: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An accessibility gap found by the scanner or reported through a survey.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Gap {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub issue_type: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub survey_based: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Recommendation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub priority_level: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub cost_estimate: Option<String>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub implementation_status: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub survey_based: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Recommendation {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// `priority_level` wins over the older `priority` field.
    pub fn effective_priority(&self) -> Option<&str> {
        self.priority_level
            .as_deref()
            .or(self.priority.as_deref())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum AreaLocation {
    Name(String),
    Detailed {
        address: String,
        #[serde(flatten)]
        rest: Map<String, Value>,
    },
}

impl AreaLocation {
    pub fn label(&self) -> &str {
        match self {
            AreaLocation::Name(name) => name,
            AreaLocation::Detailed { address, .. } => address,
        }
    }
}

/// A location ranked by the equity advisor.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct PriorityArea {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub location: Option<AreaLocation>,
    #[serde(default)]
    pub priority_score: f64,
    #[serde(default)]
    pub priority_level: Option<String>,
    #[serde(default)]
    pub top_issue: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AnalysisResults {
    /// Empty result set, used when a recommendation is added before any
    /// analysis has been loaded.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn severity_count(&self, severity: &str) -> usize {
        self.scan_results
            .iter()
            .filter(|gap| gap.severity.as_deref() == Some(severity))
            .count()
    }

    pub fn survey_based_count(&self) -> usize {
        self.scan_results.iter().filter(|gap| gap.survey_based).count()
    }

    pub fn is_empty(&self) -> bool {
        self.scan_results.is_empty()
            && self.recommendations.is_empty()
            && self.priority_areas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_results_keep_unknown_keys() {
        let raw = json!({
            "metadata": { "state": "CA" },
            "scan_results": [
                { "location": "Fresno, CA", "severity": "critical", "issue_type": "Missing Curb Ramps" }
            ],
            "recommendations": [],
            "priority_areas": [
                { "location": { "address": "Oakland, CA", "lat": 37.8 }, "priority_score": 8.1 }
            ]
        });

        let results: AnalysisResults = serde_json::from_value(raw).unwrap();
        assert_eq!(results.severity_count("critical"), 1);
        assert_eq!(results.priority_areas[0].location.as_ref().unwrap().label(), "Oakland, CA");
        assert!(results.extra.contains_key("metadata"));

        let back = serde_json::to_value(&results).unwrap();
        assert_eq!(back["metadata"]["state"], "CA");
    }

    #[test]
    fn test_missing_collections_default_to_empty() {
        let results: AnalysisResults = serde_json::from_value(json!({})).unwrap();
        assert!(results.is_empty());
        assert_eq!(results.survey_based_count(), 0);
    }

    #[test]
    fn test_effective_priority_prefers_level() {
        let mut rec = Recommendation::new("Curb ramps");
        rec.priority = Some("Low".into());
        assert_eq!(rec.effective_priority(), Some("Low"));
        rec.priority_level = Some("Immediate".into());
        assert_eq!(rec.effective_priority(), Some("Immediate"));
    }
}
