use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use crate::error::ApiError;
use crate::http::HttpClient;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SurveyLocation {
    pub city: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SurveyIssue {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A community accessibility report.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SurveySubmission {
    pub location: SurveyLocation,
    pub issue: SurveyIssue,
    #[serde(default)]
    pub impact: Map<String, Value>,
    #[serde(default)]
    pub demographics: Map<String, Value>,
    #[serde(default)]
    pub contact: Map<String, Value>,
}

impl SurveySubmission {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.location.coordinates.is_none() {
            return Err(ApiError::InvalidInput(
                "Location coordinates are required. Please select a location on the map.".into(),
            ));
        }
        Ok(())
    }
}

/// Recommendation the survey service generates for a report.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct AiRecommendation {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub cost_estimate: Option<String>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    #[serde(default)]
    pub expected_impact: Option<String>,
    #[serde(default)]
    pub implementation_partners: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SurveyReceipt {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub survey_id: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub ai_recommendation: Option<AiRecommendation>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct SurveyListing {
    #[serde(default)]
    pub surveys: Vec<Value>,
    #[serde(default)]
    pub total: usize,
}

#[derive(Clone, Debug)]
pub struct SurveyClient {
    http: HttpClient,
}

impl SurveyClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(base_url),
        }
    }

    /// Posts a report. Reports without coordinates are rejected locally.
    pub async fn submit(&self, submission: &SurveySubmission) -> Result<SurveyReceipt, ApiError> {
        submission.validate()?;
        let receipt: SurveyReceipt = self.http.post("/survey", submission).await?;
        info!(
            survey_id = receipt.survey_id.as_deref().unwrap_or("-"),
            ai_recommendation = receipt.ai_recommendation.is_some(),
            "survey submitted"
        );
        Ok(receipt)
    }

    pub async fn list(&self) -> Result<SurveyListing, ApiError> {
        self.http.get("/surveys").await
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PlanStep {
    pub title: String,
    pub description: String,
    pub priority: String,
    pub timeline: String,
    pub cost_estimate: String,
    pub implementation_steps: Vec<String>,
}

/// What the reporter is told will happen with their report.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ResponsePlan {
    pub summary: String,
    pub recommendations: Vec<PlanStep>,
    pub ai_generated: bool,
}

impl ResponsePlan {
    /// Uses the AI recommendation when the service produced one, otherwise
    /// a standard acknowledgement whose urgency follows `severity`.
    pub fn from_receipt(receipt: &SurveyReceipt, severity: &str) -> Self {
        match &receipt.ai_recommendation {
            Some(rec) => Self {
                summary: "AI-powered accessibility recommendation generated based on your report"
                    .to_string(),
                recommendations: vec![PlanStep {
                    title: rec.title.clone(),
                    description: rec.description.clone(),
                    priority: rec.priority.clone().unwrap_or_else(|| "Medium".to_string()),
                    timeline: rec.timeline.clone().unwrap_or_else(|| "TBD".to_string()),
                    cost_estimate: rec
                        .cost_estimate
                        .clone()
                        .unwrap_or_else(|| "TBD after assessment".to_string()),
                    implementation_steps: rec.recommended_actions.clone(),
                }],
                ai_generated: true,
            },
            None => {
                let critical = severity.eq_ignore_ascii_case("critical");
                Self {
                    summary: "Thank you for your accessibility report".to_string(),
                    recommendations: vec![PlanStep {
                        title: "Accessibility Issue Response Plan".to_string(),
                        description: "Your report has been received and will be reviewed by accessibility experts.".to_string(),
                        priority: if critical { "High" } else { "Medium" }.to_string(),
                        timeline: if critical { "1-2 weeks" } else { "2-4 weeks" }.to_string(),
                        cost_estimate: "TBD after assessment".to_string(),
                        implementation_steps: vec![
                            "Issue logged in accessibility tracking system".to_string(),
                            "Site assessment will be scheduled".to_string(),
                            "Local accessibility coordinator will be notified".to_string(),
                            "Community will receive updates on progress".to_string(),
                        ],
                    }],
                    ai_generated: false,
                }
            }
        }
    }
}
