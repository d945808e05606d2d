use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::ApiError;
use crate::http::HttpClient;
use crate::AnalysisResults;

pub const FALLBACK_REPLY: &str = "I apologize, but I'm having trouble connecting to my AI services right now. Please try again in a moment, or you can explore the accessibility data directly.";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// Counts of what the dashboard currently shows, sent along with a question.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultsDigest {
    pub gaps_count: usize,
    pub recommendations_count: usize,
    pub priority_areas_count: usize,
}

impl From<&AnalysisResults> for ResultsDigest {
    fn from(results: &AnalysisResults) -> Self {
        Self {
            gaps_count: results.scan_results.len(),
            recommendations_count: results.recommendations.len(),
            priority_areas_count: results.priority_areas.len(),
        }
    }
}

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_gap: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_recommendation: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultsDigest>,
}

impl ChatContext {
    pub fn from_results(results: Option<&AnalysisResults>) -> Self {
        Self {
            results: results.map(ResultsDigest::from),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<ChatTurn>,
    pub context: ChatContext,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChatReply {
    pub message: String,
    #[serde(default)]
    pub context_used: Option<Value>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Set when the reply was produced locally because the service failed.
    #[serde(skip)]
    pub fallback: bool,
}

impl ChatReply {
    fn fallback() -> Self {
        Self {
            message: FALLBACK_REPLY.to_string(),
            context_used: None,
            suggestions: Vec::new(),
            fallback: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChatClient {
    http: HttpClient,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(base_url),
        }
    }

    pub async fn send(&self, request: &ChatRequest) -> Result<ChatReply, ApiError> {
        self.http.post("/chatbot", request).await
    }
}

/// A conversation with the assistant that remembers its history.
pub struct ChatSession {
    client: ChatClient,
    history: Vec<ChatTurn>,
}

impl ChatSession {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    /// Sends `message` with the prior turns. Never fails: when the service
    /// cannot be reached the answer is a canned apology with `fallback` set.
    pub async fn ask(&mut self, message: &str, context: ChatContext) -> ChatReply {
        let request = ChatRequest {
            message: message.to_string(),
            history: self.history.clone(),
            context,
        };

        self.history.push(ChatTurn {
            role: ChatRole::User,
            content: message.to_string(),
        });

        let reply = match self.client.send(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "chatbot request failed, using fallback reply");
                ChatReply::fallback()
            }
        };

        self.history.push(ChatTurn {
            role: ChatRole::Assistant,
            content: reply.message.clone(),
        });
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let results = AnalysisResults::default();
        let mut context = ChatContext::from_results(Some(&results));
        context.chat_mode = Some("general".into());
        let request = ChatRequest {
            message: "Where should we start?".into(),
            history: vec![ChatTurn {
                role: ChatRole::Assistant,
                content: "Hello".into(),
            }],
            context,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "message": "Where should we start?",
                "history": [{ "role": "assistant", "content": "Hello" }],
                "context": {
                    "chatMode": "general",
                    "results": { "gaps_count": 0, "recommendations_count": 0, "priority_areas_count": 0 }
                }
            })
        );
    }

    #[test]
    fn test_empty_context_sends_no_nulls() {
        let context = ChatContext::from_results(None);
        assert_eq!(serde_json::to_value(&context).unwrap(), json!({}));
    }

    #[test]
    fn test_reply_defaults() {
        let reply: ChatReply = serde_json::from_value(json!({ "message": "Start with curb ramps." })).unwrap();
        assert!(reply.suggestions.is_empty());
        assert!(!reply.fallback);
    }

    #[tokio::test]
    async fn test_unreachable_service_falls_back() {
        let mut session = ChatSession::new(ChatClient::new("http://127.0.0.1:9"));
        let reply = session.ask("hello?", ChatContext::default()).await;

        assert!(reply.fallback);
        assert_eq!(reply.message, FALLBACK_REPLY);
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[0].role, ChatRole::User);
    }
}
