use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::ApiError;

/// Thin JSON wrapper around `reqwest` bound to one service base URL.
///
/// A single attempt per call: no retry, no backoff, no client-side timeout.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let request = self.client.get(self.url(endpoint));
        self.send(endpoint, request).await
    }

    pub async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.client.post(self.url(endpoint)).json(body);
        self.send(endpoint, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let result = self.execute(request).await;
        if let Err(e) = &result {
            error!(endpoint, base_url = %self.base_url, error = %e, "API request failed");
        }
        result
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let response = request.headers(headers).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }

        let bytes = response.bytes().await?;
        debug!(status = status.as_u16(), len = bytes.len(), "API response received");
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Human message for a non-2xx response: the server's `detail` (or
/// `message`/`error`) string if the body is JSON, else the status line.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["detail", "message", "error"]
                .iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_else(|| {
            format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_detail() {
        let msg = error_message(
            StatusCode::NOT_FOUND,
            r#"{"detail": "Job not found", "message": "ignored"}"#,
        );
        assert_eq!(msg, "Job not found");
    }

    #[test]
    fn test_error_message_falls_back_to_message_and_error() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"message": "Database error"}"#),
            "Database error"
        );
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"error": "Job not found"}"#),
            "Job not found"
        );
    }

    #[test]
    fn test_error_message_uses_status_line() {
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>"),
            "HTTP 500: Internal Server Error"
        );
        // Non-string detail (validation error lists) is not a message.
        assert_eq!(
            error_message(StatusCode::UNPROCESSABLE_ENTITY, r#"{"detail": [{"loc": ["body"]}]}"#),
            "HTTP 422: Unprocessable Entity"
        );
    }

    #[test]
    fn test_url_join() {
        let client = HttpClient::new("http://localhost:8002");
        assert_eq!(client.url("/status/abc"), "http://localhost:8002/status/abc");
    }
}
