use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::BackendError;

/// Returned in place of a reply when a successful response carries no text
pub const NO_RESPONSE_TEXT: &str = "No response text found.";

/// How the workspace answers a prompt
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
    EnumIter, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ChatMode {
    /// General knowledge plus workspace documents
    #[default]
    Chat,
    /// Workspace documents only
    Query,
}

impl ChatMode {
    pub fn description(&self) -> &'static str {
        match self {
            ChatMode::Chat => "general knowledge plus your documents",
            ChatMode::Query => "answers only from your documents",
        }
    }

    pub fn toggled(&self) -> ChatMode {
        match self {
            ChatMode::Chat => ChatMode::Query,
            ChatMode::Query => ChatMode::Chat,
        }
    }
}

/// Per-request endpoint settings, supplied by the caller on every turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    pub base_url: String,
    pub api_key: String,
    pub workspace_slug: String,
    pub mode: ChatMode,
}

impl ChatSettings {
    /// `{base}/api/v1/workspace/{slug}/chat`
    pub fn endpoint(&self) -> String {
        format!(
            "{}/api/v1/workspace/{}/chat",
            self.base_url.trim_end_matches('/'),
            self.workspace_slug
        )
    }
}

/// Body of a workspace chat request
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    pub mode: ChatMode,
}

/// Something that can answer a prompt
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send one prompt and return the reply text
    async fn send(&self, settings: &ChatSettings, message: &str) -> Result<String, BackendError>;
}

/// Map a finished HTTP exchange to reply text.
///
/// Only a JSON object without `textResponse` yields the placeholder text;
/// an unreadable body or a non-string `textResponse` is a failure.
pub fn interpret_response(status: u16, body: &str) -> Result<String, BackendError> {
    if !(200..300).contains(&status) {
        return Err(BackendError::Status {
            status,
            body: body.to_string(),
        });
    }

    let response: Value = serde_json::from_str(body)
        .map_err(|e| BackendError::Transport(format!("invalid response body: {}", e)))?;
    let Some(fields) = response.as_object() else {
        return Err(BackendError::Transport(format!(
            "unexpected response body: {}",
            response
        )));
    };

    match fields.get("textResponse") {
        None => Ok(NO_RESPONSE_TEXT.to_string()),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Err(BackendError::Transport(format!(
            "unexpected textResponse: {}",
            other
        ))),
    }
}

/// HTTP client for the AnythingLLM workspace chat API
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
}

impl LlmClient {
    /// Build a client; `None` means requests never time out
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn send(&self, settings: &ChatSettings, message: &str) -> Result<String, BackendError> {
        let url = settings.endpoint();
        let payload = ChatRequest {
            message,
            mode: settings.mode,
        };

        tracing::debug!(%url, mode = %settings.mode, "sending chat request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", settings.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        interpret_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn settings(base_url: String) -> ChatSettings {
        ChatSettings {
            base_url,
            api_key: "secret-key".to_string(),
            workspace_slug: "team-docs".to_string(),
            mode: ChatMode::Query,
        }
    }

    /// Serve exactly one canned HTTP response and hand back the raw request
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let lower = line.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if request.len() >= header_end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).to_string()
        });

        (format!("http://{}", addr), handle)
    }

    #[test]
    fn endpoint_joins_base_and_slug() {
        let settings = settings("http://localhost:3001/".to_string());
        assert_eq!(
            settings.endpoint(),
            "http://localhost:3001/api/v1/workspace/team-docs/chat"
        );
    }

    #[test]
    fn mode_parses_and_displays_lowercase() {
        assert_eq!(ChatMode::from_str("Query").unwrap(), ChatMode::Query);
        assert_eq!(ChatMode::Chat.to_string(), "chat");
        assert_eq!(ChatMode::Chat.toggled(), ChatMode::Query);
        assert!(ChatMode::from_str("shout").is_err());
    }

    #[test]
    fn request_body_shape() {
        let body = serde_json::to_value(ChatRequest {
            message: "Hello",
            mode: ChatMode::Chat,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"message": "Hello", "mode": "chat"}));
    }

    #[test]
    fn success_extracts_text_response() {
        let text = interpret_response(200, r#"{"textResponse": "Hi!", "sources": []}"#).unwrap();
        assert_eq!(text, "Hi!");
    }

    #[test]
    fn success_without_text_uses_sentinel() {
        assert_eq!(interpret_response(200, r#"{"id": "x"}"#).unwrap(), NO_RESPONSE_TEXT);
    }

    #[test]
    fn unreadable_success_body_is_a_failure() {
        let error = interpret_response(200, "<html>502 gateway</html>").unwrap_err();
        assert!(matches!(error, BackendError::Transport(_)));
        assert!(error.to_string().starts_with("Connection Failed: invalid response body"));

        assert!(interpret_response(200, "[1, 2]").is_err());
    }

    #[test]
    fn non_string_text_response_is_a_failure() {
        let null = interpret_response(200, r#"{"textResponse": null}"#).unwrap_err();
        assert!(null.to_string().contains("unexpected textResponse: null"));

        let number = interpret_response(200, r#"{"textResponse": 42}"#).unwrap_err();
        assert!(number.to_string().contains("42"));
    }

    #[test]
    fn non_success_status_keeps_raw_body() {
        let error = interpret_response(500, "server error").unwrap_err();
        assert_eq!(
            error,
            BackendError::Status {
                status: 500,
                body: "server error".to_string()
            }
        );
    }

    #[tokio::test]
    async fn client_posts_expected_request() {
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", r#"{"textResponse":"Hi!"}"#).await;
        let client = LlmClient::new(Some(Duration::from_secs(5))).unwrap();

        let reply = client.send(&settings(base_url), "Hello there").await.unwrap();
        assert_eq!(reply, "Hi!");

        let request = server.await.unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /api/v1/workspace/team-docs/chat "));
        assert!(lower.contains("authorization: bearer secret-key"));
        assert!(lower.contains("content-type: application/json"));
        assert!(lower.contains("accept: application/json"));
        assert!(request.contains(r#""message":"Hello there""#));
        assert!(request.contains(r#""mode":"query""#));
    }

    #[tokio::test]
    async fn client_reports_status_failure() {
        let (base_url, server) = serve_once("HTTP/1.1 500 Internal Server Error", "server error").await;
        let client = LlmClient::new(Some(Duration::from_secs(5))).unwrap();

        let error = client.send(&settings(base_url), "Hello").await.unwrap_err();
        assert_eq!(error.status_code(), Some(500));
        assert!(error.to_string().contains("server error"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn client_rejects_html_success_body() {
        let (base_url, server) = serve_once("HTTP/1.1 200 OK", "<html>502 gateway</html>").await;
        let client = LlmClient::new(Some(Duration::from_secs(5))).unwrap();

        let error = client.send(&settings(base_url), "Hello").await.unwrap_err();
        assert!(matches!(error, BackendError::Transport(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn client_reports_connection_failure() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = LlmClient::new(Some(Duration::from_secs(5))).unwrap();
        let error = client
            .send(&settings(format!("http://{}", addr)), "Hello")
            .await
            .unwrap_err();
        assert!(matches!(error, BackendError::Transport(_)));
        assert!(error.to_string().starts_with("Connection Failed: "));
    }
}
