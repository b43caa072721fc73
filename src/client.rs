use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default ceiling on a single completion request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no model selected — pick one with /model <id>")]
    NoModelSelected,
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response shape: {0}")]
    MalformedBody(String),
}

impl DispatchError {
    fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            DispatchError::Timeout(timeout)
        } else {
            DispatchError::Transport(e.to_string())
        }
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
struct ModelInfo {
    id: String,
}

// ── Backend seam ──────────────────────────────────────────────────────────────

/// Anything that can answer a single-message chat completion.
pub trait CompletionBackend {
    fn complete(
        &self,
        model: &str,
        prompt: &str,
    ) -> impl Future<Output = Result<String, DispatchError>> + Send;
}

// ── Client ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    pub endpoint: String,
    timeout: Duration,
    api_key: Option<String>,
}

impl Client {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            timeout,
            api_key: None,
        }
    }

    pub fn set_api_key(&mut self, key: String) {
        self.api_key = Some(key);
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.endpoint.trim_end_matches('/'))
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("Authorization", format!("Bearer {key}")),
            None => req,
        }
    }

    /// Model ids the backend advertises, in the order it lists them.
    pub async fn list_models(&self) -> Result<Vec<String>, DispatchError> {
        let req = self.authorize(self.http.get(self.url("models")));
        let body = self.send_and_read(req).await?;
        let list: ModelList =
            serde_json::from_str(&body).map_err(|e| DispatchError::MalformedBody(e.to_string()))?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    /// Send one user message and return the first choice's content.
    pub async fn chat(&self, model: &str, prompt: &str) -> Result<String, DispatchError> {
        if model.trim().is_empty() {
            return Err(DispatchError::NoModelSelected);
        }
        let payload = ChatRequest {
            model,
            messages: [WireMessage { role: "user", content: prompt }],
        };
        let req = self.authorize(
            self.http
                .post(self.url("chat/completions"))
                .header("Content-Type", "application/json")
                .json(&payload),
        );

        tracing::debug!(model, prompt_chars = prompt.chars().count(), "chat: sending");
        let body = self.send_and_read(req).await?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| DispatchError::MalformedBody(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| DispatchError::MalformedBody("response contained no choices".to_string()))
    }

    /// Send, check status, and read the body — all under the request ceiling.
    async fn send_and_read(&self, req: reqwest::RequestBuilder) -> Result<String, DispatchError> {
        let timeout = self.timeout;
        let work = async {
            let resp = req.send().await.map_err(|e| DispatchError::from_reqwest(e, timeout))?;
            let status = resp.status();
            let text = resp.text().await.map_err(|e| DispatchError::from_reqwest(e, timeout))?;
            if !status.is_success() {
                return Err(DispatchError::Status { status: status.as_u16(), body: text });
            }
            Ok(text)
        };
        match tokio::time::timeout(timeout, work).await {
            Ok(res) => res,
            Err(_) => {
                tracing::warn!(secs = timeout.as_secs(), "request aborted on timeout");
                Err(DispatchError::Timeout(timeout))
            }
        }
    }
}

impl CompletionBackend for Client {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, DispatchError> {
        self.chat(model, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> Client {
        Client::new(server.uri(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_chat_sends_single_user_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_json(json!({
                "model": "llama3",
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "hello!"}},
                    {"message": {"role": "assistant", "content": "ignored"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server).chat("llama3", "hi").await.unwrap();
        assert_eq!(reply, "hello!");
    }

    #[tokio::test]
    async fn test_chat_sends_bearer_when_key_set() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = client_for(&server);
        client.set_api_key("sk-test".to_string());
        assert_eq!(client.chat("m", "p").await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server).chat("m", "p").await.unwrap_err();
        assert_eq!(err, DispatchError::Status { status: 500, body: "boom".to_string() });
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
            .mount(&server)
            .await;

        let err = client_for(&server).chat("m", "p").await.unwrap_err();
        assert!(matches!(err, DispatchError::MalformedBody(_)));
    }

    #[tokio::test]
    async fn test_empty_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client_for(&server).chat("m", "p").await.unwrap_err();
        assert!(matches!(err, DispatchError::MalformedBody(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(json!({"choices": [{"message": {"content": "late"}}]})),
            )
            .mount(&server)
            .await;

        let client = Client::new(server.uri(), Duration::from_millis(50));
        let err = client.chat("m", "p").await.unwrap_err();
        assert!(matches!(err, DispatchError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_empty_model_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server).chat("  ", "p").await.unwrap_err();
        assert_eq!(err, DispatchError::NoModelSelected);
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"id": "qwen3:8b", "object": "model"}, {"id": "llama3"}]
            })))
            .mount(&server)
            .await;

        let models = client_for(&server).list_models().await.unwrap();
        assert_eq!(models, vec!["qwen3:8b", "llama3"]);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        // Port 9 (discard) on localhost is reliably closed in test sandboxes
        let client = Client::new("http://127.0.0.1:9".to_string(), Duration::from_secs(2));
        let err = client.list_models().await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_) | DispatchError::Timeout(_)));
    }
}
