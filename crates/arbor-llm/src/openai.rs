use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::provider::{GenerationParams, LlmProvider, Message};
use crate::rate_limit::RateLimiter;
use crate::retry::send_with_retry;

/// Nucleus sampling used for every digest call.
const TOP_P: f32 = 0.9;

/// Client for any endpoint speaking the OpenAI chat-completions and embeddings API.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: Option<String>,
    name: String,
    max_retries: u32,
    limiter: Option<Arc<RateLimiter>>,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("name", &self.name)
            .field("max_retries", &self.max_retries)
            .field("rate_limited", &self.limiter.is_some())
            .finish()
    }
}

impl OpenAiProvider {
    #[must_use]
    pub fn new(
        api_key: String,
        mut base_url: String,
        model: String,
        embedding_model: Option<String>,
    ) -> Self {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: crate::http::default_client(),
            api_key,
            base_url,
            model,
            embedding_model,
            name: "openai".into(),
            max_retries: 2,
            limiter: None,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Name reported in logs and errors, e.g. the compatible endpoint's label.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Share a limiter with this provider. Every attempt, retries included, waits on it.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<String, LlmError> {
        let url = format!("{}/{path}", self.base_url);
        let response = send_with_retry(
            &self.name,
            self.max_retries,
            self.limiter.as_deref(),
            || {
                self.client
                    .post(&url)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .header("Content-Type", "application/json")
                    .json(body)
                    .send()
            },
        )
        .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;

        if !status.is_success() {
            tracing::error!("{} API error {status}: {text}", self.name);
            return Err(LlmError::Status {
                provider: self.name.clone(),
                status: status.as_u16(),
            });
        }

        Ok(text)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl LlmProvider for OpenAiProvider {
    async fn chat(
        &self,
        messages: &[Message],
        params: GenerationParams,
    ) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: params.temperature,
            top_p: TOP_P,
            max_tokens: params.max_tokens,
        };
        let text = self.post("chat/completions", &body).await?;
        let resp: ChatResponse = serde_json::from_str(&text)?;

        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_owned())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: self.name.clone(),
            });
        }
        Ok(content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let Some(model) = self.embedding_model.as_deref() else {
            return Err(LlmError::EmbedUnsupported {
                provider: self.name.clone(),
            });
        };

        let body = EmbeddingRequest { input: text, model };
        let raw = self.post("embeddings", &body).await?;
        let resp: EmbeddingResponse = serde_json::from_str(&raw)?;

        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(LlmError::EmptyResponse {
                provider: self.name.clone(),
            })
    }

    fn supports_embeddings(&self) -> bool {
        self.embedding_model.is_some()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{json_response, spawn};

    fn provider(port: u16) -> OpenAiProvider {
        OpenAiProvider::new(
            "sk-test".into(),
            format!("http://127.0.0.1:{port}/v1/"),
            "gpt-test".into(),
            Some("embed-test".into()),
        )
        .with_max_retries(0)
    }

    #[test]
    fn new_strips_trailing_slashes() {
        let p = OpenAiProvider::new("k".into(), "http://x/v1//".into(), "m".into(), None);
        assert_eq!(p.base_url, "http://x/v1");
    }

    #[test]
    fn debug_redacts_api_key() {
        let p = OpenAiProvider::new("sk-secret".into(), "http://x".into(), "m".into(), None);
        let out = format!("{p:?}");
        assert!(!out.contains("sk-secret"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn embeddings_require_model() {
        let p = OpenAiProvider::new("k".into(), "http://x".into(), "m".into(), None);
        assert!(!p.supports_embeddings());
        let p = p.with_name("local");
        assert_eq!(p.name(), "local");
    }

    #[test]
    fn chat_request_carries_sampling_params() {
        let messages = [Message::user("hello")];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            temperature: 0.1,
            top_p: TOP_P,
            max_tokens: 250,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["max_tokens"], 250);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!((json["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn chat_returns_trimmed_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  a summary \n"}}]}"#;
        let (port, mut rx, _h) = spawn(vec![json_response("200 OK", body)]).await;

        let out = provider(port)
            .chat(&[Message::user("digest")], GenerationParams::new(250, 0.1))
            .await
            .unwrap();
        assert_eq!(out, "a summary");

        let sent: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(sent["model"], "gpt-test");
        assert_eq!(sent["max_tokens"], 250);
    }

    #[tokio::test]
    async fn chat_with_blank_content_is_empty_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"   "}}]}"#;
        let (port, _rx, _h) = spawn(vec![json_response("200 OK", body)]).await;

        let err = provider(port)
            .chat(&[Message::user("x")], GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn chat_with_no_choices_is_empty_response() {
        let (port, _rx, _h) = spawn(vec![json_response("200 OK", r#"{"choices":[]}"#)]).await;

        let err = provider(port)
            .chat(&[Message::user("x")], GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn chat_error_status_is_reported() {
        let (port, _rx, _h) =
            spawn(vec![json_response("401 Unauthorized", r#"{"error":"bad key"}"#)]).await;

        let err = provider(port)
            .chat(&[Message::user("x")], GenerationParams::default())
            .await
            .unwrap_err();
        assert!(
            matches!(err, LlmError::Status { status: 401, .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn chat_unreachable_is_http_error() {
        let p = OpenAiProvider::new("k".into(), "http://127.0.0.1:1".into(), "m".into(), None)
            .with_max_retries(0);
        let err = p
            .chat(&[Message::user("x")], GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Http(_)), "{err:?}");
    }

    #[tokio::test]
    async fn embed_parses_first_vector() {
        let body = r#"{"data":[{"embedding":[0.5,-0.25,1.0]}]}"#;
        let (port, mut rx, _h) = spawn(vec![json_response("200 OK", body)]).await;

        let v = provider(port).embed("text").await.unwrap();
        assert_eq!(v, vec![0.5, -0.25, 1.0]);

        let sent: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(sent["model"], "embed-test");
        assert_eq!(sent["input"], "text");
    }

    #[tokio::test]
    async fn embed_without_model_is_unsupported() {
        let p = OpenAiProvider::new("k".into(), "http://127.0.0.1:1".into(), "m".into(), None);
        let err = p.embed("text").await.unwrap_err();
        assert!(matches!(err, LlmError::EmbedUnsupported { .. }));
    }

    #[tokio::test]
    async fn limiter_counts_each_call() {
        let body = r#"{"choices":[{"message":{"content":"ok"}}]}"#;
        let (port, _rx, _h) = spawn(vec![
            json_response("200 OK", body),
            json_response("200 OK", body),
        ])
        .await;

        let limiter = Arc::new(RateLimiter::unlimited());
        let p = provider(port).with_rate_limiter(Arc::clone(&limiter));
        p.chat(&[Message::user("a")], GenerationParams::default())
            .await
            .unwrap();
        p.chat(&[Message::user("b")], GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(limiter.calls_in_window().await, 2);
    }
}
