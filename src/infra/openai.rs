use super::ports::{CompletionClient, CompletionRequest, ContentPart};
use crate::config::AiConfig;
use crate::error::{AppError, Result};
use crate::metrics::ExtractorMetrics;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, warn};

const MISSING_KEY: &str = "OPENAI_API_KEY is not set; add it to the server environment (.env)";

/// Chat-completions client. A missing key is reported per call, not at startup.
#[derive(Clone)]
pub struct OpenAiClient {
    http_client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponseRaw {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(api_key: Option<String>, ai: &AiConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(ai.timeout()).build()?;
        Ok(Self {
            http_client,
            api_key,
            base_url: ai.base_url.trim_end_matches('/').to_string(),
            model: ai.model.clone(),
        })
    }

    fn key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| AppError::Config(MISSING_KEY.into()))
    }

    fn user_content(parts: &[ContentPart]) -> Value {
        if let [ContentPart::Text(text)] = parts {
            return Value::String(text.clone());
        }
        Value::Array(
            parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text(text) => json!({"type": "text", "text": text}),
                    ContentPart::ImageUrl(url) => json!({"type": "image_url", "image_url": {"url": url}}),
                })
                .collect(),
        )
    }

    async fn post_chat(&self, body: &Value) -> Result<reqwest::Response> {
        let key = self.key()?;
        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "OpenAI request failed");
                ExtractorMetrics::completion_failed("network");
                AppError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<Value>(&error_text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(error_text);
            warn!(status = %status, error = %detail, "OpenAI API error");
            ExtractorMetrics::completion_failed("status");
            return Err(AppError::Upstream {
                service: "openai",
                status: status.as_u16(),
                detail,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let start = Instant::now();
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": Self::user_content(&request.parts)},
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let response = self.post_chat(&body).await?;
        let chat: ChatResponseRaw = response.json().await?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Upstream {
                service: "openai",
                status: 200,
                detail: "No response from OpenAI".into(),
            })?;

        ExtractorMetrics::completion_succeeded(start.elapsed().as_secs_f64());
        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "OpenAI chat completion"
        );
        Ok(content)
    }

    async fn chat_raw(&self, mut body: Value) -> Result<Value> {
        if !body.get("messages").map(Value::is_array).unwrap_or(false) {
            return Err(AppError::Validation("messages array required".into()));
        }
        for (field, default) in [
            ("model", json!("gpt-4o")),
            ("max_tokens", json!(1000)),
            ("temperature", json!(0.7)),
        ] {
            if body.get(field).map(Value::is_null).unwrap_or(true) {
                body[field] = default;
            }
        }
        let response = self.post_chat(&body).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_text_part_is_sent_as_string() {
        let content = OpenAiClient::user_content(&[ContentPart::Text("bonjour".into())]);
        assert_eq!(content, json!("bonjour"));
    }

    #[test]
    fn test_images_become_content_array() {
        let content = OpenAiClient::user_content(&[
            ContentPart::Text("lis l'affiche".into()),
            ContentPart::ImageUrl("data:image/png;base64,AAAA".into()),
        ]);
        assert_eq!(content[0]["type"], "text");
        assert_eq!(content[1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let client = OpenAiClient::new(None, &AiConfig::default()).unwrap();
        let err = client
            .complete(CompletionRequest::text("sys", "user"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
