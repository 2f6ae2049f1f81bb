//! `ApiReplyGenerator`: answers turns through a hosted language model.
//!
//! Two wire formats are supported, chosen by [`LlmProvider`]:
//! Gemini `generateContent` (API key sent as `x-goog-api-key`) and any
//! OpenAI-compatible `/v1/chat/completions` endpoint (bearer token only when
//! a key is configured, so local servers such as Ollama work unauthenticated).

use async_trait::async_trait;

use crate::config::{LlmConfig, LlmProvider};
use crate::turn::Message;

use super::prompt::{parse_chat_reply, parse_gemini_reply, PromptBuilder};
use super::{ReplyError, ReplyGenerator};

/// Calls the configured LLM backend once per turn.
pub struct ApiReplyGenerator {
    client: reqwest::Client,
    config: LlmConfig,
    api_key: Option<String>,
}

impl ApiReplyGenerator {
    /// Build a generator from application config.
    ///
    /// The API key is resolved once here (config value, then environment).
    pub fn from_config(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_key: config.resolved_api_key(),
            config: config.clone(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match self.config.provider {
            LlmProvider::Gemini => format!(
                "{base}/v1beta/models/{}:generateContent",
                self.config.model
            ),
            LlmProvider::OpenAiCompatible => format!("{base}/v1/chat/completions"),
        }
    }

    async fn post(&self, body: serde_json::Value) -> Result<serde_json::Value, ReplyError> {
        let mut req = self.client.post(self.endpoint()).json(&body);

        match (self.config.provider, self.api_key.as_deref()) {
            (LlmProvider::Gemini, Some(key)) => req = req.header("x-goog-api-key", key),
            (LlmProvider::Gemini, None) => {
                return Err(ReplyError::MissingApiKey(self.config.api_key_env.clone()))
            }
            (LlmProvider::OpenAiCompatible, Some(key)) => req = req.bearer_auth(key),
            (LlmProvider::OpenAiCompatible, None) => {}
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReplyError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ReplyError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ReplyGenerator for ApiReplyGenerator {
    async fn generate_reply(
        &self,
        history: &[Message],
        context: &str,
        persona: &str,
    ) -> Result<String, ReplyError> {
        let builder = PromptBuilder::new(persona, context);
        let cfg = &self.config;

        log::debug!(
            "reply: requesting {} via {:?} ({} messages)",
            cfg.model,
            cfg.provider,
            history.len()
        );

        let reply = match cfg.provider {
            LlmProvider::Gemini => {
                let body = builder.gemini_body(history, cfg.temperature, cfg.max_output_tokens);
                parse_gemini_reply(&self.post(body).await?)?
            }
            LlmProvider::OpenAiCompatible => {
                let body = builder.chat_body(
                    history,
                    &cfg.model,
                    cfg.temperature,
                    cfg.max_output_tokens,
                );
                parse_chat_reply(&self.post(body).await?)?
            }
        };

        log::debug!("reply: received {} chars", reply.len());
        Ok(reply)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
