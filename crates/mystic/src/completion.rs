use crate::{reading::BuiltPrompt, Config};
use anyhow::Context as _;
use async_trait::async_trait;
use open_ai::{Model, OpenAiError, Request, RequestMessage};
use std::{sync::Arc, time::Duration};

/// Completions are the longest-running upstream call; the timeout is
/// generous but finite so a hung upstream never wedges a request.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &BuiltPrompt) -> Result<String, OpenAiError>;
}

pub struct OpenAiCompletionClient {
    http: reqwest::Client,
    api_url: Arc<str>,
    api_key: Arc<str>,
    project_id: Option<Arc<str>>,
    model: Model,
}

impl OpenAiCompletionClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let user_agent = format!("Mystic Server/{}", env!("CARGO_PKG_VERSION"));
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(COMPLETION_TIMEOUT)
            .build()
            .context("failed to construct http client")?;

        let model = if config.is_development() {
            Model::ThreePointFiveTurbo
        } else {
            Model::FourOmni
        };

        Ok(Self {
            http,
            api_url: config
                .openai_api_url
                .clone()
                .unwrap_or_else(|| open_ai::OPEN_AI_API_URL.into()),
            api_key: config.openai_api_key.clone(),
            project_id: config.openai_project_id.clone(),
            model,
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletionClient {
    async fn complete(&self, prompt: &BuiltPrompt) -> Result<String, OpenAiError> {
        let request = Request {
            model: self.model.id().to_string(),
            messages: vec![
                RequestMessage::System {
                    content: prompt.system_prompt.to_string(),
                },
                RequestMessage::User {
                    content: prompt.user_prompt.clone(),
                },
            ],
            max_tokens: Some(prompt.max_tokens),
            temperature: prompt.temperature,
        };

        open_ai::complete(
            &self.http,
            &self.api_url,
            &self.api_key,
            self.project_id.as_deref(),
            request,
        )
        .await
    }
}
