use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use strum::EnumIter;
use thiserror::Error;

pub const OPEN_AI_API_URL: &str = "https://api.openai.com/v1";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, EnumIter)]
pub enum Model {
    #[serde(rename = "gpt-3.5-turbo", alias = "gpt-3.5-turbo-0613")]
    ThreePointFiveTurbo,
    #[serde(rename = "gpt-4", alias = "gpt-4-0613")]
    Four,
    #[serde(rename = "gpt-4o", alias = "gpt-4o-2024-05-13")]
    #[default]
    FourOmni,
    #[serde(rename = "gpt-4o-mini", alias = "gpt-4o-mini-2024-07-18")]
    FourOmniMini,
    #[serde(rename = "custom")]
    Custom { name: String },
}

impl Model {
    pub fn from_id(id: &str) -> anyhow::Result<Self> {
        match id {
            "gpt-3.5-turbo" => Ok(Self::ThreePointFiveTurbo),
            "gpt-4" => Ok(Self::Four),
            "gpt-4o" => Ok(Self::FourOmni),
            "gpt-4o-mini" => Ok(Self::FourOmniMini),
            _ => Err(anyhow!("invalid model id")),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::ThreePointFiveTurbo => "gpt-3.5-turbo",
            Self::Four => "gpt-4",
            Self::FourOmni => "gpt-4o",
            Self::FourOmniMini => "gpt-4o-mini",
            Self::Custom { name } => name,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    pub model: String,
    pub messages: Vec<RequestMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub temperature: f32,
}

#[derive(Serialize, Deserialize, Debug, Eq, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum RequestMessage {
    Assistant { content: Option<String> },
    User { content: String },
    System { content: String },
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Response {
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ResponseMessage {
    pub role: Option<Role>,
    pub content: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Error)]
pub enum OpenAiError {
    #[error("authentication with the OpenAI API failed: {0}")]
    AuthenticationFailed(String),
    #[error("OpenAI rate limit exceeded")]
    RateLimited,
    #[error("OpenAI API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("no response received")]
    NoChoices,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Performs a non-streaming chat completion, returning the trimmed text of
/// the first choice.
pub async fn complete(
    client: &reqwest::Client,
    api_url: &str,
    api_key: &str,
    project_id: Option<&str>,
    request: Request,
) -> Result<String, OpenAiError> {
    let uri = format!("{api_url}/chat/completions");
    let mut request_builder = client.post(uri).bearer_auth(api_key).json(&request);
    if let Some(project_id) = project_id {
        request_builder = request_builder.header("OpenAI-Project-Id", project_id);
    }

    let response = request_builder
        .send()
        .await
        .map_err(|error| OpenAiError::Other(anyhow!(error)))?;
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|error| OpenAiError::Other(anyhow!(error)))?;

    if (200..300).contains(&status) {
        let response: Response = serde_json::from_str(&body)
            .map_err(|error| OpenAiError::Other(anyhow!("invalid response body: {error}")))?;
        extract_text(response)
    } else {
        Err(classify_error(status, parse_error_message(status, &body)))
    }
}

fn extract_text(response: Response) -> Result<String, OpenAiError> {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();
    let content = content.trim();
    if content.is_empty() {
        Err(OpenAiError::NoChoices)
    } else {
        Ok(content.to_string())
    }
}

fn parse_error_message(status: u16, body: &str) -> String {
    #[derive(Deserialize)]
    struct OpenAiResponse {
        error: OpenAiResponseError,
    }

    #[derive(Deserialize)]
    struct OpenAiResponseError {
        message: String,
    }

    match serde_json::from_str::<OpenAiResponse>(body) {
        Ok(response) if !response.error.message.is_empty() => response.error.message,
        _ => format!("Failed to connect to OpenAI API: {} {}", status, body),
    }
}

fn classify_error(status: u16, message: String) -> OpenAiError {
    let lowercase = message.to_lowercase();
    match status {
        401 | 403 => OpenAiError::AuthenticationFailed(message),
        429 => OpenAiError::RateLimited,
        _ if lowercase.contains("rate limit") => OpenAiError::RateLimited,
        _ if lowercase.contains("api key") => OpenAiError::AuthenticationFailed(message),
        _ => OpenAiError::Api { status, message },
    }
}
