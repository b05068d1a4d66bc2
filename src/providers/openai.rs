use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::app_config::PlatformConfig;
use crate::errors::RequestError;
use crate::providers::{Completion, normalize_base_url, post_json};

/// Host whose endpoint expects `max_completion_tokens`
const OFFICIAL_HOST: &str = "api.openai.com";

/// Chat completions request
#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    /// The model to use
    model: String,

    /// The messages for the conversation
    messages: Vec<OpenAIMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,

    /// Token limit for compatible servers
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,

    /// Token limit for the official endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

/// Chat message
#[derive(Debug, Serialize, Deserialize)]
pub struct OpenAIMessage {
    /// Role of the message sender
    pub role: String,
    /// Content of the message
    #[serde(default)]
    pub content: Option<String>,
    /// Reasoning returned by some compatible servers
    #[serde(default, skip_serializing)]
    pub reasoning_content: Option<String>,
}

/// Token usage information
#[derive(Debug, Deserialize, Default)]
pub struct OpenAIUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// One generated choice
#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIMessage,
}

/// Chat completions response
#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
    #[serde(default)]
    pub usage: Option<OpenAIUsage>,
}

impl OpenAIRequest {
    /// Build a single-message request from a platform's defaults
    pub fn from_platform(platform: &PlatformConfig, prompt: &str) -> Self {
        let official = is_official_endpoint(&platform.api_url);
        let generation = &platform.generation;

        Self {
            model: platform.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
                reasoning_content: None,
            }],
            temperature: generation.temperature,
            top_p: generation.top_p,
            presence_penalty: generation.presence_penalty,
            frequency_penalty: generation.frequency_penalty,
            max_tokens: (!official).then_some(platform.output_token_limit),
            max_completion_tokens: official.then_some(platform.output_token_limit),
        }
    }
}

fn is_official_endpoint(api_url: &str) -> bool {
    url::Url::parse(api_url)
        .ok()
        .and_then(|url| url.host_str().map(|host| host == OFFICIAL_HOST))
        .unwrap_or(false)
}

/// Full chat completions URL for a configured base
pub fn endpoint(api_url: &str) -> String {
    format!("{}/chat/completions", normalize_base_url(api_url, &["/chat/completions"]))
}

/// Extract the answer and reasoning from a response
pub fn extract_completion(response: OpenAIResponse) -> Result<Completion, RequestError> {
    let usage = response.usage.unwrap_or_default();
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| RequestError::Rejected("Response contains no choices".to_string()))?;

    Ok(Completion {
        text: message.content.unwrap_or_default(),
        think: message.reasoning_content.unwrap_or_default(),
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    })
}

/// Complete a prompt against an OpenAI-compatible endpoint
pub async fn complete(
    client: &Client,
    platform: &PlatformConfig,
    api_key: Option<&str>,
    prompt: &str,
) -> Result<Completion, RequestError> {
    let request = OpenAIRequest::from_platform(platform, prompt);
    let mut headers = Vec::new();
    if let Some(key) = api_key {
        headers.push(("Authorization", format!("Bearer {}", key)));
    }

    let response: OpenAIResponse = post_json(
        client,
        &endpoint(&platform.api_url),
        &headers,
        &platform.extra_headers,
        &request,
    )
    .await?;

    extract_completion(response)
}
