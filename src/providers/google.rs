use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::app_config::PlatformConfig;
use crate::errors::RequestError;
use crate::providers::{Completion, normalize_base_url, post_json};

/// Harm categories relaxed on every request
const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// generateContent request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleRequest {
    contents: Vec<GoogleContent>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

/// Conversation turn
#[derive(Debug, Serialize, Deserialize)]
pub struct GoogleContent {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GooglePart>,
}

/// Content part; `thought` marks reasoning parts
#[derive(Debug, Serialize, Deserialize)]
pub struct GooglePart {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

/// generateContent response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleResponse {
    #[serde(default)]
    pub candidates: Vec<GoogleCandidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCandidate {
    #[serde(default)]
    pub content: Option<GoogleContent>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
}

impl GoogleRequest {
    /// Build a single-turn request from a platform's defaults
    pub fn from_platform(platform: &PlatformConfig, prompt: &str) -> Self {
        let generation = &platform.generation;
        Self {
            contents: vec![GoogleContent {
                role: Some("user".to_string()),
                parts: vec![GooglePart {
                    text: Some(prompt.to_string()),
                    thought: None,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: generation.temperature,
                top_p: generation.top_p,
                presence_penalty: generation.presence_penalty,
                frequency_penalty: generation.frequency_penalty,
                max_output_tokens: platform.output_token_limit,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category: *category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        }
    }
}

/// Full generateContent URL for a configured base and model
pub fn endpoint(api_url: &str, model: &str) -> String {
    format!(
        "{}/v1beta/models/{}:generateContent",
        normalize_base_url(api_url, &["/v1beta"]),
        model
    )
}

/// Extract the answer, treating safety blocks as rejections
pub fn extract_completion(response: GoogleResponse) -> Result<Completion, RequestError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(RequestError::Rejected(format!("Prompt blocked: {}", reason)));
    }

    let usage = response.usage_metadata.unwrap_or_default();
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| RequestError::Rejected("Response contains no candidates".to_string()))?;

    let mut text = String::new();
    let mut think = String::new();
    for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
        let part_text = part.text.unwrap_or_default();
        if part.thought.unwrap_or(false) {
            think.push_str(&part_text);
        } else {
            text.push_str(&part_text);
        }
    }

    if text.trim().is_empty() {
        if let Some(reason) = candidate.finish_reason.filter(|r| r != "STOP") {
            return Err(RequestError::Rejected(format!("Generation stopped: {}", reason)));
        }
    }

    Ok(Completion {
        text,
        think,
        input_tokens: usage.prompt_token_count,
        output_tokens: usage.candidates_token_count,
    })
}

/// Complete a prompt against a Google-compatible endpoint
pub async fn complete(
    client: &Client,
    platform: &PlatformConfig,
    api_key: Option<&str>,
    prompt: &str,
) -> Result<Completion, RequestError> {
    let request = GoogleRequest::from_platform(platform, prompt);
    let mut headers = Vec::new();
    if let Some(key) = api_key {
        headers.push(("x-goog-api-key", key.to_string()));
    }

    let response: GoogleResponse = post_json(
        client,
        &endpoint(&platform.api_url, &platform.model),
        &headers,
        &platform.extra_headers,
        &request,
    )
    .await?;

    extract_completion(response)
}
