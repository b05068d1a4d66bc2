use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::app_config::PlatformConfig;
use crate::errors::RequestError;
use crate::providers::{Completion, normalize_base_url, post_json};

/// API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic message request
///
/// Presence and frequency penalties have no counterpart in this API and are
/// never sent.
#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    /// The model to use
    model: String,

    /// The messages for the conversation
    messages: Vec<AnthropicMessage>,

    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// Maximum number of tokens to generate
    max_tokens: u32,

    /// Top probability mass to consider (nucleus sampling)
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

/// Anthropic message format
#[derive(Debug, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// Role of the message sender (user, assistant)
    pub role: String,

    /// Content of the message
    pub content: String,
}

/// Token usage information
#[derive(Debug, Deserialize, Default)]
pub struct TokenUsage {
    /// Number of input tokens
    #[serde(default)]
    pub input_tokens: u64,
    /// Number of output tokens
    #[serde(default)]
    pub output_tokens: u64,
}

/// Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    /// The content of the response
    #[serde(default)]
    pub content: Vec<AnthropicContent>,
    /// Token usage information
    #[serde(default)]
    pub usage: TokenUsage,
    /// Why generation stopped
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Individual content block in an Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicContent {
    /// The type of content
    #[serde(rename = "type")]
    pub content_type: String,

    /// Text of a `text` block
    #[serde(default)]
    pub text: Option<String>,

    /// Reasoning of a `thinking` block
    #[serde(default)]
    pub thinking: Option<String>,
}

impl AnthropicRequest {
    /// Build a single-message request from a platform's defaults
    pub fn from_platform(platform: &PlatformConfig, prompt: &str) -> Self {
        Self {
            model: platform.model.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: platform.generation.temperature,
            max_tokens: platform.output_token_limit,
            top_p: platform.generation.top_p,
        }
    }
}

/// Full messages URL for a configured base
pub fn endpoint(api_url: &str) -> String {
    format!("{}/v1/messages", normalize_base_url(api_url, &["/v1/messages", "/v1"]))
}

/// Extract text and thinking blocks from an Anthropic response
pub fn extract_completion(response: AnthropicResponse) -> Result<Completion, RequestError> {
    if response.stop_reason.as_deref() == Some("refusal") {
        return Err(RequestError::Rejected("Model refused the request".to_string()));
    }

    let mut text = String::new();
    let mut think = String::new();
    for block in response.content {
        match block.content_type.as_str() {
            "text" => text.push_str(block.text.as_deref().unwrap_or_default()),
            "thinking" => think.push_str(block.thinking.as_deref().unwrap_or_default()),
            _ => {}
        }
    }

    Ok(Completion {
        text,
        think,
        input_tokens: response.usage.input_tokens,
        output_tokens: response.usage.output_tokens,
    })
}

/// Complete a prompt against an Anthropic-compatible endpoint
pub async fn complete(
    client: &Client,
    platform: &PlatformConfig,
    api_key: Option<&str>,
    prompt: &str,
) -> Result<Completion, RequestError> {
    let request = AnthropicRequest::from_platform(platform, prompt);
    let mut headers = vec![("anthropic-version", ANTHROPIC_VERSION.to_string())];
    if let Some(key) = api_key {
        headers.push(("x-api-key", key.to_string()));
    }

    let response: AnthropicResponse = post_json(
        client,
        &endpoint(&platform.api_url),
        &headers,
        &platform.extra_headers,
        &request,
    )
    .await?;

    extract_completion(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::ApiFormat;

    #[test]
    fn test_endpoint_shouldAppendMessagesPath() {
        assert_eq!(endpoint("https://api.anthropic.com"), "https://api.anthropic.com/v1/messages");
        assert_eq!(endpoint("https://proxy.local/v1/"), "https://proxy.local/v1/messages");
    }

    #[test]
    fn test_fromPlatform_shouldDropPenalties() {
        let mut platform = PlatformConfig::new("claude", ApiFormat::Anthropic);
        platform.generation.presence_penalty = Some(0.5);
        platform.generation.frequency_penalty = Some(0.5);
        platform.generation.top_p = Some(0.9);
        let body = serde_json::to_value(AnthropicRequest::from_platform(&platform, "hi")).unwrap();

        assert!(body.get("presence_penalty").is_none());
        assert!(body.get("frequency_penalty").is_none());
        assert!(body["top_p"].as_f64().is_some());
        assert_eq!(body["max_tokens"], 4096);
    }

    #[test]
    fn test_extractCompletion_shouldSeparateThinking() {
        let json = r#"{
            "content": [
                {"type": "thinking", "thinking": "consider"},
                {"type": "text", "text": "Hola"}
            ],
            "usage": {"input_tokens": 7, "output_tokens": 2}
        }"#;
        let response: AnthropicResponse = serde_json::from_str(json).unwrap();
        let completion = extract_completion(response).unwrap();

        assert_eq!(completion.text, "Hola");
        assert_eq!(completion.think, "consider");
        assert_eq!(completion.input_tokens, 7);
    }

    #[test]
    fn test_extractCompletion_withRefusal_shouldReject() {
        let json = r#"{"content": [], "stop_reason": "refusal"}"#;
        let response: AnthropicResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(extract_completion(response), Err(RequestError::Rejected(_))));
    }
}
