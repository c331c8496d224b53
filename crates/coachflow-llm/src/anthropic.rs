//! Anthropic Claude extractor using forced tool use

use crate::extractor::{ExtractError, ExtractResult, Extractor};
use crate::types::{Extraction, PromptTemplate, TargetSchema};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Model used unless the caller picks another.
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";

pub struct AnthropicExtractor {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicExtractor {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 1024,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_request(
        &self,
        raw_text: &str,
        prompt: &PromptTemplate,
        schema: &TargetSchema,
    ) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: prompt.render(&[("input", raw_text)]),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: raw_text.to_string(),
            }],
            tools: vec![AnthropicTool {
                name: schema.name.clone(),
                description: schema.description.clone(),
                input_schema: schema.to_json_schema(),
            }],
            tool_choice: ToolChoice {
                kind: "tool",
                name: schema.name.clone(),
            },
        }
    }
}

#[async_trait::async_trait]
impl Extractor for AnthropicExtractor {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn extract(
        &self,
        raw_text: &str,
        prompt: &PromptTemplate,
        schema: &TargetSchema,
    ) -> ExtractResult<Extraction> {
        let body = self.build_request(raw_text, prompt, schema);
        debug!(model = %body.model, schema = %schema.name, "Anthropic extraction request");

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Anthropic error {}: {}", status, error_text);

            return Err(match status.as_u16() {
                401 => ExtractError::AuthFailed(error_text),
                429 => ExtractError::RateLimited {
                    retry_after_ms: 60000,
                },
                _ => ExtractError::RequestFailed(format!("{}: {}", status, error_text)),
            });
        }

        let body: Value = response.json().await?;
        let input = parse_tool_input(&body, &schema.name)?;
        let (extraction, dropped) = Extraction::conform(schema, &input);
        if !dropped.is_empty() {
            warn!(schema = %schema.name, ?dropped, "Dropped non-conforming extracted fields");
        }
        Ok(extraction)
    }
}

/// Pull the forced tool call's input out of a Messages API response body.
pub(crate) fn parse_tool_input(body: &Value, tool: &str) -> ExtractResult<Value> {
    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| ExtractError::InvalidResponse("response has no content array".into()))?;

    blocks
        .iter()
        .find(|b| {
            b.get("type").and_then(Value::as_str) == Some("tool_use")
                && b.get("name").and_then(Value::as_str) == Some(tool)
        })
        .and_then(|b| b.get("input").cloned())
        .ok_or_else(|| ExtractError::InvalidResponse(format!("no tool_use block for '{}'", tool)))
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<AnthropicMessage>,
    tools: Vec<AnthropicTool>,
    tool_choice: ToolChoice,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    kind: &'static str,
    name: String,
}
