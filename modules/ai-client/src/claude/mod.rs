mod client;
pub(crate) mod types;

use anyhow::Result;
use serde::de::DeserializeOwned;

use crate::error::AiError;
use crate::schema::StructuredOutput;
use crate::usage::Extraction;
use client::ClaudeClient;
use types::*;

const STRUCTURED_TOOL_NAME: &str = "structured_response";

// =============================================================================
// Claude Agent
// =============================================================================

#[derive(Clone)]
pub struct Claude {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    http: reqwest::Client,
}

impl Claude {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| AiError::Config("ANTHROPIC_API_KEY is not set".to_string()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> ClaudeClient {
        let client = ClaudeClient::new(&self.api_key, self.http.clone());
        match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        }
    }

    /// Schema-constrained extraction via a forced tool call.
    ///
    /// The tool's input schema is `T`'s strict schema; the tool input the model
    /// produces is deserialized into `T`.
    pub async fn extract<T: StructuredOutput>(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        max_tokens: u32,
    ) -> Result<Extraction<T>> {
        let request = MessagesRequest::new(&self.model)
            .system(system_prompt)
            .message(WireMessage::user(user_prompt))
            .max_tokens(max_tokens)
            .temperature(0.0)
            .forced_tool(ToolDefinitionWire {
                name: STRUCTURED_TOOL_NAME.to_string(),
                description: format!("Return the result as a {}.", T::type_name()),
                input_schema: T::strict_schema(),
            });

        let response = self.client().messages(&request).await?;
        let usage = response.token_usage();

        let input = response.tool_input(STRUCTURED_TOOL_NAME).ok_or_else(|| {
            AiError::EmptyResponse(format!(
                "no structured output from Claude (stop_reason: {}, text: {:?})",
                response.stop_reason.as_deref().unwrap_or("unknown"),
                response.text().unwrap_or_default()
            ))
        })?;

        let value = decode_tool_input(input.clone())?;

        Ok(Extraction { value, usage })
    }
}

fn decode_tool_input<T: DeserializeOwned>(input: serde_json::Value) -> Result<T, AiError> {
    serde_json::from_value(input)
        .map_err(|e| AiError::Parse(format!("Claude tool input does not match schema: {e}")))
}
