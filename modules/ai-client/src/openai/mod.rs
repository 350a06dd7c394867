mod client;
pub(crate) mod types;

use anyhow::Result;
use serde::de::DeserializeOwned;

use crate::error::AiError;
use crate::schema::StructuredOutput;
use crate::usage::Extraction;
use crate::util::strip_code_blocks;
use client::OpenAiClient;
use types::{StructuredRequest, WireMessage};

// =============================================================================
// OpenAi Agent
// =============================================================================

#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    http: reqwest::Client,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AiError::Config("OPENAI_API_KEY is not set".to_string()))?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> OpenAiClient {
        let client = OpenAiClient::new(&self.api_key, self.http.clone());
        match self.base_url {
            Some(ref url) => client.with_base_url(url),
            None => client,
        }
    }

    /// Type-safe structured output extraction using a strict `json_schema`
    /// response format.
    pub async fn extract<T: StructuredOutput>(
        &self,
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        max_tokens: u32,
    ) -> Result<Extraction<T>> {
        let request = StructuredRequest::new(&self.model, "structured_response", T::strict_schema())
            .message(WireMessage::system(system_prompt))
            .message(WireMessage::user(user_prompt))
            .output_limit(max_tokens);

        let response = self.client().structured_output(&request).await?;
        let usage = response.token_usage();

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AiError::EmptyResponse("no choices from OpenAI".to_string()))?;

        if let Some(refusal) = choice.message.refusal {
            return Err(AiError::EmptyResponse(format!("OpenAI refused: {refusal}")).into());
        }

        let content = choice.message.content.ok_or_else(|| {
            AiError::EmptyResponse(format!(
                "no content from OpenAI (finish_reason: {})",
                choice.finish_reason.as_deref().unwrap_or("unknown")
            ))
        })?;

        let value = decode_content(&content)?;

        Ok(Extraction { value, usage })
    }
}

fn decode_content<T: DeserializeOwned>(content: &str) -> Result<T, AiError> {
    serde_json::from_str(strip_code_blocks(content))
        .map_err(|e| AiError::Parse(format!("OpenAI content does not match schema: {e}")))
}
