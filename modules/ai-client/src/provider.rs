//! Provider selection from a `provider:model` spec string.

use anyhow::Result;
use std::fmt;

use crate::claude::Claude;
use crate::error::AiError;
use crate::openai::OpenAi;
use crate::schema::StructuredOutput;
use crate::usage::Extraction;

pub const DEFAULT_MODEL_SPEC: &str = "openai:gpt-4.1-2025-04-14";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

/// Split `anthropic:<model>` / `openai:<model>` / `<model>`.
/// Unprefixed names are treated as OpenAI models.
pub fn parse_model_spec(spec: &str) -> (ProviderKind, &str) {
    if let Some(model) = spec.strip_prefix("anthropic:") {
        (ProviderKind::Anthropic, model)
    } else if let Some(model) = spec.strip_prefix("openai:") {
        (ProviderKind::OpenAi, model)
    } else {
        (ProviderKind::OpenAi, spec)
    }
}

/// A configured LLM backend that can produce structured output.
#[derive(Clone)]
pub enum LlmProvider {
    Claude(Claude),
    OpenAi(OpenAi),
}

impl LlmProvider {
    /// Build from a `provider:model` spec, reading the matching API key.
    pub fn from_model_spec(spec: &str) -> Result<Self> {
        let (kind, model) = parse_model_spec(spec.trim());
        if model.is_empty() {
            return Err(AiError::Config(format!("model name missing in AI_MODEL spec '{spec}'")).into());
        }
        match kind {
            ProviderKind::Anthropic => Ok(Self::Claude(Claude::from_env(model)?)),
            ProviderKind::OpenAi => Ok(Self::OpenAi(OpenAi::from_env(model)?)),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Claude(_) => ProviderKind::Anthropic,
            Self::OpenAi(_) => ProviderKind::OpenAi,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Claude(c) => c.model(),
            Self::OpenAi(o) => o.model(),
        }
    }

    pub async fn extract<T: StructuredOutput>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<Extraction<T>> {
        match self {
            Self::Claude(c) => c.extract(system_prompt, user_prompt, max_tokens).await,
            Self::OpenAi(o) => o.extract(system_prompt, user_prompt, max_tokens).await,
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.model())
    }
}

impl From<Claude> for LlmProvider {
    fn from(c: Claude) -> Self {
        Self::Claude(c)
    }
}

impl From<OpenAi> for LlmProvider {
    fn from(o: OpenAi) -> Self {
        Self::OpenAi(o)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_specs_select_provider() {
        assert_eq!(
            parse_model_spec("anthropic:claude-sonnet-4-5"),
            (ProviderKind::Anthropic, "claude-sonnet-4-5")
        );
        assert_eq!(parse_model_spec("openai:gpt-4.1"), (ProviderKind::OpenAi, "gpt-4.1"));
    }

    #[test]
    fn unprefixed_spec_falls_back_to_openai() {
        assert_eq!(parse_model_spec("gpt-4o"), (ProviderKind::OpenAi, "gpt-4o"));
    }

    #[test]
    fn empty_model_is_rejected() {
        let err = LlmProvider::from_model_spec("anthropic:").err().unwrap();
        assert!(err.to_string().contains("model name missing"));
    }

    #[test]
    fn provider_reports_kind_and_model() {
        let provider: LlmProvider = Claude::new("k", "claude-haiku-4-5").into();
        assert_eq!(provider.kind(), ProviderKind::Anthropic);
        assert_eq!(provider.model(), "claude-haiku-4-5");
        assert_eq!(provider.kind().to_string(), "anthropic");
    }
}
