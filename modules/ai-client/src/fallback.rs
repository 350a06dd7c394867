//! Ordered provider fallback.
//!
//! `AI_MODELS` lists `provider:model` specs separated by commas. Each call
//! tries them in order and returns the first success together with the
//! number of attempts it took. Unset or empty `AI_MODELS` falls back to the
//! single `AI_MODEL`, then to [`DEFAULT_MODEL_SPEC`].

use std::fmt;
use std::future::Future;

use anyhow::Result;
use tracing::{info, warn};

use crate::error::AiError;
use crate::provider::{parse_model_spec, LlmProvider, ProviderKind, DEFAULT_MODEL_SPEC};
use crate::schema::StructuredOutput;
use crate::usage::Extraction;

// =============================================================================
// Model configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub kind: ProviderKind,
    pub model: String,
}

impl ModelConfig {
    pub fn parse(spec: &str) -> Self {
        let (kind, model) = parse_model_spec(spec.trim());
        Self {
            kind,
            model: model.to_string(),
        }
    }
}

impl fmt::Display for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.model)
    }
}

/// Resolve the ordered model list from the raw `AI_MODELS` / `AI_MODEL` values.
pub fn configured_models(ai_models: Option<&str>, ai_model: Option<&str>) -> Vec<ModelConfig> {
    let listed: Vec<ModelConfig> = ai_models
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|spec| !spec.is_empty())
        .map(ModelConfig::parse)
        .collect();
    if !listed.is_empty() {
        return listed;
    }

    match ai_model.map(str::trim).filter(|spec| !spec.is_empty()) {
        Some(spec) => vec![ModelConfig::parse(spec)],
        None => vec![ModelConfig::parse(DEFAULT_MODEL_SPEC)],
    }
}

pub fn configured_models_from_env() -> Vec<ModelConfig> {
    let ai_models = std::env::var("AI_MODELS").ok();
    let ai_model = std::env::var("AI_MODEL").ok();
    configured_models(ai_models.as_deref(), ai_model.as_deref())
}

// =============================================================================
// Failure classification
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Authentication,
    RateLimit,
    ServiceUnavailable,
    Network,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Network => "network",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Bucket a provider failure for logging. Typed [`AiError`]s are classified
/// by status; anything else by its message.
pub fn classify_error(err: &anyhow::Error) -> FailureKind {
    if let Some(ai) = err.downcast_ref::<AiError>() {
        match ai {
            AiError::Config(_) => return FailureKind::Authentication,
            AiError::Network(_) => return FailureKind::Network,
            AiError::Api { status, .. } => match status {
                401 | 403 => return FailureKind::Authentication,
                429 => return FailureKind::RateLimit,
                500..=599 => return FailureKind::ServiceUnavailable,
                _ => {}
            },
            _ => {}
        }
    }

    let message = format!("{err:#}").to_lowercase();
    if ["api key", "unauthorized", "authentication", "permission"]
        .iter()
        .any(|needle| message.contains(needle))
    {
        FailureKind::Authentication
    } else if message.contains("rate limit") || message.contains("too many requests") {
        FailureKind::RateLimit
    } else if message.contains("unavailable") || message.contains("overloaded") {
        FailureKind::ServiceUnavailable
    } else if ["timeout", "timed out", "network", "connection"]
        .iter()
        .any(|needle| message.contains(needle))
    {
        FailureKind::Network
    } else {
        FailureKind::Unknown
    }
}

// =============================================================================
// Fallback loop
// =============================================================================

/// A successful result and how it was reached.
#[derive(Debug)]
pub struct Attempted<T> {
    pub value: T,
    /// Index of the provider that succeeded.
    pub index: usize,
    /// Providers tried, including the successful one.
    pub attempts: usize,
}

/// Call `call(i)` for each provider in order until one succeeds.
pub async fn with_fallback<P, T, F, Fut>(providers: &[P], mut call: F) -> Result<Attempted<T>>
where
    P: fmt::Display,
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for (index, provider) in providers.iter().enumerate() {
        match call(index).await {
            Ok(value) => {
                if index > 0 {
                    info!(provider = %provider, attempts = index + 1, "Fallback provider succeeded");
                }
                return Ok(Attempted {
                    value,
                    index,
                    attempts: index + 1,
                });
            }
            Err(e) => {
                warn!(
                    provider = %provider,
                    attempt = index + 1,
                    of = providers.len(),
                    failure = %classify_error(&e),
                    error = %e,
                    "Provider failed"
                );
                last_error = Some(e);
            }
        }
    }

    Err(AiError::AllProvidersFailed {
        attempts: providers.len(),
        last: last_error
            .map(|e| format!("{e:#}"))
            .unwrap_or_else(|| "no providers configured".to_string()),
    }
    .into())
}

// =============================================================================
// FallbackProvider
// =============================================================================

/// Structured output plus which provider produced it.
#[derive(Debug)]
pub struct FallbackExtraction<T> {
    pub extraction: Extraction<T>,
    pub kind: ProviderKind,
    pub model: String,
    pub attempts: usize,
}

/// An ordered list of providers tried one after another.
#[derive(Clone)]
pub struct FallbackProvider {
    providers: Vec<LlmProvider>,
}

impl FallbackProvider {
    pub fn new(providers: Vec<LlmProvider>) -> Result<Self> {
        if providers.is_empty() {
            return Err(AiError::Config("no LLM providers configured".to_string()).into());
        }
        Ok(Self { providers })
    }

    /// Build from `AI_MODELS` / `AI_MODEL`. Entries whose API key is missing
    /// are skipped; it is an error if none remain.
    pub fn from_env() -> Result<Self> {
        let mut providers = Vec::new();
        let mut last_error = None;

        for config in configured_models_from_env() {
            match LlmProvider::from_model_spec(&config.to_string()) {
                Ok(provider) => providers.push(provider),
                Err(e) => {
                    warn!(model = %config, error = %e, "Skipping unusable model");
                    last_error = Some(e);
                }
            }
        }

        match (providers.is_empty(), last_error) {
            (true, Some(e)) => Err(e.context("no usable LLM provider in AI_MODELS/AI_MODEL")),
            _ => Self::new(providers),
        }
    }

    pub fn providers(&self) -> &[LlmProvider] {
        &self.providers
    }

    pub fn primary(&self) -> &LlmProvider {
        &self.providers[0]
    }

    pub async fn extract<T: StructuredOutput>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<FallbackExtraction<T>> {
        let providers = &self.providers;
        let attempted = with_fallback(providers, move |i| {
            providers[i].extract::<T>(system_prompt, user_prompt, max_tokens)
        })
        .await?;

        let used = &providers[attempted.index];
        Ok(FallbackExtraction {
            extraction: attempted.value,
            kind: used.kind(),
            model: used.model().to_string(),
            attempts: attempted.attempts,
        })
    }
}

impl From<LlmProvider> for FallbackProvider {
    fn from(provider: LlmProvider) -> Self {
        Self {
            providers: vec![provider],
        }
    }
}

impl fmt::Display for FallbackProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, provider) in self.providers.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{provider}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;

    use super::*;
    use crate::openai::OpenAi;

    fn config(kind: ProviderKind, model: &str) -> ModelConfig {
        ModelConfig {
            kind,
            model: model.to_string(),
        }
    }

    #[test]
    fn model_list_is_ordered_and_trimmed() {
        let models = configured_models(
            Some("openai:gpt-4.1-2025-04-14 , anthropic:claude-3-5-sonnet-20241022"),
            Some("openai:ignored"),
        );
        assert_eq!(
            models,
            vec![
                config(ProviderKind::OpenAi, "gpt-4.1-2025-04-14"),
                config(ProviderKind::Anthropic, "claude-3-5-sonnet-20241022"),
            ]
        );
    }

    #[test]
    fn single_model_then_default() {
        assert_eq!(
            configured_models(None, Some("anthropic:claude-haiku-4-5")),
            vec![config(ProviderKind::Anthropic, "claude-haiku-4-5")]
        );
        assert_eq!(
            configured_models(Some(" , "), None),
            vec![config(ProviderKind::OpenAi, "gpt-4.1-2025-04-14")]
        );
        assert_eq!(configured_models(None, None)[0].to_string(), DEFAULT_MODEL_SPEC);
    }

    #[test]
    fn errors_are_classified() {
        let api = |status| anyhow::Error::from(AiError::Api { status, body: String::new() });
        assert_eq!(classify_error(&api(401)), FailureKind::Authentication);
        assert_eq!(classify_error(&api(429)), FailureKind::RateLimit);
        assert_eq!(classify_error(&api(503)), FailureKind::ServiceUnavailable);
        assert_eq!(
            classify_error(&AiError::Network("connection refused".into()).into()),
            FailureKind::Network
        );
        assert_eq!(classify_error(&anyhow!("Invalid API key")), FailureKind::Authentication);
        assert_eq!(classify_error(&anyhow!("Network timeout")), FailureKind::Network);
        assert_eq!(classify_error(&anyhow!("Something went wrong")), FailureKind::Unknown);
    }

    #[test]
    fn first_success_needs_one_attempt() {
        let labels = ["openai:gpt-4.1"];
        let attempted =
            tokio_test::block_on(with_fallback(&labels, |_| async { Ok::<_, anyhow::Error>("done") }))
                .unwrap();
        assert_eq!(attempted.value, "done");
        assert_eq!((attempted.index, attempted.attempts), (0, 1));
    }

    #[test]
    fn falls_back_to_next_provider_in_order() {
        let labels = ["openai:gpt-4.1", "anthropic:claude-haiku-4-5"];
        let calls = AtomicUsize::new(0);
        let attempted = tokio_test::block_on(with_fallback(&labels, |i| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if i == 0 {
                    Err(AiError::Api {
                        status: 429,
                        body: "Rate limit exceeded".into(),
                    }
                    .into())
                } else {
                    Ok(labels[i])
                }
            }
        }))
        .unwrap();

        assert_eq!(attempted.value, "anthropic:claude-haiku-4-5");
        assert_eq!((attempted.index, attempted.attempts), (1, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn all_providers_failing_reports_attempt_count() {
        let labels = ["openai:a", "anthropic:b"];
        let calls = AtomicUsize::new(0);
        let err = tokio_test::block_on(with_fallback(&labels, |i| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err::<(), _>(anyhow!("provider {i} unavailable")) }
        }))
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(matches!(
            err.downcast_ref::<AiError>(),
            Some(AiError::AllProvidersFailed { attempts: 2, .. })
        ));
        assert!(err.to_string().contains("All 2 provider(s) failed"));
        assert!(err.to_string().contains("provider 1 unavailable"));
    }

    #[test]
    fn empty_provider_list_is_rejected() {
        assert!(FallbackProvider::new(Vec::new()).is_err());
    }

    #[test]
    fn unreachable_providers_fall_through_to_an_error() {
        let chain = FallbackProvider::new(vec![
            OpenAi::new("k1", "gpt-4.1").with_base_url("http://127.0.0.1:9").into(),
            OpenAi::new("k2", "gpt-4o").with_base_url("http://127.0.0.1:9").into(),
        ])
        .unwrap();
        assert_eq!(chain.to_string(), "openai:gpt-4.1,openai:gpt-4o");

        #[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
        struct Ack {
            #[allow(dead_code)]
            ok: bool,
        }
        let err = tokio_test::block_on(chain.extract::<Ack>("s", "u", 8)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AiError>(),
            Some(AiError::AllProvidersFailed { attempts: 2, .. })
        ));
    }
}
