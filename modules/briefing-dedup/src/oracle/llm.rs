use std::time::Instant;

use ai_client::{classify_error, FallbackProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

use super::{DedupOracle, OracleResponse};
use crate::types::{BatchContext, NewsItem, UsageStats};

/// Output ceiling for a single dedup call.
pub const MAX_OUTPUT_TOKENS: u32 = 32768;

const SYSTEM_PROMPT: &str = r#"You are a news editor fluent in Arabic. You'll be given a list of news items that may contain duplicates. Your task is to deduplicate the news items. Follow these rules:

1. Identify and merge ALL similar stories - whenever multiple items cover the same event or are related to the same topic, combine them into one news item.
2. Don't skip any news item: items that cannot be merged should be kept as is.
3. When merging, preserve all unique sources from the duplicate items.
4. Keep the most comprehensive summary when merging duplicates.
5. Return ALL unique news items after deduplication."#;

// =============================================================================
// Types for LLM structured output
// =============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DedupResponse {
    /// Every unique news item remaining after merging duplicates
    pub items: Vec<NewsItem>,
}

// =============================================================================
// LLM-backed oracle
// =============================================================================

/// Deduplicates a batch with one structured-output LLM call, falling back
/// through the configured providers in order.
pub struct LlmOracle {
    providers: FallbackProvider,
    max_output_tokens: u32,
}

impl LlmOracle {
    pub fn new(providers: impl Into<FallbackProvider>) -> Self {
        Self {
            providers: providers.into(),
            max_output_tokens: MAX_OUTPUT_TOKENS,
        }
    }

    /// Providers from `AI_MODELS`, else `AI_MODEL`.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(FallbackProvider::from_env()?))
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn providers(&self) -> &FallbackProvider {
        &self.providers
    }
}

pub(crate) fn build_user_prompt(batch: &[NewsItem]) -> Result<String> {
    serde_json::to_string_pretty(batch).context("Failed to serialize batch for the oracle")
}

#[async_trait]
impl DedupOracle for LlmOracle {
    async fn deduplicate(&self, batch: &[NewsItem], ctx: BatchContext) -> Result<OracleResponse> {
        let user = build_user_prompt(batch)?;
        let started = Instant::now();

        let result = self
            .providers
            .extract::<DedupResponse>(SYSTEM_PROMPT, &user, self.max_output_tokens)
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(used) => {
                info!(
                    batch = %ctx,
                    provider = %used.kind,
                    model = used.model.as_str(),
                    attempts = used.attempts,
                    duration_ms,
                    success = true,
                    "Oracle call"
                );
                Ok(OracleResponse {
                    items: used.extraction.value.items,
                    usage: UsageStats::from(used.extraction.usage),
                })
            }
            Err(e) => {
                warn!(
                    batch = %ctx,
                    providers = %self.providers,
                    attempts = self.providers.providers().len(),
                    duration_ms,
                    success = false,
                    failure = %classify_error(&e),
                    error = %e,
                    "Oracle call"
                );
                Err(e.context(format!("dedup oracle call {ctx} failed")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ai_client::StructuredOutput;

    #[test]
    fn user_prompt_is_pretty_json_of_the_batch() {
        let batch = vec![NewsItem::new("Ministry announces plan", vec!["https://t.me/a/1".into()])];
        let prompt = build_user_prompt(&batch).unwrap();

        assert!(prompt.contains("\n  {"));
        let round_trip: Vec<NewsItem> = serde_json::from_str(&prompt).unwrap();
        assert_eq!(round_trip, batch);
    }

    #[test]
    fn response_schema_requires_items_with_sources() {
        let schema = DedupResponse::strict_schema();
        let item = &schema["properties"]["items"]["items"];

        assert_eq!(item["additionalProperties"], serde_json::Value::Bool(false));
        let required: Vec<&str> = item["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert!(required.contains(&"summary"));
        assert!(required.contains(&"sources"));
    }

    #[test]
    fn oracle_defaults_to_max_output_tokens() {
        let provider = ai_client::LlmProvider::from(ai_client::OpenAi::new("sk-test", "gpt-4.1"));
        let oracle = LlmOracle::new(provider);
        assert_eq!(oracle.max_output_tokens, MAX_OUTPUT_TOKENS);
        assert_eq!(oracle.providers().primary().model(), "gpt-4.1");

        let oracle = oracle.with_max_output_tokens(1024);
        assert_eq!(oracle.max_output_tokens, 1024);
    }

    #[tokio::test]
    async fn exhausted_provider_chain_fails_the_batch() {
        let unreachable = |model: &str| {
            ai_client::LlmProvider::from(
                ai_client::OpenAi::new("sk-test", model).with_base_url("http://127.0.0.1:9"),
            )
        };
        let chain =
            FallbackProvider::new(vec![unreachable("gpt-4.1"), unreachable("gpt-4o")]).unwrap();
        let oracle = LlmOracle::new(chain);
        let batch = vec![NewsItem::from_text("a")];

        let err = oracle
            .deduplicate(&batch, BatchContext { round: 1, batch: 1 })
            .await
            .unwrap_err();

        assert!(format!("{err:#}").contains("All 2 provider(s) failed"));
    }
}
