pub mod llm;
pub mod passthrough;

use async_trait::async_trait;

use crate::types::{BatchContext, NewsItem, UsageStats};

pub use llm::LlmOracle;
pub use passthrough::PassthroughOracle;

/// What an oracle returns for one batch.
#[derive(Debug, Clone, Default)]
pub struct OracleResponse {
    pub items: Vec<NewsItem>,
    pub usage: UsageStats,
}

/// The external "deduplicate one batch" decision-maker.
///
/// Implementations should return no more items than they were given, but the
/// engine does not rely on it. An error skips the batch for this round: its
/// items pass through unchanged and no usage is charged.
#[async_trait]
pub trait DedupOracle: Send + Sync {
    async fn deduplicate(
        &self,
        batch: &[NewsItem],
        ctx: BatchContext,
    ) -> anyhow::Result<OracleResponse>;
}
