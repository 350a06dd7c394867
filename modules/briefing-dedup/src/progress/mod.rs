//! Side-channel progress reporting. Sinks observe batches and rounds but can
//! never change the outcome of a run; their errors are logged and dropped.

pub mod dump;
pub mod noop;

use async_trait::async_trait;

use crate::types::{BatchReport, NewsItem, RoundReport};

pub use dump::JsonDumpSink;
pub use noop::NoopSink;

/// Pluggable observer for a deduplication run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Called once per batch after its group has been joined.
    async fn on_batch(
        &self,
        report: &BatchReport,
        input: &[NewsItem],
        output: &[NewsItem],
    ) -> anyhow::Result<()>;

    /// Called once per completed round with the round's batches, in order,
    /// as they went in and came out.
    async fn on_round(
        &self,
        report: &RoundReport,
        input: &[Vec<NewsItem>],
        output: &[Vec<NewsItem>],
    ) -> anyhow::Result<()>;
}
