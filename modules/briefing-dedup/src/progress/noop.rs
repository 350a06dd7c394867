use async_trait::async_trait;

use super::ProgressSink;
use crate::types::{BatchReport, NewsItem, RoundReport};

/// Discards all progress records.
pub struct NoopSink;

#[async_trait]
impl ProgressSink for NoopSink {
    async fn on_batch(
        &self,
        _report: &BatchReport,
        _input: &[NewsItem],
        _output: &[NewsItem],
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_round(
        &self,
        _report: &RoundReport,
        _input: &[Vec<NewsItem>],
        _output: &[Vec<NewsItem>],
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
