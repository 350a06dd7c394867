use async_trait::async_trait;

use super::{DedupOracle, OracleResponse};
use crate::types::{BatchContext, NewsItem};

/// Returns every batch unchanged at zero cost. Used for dry runs.
pub struct PassthroughOracle;

#[async_trait]
impl DedupOracle for PassthroughOracle {
    async fn deduplicate(
        &self,
        batch: &[NewsItem],
        _ctx: BatchContext,
    ) -> anyhow::Result<OracleResponse> {
        Ok(OracleResponse {
            items: batch.to_vec(),
            usage: Default::default(),
        })
    }
}
