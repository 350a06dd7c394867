use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use crate::error::DedupError;
use crate::oracle::DedupOracle;
use crate::progress::ProgressSink;
use crate::types::{BatchContext, BatchReport, NewsItem, UsageStats};

/// Aggregated result of running one round's batches.
#[derive(Debug, Default)]
pub struct ExecutorOutput {
    /// `results[i]` is the oracle output for `batches[i]`.
    pub results: Vec<Vec<NewsItem>>,
    pub usage: UsageStats,
    pub call_count: usize,
    pub failed_batches: usize,
    pub reports: Vec<BatchReport>,
}

/// Runs batches against the oracle in groups of at most `concurrency`,
/// pausing `batch_wait` between groups.
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    concurrency: usize,
    batch_wait: Duration,
}

impl ParallelExecutor {
    pub fn new(concurrency: usize, batch_wait: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            batch_wait,
        }
    }

    pub async fn run(
        &self,
        oracle: &dyn DedupOracle,
        sink: &dyn ProgressSink,
        round: u32,
        batches: &[Vec<NewsItem>],
    ) -> ExecutorOutput {
        let mut output = ExecutorOutput {
            results: Vec::with_capacity(batches.len()),
            reports: Vec::with_capacity(batches.len()),
            ..Default::default()
        };
        let group_count = batches.len().div_ceil(self.concurrency);

        for (group_index, group) in batches.chunks(self.concurrency).enumerate() {
            let offset = group_index * self.concurrency;
            info!(
                round,
                first = offset + 1,
                last = offset + group.len(),
                total = batches.len(),
                "Processing batch group"
            );

            // All calls of a group are in flight together; results come back positionally.
            let settled = join_all(group.iter().enumerate().map(|(i, batch)| {
                let ctx = BatchContext {
                    round,
                    batch: (offset + i + 1) as u32,
                };
                async move { (ctx, oracle.deduplicate(batch, ctx).await) }
            }))
            .await;
            output.call_count += group.len();

            for ((ctx, result), input) in settled.into_iter().zip(group) {
                let (items, usage, failed) = match result {
                    Ok(response) => (response.items, response.usage, false),
                    Err(source) => {
                        let err = DedupError::Oracle { ctx, source };
                        warn!(error = %err, items = input.len(), "Batch passed through unchanged");
                        (input.clone(), UsageStats::default(), true)
                    }
                };

                let report = BatchReport {
                    round,
                    batch: ctx.batch,
                    input_count: input.len(),
                    output_count: items.len(),
                    usage,
                    failed,
                };
                info!(
                    batch = %ctx,
                    before = report.input_count,
                    after = report.output_count,
                    usage = %usage,
                    "Batch complete"
                );
                if let Err(e) = sink.on_batch(&report, input, &items).await {
                    warn!(batch = %ctx, error = %e, "Progress sink failed for batch");
                }

                output.usage += usage;
                output.failed_batches += usize::from(failed);
                output.results.push(items);
                output.reports.push(report);
            }

            if group_index + 1 < group_count && !self.batch_wait.is_zero() {
                info!(
                    wait_ms = self.batch_wait.as_millis() as u64,
                    "Waiting before next batch group"
                );
                tokio::time::sleep(self.batch_wait).await;
            }
        }

        output
    }
}
