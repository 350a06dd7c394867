use std::sync::Arc;

use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::DedupConfig;
use crate::error::Result;
use crate::executor::ParallelExecutor;
use crate::oracle::DedupOracle;
use crate::partition::partition_initial;
use crate::progress::{NoopSink, ProgressSink};
use crate::types::{DedupOutcome, NewsItem, RoundReport, StopReason};
use crate::usage::UsageAggregator;

/// Drives deduplication rounds until the shrink ratio converges or the round
/// cap is reached.
///
/// Round 1 chunks the input contiguously. Every later round redistributes the
/// previous round's per-batch outputs so that items which never shared a batch
/// get compared. The engine owns the working item list for the whole run and
/// only ever replaces it with oracle output.
pub struct DedupEngine {
    oracle: Arc<dyn DedupOracle>,
    config: DedupConfig,
    progress: Arc<dyn ProgressSink>,
}

impl DedupEngine {
    pub fn new(oracle: Arc<dyn DedupOracle>, config: DedupConfig) -> Self {
        Self {
            oracle,
            config,
            progress: Arc::new(NoopSink),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Deduplicate `items`. Fails only on invalid configuration, before any
    /// oracle call is made; per-batch oracle failures are absorbed.
    pub async fn deduplicate(&self, items: Vec<NewsItem>) -> Result<DedupOutcome> {
        self.config.validate()?;
        Ok(self.run(items).await)
    }

    /// Like [`deduplicate`](Self::deduplicate), but never fails: on error the
    /// input comes back unprocessed with zero usage.
    pub async fn deduplicate_or_passthrough(&self, items: Vec<NewsItem>) -> DedupOutcome {
        if let Err(e) = self.config.validate() {
            warn!(error = %e, items = items.len(), "Deduplication skipped, returning input unchanged");
            return DedupOutcome::unprocessed(items, StopReason::Fallback);
        }
        self.run(items).await
    }

    async fn run(&self, items: Vec<NewsItem>) -> DedupOutcome {
        let run_id = Uuid::new_v4();
        self.run_rounds(items)
            .instrument(info_span!("dedup_run", run_id = %run_id))
            .await
    }

    async fn run_rounds(&self, items: Vec<NewsItem>) -> DedupOutcome {
        let started = Instant::now();
        let starting_count = items.len();

        if starting_count == 0 {
            info!("No items to deduplicate");
            return DedupOutcome::unprocessed(items, StopReason::EmptyInput);
        }

        let config = &self.config;
        let max_rounds = config.max_rounds(starting_count);
        let executor = ParallelExecutor::new(config.max_parallel_requests, config.batch_wait);
        config.log_summary();
        info!(items = starting_count, max_rounds, "Starting deduplication");

        let mut usage = UsageAggregator::new();
        let mut call_count = 0;
        let mut rounds: Vec<RoundReport> = Vec::new();
        let mut previous: Vec<Vec<NewsItem>> = Vec::new();
        let mut round: u32 = 1;

        let stop_reason = loop {
            let batches = if round == 1 {
                partition_initial(&items, config.batch_size)
            } else {
                config
                    .redistribution
                    .redistribute(&previous, config.batch_size, round)
            };
            let input_count: usize = batches.iter().map(Vec::len).sum();
            let round_started = Instant::now();

            info!(
                round,
                max_rounds,
                items = input_count,
                batches = batches.len(),
                "Starting round"
            );

            let out = executor
                .run(self.oracle.as_ref(), self.progress.as_ref(), round, &batches)
                .await;

            let output_count: usize = out.results.iter().map(Vec::len).sum();
            let ratio = output_count as f64 / input_count as f64;
            usage.add(out.usage);
            call_count += out.call_count;

            let report = RoundReport {
                round,
                input_count,
                output_count,
                ratio,
                batches: batches.len(),
                failed_batches: out.failed_batches,
                call_count: out.call_count,
                usage: out.usage,
                elapsed: round_started.elapsed(),
            };
            info!(
                round,
                before = input_count,
                after = output_count,
                ratio = (ratio * 1000.0).round() / 1000.0,
                calls = report.call_count,
                failed_batches = report.failed_batches,
                usage = %report.usage,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Round complete"
            );

            if let Err(e) = self
                .progress
                .on_round(&report, &batches, &out.results)
                .await
            {
                warn!(round, error = %e, "Progress sink failed for round");
            }
            rounds.push(report);
            previous = out.results;

            if output_count == 0 {
                break StopReason::Exhausted;
            }
            if config.is_converged(ratio) {
                break StopReason::Converged;
            }
            if round >= max_rounds {
                break StopReason::RoundCap;
            }

            if !config.round_wait.is_zero() {
                info!(
                    wait_ms = config.round_wait.as_millis() as u64,
                    "Waiting before next round"
                );
                tokio::time::sleep(config.round_wait).await;
            }
            round += 1;
        };

        let outcome = DedupOutcome {
            items: previous.into_iter().flatten().collect(),
            usage: usage.current(),
            call_count,
            rounds,
            stop_reason,
        };
        info!(
            before = starting_count,
            after = outcome.items.len(),
            rounds = outcome.rounds_run(),
            stop_reason = %outcome.stop_reason,
            calls = outcome.call_count,
            usage = %outcome.usage,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Deduplication complete"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::DedupError;
    use crate::testing::{news, numbered_items, MockOracle};
    use crate::types::UsageStats;

    fn fast_config() -> DedupConfig {
        DedupConfig {
            batch_size: 4,
            max_parallel_requests: 2,
            batch_wait: Duration::ZERO,
            round_wait: Duration::ZERO,
            min_items_per_round: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_input_runs_no_rounds() {
        let oracle = Arc::new(MockOracle::passthrough());
        let engine = DedupEngine::new(oracle.clone(), fast_config());

        let outcome = engine.deduplicate(Vec::new()).await.unwrap();

        assert!(outcome.items.is_empty());
        assert_eq!(outcome.stop_reason, StopReason::EmptyInput);
        assert_eq!(outcome.rounds_run(), 0);
        assert!(outcome.usage.is_zero());
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_any_call() {
        let oracle = Arc::new(MockOracle::passthrough());
        let config = DedupConfig {
            batch_size: 0,
            ..fast_config()
        };
        let engine = DedupEngine::new(oracle.clone(), config);

        let err = engine.deduplicate(numbered_items("x", 5)).await.unwrap_err();

        assert!(matches!(err, DedupError::Config(_)));
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn passthrough_fallback_returns_input_on_config_error() {
        let oracle = Arc::new(MockOracle::exact_duplicates());
        let config = DedupConfig {
            ratio_threshold: 1.5,
            ..fast_config()
        };
        let engine = DedupEngine::new(oracle.clone(), config);
        let input = vec![news("dup", "a"), news("dup", "b")];

        let outcome = engine.deduplicate_or_passthrough(input.clone()).await;

        assert_eq!(outcome.items, input);
        assert_eq!(outcome.stop_reason, StopReason::Fallback);
        assert_eq!(outcome.call_count, 0);
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn stops_after_first_round_when_nothing_shrinks() {
        let oracle = Arc::new(MockOracle::passthrough());
        let engine = DedupEngine::new(oracle.clone(), fast_config());

        let outcome = engine.deduplicate(numbered_items("n", 10)).await.unwrap();

        assert_eq!(outcome.rounds_run(), 1);
        assert_eq!(outcome.stop_reason, StopReason::Converged);
        assert_eq!(outcome.items, numbered_items("n", 10));
        // 10 items in batches of 4.
        assert_eq!(outcome.call_count, 3);
    }

    #[tokio::test]
    async fn fewer_items_than_min_still_runs_one_round() {
        let oracle = Arc::new(MockOracle::exact_duplicates());
        let config = DedupConfig {
            min_items_per_round: 30,
            ..fast_config()
        };
        let engine = DedupEngine::new(oracle, config);
        let input = vec![news("a", "1"), news("a", "2"), news("b", "3")];

        let outcome = engine.deduplicate(input).await.unwrap();

        assert_eq!(outcome.rounds_run(), 1);
        assert_eq!(outcome.stop_reason, StopReason::RoundCap);
        assert_eq!(outcome.items, vec![
            NewsItem::new("a", vec!["1".into(), "2".into()]),
            news("b", "3"),
        ]);
    }

    #[tokio::test]
    async fn usage_and_calls_accumulate_across_rounds() {
        // Round 1 halves the input, round 2 changes nothing.
        let oracle = Arc::new(MockOracle::new(|batch, ctx| {
            if ctx.round == 1 {
                Ok(batch.iter().step_by(2).cloned().collect())
            } else {
                Ok(batch.to_vec())
            }
        }));
        let engine = DedupEngine::new(oracle.clone(), fast_config());

        let outcome = engine.deduplicate(numbered_items("u", 16)).await.unwrap();

        assert_eq!(outcome.rounds_run(), 2);
        assert_eq!(outcome.items.len(), 8);
        assert_eq!(outcome.call_count, 4 + 2);
        assert_eq!(outcome.call_count, oracle.call_count());

        let summed = outcome
            .rounds
            .iter()
            .fold(UsageStats::default(), |acc, r| acc + r.usage);
        assert_eq!(outcome.usage, summed);
    }
}
