// Test doubles for the dedup engine.
//
// - MockOracle (DedupOracle) with scripted behavior, latency and failures
// - RecordingSink / FailingSink (ProgressSink)
//
// Plus helpers for building numbered news items.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::oracle::{DedupOracle, OracleResponse};
use crate::progress::ProgressSink;
use crate::types::{BatchContext, BatchReport, NewsItem, RoundReport, UsageStats};

type Behavior = Box<dyn Fn(&[NewsItem], BatchContext) -> Result<Vec<NewsItem>> + Send + Sync>;
type DelayFn = Box<dyn Fn(BatchContext) -> Duration + Send + Sync>;
type FailWhen = Box<dyn Fn(BatchContext) -> bool + Send + Sync>;

// ---------------------------------------------------------------------------
// Item helpers
// ---------------------------------------------------------------------------

pub fn news(summary: &str, source: &str) -> NewsItem {
    NewsItem::new(summary, vec![source.to_string()])
}

/// `n` distinct items `{prefix}0..{prefix}{n-1}`, each with its own source.
pub fn numbered_items(prefix: &str, n: usize) -> Vec<NewsItem> {
    (0..n)
        .map(|i| news(&format!("{prefix}{i}"), &format!("https://t.me/{prefix}/{i}")))
        .collect()
}

/// Merge items with identical summaries, keeping first-occurrence order and
/// the union of their sources.
pub fn merge_exact_duplicates(batch: &[NewsItem]) -> Vec<NewsItem> {
    let mut merged: Vec<NewsItem> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for item in batch {
        match index.get(item.summary.as_str()) {
            Some(&at) => {
                for source in &item.sources {
                    if !merged[at].sources.contains(source) {
                        merged[at].sources.push(source.clone());
                    }
                }
            }
            None => {
                index.insert(item.summary.as_str(), merged.len());
                merged.push(item.clone());
            }
        }
    }

    merged
}

/// Deterministic fake token usage: 100 prompt tokens per item in, 10
/// completion tokens per item out.
pub fn mock_usage(items_in: usize, items_out: usize) -> UsageStats {
    let input = items_in as u64 * 100;
    let output = items_out as u64 * 10;
    UsageStats::new(input, output, input + output)
}

/// Asserts that paused-clock time since `started` is `expected`, allowing
/// for the timer's millisecond rounding.
pub fn assert_elapsed(started: tokio::time::Instant, expected: Duration) {
    let elapsed = started.elapsed();
    assert!(
        elapsed >= expected && elapsed <= expected + Duration::from_millis(5),
        "expected ~{expected:?} elapsed, got {elapsed:?}"
    );
}

// ---------------------------------------------------------------------------
// MockOracle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub ctx: BatchContext,
    pub input: Vec<NewsItem>,
}

/// Scripted oracle. Records every call and tracks peak concurrency.
/// Builder pattern: `.with_delay()`, `.with_delay_fn()`, `.failing_on()`.
pub struct MockOracle {
    behavior: Behavior,
    delay: Option<DelayFn>,
    fail_when: Option<FailWhen>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockOracle {
    pub fn new(
        behavior: impl Fn(&[NewsItem], BatchContext) -> Result<Vec<NewsItem>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            behavior: Box::new(behavior),
            delay: None,
            fail_when: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Returns every batch unchanged.
    pub fn passthrough() -> Self {
        Self::new(|batch, _| Ok(batch.to_vec()))
    }

    /// Merges items whose summaries are identical.
    pub fn exact_duplicates() -> Self {
        Self::new(|batch, _| Ok(merge_exact_duplicates(batch)))
    }

    /// Fails every call.
    pub fn failing() -> Self {
        Self::new(|_, ctx| bail!("MockOracle: scripted failure for {ctx}"))
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_delay_fn(move |_| delay)
    }

    pub fn with_delay_fn(
        mut self,
        delay: impl Fn(BatchContext) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.delay = Some(Box::new(delay));
        self
    }

    pub fn failing_on(mut self, when: impl Fn(BatchContext) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Some(Box::new(when));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DedupOracle for MockOracle {
    async fn deduplicate(&self, batch: &[NewsItem], ctx: BatchContext) -> Result<OracleResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            ctx,
            input: batch.to_vec(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = &self.delay {
            tokio::time::sleep(delay(ctx)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_when.as_ref().is_some_and(|when| when(ctx)) {
            bail!("MockOracle: scripted failure for {ctx}");
        }

        let items = (self.behavior)(batch, ctx)?;
        Ok(OracleResponse {
            usage: mock_usage(batch.len(), items.len()),
            items,
        })
    }
}

// ---------------------------------------------------------------------------
// Progress sinks
// ---------------------------------------------------------------------------

/// A round callback as the sink saw it: batch sizes in, batch sizes out.
#[derive(Debug, Clone)]
pub struct RecordedRound {
    pub report: RoundReport,
    pub input_batches: Vec<usize>,
    pub output_batches: Vec<usize>,
}

/// Keeps every report it is handed.
#[derive(Default)]
pub struct RecordingSink {
    pub batches: Mutex<Vec<BatchReport>>,
    pub rounds: Mutex<Vec<RecordedRound>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_reports(&self) -> Vec<BatchReport> {
        self.batches.lock().unwrap().clone()
    }

    pub fn round_reports(&self) -> Vec<RecordedRound> {
        self.rounds.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn on_batch(
        &self,
        report: &BatchReport,
        _input: &[NewsItem],
        _output: &[NewsItem],
    ) -> Result<()> {
        self.batches.lock().unwrap().push(report.clone());
        Ok(())
    }

    async fn on_round(
        &self,
        report: &RoundReport,
        input: &[Vec<NewsItem>],
        output: &[Vec<NewsItem>],
    ) -> Result<()> {
        self.rounds.lock().unwrap().push(RecordedRound {
            report: report.clone(),
            input_batches: input.iter().map(Vec::len).collect(),
            output_batches: output.iter().map(Vec::len).collect(),
        });
        Ok(())
    }
}

/// Errors on every callback.
pub struct FailingSink;

#[async_trait]
impl ProgressSink for FailingSink {
    async fn on_batch(&self, _: &BatchReport, _: &[NewsItem], _: &[NewsItem]) -> Result<()> {
        bail!("FailingSink: batch")
    }

    async fn on_round(
        &self,
        _: &RoundReport,
        _: &[Vec<NewsItem>],
        _: &[Vec<NewsItem>],
    ) -> Result<()> {
        bail!("FailingSink: round")
    }
}
