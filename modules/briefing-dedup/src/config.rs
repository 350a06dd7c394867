use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::error::DedupError;
use crate::partition::Redistribution;

/// Production defaults.
pub const DEFAULT_BATCH_SIZE: usize = 150;
pub const DEFAULT_MAX_PARALLEL_REQUESTS: usize = 5;
pub const DEFAULT_BATCH_WAIT_MS: u64 = 2000;
pub const DEFAULT_ROUND_WAIT_MS: u64 = 4000;
pub const DEFAULT_RATIO_THRESHOLD: f64 = 0.98;
pub const DEFAULT_MIN_ITEMS_PER_ROUND: usize = 30;

/// How a round's shrink ratio is compared against the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopRule {
    /// Stop when `ratio >= threshold`.
    #[default]
    AtLeast,
    /// Stop when `ratio > threshold`.
    Above,
}

impl StopRule {
    pub fn is_converged(self, ratio: f64, threshold: f64) -> bool {
        match self {
            Self::AtLeast => ratio >= threshold,
            Self::Above => ratio > threshold,
        }
    }
}

impl FromStr for StopRule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "at_least" | ">=" | "gte" => Ok(Self::AtLeast),
            "above" | ">" | "gt" => Ok(Self::Above),
            other => Err(anyhow!("unknown stop rule '{other}' (expected at_least or above)")),
        }
    }
}

/// Tuning knobs for a deduplication run.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Max items per oracle call.
    pub batch_size: usize,
    /// Max oracle calls in flight at once.
    pub max_parallel_requests: usize,
    /// Pause between groups of parallel calls.
    pub batch_wait: Duration,
    /// Pause between rounds.
    pub round_wait: Duration,
    pub ratio_threshold: f64,
    pub stop_rule: StopRule,
    /// Caps total rounds at `starting_count / min_items_per_round`.
    pub min_items_per_round: usize,
    pub redistribution: Redistribution,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_parallel_requests: DEFAULT_MAX_PARALLEL_REQUESTS,
            batch_wait: Duration::from_millis(DEFAULT_BATCH_WAIT_MS),
            round_wait: Duration::from_millis(DEFAULT_ROUND_WAIT_MS),
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
            stop_rule: StopRule::default(),
            min_items_per_round: DEFAULT_MIN_ITEMS_PER_ROUND,
            redistribution: Redistribution::default(),
        }
    }
}

impl DedupConfig {
    /// Load overrides from `DEDUP_*` environment variables. Unset variables
    /// keep their defaults; malformed ones are an error.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let redistribution = match optional_env::<u64>("DEDUP_SHUFFLE_SEED")? {
            Some(seed) => Redistribution::SeededShuffle { seed },
            None => defaults.redistribution,
        };

        Ok(Self {
            batch_size: optional_env("DEDUP_BATCH_SIZE")?.unwrap_or(defaults.batch_size),
            max_parallel_requests: optional_env("DEDUP_MAX_PARALLEL_REQUESTS")?
                .unwrap_or(defaults.max_parallel_requests),
            batch_wait: optional_env("DEDUP_BATCH_WAIT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_wait),
            round_wait: optional_env("DEDUP_ROUND_WAIT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.round_wait),
            ratio_threshold: optional_env("DEDUP_RATIO_THRESHOLD")?
                .unwrap_or(defaults.ratio_threshold),
            stop_rule: optional_env("DEDUP_STOP_RULE")?.unwrap_or(defaults.stop_rule),
            min_items_per_round: optional_env("DEDUP_MIN_ITEMS_PER_ROUND")?
                .unwrap_or(defaults.min_items_per_round),
            redistribution,
        })
    }

    /// Reject configurations that could never run correctly.
    pub fn validate(&self) -> Result<(), DedupError> {
        if self.batch_size == 0 {
            return Err(DedupError::Config("batch_size must be > 0".into()));
        }
        if self.max_parallel_requests == 0 {
            return Err(DedupError::Config("max_parallel_requests must be > 0".into()));
        }
        if self.min_items_per_round == 0 {
            return Err(DedupError::Config("min_items_per_round must be > 0".into()));
        }
        if !(self.ratio_threshold > 0.0 && self.ratio_threshold <= 1.0) {
            return Err(DedupError::Config(format!(
                "ratio_threshold must be in (0, 1], got {}",
                self.ratio_threshold
            )));
        }
        Ok(())
    }

    /// Round cap for a run starting with `starting_count` items.
    /// Round 1 always runs, so the cap is at least 1.
    pub fn max_rounds(&self, starting_count: usize) -> u32 {
        let rounds = starting_count / self.min_items_per_round.max(1);
        u32::try_from(rounds).unwrap_or(u32::MAX).max(1)
    }

    pub fn is_converged(&self, ratio: f64) -> bool {
        self.stop_rule.is_converged(ratio, self.ratio_threshold)
    }

    pub fn log_summary(&self) {
        info!(
            batch_size = self.batch_size,
            max_parallel_requests = self.max_parallel_requests,
            batch_wait_ms = self.batch_wait.as_millis() as u64,
            round_wait_ms = self.round_wait.as_millis() as u64,
            ratio_threshold = self.ratio_threshold,
            stop_rule = ?self.stop_rule,
            min_items_per_round = self.min_items_per_round,
            redistribution = ?self.redistribution,
            "Dedup config"
        );
    }
}

fn optional_env<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(None),
    }
}
