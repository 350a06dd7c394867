use std::fmt;
use std::ops::{Add, AddAssign};
use std::time::Duration;

use ai_client::TokenUsage;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Items
// =============================================================================

/// A unit of content subject to deduplication: summary text plus the sources
/// it was drawn from. Never mutated by the engine, only replaced by oracle output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct NewsItem {
    /// The news text. When items are merged, the most comprehensive summary.
    pub summary: String,
    /// Every unique source URL or identifier backing this item.
    pub sources: Vec<String>,
}

impl NewsItem {
    pub fn new(summary: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            summary: summary.into(),
            sources,
        }
    }

    /// A raw record with no known sources.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(text, Vec::new())
    }
}

/// A raw input record: either bare text or an already-structured item.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InputRecord {
    Text(String),
    Item(NewsItem),
}

impl From<InputRecord> for NewsItem {
    fn from(record: InputRecord) -> Self {
        match record {
            InputRecord::Text(text) => NewsItem::from_text(text),
            InputRecord::Item(item) => item,
        }
    }
}

// =============================================================================
// Usage
// =============================================================================

/// Token accounting, additive across batches and rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl UsageStats {
    pub fn new(input_tokens: u64, output_tokens: u64, total_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl Add for UsageStats {
    type Output = UsageStats;

    fn add(self, rhs: UsageStats) -> UsageStats {
        UsageStats {
            input_tokens: self.input_tokens.saturating_add(rhs.input_tokens),
            output_tokens: self.output_tokens.saturating_add(rhs.output_tokens),
            total_tokens: self.total_tokens.saturating_add(rhs.total_tokens),
        }
    }
}

impl AddAssign for UsageStats {
    fn add_assign(&mut self, rhs: UsageStats) {
        *self = *self + rhs;
    }
}

impl From<TokenUsage> for UsageStats {
    fn from(u: TokenUsage) -> Self {
        Self::new(u.input_tokens, u.output_tokens, u.total_tokens)
    }
}

impl fmt::Display for UsageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} prompt + {} completion = {} total tokens",
            self.input_tokens, self.output_tokens, self.total_tokens
        )
    }
}

// =============================================================================
// Batch and round bookkeeping
// =============================================================================

/// Identifies one oracle call. Both ordinals are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchContext {
    pub round: u32,
    pub batch: u32,
}

impl fmt::Display for BatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.round, self.batch)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub round: u32,
    pub batch: u32,
    pub input_count: usize,
    pub output_count: usize,
    pub usage: UsageStats,
    /// The oracle failed and the batch was passed through unchanged.
    pub failed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundReport {
    pub round: u32,
    pub input_count: usize,
    pub output_count: usize,
    /// `output_count / input_count`.
    pub ratio: f64,
    pub batches: usize,
    pub failed_batches: usize,
    pub call_count: usize,
    pub usage: UsageStats,
    pub elapsed: Duration,
}

impl fmt::Display for RoundReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "round {}: {} -> {} items (ratio {:.2}, {} calls, {} failed), {}",
            self.round,
            self.input_count,
            self.output_count,
            self.ratio,
            self.call_count,
            self.failed_batches,
            self.usage,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Nothing to do; zero rounds ran.
    EmptyInput,
    /// The round's shrink ratio met the stop threshold.
    Converged,
    /// The round cap derived from the starting item count was reached.
    RoundCap,
    /// A round produced no items at all.
    Exhausted,
    /// The run failed and the unprocessed input was returned.
    Fallback,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "empty_input"),
            Self::Converged => write!(f, "converged"),
            Self::RoundCap => write!(f, "round_cap"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

/// Result of one `deduplicate` run.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub items: Vec<NewsItem>,
    pub usage: UsageStats,
    pub call_count: usize,
    pub rounds: Vec<RoundReport>,
    pub stop_reason: StopReason,
}

impl DedupOutcome {
    pub(crate) fn unprocessed(items: Vec<NewsItem>, stop_reason: StopReason) -> Self {
        Self {
            items,
            usage: UsageStats::default(),
            call_count: 0,
            rounds: Vec::new(),
            stop_reason,
        }
    }

    pub fn rounds_run(&self) -> usize {
        self.rounds.len()
    }
}

impl fmt::Display for DedupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.rounds.first().map(|r| r.input_count).unwrap_or(self.items.len());
        write!(
            f,
            "{} -> {} items in {} rounds ({}), {} oracle calls, {}",
            start,
            self.items.len(),
            self.rounds.len(),
            self.stop_reason,
            self.call_count,
            self.usage,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_adds_field_by_field() {
        let mut total = UsageStats::new(10, 2, 12);
        total += UsageStats::new(5, 1, 7);
        assert_eq!(total, UsageStats::new(15, 3, 19));
        assert_eq!(total.to_string(), "15 prompt + 3 completion = 19 total tokens");
    }

    #[test]
    fn input_records_accept_text_or_items() {
        let raw = r#"["plain post", {"summary": "merged", "sources": ["https://a"]}]"#;
        let records: Vec<InputRecord> = serde_json::from_str(raw).unwrap();
        let items: Vec<NewsItem> = records.into_iter().map(NewsItem::from).collect();

        assert_eq!(items[0], NewsItem::from_text("plain post"));
        assert_eq!(items[1].sources, vec!["https://a".to_string()]);
    }

    #[test]
    fn batch_context_formats_zero_padded() {
        assert_eq!(BatchContext { round: 2, batch: 7 }.to_string(), "02-07");
    }
}
