use crate::types::UsageStats;

/// Running token totals for a deduplication run.
///
/// Owned by the task driving the run and updated only after each group of
/// parallel calls has been joined, so no synchronization is needed.
#[derive(Debug, Default, Clone)]
pub struct UsageAggregator {
    total: UsageStats,
}

impl UsageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, usage: UsageStats) {
        self.total += usage;
    }

    pub fn current(&self) -> UsageStats {
        self.total
    }

    pub fn reset(&mut self) {
        self.total = UsageStats::default();
    }
}

impl Extend<UsageStats> for UsageAggregator {
    fn extend<I: IntoIterator<Item = UsageStats>>(&mut self, iter: I) {
        for usage in iter {
            self.add(usage);
        }
    }
}
