pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod oracle;
pub mod partition;
pub mod progress;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod types;
pub mod usage;

pub use config::{DedupConfig, StopRule};
pub use engine::DedupEngine;
pub use error::{DedupError, Result};
pub use executor::{ExecutorOutput, ParallelExecutor};
pub use oracle::{DedupOracle, LlmOracle, OracleResponse, PassthroughOracle};
pub use partition::{partition_initial, partition_round_robin, Redistribution};
pub use progress::{JsonDumpSink, NoopSink, ProgressSink};
pub use types::{
    BatchContext, BatchReport, DedupOutcome, InputRecord, NewsItem, RoundReport, StopReason,
    UsageStats,
};
pub use usage::UsageAggregator;
