use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::ProgressSink;
use crate::error::DedupError;
use crate::types::{BatchReport, NewsItem, RoundReport};

/// Writes every batch's and round's input and output as pretty JSON into a
/// folder, for inspecting what the oracle merged.
///
/// File names: `RR-BB-input.json` / `RR-BB-output.json` per batch and
/// `RR---input.json` / `RR---output.json` per round.
pub struct JsonDumpSink {
    folder: PathBuf,
}

impl JsonDumpSink {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    /// Enabled when `DEDUP_OUTPUT_FOLDER` is set, unless running in Lambda
    /// (`IS_LAMBDA=true`) where the filesystem is not worth writing to.
    pub fn from_env() -> Option<Self> {
        if std::env::var("IS_LAMBDA").is_ok_and(|v| v == "true") {
            return None;
        }
        match std::env::var("DEDUP_OUTPUT_FOLDER") {
            Ok(folder) if !folder.trim().is_empty() => Some(Self::new(folder)),
            _ => {
                info!("No DEDUP_OUTPUT_FOLDER set, batch dumps disabled");
                None
            }
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn file_name(round: u32, batch: Option<u32>, kind: &str) -> String {
        match batch {
            Some(batch) => format!("{round:02}-{batch:02}-{kind}.json"),
            None => format!("{round:02}---{kind}.json"),
        }
    }

    async fn write<T: Serialize + Sync>(&self, name: String, items: &[T]) -> Result<(), DedupError> {
        let path = self.folder.join(name);
        let body = serde_json::to_vec_pretty(items)?;
        tokio::fs::write(&path, body).await?;
        debug!(path = %path.display(), items = items.len(), "Wrote dedup dump");
        Ok(())
    }
}

#[async_trait]
impl ProgressSink for JsonDumpSink {
    async fn on_batch(
        &self,
        report: &BatchReport,
        input: &[NewsItem],
        output: &[NewsItem],
    ) -> anyhow::Result<()> {
        let batch = Some(report.batch);
        self.write(Self::file_name(report.round, batch, "input"), input).await?;
        self.write(Self::file_name(report.round, batch, "output"), output).await?;
        Ok(())
    }

    async fn on_round(
        &self,
        report: &RoundReport,
        input: &[Vec<NewsItem>],
        output: &[Vec<NewsItem>],
    ) -> anyhow::Result<()> {
        let input: Vec<&NewsItem> = input.iter().flatten().collect();
        let output: Vec<&NewsItem> = output.iter().flatten().collect();
        self.write(Self::file_name(report.round, None, "input"), &input).await?;
        self.write(Self::file_name(report.round, None, "output"), &output).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UsageStats;

    #[test]
    fn file_names_are_zero_padded() {
        assert_eq!(JsonDumpSink::file_name(1, Some(3), "input"), "01-03-input.json");
        assert_eq!(JsonDumpSink::file_name(12, None, "output"), "12---output.json");
    }

    #[tokio::test]
    async fn batch_dump_writes_input_and_output() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonDumpSink::new(dir.path());
        let input = vec![NewsItem::from_text("a"), NewsItem::from_text("a")];
        let output = vec![NewsItem::from_text("a")];
        let report = BatchReport {
            round: 2,
            batch: 1,
            input_count: 2,
            output_count: 1,
            usage: UsageStats::default(),
            failed: false,
        };

        sink.on_batch(&report, &input, &output).await.unwrap();

        let written: Vec<NewsItem> = serde_json::from_slice(
            &std::fs::read(dir.path().join("02-01-output.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(written, output);
        assert!(dir.path().join("02-01-input.json").exists());
    }

    #[tokio::test]
    async fn round_dump_flattens_batches_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonDumpSink::new(dir.path());
        let input = vec![
            vec![NewsItem::from_text("a"), NewsItem::from_text("b")],
            vec![NewsItem::from_text("c")],
        ];
        let output = vec![vec![NewsItem::from_text("a")], vec![NewsItem::from_text("c")]];
        let report = RoundReport {
            round: 3,
            input_count: 3,
            output_count: 2,
            ratio: 2.0 / 3.0,
            batches: 2,
            failed_batches: 0,
            call_count: 2,
            usage: UsageStats::default(),
            elapsed: std::time::Duration::ZERO,
        };

        sink.on_round(&report, &input, &output).await.unwrap();

        let read = |name: &str| -> Vec<NewsItem> {
            serde_json::from_slice(&std::fs::read(dir.path().join(name)).unwrap()).unwrap()
        };
        assert_eq!(read("03---input.json"), input.concat());
        assert_eq!(read("03---output.json"), output.concat());
    }

    #[tokio::test]
    async fn missing_folder_surfaces_an_error() {
        let sink = JsonDumpSink::new("/definitely/not/a/real/folder");
        let report = BatchReport {
            round: 1,
            batch: 1,
            input_count: 0,
            output_count: 0,
            usage: UsageStats::default(),
            failed: false,
        };
        assert!(sink.on_batch(&report, &[], &[]).await.is_err());
    }
}
