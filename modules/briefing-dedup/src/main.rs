use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use briefing_dedup::{
    DedupConfig, DedupEngine, DedupOracle, InputRecord, JsonDumpSink, LlmOracle, NewsItem,
    NoopSink, PassthroughOracle, ProgressSink, UsageStats,
};

#[derive(Parser)]
#[command(name = "dedup", about = "Deduplicate collected news items over multiple LLM rounds")]
struct Cli {
    /// JSON file: an array of records or a collected-news document
    #[arg(long)]
    input: PathBuf,

    /// Where to write the result (stdout when omitted)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Skip the LLM and pass every batch through unchanged
    #[arg(long)]
    passthrough: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectedNews {
    date: Option<String>,
    news_items: Vec<InputRecord>,
    number_of_posts: Option<usize>,
    number_of_sources: Option<usize>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InputDocument {
    Records(Vec<InputRecord>),
    Collected(CollectedNews),
}

impl InputDocument {
    fn into_collected(self) -> CollectedNews {
        match self {
            Self::Records(news_items) => CollectedNews {
                date: None,
                news_items,
                number_of_posts: None,
                number_of_sources: None,
            },
            Self::Collected(collected) => collected,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeduplicatedNews {
    items: Vec<NewsItem>,
    number_of_posts: usize,
    number_of_sources: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    usage: UsageStats,
    deduplicated_at: DateTime<Utc>,
}

fn distinct_sources(items: &[NewsItem]) -> usize {
    items
        .iter()
        .flat_map(|item| item.sources.iter())
        .collect::<HashSet<_>>()
        .len()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter =
        EnvFilter::from_default_env().add_directive("briefing_dedup=info".parse()?);
    // stdout carries the result document.
    let logs = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.json {
        logs.json().init();
    } else {
        logs.init();
    }

    let raw = tokio::fs::read_to_string(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let collected = serde_json::from_str::<InputDocument>(&raw)
        .with_context(|| format!("Failed to parse {}", cli.input.display()))?
        .into_collected();

    let items: Vec<NewsItem> = collected.news_items.into_iter().map(NewsItem::from).collect();
    let number_of_posts = collected.number_of_posts.unwrap_or(items.len());
    let number_of_sources = collected
        .number_of_sources
        .unwrap_or_else(|| distinct_sources(&items));
    info!(
        items = items.len(),
        date = collected.date.as_deref().unwrap_or("-"),
        "Loaded news items"
    );

    let oracle: Arc<dyn DedupOracle> = if cli.passthrough {
        info!("Passthrough mode, no LLM calls will be made");
        Arc::new(PassthroughOracle)
    } else {
        let oracle = LlmOracle::from_env()?;
        info!(providers = %oracle.providers(), "LLM oracle ready");
        Arc::new(oracle)
    };

    let progress: Arc<dyn ProgressSink> = match JsonDumpSink::from_env() {
        Some(sink) => {
            info!(folder = %sink.folder().display(), "Writing batch dumps");
            Arc::new(sink)
        }
        None => Arc::new(NoopSink),
    };

    let engine = DedupEngine::new(oracle, DedupConfig::from_env()?).with_progress(progress);
    let outcome = engine.deduplicate_or_passthrough(items).await;
    info!("Dedup complete. {outcome}");

    let result = DeduplicatedNews {
        items: outcome.items,
        number_of_posts,
        number_of_sources,
        date: collected.date,
        usage: outcome.usage,
        deduplicated_at: Utc::now(),
    };
    let body = serde_json::to_string_pretty(&result)?;

    match &cli.output {
        Some(path) => {
            tokio::fs::write(path, body)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), items = result.items.len(), "Wrote deduplicated news");
        }
        None => println!("{body}"),
    }

    Ok(())
}
