use anyhow::Result;
use tracing::info;

use crate::config::{BackfillConfig, DatabaseConfig, EmbedderConfig};
use crate::database_ops::embedder::OpenAiEmbedder;
use crate::database_ops::embeddings::{run_backfill, BackfillReport};
use crate::database_ops::PgStore;
use crate::util::env as env_util;

#[derive(Debug, Clone, clap::Args)]
pub struct BackfillArgs {
    /// Records per batch (overrides EMBED_BATCH_SIZE).
    #[arg(long)]
    pub batch_size: Option<usize>,
}

pub async fn run(args: BackfillArgs) -> Result<BackfillReport> {
    env_util::preflight_check(
        "generate_embeddings",
        &["OPENAI_API_KEY"],
        &[
            "SUPABASE_DB_URL",
            "DATABASE_URL",
            "OPENAI_API_KEY",
            "OPENAI_BASE_URL",
            "EMBED_MODEL",
            "EMBED_BATCH_SIZE",
            "EMBED_CONCURRENCY",
            "EMBED_BATCH_DELAY_MS",
        ],
    )?;
    let embedder = OpenAiEmbedder::new(&EmbedderConfig::from_env()?)?;
    let backfill = BackfillConfig::from_env(args.batch_size);
    let db = DatabaseConfig::from_env()?;
    let store = PgStore::connect(&db.url, db.max_connections).await?;

    info!(
        batch_size = backfill.batch_size,
        concurrency = backfill.concurrency,
        delay_ms = backfill.delay.as_millis() as u64,
        "starting embedding backfill"
    );
    let report = run_backfill(&store, &embedder, &backfill).await?;
    println!("{report}");
    Ok(report)
}
