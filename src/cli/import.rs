use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use crate::config::{DatabaseConfig, IngestConfig};
use crate::database_ops::csv_import::{run_import, ImportSummary};
use crate::database_ops::PgStore;
use crate::normalization::entities::descriptor_for;
use crate::normalization::EntityKind;
use crate::util::env as env_util;

/// Arguments shared by the three CSV importers.
#[derive(Debug, Clone, clap::Args)]
pub struct ImportArgs {
    /// CSV export to import.
    pub path: PathBuf,
    /// Rows per upsert statement (overrides INGEST_BATCH_SIZE).
    #[arg(long)]
    pub batch_size: Option<usize>,
}

pub async fn run(kind: EntityKind, args: ImportArgs) -> Result<ImportSummary> {
    env_util::preflight_check(
        kind.label(),
        &[],
        &[
            "SUPABASE_DB_URL",
            "DATABASE_URL",
            "DB_MAX_CONNS",
            "INGEST_BATCH_SIZE",
            "INGEST_REJECT_AMBIGUOUS_DATES",
        ],
    )?;
    let ingest = IngestConfig::from_env(args.batch_size);
    let descriptor = descriptor_for(kind);
    // Input problems are reported before touching the database.
    if !args.path.is_file() {
        return Err(crate::error::IngestError::InputNotFound(args.path).into());
    }
    let db = DatabaseConfig::from_env()?;
    let store = PgStore::connect(&db.url, db.max_connections).await?;

    info!(path = %args.path.display(), batch_size = ingest.batch_size, "importing");
    let summary = run_import(&store, &descriptor, &args.path, &ingest).await?;
    println!("{summary}");
    Ok(summary)
}
