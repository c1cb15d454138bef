use anyhow::Result;
use clap::Parser;
use campaign_ingest::cli::import::{self, ImportArgs};
use campaign_ingest::normalization::EntityKind;
use campaign_ingest::util::env;

#[derive(Parser, Debug)]
#[command(name = "import_spend_summary", about = "Import the periodic spend summary CSV into spend_summary")]
struct Cli {
    #[command(flatten)]
    args: ImportArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env::bootstrap_cli("import_spend_summary")?;
    import::run(EntityKind::SpendSummary, cli.args).await?;
    Ok(())
}
