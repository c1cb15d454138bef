use anyhow::Result;
use clap::Parser;
use campaign_ingest::cli::import::{self, ImportArgs};
use campaign_ingest::normalization::EntityKind;
use campaign_ingest::util::env;

#[derive(Parser, Debug)]
#[command(name = "import_campaigns", about = "Import a marketing campaign CSV export into marketing_campaigns")]
struct Cli {
    #[command(flatten)]
    args: ImportArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env::bootstrap_cli("import_campaigns")?;
    import::run(EntityKind::Campaign, cli.args).await?;
    Ok(())
}
