use anyhow::Result;
use clap::Parser;
use campaign_ingest::cli::embeddings::{self, BackfillArgs};
use campaign_ingest::util::env;

#[derive(Parser, Debug)]
#[command(
    name = "generate_embeddings",
    about = "Compute embeddings for subject lines that do not have one yet"
)]
struct Cli {
    #[command(flatten)]
    args: BackfillArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env::bootstrap_cli("generate_embeddings")?;
    embeddings::run(cli.args).await?;
    Ok(())
}
