use anyhow::Result;
use clap::Parser;
use campaign_ingest::cli::import::{self, ImportArgs};
use campaign_ingest::normalization::EntityKind;
use campaign_ingest::util::env;

#[derive(Parser, Debug)]
#[command(name = "import_subject_lines", about = "Import an email subject line CSV export into subject_lines")]
struct Cli {
    #[command(flatten)]
    args: ImportArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    env::bootstrap_cli("import_subject_lines")?;
    import::run(EntityKind::SubjectLine, cli.args).await?;
    Ok(())
}
