use clap::Parser;
use logz_cli::commands::Cli;
use logz_cli::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    cli.handle().await
}
