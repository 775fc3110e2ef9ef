mod cli;

use anyhow::Result;
use clap::Parser;

use petition_monitor::{app, logging};

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = cli.resolve_config()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => app::run_server(config).await?,
        Command::Check => {
            let snapshot = app::check_once(&config).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Stats => {
            let stats = app::report_stats(&config).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
