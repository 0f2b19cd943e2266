use std::error::Error;

use reel_harvester::app::App;
use reel_harvester::cli::CliArgs;
use reel_harvester::config::AppConfig;
use reel_harvester::models::{RunId, Terminal};
use reel_harvester::settings::Settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Parse CLI arguments
    let cli_args = CliArgs::parse_args();

    // Validate CLI arguments
    cli_args.validate()?;

    tracing_subscriber::fmt()
        .with_max_level(cli_args.tracing_level())
        .init();

    tracing::info!("Starting reel harvester");

    // Load configuration with CLI overrides
    let config = AppConfig::load_with_cli_args(&cli_args)?;

    if cli_args.save_settings {
        Settings::from_config(&config).save(&cli_args.settings)?;
    }

    let outcome = App::new_with_config(config).run(RunId::now()).await?;

    match &outcome.state {
        Terminal::Success => tracing::info!("Run {} completed successfully", outcome.run_id),
        Terminal::Cancelled => tracing::info!("Run {} stopped by request", outcome.run_id),
        Terminal::Failure(reason) => {
            tracing::error!("Run {} failed: {}", outcome.run_id, reason);
            return Err(reason.to_string().into());
        }
    }

    Ok(())
}
