use clap::Parser;
use linedesk_core::console::{app, cli::Cli, error::CliError};
use linedesk_core::telemetry::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = logging::init(&cli.logging.to_config()) {
        let err = CliError::Logging(err.to_string());
        eprintln!("❌ {err}");
        std::process::exit(1);
    }

    if let Err(err) = app::run(cli).await {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
