use std::path::PathBuf;

use clap::{Parser, Subcommand};

use heliostat::config::Config;
use heliostat::{driver, server, Error};

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = "Observe a solar plant through its local gateway", long_about = None)]
struct Args {
    /// Path to a JSON config file; defaults apply for anything not named there.
    #[clap(long, env = "HELIOSTAT_CONFIG")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    /// Sample the plant and record its decimated history (the default).
    Observe,
    /// Probe a running instance's live view and exit non-zero when it is down.
    Health,
}

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,heliostat=info");
    }
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "fatal");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> heliostat::Result<()> {
    let config = Config::load(args.config.as_deref())?;

    match args.command.unwrap_or(Command::Observe) {
        Command::Observe => {
            tokio::select! {
                res = driver::run(config) => res,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    Ok(())
                }
            }
        }
        Command::Health => {
            if server::is_healthy(&config.ui.host, config.ui.port).await {
                Ok(())
            } else {
                Err(Error::ServerUnhealthy)
            }
        }
    }
}
