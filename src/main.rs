mod app;
mod cli;
mod install;
mod model;
mod net;
mod platform;
mod prereq;
mod release;
mod schedule;
mod scope;
mod settings;
#[cfg(test)]
mod testing;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use app::App;
use cli::Cli;
use model::config::AgentConfig;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = AgentConfig::load(cli.config.as_deref())?;

    // Initialize logging to file (never stdout)
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "winget-warden.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();

    tracing::info!("winget-warden starting");

    let mut app = App::new(config, cli.json)?;
    let result = app.dispatch(cli.command);

    match &result {
        Ok(code) => tracing::info!("winget-warden finished ({code:?})"),
        Err(e) => tracing::error!("winget-warden error: {e:?}"),
    }
    result
}
