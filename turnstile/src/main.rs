use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use args::Args;
use clap::Parser;
use config::Config;
use server::ServeConfig;
use tokio_util::sync::CancellationToken;

mod args;
mod logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init(&args);

    let config = args.config()?;

    if args.check_config {
        return check_config(&args, &config);
    }

    let shutdown = CancellationToken::new();

    tokio::spawn(cancel_on_ctrl_c(shutdown.clone()));

    if let Err(e) = server::serve(serve_config(&args, config, shutdown)).await {
        log::error!("Server failed to start: {e}");
        std::process::exit(1);
    }

    log::info!("Server stopped");

    Ok(())
}

/// Reports on a configuration that loaded. Load has already rejected the invalid ones.
fn check_config(args: &Args, config: &Config) -> anyhow::Result<()> {
    let warnings = config.validate()?;
    let admission = if config.admission.enabled { "enabled" } else { "disabled" };

    if warnings.is_empty() {
        log::info!("Configuration at {} is valid, admission is {admission}", args.config.display());
    } else {
        log::warn!(
            "Configuration at {} is valid with {} warning(s), admission is {admission}",
            args.config.display(),
            warnings.len()
        );
    }

    Ok(())
}

fn serve_config(args: &Args, config: Config, shutdown: CancellationToken) -> ServeConfig {
    let listen_address = args
        .listen_address
        .or(config.server.listen_address)
        .unwrap_or(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 8000)));

    ServeConfig {
        listen_address,
        config,
        shutdown,
    }
}

async fn cancel_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            log::info!("Shutting down");
            shutdown.cancel();
        }
        Err(e) => log::error!("Failed to listen for the shutdown signal: {e}"),
    }
}
