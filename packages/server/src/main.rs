#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Entry point for the hazard watch API server.

use std::path::PathBuf;

use clap::Parser;
use hazard_watch_engine::EngineConfig;

/// Hazard detection and alert dispatch engine.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::load(path).expect("Failed to load config"),
        None => EngineConfig::default(),
    };

    hazard_watch_server::run_server(config).await
}
