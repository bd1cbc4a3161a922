//! keyward web server
//!
//! Serves the authentication and role management API backed by the demo
//! in-memory user table.

use anyhow::Context;
use clap::Parser;
use keyward_core::{init_logging, Settings};
use keyward_web::{
    demo::{DemoUser, DemoUserLoader},
    KeywardServerBuilder,
};
use std::{path::PathBuf, sync::Arc};
use tracing::info;

/// keyward - token authentication and role-based access control over HTTP
#[derive(Parser)]
#[command(name = "keyward-web")]
#[command(version)]
struct Args {
    /// TOML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Server port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load environment variables before settings read them
    dotenvy::dotenv().ok();

    let mut settings =
        Settings::load(args.config.as_deref()).context("failed to load settings")?;
    if let Some(level) = args.log_level {
        settings.logging.level = level;
    }
    init_logging(&settings.logging).map_err(|e| anyhow::anyhow!(e))?;

    let mut builder = KeywardServerBuilder::new().settings(settings);
    if let Some(host) = args.host {
        builder = builder.host(host);
    }
    if let Some(port) = args.port {
        builder = builder.port(port);
    }

    let loader = DemoUserLoader::from_env().context("failed to prepare demo users")?;
    let server = builder
        .build::<DemoUser>(Arc::new(loader))
        .await
        .context("failed to build server")?;

    info!(address = %server.address(), "Starting keyward");
    server.start().await?;
    Ok(())
}
