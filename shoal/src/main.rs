use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use shoal_core::{dispatcher, listener::ListenerBuilder};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

use crate::config::Config;

mod config;
mod factory;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path of the config file; defaults serve ./public on port 8080
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let listener = ListenerBuilder::from_port_str(&config.listen, config.runtime.backlog)?
        .build()
        .with_context(|| format!("binding port {}", config.listen))?;
    tracing::info!(
        listen = %config.listen,
        workers = config.runtime.workers,
        ready_policy = ?config.runtime.ready_policy,
        root = %config.server.root.display(),
        "starting shoal"
    );

    let mut pool = factory::spawn_pool(&config).context("spawning workers")?;
    dispatcher::run(listener, &mut pool).context("dispatcher failed")?;
    Ok(())
}
