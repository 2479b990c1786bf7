mod app_context;

use std::process;

use clap::Parser;
use tokio::runtime::Runtime;
use waygate_config::{cli::Cli, cli::BANNER, loader::load_settings};

use crate::app_context::AppContext;

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt().with_thread_ids(true).init();
    println!("{BANNER}");

    let cli = Cli::parse();
    let settings = load_settings(&cli).map_err(|e| miette::miette!(e))?;
    tracing::debug!(?settings, "engine settings loaded");

    let rt = Runtime::new().expect("failed to build Tokio runtime");

    let ctx = AppContext::bootstrap(&settings);
    let file_manager = ctx.ready();

    tracing::info!("gateway filter engine running (PID: {})", process::id());

    rt.block_on(async move {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
        tracing::info!("shutting down");
        file_manager.shutdown().await;
    });

    Ok(())
}
