//! Configuration sourced from the CLI.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
pub struct Cli {
    /// Path to the settings file (TOML). Missing file falls back to defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the PRE filter directory
    #[arg(long)]
    pub pre_dir: Option<PathBuf>,

    /// Override the ROUTE filter directory
    #[arg(long)]
    pub route_dir: Option<PathBuf>,

    /// Override the POST filter directory
    #[arg(long)]
    pub post_dir: Option<PathBuf>,

    /// Override the directory polling interval, e.g. "5s", "500ms"
    #[arg(long)]
    pub poll_interval: Option<String>,
}

pub const BANNER: &str = r#"
 __      __               __          __
/  \    /  \ _____  ___.__./  |   ____/  |_  ____
\   \/\/   //  _  \<   |  |\   __\/ __ \   __\/ __ \
 \        /(  <_> )\___  | |  | \  ___/|  | \  ___/
  \__/\  /  \____/ / ____| |__|  \___  >__|  \___  >
       \/          \/                \/          \/
        gateway filter engine -- watching your scripts
"#;

/// Merge the CLI's Option<T> overrides onto a base settings value built
/// from the config file (or defaults).
pub fn apply_cli(settings: &mut crate::settings::EngineSettings, cli: &Cli) {
    if let Some(dir) = &cli.pre_dir {
        settings.directories.pre = dir.clone();
    }
    if let Some(dir) = &cli.route_dir {
        settings.directories.route = dir.clone();
    }
    if let Some(dir) = &cli.post_dir {
        settings.directories.post = dir.clone();
    }
    if let Some(raw) = &cli.poll_interval {
        if let Ok(interval) = humantime::parse_duration(raw) {
            settings.poll_interval = interval;
        } else {
            tracing::warn!("ignoring unparsable --poll-interval {raw:?}");
        }
    }
}
