//! Command routing

use anyhow::Context;
use std::path::Path;
use walkcap_core::CaptureConfig;
use walkcap_core::config::{default_config_path, load_from_file};

use crate::args::{Cli, Commands, ConfigAction};
use crate::{commands, logging};

/// Load configuration, initialize logging and dispatch
pub async fn route(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    // `config init` must work even when the existing file is broken
    if let Commands::Config {
        action: ConfigAction::Init { force },
    } = &cli.command
    {
        logging::init(&Default::default(), cli.verbose);
        return commands::config::init(&config_path, *force);
    }

    let config = load_config(&config_path)?;
    logging::init(&config.logging, cli.verbose);
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    match cli.command {
        Commands::Record(args) => commands::record::execute(&config, args).await,
        Commands::Upload {
            bundle,
            ids,
            no_wait,
        } => commands::upload::execute(&config, &bundle, &ids, !no_wait).await,
        Commands::Queue { action } => commands::queue::execute(&config, action).await,
        Commands::Recover { upload } => commands::recover::execute(&config, upload).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&config_path, &config),
            ConfigAction::Init { force } => commands::config::init(&config_path, force),
        },
    }
}

fn load_config(path: &Path) -> anyhow::Result<CaptureConfig> {
    load_from_file(path).with_context(|| format!("loading configuration from {}", path.display()))
}
