// Command handlers module
pub mod config;
pub mod modules;
pub mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ArgMatches;

use crate::core::config::JsonFileBackend;
use crate::core::service::HudService;

/// Config file from `--config`, or the per-user default location.
///
/// `--config` is global, so the innermost subcommand's matches carry it.
pub fn config_backend(matches: &ArgMatches) -> Result<JsonFileBackend> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => Ok(JsonFileBackend::new(path.clone())),
        None => JsonFileBackend::at_default_location()
            .context("Could not determine the config directory"),
    }
}

/// Service over the built-in sources, backed by the chosen config file.
pub fn open_service(matches: &ArgMatches) -> Result<HudService> {
    Ok(HudService::with_builtins(config_backend(matches)?))
}
