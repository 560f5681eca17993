use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;

use super::{config_backend, open_service};
use crate::core::config::WindowMode;

pub fn execute(matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", sub_matches)) => show(sub_matches),
        Some(("path", sub_matches)) => path(sub_matches),
        Some(("opacity", sub_matches)) => set_opacity(sub_matches),
        Some(("window-mode", sub_matches)) => set_window_mode(sub_matches),
        _ => {
            println!("Use 'glancehud config --help' for more information.");
            Ok(())
        }
    }
}

fn show(matches: &ArgMatches) -> Result<()> {
    let service = open_service(matches)?;
    let config = service.get_config()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn path(matches: &ArgMatches) -> Result<()> {
    let backend = config_backend(matches)?;
    println!("{}", backend.path().display().to_string().cyan().bold());
    Ok(())
}

fn set_opacity(matches: &ArgMatches) -> Result<()> {
    let value = *matches
        .get_one::<f64>("value")
        .context("Opacity value is required")?;

    let service = open_service(matches)?;
    service
        .update_opacity(value)
        .with_context(|| format!("Failed to set opacity to {}", value))?;

    println!("{} {}", "✓ Opacity set to".green(), value);
    Ok(())
}

fn set_window_mode(matches: &ArgMatches) -> Result<()> {
    let raw = matches
        .get_one::<String>("mode")
        .context("Window mode is required")?;
    let mode: WindowMode = raw.parse()?;

    let service = open_service(matches)?;
    service.set_window_mode(mode)?;

    println!("{} {}", "✓ Window mode set to".green(), raw);
    Ok(())
}
