use anyhow::Result;
use clap::ArgMatches;
use colored::Colorize;

use super::open_service;

/// List every known module with its template and state.
pub fn execute(matches: &ArgMatches) -> Result<()> {
    let service = open_service(matches)?;
    let modules = service.get_modules()?;

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&modules)?);
        return Ok(());
    }

    println!("{}", "MODULES".bold().bright_cyan());
    println!("{}", "=".repeat(48));
    for module in &modules {
        let state = if module.enabled {
            "enabled".green()
        } else {
            "disabled".dimmed()
        };
        let kind = if module.is_sidecar { "sidecar" } else { "built-in" };
        println!(
            "{:<10} {:<12} {:<10} {}",
            module.module_id.bold(),
            module.config.template.as_str(),
            kind,
            state
        );
    }

    Ok(())
}
