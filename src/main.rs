use std::path::PathBuf;

use anyhow::Result;
use clap::{Arg, ArgAction, Command};

use glancehud::commands;

fn main() -> Result<()> {
    glancehud::init_logging();

    let matches = Command::new("glancehud")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Glance HUD: live system metrics and sidecar widgets")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Config file to use instead of the per-user default")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Poll the enabled modules and print the HUD")
                .arg(
                    Arg::new("duration")
                        .short('d')
                        .long("duration")
                        .value_name("SECS")
                        .help("Stop after this many seconds")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print one stats document per second instead of the HUD")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("modules")
                .about("List known modules")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Inspect or change the HUD configuration")
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(Command::new("show").about("Print the current configuration"))
                .subcommand(Command::new("path").about("Print the config file location"))
                .subcommand(
                    Command::new("opacity")
                        .about("Set window opacity (0.1 - 1.0)")
                        .arg(
                            Arg::new("value")
                                .required(true)
                                .index(1)
                                .value_parser(clap::value_parser!(f64)),
                        ),
                )
                .subcommand(
                    Command::new("window-mode")
                        .about("Set window mode")
                        .arg(
                            Arg::new("mode")
                                .required(true)
                                .index(1)
                                .value_parser(["normal", "locked"]),
                        ),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("run", sub_matches)) => commands::run::execute(sub_matches)?,
        Some(("modules", sub_matches)) => commands::modules::execute(sub_matches)?,
        Some(("config", sub_matches)) => commands::config::execute(sub_matches)?,
        _ => {
            println!("Welcome to glancehud!");
            println!("Use 'glancehud --help' for more information.");
        }
    }

    Ok(())
}
