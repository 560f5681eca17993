//! `glancehud run`: poll every enabled module and print the HUD.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::ArgMatches;
use colored::Colorize;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::open_service;
use crate::core::service::HudService;
use crate::ui::{format_clock, format_widget, resolve_placed};

const FRAME_INTERVAL: Duration = Duration::from_secs(1);

pub fn execute(matches: &ArgMatches) -> Result<()> {
    let duration = matches.get_one::<u64>("duration").copied();
    let json = matches.get_flag("json");

    let service = open_service(matches)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .thread_name("hud-worker")
        .build()
        .context("Failed to build the tokio runtime")?;

    let (stop_tx, stop_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(true);
    })
    .context("Failed to install the Ctrl-C handler")?;

    runtime.block_on(run_loop(&service, duration, json, stop_rx))?;
    service.stop();
    Ok(())
}

async fn run_loop(
    service: &HudService,
    duration: Option<u64>,
    json: bool,
    mut stop_rx: watch::Receiver<bool>,
) -> Result<()> {
    service.start().context("Failed to start the collector")?;
    log::info!("HUD running");

    let deadline = duration.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));

    let mut ticker = interval(FRAME_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if json {
                    println!("{}", serde_json::to_string(&service.get_stats(None))?);
                } else {
                    print_frame(service)?;
                }
                if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                    break;
                }
            }
            _ = stop_rx.changed() => {
                break;
            }
        }
    }

    service.stop();
    log::info!("HUD stopped");
    Ok(())
}

fn print_frame(service: &HudService) -> Result<()> {
    let widgets = resolve_placed(service)?;

    // Clear screen and move the cursor home.
    print!("\x1B[2J\x1B[H");
    println!(
        "{} {}",
        "GLANCEHUD".bold().bright_cyan(),
        format_clock(Local::now()).dimmed()
    );
    println!("{}", "=".repeat(48));
    for widget in &widgets {
        for line in format_widget(widget) {
            println!("{}", line);
        }
    }
    println!("{}", "Ctrl-C to quit".dimmed());
    Ok(())
}
