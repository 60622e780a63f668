mod cli;
mod config;
mod controller;
mod device;
mod dmi;
mod duty;
mod ec;
mod errors;
mod fan;
mod hwmon;
mod registers;
mod shell;
#[cfg(test)]
mod test_utils;

use std::fs::File;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use signal_hook::consts::{SIGINT, SIGTERM};
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

use cli::{Cli, Commands};
use config::Config;
use device::FanDevice;

const STOP_POLL: Duration = Duration::from_millis(100);

fn level_from_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let log_path = config.log_path();
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    let log_level = level_from_verbosity(cli.verbose);
    if let Ok(file) = File::create(&log_path) {
        let _ = WriteLogger::init(log_level, log_config, file);
    }
    info!("gpd-fan started (log level: {})", log_level);

    match cli.command {
        Commands::Status { json } => cmd_status(&config, json),
        Commands::Monitor { interval, duty } => cmd_monitor(&config, interval, duty),
        Commands::Shell => cmd_shell(&config),
    }
}

/// Raise the returned flag on SIGINT or SIGTERM instead of exiting, so the
/// fan is handed back to firmware on the way out.
fn stop_on_signal() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))
            .with_context(|| format!("failed to register handler for signal {}", signal))?;
    }
    Ok(stop)
}

fn cmd_status(config: &Config, json: bool) -> Result<()> {
    let status = device::inspect(config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("{}", status);
    }
    Ok(())
}

fn cmd_monitor(config: &Config, interval: Option<u64>, duty: Option<u8>) -> Result<()> {
    let interval = Duration::from_secs(interval.unwrap_or(config.monitor_interval_secs));
    let stop = stop_on_signal()?;
    let device = FanDevice::attach(config)?;

    if let Some(duty) = duty {
        device.controller().set_duty(duty)?;
        device.controller().enter_manual()?;
    }

    while !stop.load(Ordering::Relaxed) {
        // Clear screen with ANSI escape
        print!("\x1B[2J\x1B[H");
        println!(
            "Fan Monitor (every {}s), Ctrl+C to stop and return to auto\n",
            interval.as_secs()
        );
        println!("{}", device.status()?);

        let deadline = Instant::now() + interval;
        while Instant::now() < deadline && !stop.load(Ordering::Relaxed) {
            thread::sleep(STOP_POLL);
        }
    }

    device.detach()?;
    println!("Fan returned to automatic control.");
    Ok(())
}

fn cmd_shell(config: &Config) -> Result<()> {
    let stop = stop_on_signal()?;
    let device = FanDevice::attach(config)?;
    eprintln!(
        "{}: type 'help' for commands, Ctrl+D to quit",
        device.system().description
    );

    let input = io::BufReader::new(io::stdin());
    shell::run(&device.hwmon(), input, io::stdout().lock(), &stop)?;

    device.detach()?;
    Ok(())
}
