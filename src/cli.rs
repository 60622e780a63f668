use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gpd-fan")]
#[command(about = "Fan control for the GPD Win 4 (7840U/8840U) embedded controller")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (default: /etc/gpd-fan/config.json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show fan speed and the raw EC fan registers without taking control
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Take control of the fan and print its state until interrupted
    Monitor {
        /// Refresh interval in seconds (overrides the config file)
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,

        /// Switch to manual mode at this duty cycle (0 = slowest, 255 = full speed)
        #[arg(short, long, value_parser = clap::value_parser!(u8))]
        duty: Option<u8>,
    },

    /// Read and write the fan1_input, pwm1_enable and pwm1 attributes from stdin
    Shell,
}
