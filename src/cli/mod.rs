use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::schedule::{parse_date, parse_hours, parse_start_time};

pub mod prompt;

#[derive(Parser)]
#[command(
    name = "segment-extractor",
    about = "Segment Extractor - Download timed audio segments and clean them up with ffmpeg",
    version,
    long_about = "Downloads a day's 30-minute audio segments and runs each one through ffmpeg (band-pass, noise reduction, silence removal, normalization) while the remaining downloads continue."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./config.yaml or the user config directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download and process a period of segments (prompts for anything not given)
    Extract {
        /// Date to extract (YYMMDD)
        #[arg(short, long, value_name = "YYMMDD", value_parser = parse_date)]
        date: Option<NaiveDate>,

        /// Start time in UTC (HHMM, minute must be 00 or 30)
        #[arg(short, long, value_name = "HHMM", value_parser = parse_start_time)]
        start_time: Option<NaiveTime>,

        /// How many hours forward (1-24)
        #[arg(long, value_name = "HOURS", value_parser = parse_hours)]
        hours: Option<u32>,

        /// URL prefix that segment names are appended to
        #[arg(long, env = "BASE_URL", value_name = "URL")]
        base_url: Option<String>,

        /// Output directory (overrides the config file)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Delete raw downloads from the output directory
    Cleanup {
        /// Output directory (overrides the config file)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },

    /// Show or locate the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}
