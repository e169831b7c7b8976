//! CLI Entry Point for rt-workload
//!
//! Provides command-line interface for:
//! - Running the workload (video pipeline, watchdog, control task)
//! - Generating a raw RGB0 test video usable as a frame source
//!
//! # Usage
//!
//! Run against a raw video file, with the display mapped to a file:
//! ```bash
//! rt-workload run --source output_video.raw --display /tmp/display.gray
//! ```
//!
//! Run on the built-in test pattern, without CPU load:
//! ```bash
//! rt-workload run --pattern --no-load
//! ```
//!
//! Generate a 10 s test video at the configured geometry:
//! ```bash
//! rt-workload generate --output output_video.raw --frames 150
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rt_workload::config::{WorkloadConfig, DEFAULT_CONFIG_PATH};
use rt_workload::control::ConsolePanel;
use rt_workload::video::pattern::write_pattern_video;
use rt_workload::{logging, Workload, WorkloadReport};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rt-workload")]
#[command(about = "Synthetic real-time workload generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the video pipeline, the watchdog and the control task
    Run {
        /// Configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Raw RGB0 video file used as frame source
        #[arg(long, conflicts_with = "pattern")]
        source: Option<PathBuf>,

        /// Use the built-in test pattern as frame source
        #[arg(long)]
        pattern: bool,

        /// File mapped as display surface
        #[arg(long)]
        display: Option<PathBuf>,

        /// Never burn CPU, whatever the load switch says
        #[arg(long)]
        no_load: bool,
    },

    /// Write the test pattern as a raw RGB0 video file
    Generate {
        /// Output file
        #[arg(long)]
        output: PathBuf,

        /// Number of frames (defaults to video.pattern_frames)
        #[arg(long)]
        frames: Option<u64>,

        /// Configuration file (frame geometry)
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            source,
            pattern,
            display,
            no_load,
        } => {
            let mut config = WorkloadConfig::load_from(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            if let Some(source) = source {
                config.video.source = Some(source);
            }
            if pattern {
                config.video.source = None;
            }
            if display.is_some() {
                config.video.display = display;
            }
            if no_load {
                config.load.enabled = false;
            }
            config.validate()?;

            run_workload(config)
        }
        Commands::Generate {
            output,
            frames,
            config,
        } => {
            let config = WorkloadConfig::load_from(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            let geometry = config.video.geometry();
            let frames = frames.unwrap_or(config.video.pattern_frames);

            println!(
                "🎞️  Writing {} frames of {}x{} to {}",
                frames,
                geometry.width,
                geometry.height,
                output.display()
            );
            write_pattern_video(&output, geometry, frames)?;
            println!("✅ Done");
            Ok(())
        }
    }
}

fn run_workload(config: WorkloadConfig) -> Result<()> {
    logging::init_from_config(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.runtime.worker_threads)
        .thread_name("rt-workload-worker")
        .enable_all()
        .build()
        .context("building the async runtime")?;

    let report = runtime.block_on(async {
        let workload = Workload::new(config)?;
        let panel = ConsolePanel::spawn_stdin()?;

        println!("----------------------------------");
        for line in ConsolePanel::HELP {
            println!("{line}");
        }
        println!("----------------------------------");

        workload.run(Box::new(panel)).await
    })?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &WorkloadReport) {
    println!();
    println!("📊 Run summary");
    match report.producer {
        Some(producer) => println!(
            "   Frames produced: {} ({} source wraps)",
            producer.frames, producer.wraps
        ),
        None => println!("   Frames produced: acquisition failed"),
    }
    println!(
        "   Frames rendered: {} ({} signal timeouts)",
        report.consumer.rendered, report.consumer.timeouts
    );
    println!(
        "   Deadline misses: {}, recoveries: {}, final state: {}",
        report.watchdog.misses, report.watchdog.recoveries, report.watchdog.state
    );
    println!(
        "   Loaded periods: {} at {}% overload",
        report.control.loaded_periods, report.control.overload
    );
}
