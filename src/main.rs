//! `pco_transfer`: pull recorded frames out of a camera memory segment.
//!
//! ```text
//! pco_transfer full out.tif                  # every frame to out.tif, out_1.tif, ...
//! pco_transfer -s 100 full -n 500 out.tif    # frames 101..=600
//! pco_transfer mip -i 10 mip.tif             # one projection per 10 frames
//! pco_transfer speedtest -n 5                # time five transfers
//! pco_transfer show-config
//! ```
//!
//! The camera is the simulated recorder configured under `[simulation]`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use pco_driver::{PixelPattern, SimSegment, SimulatedCamera, TransferError};
use pco_transfer::{logging, SegmentTransfer, Settings};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "pco_transfer",
    version,
    about = "Transfer recorded frames from camera memory segments to TIFF stacks."
)]
struct Cli {
    /// Configuration file (defaults to config/pco_transfer.toml when present)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Camera memory segment to read, overriding the configuration
    #[arg(long, value_name = "N", global = true)]
    segment: Option<u16>,

    /// Frames to skip at the start of the segment
    #[arg(short = 's', long, value_name = "N", default_value_t = 0, global = true)]
    skip_images: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream frames to a TIFF stack, rolling over to numbered files as needed
    Full {
        /// Frames to transfer at most (default: all)
        #[arg(short = 'n', long, value_name = "N")]
        num_images: Option<usize>,

        /// Output TIFF path
        output: PathBuf,
    },
    /// Write maximum-intensity projections of consecutive frames to a TIFF stack
    Mip {
        /// Frames folded into each projection
        #[arg(short = 'i', long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
        images_per_mip: u64,

        /// Projections to produce at most (default: all complete windows)
        #[arg(short = 'm', long, value_name = "N")]
        num_mips: Option<usize>,

        /// Output TIFF path
        output: PathBuf,
    },
    /// Time repeated transfers into a consumer that discards every frame
    Speedtest {
        /// Number of transfers to run
        #[arg(short = 'n', long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
        num_transfers: u64,

        /// Frames per transfer at most (default: all)
        #[arg(short = 'i', long, value_name = "N")]
        num_images: Option<usize>,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("load configuration")?;
    if let Some(segment) = cli.segment {
        settings.segment = segment;
        settings.validate().context("apply --segment")?;
    }

    if let Command::ShowConfig = cli.command {
        print!("{}", settings.to_toml()?);
        return Ok(());
    }

    logging::init(&settings.log_level).context("initialize logging")?;

    let camera = simulated_camera(&settings);
    let transfer = SegmentTransfer::new(&camera, settings.segment_id()?)
        .with_progress_interval(settings.progress_interval)
        .with_container_limits(settings.container);
    let skip = cli.skip_images;

    match cli.command {
        Command::Full { num_images, output } => {
            let outcome = transfer
                .transfer_to_container(skip, num_images, &output)
                .with_context(|| format!("transfer to {}", output.display()))?;
            println!("Transferred {} images", outcome.frames);
            for file in &outcome.files.files {
                println!("  {} ({} images)", file.path.display(), file.frames);
            }
        }
        Command::Mip {
            images_per_mip,
            num_mips,
            output,
        } => {
            let images_per_mip =
                usize::try_from(images_per_mip).context("images per MIP out of range")?;
            let outcome = transfer
                .transfer_mip_to_container(skip, images_per_mip, num_mips, &output)
                .with_context(|| format!("MIP transfer to {}", output.display()))?;
            println!("Wrote {} MIPs", outcome.summary.windows);
            if outcome.summary.lost_frames > 0 {
                println!(
                    "{} images did not fill a complete MIP and were discarded",
                    outcome.summary.lost_frames
                );
            }
            for file in &outcome.files.files {
                println!("  {} ({} MIPs)", file.path.display(), file.frames);
            }
        }
        Command::Speedtest {
            num_transfers,
            num_images,
        } => {
            for run in 1..=num_transfers {
                let started = Instant::now();
                let frames = transfer
                    .engine()
                    .transfer_with(skip, num_images, |_, _| Ok::<(), TransferError>(()))
                    .with_context(|| format!("speedtest transfer {run}"))?;
                let elapsed = started.elapsed();
                let bytes = settings.simulation.geometry().frame_bytes() * frames as u64;
                let seconds = elapsed.as_secs_f64();
                let mb_per_sec = if seconds > 0.0 {
                    bytes as f64 / seconds / 1e6
                } else {
                    0.0
                };
                println!(
                    "Transfer {run}: {frames} images in {} ms ({mb_per_sec:.1} MB/s)",
                    elapsed.as_millis()
                );
            }
        }
        Command::ShowConfig => {}
    }

    info!("Done");
    Ok(())
}

fn simulated_camera(settings: &Settings) -> SimulatedCamera {
    let sim = settings.simulation;
    let segment = SimSegment::new(sim.valid_frames, sim.geometry())
        .with_max_frames(sim.max_frames)
        .with_pattern(PixelPattern::Ramp);
    SimulatedCamera::new().with_segment(settings.segment, segment)
}
