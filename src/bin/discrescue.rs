//! CLI tool for imaging damaged optical discs.
//!
//! This tool uses the `discrescue` library to copy a disc into a raw image
//! file, zero-filling sectors that cannot be read.

use clap::Parser;
use discrescue::{
    extract, BarRenderer, Error, GridRenderer, OpticalDrive, Options, ProgressSink, SizeEstimator,
    State, Termination,
};
use indicatif::HumanBytes;
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Image an optical disc into a raw file, surviving read errors.
///
/// Unreadable sectors are retried with smaller reads and finally replaced
/// by zeros. When the disc size cannot be determined, a long trailing run
/// of zeros or a stalled copy ends the run.
#[derive(Parser, Debug)]
#[command(name = "discrescue")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optical drive device, e.g. /dev/sr0
    device: PathBuf,

    /// Output image path
    output: PathBuf,

    /// Columns of the progress grid
    #[arg(long, default_value = "50")]
    cols: usize,

    /// Rows of the progress grid
    #[arg(long, default_value = "20")]
    rows: usize,

    /// Trailing zero run (MB) that ends a run without a reliable size
    #[arg(long, default_value = "512")]
    zero_tail_mb: u64,

    /// Minutes without the image growing before the run is cut
    #[arg(long, default_value = "5")]
    no_progress_min: u64,

    /// MB that must be copied before the no-progress cut is armed
    #[arg(long, default_value = "500")]
    no_progress_armed_mb: u64,

    /// Do not re-run through sudo when not root
    #[arg(long)]
    no_escalate: bool,

    /// Enable verbose logging (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn options(&self) -> Options {
        Options::new()
            .with_zero_tail_bytes(self.zero_tail_mb * MIB)
            .with_no_progress_timeout(Duration::from_secs(self.no_progress_min * 60))
            .with_no_progress_armed_bytes(self.no_progress_armed_mb * MIB)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_permission_denied() => {
            eprintln!("Error: {}", e);
            eprintln!("Run as root and close other programs using the drive.");
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> discrescue::Result<()> {
    if !args.no_escalate {
        sudo::escalate_if_needed().map_err(|e| Error::PermissionDenied {
            source: std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("failed to escalate privileges: {}", e),
            ),
        })?;
    }

    let mut drive = OpticalDrive::open(&args.device)?;
    let estimate = SizeEstimator::new().estimate(&mut drive);
    match &estimate {
        Some(e) => eprintln!("Estimated size: {} ({})", HumanBytes(e.total()), e.method()),
        None => eprintln!(
            "No credible total size: using the bar, zero-tail detection and no-progress cut."
        ),
    }

    let mut image = File::create(&args.output).map_err(|source| Error::Create {
        path: args.output.clone(),
        source,
    })?;

    let mut sink: Box<dyn ProgressSink> = if estimate.is_some() {
        Box::new(GridRenderer::new(args.cols, args.rows))
    } else {
        Box::new(BarRenderer::new())
    };

    let state = extract(
        &mut drive,
        &mut image,
        estimate.as_ref(),
        &args.options(),
        sink.as_mut(),
    )?;
    print_report(&state);
    Ok(())
}

fn print_report(state: &State) {
    let elapsed = state.started_at.elapsed().as_secs_f64();
    let speed = state.bytes_written as f64 / elapsed.max(1.0);
    eprintln!();
    eprintln!(
        "Done: {} in {:.1}s (~{}/s)",
        HumanBytes(state.bytes_written),
        elapsed,
        HumanBytes(speed as u64)
    );

    match state.termination {
        Some(Termination::NoProgress) => eprintln!(
            "Reason: the image did not grow during the configured window; \
             there is probably no more useful data."
        ),
        Some(Termination::ZeroTail) => eprintln!(
            "Reason: long run of zeros without a reliable total size; assumed end of disc."
        ),
        _ => {}
    }
    if state.zero_filled_sectors > 0 {
        eprintln!(
            "Warning: {} unreadable sector(s) were filled with zeros.",
            state.zero_filled_sectors
        );
    }
    if state.rescues > 0 {
        eprintln!(
            "Recovered {} block(s) by reducing the read size.",
            state.rescues
        );
    }
}
