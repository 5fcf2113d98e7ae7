mod play;
mod record;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "keymacro")]
#[command(about = "Record and play keyboard and mouse macros against a target window")]
#[command(version)]
pub struct Args {
    /// Path to the macro file
    #[arg(short, long)]
    file: PathBuf,

    /// Seconds to wait before playback starts
    #[arg(short, long, default_value_t = 0)]
    delay: u64,

    /// Number of iterations to play, 0 loops until Ctrl+C
    #[arg(short = 'l', long = "loop", default_value_t = 1)]
    loops: u32,

    /// Only log per-item progress at debug level
    #[arg(short, long)]
    silent: bool,

    /// Record a new macro interactively instead of playing one
    #[arg(long)]
    record: bool,

    /// Append the recording to an existing macro file
    #[arg(long, requires = "record")]
    append: bool,

    /// Also write the raw recorded events as JSON
    #[arg(long, value_name = "JSON", requires = "record")]
    dump_records: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if args.record {
        record::run(&args)
    } else {
        play::run(&args)
    }
}
