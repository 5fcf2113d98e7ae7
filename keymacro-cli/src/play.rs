use crate::Args;
use anyhow::{bail, Context};
use keymacro::{create_backend, Iterations, MacroSequence, PlaybackConfig, Player};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{info, warn};

pub fn run(args: &Args) -> anyhow::Result<()> {
    let mut sequence = MacroSequence::load_from_file(&args.file)
        .with_context(|| format!("failed to load macro file {:?}", args.file))?;
    info!("Loaded macro sequence with {} items.", sequence.len());

    let backend = create_backend()?;

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("failed to install Ctrl+C handler")?;

    let config = PlaybackConfig {
        start_delay: Duration::from_secs(args.delay),
        iterations: Iterations::from_loops(args.loops),
        silent: args.silent,
        ..PlaybackConfig::default()
    };
    let player = Player::new(backend, config);
    let report = player.run(&mut sequence, &cancel);

    if report.cancelled {
        warn!("Playback cancelled after {} item(s)", report.items_executed);
        return Ok(());
    }
    if !report.failures.is_empty() {
        for failure in &report.failures {
            warn!(
                "Iteration {} item {} failed with code {}: {}",
                failure.iteration,
                failure.index + 1,
                failure.code,
                failure.item
            );
        }
        bail!("{} item(s) failed during playback", report.failures.len());
    }
    Ok(())
}
