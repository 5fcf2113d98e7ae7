use crate::{backend::InputBackend, MacroSequence};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tracing::{debug, error, info};

/// How many times a sequence is played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iterations {
    Count(u32),
    Forever,
}

impl Iterations {
    /// CLI convention: 0 loops until cancelled
    pub fn from_loops(loops: u32) -> Self {
        match loops {
            0 => Iterations::Forever,
            n => Iterations::Count(n),
        }
    }

    fn allows(self, iteration: u32) -> bool {
        match self {
            Iterations::Count(n) => iteration <= n,
            Iterations::Forever => true,
        }
    }
}

/// Configuration for macro playback
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Pause before the first item executes
    pub start_delay: Duration,

    pub iterations: Iterations,

    /// Pause after every successful item
    pub item_interval: Duration,

    /// Pause after every iteration
    pub iteration_pause: Duration,

    /// Log per-item progress at debug level only
    pub silent: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            start_delay: Duration::ZERO,
            iterations: Iterations::Count(1),
            item_interval: Duration::from_millis(50),
            iteration_pause: Duration::from_millis(1000),
            silent: false,
        }
    }
}

/// An item that failed during playback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// 1-based iteration number
    pub iteration: u32,
    /// 0-based item index
    pub index: usize,
    /// The item rendered as a macro line
    pub item: String,
    /// The item's last error code
    pub code: i32,
}

/// Summary of a playback run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    pub iterations: u32,
    pub items_executed: usize,
    pub failures: Vec<ItemFailure>,
    pub cancelled: bool,
}

impl PlaybackReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Plays sequences item by item on the calling thread
pub struct Player {
    backend: Arc<dyn InputBackend>,
    config: PlaybackConfig,
}

impl Player {
    pub fn new(backend: Arc<dyn InputBackend>, config: PlaybackConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Play the sequence.
    ///
    /// A failing item ends the current iteration only; the next iteration
    /// starts from the first item again. `cancel` is checked before every item.
    pub fn run(&self, sequence: &mut MacroSequence, cancel: &AtomicBool) -> PlaybackReport {
        let mut report = PlaybackReport::default();
        let total = sequence.len();

        if !self.config.start_delay.is_zero() {
            info!("Starting macro sequence in {:?}...", self.config.start_delay);
            thread::sleep(self.config.start_delay);
        }

        let mut iteration = 1;
        while self.config.iterations.allows(iteration) {
            if cancel.load(Ordering::SeqCst) {
                report.cancelled = true;
                break;
            }
            info!("Iteration {}", iteration);
            report.iterations = iteration;

            for (index, item) in sequence.iter_mut().enumerate() {
                if cancel.load(Ordering::SeqCst) {
                    report.cancelled = true;
                    break;
                }
                if self.config.silent {
                    debug!("{}/{}: {}", index + 1, total, item);
                } else {
                    info!("{}/{}: {}", index + 1, total, item);
                }

                report.items_executed += 1;
                if !item.execute(self.backend.as_ref()) {
                    error!("Execution break ({}): {}", item.last_error(), item);
                    report.failures.push(ItemFailure {
                        iteration,
                        index,
                        item: item.to_string(),
                        code: item.last_error(),
                    });
                    break;
                }
                if !self.config.item_interval.is_zero() {
                    thread::sleep(self.config.item_interval);
                }
            }

            if report.cancelled {
                break;
            }
            if !self.config.iteration_pause.is_zero() {
                thread::sleep(self.config.iteration_pause);
            }
            iteration += 1;
        }

        info!(
            "Playback finished after {} iteration(s), {} failure(s)",
            report.iterations,
            report.failures.len()
        );
        report
    }
}
