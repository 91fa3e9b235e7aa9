use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{atomic::AtomicBool, Arc};

use crate::train::progress::TrainProgress;

/// Configuration for a `train_loop` run.
///
/// # Fields
/// - `sample_size`    — examples drawn (without replacement) per iteration and
///                      handed to `Network::train_batch` with one round
/// - `eval_every`     — iterations between evaluations; iteration 0 is always evaluated
/// - `max_iterations` — stop after this many iterations; `None` runs until stopped
/// - `checkpoint`     — file the network is saved to whenever the evaluated error
///                      improves on the best seen so far
/// - `best_error`     — best error already achieved by the file at `checkpoint`
///                      (e.g. when resuming); `None` means any first result is saved
/// - `progress_tx`    — optional channel sender; one `TrainProgress` per evaluation.
///                      If the receiver is dropped the loop terminates early.
/// - `stop_flag`      — optional atomic flag; when set to `true` from another
///                      thread the loop stops before its next iteration.
pub struct TrainConfig {
    pub sample_size: usize,
    pub eval_every: usize,
    pub max_iterations: Option<usize>,
    pub checkpoint: Option<PathBuf>,
    pub best_error: Option<f64>,
    pub progress_tx: Option<mpsc::Sender<TrainProgress>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainConfig {
    /// Creates a `TrainConfig` with no checkpoint, progress channel or stop flag.
    pub fn new(sample_size: usize, eval_every: usize, max_iterations: Option<usize>) -> Self {
        TrainConfig {
            sample_size,
            eval_every,
            max_iterations,
            checkpoint: None,
            best_error: None,
            progress_tx: None,
            stop_flag: None,
        }
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig::new(10, 100, None)
    }
}
