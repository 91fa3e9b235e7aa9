use serde::{Deserialize, Serialize};

use crate::eval::report::EvaluationReport;

/// Snapshot emitted by `train_loop` at every evaluation.
///
/// Values are copied out of the network, so a receiver on another thread
/// never reads the network while it trains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainProgress {
    /// 0-based iteration just completed.
    pub iteration: usize,
    /// Holdout scores; `None` when no holdout set was supplied.
    pub holdout: Option<EvaluationReport>,
    /// Mean error on the examples sampled for this iteration.
    pub sample_error: f64,
    /// Best evaluated error so far, including this one.
    pub best_error: Option<f64>,
    /// Whether this evaluation set a new best (and was checkpointed, if configured).
    pub improved: bool,
    /// Wall-clock time since the loop started, in milliseconds.
    pub elapsed_ms: u64,
}

impl TrainProgress {
    /// The error the loop tracks for checkpointing: holdout error when
    /// available, sampled-batch error otherwise.
    pub fn tracked_error(&self) -> f64 {
        self.holdout.map(|r| r.mean_error).unwrap_or(self.sample_error)
    }
}
