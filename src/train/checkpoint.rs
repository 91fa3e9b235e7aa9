use std::path::Path;

use log::info;

use crate::error::Result;
use crate::network::network::Network;

/// Saves `network` to `path` only if `error` beats `best` (or there is no best
/// yet) and returns the best error after the call.
///
/// A NaN error never counts as an improvement.
pub fn save_if_improved<P: AsRef<Path>>(
    network: &Network,
    path: P,
    error: f64,
    best: Option<f64>,
) -> Result<Option<f64>> {
    if !is_improvement(error, best) {
        return Ok(best);
    }
    network.save(&path)?;
    info!(
        "checkpoint: error {error:.6} (previous best {best:?}) saved to {}",
        path.as_ref().display()
    );
    Ok(Some(error))
}

pub fn is_improvement(error: f64, best: Option<f64>) -> bool {
    if error.is_nan() {
        return false;
    }
    best.map_or(true, |b| error < b)
}
