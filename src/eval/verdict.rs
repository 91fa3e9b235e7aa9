use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::network::network::Network;

/// Reading of a single-output network's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Positive,
    Uncertain,
    Negative,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Verdict::Positive => "positive",
            Verdict::Uncertain => "uncertain",
            Verdict::Negative => "negative",
        };
        f.write_str(text)
    }
}

/// Score cut-offs: above `high` is positive, below `low` is negative, and
/// anything in between is uncertain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub high: f64,
    pub low: f64,
}

impl Thresholds {
    /// Strict cut-offs used when scoring a labeled holdout set.
    pub const REPORT: Thresholds = Thresholds { high: 0.9, low: 0.1 };

    /// Looser cut-offs used when classifying a single unseen image.
    pub const DETECTOR: Thresholds = Thresholds { high: 0.667, low: 0.333 };

    pub fn verdict(&self, score: f64) -> Verdict {
        if score > self.high {
            Verdict::Positive
        } else if score < self.low {
            Verdict::Negative
        } else {
            Verdict::Uncertain
        }
    }
}

/// Runs `input` through `network` and reads its first output as a score.
pub fn classify(
    network: &Network,
    input: &[f64],
    thresholds: Thresholds,
) -> Result<(f64, Verdict)> {
    let score = network.forward(input)?[0];
    Ok((score, thresholds.verdict(score)))
}
