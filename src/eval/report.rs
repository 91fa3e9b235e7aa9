use log::debug;
use serde::{Deserialize, Serialize};

use crate::data::corpus::Example;
use crate::error::{Error, Result};
use crate::eval::verdict::{Thresholds, Verdict};
use crate::network::network::Network;

/// How a network scores on a labeled set.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Confident and matching the label.
    pub right: usize,
    /// Between the thresholds.
    pub uncertain: usize,
    /// Confident and contradicting the label.
    pub wrong: usize,
    /// Mean of [`Network::error`] over the set.
    pub mean_error: f64,
}

impl EvaluationReport {
    /// Scores every example with one forward pass each. Uncertain and wrong
    /// examples are logged at debug level with their score.
    pub fn evaluate(
        network: &Network,
        examples: &[Example],
        thresholds: Thresholds,
    ) -> Result<EvaluationReport> {
        if examples.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let mut report = EvaluationReport::default();
        let mut total_error = 0.0;
        for example in examples {
            let pass = network.propagate(&example.input)?;
            let score = pass.output()[0];
            total_error += network.error_of_pass(&pass, &example.target())?;

            let expected = if example.positive { Verdict::Positive } else { Verdict::Negative };
            match thresholds.verdict(score) {
                Verdict::Uncertain => {
                    report.uncertain += 1;
                    debug!("uncertain {score:.4}: {}", example.source);
                }
                verdict if verdict == expected => report.right += 1,
                _ => {
                    report.wrong += 1;
                    debug!("wrong {score:.4}: {}", example.source);
                }
            }
        }
        report.mean_error = total_error / examples.len() as f64;
        Ok(report)
    }

    pub fn total(&self) -> usize {
        self.right + self.uncertain + self.wrong
    }

    /// Fraction of examples judged confidently and correctly.
    pub fn accuracy(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            n => self.right as f64 / n as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::dense::Layer;
    use crate::math::matrix::Matrix;
    use approx::assert_relative_eq;

    /// Single-layer network whose score is `sigmoid(bias + 10 * x)`.
    fn steep_network(bias: f64) -> Network {
        let weights = Matrix::from_row_major(1, 2, vec![bias, 10.0]).unwrap();
        Network::from_layers(vec![Layer::from_weights(weights, 0.1, 0.0)]).unwrap()
    }

    #[test]
    fn tallies_right_uncertain_wrong() {
        let net = steep_network(-5.0);
        let examples = vec![
            Example::new("good-bright", vec![1.0], true),  // sigmoid(5) > 0.9
            Example::new("good-dark", vec![0.0], true),    // sigmoid(-5) < 0.1
            Example::new("bad-dark", vec![0.0], false),    // right
            Example::new("bad-mid", vec![0.5], false),     // sigmoid(0) uncertain
        ];
        let report = EvaluationReport::evaluate(&net, &examples, Thresholds::REPORT).unwrap();
        assert_eq!((report.right, report.uncertain, report.wrong), (2, 1, 1));
        assert_eq!(report.total(), 4);
        assert_relative_eq!(report.accuracy(), 0.5);

        let inputs: Vec<Vec<f64>> = examples.iter().map(|e| e.input.clone()).collect();
        let targets: Vec<Vec<f64>> = examples.iter().map(Example::target).collect();
        let mean = net.error_batch(&inputs, &targets).unwrap();
        assert_relative_eq!(report.mean_error, mean, epsilon = 1e-12);
    }

    #[test]
    fn empty_set_is_rejected() {
        let net = steep_network(0.0);
        assert!(matches!(
            EvaluationReport::evaluate(&net, &[], Thresholds::REPORT),
            Err(Error::EmptyBatch)
        ));
    }

    #[test]
    fn wrong_input_length_is_dimension_error() {
        let net = steep_network(0.0);
        let examples = vec![Example::new("x", vec![1.0, 2.0], true)];
        assert!(matches!(
            EvaluationReport::evaluate(&net, &examples, Thresholds::REPORT),
            Err(Error::Dimension { .. })
        ));
    }
}
