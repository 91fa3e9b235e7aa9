use rand::Rng;

use crate::activation::sigmoid::{sigmoid, sigmoid_slope};
use crate::error::{Error, Result};
use crate::math::matrix::Matrix;
use crate::network::pass::LayerTrace;
use crate::network::topology::Hyperparams;

/// Value of the virtual bias input, always stored at index 0 of the augmented input.
pub const BIAS_INPUT: f64 = 1.0;

/// One affine + sigmoid stage.
///
/// `weights` has shape `(size, input_size + 1)`; column 0 multiplies the bias
/// input. `pending_update` has the same shape and holds the delta computed by
/// the latest backprop step until `apply_pending_update` commits it.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    weights: Matrix,
    pending_update: Matrix,
    learning_rate: f64,
    weight_decay: f64,
}

impl Layer {
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        size: usize,
        hyperparams: &Hyperparams,
        rng: &mut R,
    ) -> Layer {
        let weights =
            Matrix::random_uniform(size, input_size + 1, hyperparams.max_initial_weight, rng);
        Layer::from_weights(weights, hyperparams.learning_rate, hyperparams.weight_decay)
    }

    /// Wraps an existing weight matrix (bias column first) with a zeroed pending update.
    pub fn from_weights(weights: Matrix, learning_rate: f64, weight_decay: f64) -> Layer {
        let pending_update = Matrix::zeros(weights.rows(), weights.cols());
        Layer { weights, pending_update, learning_rate, weight_decay }
    }

    /// Number of nodes in this layer.
    pub fn size(&self) -> usize {
        self.weights.rows()
    }

    /// Number of inputs accepted, not counting the bias.
    pub fn input_size(&self) -> usize {
        self.weights.cols() - 1
    }

    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    pub fn pending_update(&self) -> &Matrix {
        &self.pending_update
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn weight_decay(&self) -> f64 {
        self.weight_decay
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    pub fn set_weight_decay(&mut self, weight_decay: f64) {
        self.weight_decay = weight_decay;
    }

    pub fn activate(x: f64) -> f64 {
        sigmoid(x)
    }

    /// Computes `sigmoid(weights · [1, input...])` for this layer only.
    pub fn forward(&self, input: &[f64]) -> Result<LayerTrace> {
        if input.len() != self.input_size() {
            return Err(Error::dimension(
                "Layer::forward input",
                self.input_size(),
                input.len(),
            ));
        }
        let mut input_with_bias = Vec::with_capacity(input.len() + 1);
        input_with_bias.push(BIAS_INPUT);
        input_with_bias.extend_from_slice(input);

        let activations = self
            .weights
            .mul_vec(&input_with_bias)
            .into_iter()
            .map(Layer::activate)
            .collect();
        Ok(LayerTrace::new(input_with_bias, activations))
    }

    /// Sum of this layer's squared weights, bias column included.
    pub fn weight_sq_sum(&self) -> f64 {
        self.weights.sum_of_squares()
    }

    /// `0.5 * Σ(expected - activation)²`, plus `0.5 * weight_decay * Σw²` over
    /// this layer and every layer in `upstream` when decay is enabled.
    ///
    /// `trace` must be this layer's trace from the pass being scored.
    pub fn error_against(
        &self,
        trace: &LayerTrace,
        expected: &[f64],
        upstream: &[Layer],
    ) -> Result<f64> {
        self.check_trace(trace)?;
        if expected.len() != self.size() {
            return Err(Error::dimension(
                "Layer::error_against expected",
                self.size(),
                expected.len(),
            ));
        }
        let squared: f64 = expected
            .iter()
            .zip(trace.activations())
            .map(|(e, a)| (e - a) * (e - a))
            .sum();
        let mut error = 0.5 * squared;
        if self.weight_decay != 0.0 {
            let chain: f64 =
                self.weight_sq_sum() + upstream.iter().map(Layer::weight_sq_sum).sum::<f64>();
            error += 0.5 * self.weight_decay * chain;
        }
        Ok(error)
    }

    /// Output-layer backprop step: stages this layer's update and returns its
    /// error signal for the upstream layer.
    ///
    /// `delta_j = (a_j - expected_j) * a_j * (1 - a_j)`.
    pub fn train_output(&mut self, trace: &LayerTrace, expected: &[f64]) -> Result<Vec<f64>> {
        self.check_trace(trace)?;
        if expected.len() != self.size() {
            return Err(Error::dimension(
                "Layer::train_output expected",
                self.size(),
                expected.len(),
            ));
        }
        let delta: Vec<f64> = trace
            .activations()
            .iter()
            .zip(expected)
            .map(|(a, e)| (a - e) * sigmoid_slope(*a))
            .collect();
        self.stage_update(trace, &delta);
        Ok(delta)
    }

    /// Hidden-layer backprop step. `downstream` is the next layer toward the
    /// output and `delta_down` its error signal; the bias column of
    /// `downstream` does not feed back.
    ///
    /// `delta_j = (Σ_l delta_down_l * downstream.w[l][j + 1]) * a_j * (1 - a_j)`.
    pub fn backprop(
        &mut self,
        trace: &LayerTrace,
        downstream: &Layer,
        delta_down: &[f64],
    ) -> Result<Vec<f64>> {
        self.check_trace(trace)?;
        if downstream.input_size() != self.size() {
            return Err(Error::dimension(
                "Layer::backprop downstream inputs",
                self.size(),
                downstream.input_size(),
            ));
        }
        if delta_down.len() != downstream.size() {
            return Err(Error::dimension(
                "Layer::backprop downstream delta",
                downstream.size(),
                delta_down.len(),
            ));
        }

        let mut delta = vec![0.0; self.size()];
        for (l, d) in delta_down.iter().enumerate() {
            let row = downstream.weights.row(l);
            for (j, sum) in delta.iter_mut().enumerate() {
                *sum += d * row[j + 1];
            }
        }
        for (d, a) in delta.iter_mut().zip(trace.activations()) {
            *d *= sigmoid_slope(*a);
        }
        self.stage_update(trace, &delta);
        Ok(delta)
    }

    /// A trace is only usable by the layer whose shape produced it.
    fn check_trace(&self, trace: &LayerTrace) -> Result<()> {
        if trace.input_with_bias().len() != self.weights.cols() {
            return Err(Error::dimension(
                "Layer trace input",
                self.weights.cols(),
                trace.input_with_bias().len(),
            ));
        }
        if trace.activations().len() != self.size() {
            return Err(Error::dimension(
                "Layer trace activations",
                self.size(),
                trace.activations().len(),
            ));
        }
        Ok(())
    }

    /// Overwrites `pending_update[i][j]` with
    /// `-learning_rate * (input_j * delta_i + weight_decay * w[i][j])`.
    fn stage_update(&mut self, trace: &LayerTrace, delta: &[f64]) {
        let input = trace.input_with_bias();
        for (i, d) in delta.iter().enumerate() {
            let weights = self.weights.row(i);
            let pending = self.pending_update.row_mut(i);
            for j in 0..pending.len() {
                pending[j] = -self.learning_rate * (input[j] * d + self.weight_decay * weights[j]);
            }
        }
    }

    /// `weights += pending_update`.
    pub fn apply_pending_update(&mut self) {
        self.weights += &self.pending_update;
    }

    pub(crate) fn replace_pending_update(&mut self, update: Matrix) {
        debug_assert_eq!(
            (update.rows(), update.cols()),
            (self.weights.rows(), self.weights.cols())
        );
        self.pending_update = update;
    }
}
