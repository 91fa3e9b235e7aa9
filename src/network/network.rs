use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use rand::Rng;

use crate::error::{Error, Result};
use crate::layers::dense::Layer;
use crate::math::matrix::Matrix;
use crate::network::pass::ForwardPass;
use crate::network::persist;
use crate::network::topology::{Hyperparams, Topology};

static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

/// Process-unique tag for one state of a network's weights.
fn fresh_stamp() -> u64 {
    NEXT_STAMP.fetch_add(1, Ordering::Relaxed)
}

/// An ordered chain of sigmoid layers.
///
/// Index 0 faces the input and the last index is the output layer. Neighbors
/// are addressed by index (`upstream(i)` / `downstream(i)`), so the chain is
/// always linear and acyclic. A network always holds at least one layer.
///
/// Calls must be sequential: `train*` take `&mut self` and the caller owns
/// the only handle to the staged updates.
///
/// Equality compares layers only. A clone gets its own stamp, so passes from
/// the original are not accepted by the copy.
#[derive(Debug)]
pub struct Network {
    layers: Vec<Layer>,
    stamp: u64,
}

impl Clone for Network {
    fn clone(&self) -> Self {
        Network { layers: self.layers.clone(), stamp: fresh_stamp() }
    }
}

impl PartialEq for Network {
    fn eq(&self, other: &Self) -> bool {
        self.layers == other.layers
    }
}

impl Network {
    /// Builds a fresh network with default hyperparameters and thread-local randomness.
    pub fn new(
        input_size: usize,
        output_size: usize,
        hidden_layers: usize,
        hidden_width: usize,
    ) -> Result<Network> {
        Network::with_hyperparams(
            Topology::new(input_size, output_size, hidden_layers, hidden_width),
            Hyperparams::default(),
        )
    }

    pub fn with_hyperparams(topology: Topology, hyperparams: Hyperparams) -> Result<Network> {
        Network::with_rng(topology, hyperparams, &mut rand::thread_rng())
    }

    /// Builds a fresh network drawing initial weights from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(
        topology: Topology,
        hyperparams: Hyperparams,
        rng: &mut R,
    ) -> Result<Network> {
        topology.validate()?;
        hyperparams.validate()?;
        let layers = topology
            .layer_shapes()
            .into_iter()
            .map(|(input_size, size)| Layer::new(input_size, size, &hyperparams, rng))
            .collect();
        let network = Network { layers, stamp: fresh_stamp() };
        debug!("built network with layer shapes {:?}", network.layer_shapes());
        Ok(network)
    }

    /// Assembles a network from already shape-compatible layers.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Network> {
        if layers.is_empty() {
            return Err(Error::Config("a network needs at least one layer".into()));
        }
        for pair in layers.windows(2) {
            if pair[1].input_size() != pair[0].size() {
                return Err(Error::dimension(
                    "Network::from_layers chain",
                    pair[0].size(),
                    pair[1].input_size(),
                ));
            }
        }
        Ok(Network { layers, stamp: fresh_stamp() })
    }

    /// Restores a network written by [`Network::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Network> {
        Ok(persist::load(path)?)
    }

    /// Persists the layer chain (weights and hyperparameters) to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        Ok(persist::save(self, path)?)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn first_layer(&self) -> &Layer {
        &self.layers[0]
    }

    pub fn output_layer(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }

    /// Index of the layer feeding layer `i`; `None` for the first layer.
    pub fn upstream(&self, i: usize) -> Option<usize> {
        i.checked_sub(1).filter(|&u| u < self.layers.len())
    }

    /// Index of the layer fed by layer `i`; `None` for the output layer.
    pub fn downstream(&self, i: usize) -> Option<usize> {
        Some(i + 1).filter(|&d| d < self.layers.len())
    }

    pub fn input_size(&self) -> usize {
        self.first_layer().input_size()
    }

    pub fn output_size(&self) -> usize {
        self.output_layer().size()
    }

    /// `(rows, cols)` of every weight matrix, input-facing first.
    pub fn layer_shapes(&self) -> Vec<(usize, usize)> {
        self.layers
            .iter()
            .map(|l| (l.weights().rows(), l.weights().cols()))
            .collect()
    }

    /// Squared weights summed over the whole chain.
    pub fn weight_sq_sum(&self) -> f64 {
        self.layers.iter().map(Layer::weight_sq_sum).sum()
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) {
        self.layers.iter_mut().for_each(|l| l.set_learning_rate(learning_rate));
    }

    pub fn set_weight_decay(&mut self, weight_decay: f64) {
        self.layers.iter_mut().for_each(|l| l.set_weight_decay(weight_decay));
    }

    /// Forward pass keeping every layer's input and activations.
    pub fn propagate(&self, input: &[f64]) -> Result<ForwardPass> {
        if input.len() != self.input_size() {
            return Err(Error::dimension(
                "Network::forward input",
                self.input_size(),
                input.len(),
            ));
        }
        let mut traces = Vec::with_capacity(self.layers.len());
        let first = self.first_layer().forward(input)?;
        traces.push(first);
        for layer in &self.layers[1..] {
            let trace = layer.forward(traces[traces.len() - 1].activations())?;
            traces.push(trace);
        }
        Ok(ForwardPass::new(traces, self.stamp))
    }

    /// Output-layer activations for `input`.
    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>> {
        Ok(self.propagate(input)?.into_output())
    }

    /// Stages a pending update on every layer from `pass`, output layer first.
    /// Nothing is applied until [`Network::apply_pending_update`].
    ///
    /// `pass` must come from [`Network::propagate`] on this network since its
    /// last apply; anything else fails before a layer is touched.
    pub fn backprop(&mut self, pass: &ForwardPass, expected: &[f64]) -> Result<()> {
        if expected.len() != self.output_size() {
            return Err(Error::dimension(
                "Network::train expected output",
                self.output_size(),
                expected.len(),
            ));
        }
        self.check_pass(pass)?;

        let traces = pass.traces();
        let last = self.layers.len() - 1;
        let mut delta = self.layers[last].train_output(&traces[last], expected)?;
        let mut i = last;
        while let Some(up) = self.upstream(i) {
            let (head, tail) = self.layers.split_at_mut(i);
            delta = head[up].backprop(&traces[up], &tail[0], &delta)?;
            i = up;
        }
        Ok(())
    }

    /// Commits every layer's pending update, output layer first. Passes taken
    /// before the commit are stale afterwards.
    pub fn apply_pending_update(&mut self) {
        for layer in self.layers.iter_mut().rev() {
            layer.apply_pending_update();
        }
        self.stamp = fresh_stamp();
    }

    /// Online training: `rounds` full forward / backprop / apply steps on one example.
    pub fn train(&mut self, input: &[f64], expected: &[f64], rounds: usize) -> Result<()> {
        self.check_example(input, expected)?;
        for _ in 0..rounds {
            let pass = self.propagate(input)?;
            self.backprop(&pass, expected)?;
            self.apply_pending_update();
        }
        Ok(())
    }

    /// Batch training as the classifier has always done it: every example runs
    /// `rounds` forward / backprop cycles, and one apply happens at the end.
    ///
    /// Each backprop overwrites the staged update, so the committed step is the
    /// gradient of the **last** example alone. Use
    /// [`Network::train_batch_averaged`] for a conventional mini-batch mean.
    pub fn train_batch(
        &mut self,
        inputs: &[Vec<f64>],
        expected: &[Vec<f64>],
        rounds: usize,
    ) -> Result<()> {
        self.check_batch(inputs, expected)?;
        if inputs.is_empty() || rounds == 0 {
            return Ok(());
        }
        for (input, target) in inputs.iter().zip(expected) {
            for _ in 0..rounds {
                let pass = self.propagate(input)?;
                self.backprop(&pass, target)?;
            }
        }
        self.apply_pending_update();
        Ok(())
    }

    /// Mini-batch training: each round stages every example's update against
    /// the same weights, averages them, and applies the mean once.
    pub fn train_batch_averaged(
        &mut self,
        inputs: &[Vec<f64>],
        expected: &[Vec<f64>],
        rounds: usize,
    ) -> Result<()> {
        self.check_batch(inputs, expected)?;
        if inputs.is_empty() {
            return Ok(());
        }
        let scale = 1.0 / inputs.len() as f64;
        for _ in 0..rounds {
            let mut sums: Vec<Matrix> = self
                .layers
                .iter()
                .map(|l| Matrix::zeros(l.weights().rows(), l.weights().cols()))
                .collect();
            for (input, target) in inputs.iter().zip(expected) {
                let pass = self.propagate(input)?;
                self.backprop(&pass, target)?;
                for (sum, layer) in sums.iter_mut().zip(&self.layers) {
                    *sum += layer.pending_update();
                }
            }
            for (mut sum, layer) in sums.into_iter().zip(self.layers.iter_mut()) {
                sum.scale(scale);
                layer.replace_pending_update(sum);
            }
            self.apply_pending_update();
        }
        Ok(())
    }

    /// Scores an existing pass against `expected` (see [`Layer::error_against`]).
    pub fn error_of_pass(&self, pass: &ForwardPass, expected: &[f64]) -> Result<f64> {
        if expected.len() != self.output_size() {
            return Err(Error::dimension(
                "Network::error expected output",
                self.output_size(),
                expected.len(),
            ));
        }
        self.check_pass(pass)?;
        let last = self.layers.len() - 1;
        self.layers[last].error_against(&pass.traces()[last], expected, &self.layers[..last])
    }

    pub fn error(&self, input: &[f64], expected: &[f64]) -> Result<f64> {
        self.check_example(input, expected)?;
        let pass = self.propagate(input)?;
        self.error_of_pass(&pass, expected)
    }

    /// Mean of [`Network::error`] over a list of examples.
    pub fn error_batch(&self, inputs: &[Vec<f64>], expected: &[Vec<f64>]) -> Result<f64> {
        self.check_batch(inputs, expected)?;
        if inputs.is_empty() {
            return Err(Error::EmptyBatch);
        }
        let mut total = 0.0;
        for (input, target) in inputs.iter().zip(expected) {
            total += self.error(input, target)?;
        }
        Ok(total / inputs.len() as f64)
    }

    fn check_example(&self, input: &[f64], expected: &[f64]) -> Result<()> {
        if input.len() != self.input_size() {
            return Err(Error::dimension(
                "Network input",
                self.input_size(),
                input.len(),
            ));
        }
        if expected.len() != self.output_size() {
            return Err(Error::dimension(
                "Network expected output",
                self.output_size(),
                expected.len(),
            ));
        }
        Ok(())
    }

    /// Validates a whole batch up front so a bad example never leaves a
    /// half-trained network behind.
    fn check_batch(&self, inputs: &[Vec<f64>], expected: &[Vec<f64>]) -> Result<()> {
        if inputs.len() != expected.len() {
            return Err(Error::dimension(
                "Network batch expected outputs",
                inputs.len(),
                expected.len(),
            ));
        }
        inputs
            .iter()
            .zip(expected)
            .try_for_each(|(input, target)| self.check_example(input, target))
    }

    /// Shape first, so a pass from a different topology reports which layer
    /// disagrees; then the stamp, which catches same-shaped foreign or stale passes.
    fn check_pass(&self, pass: &ForwardPass) -> Result<()> {
        if pass.traces().len() != self.layers.len() {
            return Err(Error::dimension(
                "ForwardPass layer count",
                self.layers.len(),
                pass.traces().len(),
            ));
        }
        for (layer, trace) in self.layers.iter().zip(pass.traces()) {
            if trace.input_with_bias().len() != layer.weights().cols() {
                return Err(Error::dimension(
                    "ForwardPass layer input",
                    layer.weights().cols(),
                    trace.input_with_bias().len(),
                ));
            }
            if trace.activations().len() != layer.size() {
                return Err(Error::dimension(
                    "ForwardPass layer activations",
                    layer.size(),
                    trace.activations().len(),
                ));
            }
        }
        if pass.stamp() != self.stamp {
            return Err(Error::ForeignPass);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn seeded(topology: Topology, hyperparams: Hyperparams, seed: u64) -> Network {
        Network::with_rng(topology, hyperparams, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn builds_chain_with_expected_shapes() {
        let net = Network::new(6, 2, 2, 3).unwrap();
        assert_eq!(net.layer_shapes(), vec![(3, 7), (3, 4), (2, 4)]);
        assert_eq!(net.input_size(), 6);
        assert_eq!(net.output_size(), 2);
    }

    #[test]
    fn neighbor_indices_form_a_linear_chain() {
        let net = Network::new(2, 1, 2, 3).unwrap();
        assert_eq!(net.upstream(0), None);
        assert_eq!(net.downstream(0), Some(1));
        assert_eq!(net.upstream(2), Some(1));
        assert_eq!(net.downstream(2), None);
        for i in 0..net.layers().len() - 1 {
            assert_eq!(net.downstream(i).and_then(|d| net.upstream(d)), Some(i));
        }
    }

    #[test]
    fn single_layer_network_is_both_first_and_output() {
        let net = Network::new(3, 2, 0, 10).unwrap();
        assert_eq!(net.layers().len(), 1);
        assert!(std::ptr::eq(net.first_layer(), net.output_layer()));
        assert_eq!(net.upstream(0), None);
        assert_eq!(net.downstream(0), None);
    }

    #[test]
    fn rejects_invalid_topology() {
        assert!(matches!(Network::new(0, 1, 0, 0), Err(Error::Config(_))));
    }

    #[test]
    fn from_layers_rejects_incompatible_chain() {
        let mut rng = StdRng::seed_from_u64(1);
        let hp = Hyperparams::default();
        let layers = vec![Layer::new(2, 3, &hp, &mut rng), Layer::new(4, 1, &hp, &mut rng)];
        assert!(matches!(Network::from_layers(layers), Err(Error::Dimension { .. })));
        assert!(matches!(Network::from_layers(vec![]), Err(Error::Config(_))));
    }

    #[test]
    fn forward_matches_propagate_output() {
        let net = seeded(Topology::new(3, 2, 1, 4), Hyperparams::default(), 3);
        let pass = net.propagate(&[0.2, -0.4, 1.0]).unwrap();
        assert_eq!(pass.traces().len(), 2);
        let traces = pass.traces();
        assert_eq!(traces[1].input_with_bias()[1..], *traces[0].activations());
        assert!(pass.trace(2).is_none());
        assert_eq!(net.forward(&[0.2, -0.4, 1.0]).unwrap(), pass.output());
    }

    #[test]
    fn forward_rejects_wrong_length() {
        let net = Network::new(3, 1, 1, 2).unwrap();
        assert!(matches!(
            net.forward(&[1.0, 2.0]),
            Err(Error::Dimension { expected: 3, found: 2, .. })
        ));
    }

    #[test]
    fn train_rejects_bad_expected_without_mutating() {
        let mut net = Network::new(2, 1, 1, 2).unwrap();
        let before = net.clone();
        assert!(net.train(&[1.0, 0.0], &[1.0, 0.0], 5).is_err());
        assert_eq!(net, before);
    }

    #[test]
    fn backprop_matches_numeric_gradient() {
        let hp = Hyperparams { learning_rate: 1.0, weight_decay: 0.0, max_initial_weight: 0.5 };
        let mut net = seeded(Topology::new(2, 1, 1, 3), hp, 11);
        let input = [0.3, -0.7];
        let target = [0.9];
        let pass = net.propagate(&input).unwrap();
        net.backprop(&pass, &target).unwrap();

        // pending = -lr * dE/dw, so compare against a central difference.
        let h = 1e-6;
        for layer_idx in 0..2 {
            let (rows, cols) = net.layer_shapes()[layer_idx];
            for i in 0..rows {
                for j in 0..cols {
                    let shifted = |delta: f64| {
                        let mut layers = net.layers().to_vec();
                        let mut weights = layers[layer_idx].weights().clone();
                        weights[(i, j)] += delta;
                        layers[layer_idx] = Layer::from_weights(weights, 1.0, 0.0);
                        Network::from_layers(layers).unwrap().error(&input, &target).unwrap()
                    };
                    let numeric = (shifted(h) - shifted(-h)) / (2.0 * h);
                    let staged = net.layers()[layer_idx].pending_update()[(i, j)];
                    assert_relative_eq!(-staged, numeric, epsilon = 1e-7);
                }
            }
        }
    }

    #[test]
    fn train_batch_commits_only_last_example_step() {
        let hp = Hyperparams { learning_rate: 0.3, ..Hyperparams::default() };
        let base = seeded(Topology::new(2, 1, 1, 3), hp, 5);
        let inputs = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let expected = vec![vec![1.0], vec![0.0]];

        let mut batched = base.clone();
        batched.train_batch(&inputs, &expected, 3).unwrap();

        let mut last_only = base.clone();
        last_only.train(&inputs[1], &expected[1], 1).unwrap();

        // Every pass in the batch sees the untouched weights, so the staged
        // updates (and the committed step) are identical to one online step.
        assert_eq!(batched, last_only);
    }

    #[test]
    fn train_with_no_rounds_is_a_no_op() {
        let mut net = Network::new(2, 1, 1, 3).unwrap();
        let before = net.clone();
        net.train(&[1.0, 1.0], &[0.0], 0).unwrap();
        assert_eq!(net, before);
    }

    #[test]
    fn pass_from_a_deeper_or_shallower_network_is_a_dimension_error() {
        let shallow = Network::new(2, 1, 0, 0).unwrap();
        let mut deep = Network::new(2, 1, 2, 3).unwrap();
        let before = deep.clone();
        let pass = shallow.propagate(&[1.0, 0.0]).unwrap();

        assert!(matches!(
            deep.error_of_pass(&pass, &[1.0]),
            Err(Error::Dimension { expected: 3, found: 1, .. })
        ));
        assert!(matches!(deep.backprop(&pass, &[1.0]), Err(Error::Dimension { .. })));
        assert_eq!(deep, before);

        let mut shallow = shallow;
        let deep_pass = before.propagate(&[1.0, 0.0]).unwrap();
        assert!(matches!(shallow.backprop(&deep_pass, &[1.0]), Err(Error::Dimension { .. })));
    }

    #[test]
    fn same_shaped_pass_from_another_network_is_rejected() {
        let owner = seeded(Topology::new(2, 1, 1, 3), Hyperparams::default(), 1);
        let mut other = seeded(Topology::new(2, 1, 1, 3), Hyperparams::default(), 2);
        let before = other.clone();
        let pass = owner.propagate(&[1.0, 0.0]).unwrap();

        assert!(matches!(other.backprop(&pass, &[1.0]), Err(Error::ForeignPass)));
        assert!(matches!(other.error_of_pass(&pass, &[1.0]), Err(Error::ForeignPass)));
        assert_eq!(other, before);

        // A clone is a separate network too.
        let mut copy = owner.clone();
        assert!(matches!(copy.backprop(&pass, &[1.0]), Err(Error::ForeignPass)));
    }

    #[test]
    fn pass_goes_stale_after_apply() {
        let hp = Hyperparams { learning_rate: 0.5, ..Hyperparams::default() };
        let mut net = seeded(Topology::new(2, 1, 1, 3), hp, 3);
        let pass = net.propagate(&[1.0, 0.0]).unwrap();
        net.backprop(&pass, &[1.0]).unwrap();
        assert!(net.error_of_pass(&pass, &[1.0]).is_ok());

        net.apply_pending_update();
        assert!(matches!(net.error_of_pass(&pass, &[1.0]), Err(Error::ForeignPass)));
        let fresh = net.propagate(&[1.0, 0.0]).unwrap();
        assert!(net.error_of_pass(&fresh, &[1.0]).is_ok());
    }

    #[test]
    fn train_batch_with_no_rounds_is_a_no_op() {
        let mut net = Network::new(2, 1, 1, 3).unwrap();
        let before = net.clone();
        net.train_batch(&[vec![1.0, 1.0]], &[vec![0.0]], 0).unwrap();
        net.train_batch(&[], &[], 4).unwrap();
        assert_eq!(net, before);
    }

    #[test]
    fn train_batch_rejects_mismatched_lists() {
        let mut net = Network::new(2, 1, 1, 3).unwrap();
        let err = net.train_batch(&[vec![1.0, 1.0]], &[], 1).unwrap_err();
        assert!(matches!(err, Error::Dimension { expected: 1, found: 0, .. }));
    }

    #[test]
    fn train_batch_averaged_applies_mean_step() {
        let hp = Hyperparams { learning_rate: 0.3, ..Hyperparams::default() };
        let base = seeded(Topology::new(2, 1, 0, 0), hp, 9);
        let inputs = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let expected = vec![vec![1.0], vec![0.0]];

        let mut averaged = base.clone();
        averaged.train_batch_averaged(&inputs, &expected, 1).unwrap();

        let mut steps = Vec::new();
        for (x, y) in inputs.iter().zip(&expected) {
            let mut single = base.clone();
            let pass = single.propagate(x).unwrap();
            single.backprop(&pass, y).unwrap();
            steps.push(single.output_layer().pending_update().clone());
        }
        let w0 = base.output_layer().weights();
        let w1 = averaged.output_layer().weights();
        for j in 0..w0.cols() {
            let mean = (steps[0][(0, j)] + steps[1][(0, j)]) / 2.0;
            assert_relative_eq!(w1[(0, j)], w0[(0, j)] + mean, epsilon = 1e-12);
        }
    }

    #[test]
    fn error_batch_averages_and_rejects_empty() {
        let net = Network::new(2, 1, 1, 3).unwrap();
        let inputs = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let expected = vec![vec![1.0], vec![0.0]];
        let first = net.error(&inputs[0], &expected[0]).unwrap();
        let second = net.error(&inputs[1], &expected[1]).unwrap();
        let mean = (first + second) / 2.0;
        assert_relative_eq!(net.error_batch(&inputs, &expected).unwrap(), mean);
        assert!(matches!(net.error_batch(&[], &[]), Err(Error::EmptyBatch)));
    }

    #[test]
    fn error_includes_decay_over_whole_chain() {
        let hp = Hyperparams { weight_decay: 0.5, ..Hyperparams::default() };
        let net = seeded(Topology::new(2, 1, 2, 3), hp, 4);
        let input = [0.5, 0.5];
        let target = [1.0];
        let a = net.forward(&input).unwrap()[0];
        let expected = 0.5 * (1.0 - a).powi(2) + 0.25 * net.weight_sq_sum();
        assert_relative_eq!(net.error(&input, &target).unwrap(), expected, epsilon = 1e-12);
    }
}
