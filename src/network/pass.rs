/// What one layer saw and produced during a single forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerTrace {
    input_with_bias: Vec<f64>,
    activations: Vec<f64>,
}

impl LayerTrace {
    pub(crate) fn new(input_with_bias: Vec<f64>, activations: Vec<f64>) -> Self {
        LayerTrace { input_with_bias, activations }
    }

    /// The layer input with the constant bias slot at index 0.
    pub fn input_with_bias(&self) -> &[f64] {
        &self.input_with_bias
    }

    /// Post-sigmoid node values.
    pub fn activations(&self) -> &[f64] {
        &self.activations
    }
}

/// Every layer's trace from one forward pass, input-facing layer first.
///
/// Training and error computation take a `ForwardPass` rather than reading
/// values cached on the layers, so they always see the pass they were handed.
/// A pass is tagged with the weights it was computed from; any other network,
/// or the same one after its weights moved, rejects it.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardPass {
    traces: Vec<LayerTrace>,
    stamp: u64,
}

impl ForwardPass {
    pub(crate) fn new(traces: Vec<LayerTrace>, stamp: u64) -> Self {
        debug_assert!(!traces.is_empty());
        ForwardPass { traces, stamp }
    }

    pub(crate) fn stamp(&self) -> u64 {
        self.stamp
    }

    pub fn traces(&self) -> &[LayerTrace] {
        &self.traces
    }

    pub fn trace(&self, layer: usize) -> Option<&LayerTrace> {
        self.traces.get(layer)
    }

    /// Activations of the output layer.
    pub fn output(&self) -> &[f64] {
        self.traces[self.traces.len() - 1].activations()
    }

    pub fn into_output(mut self) -> Vec<f64> {
        self.traces.pop().map(|t| t.activations).unwrap_or_default()
    }
}
