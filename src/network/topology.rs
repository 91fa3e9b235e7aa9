use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Shape of a layer chain.
///
/// Fields:
/// - `input_size`    — length of the vectors fed to the first layer
/// - `output_size`   — number of nodes in the output layer
/// - `hidden_layers` — number of hidden layers; `0` means one layer mapping
///                     input straight to output
/// - `hidden_width`  — node count of every hidden layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub input_size: usize,
    pub output_size: usize,
    pub hidden_layers: usize,
    pub hidden_width: usize,
}

impl Topology {
    pub fn new(
        input_size: usize,
        output_size: usize,
        hidden_layers: usize,
        hidden_width: usize,
    ) -> Self {
        Topology { input_size, output_size, hidden_layers, hidden_width }
    }

    /// `(input_size, size)` of every layer, input-facing first.
    pub fn layer_shapes(&self) -> Vec<(usize, usize)> {
        if self.hidden_layers == 0 {
            return vec![(self.input_size, self.output_size)];
        }
        let mut shapes = Vec::with_capacity(self.hidden_layers + 1);
        shapes.push((self.input_size, self.hidden_width));
        for _ in 1..self.hidden_layers {
            shapes.push((self.hidden_width, self.hidden_width));
        }
        shapes.push((self.hidden_width, self.output_size));
        shapes
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(Error::Config("input_size must be at least 1".into()));
        }
        if self.output_size == 0 {
            return Err(Error::Config("output_size must be at least 1".into()));
        }
        if self.hidden_layers > 0 && self.hidden_width == 0 {
            return Err(Error::Config(
                "hidden_width must be at least 1 when hidden layers are requested".into(),
            ));
        }
        Ok(())
    }
}

/// Per-layer training hyperparameters, applied uniformly across the chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hyperparams {
    pub learning_rate: f64,
    /// L2 penalty; `0.0` disables weight decay.
    pub weight_decay: f64,
    /// Fresh weights are drawn uniformly from `[-max_initial_weight, max_initial_weight]`.
    pub max_initial_weight: f64,
}

impl Default for Hyperparams {
    fn default() -> Self {
        Hyperparams {
            learning_rate: 0.001,
            weight_decay: 0.0,
            max_initial_weight: 0.1,
        }
    }
}

impl Hyperparams {
    pub fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() {
            return Err(Error::Config("learning_rate must be finite".into()));
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(Error::Config("weight_decay must be finite and non-negative".into()));
        }
        if !self.max_initial_weight.is_finite() || self.max_initial_weight < 0.0 {
            return Err(Error::Config("max_initial_weight must be finite and non-negative".into()));
        }
        Ok(())
    }
}

/// Topology plus hyperparameters, storable as JSON next to a trained model so a
/// training run can be reproduced before any weights exist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub topology: Topology,
    #[serde(default)]
    pub hyperparams: Hyperparams,
}

impl NetworkConfig {
    /// Serializes the config to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Deserializes and validates a config written by `save_json`.
    pub fn load_json(path: &str) -> Result<NetworkConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config: NetworkConfig =
            serde_json::from_reader(reader).map_err(|e| Error::Config(e.to_string()))?;
        config.topology.validate()?;
        config.hyperparams.validate()?;
        Ok(config)
    }
}
