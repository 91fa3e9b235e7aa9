pub mod activation;
pub mod data;
pub mod error;
pub mod eval;
pub mod layers;
pub mod math;
pub mod network;
pub mod train;

// Convenience re-exports
pub use data::corpus::{load_corpus, Corpus, Example};
pub use error::{Error, PersistenceError, Result};
pub use eval::report::EvaluationReport;
pub use eval::verdict::{classify, Thresholds, Verdict};
pub use layers::dense::Layer;
pub use math::matrix::Matrix;
pub use network::network::Network;
pub use network::pass::ForwardPass;
pub use network::topology::{Hyperparams, NetworkConfig, Topology};
pub use train::loop_fn::{train_loop, TrainOutcome};
pub use train::progress::TrainProgress;
pub use train::train_config::TrainConfig;
