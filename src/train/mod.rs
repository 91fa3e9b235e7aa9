pub mod checkpoint;
pub mod loop_fn;
pub mod progress;
pub mod train_config;

pub use checkpoint::save_if_improved;
pub use loop_fn::{train_loop, TrainOutcome};
pub use progress::TrainProgress;
pub use train_config::TrainConfig;
