pub mod network;
pub mod pass;
pub mod persist;
pub mod topology;

pub use network::Network;
pub use pass::{ForwardPass, LayerTrace};
pub use topology::{Hyperparams, NetworkConfig, Topology};
