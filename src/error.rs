//! Error types shared by every part of the crate.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by network construction, training, evaluation and I/O.
#[derive(Error, Debug)]
pub enum Error {
    /// A vector handed to the network does not have the length its shape requires.
    /// Nothing is truncated or padded; the call fails before touching any state.
    #[error("dimension mismatch in {context}: expected {expected}, found {found}")]
    Dimension {
        context: &'static str,
        expected: usize,
        found: usize,
    },

    /// A forward pass was handed to a network other than the one that
    /// produced it, or to the same network after its weights changed.
    #[error("forward pass does not belong to this network state")]
    ForeignPass,

    /// An averaged quantity was requested over zero examples.
    #[error("batch is empty")]
    EmptyBatch,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Decoding or resizing an image failed.
    #[error("image error: {0}")]
    Image(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid topology or hyperparameter configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn dimension(context: &'static str, expected: usize, found: usize) -> Self {
        Error::Dimension { context, expected, found }
    }
}

/// Errors raised while saving or restoring a network file.
///
/// A load that fails with any of these never yields a `Network`, so there is
/// no partially restored instance for the caller to hold on to.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error while accessing network file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize network file: {0}")]
    Codec(#[from] bincode::Error),

    #[error("not a network file (bad magic bytes)")]
    BadMagic,

    #[error("network file version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("network file has invalid structure: {0}")]
    InvalidFormat(String),
}
