pub mod corpus;
pub mod image_input;

pub use corpus::{load_corpus, Corpus, Example};
pub use image_input::{image_bytes_to_input, image_to_input};
