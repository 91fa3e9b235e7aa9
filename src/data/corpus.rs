use std::path::{Path, PathBuf};

use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::data::image_input::image_to_input;
use crate::error::{Error, Result};

/// One labeled training or evaluation image.
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    /// Where the input came from; used in log lines only.
    pub source: String,
    pub input: Vec<f64>,
    /// `true` for the "good" category (target 1.0), `false` for "bad" (target 0.0).
    pub positive: bool,
}

impl Example {
    pub fn new(source: impl Into<String>, input: Vec<f64>, positive: bool) -> Self {
        Example { source: source.into(), input, positive }
    }

    /// Single-output target vector for this example.
    pub fn target(&self) -> Vec<f64> {
        vec![if self.positive { 1.0 } else { 0.0 }]
    }
}

/// Training examples plus a holdout set drawn evenly from both categories.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub train: Vec<Example>,
    pub holdout: Vec<Example>,
}

/// Regular files directly inside `dir`, sorted by path.
pub fn list_images<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Converts every readable image in `paths`; unreadable files are logged and skipped.
pub fn load_examples(paths: &[PathBuf], positive: bool, width: u32, height: u32) -> Vec<Example> {
    paths
        .iter()
        .filter_map(|path| match image_to_input(path, width, height) {
            Ok(input) => Some(Example::new(path.display().to_string(), input, positive)),
            Err(e) => {
                warn!("skipping {}: {e}", path.display());
                None
            }
        })
        .collect()
}

/// Loads the `good_dir` (positive) and `bad_dir` (negative) images, shuffles
/// each category, and moves `holdout_per_category` of each into the holdout set.
pub fn load_corpus<P, Q, R>(
    good_dir: P,
    bad_dir: Q,
    width: u32,
    height: u32,
    holdout_per_category: usize,
    rng: &mut R,
) -> Result<Corpus>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    R: Rng + ?Sized,
{
    let mut corpus = Corpus::default();
    for (dir, positive) in [(good_dir.as_ref(), true), (bad_dir.as_ref(), false)] {
        let mut examples = load_examples(&list_images(dir)?, positive, width, height);
        if examples.len() <= holdout_per_category {
            return Err(Error::Config(format!(
                "{} holds {} usable images; need more than the {} held out",
                dir.display(),
                examples.len(),
                holdout_per_category
            )));
        }
        examples.shuffle(rng);
        let train = examples.split_off(holdout_per_category);
        info!(
            "{}: {} training, {} holdout images",
            dir.display(),
            train.len(),
            examples.len()
        );
        corpus.holdout.extend(examples);
        corpus.train.extend(train);
    }
    Ok(corpus)
}
