use std::sync::atomic::Ordering;
use std::time::Instant;

use log::info;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::data::corpus::Example;
use crate::error::{Error, Result};
use crate::eval::report::EvaluationReport;
use crate::eval::verdict::Thresholds;
use crate::network::network::Network;
use crate::train::checkpoint::{is_improvement, save_if_improved};
use crate::train::progress::TrainProgress;
use crate::train::train_config::TrainConfig;

/// Summary returned when `train_loop` stops.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    /// Iterations completed.
    pub iterations: usize,
    /// Best tracked error seen (or carried in through `TrainConfig::best_error`).
    pub best_error: Option<f64>,
    /// Most recent evaluation, if any ran.
    pub last_progress: Option<TrainProgress>,
}

/// Trains `network` on random samples of `train` until told to stop.
///
/// Every iteration draws `config.sample_size` distinct examples and runs
/// `Network::train_batch` on them with one round. Every `config.eval_every`
/// iterations it scores `holdout` (or the sample, when `holdout` is empty),
/// checkpoints on improvement, and emits a [`TrainProgress`].
///
/// # Termination
/// The loop ends when:
/// - `config.max_iterations` iterations have run,
/// - `config.stop_flag` is set to `true`, **or**
/// - the `progress_tx` receiver has been dropped.
///
/// # Errors
/// `Error::EmptyBatch` if `train` is empty or `sample_size == 0`;
/// `Error::Config` if `eval_every == 0`; shape and persistence errors from the
/// network propagate unchanged.
pub fn train_loop<R: Rng + ?Sized>(
    network: &mut Network,
    train: &[Example],
    holdout: &[Example],
    config: &TrainConfig,
    rng: &mut R,
) -> Result<TrainOutcome> {
    if train.is_empty() || config.sample_size == 0 {
        return Err(Error::EmptyBatch);
    }
    if config.eval_every == 0 {
        return Err(Error::Config("eval_every must be at least 1".into()));
    }

    let started = Instant::now();
    let mut outcome = TrainOutcome {
        iterations: 0,
        best_error: config.best_error,
        last_progress: None,
    };

    loop {
        if config.max_iterations.map_or(false, |max| outcome.iterations >= max) {
            break;
        }
        if stop_requested(config) {
            break;
        }

        let iteration = outcome.iterations;

        let (inputs, targets) = sample_batch(train, config.sample_size, rng);
        network.train_batch(&inputs, &targets, 1)?;
        outcome.iterations += 1;

        if iteration % config.eval_every != 0 {
            continue;
        }

        let progress = evaluate(
            network,
            &inputs,
            &targets,
            holdout,
            iteration,
            &mut outcome,
            config,
            started,
        )?;
        info!(
            "iteration {}: tracked error {:.6}, sample error {:.6}{}",
            progress.iteration,
            progress.tracked_error(),
            progress.sample_error,
            if progress.improved { " (new best)" } else { "" }
        );
        outcome.last_progress = Some(progress.clone());

        if let Some(ref tx) = config.progress_tx {
            // If the receiver has been dropped, stop training.
            if tx.send(progress).is_err() {
                break;
            }
        }
    }

    Ok(outcome)
}

fn stop_requested(config: &TrainConfig) -> bool {
    config
        .stop_flag
        .as_ref()
        .map_or(false, |flag| flag.load(Ordering::Relaxed))
}

/// Draws up to `size` distinct examples and splits them into inputs / targets.
fn sample_batch<R: Rng + ?Sized>(
    train: &[Example],
    size: usize,
    rng: &mut R,
) -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
    train
        .choose_multiple(rng, size)
        .map(|example| (example.input.clone(), example.target()))
        .unzip()
}

#[allow(clippy::too_many_arguments)]
fn evaluate(
    network: &Network,
    inputs: &[Vec<f64>],
    targets: &[Vec<f64>],
    holdout: &[Example],
    iteration: usize,
    outcome: &mut TrainOutcome,
    config: &TrainConfig,
    started: Instant,
) -> Result<TrainProgress> {
    let sample_error = network.error_batch(inputs, targets)?;
    let holdout_report = if holdout.is_empty() {
        None
    } else {
        Some(EvaluationReport::evaluate(network, holdout, Thresholds::REPORT)?)
    };
    let tracked = holdout_report.map(|r| r.mean_error).unwrap_or(sample_error);

    let improved = is_improvement(tracked, outcome.best_error);
    outcome.best_error = match config.checkpoint {
        Some(ref path) => save_if_improved(network, path, tracked, outcome.best_error)?,
        None if improved => Some(tracked),
        None => outcome.best_error,
    };

    Ok(TrainProgress {
        iteration,
        holdout: holdout_report,
        sample_error,
        best_error: outcome.best_error,
        improved,
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::topology::{Hyperparams, Topology};
    use rand::{rngs::StdRng, SeedableRng};
    use std::sync::atomic::AtomicBool;
    use std::sync::{mpsc, Arc};

    fn toy_set() -> Vec<Example> {
        vec![
            Example::new("a", vec![1.0, 0.0], true),
            Example::new("b", vec![0.9, 0.1], true),
            Example::new("c", vec![0.0, 1.0], false),
            Example::new("d", vec![0.1, 0.9], false),
        ]
    }

    fn toy_network(seed: u64) -> Network {
        let hp = Hyperparams { learning_rate: 0.5, ..Hyperparams::default() };
        Network::with_rng(Topology::new(2, 1, 1, 4), hp, &mut StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn runs_requested_iterations_and_reports() {
        let mut net = toy_network(1);
        let (tx, rx) = mpsc::channel();
        let mut config = TrainConfig::new(2, 10, Some(50));
        config.progress_tx = Some(tx);

        let set = toy_set();
        let mut rng = StdRng::seed_from_u64(2);
        let outcome = train_loop(&mut net, &set, &set, &config, &mut rng).unwrap();
        drop(config);

        assert_eq!(outcome.iterations, 50);
        let reports: Vec<TrainProgress> = rx.iter().collect();
        let iterations: Vec<usize> = reports.iter().map(|p| p.iteration).collect();
        assert_eq!(iterations, vec![0, 10, 20, 30, 40]);
        assert!(reports[0].improved);
        assert!(reports.iter().all(|p| p.holdout.map(|r| r.total()) == Some(4)));
        let best = reports.iter().map(TrainProgress::tracked_error).fold(f64::INFINITY, f64::min);
        assert_eq!(outcome.best_error, Some(best));
    }

    #[test]
    fn training_reduces_holdout_error() {
        let mut net = toy_network(3);
        let set = toy_set();
        let before = EvaluationReport::evaluate(&net, &set, Thresholds::REPORT).unwrap().mean_error;
        let config = TrainConfig::new(4, 100, Some(2000));
        train_loop(&mut net, &set, &set, &config, &mut StdRng::seed_from_u64(4)).unwrap();
        let after = EvaluationReport::evaluate(&net, &set, Thresholds::REPORT).unwrap().mean_error;
        assert!(after < before, "{after} !< {before}");
    }

    #[test]
    fn stop_flag_halts_before_first_iteration() {
        let mut net = toy_network(1);
        let before = net.clone();
        let mut config = TrainConfig::new(2, 1, None);
        config.stop_flag = Some(Arc::new(AtomicBool::new(true)));
        let set = toy_set();
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = train_loop(&mut net, &set, &[], &config, &mut rng).unwrap();
        assert_eq!(outcome.iterations, 0);
        assert_eq!(net, before);
    }

    #[test]
    fn dropped_receiver_stops_unbounded_loop() {
        let mut net = toy_network(1);
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut config = TrainConfig::new(2, 5, None);
        config.progress_tx = Some(tx);
        let set = toy_set();
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = train_loop(&mut net, &set, &[], &config, &mut rng).unwrap();
        // Iteration 0 is evaluated and its send fails.
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.last_progress.unwrap().holdout.is_none());
    }

    #[test]
    fn checkpoints_only_improvements() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("best.net");
        let mut net = toy_network(5);
        let mut config = TrainConfig::new(4, 1, Some(3));
        config.checkpoint = Some(path.clone());
        config.best_error = Some(0.0);

        let set = toy_set();
        let mut rng = StdRng::seed_from_u64(6);
        let outcome = train_loop(&mut net, &set, &set, &config, &mut rng).unwrap();
        assert_eq!(outcome.best_error, Some(0.0));
        assert!(!path.exists());

        config.best_error = None;
        train_loop(&mut net, &set, &set, &config, &mut StdRng::seed_from_u64(6)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn rejects_empty_inputs() {
        let mut net = toy_network(1);
        let config = TrainConfig::new(2, 1, Some(1));
        let mut rng = StdRng::seed_from_u64(0);
        let result = train_loop(&mut net, &[], &[], &config, &mut rng);
        assert!(matches!(result, Err(Error::EmptyBatch)));
        let config = TrainConfig::new(2, 0, Some(1));
        let result = train_loop(&mut net, &toy_set(), &[], &config, &mut rng);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
