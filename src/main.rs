//! Train and run a two-category image classifier.
//!
//! Usage:
//!   imgclass train --good images/good --bad images/bad --model detector.net
//!   imgclass classify --model detector.net shot1.png shot2.jpg
//!   imgclass evaluate --model detector.net --good images/good --bad images/bad
//!   imgclass inspect --model detector.net

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use imgclass_nn::data::corpus::{list_images, load_examples};
use imgclass_nn::data::image_input::{image_to_input, input_len};
use imgclass_nn::{
    classify, load_corpus, train_loop, EvaluationReport, Hyperparams, Network, NetworkConfig,
    Thresholds, Topology, TrainConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Two-category image classifier")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on a folder of positive and a folder of negative images
    Train(TrainArgs),
    /// Classify images with a saved network
    Classify {
        #[arg(short, long)]
        model: PathBuf,
        #[command(flatten)]
        image: ImageArgs,
        /// Image files to classify
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Score a saved network against labeled folders and print a JSON report
    Evaluate {
        #[arg(short, long)]
        model: PathBuf,
        #[arg(long)]
        good: PathBuf,
        #[arg(long)]
        bad: PathBuf,
        #[command(flatten)]
        image: ImageArgs,
    },
    /// Print the layer shapes and hyperparameters of a saved network
    Inspect {
        #[arg(short, long)]
        model: PathBuf,
    },
}

#[derive(Args, Debug, Clone, Copy)]
struct ImageArgs {
    /// Width images are resized to
    #[arg(long, default_value = "160")]
    width: u32,

    /// Height images are resized to
    #[arg(long, default_value = "90")]
    height: u32,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Folder of images that should score 1
    #[arg(long)]
    good: PathBuf,

    /// Folder of images that should score 0
    #[arg(long)]
    bad: PathBuf,

    /// Network file; written whenever the holdout error improves
    #[arg(short, long, default_value = "detector.net")]
    model: PathBuf,

    /// Continue training the network already stored at --model
    #[arg(long)]
    resume: bool,

    /// JSON file with topology and hyperparameters; --learning-rate and
    /// --weight-decay, when given, override its values
    #[arg(long)]
    config: Option<String>,

    #[command(flatten)]
    image: ImageArgs,

    /// Number of hidden layers
    #[arg(long, default_value = "2")]
    hidden_layers: usize,

    /// Nodes per hidden layer
    #[arg(long, default_value = "30")]
    hidden_width: usize,

    /// Learning rate [default: 0.001, or the stored rate with --resume]
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Weight decay, 0 disables it [default: 0, or the stored value with --resume]
    #[arg(long)]
    weight_decay: Option<f64>,

    /// Images per category held out for evaluation
    #[arg(long, default_value = "30")]
    holdout: usize,

    /// Images sampled per training iteration
    #[arg(long, default_value = "10")]
    sample_size: usize,

    /// Iterations between evaluations
    #[arg(long, default_value = "100")]
    eval_every: usize,

    /// Stop after this many iterations (runs until interrupted otherwise)
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Seed for shuffling and sampling
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Train(args) => run_train(args),
        Command::Classify { model, image, images } => run_classify(&model, image, &images),
        Command::Evaluate { model, good, bad, image } => run_evaluate(&model, &good, &bad, image),
        Command::Inspect { model } => run_inspect(&model),
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let input_size = input_len(args.image.width, args.image.height);
    let config = network_config(&args, input_size)?;
    if config.topology.input_size != input_size {
        bail!(
            "config expects {} inputs but {}x{} images give {}",
            config.topology.input_size,
            args.image.width,
            args.image.height,
            input_size
        );
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let corpus = load_corpus(
        &args.good,
        &args.bad,
        args.image.width,
        args.image.height,
        args.holdout,
        &mut rng,
    )?;

    let mut network = if args.resume {
        let mut network = Network::load(&args.model)
            .with_context(|| format!("loading {}", args.model.display()))?;
        if network.input_size() != input_size {
            bail!(
                "{} expects {} inputs, images give {}",
                args.model.display(),
                network.input_size(),
                input_size
            );
        }
        apply_resume_overrides(&mut network, &args, &config.hyperparams)?;
        network
    } else {
        Network::with_rng(config.topology, config.hyperparams, &mut rng)?
    };
    info!(
        "learning rate {}, weight decay {}",
        network.output_layer().learning_rate(),
        network.output_layer().weight_decay()
    );

    // A resumed network only gets overwritten by something better than itself.
    let best_error = if args.resume && !corpus.holdout.is_empty() {
        let report = EvaluationReport::evaluate(&network, &corpus.holdout, Thresholds::REPORT)?;
        Some(report.mean_error)
    } else {
        None
    };

    let (tx, rx) = mpsc::channel();
    let train_config = TrainConfig {
        checkpoint: Some(args.model.clone()),
        best_error,
        progress_tx: Some(tx),
        ..TrainConfig::new(args.sample_size, args.eval_every, args.max_iterations)
    };

    info!(
        "training {:?} on {} images ({} held out)",
        network.layer_shapes(),
        corpus.train.len(),
        corpus.holdout.len()
    );

    // The worker owns the network while it trains; this thread only sees
    // copied progress values.
    let worker = thread::spawn(move || {
        train_loop(&mut network, &corpus.train, &corpus.holdout, &train_config, &mut rng)
    });

    println!("iteration\tholdout_error\tsample_error\tright\tuncertain\twrong");
    for progress in rx {
        let (right, uncertain, wrong) = progress
            .holdout
            .map(|r| (r.right, r.uncertain, r.wrong))
            .unwrap_or_default();
        println!(
            "{}\t{:.6}\t{:.6}\t{right}\t{uncertain}\t{wrong}",
            progress.iteration,
            progress.tracked_error(),
            progress.sample_error
        );
    }

    let outcome = worker
        .join()
        .map_err(|_| anyhow!("training thread panicked"))??;
    info!(
        "stopped after {} iterations, best error {:?}",
        outcome.iterations, outcome.best_error
    );
    Ok(())
}

/// Topology and hyperparameters from `--config` or the flags. Explicit
/// `--learning-rate` / `--weight-decay` win over the config file.
fn network_config(args: &TrainArgs, input_size: usize) -> Result<NetworkConfig> {
    let mut config = match args.config {
        Some(ref path) => {
            NetworkConfig::load_json(path).with_context(|| format!("reading {path}"))?
        }
        None => NetworkConfig {
            topology: Topology::new(input_size, 1, args.hidden_layers, args.hidden_width),
            hyperparams: Hyperparams::default(),
        },
    };
    if let Some(learning_rate) = args.learning_rate {
        config.hyperparams.learning_rate = learning_rate;
    }
    if let Some(weight_decay) = args.weight_decay {
        config.hyperparams.weight_decay = weight_decay;
    }
    Ok(config)
}

/// A resumed network keeps its stored rates unless a config file or an
/// explicit flag supplies new ones.
fn apply_resume_overrides(
    network: &mut Network,
    args: &TrainArgs,
    hyperparams: &Hyperparams,
) -> Result<()> {
    hyperparams.validate()?;
    if args.config.is_some() || args.learning_rate.is_some() {
        network.set_learning_rate(hyperparams.learning_rate);
    }
    if args.config.is_some() || args.weight_decay.is_some() {
        network.set_weight_decay(hyperparams.weight_decay);
    }
    Ok(())
}

fn run_classify(model: &Path, image: ImageArgs, images: &[PathBuf]) -> Result<()> {
    let network =
        Network::load(model).with_context(|| format!("loading {}", model.display()))?;
    for path in images {
        let input = image_to_input(path, image.width, image.height)?;
        let (score, verdict) = classify(&network, &input, Thresholds::DETECTOR)?;
        println!("{}\t{score:.4}\t{verdict}", path.display());
    }
    Ok(())
}

fn run_evaluate(model: &Path, good: &Path, bad: &Path, image: ImageArgs) -> Result<()> {
    let network =
        Network::load(model).with_context(|| format!("loading {}", model.display()))?;
    let (width, height) = (image.width, image.height);
    let mut examples = load_examples(&list_images(good)?, true, width, height);
    examples.extend(load_examples(&list_images(bad)?, false, width, height));
    let report = EvaluationReport::evaluate(&network, &examples, Thresholds::REPORT)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_inspect(model: &Path) -> Result<()> {
    let network =
        Network::load(model).with_context(|| format!("loading {}", model.display()))?;
    println!("inputs:  {}", network.input_size());
    println!("outputs: {}", network.output_size());
    for (i, layer) in network.layers().iter().enumerate() {
        println!(
            "layer {i}: {} x {} (learning rate {}, weight decay {})",
            layer.weights().rows(),
            layer.weights().cols(),
            layer.learning_rate(),
            layer.weight_decay()
        );
    }
    Ok(())
}
