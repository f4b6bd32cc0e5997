#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use itertools::Itertools;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process;

use hierscreen::config::SimulationConfig;
use hierscreen::evaluate::evaluate_design_with_progress;
use hierscreen::io::{read_prevalences, read_statuses, save_classification};
use hierscreen::progress::{ScreenProgressObserver, ScreenProgressStage};
use hierscreen::{
    Design, DesignAccuracy, PrecomputedDesign, Status, simulate_given_outcomes, test_range,
};

#[derive(Parser)]
#[command(
    name = "hierscreen",
    version,
    about = "Evaluate hierarchical group testing designs under an imperfect assay."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Assay and simulation settings shared by every subcommand. Flags override
/// the values read from `--config`.
#[derive(Args)]
pub struct SettingsArgs {
    /// TOML file with simulation settings
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Assay sensitivity: P(positive result | defective pool)
    #[arg(long, value_name = "SE")]
    pub sensitivity: Option<f64>,

    /// Assay specificity: P(negative result | clean pool)
    #[arg(long, value_name = "SP")]
    pub specificity: Option<f64>,

    /// Base random seed
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Design file (.toml) produced by the optimizer
    pub design: PathBuf,

    /// Ordered prevalence vector, one value per line
    pub prevalences: PathBuf,

    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Number of Monte Carlo iterations
    #[arg(long, value_name = "M")]
    pub iterations: Option<usize>,

    /// Iterations per parallel task
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Worker threads (defaults to all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Stop starting new iterations after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub deadline_secs: Option<f64>,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Design file (.toml) produced by the optimizer for the actual assay
    pub design: PathBuf,

    /// Ordered prevalence vector, one value per line
    pub prevalences: PathBuf,

    /// True status vector of 0/1 values, one per line
    pub status: PathBuf,

    /// Replay the design optimized for a perfect assay instead
    #[arg(long, value_name = "PATH")]
    pub perfect_design: Option<PathBuf>,

    /// Write the per-individual classification to this TSV file
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Args)]
pub struct ProbeArgs {
    /// Status vector of 0/1 values, tested as a single pool
    pub status: PathBuf,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Estimate expected tests, sensitivity and specificity by Monte Carlo
    #[command(about = "Monte Carlo evaluation of a design")]
    Simulate(SimulateArgs),

    /// Screen a known status vector once with a design
    #[command(about = "Replay a design on a known status vector (optional output: classification TSV)")]
    Replay(ReplayArgs),

    /// Run a single pooled test over a status vector
    #[command(about = "Test a whole status vector as one pool")]
    Probe(ProbeArgs),

    /// Display version information
    #[command(about = "Display version information")]
    Version,
}

/// Renders Monte Carlo progress as a terminal progress bar.
struct ProgressBarObserver {
    pb: ProgressBar,
}

impl ProgressBarObserver {
    fn new() -> Self {
        Self {
            pb: create_progress_bar(0, ""),
        }
    }
}

impl ScreenProgressObserver for ProgressBarObserver {
    fn on_stage_start(&self, stage: ScreenProgressStage, total_iterations: usize) {
        self.pb.set_length(total_iterations as u64);
        self.pb.set_position(0);
        self.pb.set_message(stage.describe());
    }

    fn on_stage_advance(&self, _stage: ScreenProgressStage, completed_iterations: usize) {
        self.pb.inc(completed_iterations as u64);
    }

    fn on_stage_finish(&self, stage: ScreenProgressStage) {
        self.pb.finish_with_message(format!("{stage} done"));
    }
}

fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) = ProgressStyle::with_template(
        "\n> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(message.to_string());

    pb
}

/// Reads `--config` if given and applies the shared flag overrides.
fn load_settings(args: &SettingsArgs) -> Result<SimulationConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(se) = args.sensitivity {
        config.sensitivity = se;
    }
    if let Some(sp) = args.specificity {
        config.specificity = sp;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    Ok(config)
}

fn format_ratio(ratio: Option<f64>) -> String {
    ratio.map_or_else(|| "undefined".to_string(), |r| format!("{r:.6}"))
}

fn format_statuses(statuses: &[Status]) -> String {
    statuses.iter().map(|s| s.as_u8()).join("")
}

fn load_design(path: &Path) -> Result<Design, Box<dyn std::error::Error>> {
    let design = Design::load(path)?;
    log::info!(
        "Loaded design from {} ({} individuals, {} split entries).",
        path.display(),
        design.population_size(),
        design.splits.len()
    );
    Ok(design)
}

fn run_simulate(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_settings(&args.settings)?;
    if let Some(iterations) = args.iterations {
        config.iterations = iterations;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if args.threads.is_some() {
        config.threads = args.threads;
    }
    if args.deadline_secs.is_some() {
        config.deadline_secs = args.deadline_secs;
    }

    let assay = config.assay()?;
    let monte_carlo = config.monte_carlo()?;
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.thread_count())
        .build_global()?;

    let prevalences = read_prevalences(&args.prevalences)?;
    let optimizer = PrecomputedDesign::new(load_design(&args.design)?, assay);

    let progress = ProgressBarObserver::new();
    let evaluation =
        evaluate_design_with_progress(&optimizer, &prevalences, assay, &monte_carlo, &progress)?;

    println!("Individuals: {}", prevalences.len());
    println!(
        "Initial groups: {}",
        evaluation.design.initial_groups()?.len()
    );
    println!("Iterations: {}", evaluation.iterations);
    println!(
        "Expected tests (design): {:.6}",
        evaluation.design.expected_tests
    );
    println!(
        "Expected tests (simulated): {:.6}",
        evaluation.simulated_expected_tests
    );
    println!("Sensitivity: {}", format_ratio(evaluation.sensitivity));
    println!("Specificity: {}", format_ratio(evaluation.specificity));
    Ok(())
}

fn run_replay(args: ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_settings(&args.settings)?;
    let assay = config.assay()?;

    let prevalences = read_prevalences(&args.prevalences)?;
    let status = read_statuses(&args.status)?;
    let raw_status: Vec<u8> = status.iter().map(|s| s.as_u8()).collect();

    let mut optimizer = PrecomputedDesign::new(load_design(&args.design)?, assay);
    let design_accuracy = match &args.perfect_design {
        Some(path) => {
            optimizer = optimizer.with_perfect_assay_design(load_design(path)?);
            DesignAccuracy::Perfect
        }
        None => DesignAccuracy::Assay,
    };

    let mut rng = StdRng::seed_from_u64(config.seed);
    let report = simulate_given_outcomes(
        &optimizer,
        &raw_status,
        &prevalences,
        assay,
        design_accuracy,
        &mut rng,
    )?;

    println!("Truth:          {}", format_statuses(&status));
    println!("Classification: {}", format_statuses(&report.classification));
    println!("Tests used: {}", report.total_tests);
    println!("Expected tests (design): {:.6}", report.expected_tests);
    println!("Sensitivity: {:.6}", report.sensitivity);
    println!("Specificity: {:.6}", report.specificity);

    if let Some(out) = &args.out {
        save_classification(out, &status, &report.classification)?;
        println!("Classification written to {}", out.display());
    }
    Ok(())
}

fn run_probe(args: ProbeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_settings(&args.settings)?;
    let assay = config.assay()?;
    let status: Vec<u8> = read_statuses(&args.status)?
        .iter()
        .map(|s| s.as_u8())
        .collect();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let outcome = test_range(&status, assay, &mut rng)?;
    println!("{outcome}");
    Ok(())
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let release_tag = option_env!("HIERSCREEN_RELEASE_TAG");

    println!("hierscreen {version}");
    match release_tag {
        Some(tag) => println!("Release: {tag}"),
        None => println!("Release: development build"),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Simulate(args)) => run_simulate(args),
        Some(Commands::Replay(args)) => run_replay(args),
        Some(Commands::Probe(args)) => run_probe(args),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => Cli::command()
            .print_help()
            .map(|()| println!())
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error>),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
