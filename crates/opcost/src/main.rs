use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use itertools::Itertools;
use mimalloc::MiMalloc;
use opcost_model::{Granularity, ModelError, TrainOptions, estimate, train};
use opcost_schemas::{DEFAULT_ALPHABET_SIZE, OpcodeAlphabet};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Estimate the cycle cost of compiled programs from the opcode histograms
/// of their basic blocks, using a model learned from profiled runs.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a cost model from merged instrumentation documents
    ///
    /// Reads every *.yaml/*.yml file in the training directory, fits a
    /// projection and k-means clustering over blocks with measured cycles,
    /// and writes projector.json, clusterer.json and
    /// average_cycles_per_cluster.csv to the output directory.
    Train {
        /// Directory of merged instrumentation documents
        #[arg(long)]
        train_dir: PathBuf,

        /// Directory the model artifacts are written to
        #[arg(long)]
        output_dir: PathBuf,

        /// The model will be used at function granularity (logged only)
        #[arg(long)]
        granularity_fun: bool,

        /// Number of principal components
        #[arg(long, default_value_t = 2)]
        components: usize,

        /// Number of k-means clusters
        #[arg(long, default_value_t = 50)]
        clusters: usize,

        /// Seed for k-means seeding; drawn from the clock if omitted
        #[arg(long)]
        seed: Option<u64>,

        /// Number of distinct opcodes in the histogram encoding
        #[arg(long, default_value_t = DEFAULT_ALPHABET_SIZE)]
        alphabet_size: usize,

        /// Also write a clusters.svg scatter plot
        #[arg(long)]
        plot: bool,
    },

    /// Estimate the total cycle cost of one or more programs
    ///
    /// Prints the estimate for a single target, or one `path: estimate`
    /// line per target. Unreadable targets in a batch are skipped.
    Estimate {
        /// Directory holding a trained model
        #[arg(long)]
        model_dir: PathBuf,

        /// Predict whole functions instead of individual basic blocks
        #[arg(long)]
        func: bool,

        /// Program documents to estimate
        #[arg(required = true)]
        targets: Vec<PathBuf>,
    },

    /// Label instrumentation histograms with runtime cycle averages
    Merge {
        /// Instrumentation document with per-block opcode histograms
        #[arg(long)]
        histogram_file: PathBuf,

        /// Runtime profile with per-function cycle averages
        #[arg(long)]
        analysis_file: PathBuf,

        /// Path of the merged document
        #[arg(long, visible_alias = "output-dir")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so results on stdout stay clean for piping.
    // Default to warn, allowlist our crates.
    const CRATES: &[&str] =
        &["opcost", "opcost_merge", "opcost_model", "opcost_schemas"];
    let level = cli.verbose.tracing_level_filter();
    let allowlist = CRATES.iter().map(|c| format!("{c}={level}")).join(",");
    let filter = EnvFilter::new(format!("warn,{allowlist}"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE)
        .init();

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Train {
            train_dir,
            output_dir,
            granularity_fun,
            components,
            clusters,
            seed,
            alphabet_size,
            plot,
        } => {
            let options = TrainOptions {
                granularity: granularity(granularity_fun),
                alphabet: OpcodeAlphabet::new(alphabet_size)
                    .context("invalid --alphabet-size")?,
                components,
                clusters,
                seed,
                plot,
                ..TrainOptions::default()
            };
            let summary = train::run(&train_dir, &output_dir, &options)
                .with_context(|| {
                    format!("training from {} failed", train_dir.display())
                })?;
            debug!(?summary, "training summary");
            for path in summary.artifacts.iter().chain(summary.plot.as_deref()) {
                writeln!(out, "{}", path.display())?;
            }
        }
        Commands::Estimate {
            model_dir,
            func,
            targets,
        } => {
            let granularity = granularity(func);
            if let [target] = targets.as_slice() {
                let estimate = estimate::run(&model_dir, target, granularity)
                    .map_err(|e| explain_model_error(e, &model_dir))?;
                writeln!(out, "{}", estimate.total)?;
            } else {
                let batch = estimate::run_many(&model_dir, &targets, granularity)
                    .map_err(|e| explain_model_error(e, &model_dir))?;
                for document in &batch.estimates {
                    writeln!(
                        out,
                        "{}: {}",
                        document.path.display(),
                        document.estimate.total
                    )?;
                }
            }
        }
        Commands::Merge {
            histogram_file,
            analysis_file,
            output,
        } => {
            opcost_merge::run(&histogram_file, &analysis_file, &output)
                .context("merging runtime cycles failed")?;
            writeln!(out, "{}", output.display())?;
        }
    }
    Ok(())
}

fn granularity(function: bool) -> Granularity {
    if function {
        Granularity::Function
    } else {
        Granularity::BasicBlock
    }
}

fn explain_model_error(err: ModelError, model_dir: &Path) -> anyhow::Error {
    if err.is_model_not_found() {
        let hint = format!(
            "no trained model in {}; run `opcost train` first",
            model_dir.display()
        );
        anyhow::Error::new(err).context(hint)
    } else {
        anyhow::Error::new(err).context("estimation failed")
    }
}
