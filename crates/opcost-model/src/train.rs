//! Training: labeled blocks in, cost-model artifacts out.
//!
//! The pipeline is one-shot and all-or-nothing:
//!
//! 1. Collect every block with a positive `Cycles` value from the training
//!    directory into [`TrainingExample`]s.
//! 2. Fit the projector on the raw opcode vectors (cycle costs unused).
//! 3. Fit k-means centroids on the projected vectors.
//! 4. Fold the examples into a per-cluster mean cost table.
//! 5. Encode every artifact in memory, then write them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use opcost_cluster::{KMeansParams, PcaParams, fit_kmeans, fit_pca};
use opcost_schemas::{
    ClusterCostTable, CostClusterer, CostModel, FeatureProjector,
    InstrumentationDocument, OpcodeAlphabet, OpcodeVector,
};
use tracing::{debug, debug_span, info, warn};

use crate::Granularity;
use crate::artifacts::{self, ArtifactPaths};
use crate::error::{ModelError, ModelErrorKind};
use crate::plot;

/// File name of the optional cluster scatter plot.
pub const PLOT_FILE: &str = "clusters.svg";

/// Options for one training run.
///
/// Why: mirrors the CLI flags one-to-one, with defaults matching the
/// reference configuration (two components, fifty clusters).
#[derive(Debug, Clone)]
pub struct TrainOptions {
    /// Granularity the caller intends to estimate at. Training always
    /// learns from individual blocks; this is only recorded in the log.
    pub granularity: Granularity,
    /// Opcode alphabet the training histograms use.
    pub alphabet: OpcodeAlphabet,
    /// Number of principal components to keep.
    pub components: usize,
    /// Number of k-means clusters.
    pub clusters: usize,
    /// k-means seed. `None` draws one from the clock.
    pub seed: Option<u64>,
    /// Maximum Lloyd iterations.
    pub max_iterations: usize,
    /// Independent k-means seedings to try.
    pub restarts: usize,
    /// Also render `clusters.svg` next to the artifacts.
    pub plot: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        let kmeans = KMeansParams::default();
        Self {
            granularity: Granularity::default(),
            alphabet: OpcodeAlphabet::default(),
            components: PcaParams::default().components,
            clusters: kmeans.clusters,
            seed: None,
            max_iterations: kmeans.max_iterations,
            restarts: kmeans.restarts,
            plot: false,
        }
    }
}

impl TrainOptions {
    fn validate(&self) -> Result<(), ModelError> {
        if self.components == 0 {
            return Err(ModelError::invalid_config(
                "at least one component is required",
            ));
        }
        if self.components > self.alphabet.size() {
            return Err(ModelError::invalid_config(format!(
                "{} components exceed the opcode alphabet of {}",
                self.components,
                self.alphabet.size()
            )));
        }
        if self.clusters == 0 {
            return Err(ModelError::invalid_config(
                "at least one cluster is required",
            ));
        }
        if self.max_iterations == 0 {
            return Err(ModelError::invalid_config(
                "at least one k-means iteration is required",
            ));
        }
        Ok(())
    }
}

/// One labeled basic block.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingExample {
    /// Summed opcode counts of the block.
    pub vector: OpcodeVector,
    /// Measured average cycle cost, always positive.
    pub cycles: f64,
}

/// Examples gathered from a set of training documents.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    /// Usable examples in document order.
    pub examples: Vec<TrainingExample>,
    /// Documents that parsed.
    pub documents_loaded: usize,
    /// Documents skipped because they did not parse.
    pub documents_skipped: usize,
    /// Blocks excluded for having no positive cycle cost.
    pub unlabeled_blocks: usize,
    /// Out-of-range opcode entries dropped from histograms.
    pub dropped_opcodes: usize,
}

impl TrainingSet {
    /// Adds the labeled blocks of one parsed document.
    pub fn add_document(
        &mut self,
        document: &InstrumentationDocument,
        alphabet: OpcodeAlphabet,
    ) {
        let collected = collect_examples(document, alphabet);
        self.examples.extend(collected.examples);
        self.unlabeled_blocks += collected.unlabeled_blocks;
        self.dropped_opcodes += collected.dropped_opcodes;
        self.documents_loaded += 1;
    }
}

/// Result of [`collect_examples`] for one document.
#[derive(Debug, Clone, Default)]
pub struct CollectedExamples {
    /// Blocks with a positive cycle cost.
    pub examples: Vec<TrainingExample>,
    /// Blocks with zero, absent, or non-finite cycle cost.
    pub unlabeled_blocks: usize,
    /// Out-of-range opcode entries dropped from histograms.
    pub dropped_opcodes: usize,
}

/// Turns every positively-labeled block of `document` into an example.
///
/// Out-of-range opcodes are dropped with a warning; the rest of the block
/// is kept. Blocks whose cycle cost is zero, absent, negative or not finite
/// are skipped.
pub fn collect_examples(
    document: &InstrumentationDocument,
    alphabet: OpcodeAlphabet,
) -> CollectedExamples {
    let mut collected = CollectedExamples::default();
    for function in document.functions() {
        for block in function.blocks() {
            let cycles = match block.cycles {
                Some(c) if c.is_finite() && c > 0.0 => c,
                _ => {
                    collected.unlabeled_blocks += 1;
                    continue;
                }
            };
            let (vector, dropped) = block.histogram.to_vector_lossy(alphabet);
            for err in &dropped {
                warn!(function = %function.name, block = ?block.id, %err, "dropping opcode");
            }
            collected.dropped_opcodes += dropped.len();
            collected.examples.push(TrainingExample { vector, cycles });
        }
    }
    collected
}

/// Loads every `*.yaml`/`*.yml` document directly under `dir`.
///
/// Files are visited in path order so the example order, and with it a
/// seeded fit, is reproducible. Documents that are not UTF-8, fail to parse,
/// or lack the `Instrumentation_data` key are logged and skipped.
///
/// # Errors
///
/// Returns [`ModelError`] if `dir` does not exist
/// ([`ModelError::is_missing_file`]) or cannot be read
/// ([`ModelError::is_io`]).
pub fn load_training_set(
    dir: &Path,
    alphabet: OpcodeAlphabet,
) -> Result<TrainingSet, ModelError> {
    if !dir.exists() {
        return Err(ModelError::missing_file(dir));
    }

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if is_yaml && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut set = TrainingSet::default();
    for path in &paths {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                warn!(path = %path.display(), %err, "skipping undecodable training document");
                set.documents_skipped += 1;
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        match serde_yaml::from_str::<InstrumentationDocument>(&text) {
            Ok(document) => {
                set.add_document(&document, alphabet);
                debug!(path = %path.display(), examples = set.examples.len(), "loaded training document");
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping malformed training document");
                set.documents_skipped += 1;
            }
        }
    }
    Ok(set)
}

/// A fitted model plus the intermediate state needed for reporting.
#[derive(Debug, Clone)]
pub struct FittedModel {
    /// The validated cost model.
    pub model: CostModel,
    /// Projected coordinates of each training example.
    pub projected: Vec<Vec<f64>>,
    /// Cluster id of each training example.
    pub labels: Vec<usize>,
    /// k-means inertia in projected space.
    pub inertia: f64,
    /// Lloyd iterations performed.
    pub iterations: usize,
    /// Fraction of the training variance kept by the projection.
    pub explained_variance_ratio: f64,
    /// The k-means seed actually used.
    pub seed: u64,
}

/// Fits a cost model to `examples`.
///
/// # Errors
///
/// Returns [`ModelError`] if the options are invalid
/// ([`ModelError::is_invalid_config`]) or `examples` is empty
/// ([`ModelError::is_empty_training_set`]).
pub fn fit(
    examples: &[TrainingExample],
    options: &TrainOptions,
) -> Result<FittedModel, ModelError> {
    options.validate()?;
    if examples.is_empty() {
        return Err(ModelError::new(ModelErrorKind::EmptyTrainingSet));
    }
    if let Some(bad) = examples
        .iter()
        .position(|e| e.vector.len() != options.alphabet.size())
    {
        return Err(ModelError::invalid_config(format!(
            "example {bad} has {} opcodes, expected {}",
            examples[bad].vector.len(),
            options.alphabet.size()
        )));
    }

    let data: Vec<Vec<f64>> = examples
        .iter()
        .map(|e| e.vector.as_slice().to_vec())
        .collect();
    let pca = fit_pca(
        &data,
        &PcaParams {
            components: options.components,
            ..PcaParams::default()
        },
    )
    .ok_or_else(|| ModelError::invalid_config("projection fit rejected the data"))?;
    let explained_variance_ratio = pca.explained_variance_ratio();
    debug!(sweeps = pca.sweeps, explained_variance_ratio, "fitted projector");

    let projector = FeatureProjector {
        input_dim: options.alphabet,
        mean: pca.mean,
        components: pca.components,
        explained_variance: pca.explained_variance,
    };
    let projected: Vec<Vec<f64>> =
        data.iter().map(|row| projector.project_slice(row)).collect();

    let seed = options.seed.unwrap_or_else(|| {
        let seed = clock_seed();
        info!(seed, "no seed given, drew k-means seed from the clock");
        seed
    });
    let kmeans = fit_kmeans(
        &projected,
        &KMeansParams {
            clusters: options.clusters,
            max_iterations: options.max_iterations,
            restarts: options.restarts,
            seed,
            ..KMeansParams::default()
        },
    )
    .ok_or_else(|| ModelError::invalid_config("k-means rejected the data"))?;
    debug!(
        iterations = kmeans.iterations,
        inertia = kmeans.inertia,
        "fitted centroids"
    );

    let clusterer = CostClusterer::new(kmeans.centroids);
    // Label with the same rule inference uses, so the table describes
    // exactly the examples a prediction would group together.
    let labels: Vec<usize> =
        projected.iter().map(|p| clusterer.nearest(p)).collect();
    let table = cluster_cost_table(
        labels.iter().copied().zip(examples.iter().map(|e| e.cycles)),
        options.clusters,
    );

    let model = CostModel::new(projector, clusterer, table)
        .map_err(|e| ModelError::invalid_artifact(None, e.reason()))?;

    Ok(FittedModel {
        model,
        projected,
        labels,
        inertia: kmeans.inertia,
        iterations: kmeans.iterations,
        explained_variance_ratio,
        seed,
    })
}

/// Reduces `(cluster, cycles)` assignments to a per-cluster mean.
///
/// Clusters with no assignment get 0. Assignments to ids at or beyond
/// `clusters` are ignored.
pub fn cluster_cost_table(
    assignments: impl IntoIterator<Item = (usize, f64)>,
    clusters: usize,
) -> ClusterCostTable {
    let (sums, counts) = assignments.into_iter().fold(
        (vec![0.0; clusters], vec![0usize; clusters]),
        |(mut sums, mut counts), (cluster, cycles)| {
            if cluster < clusters {
                sums[cluster] += cycles;
                counts[cluster] += 1;
            }
            (sums, counts)
        },
    );

    #[expect(
        clippy::cast_precision_loss,
        reason = "cluster sizes stay far below 2^53"
    )]
    let costs = sums
        .into_iter()
        .zip(counts)
        .map(|(sum, count)| if count == 0 { 0.0 } else { sum / count as f64 })
        .collect();
    ClusterCostTable::new(costs)
}

/// Summary of one training run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    /// Examples the model was fitted on.
    pub examples: usize,
    /// Documents that parsed.
    pub documents_loaded: usize,
    /// Documents skipped as malformed.
    pub documents_skipped: usize,
    /// Blocks excluded for having no positive cycle cost.
    pub unlabeled_blocks: usize,
    /// Out-of-range opcode entries dropped.
    pub dropped_opcodes: usize,
    /// Clusters that received no example (cost 0).
    pub empty_clusters: usize,
    /// Lloyd iterations performed.
    pub iterations: usize,
    /// k-means inertia in projected space.
    pub inertia: f64,
    /// Fraction of the variance kept by the projection.
    pub explained_variance_ratio: f64,
    /// The k-means seed used.
    pub seed: u64,
    /// Where the artifacts were written.
    pub artifacts: ArtifactPaths,
    /// Where the scatter plot was written, if requested.
    pub plot: Option<PathBuf>,
}

/// Trains a cost model from `train_dir` and writes it to `output_dir`.
///
/// Nothing is written unless every step, including serialization and plot
/// rendering, succeeds.
///
/// # Errors
///
/// Returns [`ModelError`] if:
/// - The options are invalid ([`ModelError::is_invalid_config`])
/// - `train_dir` does not exist ([`ModelError::is_missing_file`])
/// - No usable example is found ([`ModelError::is_empty_training_set`])
/// - Encoding or rendering fails ([`ModelError::is_serialization`],
///   [`ModelError::is_render`])
/// - Reading or writing fails ([`ModelError::is_io`])
///
/// Why: a single entry point the CLI can call per training run.
pub fn run(
    train_dir: &Path,
    output_dir: &Path,
    options: &TrainOptions,
) -> Result<TrainingSummary, ModelError> {
    let _span = debug_span!("train", dir = %train_dir.display()).entered();
    options.validate()?;
    info!(
        granularity = ?options.granularity,
        "training on individual basic blocks"
    );

    let set = load_training_set(train_dir, options.alphabet)?;
    info!(
        examples = set.examples.len(),
        documents = set.documents_loaded,
        skipped = set.documents_skipped,
        "collected training examples"
    );

    let fitted = fit(&set.examples, options)?;

    // Encode everything before the first write.
    let encoded = artifacts::encode(&fitted.model)?;
    let svg = if options.plot {
        Some(plot::render(
            &fitted.projected,
            &fitted.labels,
            &fitted.model.clusterer().centroids,
        )?)
    } else {
        None
    };

    // The plot goes first: a loadable model is only left behind once the
    // whole run has succeeded.
    fs::create_dir_all(output_dir)?;
    let plot = match svg {
        Some(svg) => {
            let path = output_dir.join(PLOT_FILE);
            fs::write(&path, svg)?;
            Some(path)
        }
        None => None,
    };
    let artifacts = match artifacts::write_encoded(output_dir, &encoded) {
        Ok(paths) => paths,
        Err(err) => {
            if let Some(path) = &plot {
                let _ = fs::remove_file(path);
            }
            return Err(err);
        }
    };

    let mut populated = vec![false; options.clusters];
    for &label in &fitted.labels {
        populated[label] = true;
    }
    let empty_clusters = populated.iter().filter(|&&p| !p).count();
    let summary = TrainingSummary {
        examples: set.examples.len(),
        documents_loaded: set.documents_loaded,
        documents_skipped: set.documents_skipped,
        unlabeled_blocks: set.unlabeled_blocks,
        dropped_opcodes: set.dropped_opcodes,
        empty_clusters,
        iterations: fitted.iterations,
        inertia: fitted.inertia,
        explained_variance_ratio: fitted.explained_variance_ratio,
        seed: fitted.seed,
        artifacts,
        plot,
    };
    info!(
        examples = summary.examples,
        empty_clusters = summary.empty_clusters,
        seed = summary.seed,
        "trained cost model"
    );
    Ok(summary)
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() ^ u64::from(d.subsec_nanos()).rotate_left(32))
}
