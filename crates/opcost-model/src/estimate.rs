//! Inference: predicts the total cycle cost of a program.
//!
//! Each prediction unit (a basic block, or a whole function whose block
//! vectors are summed first) is projected, assigned to its nearest centroid
//! and priced at that cluster's average cost. The unit's cost is that price
//! times its execution frequency, and the program total is the sum.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use opcost_schemas::{
    CostModel, Function, Module, ModuleDocument, OpcodeHistogram, OpcodeVector,
};
use tracing::{debug, debug_span, warn};

use crate::Granularity;
use crate::artifacts::load_cost_model;
use crate::error::ModelError;

/// Estimated cost attributed to one function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCost {
    /// Function name.
    pub name: String,
    /// Frequency-weighted cycles for the function.
    pub cost: f64,
}

/// Estimated cost of one program.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    /// Total frequency-weighted cycles.
    pub total: f64,
    /// Per-function contributions in document order.
    pub functions: Vec<FunctionCost>,
}

/// Estimate for one document of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEstimate {
    /// The target document.
    pub path: PathBuf,
    /// Its estimate.
    pub estimate: Estimate,
}

/// Result of [`estimate_many`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchEstimate {
    /// Documents estimated successfully, in input order.
    pub estimates: Vec<DocumentEstimate>,
    /// Documents skipped because they were missing or malformed.
    pub skipped: Vec<PathBuf>,
}

/// Estimates the total cost of `module`.
///
/// # Errors
///
/// Returns [`ModelError::is_malformed_input`] if a frequency required by
/// `granularity` is absent, negative or not finite.
pub fn estimate_module(
    model: &CostModel,
    module: &Module,
    granularity: Granularity,
) -> Result<Estimate, ModelError> {
    let mut functions = Vec::new();
    for function in module.functions() {
        let cost = match granularity {
            Granularity::BasicBlock => block_cost(model, function)?,
            Granularity::Function => function_cost(model, function)?,
        };
        functions.push(FunctionCost {
            name: function.name.clone(),
            cost,
        });
    }
    let total = functions.iter().map(|f| f.cost).sum();
    Ok(Estimate { total, functions })
}

fn block_cost(model: &CostModel, function: &Function) -> Result<f64, ModelError> {
    let mut cost = 0.0;
    for (index, block) in function.blocks().enumerate() {
        let freq = frequency(block.freq).ok_or_else(|| {
            ModelError::malformed(
                None,
                format!(
                    "block {index} of function `{}` needs a non-negative Freq",
                    function.name
                ),
            )
        })?;
        let vector = block_vector(model, function, &block.histogram);
        cost += model.predict(&vector).cost * freq;
    }
    Ok(cost)
}

fn function_cost(
    model: &CostModel,
    function: &Function,
) -> Result<f64, ModelError> {
    let freq = frequency(function.freq).ok_or_else(|| {
        ModelError::malformed(
            None,
            format!("function `{}` needs a non-negative Freq", function.name),
        )
    })?;
    let mut summed = OpcodeVector::zeros(model.alphabet());
    for block in function.blocks() {
        summed += &block_vector(model, function, &block.histogram);
    }
    Ok(model.predict(&summed).cost * freq)
}

fn frequency(freq: Option<f64>) -> Option<f64> {
    freq.filter(|f| f.is_finite() && *f >= 0.0)
}

fn block_vector(
    model: &CostModel,
    function: &Function,
    histogram: &OpcodeHistogram,
) -> OpcodeVector {
    let (vector, dropped) = histogram.to_vector_lossy(model.alphabet());
    for err in &dropped {
        warn!(function = %function.name, %err, "dropping opcode");
    }
    vector
}

/// Reads the program at `target` and estimates it with `model`.
///
/// # Errors
///
/// Returns [`ModelError`] if `target` does not exist
/// ([`ModelError::is_missing_file`]), is not UTF-8, does not parse or lacks
/// a required field ([`ModelError::is_malformed_input`]), or cannot be read
/// ([`ModelError::is_io`]).
pub fn estimate_file(
    model: &CostModel,
    target: &Path,
    granularity: Granularity,
) -> Result<Estimate, ModelError> {
    if !target.exists() {
        return Err(ModelError::missing_file(target));
    }
    let text = fs::read_to_string(target).map_err(|err| {
        if err.kind() == io::ErrorKind::InvalidData {
            ModelError::malformed(Some(target), err.to_string())
        } else {
            err.into()
        }
    })?;
    let document: ModuleDocument = serde_yaml::from_str(&text)
        .map_err(|e| ModelError::malformed(Some(target), e.to_string()))?;
    let estimate = estimate_module(model, &document.module, granularity)
        .map_err(|e| e.in_document(target))?;
    for function in &estimate.functions {
        debug!(function = %function.name, cost = function.cost, "function estimate");
    }
    Ok(estimate)
}

/// Loads the model in `model_dir` and estimates the program at `target`.
///
/// The model is loaded before `target` is opened, so a missing artifact is
/// reported even when the target is missing too.
///
/// # Errors
///
/// Returns [`ModelError`] if:
/// - A model artifact is missing ([`ModelError::is_model_not_found`])
/// - The artifacts are unreadable or inconsistent
///   ([`ModelError::is_deserialization`], [`ModelError::is_invalid_artifact`])
/// - `target` is missing or malformed ([`ModelError::is_missing_file`],
///   [`ModelError::is_malformed_input`])
/// - Reading fails ([`ModelError::is_io`])
///
/// Why: a single entry point the CLI can call per estimation run.
pub fn run(
    model_dir: &Path,
    target: &Path,
    granularity: Granularity,
) -> Result<Estimate, ModelError> {
    let _span = debug_span!("estimate", target = %target.display()).entered();
    let model = load_cost_model(model_dir)?;
    estimate_file(&model, target, granularity)
}

/// Estimates several programs with one model.
///
/// Missing or malformed documents are logged and skipped; any other error
/// aborts the batch.
///
/// # Errors
///
/// Returns [`ModelError::is_io`] if a document exists but cannot be read.
pub fn estimate_many(
    model: &CostModel,
    targets: &[PathBuf],
    granularity: Granularity,
) -> Result<BatchEstimate, ModelError> {
    let mut batch = BatchEstimate::default();
    for target in targets {
        match estimate_file(model, target, granularity) {
            Ok(estimate) => batch.estimates.push(DocumentEstimate {
                path: target.clone(),
                estimate,
            }),
            Err(err) if err.is_missing_file() || err.is_malformed_input() => {
                warn!(path = %target.display(), %err, "skipping document");
                batch.skipped.push(target.clone());
            }
            Err(err) => return Err(err),
        }
    }
    Ok(batch)
}

/// Loads the model in `model_dir` and estimates every program in `targets`.
///
/// # Errors
///
/// Returns the model-loading errors of [`run`], and those of
/// [`estimate_many`].
pub fn run_many(
    model_dir: &Path,
    targets: &[PathBuf],
    granularity: Granularity,
) -> Result<BatchEstimate, ModelError> {
    let _span = debug_span!("estimate_many", targets = targets.len()).entered();
    let model = load_cost_model(model_dir)?;
    estimate_many(&model, targets, granularity)
}
