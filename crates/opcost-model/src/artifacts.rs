//! Reading and writing the cost-model artifact set.
//!
//! A model directory holds three files:
//!
//! | File | Contents |
//! |---|---|
//! | `projector.json` | [`FeatureProjector`] |
//! | `clusterer.json` | [`CostClusterer`] |
//! | `average_cycles_per_cluster.csv` | [`ClusterCostTable`] |
//!
//! Saving encodes all three in memory before touching the filesystem, so a
//! serialization failure never leaves a partial model behind.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use opcost_schemas::{ClusterCostTable, CostClusterer, CostModel, FeatureProjector};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{ModelError, ModelErrorKind};

/// File name of the serialized feature projector.
pub const PROJECTOR_FILE: &str = "projector.json";
/// File name of the serialized cluster centroids.
pub const CLUSTERER_FILE: &str = "clusterer.json";
/// File name of the per-cluster cost table.
pub const COST_TABLE_FILE: &str = "average_cycles_per_cluster.csv";

/// Locations of the three artifacts inside one model directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Path of `projector.json`.
    pub projector: PathBuf,
    /// Path of `clusterer.json`.
    pub clusterer: PathBuf,
    /// Path of `average_cycles_per_cluster.csv`.
    pub cost_table: PathBuf,
}

impl ArtifactPaths {
    /// Artifact paths for the model stored in `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            projector: dir.join(PROJECTOR_FILE),
            clusterer: dir.join(CLUSTERER_FILE),
            cost_table: dir.join(COST_TABLE_FILE),
        }
    }

    /// Iterates over the three paths in a fixed order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        [&self.projector, &self.clusterer, &self.cost_table]
            .into_iter()
            .map(PathBuf::as_path)
    }

    /// Returns the first artifact that does not exist on disk.
    pub fn first_missing(&self) -> Option<&Path> {
        self.iter().find(|path| !path.is_file())
    }
}

/// A model serialized in memory, ready to be written.
#[derive(Debug, Clone)]
pub(crate) struct EncodedModel {
    projector: Vec<u8>,
    clusterer: Vec<u8>,
    cost_table: Vec<u8>,
}

/// Serializes all three artifacts without writing anything.
pub(crate) fn encode(model: &CostModel) -> Result<EncodedModel, ModelError> {
    let projector = to_json(model.projector())?;
    let clusterer = to_json(model.clusterer())?;
    let mut cost_table = Vec::new();
    model.table().write_csv(&mut cost_table)?;
    Ok(EncodedModel {
        projector,
        clusterer,
        cost_table,
    })
}

/// Writes an encoded model into `dir`, creating the directory if needed.
pub(crate) fn write_encoded(
    dir: &Path,
    encoded: &EncodedModel,
) -> Result<ArtifactPaths, ModelError> {
    fs::create_dir_all(dir)?;
    let paths = ArtifactPaths::in_dir(dir);
    fs::write(&paths.projector, &encoded.projector)?;
    fs::write(&paths.clusterer, &encoded.clusterer)?;
    fs::write(&paths.cost_table, &encoded.cost_table)?;
    debug!(dir = %dir.display(), "wrote model artifacts");
    Ok(paths)
}

/// Persists `model` into `dir`.
///
/// # Errors
///
/// Returns [`ModelError`] if serialization fails
/// ([`ModelError::is_serialization`]) or the directory or files cannot be
/// written ([`ModelError::is_io`]).
pub fn save_cost_model(
    model: &CostModel,
    dir: &Path,
) -> Result<ArtifactPaths, ModelError> {
    let encoded = encode(model)?;
    write_encoded(dir, &encoded)
}

/// Loads and validates the model stored in `dir`.
///
/// All three artifacts are checked for existence before any of them is
/// read.
///
/// # Errors
///
/// Returns [`ModelError`] if:
/// - Any artifact is missing ([`ModelError::is_model_not_found`])
/// - A JSON artifact does not parse ([`ModelError::is_deserialization`])
/// - The cost table is malformed or the artifacts disagree on dimensions
///   ([`ModelError::is_invalid_artifact`])
/// - Reading fails ([`ModelError::is_io`])
pub fn load_cost_model(dir: &Path) -> Result<CostModel, ModelError> {
    let paths = ArtifactPaths::in_dir(dir);
    if let Some(missing) = paths.first_missing() {
        return Err(ModelError::new(ModelErrorKind::ModelNotFound(
            missing.to_path_buf(),
        )));
    }

    let projector: FeatureProjector = read_json(&paths.projector)?;
    let clusterer: CostClusterer = read_json(&paths.clusterer)?;
    let table = ClusterCostTable::read_csv(BufReader::new(File::open(
        &paths.cost_table,
    )?))
    .map_err(|e| {
        ModelError::invalid_artifact(Some(&paths.cost_table), e.reason())
    })?;

    let model = CostModel::new(projector, clusterer, table)
        .map_err(|e| ModelError::invalid_artifact(Some(dir), e.reason()))?;
    debug!(
        dir = %dir.display(),
        alphabet = model.alphabet().size(),
        clusters = model.clusterer().cluster_count,
        "loaded cost model"
    );
    Ok(model)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|source| {
        ModelError::new(ModelErrorKind::Deserialization {
            path: path.to_path_buf(),
            source,
        })
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, ModelError> {
    let mut bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| ModelError::new(ModelErrorKind::Serialization(e)))?;
    bytes.push(b'\n');
    Ok(bytes)
}
