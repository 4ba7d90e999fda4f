//! Cost model artifacts: projector, centroids and per-cluster cost table.
//!
//! A trained [`CostModel`] predicts the cycle cost of one opcode vector in
//! three steps:
//!
//! ```text
//! projected = W (x - mean)                       FeatureProjector
//! cluster   = argmin_c |projected - centroid_c|  CostClusterer
//! cost      = table[cluster]                     ClusterCostTable
//! ```
//!
//! The three parts are persisted separately and reassembled with
//! [`CostModel::new`], which checks that their shapes agree. All three are
//! immutable once trained; inference only reads them.
//!
//! Why: the fitted state lives in the schema crate so training and
//! estimation share one definition of how a prediction is made.

use std::fmt;
use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};

use crate::{OpcodeAlphabet, OpcodeVector};

/// Header line of the cost table file.
const COST_TABLE_HEADER: &str = "cluster,cycles";

/// Affine dimensionality reduction fitted by principal component analysis.
///
/// Maps an `input_dim`-dimensional opcode vector onto
/// `components.len()` dimensions as `components · (x - mean)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureProjector {
    /// Size of the opcode alphabet the projector was fitted on.
    pub input_dim: OpcodeAlphabet,
    /// Per-opcode mean of the training vectors.
    pub mean: Vec<f64>,
    /// Principal axes, one row per output dimension, each of `input_dim`.
    pub components: Vec<Vec<f64>>,
    /// Variance of the training data along each principal axis.
    #[serde(default)]
    pub explained_variance: Vec<f64>,
}

impl FeatureProjector {
    /// Number of output dimensions.
    pub fn output_dim(&self) -> usize {
        self.components.len()
    }

    /// Alphabet that input vectors must be built with.
    pub fn alphabet(&self) -> OpcodeAlphabet {
        self.input_dim
    }

    /// Projects a raw count slice.
    ///
    /// The slice must have `input_dim` entries.
    pub fn project_slice(&self, input: &[f64]) -> Vec<f64> {
        debug_assert_eq!(input.len(), self.mean.len(), "input dimension");
        self.components
            .iter()
            .map(|axis| {
                axis.iter()
                    .zip(input.iter().zip(&self.mean))
                    .map(|(w, (x, m))| w * (x - m))
                    .sum()
            })
            .collect()
    }

    /// Projects an opcode vector built from this projector's alphabet.
    pub fn project(&self, vector: &OpcodeVector) -> Vec<f64> {
        self.project_slice(vector.as_slice())
    }

    fn validate(&self) -> Result<(), ArtifactError> {
        let k = self.input_dim.size();
        if self.mean.len() != k {
            return Err(ArtifactError::new(format!(
                "projector mean has {} entries, expected {k}",
                self.mean.len()
            )));
        }
        if self.components.is_empty() {
            return Err(ArtifactError::new("projector has no components"));
        }
        if let Some(bad) = self.components.iter().position(|c| c.len() != k) {
            return Err(ArtifactError::new(format!(
                "projector component {bad} has {} entries, expected {k}",
                self.components[bad].len()
            )));
        }
        Ok(())
    }
}

/// Fixed set of cluster centroids in projected space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostClusterer {
    /// Number of clusters; equals `centroids.len()`.
    pub cluster_count: usize,
    /// Centroid coordinates, indexed by cluster id.
    pub centroids: Vec<Vec<f64>>,
}

impl CostClusterer {
    /// Creates a clusterer from its centroids.
    pub fn new(centroids: Vec<Vec<f64>>) -> Self {
        Self {
            cluster_count: centroids.len(),
            centroids,
        }
    }

    /// Returns the id of the centroid nearest to `point`.
    ///
    /// Distance is squared Euclidean; on an exact tie the lowest cluster id
    /// wins. Returns 0 for a clusterer without centroids, which
    /// [`CostModel::new`] never admits.
    pub fn nearest(&self, point: &[f64]) -> usize {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (id, centroid) in self.centroids.iter().enumerate() {
            let distance = squared_distance(centroid, point);
            if distance < best_distance {
                best = id;
                best_distance = distance;
            }
        }
        best
    }

    /// Dimension of the centroids.
    pub fn dim(&self) -> usize {
        self.centroids.first().map_or(0, Vec::len)
    }

    fn validate(&self) -> Result<(), ArtifactError> {
        if self.centroids.is_empty() {
            return Err(ArtifactError::new("clusterer has no centroids"));
        }
        if self.cluster_count != self.centroids.len() {
            return Err(ArtifactError::new(format!(
                "clusterer declares {} clusters but stores {} centroids",
                self.cluster_count,
                self.centroids.len()
            )));
        }
        let dim = self.dim();
        if self.centroids.iter().any(|c| c.len() != dim) {
            return Err(ArtifactError::new(
                "clusterer centroids have inconsistent dimensions",
            ));
        }
        Ok(())
    }
}

/// Squared Euclidean distance between two points of equal dimension.
pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Average cycle cost per cluster id.
///
/// Clusters that received no training examples hold 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterCostTable {
    costs: Vec<f64>,
}

impl ClusterCostTable {
    /// Creates a table from per-cluster costs indexed by cluster id.
    pub fn new(costs: Vec<f64>) -> Self {
        Self { costs }
    }

    /// Cost of `cluster`, or 0 for an id outside the table.
    pub fn cost(&self, cluster: usize) -> f64 {
        self.costs.get(cluster).copied().unwrap_or(0.0)
    }

    /// Per-cluster costs indexed by cluster id.
    pub fn costs(&self) -> &[f64] {
        &self.costs
    }

    /// Number of clusters in the table.
    pub fn len(&self) -> usize {
        self.costs.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    /// Writes the table as a two-column `cluster,cycles` CSV.
    ///
    /// Costs use Rust's shortest round-trip float formatting so a reloaded
    /// table compares equal to the one written.
    ///
    /// # Errors
    ///
    /// Returns any error from the underlying writer.
    pub fn write_csv(&self, mut w: impl Write) -> std::io::Result<()> {
        writeln!(w, "{COST_TABLE_HEADER}")?;
        for (cluster, cycles) in self.costs.iter().enumerate() {
            writeln!(w, "{cluster},{cycles}")?;
        }
        Ok(())
    }

    /// Reads a table written by [`ClusterCostTable::write_csv`].
    ///
    /// Rows may appear in any order, but the ids must be exactly
    /// `0..rows`. A trailing blank line is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] on a missing header, malformed row, negative
    /// or non-finite cost, duplicate cluster id, or an id outside `0..rows`,
    /// and wraps I/O failures.
    pub fn read_csv(r: impl BufRead) -> Result<Self, ArtifactError> {
        let mut lines = r.lines();
        let header = lines
            .next()
            .transpose()
            .map_err(|e| ArtifactError::new(format!("read failed: {e}")))?
            .ok_or_else(|| ArtifactError::new("cost table is empty"))?;
        if header.trim() != COST_TABLE_HEADER {
            return Err(ArtifactError::new(format!(
                "unexpected cost table header `{}`",
                header.trim()
            )));
        }

        let mut rows: Vec<(usize, f64)> = Vec::new();
        for (line_no, line) in lines.enumerate() {
            let line = line
                .map_err(|e| ArtifactError::new(format!("read failed: {e}")))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            // Line numbers are 1-based and the header is line 1.
            let row = parse_cost_row(line).ok_or_else(|| {
                ArtifactError::new(format!(
                    "malformed cost table row {}: `{line}`",
                    line_no + 2
                ))
            })?;
            rows.push(row);
        }

        // Ids are bounded by the row count, so the table is never larger
        // than the file.
        let mut costs = vec![None; rows.len()];
        for (id, cycles) in rows {
            let Some(slot) = costs.get_mut(id) else {
                return Err(ArtifactError::new(format!(
                    "cluster {id} is out of range for a table of {} rows",
                    costs.len()
                )));
            };
            if slot.replace(cycles).is_some() {
                return Err(ArtifactError::new(format!(
                    "cluster {id} appears twice in cost table"
                )));
            }
        }
        Ok(Self {
            costs: costs.into_iter().map(|c| c.unwrap_or(0.0)).collect(),
        })
    }
}

fn parse_cost_row(line: &str) -> Option<(usize, f64)> {
    let (cluster, cycles) = line.split_once(',')?;
    let cluster = cluster.trim().parse().ok()?;
    let cycles: f64 = cycles.trim().parse().ok()?;
    (cycles.is_finite() && cycles >= 0.0).then_some((cluster, cycles))
}

/// The complete, validated cost model.
#[derive(Debug, Clone, PartialEq)]
pub struct CostModel {
    projector: FeatureProjector,
    clusterer: CostClusterer,
    table: ClusterCostTable,
}

/// A single prediction: which cluster a vector fell into and its cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Assigned cluster id.
    pub cluster: usize,
    /// Average cycle cost of that cluster.
    pub cost: f64,
}

impl CostModel {
    /// Assembles a model from its three artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError`] if any artifact is internally inconsistent,
    /// if the projector's output dimension differs from the centroid
    /// dimension, or if the cost table has more rows than there are
    /// clusters.
    pub fn new(
        projector: FeatureProjector,
        clusterer: CostClusterer,
        table: ClusterCostTable,
    ) -> Result<Self, ArtifactError> {
        projector.validate()?;
        clusterer.validate()?;
        if projector.output_dim() != clusterer.dim() {
            return Err(ArtifactError::new(format!(
                "projector emits {} dimensions but centroids have {}",
                projector.output_dim(),
                clusterer.dim()
            )));
        }
        if table.len() > clusterer.cluster_count {
            return Err(ArtifactError::new(format!(
                "cost table has {} rows for {} clusters",
                table.len(),
                clusterer.cluster_count
            )));
        }
        Ok(Self {
            projector,
            clusterer,
            table,
        })
    }

    /// Alphabet that input vectors must be built with.
    pub fn alphabet(&self) -> OpcodeAlphabet {
        self.projector.alphabet()
    }

    /// The fitted projector.
    pub fn projector(&self) -> &FeatureProjector {
        &self.projector
    }

    /// The fitted centroids.
    pub fn clusterer(&self) -> &CostClusterer {
        &self.clusterer
    }

    /// The per-cluster cost table.
    pub fn table(&self) -> &ClusterCostTable {
        &self.table
    }

    /// Predicts the cost of one opcode vector.
    pub fn predict(&self, vector: &OpcodeVector) -> Prediction {
        let projected = self.projector.project(vector);
        let cluster = self.clusterer.nearest(&projected);
        Prediction {
            cluster,
            cost: self.table.cost(cluster),
        }
    }
}

/// An artifact that is readable but inconsistent or malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactError {
    reason: String,
}

impl ArtifactError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Human-readable description of the inconsistency.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for ArtifactError {}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::OpcodeHistogram;
    use crate::testutil::arb_fragments;

    fn alphabet(size: usize) -> OpcodeAlphabet {
        OpcodeAlphabet::new(size).unwrap()
    }

    /// 3-opcode projector that keeps opcodes 0 and 1 and ignores opcode 2.
    fn axis_projector() -> FeatureProjector {
        FeatureProjector {
            input_dim: alphabet(3),
            mean: vec![0.0, 0.0, 0.0],
            components: vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
            explained_variance: vec![1.0, 1.0],
        }
    }

    #[test]
    fn projector_centers_then_rotates() {
        let projector = FeatureProjector {
            input_dim: alphabet(2),
            mean: vec![1.0, 2.0],
            components: vec![vec![0.6, 0.8]],
            explained_variance: vec![],
        };
        let projected = projector.project_slice(&[4.0, 6.0]);
        // 0.6 * 3 + 0.8 * 4 = 5
        assert_eq!(projected.len(), 1);
        assert!((projected[0] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn nearest_prefers_lowest_id_on_tie() {
        let clusterer =
            CostClusterer::new(vec![vec![-1.0, 0.0], vec![1.0, 0.0]]);
        assert_eq!(clusterer.nearest(&[0.0, 0.0]), 0);
        assert_eq!(clusterer.nearest(&[0.1, 0.0]), 1);
        assert_eq!(clusterer.nearest(&[-5.0, 3.0]), 0);
    }

    #[test]
    fn table_lookup_defaults_to_zero() {
        let table = ClusterCostTable::new(vec![10.0, 0.0]);
        assert!((table.cost(0) - 10.0).abs() < f64::EPSILON);
        assert!(table.cost(1).abs() < f64::EPSILON);
        assert!(table.cost(7).abs() < f64::EPSILON);
    }

    #[test]
    fn cost_table_csv_roundtrip_is_exact() {
        let table = ClusterCostTable::new(vec![0.1 + 0.2, 0.0, 1234.5678]);
        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.starts_with("cluster,cycles\n0,"));

        let parsed = ClusterCostTable::read_csv(buf.as_slice()).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn cost_table_reads_unordered_rows() {
        let csv = "cluster,cycles\n2,7.5\n0,1.00\n1,0\n\n";
        let parsed = ClusterCostTable::read_csv(csv.as_bytes()).unwrap();
        assert_eq!(parsed.costs(), &[1.0, 0.0, 7.5]);
    }

    #[test]
    fn cost_table_rejects_ids_outside_row_range() {
        for csv in [
            "cluster,cycles\n18446744073709551615,1\n",
            "cluster,cycles\n1000000000000,1\n",
            "cluster,cycles\n0,1\n2,1\n",
        ] {
            let err = ClusterCostTable::read_csv(csv.as_bytes()).unwrap_err();
            assert!(err.reason().contains("out of range"), "{csv}");
        }
    }

    #[test]
    fn cost_table_rejects_bad_input() {
        assert!(ClusterCostTable::read_csv("".as_bytes()).is_err());
        assert!(ClusterCostTable::read_csv("id,cost\n".as_bytes()).is_err());
        let bad_row = "cluster,cycles\n0;1\n";
        let err = ClusterCostTable::read_csv(bad_row.as_bytes()).unwrap_err();
        assert!(err.reason().contains("row 2"));
        let negative = "cluster,cycles\n0,-1\n";
        assert!(ClusterCostTable::read_csv(negative.as_bytes()).is_err());
        let duplicate = "cluster,cycles\n0,1\n0,2\n";
        assert!(ClusterCostTable::read_csv(duplicate.as_bytes()).is_err());
    }

    #[test]
    fn model_rejects_dimension_mismatch() {
        let clusterer = CostClusterer::new(vec![vec![0.0, 0.0, 0.0]]);
        let err = CostModel::new(
            axis_projector(),
            clusterer,
            ClusterCostTable::new(vec![1.0]),
        )
        .unwrap_err();
        assert!(err.reason().contains("dimensions"));
    }

    #[test]
    fn model_rejects_oversized_table() {
        let clusterer = CostClusterer::new(vec![vec![0.0, 0.0]]);
        let result = CostModel::new(
            axis_projector(),
            clusterer,
            ClusterCostTable::new(vec![1.0, 2.0]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn model_rejects_short_mean() {
        let mut projector = axis_projector();
        projector.mean.pop();
        let clusterer = CostClusterer::new(vec![vec![0.0, 0.0]]);
        let result =
            CostModel::new(projector, clusterer, ClusterCostTable::default());
        assert!(result.is_err());
    }

    #[test]
    fn predict_uses_nearest_cluster_cost() {
        let clusterer =
            CostClusterer::new(vec![vec![0.0, 0.0], vec![10.0, 10.0]]);
        let table = ClusterCostTable::new(vec![5.0, 80.0]);
        let model = CostModel::new(axis_projector(), clusterer, table).unwrap();

        let near_origin = OpcodeHistogram::from_pairs([(0, 1), (2, 40)])
            .try_to_vector(model.alphabet())
            .unwrap();
        let far = OpcodeHistogram::from_pairs([(0, 9), (1, 11)])
            .try_to_vector(model.alphabet())
            .unwrap();

        assert_eq!(
            model.predict(&near_origin),
            Prediction {
                cluster: 0,
                cost: 5.0
            }
        );
        assert_eq!(model.predict(&far).cluster, 1);
        // Same input, same answer.
        assert_eq!(model.predict(&far), model.predict(&far));
    }

    #[test]
    fn projector_json_roundtrip() {
        let projector = axis_projector();
        let json = serde_json::to_string(&projector).unwrap();
        let parsed: FeatureProjector = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, projector);
    }

    /// 8-opcode model with dyadic weights, so projections of integer
    /// counts are exact.
    fn mixing_model() -> CostModel {
        let projector = FeatureProjector {
            input_dim: alphabet(8),
            mean: vec![3.0, 1.0, 0.0, 2.0, 0.0, 5.0, 1.0, 0.0],
            components: vec![
                vec![0.5, -0.25, 0.0, 0.125, 0.5, 0.0, -0.5, 0.25],
                vec![0.0, 0.5, 0.5, -0.25, 0.0, 0.25, 0.0, -0.5],
            ],
            explained_variance: vec![2.0, 1.0],
        };
        let clusterer = CostClusterer::new(vec![
            vec![0.0, 0.0],
            vec![400.0, 0.0],
            vec![0.0, 400.0],
            vec![-400.0, -400.0],
        ]);
        let table = ClusterCostTable::new(vec![1.0, 10.0, 100.0, 1000.0]);
        CostModel::new(projector, clusterer, table).unwrap()
    }

    proptest! {
        /// Summing two blocks' vectors and pricing the sum gives the same
        /// projection and prediction as pricing one histogram holding both
        /// blocks' fragments.
        ///
        /// Why: function-granularity estimation sums block vectors before
        /// projecting.
        #[test]
        fn summed_fragments_project_and_predict_alike(
            a in arb_fragments(8),
            b in arb_fragments(8),
        ) {
            let model = mixing_model();
            let alphabet = model.alphabet();

            let vector_a = OpcodeHistogram::new(a.clone())
                .try_to_vector(alphabet)
                .unwrap();
            let vector_b = OpcodeHistogram::new(b.clone())
                .try_to_vector(alphabet)
                .unwrap();
            let mut summed = vector_a.clone();
            summed += &vector_b;

            let mut joined = a;
            joined.extend(b);
            let direct = OpcodeHistogram::new(joined)
                .try_to_vector(alphabet)
                .unwrap();

            let projector = model.projector();
            prop_assert_eq!(projector.project(&summed), projector.project(&direct));
            prop_assert_eq!(model.predict(&summed), model.predict(&direct));

            // The projection is affine: P(a + b) = P(a) + P(b) - P(0).
            let origin = projector.project(&OpcodeVector::zeros(alphabet));
            let pa = projector.project(&vector_a);
            let pb = projector.project(&vector_b);
            let expected: Vec<f64> = pa
                .iter()
                .zip(&pb)
                .zip(&origin)
                .map(|((x, y), o)| x + y - o)
                .collect();
            prop_assert_eq!(projector.project(&direct), expected);
        }
    }
}
