//! Training and inference for the opcost cycle-cost model.
//!
//! Training turns merged instrumentation documents (basic blocks labeled
//! with measured cycles) into three artifacts: a feature projector, a set of
//! k-means centroids, and a per-cluster average cost table. Inference loads
//! those artifacts and prices each block or function of a program by the
//! average cost of the cluster its opcode vector falls into.
//!
//! ```no_run
//! use std::path::Path;
//! use opcost_model::{Granularity, TrainOptions, estimate, train};
//!
//! let options = TrainOptions {
//!     seed: Some(42),
//!     ..TrainOptions::default()
//! };
//! train::run(Path::new("train"), Path::new("model"), &options).unwrap();
//! let cost = estimate::run(
//!     Path::new("model"),
//!     Path::new("program.yaml"),
//!     Granularity::BasicBlock,
//! )
//! .unwrap();
//! println!("{}", cost.total);
//! ```

mod artifacts;
mod error;
pub mod estimate;
mod plot;
pub mod train;

#[doc(inline)]
pub use crate::artifacts::{
    ArtifactPaths, CLUSTERER_FILE, COST_TABLE_FILE, PROJECTOR_FILE,
    load_cost_model, save_cost_model,
};
#[doc(inline)]
pub use crate::error::ModelError;
#[doc(inline)]
pub use crate::estimate::{
    BatchEstimate, DocumentEstimate, Estimate, FunctionCost, estimate_file,
    estimate_many, estimate_module,
};
#[doc(inline)]
pub use crate::train::{
    PLOT_FILE, TrainOptions, TrainingExample, TrainingSet, TrainingSummary,
};

/// Unit at which a program is priced.
///
/// Why: per-block pricing follows each block's own frequency, while
/// per-function pricing sums a function's blocks first and can land the
/// function in a different cluster than any of its blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Granularity {
    /// Predict each basic block and weight it by the block `Freq`.
    #[default]
    BasicBlock,
    /// Predict each function from its summed blocks and weight it by the
    /// function `Freq`.
    Function,
}
