//! Schema definitions for opcost input documents and model artifacts.
//!
//! This crate contains the data structures shared by every phase of the
//! opcost pipeline:
//!
//! - **Program documents**: the static `Module` description a client submits
//!   for estimation, and the `Instrumentation_data` training documents that
//!   carry measured cycle costs per basic block.
//! - **Runtime documents**: the dynamic `Runtime_data` profile that the merge
//!   phase joins onto training documents by function name.
//! - **Cost model artifacts**: the fitted feature projector, the cluster
//!   centroids and the per-cluster cost table.
//!
//! Why: merge, train and estimate must agree on one serialization contract,
//! so the types live here rather than in any single phase.

mod cost_model;
mod histogram;
mod program;
mod runtime;
#[cfg(test)]
mod testutil;

#[doc(inline)]
pub use cost_model::*;
#[doc(inline)]
pub use histogram::*;
#[doc(inline)]
pub use program::*;
#[doc(inline)]
pub use runtime::*;
