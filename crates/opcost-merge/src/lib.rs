//! Labels opcode histograms with measured cycle costs.
//!
//! The instrumentation pass writes one document describing the opcode mix
//! of every basic block, and the profiling runtime writes another with the
//! average cycles spent per function. This crate joins the two by function
//! name into the labeled training document the cost model learns from:
//!
//! - every block of a profiled function gets that function's average;
//! - every block of a function the runtime never saw gets 0, which the
//!   training phase treats as unlabeled.
//!
//! Profiling granularity is per function, so all blocks of a function carry
//! the same value.

mod error;

use std::fs;
use std::path::Path;

use opcost_schemas::{InstrumentationDocument, RuntimeData, RuntimeDocument};
use serde::de::DeserializeOwned;
use tracing::{debug, debug_span, info};

#[doc(inline)]
pub use crate::error::MergeError;
use crate::error::MergeErrorKind;

/// Counts reported by a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Functions found in the runtime profile.
    pub matched_functions: usize,
    /// Functions the runtime profile does not mention.
    pub unmatched_functions: usize,
    /// Blocks that received a profiled (possibly zero) average.
    pub blocks_labeled: usize,
}

/// Attaches runtime averages to the blocks of `histograms`.
///
/// Pure: the input is left untouched and the merged document returned.
pub fn merge_cycles(
    histograms: &InstrumentationDocument,
    runtime: &RuntimeData,
) -> InstrumentationDocument {
    merge_with_stats(histograms, runtime).0
}

/// Like [`merge_cycles`], also returning what was matched.
pub fn merge_with_stats(
    histograms: &InstrumentationDocument,
    runtime: &RuntimeData,
) -> (InstrumentationDocument, MergeStats) {
    let averages = runtime.function_averages();
    let mut merged = histograms.clone();
    let mut stats = MergeStats::default();

    for function in merged.functions_mut() {
        let cycles = averages.get(function.name.as_str()).copied();
        match cycles {
            Some(_) => stats.matched_functions += 1,
            None => {
                debug!(function = %function.name, "function absent from runtime profile");
                stats.unmatched_functions += 1;
            }
        }
        for block in function.blocks_mut() {
            block.cycles = Some(cycles.unwrap_or(0.0));
            if cycles.is_some() {
                stats.blocks_labeled += 1;
            }
        }
    }
    (merged, stats)
}

/// Merges the files at `histogram_path` and `analysis_path` into `output`.
///
/// Both inputs are checked for existence before either is read, and the
/// merged document is fully serialized before `output` is created, so a
/// failure never leaves a partial output file.
///
/// # Errors
///
/// Returns [`MergeError`] if:
/// - Either input does not exist ([`MergeError::is_missing_file`])
/// - An input does not parse ([`MergeError::is_deserialization`])
/// - The result cannot be serialized ([`MergeError::is_serialization`])
/// - Reading or writing fails ([`MergeError::is_io`])
///
/// Why: a single file-driven entry point for the CLI.
pub fn run(
    histogram_path: &Path,
    analysis_path: &Path,
    output: &Path,
) -> Result<MergeStats, MergeError> {
    let _span = debug_span!("merge").entered();

    for path in [analysis_path, histogram_path] {
        if !path.is_file() {
            return Err(MergeError::new(MergeErrorKind::MissingFile(
                path.to_path_buf(),
            )));
        }
    }

    let histograms: InstrumentationDocument = read_yaml(histogram_path)?;
    let runtime: RuntimeDocument = read_yaml(analysis_path)?;
    let (merged, stats) = merge_with_stats(&histograms, &runtime.runtime);

    let yaml = serde_yaml::to_string(&merged)
        .map_err(|e| MergeError::new(MergeErrorKind::Serialization(e)))?;
    fs::write(output, yaml)?;

    info!(
        matched = stats.matched_functions,
        unmatched = stats.unmatched_functions,
        blocks = stats.blocks_labeled,
        output = %output.display(),
        "merged runtime cycles"
    );
    Ok(stats)
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, MergeError> {
    let text = fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|source| {
        MergeError::new(MergeErrorKind::Deserialization {
            path: path.to_path_buf(),
            source,
        })
    })
}

#[cfg(test)]
mod tests {
    use opcost_schemas::{
        BasicBlock, BasicBlockEntry, Function, FunctionEntry, OpcodeHistogram,
        RuntimeBlock, RuntimeBlockEntry, RuntimeFunction, RuntimeFunctionEntry,
    };

    use super::*;

    fn function(name: &str, blocks: usize) -> FunctionEntry {
        FunctionEntry {
            function: Function {
                name: name.to_owned(),
                freq: None,
                basic_blocks: (0..blocks)
                    .map(|i| BasicBlockEntry {
                        basic_block: BasicBlock {
                            id: Some(u64::try_from(i).unwrap()),
                            histogram: OpcodeHistogram::from_pairs([(1, 1)]),
                            ..BasicBlock::default()
                        },
                    })
                    .collect(),
            },
        }
    }

    fn profile(entries: &[(&str, Vec<f64>)]) -> RuntimeData {
        RuntimeData {
            instrumentation: Some("PAPI_TOT_CYC".to_owned()),
            functions: entries
                .iter()
                .map(|(name, averages)| RuntimeFunctionEntry {
                    function: RuntimeFunction {
                        name: (*name).to_owned(),
                        basic_blocks: averages
                            .iter()
                            .map(|&average| RuntimeBlockEntry {
                                basic_block: RuntimeBlock {
                                    id: None,
                                    runs: None,
                                    pauses: None,
                                    cycles: None,
                                    average,
                                },
                            })
                            .collect(),
                    },
                })
                .collect(),
        }
    }

    fn cycles(doc: &InstrumentationDocument) -> Vec<Vec<Option<f64>>> {
        doc.functions()
            .map(|f| f.blocks().map(|b| b.cycles).collect())
            .collect()
    }

    #[test]
    fn matched_blocks_share_the_function_average() {
        let histograms = InstrumentationDocument {
            functions: vec![function("main", 3), function("cold", 2)],
        };
        let runtime = profile(&[("main", vec![100.0, 250.0])]);

        let (merged, stats) = merge_with_stats(&histograms, &runtime);
        assert_eq!(
            cycles(&merged),
            vec![
                vec![Some(250.0), Some(250.0), Some(250.0)],
                vec![Some(0.0), Some(0.0)],
            ]
        );
        assert_eq!(
            stats,
            MergeStats {
                matched_functions: 1,
                unmatched_functions: 1,
                blocks_labeled: 3,
            }
        );
        // The input is untouched.
        assert!(
            histograms
                .functions()
                .all(|f| f.blocks().all(|b| b.cycles.is_none()))
        );
    }

    #[test]
    fn profiled_function_without_blocks_is_unmatched() {
        let histograms = InstrumentationDocument {
            functions: vec![function("idle", 1)],
        };
        let runtime = profile(&[("idle", vec![])]);
        let merged = merge_cycles(&histograms, &runtime);
        assert_eq!(cycles(&merged), vec![vec![Some(0.0)]]);
    }

    #[test]
    fn merge_keeps_block_ids_and_histograms() {
        let histograms = InstrumentationDocument {
            functions: vec![function("main", 2)],
        };
        let merged = merge_cycles(&histograms, &profile(&[("main", vec![7.0])]));
        let before = histograms.functions().next().unwrap();
        let after = merged.functions().next().unwrap();
        for (b, a) in before.blocks().zip(after.blocks()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.histogram, b.histogram);
        }
    }
}
