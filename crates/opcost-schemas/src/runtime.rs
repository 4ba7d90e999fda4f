//! Dynamic profiling documents produced by the cycle-counting runtime.
//!
//! The runtime records, per function and per instrumented block, how many
//! times the region ran and the total cycles it took. Only the function
//! `Name` and each block's `Average` are consumed downstream; the remaining
//! counters are kept so a parsed document can be inspected or rewritten.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level `Runtime_data` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeDocument {
    /// The recorded profile.
    #[serde(rename = "Runtime_data")]
    pub runtime: RuntimeData,
}

/// Profile body: which hardware counter was sampled, and per-function data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeData {
    /// Counter name, e.g. `PAPI_TOT_CYC`.
    #[serde(
        rename = "Instrumentation",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub instrumentation: Option<String>,

    /// Profiled functions.
    #[serde(rename = "Functions", default)]
    pub functions: Vec<RuntimeFunctionEntry>,
}

impl RuntimeData {
    /// Returns the average cycle count to attribute to each function.
    ///
    /// The profile is keyed per function: when a function lists several
    /// blocks, the block listed last determines its value, and a repeated
    /// function name is likewise overwritten by its last occurrence.
    /// Functions with no blocks contribute nothing.
    pub fn function_averages(&self) -> HashMap<&str, f64> {
        let mut averages = HashMap::new();
        for entry in &self.functions {
            let function = &entry.function;
            if let Some(last) = function.basic_blocks.last() {
                averages.insert(function.name.as_str(), last.basic_block.average);
            }
        }
        averages
    }
}

/// List wrapper: each list element is a single-key `Function:` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeFunctionEntry {
    /// The wrapped function profile.
    #[serde(rename = "Function")]
    pub function: RuntimeFunction,
}

/// Profile of one function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeFunction {
    /// Symbol name, matched against `Function.Name` in training documents.
    #[serde(rename = "Name")]
    pub name: String,

    /// Profiled regions of the function.
    #[serde(rename = "BasicBlocks", default)]
    pub basic_blocks: Vec<RuntimeBlockEntry>,
}

/// List wrapper: each list element is a single-key `BasicBlock:` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeBlockEntry {
    /// The wrapped block profile.
    #[serde(rename = "BasicBlock")]
    pub basic_block: RuntimeBlock,
}

/// Counters for one profiled region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeBlock {
    /// Upstream block identifier.
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Number of times the region ran.
    #[serde(rename = "Runs", default, skip_serializing_if = "Option::is_none")]
    pub runs: Option<u64>,

    /// Number of times counting was paused inside the region.
    #[serde(
        rename = "Pauses",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pauses: Option<u64>,

    /// Total cycles spent in the region.
    #[serde(
        rename = "Cycles",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cycles: Option<u64>,

    /// Average cycles per run.
    #[serde(rename = "Average")]
    pub average: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNTIME_YAML: &str = "\
Runtime_data:
  Instrumentation: PAPI_TOT_CYC
  Functions:
    - Function:
        Name: main
        BasicBlocks:
          - BasicBlock:
              ID: 1
              Runs: 10
              Pauses: 0
              Cycles: 1000
              Average: 100
          - BasicBlock:
              ID: 2
              Runs: 4
              Pauses: 1
              Cycles: 1000
              Average: 250
    - Function:
        Name: helper
        BasicBlocks:
          - BasicBlock:
              Average: 42.5
    - Function:
        Name: never_sampled
        BasicBlocks: []
";

    #[test]
    fn runtime_document_parses() {
        let doc: RuntimeDocument = serde_yaml::from_str(RUNTIME_YAML).unwrap();
        assert_eq!(
            doc.runtime.instrumentation.as_deref(),
            Some("PAPI_TOT_CYC")
        );
        assert_eq!(doc.runtime.functions.len(), 3);
        let first = &doc.runtime.functions[0].function.basic_blocks[0];
        assert_eq!(first.basic_block.runs, Some(10));
        assert_eq!(first.basic_block.cycles, Some(1000));
    }

    /// The last block listed for a function determines its average.
    #[test]
    fn function_average_takes_last_block() {
        let doc: RuntimeDocument = serde_yaml::from_str(RUNTIME_YAML).unwrap();
        let averages = doc.runtime.function_averages();
        assert_eq!(averages.get("main"), Some(&250.0));
        assert_eq!(averages.get("helper"), Some(&42.5));
    }

    #[test]
    fn function_without_blocks_has_no_average() {
        let doc: RuntimeDocument = serde_yaml::from_str(RUNTIME_YAML).unwrap();
        let averages = doc.runtime.function_averages();
        assert!(!averages.contains_key("never_sampled"));
        assert_eq!(averages.len(), 2);
    }

    #[test]
    fn block_without_average_is_rejected() {
        let yaml = "\
Runtime_data:
  Functions:
    - Function:
        Name: f
        BasicBlocks:
          - BasicBlock:
              Runs: 3
";
        assert!(serde_yaml::from_str::<RuntimeDocument>(yaml).is_err());
    }
}
