//! Program structure documents: modules, functions and basic blocks.
//!
//! Two document shapes share the same function/block nesting:
//!
//! - [`ModuleDocument`]: the structural description of a program to be
//!   estimated. Blocks carry a `Histogram` and an execution `Freq`.
//! - [`InstrumentationDocument`]: training data. Blocks carry `OpCodes` (the
//!   same histogram under the instrumentation pass's key), an upstream `ID`,
//!   and after merging a `Cycles` field with the measured average cost.
//!
//! The YAML keys are capitalized to match the upstream tools; the Rust field
//! names are not.

use serde::{Deserialize, Serialize};

use crate::OpcodeHistogram;

/// Top-level structural document submitted for estimation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleDocument {
    /// The program being described.
    #[serde(rename = "Module")]
    pub module: Module,
}

/// A program: the unit a client submits for cost estimation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Functions in document order. The key is required; an empty program
    /// is written as `Functions: []`.
    #[serde(rename = "Functions")]
    pub functions: Vec<FunctionEntry>,
}

impl Module {
    /// Iterates over the functions of the module.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().map(|entry| &entry.function)
    }
}

/// Top-level training document as written by the instrumentation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentationDocument {
    /// Instrumented functions in document order. The key is required so
    /// that a program or runtime document is never mistaken for empty
    /// training data.
    #[serde(rename = "Instrumentation_data")]
    pub functions: Vec<FunctionEntry>,
}

impl InstrumentationDocument {
    /// Iterates over the instrumented functions.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter().map(|entry| &entry.function)
    }

    /// Iterates mutably over the instrumented functions.
    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut Function> {
        self.functions.iter_mut().map(|entry| &mut entry.function)
    }
}

/// List wrapper: each list element is a single-key `Function:` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionEntry {
    /// The wrapped function.
    #[serde(rename = "Function")]
    pub function: Function,
}

/// A function and its basic blocks.
///
/// `name` is the join key with runtime profiling data. `freq` is the
/// estimated invocation count, required only for function-granularity
/// estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    /// Symbol name of the function.
    #[serde(rename = "Name")]
    pub name: String,

    /// Estimated invocation frequency of the whole function.
    #[serde(rename = "Freq", default, skip_serializing_if = "Option::is_none")]
    pub freq: Option<f64>,

    /// Basic blocks in document order. Order carries no meaning.
    #[serde(rename = "BasicBlocks", default)]
    pub basic_blocks: Vec<BasicBlockEntry>,
}

impl Function {
    /// Iterates over the function's basic blocks.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.basic_blocks.iter().map(|entry| &entry.basic_block)
    }

    /// Iterates mutably over the function's basic blocks.
    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut BasicBlock> {
        self.basic_blocks
            .iter_mut()
            .map(|entry| &mut entry.basic_block)
    }
}

/// List wrapper: each list element is a single-key `BasicBlock:` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlockEntry {
    /// The wrapped block.
    #[serde(rename = "BasicBlock")]
    pub basic_block: BasicBlock,
}

/// One straight-line basic block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    /// Upstream block identifier, carried through untouched.
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Instruction mix. Written as `OpCodes` by the instrumentation pass
    /// and as `Histogram` in structural documents; both are accepted.
    #[serde(rename = "OpCodes", alias = "Histogram")]
    pub histogram: OpcodeHistogram,

    /// Estimated execution frequency, required for block-granularity
    /// estimation.
    #[serde(rename = "Freq", default, skip_serializing_if = "Option::is_none")]
    pub freq: Option<f64>,

    /// Average dynamic cycle cost attached by the merge phase.
    #[serde(
        rename = "Cycles",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cycles: Option<f64>,
}

impl BasicBlock {
    /// Measured cycle cost, with an absent value read as zero.
    pub fn cycles_or_zero(&self) -> f64 {
        self.cycles.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use proptest::collection::vec;
    use proptest::prelude::*;

    use super::*;
    use crate::testutil::arb_training_function;

    const MODULE_YAML: &str = "\
Module:
  Functions:
    - Function:
        Name: main
        Freq: 1
        BasicBlocks:
          - BasicBlock:
              Histogram:
                - 12: 3
                - 31: 1
              Freq: 4
          - BasicBlock:
              Histogram: []
              Freq: 0.5
";

    const TRAINING_YAML: &str = "\
Instrumentation_data:
  - Function:
      Name: qsort
      BasicBlocks:
        - BasicBlock:
            ID: 94512
            OpCodes:
              - 2: 7
            Cycles: 120.5
        - BasicBlock:
            ID: 94513
            OpCodes:
              - 5: 1
";

    #[test]
    fn module_document_parses() {
        let doc: ModuleDocument = serde_yaml::from_str(MODULE_YAML).unwrap();
        let functions: Vec<_> = doc.module.functions().collect();
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "main");
        assert_eq!(functions[0].freq, Some(1.0));

        let blocks: Vec<_> = functions[0].blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].freq, Some(4.0));
        assert_eq!(blocks[0].histogram.fragments().len(), 2);
        assert_eq!(blocks[1].freq, Some(0.5));
        assert!(blocks[0].cycles.is_none());
    }

    #[test]
    fn training_document_parses_opcodes_key() {
        let doc: InstrumentationDocument =
            serde_yaml::from_str(TRAINING_YAML).unwrap();
        let function = doc.functions().next().unwrap();
        assert_eq!(function.name, "qsort");

        let blocks: Vec<_> = function.blocks().collect();
        assert_eq!(blocks[0].id, Some(94512));
        assert_eq!(blocks[0].cycles, Some(120.5));
        assert!((blocks[1].cycles_or_zero()).abs() < f64::EPSILON);
    }

    #[test]
    fn top_level_keys_are_required() {
        // A runtime profile or program is not a training document.
        let runtime = "Runtime_data:\n  Functions: []\n";
        assert!(serde_yaml::from_str::<InstrumentationDocument>(runtime).is_err());
        assert!(
            serde_yaml::from_str::<InstrumentationDocument>(MODULE_YAML).is_err()
        );
        assert!(
            serde_yaml::from_str::<ModuleDocument>("Module: {}\n").is_err()
        );

        let empty: InstrumentationDocument =
            serde_yaml::from_str("Instrumentation_data: []\n").unwrap();
        assert_eq!(empty.functions().count(), 0);
        let empty: ModuleDocument =
            serde_yaml::from_str("Module:\n  Functions: []\n").unwrap();
        assert_eq!(empty.module.functions().count(), 0);
    }

    #[test]
    fn function_without_name_is_rejected() {
        let yaml = "Module:\n  Functions:\n    - Function:\n        Freq: 1\n";
        assert!(serde_yaml::from_str::<ModuleDocument>(yaml).is_err());
    }

    #[test]
    fn block_without_histogram_is_rejected() {
        let yaml = "\
Module:
  Functions:
    - Function:
        Name: f
        BasicBlocks:
          - BasicBlock:
              Freq: 2
";
        assert!(serde_yaml::from_str::<ModuleDocument>(yaml).is_err());
    }

    /// Absent optional fields stay absent when the document is written back.
    #[test]
    fn optional_fields_are_not_invented() {
        let doc: InstrumentationDocument =
            serde_yaml::from_str(TRAINING_YAML).unwrap();
        let yaml = serde_yaml::to_string(&doc).unwrap();
        assert!(!yaml.contains("Freq"));
        assert_eq!(yaml.matches("Cycles").count(), 1);
    }

    proptest! {
        /// Training documents survive a YAML roundtrip.
        ///
        /// Why: the merge phase rewrites training documents and the training
        /// phase must read back exactly what was written.
        #[test]
        fn instrumentation_document_roundtrip(
            functions in vec(arb_training_function(), 0..4),
        ) {
            let doc = InstrumentationDocument { functions };
            let yaml = serde_yaml::to_string(&doc).expect("serialize");
            let parsed: InstrumentationDocument =
                serde_yaml::from_str(&yaml).expect("deserialize");
            prop_assert_eq!(parsed, doc);
        }
    }
}
