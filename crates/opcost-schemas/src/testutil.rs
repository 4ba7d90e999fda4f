//! Shared proptest strategies for schema tests.

use std::collections::BTreeMap;

use proptest::collection::{btree_map, vec};
use proptest::prelude::*;

use crate::{
    BasicBlock, BasicBlockEntry, Function, FunctionEntry, OpcodeHistogram,
};

/// Strategy for generating identifier-like function names.
pub fn arb_name() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,19}"
}

/// Strategy for histogram fragments with opcodes inside `[0, alphabet)`.
pub fn arb_fragments(
    alphabet: i64,
) -> impl Strategy<Value = Vec<BTreeMap<i64, u64>>> {
    vec(btree_map(0..alphabet, 0..1_000u64, 1..3), 0..6)
}

/// Strategy for in-range histograms.
pub fn arb_histogram(alphabet: i64) -> impl Strategy<Value = OpcodeHistogram> {
    arb_fragments(alphabet).prop_map(OpcodeHistogram::new)
}

/// Strategy for training blocks carrying an integer-valued cycle cost.
///
/// Integer costs survive a text roundtrip without precision drift.
pub fn arb_training_block() -> impl Strategy<Value = BasicBlockEntry> {
    (
        proptest::option::of(0..u64::from(u32::MAX)),
        arb_histogram(68),
        (0..100_000u32).prop_map(f64::from),
    )
        .prop_map(|(id, histogram, cycles)| BasicBlockEntry {
            basic_block: BasicBlock {
                id,
                histogram,
                freq: None,
                cycles: Some(cycles),
            },
        })
}

/// Strategy for training functions with 0-4 blocks.
pub fn arb_training_function() -> impl Strategy<Value = FunctionEntry> {
    (arb_name(), vec(arb_training_block(), 0..4)).prop_map(
        |(name, basic_blocks)| FunctionEntry {
            function: Function {
                name,
                freq: None,
                basic_blocks,
            },
        },
    )
}
