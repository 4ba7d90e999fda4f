//! Opcode histograms and the dense count vectors built from them.
//!
//! Upstream instrumentation writes a basic block's instruction mix as a list
//! of fragments, each a small map from opcode index to count:
//!
//! ```yaml
//! OpCodes:
//!   - 12: 3
//!   - 31: 1
//!   - 12: 2
//! ```
//!
//! Fragments naming the same opcode are summed (the block above has five
//! occurrences of opcode 12). Opcode indices are only meaningful relative to
//! an [`OpcodeAlphabet`], the fixed number of distinct opcodes the upstream
//! encoding assigns.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Alphabet size of the upstream opcode enumeration.
pub const DEFAULT_ALPHABET_SIZE: usize = 68;

/// Number of distinct opcode indices a histogram may use.
///
/// Every histogram index must lie in `[0, size)`. The size is validated on
/// construction so that a zero-width alphabet can never reach the projector.
///
/// Why: the opcode alphabet ties histograms to one upstream enumeration;
/// making it an explicit value keeps that coupling visible and checkable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "usize", into = "usize")]
pub struct OpcodeAlphabet(usize);

impl OpcodeAlphabet {
    /// Creates an alphabet of `size` opcodes.
    ///
    /// # Errors
    ///
    /// Returns [`AlphabetError::Empty`] if `size` is zero.
    pub fn new(size: usize) -> Result<Self, AlphabetError> {
        if size == 0 {
            return Err(AlphabetError::Empty);
        }
        Ok(Self(size))
    }

    /// Returns the number of opcodes in the alphabet.
    pub fn size(self) -> usize {
        self.0
    }

    /// Returns the vector slot for `opcode`, or `None` if it is out of range.
    pub fn slot(self, opcode: i64) -> Option<usize> {
        usize::try_from(opcode).ok().filter(|&slot| slot < self.0)
    }
}

impl Default for OpcodeAlphabet {
    fn default() -> Self {
        Self(DEFAULT_ALPHABET_SIZE)
    }
}

impl TryFrom<usize> for OpcodeAlphabet {
    type Error = AlphabetError;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        Self::new(size)
    }
}

impl From<OpcodeAlphabet> for usize {
    fn from(alphabet: OpcodeAlphabet) -> Self {
        alphabet.0
    }
}

/// Invalid alphabet configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphabetError {
    /// The alphabet has no opcodes.
    Empty,
}

impl fmt::Display for AlphabetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlphabetError::Empty => {
                write!(f, "opcode alphabet must contain at least one opcode")
            }
        }
    }
}

impl std::error::Error for AlphabetError {}

/// A histogram entry that cannot be placed in a count vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistogramError {
    /// The opcode index lies outside `[0, alphabet_size)`.
    OutOfRange {
        /// The offending opcode index.
        opcode: i64,
        /// The count recorded for it.
        count: u64,
        /// Size of the alphabet the histogram was checked against.
        alphabet_size: usize,
    },
}

impl fmt::Display for HistogramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistogramError::OutOfRange {
                opcode,
                count,
                alphabet_size,
            } => write!(
                f,
                "opcode index {opcode} (count {count}) is out of bounds \
                 for an alphabet of {alphabet_size}"
            ),
        }
    }
}

impl std::error::Error for HistogramError {}

/// Instruction mix of one basic block, as a list of count fragments.
///
/// Serializes transparently as the YAML/JSON list of single-key maps that
/// the instrumentation pass emits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpcodeHistogram(Vec<BTreeMap<i64, u64>>);

impl OpcodeHistogram {
    /// Creates a histogram from raw fragments.
    pub fn new(fragments: Vec<BTreeMap<i64, u64>>) -> Self {
        Self(fragments)
    }

    /// Creates a histogram holding one single-entry fragment per pair.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i64, u64)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(opcode, count)| BTreeMap::from([(opcode, count)]))
                .collect(),
        )
    }

    /// Returns the fragments in document order.
    pub fn fragments(&self) -> &[BTreeMap<i64, u64>] {
        &self.0
    }

    /// Appends a fragment.
    pub fn push_fragment(&mut self, fragment: BTreeMap<i64, u64>) {
        self.0.push(fragment);
    }

    /// Iterates over every `(opcode, count)` entry across all fragments.
    pub fn entries(&self) -> impl Iterator<Item = (i64, u64)> + '_ {
        self.0
            .iter()
            .flat_map(|fragment| fragment.iter().map(|(&op, &n)| (op, n)))
    }

    /// Builds the dense count vector, rejecting out-of-range opcodes.
    ///
    /// # Errors
    ///
    /// Returns the first [`HistogramError::OutOfRange`] encountered.
    pub fn try_to_vector(
        &self,
        alphabet: OpcodeAlphabet,
    ) -> Result<OpcodeVector, HistogramError> {
        let (vector, dropped) = self.to_vector_lossy(alphabet);
        match dropped.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(vector),
        }
    }

    /// Builds the dense count vector, dropping out-of-range opcodes.
    ///
    /// The dropped entries are returned alongside the vector so the caller
    /// can report them; the vector itself is always usable.
    pub fn to_vector_lossy(
        &self,
        alphabet: OpcodeAlphabet,
    ) -> (OpcodeVector, Vec<HistogramError>) {
        let mut vector = OpcodeVector::zeros(alphabet);
        let mut dropped = Vec::new();
        for (opcode, count) in self.entries() {
            match alphabet.slot(opcode) {
                Some(slot) => vector.add_count(slot, count),
                None => dropped.push(HistogramError::OutOfRange {
                    opcode,
                    count,
                    alphabet_size: alphabet.size(),
                }),
            }
        }
        (vector, dropped)
    }
}

/// Dense opcode count vector of length `alphabet.size()`.
///
/// Counts are stored as `f64` because the vector feeds straight into the
/// projector; integer counts below 2^53 stay exact.
#[derive(Debug, Clone, PartialEq)]
pub struct OpcodeVector(Vec<f64>);

impl OpcodeVector {
    /// Returns an all-zero vector sized for `alphabet`.
    pub fn zeros(alphabet: OpcodeAlphabet) -> Self {
        Self(vec![0.0; alphabet.size()])
    }

    /// Returns the counts as a slice.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Consumes the vector, returning its counts.
    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Returns the vector length (the alphabet size).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the vector has no slots.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of instructions counted.
    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    #[expect(
        clippy::cast_precision_loss,
        reason = "opcode counts stay far below 2^53"
    )]
    fn add_count(&mut self, slot: usize, count: u64) {
        self.0[slot] += count as f64;
    }
}

impl AddAssign<&OpcodeVector> for OpcodeVector {
    /// Element-wise sum; both vectors must come from the same alphabet.
    fn add_assign(&mut self, rhs: &OpcodeVector) {
        debug_assert_eq!(self.0.len(), rhs.0.len(), "alphabet mismatch");
        for (lhs, rhs) in self.0.iter_mut().zip(&rhs.0) {
            *lhs += rhs;
        }
    }
}
