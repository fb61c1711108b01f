//! Boolean non-zero patterns.
//!
//! A pattern records *which* entries of a tensor may be non-zero, never the
//! values. Entries are linearized column-major (first index fastest), the
//! same order dense memory layouts use.

use crate::utils::errors::{
    CompositionError, CompositionErrorKind, InvariantError, InvariantErrorKind,
};
use serde::{Serialize, Deserialize};
use std::collections::HashMap;

/// Non-zero structure of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pattern {
    /// Every entry may be non-zero.
    Dense {
        /// Tensor shape
        shape: Vec<usize>,
    },
    /// Explicit mask over all entries.
    General {
        /// Tensor shape
        shape: Vec<usize>,
        /// Non-zero flag per entry, first index fastest
        mask: Vec<bool>,
    },
}

fn volume(shape: &[usize]) -> usize {
    shape.iter().product()
}

fn linear(shape: &[usize], entry: &[usize]) -> usize {
    let mut offset = 0;
    let mut stride = 1;
    for (&e, &n) in entry.iter().zip(shape) {
        offset += e * stride;
        stride *= n;
    }
    offset
}

fn unravel(shape: &[usize], mut offset: usize) -> Vec<usize> {
    shape
        .iter()
        .map(|&n| {
            let e = offset % n;
            offset /= n;
            e
        })
        .collect()
}

fn mismatch(message: impl Into<String>) -> InvariantError {
    InvariantError::new(InvariantErrorKind::PatternMismatch, message)
}

impl Pattern {
    /// Every entry non-zero.
    pub fn dense(shape: &[usize]) -> Self {
        Pattern::Dense { shape: shape.to_vec() }
    }

    /// Build a pattern from a full column-major mask.
    pub fn general(shape: &[usize], mask: Vec<bool>) -> Result<Self, CompositionError> {
        if mask.len() != volume(shape) {
            return Err(CompositionError::new(
                CompositionErrorKind::ShapeMismatch,
                format!("Mask of length {} does not fit shape {:?}", mask.len(), shape),
            ));
        }
        Ok(Pattern::General { shape: shape.to_vec(), mask })
    }

    /// Build a pattern from the list of non-zero multi-indices.
    pub fn from_entries(shape: &[usize], entries: &[Vec<usize>]) -> Result<Self, CompositionError> {
        let mut mask = vec![false; volume(shape)];
        for entry in entries {
            let in_range = entry.len() == shape.len()
                && entry.iter().zip(shape).all(|(&e, &n)| e < n);
            if !in_range {
                return Err(CompositionError::new(
                    CompositionErrorKind::ShapeMismatch,
                    format!("Entry {:?} lies outside shape {:?}", entry, shape),
                ));
            }
            mask[linear(shape, entry)] = true;
        }
        Ok(Pattern::General { shape: shape.to_vec(), mask })
    }

    /// Full tensor shape.
    pub fn shape(&self) -> &[usize] {
        match self {
            Pattern::Dense { shape } | Pattern::General { shape, .. } => shape,
        }
    }

    /// Whether the pattern is stored as fully dense.
    pub fn is_dense(&self) -> bool {
        matches!(self, Pattern::Dense { .. })
    }

    /// Number of non-zero entries.
    pub fn count_nonzero(&self) -> usize {
        match self {
            Pattern::Dense { shape } => volume(shape),
            Pattern::General { mask, .. } => mask.iter().filter(|&&nz| nz).count(),
        }
    }

    /// Whether `entry` may hold a non-zero; out-of-shape entries are zero.
    pub fn is_nonzero(&self, entry: &[usize]) -> bool {
        let shape = self.shape();
        if entry.len() != shape.len() || entry.iter().zip(shape).any(|(&e, &n)| e >= n) {
            return false;
        }
        match self {
            Pattern::Dense { .. } => true,
            Pattern::General { shape, mask } => mask[linear(shape, entry)],
        }
    }

    /// All non-zero multi-indices in column-major order.
    pub fn entries(&self) -> Vec<Vec<usize>> {
        match self {
            Pattern::Dense { shape } => (0..volume(shape)).map(|o| unravel(shape, o)).collect(),
            Pattern::General { shape, mask } => mask
                .iter()
                .enumerate()
                .filter(|&(_, &nz)| nz)
                .map(|(o, _)| unravel(shape, o))
                .collect(),
        }
    }

    /// Inclusive `(min, max)` of non-zero coordinates per dimension.
    ///
    /// `None` if the pattern has no non-zero entry.
    pub fn nnz_bounds(&self) -> Option<Vec<(usize, usize)>> {
        match self {
            Pattern::Dense { shape } => {
                if shape.contains(&0) {
                    return None;
                }
                Some(shape.iter().map(|&n| (0, n - 1)).collect())
            }
            Pattern::General { shape, .. } => {
                let mut bounds: Option<Vec<(usize, usize)>> = None;
                for entry in self.entries() {
                    let b = bounds.get_or_insert_with(|| vec![(usize::MAX, 0); shape.len()]);
                    for (dim, &e) in entry.iter().enumerate() {
                        b[dim].0 = b[dim].0.min(e);
                        b[dim].1 = b[dim].1.max(e);
                    }
                }
                bounds
            }
        }
    }

    fn mask(&self) -> Vec<bool> {
        match self {
            Pattern::Dense { shape } => vec![true; volume(shape)],
            Pattern::General { mask, .. } => mask.clone(),
        }
    }

    /// Pattern with dimension `i` taken from dimension `perm[i]`.
    pub fn transposed(&self, perm: &[usize]) -> Pattern {
        let shape: Vec<usize> = perm.iter().map(|&p| self.shape()[p]).collect();
        match self {
            Pattern::Dense { .. } => Pattern::Dense { shape },
            Pattern::General { .. } => {
                let mut mask = vec![false; volume(&shape)];
                for entry in self.entries() {
                    let permuted: Vec<usize> = perm.iter().map(|&p| entry[p]).collect();
                    mask[linear(&shape, &permuted)] = true;
                }
                Pattern::General { shape, mask }
            }
        }
    }
}

/// Element-wise union of two patterns of equal shape.
pub fn add(a: &Pattern, b: &Pattern) -> Result<Pattern, InvariantError> {
    if a.shape() != b.shape() {
        return Err(mismatch(format!(
            "Cannot add patterns of shape {:?} and {:?}",
            a.shape(),
            b.shape()
        )));
    }
    if a.is_dense() || b.is_dense() {
        return Ok(Pattern::dense(a.shape()));
    }
    let mask = a.mask().into_iter().zip(b.mask()).map(|(x, y)| x || y).collect();
    Ok(Pattern::General { shape: a.shape().to_vec(), mask })
}

struct Descriptor {
    left: Vec<char>,
    right: Vec<char>,
    output: Vec<char>,
}

fn parse_descriptor(descriptor: &str) -> Result<Descriptor, InvariantError> {
    let (inputs, output) = descriptor
        .split_once("->")
        .ok_or_else(|| mismatch(format!("Malformed einsum descriptor {}", descriptor)))?;
    let (left, right) = inputs
        .split_once(',')
        .ok_or_else(|| mismatch(format!("Einsum descriptor {} needs two operands", descriptor)))?;
    Ok(Descriptor {
        left: left.chars().collect(),
        right: right.chars().collect(),
        output: output.chars().collect(),
    })
}

/// Pattern of `out = sum(left * right)` for a descriptor like `ik,kj->ij`.
pub fn einsum(descriptor: &str, a: &Pattern, b: &Pattern) -> Result<Pattern, InvariantError> {
    let desc = parse_descriptor(descriptor)?;
    if desc.left.len() != a.shape().len() || desc.right.len() != b.shape().len() {
        return Err(mismatch(format!(
            "Descriptor {} does not fit operand shapes {:?} and {:?}",
            descriptor,
            a.shape(),
            b.shape()
        )));
    }

    let mut sizes: HashMap<char, usize> = HashMap::new();
    for (&c, &n) in desc.left.iter().zip(a.shape()).chain(desc.right.iter().zip(b.shape())) {
        if *sizes.entry(c).or_insert(n) != n {
            return Err(mismatch(format!("Index {} has inconsistent extents in {}", c, descriptor)));
        }
    }
    let out_shape = desc
        .output
        .iter()
        .map(|c| sizes.get(c).copied())
        .collect::<Option<Vec<usize>>>()
        .ok_or_else(|| mismatch(format!("Output of {} uses an unknown index", descriptor)))?;

    if a.is_dense() && b.is_dense() {
        return Ok(Pattern::Dense { shape: out_shape });
    }

    // (position in right, position in left) for every shared index
    let shared: Vec<(usize, usize)> = desc
        .right
        .iter()
        .enumerate()
        .filter_map(|(pr, c)| desc.left.iter().position(|l| l == c).map(|pl| (pr, pl)))
        .collect();
    let sources: Vec<(bool, usize)> = desc
        .output
        .iter()
        .map(|c| match desc.left.iter().position(|l| l == c) {
            Some(pl) => (true, pl),
            None => (false, desc.right.iter().position(|r| r == c).unwrap_or(0)),
        })
        .collect();

    let b_entries = b.entries();
    let mut mask = vec![false; volume(&out_shape)];
    for ea in a.entries() {
        for eb in &b_entries {
            if shared.iter().all(|&(pr, pl)| eb[pr] == ea[pl]) {
                let out: Vec<usize> = sources
                    .iter()
                    .map(|&(from_left, p)| if from_left { ea[p] } else { eb[p] })
                    .collect();
                mask[linear(&out_shape, &out)] = true;
            }
        }
    }
    Ok(Pattern::General { shape: out_shape, mask })
}

/// Sum out every index of `from` that is not in `to`.
pub fn reduce(from: &[char], to: &[char], a: &Pattern) -> Result<Pattern, InvariantError> {
    if from.len() != a.shape().len() {
        return Err(mismatch(format!(
            "Reduction source {:?} does not fit shape {:?}",
            from,
            a.shape()
        )));
    }
    let positions = to
        .iter()
        .map(|c| from.iter().position(|f| f == c))
        .collect::<Option<Vec<usize>>>()
        .ok_or_else(|| mismatch(format!("Cannot reduce {:?} to {:?}", from, to)))?;
    let shape: Vec<usize> = positions.iter().map(|&p| a.shape()[p]).collect();
    if a.is_dense() {
        return Ok(Pattern::Dense { shape });
    }
    let mut mask = vec![false; volume(&shape)];
    for entry in a.entries() {
        let out: Vec<usize> = positions.iter().map(|&p| entry[p]).collect();
        mask[linear(&shape, &out)] = true;
    }
    Ok(Pattern::General { shape, mask })
}
