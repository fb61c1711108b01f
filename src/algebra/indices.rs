//! Named index sets with extents.
//!
//! An [`Indices`] value is the free-index signature of a tensor expression,
//! e.g. `ik` with shape `(3, 4)`. Index names are single characters, as in
//! einsum notation, and storage order matters: the first index is the
//! fastest-running dimension of a dense layout.

use crate::utils::errors::{CompositionError, CompositionErrorKind};
use serde::{Serialize, Deserialize};
use std::fmt;

/// A single named dimension label.
pub type Index = char;

/// An ordered sequence of unique index names, each with an extent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Indices {
    names: Vec<Index>,
    sizes: Vec<usize>,
}

impl Indices {
    /// Create an index set from a name string and a matching shape.
    pub fn new(names: &str, shape: &[usize]) -> Result<Self, CompositionError> {
        let names: Vec<Index> = names.chars().collect();
        if names.len() != shape.len() {
            return Err(CompositionError::new(
                CompositionErrorKind::IndexMismatch,
                format!(
                    "Indices {} do not match tensor shape {:?}",
                    names.iter().collect::<String>(),
                    shape
                ),
            ));
        }
        for (pos, name) in names.iter().enumerate() {
            if names[..pos].contains(name) {
                return Err(CompositionError::new(
                    CompositionErrorKind::IndexMismatch,
                    format!(
                        "Repeated indices are not allowed ({})",
                        names.iter().collect::<String>()
                    ),
                ));
            }
        }
        Ok(Self { names, sizes: shape.to_vec() })
    }

    /// The empty index set (a scalar).
    pub fn empty() -> Self {
        Self::default()
    }

    fn from_parts(names: Vec<Index>, sizes: Vec<usize>) -> Self {
        debug_assert_eq!(names.len(), sizes.len());
        Self { names, sizes }
    }

    /// Number of indices.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether this is the empty (scalar) signature.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate over index names in storage order.
    pub fn iter(&self) -> impl Iterator<Item = Index> + '_ {
        self.names.iter().copied()
    }

    /// Index names as a slice.
    pub fn names(&self) -> &[Index] {
        &self.names
    }

    /// Name at position `pos`.
    pub fn get(&self, pos: usize) -> Option<Index> {
        self.names.get(pos).copied()
    }

    /// Leading (fastest running) index.
    pub fn first(&self) -> Option<Index> {
        self.names.first().copied()
    }

    /// Whether `index` is one of the names.
    pub fn contains(&self, index: Index) -> bool {
        self.names.contains(&index)
    }

    /// Storage position of an index.
    pub fn find(&self, index: Index) -> Option<usize> {
        self.names.iter().position(|&n| n == index)
    }

    /// Sorted storage positions of all names in `other`.
    ///
    /// Returns `None` if any name of `other` is not part of `self`.
    pub fn positions(&self, other: &Indices) -> Option<Vec<usize>> {
        let mut pos = other
            .iter()
            .map(|idx| self.find(idx))
            .collect::<Option<Vec<_>>>()?;
        pos.sort_unstable();
        Some(pos)
    }

    /// Extent of a single index.
    pub fn size_of(&self, index: Index) -> Option<usize> {
        self.find(index).map(|pos| self.sizes[pos])
    }

    /// Extents in name order.
    pub fn shape(&self) -> &[usize] {
        &self.sizes
    }

    /// Extents of the given names, in the order given.
    pub fn sub_shape(&self, names: &[Index]) -> Option<Vec<usize>> {
        names.iter().map(|&n| self.size_of(n)).collect()
    }

    /// The sub-signature made of the given names, in the order given.
    pub fn extract(&self, names: &[Index]) -> Option<Indices> {
        let sizes = self.sub_shape(names)?;
        Some(Self::from_parts(names.to_vec(), sizes))
    }

    /// Names shared with `other`, in the order of `self`.
    pub fn intersection(&self, other: &Indices) -> Indices {
        self.filtered(|idx| other.contains(idx))
    }

    /// Names of `self` that do not appear in `other`.
    pub fn difference(&self, other: &Indices) -> Indices {
        self.filtered(|idx| !other.contains(idx))
    }

    /// `self` without a single name.
    pub fn without(&self, index: Index) -> Indices {
        self.filtered(|idx| idx != index)
    }

    fn filtered(&self, keep: impl Fn(Index) -> bool) -> Indices {
        let (names, sizes): (Vec<Index>, Vec<usize>) = self
            .names
            .iter()
            .zip(&self.sizes)
            .filter(|&(&n, _)| keep(n))
            .map(|(&n, &s)| (n, s))
            .unzip();
        Self::from_parts(names, sizes)
    }

    /// Concatenate `self` then the names of `other` not already present.
    pub fn merged(&self, other: &Indices) -> Indices {
        let mut merged = self.clone();
        for (&n, &s) in other.names.iter().zip(&other.sizes) {
            if !merged.contains(n) {
                merged.names.push(n);
                merged.sizes.push(s);
            }
        }
        merged
    }

    /// Same names, reordered as in `order`.
    pub fn permuted(&self, order: &Indices) -> Option<Indices> {
        if !self.same_names(order) {
            return None;
        }
        self.extract(order.names())
    }

    /// Permutation `p` such that `order[i] == self[p[i]]`.
    pub fn permutation_to(&self, order: &Indices) -> Option<Vec<usize>> {
        if !self.same_names(order) {
            return None;
        }
        order.iter().map(|idx| self.find(idx)).collect()
    }

    /// Whether both sets hold the same names, regardless of order.
    pub fn same_names(&self, other: &Indices) -> bool {
        self.len() == other.len() && self.iter().all(|idx| other.contains(idx))
    }

    /// Whether all names of `self` appear in `other` with the same extent.
    pub fn is_subset_of(&self, other: &Indices) -> bool {
        self.names
            .iter()
            .zip(&self.sizes)
            .all(|(&n, &s)| other.size_of(n) == Some(s))
    }

    /// Check that names shared with `other` have identical extents.
    pub fn check_compatible(&self, other: &Indices) -> Result<(), CompositionError> {
        let shared = self.intersection(other);
        if shared.sub_shape(shared.names()) != other.sub_shape(shared.names()) {
            return Err(CompositionError::new(
                CompositionErrorKind::ShapeMismatch,
                format!(
                    "Shared indices {} have different extents in {:?} and {:?}",
                    shared, self, other
                ),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Indices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in &self.names {
            write!(f, "{}", name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ind(names: &str, shape: &[usize]) -> Indices {
        Indices::new(names, shape).unwrap()
    }

    #[test]
    fn test_rejects_duplicates_and_bad_shapes() {
        assert!(Indices::new("ii", &[2, 2]).is_err());
        assert!(Indices::new("ij", &[2]).is_err());
        assert_eq!(ind("", &[]).len(), 0);
    }

    #[test]
    fn test_set_operations() {
        let a = ind("ikl", &[2, 3, 4]);
        let b = ind("kj", &[3, 5]);
        assert_eq!(a.intersection(&b).to_string(), "k");
        assert_eq!(a.difference(&b).to_string(), "il");
        assert_eq!(a.merged(&b).to_string(), "iklj");
        assert_eq!(a.merged(&b).shape(), &[2, 3, 4, 5]);
        assert_eq!(a.without('k').to_string(), "il");
    }

    #[test]
    fn test_positions_and_lookup() {
        let a = ind("ijk", &[2, 3, 4]);
        assert_eq!(a.find('k'), Some(2));
        assert_eq!(a.find('x'), None);
        assert_eq!(a.positions(&ind("ki", &[4, 2])), Some(vec![0, 2]));
        assert_eq!(a.sub_shape(&['k', 'i']), Some(vec![4, 2]));
    }

    #[test]
    fn test_permutation() {
        let a = ind("ijk", &[2, 3, 4]);
        let order = ind("kij", &[4, 2, 3]);
        assert_eq!(a.permuted(&order), Some(order.clone()));
        assert_eq!(a.permutation_to(&order), Some(vec![2, 0, 1]));
        assert!(a.permuted(&ind("ij", &[2, 3])).is_none());
    }

    #[test]
    fn test_compatibility() {
        let a = ind("ik", &[2, 3]);
        assert!(a.check_compatible(&ind("kj", &[3, 5])).is_ok());
        let err = a.check_compatible(&ind("kj", &[4, 5])).unwrap_err();
        assert_eq!(err.kind, CompositionErrorKind::ShapeMismatch);
    }
}
