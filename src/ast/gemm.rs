//! Parameters of a contraction mapped onto a GEMM primitive.

use crate::algebra::{Indices, LoGCost};
use crate::memory::DenseMemoryLayout;
use crate::utils::errors::{CompositionError, CompositionErrorKind};

/// (M, N, K) partition of a contraction plus per-operand transpose flags.
///
/// `C(M, N) = A(M, K) * B(K, N)`, with every remaining index of A, B or C
/// looped over outside the GEMM call. An empty N is a matrix-vector product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GemmParams {
    /// Rows of A and C
    pub m: Indices,
    /// Columns of B and C; empty for GEMV
    pub n: Indices,
    /// Summed indices shared by A and B
    pub k: Indices,
    /// A is stored K-major
    pub trans_a: bool,
    /// B is stored N-major
    pub trans_b: bool,
}

fn subset(part: &Indices, of: &Indices) -> bool {
    part.is_subset_of(of)
}

impl GemmParams {
    /// Validate a partition against the result and operand indices.
    pub fn new(
        indices: &Indices,
        a: &Indices,
        b: &Indices,
        m: Indices,
        n: Indices,
        k: Indices,
    ) -> Result<Self, CompositionError> {
        let (m0, k0) = match (m.first(), k.first()) {
            (Some(m0), Some(k0)) => (m0, k0),
            _ => {
                return Err(CompositionError::new(
                    CompositionErrorKind::IndexMismatch,
                    format!("GEMM partition needs non-empty M and K (M={}, K={})", m, k),
                ))
            }
        };
        let valid = subset(&m, a)
            && subset(&m, indices)
            && subset(&k, a)
            && subset(&k, b)
            && subset(&n, b)
            && subset(&n, indices)
            && !k.iter().any(|idx| indices.contains(idx))
            && !m.iter().any(|idx| b.contains(idx))
            && !n.iter().any(|idx| a.contains(idx));
        if !valid {
            return Err(CompositionError::new(
                CompositionErrorKind::IndexMismatch,
                format!(
                    "Partition M={} N={} K={} does not fit {} = {} * {}",
                    m, n, k, indices, a, b
                ),
            ));
        }
        let trans_a = a.find(m0) > a.find(k0);
        let trans_b = match n.first() {
            Some(n0) => b.find(k0) > b.find(n0),
            None => false,
        };
        Ok(Self { m, n, k, trans_a, trans_b })
    }

    /// Whether this is a matrix-vector product.
    pub fn is_gemv(&self) -> bool {
        self.n.is_empty()
    }

    /// Structural cost given the operand index orders.
    pub fn cost(&self, a: &Indices, b: &Indices) -> LoGCost {
        let a_lead = if self.trans_a { self.k.first() } else { self.m.first() };
        let b_lead = if self.trans_b { self.n.first() } else { self.k.first() };
        let a_stride_one = a_lead.and_then(|idx| a.find(idx)) == Some(0);
        let b_stride_one = b_lead.and_then(|idx| b.find(idx)) == Some(0);
        LoGCost::new(
            usize::from(!a_stride_one) + usize::from(!b_stride_one),
            usize::from(self.trans_a),
            usize::from(self.trans_b),
            self.m.len() + self.n.len() + self.k.len(),
        )
    }

    /// Indices looped over outside the GEMM call: result first, then A, then B.
    pub fn loop_indices(&self, indices: &Indices, a: &Indices, b: &Indices) -> Indices {
        let mn = self.m.merged(&self.n);
        let mk = self.m.merged(&self.k);
        let kn = self.k.merged(&self.n);
        let i1 = indices.difference(&mn);
        let i2 = a.difference(&mk).difference(&i1);
        let i3 = b.difference(&kn).difference(&i1).difference(&i2);
        i1.merged(&i2).merged(&i3)
    }

    /// Whether A can be addressed as an (M, K) matrix and B as (K, N).
    pub fn arguments_compatible(
        &self,
        a: &Indices,
        b: &Indices,
        a_layout: &DenseMemoryLayout,
        b_layout: &DenseMemoryLayout,
    ) -> bool {
        let fuses = |indices: &Indices, part: &Indices, layout: &DenseMemoryLayout| {
            indices
                .positions(part)
                .is_some_and(|pos| layout.may_fuse(&pos))
        };
        fuses(a, &self.m, a_layout)
            && fuses(a, &self.k, a_layout)
            && fuses(b, &self.k, b_layout)
            && fuses(b, &self.n, b_layout)
    }

    /// Whether the result can be addressed as an (M, N) matrix.
    pub fn result_compatible(&self, indices: &Indices, layout: &DenseMemoryLayout) -> bool {
        [&self.m, &self.n].iter().all(|part| {
            indices
                .positions(part)
                .is_some_and(|pos| layout.may_fuse(&pos))
        })
    }

    /// `C_{..} = A_{..} B_{..}` with fused groups in parentheses and loop
    /// indices in brackets.
    pub fn describe(&self, c: &Option<Indices>, a: &Option<Indices>, b: &Option<Indices>) -> String {
        let render = |name: &str, fused: [&Indices; 2], indices: &Option<Indices>, trans: bool| {
            match indices {
                Some(i) => index_string(name, &fused, i, trans),
                None => format!("{}_{{?}}", name),
            }
        };
        format!(
            "{} = {} {}",
            render("C", [&self.m, &self.n], c, false),
            render("A", [&self.m, &self.k], a, self.trans_a),
            render("B", [&self.k, &self.n], b, self.trans_b),
        )
    }
}

/// Render `indices` of operand `name`, grouping runs of fused indices.
pub fn index_string(name: &str, fused: &[&Indices], indices: &Indices, transpose: bool) -> String {
    let names = indices.names();
    let mut open = vec![false; names.len()];
    let mut close = vec![false; names.len()];
    let mut batched = vec![true; names.len()];
    for group in fused {
        for (pos, &c) in names.iter().enumerate() {
            if group.contains(c) {
                batched[pos] = false;
            }
        }
        let width = group.len();
        if width < 2 {
            continue;
        }
        let mut pos = 0;
        while pos + width <= names.len() {
            if names[pos..pos + width].iter().all(|&c| group.contains(c)) {
                open[pos] = true;
                close[pos + width - 1] = true;
                pos += width;
            } else {
                pos += 1;
            }
        }
    }
    let mut out = String::new();
    for (pos, &c) in names.iter().enumerate() {
        if open[pos] {
            out.push('(');
        }
        if batched[pos] {
            out.push('[');
            out.push(c);
            out.push(']');
        } else {
            out.push(c);
        }
        if close[pos] {
            out.push(')');
        }
    }
    format!("{}{}_{{{}}}", name, if transpose { "^T" } else { "" }, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ind(names: &str, shape: &[usize]) -> Indices {
        Indices::new(names, shape).unwrap()
    }

    #[test]
    fn test_plain_gemm() {
        let (c, a, b) = (ind("ij", &[4, 5]), ind("ik", &[4, 3]), ind("kj", &[3, 5]));
        let g = GemmParams::new(&c, &a, &b, ind("i", &[4]), ind("j", &[5]), ind("k", &[3])).unwrap();
        assert!(!g.trans_a && !g.trans_b && !g.is_gemv());
        assert_eq!(g.cost(&a, &b), LoGCost::new(0, 0, 0, 3));
        assert!(g.loop_indices(&c, &a, &b).is_empty());
    }

    #[test]
    fn test_transposed_operands() {
        let (c, a, b) = (ind("ij", &[4, 5]), ind("ki", &[3, 4]), ind("jk", &[5, 3]));
        let g = GemmParams::new(&c, &a, &b, ind("i", &[4]), ind("j", &[5]), ind("k", &[3])).unwrap();
        assert!(g.trans_a && g.trans_b);
        assert_eq!(g.cost(&a, &b), LoGCost::new(0, 1, 1, 3));
    }

    #[test]
    fn test_gemv_and_loops() {
        let (c, a, b) = (ind("il", &[4, 2]), ind("ikl", &[4, 3, 2]), ind("k", &[3]));
        let g = GemmParams::new(&c, &a, &b, ind("i", &[4]), Indices::empty(), ind("k", &[3])).unwrap();
        assert!(g.is_gemv() && !g.trans_b);
        assert_eq!(g.loop_indices(&c, &a, &b).to_string(), "l");
    }

    #[test]
    fn test_rejects_bad_partition() {
        let (c, a, b) = (ind("ij", &[4, 5]), ind("ik", &[4, 3]), ind("kj", &[3, 5]));
        assert!(GemmParams::new(&c, &a, &b, Indices::empty(), ind("j", &[5]), ind("k", &[3])).is_err());
        assert!(GemmParams::new(&c, &a, &b, ind("i", &[4]), ind("k", &[3]), ind("j", &[5])).is_err());
    }

    #[test]
    fn test_batch_index_cannot_be_fused() {
        let (c, a, b) = (ind("ilj", &[4, 2, 5]), ind("ilk", &[4, 2, 3]), ind("kjl", &[3, 5, 2]));
        let (k, n) = (ind("k", &[3]), ind("j", &[5]));
        let err = GemmParams::new(&c, &a, &b, ind("il", &[4, 2]), n.clone(), k.clone()).unwrap_err();
        assert_eq!(err.kind, CompositionErrorKind::IndexMismatch);
        let nl = ind("jl", &[5, 2]);
        assert!(GemmParams::new(&c, &a, &b, ind("i", &[4]), nl, k.clone()).is_err());

        let g = GemmParams::new(&c, &a, &b, ind("i", &[4]), n, k).unwrap();
        assert_eq!(g.loop_indices(&c, &a, &b).to_string(), "l");
    }

    #[test]
    fn test_layout_compatibility() {
        let (c, a, b) = (ind("ijl", &[4, 5, 2]), ind("ilk", &[4, 2, 3]), ind("kj", &[3, 5]));
        let g = GemmParams::new(&c, &a, &b, ind("i", &[4]), ind("j", &[5]), ind("k", &[3])).unwrap();
        let la = DenseMemoryLayout::new(a.shape());
        let lb = DenseMemoryLayout::new(b.shape());
        assert!(g.arguments_compatible(&a, &b, &la, &lb));
        assert!(g.result_compatible(&c, &DenseMemoryLayout::new(c.shape())));

        let fused = GemmParams::new(&c, &a, &b, ind("il", &[4, 2]), ind("j", &[5]), ind("k", &[3]));
        // l is a result index; as part of M it must be fusable in C as well
        let fused = fused.unwrap();
        assert!(!fused.result_compatible(&c, &DenseMemoryLayout::new(c.shape())));
    }

    #[test]
    fn test_index_string() {
        let fused_mk = [&ind("il", &[4, 2]), &ind("k", &[3])];
        assert_eq!(index_string("A", &fused_mk, &ind("ilk", &[4, 2, 3]), false), "A_{(il)k}");
        let fused = [&ind("i", &[4]), &ind("k", &[3])];
        assert_eq!(index_string("A", &fused, &ind("ikl", &[4, 3, 2]), true), "A^T_{ik[l]}");
    }
}
