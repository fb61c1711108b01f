//! Property tests for index algebra and sparsity propagation.

use proptest::prelude::*;
use std::collections::BTreeSet;
use tensorforge::ast::propagate_sparsity;
use tensorforge::prelude::*;

const NAMES: &str = "ijklmn";

fn extent(c: char) -> usize {
    (c as usize % 4) + 1
}

/// A shuffled subset of `NAMES` with fixed extents per name.
fn arb_indices() -> impl Strategy<Value = Indices> {
    proptest::sample::subsequence(NAMES.chars().collect::<Vec<_>>(), 0..=NAMES.len())
        .prop_shuffle()
        .prop_map(|names| {
            let shape: Vec<usize> = names.iter().map(|&c| extent(c)).collect();
            let names: String = names.into_iter().collect();
            Indices::new(&names, &shape).unwrap()
        })
}

fn arb_mask(len: usize) -> impl Strategy<Value = Vec<bool>> {
    proptest::collection::vec(any::<bool>(), len).prop_map(|mut mask| {
        mask[0] = true;
        mask
    })
}

fn sparse(name: &str, shape: &[usize], mask: Vec<bool>) -> TensorRef {
    let spp = Pattern::general(shape, mask).unwrap();
    Tensor::new(name, shape).unwrap().with_pattern(spp).unwrap().into_ref()
}

proptest! {
    /// Merging never duplicates a name and keeps operand order
    #[test]
    fn merge_is_duplicate_free(a in arb_indices(), b in arb_indices()) {
        let merged = a.merged(&b);
        let unique: BTreeSet<char> = merged.iter().collect();
        prop_assert_eq!(unique.len(), merged.len());
        prop_assert_eq!(&merged.names()[..a.len()], a.names());
        prop_assert!(b.iter().all(|idx| merged.contains(idx)));
        prop_assert_eq!(merged, a.merged(&b));
    }

    /// Intersection holds the same names whichever operand comes first
    #[test]
    fn intersection_is_symmetric_as_set(a in arb_indices(), b in arb_indices()) {
        let ab = a.intersection(&b);
        let ba = b.intersection(&a);
        prop_assert!(ab.same_names(&ba));
        prop_assert!(ab.iter().all(|idx| a.contains(idx) && b.contains(idx)));
    }

    /// Extents carried through merge match the operands
    #[test]
    fn merge_keeps_extents(a in arb_indices(), b in arb_indices()) {
        let merged = a.merged(&b);
        for idx in merged.iter() {
            prop_assert_eq!(merged.size_of(idx), Some(extent(idx)));
        }
    }

    /// Recomputing patterns on a propagated tree changes nothing
    #[test]
    fn sparsity_propagation_is_idempotent(
        mask_a in arb_mask(6),
        mask_b in arb_mask(6),
        mask_d in arb_mask(4),
    ) {
        let a = sparse("A", &[2, 3], mask_a);
        let b = sparse("B", &[3, 2], mask_b);
        let d = sparse("D", &[2, 2], mask_d);
        let c = Tensor::new("C", &[2, 2]).unwrap().into_ref();
        let stmt = Node::indexed(&c, "ij").unwrap().assign(
            Node::indexed(&a, "ik").unwrap()
                .times(Node::indexed(&b, "kj").unwrap()).unwrap()
                .plus(Node::indexed(&d, "ij").unwrap()).unwrap(),
        ).unwrap();

        let config = CompilerConfig::default().with_gemm_mapping(false);
        let prepared = prepare(stmt, &config).unwrap();
        let mut again = prepared.clone();
        propagate_sparsity(&mut again).unwrap();
        prop_assert_eq!(&again, &prepared);
        prop_assert_eq!(again.total_non_zero_flops().unwrap(), prepared.total_non_zero_flops().unwrap());
    }
}
