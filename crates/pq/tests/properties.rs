//! Property tests for subspace partitioning and code widening.

use proptest::prelude::*;
use tessera_pq::{Codebook, SubspacePartition, CODEBOOK_SIZE};

prop_compose! {
    fn dim_and_subspaces()(dim in 1usize..600)(dim in Just(dim), m in 1..=dim) -> (usize, usize) {
        (dim, m)
    }
}

proptest! {
    #[test]
    fn partition_covers_dimension((dim, m) in dim_and_subspaces()) {
        let partition = SubspacePartition::new(dim, m).unwrap();
        prop_assert_eq!(partition.len(), m);
        prop_assert_eq!(partition.sizes().iter().sum::<usize>(), dim);

        let base = dim / m;
        let remainder = dim % m;
        for (i, &size) in partition.sizes().iter().enumerate() {
            let expected = if i < remainder { base + 1 } else { base };
            prop_assert_eq!(size, expected);
        }
    }

    #[test]
    fn spans_are_contiguous((dim, m) in dim_and_subspaces()) {
        let partition = SubspacePartition::new(dim, m).unwrap();
        let mut next = 0;
        for i in 0..m {
            let span = partition.span(i);
            prop_assert_eq!(span.start, next);
            prop_assert!(!span.is_empty());
            next = span.end;
        }
        prop_assert_eq!(next, dim);
    }

    #[test]
    fn codes_widen_without_sign(code in any::<u8>()) {
        let flat: Vec<f32> = (0..CODEBOOK_SIZE).map(|i| i as f32).collect();
        let codebook = Codebook::from_flat(1, flat).unwrap();
        prop_assert_eq!(codebook.get(code)[0], f32::from(code));
        prop_assert_eq!(codebook.nearest(&[f32::from(code)]), code);
    }
}
