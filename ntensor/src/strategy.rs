/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Property-based generators for dimensions, permutations and reshape
//! targets.
//!
//! Example usage:
//!
//! ```ignore
//! use proptest::prelude::*;
//!
//! use crate::strategy::gen_reshape_case;
//!
//! proptest! {
//!     #[test]
//!     fn test_reshape((dims, order, target) in gen_reshape_case(4, 6)) {
//!         // Build a plane over `dims`, permute it by `order`, reshape
//!         // it to `target`.
//!     }
//! }
//! ```
//!
//! This module is only included in test builds (`#[cfg(test)]`).

use proptest::prelude::*;

/// Innermost-first extents of rank `1..=max_rank`, each in
/// `1..=max_extent`.
pub fn gen_dims(max_rank: usize, max_extent: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1..=max_extent, 1..=max_rank)
}

/// A permutation of `[0, rank)`.
pub fn gen_permutation(rank: usize) -> impl Strategy<Value = Vec<usize>> {
    Just((0..rank).collect::<Vec<_>>()).prop_shuffle()
}

/// Dimensions together with a permutation of their axes.
pub fn gen_dims_and_permutation(
    max_rank: usize,
    max_extent: usize,
) -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
    gen_dims(max_rank, max_extent).prop_flat_map(|dims| {
        let rank = dims.len();
        (Just(dims), gen_permutation(rank))
    })
}

fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            factors.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

/// Random dimensions multiplying out to `total`: its prime factors are
/// shuffled and grouped into consecutive runs.
pub fn gen_regrouping(total: usize) -> BoxedStrategy<Vec<usize>> {
    let factors = prime_factors(total);
    if factors.len() <= 1 {
        return Just(vec![total]).boxed();
    }
    let cuts = factors.len() - 1;
    (
        Just(factors).prop_shuffle(),
        prop::collection::vec(any::<bool>(), cuts),
    )
        .prop_map(|(factors, cuts)| {
            let mut dims = vec![factors[0]];
            for (&factor, cut) in factors[1..].iter().zip(cuts) {
                if cut {
                    dims.push(factor);
                } else if let Some(last) = dims.last_mut() {
                    *last *= factor;
                }
            }
            dims
        })
        .boxed()
}

/// Dimensions and another set of dimensions with the same total.
pub fn gen_regrouped_dims(
    max_rank: usize,
    max_extent: usize,
) -> impl Strategy<Value = (Vec<usize>, Vec<usize>)> {
    gen_dims(max_rank, max_extent).prop_flat_map(|dims| {
        let total = dims.iter().product();
        (Just(dims), gen_regrouping(total))
    })
}

/// Dimensions, a permutation of them, and a reshape target with the
/// same total.
pub fn gen_reshape_case(
    max_rank: usize,
    max_extent: usize,
) -> impl Strategy<Value = (Vec<usize>, Vec<usize>, Vec<usize>)> {
    gen_dims_and_permutation(max_rank, max_extent).prop_flat_map(|(dims, order)| {
        let total = dims.iter().product();
        (Just(dims), Just(order), gen_regrouping(total))
    })
}

mod tests {
    use proptest::strategy::ValueTree;
    use proptest::test_runner::Config;
    use proptest::test_runner::TestRunner;

    use super::*;

    #[test]
    fn test_prime_factors() {
        assert_eq!(prime_factors(1), Vec::<usize>::new());
        assert_eq!(prime_factors(168), vec![2, 2, 2, 3, 7]);
        assert_eq!(prime_factors(97), vec![97]);
    }

    #[test]
    fn sample_regroupings() {
        let mut runner = TestRunner::new(Config::default());
        for total in [1, 7, 12, 168, 720] {
            let strat = gen_regrouping(total);
            for _ in 0..32 {
                let dims = strat.new_tree(&mut runner).unwrap().current();
                assert_eq!(dims.iter().product::<usize>(), total, "{:?}", dims);
                assert!(dims.iter().all(|&d| d > 0));
            }
        }
    }

    proptest! {
        #[test]
        fn permutations_are_valid((dims, order) in gen_dims_and_permutation(5, 4)) {
            let mut sorted = order.clone();
            sorted.sort();
            prop_assert_eq!(sorted, (0..dims.len()).collect::<Vec<_>>());
        }
    }
}
