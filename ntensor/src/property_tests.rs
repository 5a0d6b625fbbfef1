/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Property-based tests for the layout engine.
//!
//! These check the algebraic guarantees across randomly generated
//! dimensions, permutations and reshape targets, using the generators
//! from [`crate::strategy`].

use std::collections::HashSet;

use proptest::prelude::*;

use crate::execute::execute;
use crate::execute::execute_indexed;
use crate::plane::Plane;
use crate::planes::Planes;
use crate::reshape::plan_reshape;
use crate::shape::compute_aligned_strides;
use crate::shape::compute_unaligned_strides;
use crate::shape::inverse_permutation;
use crate::shape::is_unaligned_contiguous;
use crate::shape::strides_contain_padding;
use crate::shape::Dimensions;
use crate::shape::Shape;
use crate::shape::ALIGNMENT;
use crate::strategy::gen_dims;
use crate::strategy::gen_dims_and_permutation;
use crate::strategy::gen_regrouped_dims;
use crate::strategy::gen_regrouping;
use crate::strategy::gen_reshape_case;
use crate::stream::StreamFormat;
use crate::view::SubRange;

/// A dense plane holding `0, 1, 2, ...` in logical order.
fn ramp(dims: &[usize], aligned: bool) -> Plane<i32> {
    let plane = if aligned {
        Plane::dense(dims.to_vec(), 1)
    } else {
        Plane::dense_unaligned(dims.to_vec(), 1)
    }
    .unwrap();
    let mut next = 0;
    execute(
        |x: &mut i32| {
            *x = next;
            next += 1;
        },
        &[&plane],
    );
    plane
}

proptest! {
    #[test]
    fn prop_unaligned_strides_have_no_padding(dims in gen_dims(5, 8)) {
        let strides = compute_unaligned_strides(&dims);
        prop_assert!(!strides_contain_padding(&dims, &strides));
        prop_assert!(is_unaligned_contiguous(&dims, &strides));
    }

    #[test]
    fn prop_aligned_strides_have_a_single_hole(
        dims in gen_dims(5, 40),
        elem_size in prop::sample::select(vec![1usize, 2, 4, 8]),
    ) {
        let strides = compute_aligned_strides(&dims, elem_size);
        let quantum = (ALIGNMENT / elem_size) as isize;
        let significant: Vec<(usize, isize)> = dims
            .iter()
            .zip(strides.iter())
            .filter(|&(&d, _)| d > 1)
            .map(|(&d, &s)| (d, s))
            .collect();
        if let Some(&(_, first)) = significant.first() {
            prop_assert_eq!(first, 1);
        }
        if let Some(&(_, second)) = significant.get(1) {
            prop_assert_eq!(second % quantum, 0);
            prop_assert!(second >= significant[0].0 as isize);
        }
        for pair in significant.windows(2).skip(1) {
            prop_assert_eq!(pair[1].1, pair[0].1 * pair[0].0 as isize);
        }
    }

    #[test]
    fn prop_permutation_round_trip((dims, order) in gen_dims_and_permutation(5, 6)) {
        let shape = Shape::aligned(dims, 4);
        let inverse = inverse_permutation(&order);
        prop_assert_eq!(shape.permute(&inverse).permute(&order), shape.clone());
        prop_assert_eq!(shape.permute(&order).permute(&inverse), shape);
    }

    #[test]
    fn prop_reshape_preserves_values(
        (dims, order, target) in gen_reshape_case(4, 6),
        aligned in any::<bool>(),
    ) {
        let plane = ramp(&dims, aligned).permute(&order);
        let reshaped = plane.reshape(target.clone()).unwrap();
        prop_assert_eq!(reshaped.dimensions().as_slice(), target.as_slice());
        prop_assert_eq!(reshaped.to_vec(), plane.to_vec());
        prop_assert_eq!(
            reshaped.flatten().unwrap().to_vec(),
            plane.flatten().unwrap().to_vec()
        );

        let plan = plan_reshape(plane.shape(), &Dimensions::from(target));
        prop_assert_eq!(
            plan.is_zero_copy(),
            reshaped.buffer().same_storage(plane.buffer())
        );
    }

    #[test]
    fn prop_reshape_without_padding_is_zero_copy((dims, target) in gen_regrouped_dims(4, 6)) {
        let plane = ramp(&dims, false);
        prop_assert!(!plane.shape().contains_padding());
        prop_assert!(!plane.shape().has_negative_strides());
        let reshaped = plane.reshape(target).unwrap();
        prop_assert!(reshaped.buffer().same_storage(plane.buffer()));
        prop_assert_eq!(reshaped.to_vec(), plane.to_vec());
    }

    #[test]
    fn prop_padded_split_is_zero_copy(
        (dims, split) in gen_dims(3, 48).prop_flat_map(|dims| {
            let first = dims[0];
            (Just(dims), gen_regrouping(first))
        }),
    ) {
        let plane = Plane::<u8>::dense(dims.clone(), 1).unwrap();
        let target: Vec<usize> = split.iter().chain(&dims[1..]).copied().collect();
        let reshaped = plane.reshape(target).unwrap();
        prop_assert!(reshaped.buffer().same_storage(plane.buffer()));
        prop_assert_eq!(reshaped.indices().collect::<Vec<_>>(), plane.indices().collect::<Vec<_>>());
    }

    #[test]
    fn prop_slice_is_degenerate_subspace(
        dims in gen_dims(4, 5).prop_filter("rank > 1", |dims| dims.len() > 1),
        axis in any::<prop::sample::Index>(),
        index in any::<prop::sample::Index>(),
    ) {
        let plane = ramp(&dims, true);
        let axis = axis.index(dims.len());
        let index = index.index(dims[axis]);
        let ranges: Vec<SubRange> = dims
            .iter()
            .enumerate()
            .map(|(a, &d)| if a == axis { SubRange::index(index) } else { SubRange::full(d) })
            .collect();
        let sliced = plane.slice(axis, index);
        let sub = plane.subspace(&ranges);
        prop_assert_eq!(sliced.shape(), sub.shape());
        prop_assert_eq!(sliced.offset(), sub.offset());
        prop_assert_eq!(sliced.to_vec(), sub.to_vec());
    }

    #[test]
    fn prop_execute_visits_every_value(dims in gen_dims(4, 6), channels in 1usize..4) {
        let plane = Plane::<u16>::dense(dims, channels).unwrap();
        let mut seen = HashSet::new();
        execute_indexed(
            |linear, values| {
                seen.insert(linear);
                values[0] = linear as u16;
            },
            &[&plane],
        );
        prop_assert_eq!(seen.len(), plane.scalar_count());
        // Every call landed on a distinct buffer position.
        let expected: Vec<u16> = (0..plane.scalar_count()).map(|i| i as u16).collect();
        prop_assert_eq!(plane.to_vec(), expected);
    }

    #[test]
    fn prop_stream_round_trip(dims in gen_dims(3, 4), channels in 1usize..3) {
        let plane = ramp(&dims, true);
        let interleaved = Plane::<i32>::dense(dims, channels).unwrap();
        execute_indexed(|linear, values| values[0] = -(linear as i32), &[&interleaved]);

        let format = StreamFormat::default();
        let planes = Planes::new(vec![plane.clone().into(), interleaved.clone().into()]);
        let text = format.render(&planes, Some("header"), None);
        let document = format.read::<i32>(&text).unwrap();
        prop_assert_eq!(document.planes.len(), 2);
        prop_assert_eq!(document.planes[0].dimensions(), plane.dimensions());
        prop_assert_eq!(document.planes[0].to_vec(), plane.to_vec());
        prop_assert_eq!(document.planes[1].channels(), channels);
        prop_assert_eq!(document.planes[1].to_vec(), interleaved.to_vec());
    }
}
