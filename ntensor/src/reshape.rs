/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Reshape planning.
//!
//! Reshaping is decided purely from shape facts, never from data. Given
//! the current [`Shape`] and the target [`Dimensions`], [`plan_reshape`]
//! picks the cheapest of four outcomes:
//!
//! 1. [`ReshapePlan::Unchanged`]: the target equals the current
//!    dimensions.
//! 2. [`ReshapePlan::Restride`]: the new shape is a pure stride
//!    change over the same buffer. This covers inserting or dropping
//!    length-1 dimensions on any layout, and any reshape of a packed,
//!    forward-ordered layout.
//! 3. [`ReshapePlan::InPlacePadded`]: the layout has the single
//!    alignment hole produced by
//!    [`compute_aligned_strides`](crate::shape::compute_aligned_strides),
//!    and the leading target dimensions multiply out exactly to the
//!    padded run. The old padded stride is reused, so the buffer is
//!    shared.
//! 4. [`ReshapePlan::Copy`]: everything else. The caller allocates a
//!    fresh plane and copies element by element.
//!
//! Length-1 dimensions and zero strides carry no addressing
//! information and are excluded from the analysis.

use std::fmt;

use crate::shape::compute_unaligned_strides;
use crate::shape::contains_negative_strides;
use crate::shape::is_unaligned_contiguous;
use crate::shape::partially_compute_strides;
use crate::shape::strides_contain_padding;
use crate::shape::Dimensions;
use crate::shape::Shape;
use crate::shape::Strides;

/// Outcome of [`plan_reshape`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReshapePlan {
    /// Target and current dimensions are identical.
    Unchanged,

    /// Zero-copy: reinterpret the buffer with these strides, offset
    /// unchanged.
    Restride(Strides),

    /// Zero-copy over a padded layout: reuse the padded stride at the
    /// split point.
    InPlacePadded(Strides),

    /// A new buffer has to be allocated and filled.
    Copy,
}

impl ReshapePlan {
    /// Whether applying this plan keeps the original buffer.
    pub fn is_zero_copy(&self) -> bool {
        !matches!(self, ReshapePlan::Copy)
    }

    /// The target strides, for zero-copy plans that change them.
    pub fn strides(&self) -> Option<&Strides> {
        match self {
            ReshapePlan::Restride(strides) | ReshapePlan::InPlacePadded(strides) => Some(strides),
            ReshapePlan::Unchanged | ReshapePlan::Copy => None,
        }
    }
}

impl fmt::Display for ReshapePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReshapePlan::Unchanged => write!(f, "unchanged"),
            ReshapePlan::Restride(strides) => write!(f, "restride to {}", strides),
            ReshapePlan::InPlacePadded(strides) => write!(f, "in-place padded to {}", strides),
            ReshapePlan::Copy => write!(f, "copy"),
        }
    }
}

/// Decides how `shape` can be reshaped to `target`.
///
/// # Panics
///
/// Panics if the element counts differ.
pub fn plan_reshape(shape: &Shape, target: &Dimensions) -> ReshapePlan {
    let plan = plan(shape, target);
    tracing::debug!(%shape, %target, %plan, "planned reshape");
    plan
}

fn plan(shape: &Shape, target: &Dimensions) -> ReshapePlan {
    let dims = shape.dims();
    let strides = shape.strides();

    if dims == target {
        return ReshapePlan::Unchanged;
    }

    assert_eq!(
        dims.total(),
        target.total(),
        "cannot reshape {} ({} elements) into {} ({} elements)",
        dims,
        dims.total(),
        target,
        target.total()
    );

    // Only length-1 axes were added or removed: carry every significant
    // stride over in order.
    if dims.squeezed() == target.squeezed() {
        return ReshapePlan::Restride(carry_strides(dims, strides, target));
    }

    if !strides_contain_padding(dims, strides)
        && !contains_negative_strides(strides)
        && is_unaligned_contiguous(dims, strides)
    {
        return ReshapePlan::Restride(compute_unaligned_strides(target));
    }

    match in_place_strides(shape, target) {
        Some(strides) => ReshapePlan::InPlacePadded(strides),
        None => ReshapePlan::Copy,
    }
}

/// Whether `shape` can be reshaped to `target` over its padded layout
/// without copying.
pub fn can_reshape_in_place(shape: &Shape, target: &[usize]) -> bool {
    in_place_strides(shape, target).is_some()
}

fn carry_strides(dims: &[usize], strides: &[isize], target: &[usize]) -> Strides {
    let mut significant = dims
        .iter()
        .zip(strides)
        .filter(|&(&d, _)| d != 1)
        .map(|(_, &s)| s);
    target
        .iter()
        .map(|&d| {
            if d == 1 {
                0
            } else {
                significant.next().unwrap_or(0)
            }
        })
        .collect::<Vec<_>>()
        .into()
}

/// Strides for `target` if `shape` is a forward layout with a single
/// hole after its first significant axis and the target splits that
/// axis cleanly.
fn in_place_strides(shape: &Shape, target: &[usize]) -> Option<Strides> {
    if shape.has_negative_strides() {
        return None;
    }

    let significant: Vec<(usize, isize)> = shape
        .dims()
        .iter()
        .zip(shape.strides().iter())
        .filter(|&(&d, &s)| d > 1 && s != 0)
        .map(|(&d, &s)| (d, s))
        .collect();
    // A zero stride on a non-trivial axis repeats elements; those
    // layouts cannot be restrided.
    let nontrivial = shape.dims().iter().filter(|&&d| d > 1).count();
    if significant.is_empty() || significant.len() != nontrivial {
        return None;
    }

    let (run, base) = significant[0];
    let padded = significant.get(1).map(|&(_, s)| s);
    if let Some(padded) = padded {
        if padded < base * run as isize {
            return None;
        }
    }
    for pair in significant.windows(2).skip(1) {
        let ((d, s), (_, next)) = (pair[0], pair[1]);
        if next != s * d as isize {
            return None;
        }
    }

    // Smallest K with prod(target[..K]) == run.
    let mut product = 1;
    let mut split = None;
    for (k, &d) in target.iter().enumerate() {
        product *= d;
        if product == run {
            split = Some(k + 1);
            break;
        }
        if product > run {
            break;
        }
    }
    let split = split?;

    let mut strides: Vec<isize> = compute_unaligned_strides(&target[..split])
        .iter()
        .map(|&s| s * base)
        .collect();
    if split == target.len() {
        return Some(strides.into());
    }
    strides.push(padded.unwrap_or(base * run as isize));
    if split + 1 == target.len() {
        return Some(strides.into());
    }
    Some(partially_compute_strides(target, &strides))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(extents: &[usize]) -> Dimensions {
        Dimensions::from(extents)
    }

    #[test]
    fn test_unchanged() {
        let shape = Shape::aligned([21, 2, 4], 1);
        assert_eq!(plan_reshape(&shape, &dims(&[21, 2, 4])), ReshapePlan::Unchanged);
    }

    #[test]
    fn test_unit_axes_keep_strides() {
        let shape = Shape::aligned([21, 2, 4], 1);
        assert_eq!(
            plan_reshape(&shape, &dims(&[21, 1, 2, 4])),
            ReshapePlan::Restride(vec![1, 0, 32, 64].into())
        );
        // Works for reversed layouts too.
        let reversed = Shape::new([4, 3], [-1, 4]);
        assert_eq!(
            plan_reshape(&reversed, &dims(&[1, 4, 3])),
            ReshapePlan::Restride(vec![0, -1, 4].into())
        );
    }

    #[test]
    fn test_packed_restride() {
        let shape = Shape::unaligned([6, 2, 4]);
        assert_eq!(
            plan_reshape(&shape, &dims(&[12, 4])),
            ReshapePlan::Restride(vec![1, 12].into())
        );
        assert_eq!(
            plan_reshape(&shape, &dims(&[48])),
            ReshapePlan::Restride(vec![1].into())
        );
    }

    #[test]
    fn test_padded_split() {
        let shape = Shape::aligned([21, 2, 4], 1);
        assert!(can_reshape_in_place(&shape, &[3, 7, 2, 4]));
        assert_eq!(
            plan_reshape(&shape, &dims(&[3, 7, 2, 4])),
            ReshapePlan::InPlacePadded(vec![1, 3, 32, 64].into())
        );
        assert_eq!(
            plan_reshape(&shape, &dims(&[21, 8])),
            ReshapePlan::InPlacePadded(vec![1, 32].into())
        );
        assert_eq!(
            plan_reshape(&shape, &dims(&[7, 3, 8])),
            ReshapePlan::InPlacePadded(vec![1, 7, 32].into())
        );
    }

    #[test]
    fn test_padded_split_with_offset_base() {
        // A single column read with a stride: one significant axis.
        let column = Shape::new([4, 1], [32, 1]);
        assert_eq!(
            plan_reshape(&column, &dims(&[2, 2])),
            ReshapePlan::InPlacePadded(vec![32, 64].into())
        );
    }

    #[test]
    fn test_padded_needs_copy() {
        let shape = Shape::aligned([21, 2, 4], 1);
        assert!(!can_reshape_in_place(&shape, &[2, 84]));
        assert_eq!(plan_reshape(&shape, &dims(&[2, 84])), ReshapePlan::Copy);
        assert_eq!(plan_reshape(&shape, &dims(&[168])), ReshapePlan::Copy);
    }

    #[test]
    fn test_permuted_needs_copy() {
        let transposed = Shape::unaligned([2, 3]).permute(&[1, 0]);
        assert_eq!(plan_reshape(&transposed, &dims(&[6])), ReshapePlan::Copy);
    }

    #[test]
    fn test_negative_strides_need_copy() {
        let reversed = Shape::new([4, 3], [-1, 4]);
        assert_eq!(plan_reshape(&reversed, &dims(&[12])), ReshapePlan::Copy);
    }

    #[test]
    fn test_broadcast_needs_copy() {
        let broadcast = Shape::new([4, 3], [0, 1]);
        assert_eq!(plan_reshape(&broadcast, &dims(&[12])), ReshapePlan::Copy);
    }

    #[test]
    #[should_panic(expected = "cannot reshape")]
    fn test_total_mismatch() {
        plan_reshape(&Shape::unaligned([6, 2]), &dims(&[5, 2]));
    }

    #[test]
    fn test_plan_accessors() {
        assert!(ReshapePlan::Unchanged.is_zero_copy());
        assert!(!ReshapePlan::Copy.is_zero_copy());
        assert_eq!(
            ReshapePlan::Restride(vec![1, 4].into()).strides(),
            Some(&Strides::from(vec![1, 4]))
        );
        assert_eq!(ReshapePlan::Copy.to_string(), "copy");
    }
}
