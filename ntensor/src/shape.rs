/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Shape algebra: extents, strides and the pure functions relating
//! them.
//!
//! All sequences are stored innermost-first: index 0 is the
//! fastest-varying dimension. Strides are measured in elements (one
//! element being one group of `channels` values of a plane), never
//! in bytes.

use std::fmt;
use std::ops::Deref;

use serde::Deserialize;
use serde::Serialize;

/// Byte alignment of dense allocations and of the single padding
/// hole introduced by [`compute_aligned_strides`].
pub const ALIGNMENT: usize = 32;

/// Errors raised when constructing shape values from untrusted input
/// (for example during deserialization).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("dimensions must have rank of at least 1")]
    EmptyDimensions,

    #[error("dimension {axis} has zero extent")]
    ZeroExtent { axis: usize },

    #[error("rank mismatch: {dims} dimensions but {strides} strides")]
    RankMismatch { dims: usize, strides: usize },
}

/// Per-axis extents of a shape. Rank is at least 1 and every extent
/// is positive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "DimensionsRepr", into = "DimensionsRepr")]
pub struct Dimensions(Vec<usize>);

impl Dimensions {
    /// Creates dimensions from innermost-first extents.
    ///
    /// # Panics
    ///
    /// Panics if `extents` is empty or contains a zero.
    pub fn new(extents: Vec<usize>) -> Self {
        Self::try_new(extents).unwrap_or_else(|err| panic!("invalid dimensions: {err}"))
    }

    /// Fallible variant of [`Dimensions::new`].
    pub fn try_new(extents: Vec<usize>) -> Result<Self, ShapeError> {
        if extents.is_empty() {
            return Err(ShapeError::EmptyDimensions);
        }
        if let Some(axis) = extents.iter().position(|&d| d == 0) {
            return Err(ShapeError::ZeroExtent { axis });
        }
        Ok(Self(extents))
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Product of all extents.
    pub fn total(&self) -> usize {
        self.0.iter().product()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// The extents with every length-1 axis dropped.
    pub fn squeezed(&self) -> Vec<usize> {
        self.0.iter().copied().filter(|&d| d != 1).collect()
    }
}

impl Deref for Dimensions {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.0
    }
}

/// Unvalidated wire form of [`Dimensions`].
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct DimensionsRepr(Vec<usize>);

impl TryFrom<DimensionsRepr> for Dimensions {
    type Error = ShapeError;

    fn try_from(repr: DimensionsRepr) -> Result<Self, ShapeError> {
        Self::try_new(repr.0)
    }
}

impl From<Dimensions> for DimensionsRepr {
    fn from(dims: Dimensions) -> Self {
        DimensionsRepr(dims.0)
    }
}

impl From<Dimensions> for Vec<usize> {
    fn from(dims: Dimensions) -> Vec<usize> {
        dims.0
    }
}

impl From<Vec<usize>> for Dimensions {
    fn from(extents: Vec<usize>) -> Self {
        Self::new(extents)
    }
}

impl From<&[usize]> for Dimensions {
    fn from(extents: &[usize]) -> Self {
        Self::new(extents.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Dimensions {
    fn from(extents: [usize; N]) -> Self {
        Self::new(extents.to_vec())
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Per-axis element strides. Zero strides (broadcast or new axes) and
/// negative strides (reversed traversal) are both allowed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Strides(Vec<isize>);

impl Strides {
    pub fn new(strides: Vec<isize>) -> Self {
        Self(strides)
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[isize] {
        &self.0
    }
}

impl Deref for Strides {
    type Target = [isize];

    fn deref(&self) -> &[isize] {
        &self.0
    }
}

impl From<Vec<isize>> for Strides {
    fn from(strides: Vec<isize>) -> Self {
        Self(strides)
    }
}

impl From<&[isize]> for Strides {
    fn from(strides: &[isize]) -> Self {
        Self(strides.to_vec())
    }
}

impl<const N: usize> From<[isize; N]> for Strides {
    fn from(strides: [isize; N]) -> Self {
        Self(strides.to_vec())
    }
}

impl fmt::Display for Strides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Dimensions paired with strides of the same rank.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ShapeRepr", into = "ShapeRepr")]
pub struct Shape {
    dims: Dimensions,
    strides: Strides,
}

#[derive(Serialize, Deserialize)]
struct ShapeRepr {
    dims: Dimensions,
    strides: Strides,
}

impl TryFrom<ShapeRepr> for Shape {
    type Error = ShapeError;

    fn try_from(repr: ShapeRepr) -> Result<Self, ShapeError> {
        Self::try_new(repr.dims, repr.strides)
    }
}

impl From<Shape> for ShapeRepr {
    fn from(shape: Shape) -> Self {
        ShapeRepr {
            dims: shape.dims,
            strides: shape.strides,
        }
    }
}

impl Shape {
    /// Pairs `dims` with `strides`.
    ///
    /// # Panics
    ///
    /// Panics if the ranks differ.
    pub fn new(dims: impl Into<Dimensions>, strides: impl Into<Strides>) -> Self {
        Self::try_new(dims.into(), strides.into())
            .unwrap_or_else(|err| panic!("invalid shape: {err}"))
    }

    pub fn try_new(dims: Dimensions, strides: Strides) -> Result<Self, ShapeError> {
        if dims.rank() != strides.rank() {
            return Err(ShapeError::RankMismatch {
                dims: dims.rank(),
                strides: strides.rank(),
            });
        }
        Ok(Self { dims, strides })
    }

    /// A packed shape using [`compute_unaligned_strides`].
    pub fn unaligned(dims: impl Into<Dimensions>) -> Self {
        let dims = dims.into();
        let strides = compute_unaligned_strides(&dims);
        Self { dims, strides }
    }

    /// A shape using [`compute_aligned_strides`] for elements of
    /// `elem_size` bytes.
    pub fn aligned(dims: impl Into<Dimensions>, elem_size: usize) -> Self {
        let dims = dims.into();
        let strides = compute_aligned_strides(&dims, elem_size);
        Self { dims, strides }
    }

    pub fn dims(&self) -> &Dimensions {
        &self.dims
    }

    pub fn strides(&self) -> &Strides {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.dims.rank()
    }

    pub fn total(&self) -> usize {
        self.dims.total()
    }

    pub fn contains_padding(&self) -> bool {
        strides_contain_padding(&self.dims, &self.strides)
    }

    pub fn has_negative_strides(&self) -> bool {
        contains_negative_strides(&self.strides)
    }

    pub fn min_index(&self) -> isize {
        min_index(&self.dims, &self.strides)
    }

    pub fn max_index(&self) -> isize {
        max_index(&self.dims, &self.strides)
    }

    /// Number of elements between the lowest and the highest
    /// reachable index, inclusive.
    pub fn span(&self) -> usize {
        (self.max_index() - self.min_index()) as usize + 1
    }

    /// Reorders both dimensions and strides by `order`.
    pub fn permute(&self, order: &[usize]) -> Shape {
        Shape {
            dims: Dimensions(permute(order, self.dims.as_slice())),
            strides: Strides(permute(order, self.strides.as_slice())),
        }
    }

    /// Dot product of `coord` with the strides.
    ///
    /// # Panics
    ///
    /// Panics if `coord` has the wrong rank or is out of range.
    pub fn index_of(&self, coord: &[usize]) -> isize {
        assert_eq!(
            coord.len(),
            self.rank(),
            "coordinate {:?} has rank {} but shape has rank {}",
            coord,
            coord.len(),
            self.rank()
        );
        coord
            .iter()
            .zip(self.dims.iter())
            .zip(self.strides.iter())
            .map(|((&x, &d), &s)| {
                assert!(x < d, "coordinate {:?} out of range for {}", coord, self.dims);
                x as isize * s
            })
            .sum()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[sz={} st={}]", self.dims, self.strides)
    }
}

/// Strides for `dims` with a single alignment hole.
///
/// The first dimension of length > 1 gets stride 1. The stride of the
/// next dimension of length > 1 is rounded up to a multiple of
/// `ALIGNMENT / elem_size` elements; all further strides continue the
/// multiplicative chain from there.
pub fn compute_aligned_strides(dims: &[usize], elem_size: usize) -> Strides {
    compute_aligned_strides_with(dims, elem_size, ALIGNMENT)
}

/// [`compute_aligned_strides`] with an explicit byte alignment.
pub fn compute_aligned_strides_with(dims: &[usize], elem_size: usize, alignment: usize) -> Strides {
    assert!(elem_size > 0, "element size must be positive");
    let quantum = (alignment / elem_size).max(1);

    let mut strides = Vec::with_capacity(dims.len());
    let mut acc = 1usize;
    let mut seen_nontrivial = false;
    let mut padded = false;
    for &d in dims {
        if d == 1 {
            strides.push(acc as isize);
            continue;
        }
        if seen_nontrivial && !padded {
            acc = acc.div_ceil(quantum) * quantum;
            padded = true;
        }
        strides.push(acc as isize);
        acc *= d;
        seen_nontrivial = true;
    }
    Strides(strides)
}

/// Packed innermost-first strides: `stride[0] = 1`,
/// `stride[i] = stride[i-1] * dims[i-1]`.
pub fn compute_unaligned_strides(dims: &[usize]) -> Strides {
    let mut acc = 1isize;
    Strides(
        dims.iter()
            .map(|&d| {
                let stride = acc;
                acc *= d as isize;
                stride
            })
            .collect(),
    )
}

/// Extends the first `known.len()` strides to the full rank of `dims`
/// by continuing the multiplicative chain.
///
/// # Panics
///
/// Panics unless `0 < known.len() < dims.len()`.
pub fn partially_compute_strides(dims: &[usize], known: &[isize]) -> Strides {
    assert!(
        !known.is_empty() && known.len() < dims.len(),
        "expected between 1 and {} known strides, got {}",
        dims.len().saturating_sub(1),
        known.len()
    );
    let mut strides = known.to_vec();
    for i in known.len()..dims.len() {
        strides.push(strides[i - 1] * dims[i - 1] as isize);
    }
    Strides(strides)
}

fn assert_permutation(order: &[usize], rank: usize) {
    assert_eq!(
        order.len(),
        rank,
        "permutation {:?} does not match rank {}",
        order,
        rank
    );
    let mut seen = vec![false; rank];
    for &axis in order {
        assert!(axis < rank, "permutation {:?} has out of range axis {}", order, axis);
        assert!(!seen[axis], "permutation {:?} repeats axis {}", order, axis);
        seen[axis] = true;
    }
}

/// Reorders `values` so that `result[i] = values[order[i]]`.
///
/// # Panics
///
/// Panics if `order` is not a permutation of `[0, values.len())`.
pub fn permute<T: Clone>(order: &[usize], values: &[T]) -> Vec<T> {
    assert_permutation(order, values.len());
    order.iter().map(|&axis| values[axis].clone()).collect()
}

/// The permutation undoing `order`.
pub fn inverse_permutation(order: &[usize]) -> Vec<usize> {
    assert_permutation(order, order.len());
    let mut inverse = vec![0; order.len()];
    for (i, &axis) in order.iter().enumerate() {
        inverse[axis] = i;
    }
    inverse
}

/// Whether the addressed span is larger than the element count.
///
/// Evaluated at the axis with the largest absolute stride. Length-1
/// dimensions and zero strides carry no addressing information and
/// are ignored.
pub fn strides_contain_padding(dims: &[usize], strides: &[isize]) -> bool {
    let significant = dims
        .iter()
        .zip(strides)
        .filter(|&(&d, &s)| d > 1 && s != 0)
        .max_by_key(|&(_, &s)| s.unsigned_abs());
    match significant {
        None => false,
        Some((&d, &s)) => {
            let total: usize = dims.iter().filter(|&&d| d > 1).product();
            total != d * s.unsigned_abs()
        }
    }
}

pub fn contains_negative_strides(strides: &[isize]) -> bool {
    strides.iter().any(|&s| s < 0)
}

/// Whether every non-trivial axis has exactly its packed stride, i.e.
/// logical order and memory order coincide with no holes.
pub fn is_unaligned_contiguous(dims: &[usize], strides: &[isize]) -> bool {
    let mut expected = 1isize;
    for (&d, &s) in dims.iter().zip(strides) {
        if d == 1 {
            continue;
        }
        if s != expected {
            return false;
        }
        expected *= d as isize;
    }
    true
}

/// Smallest linear offset reachable from the origin.
pub fn min_index(dims: &[usize], strides: &[isize]) -> isize {
    dims.iter()
        .zip(strides)
        .map(|(&d, &s)| ((d as isize - 1) * s).min(0))
        .sum()
}

/// Largest linear offset reachable from the origin.
pub fn max_index(dims: &[usize], strides: &[isize]) -> isize {
    dims.iter()
        .zip(strides)
        .map(|(&d, &s)| ((d as isize - 1) * s).max(0))
        .sum()
}

/// Decomposes a logical linear index into an innermost-first
/// coordinate.
pub fn coordinates(mut linear: usize, dims: &[usize]) -> Vec<usize> {
    let mut coord = Vec::with_capacity(dims.len());
    for &d in dims {
        coord.push(linear % d);
        linear /= d;
    }
    debug_assert_eq!(linear, 0, "linear index out of range for {:?}", dims);
    coord
}
