/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Shape transmutations on a single [`Plane`].
//!
//! Every operation except [`Plane::flatten`] (and the copy path of
//! [`Plane::reshape`]) produces a view over the same buffer: only the
//! dimensions, strides and offset change. Offsets are adjusted in
//! buffer units, i.e. `index * stride * channels`.

use std::fmt;

use crate::buffer::BufferError;
use crate::element::Element;
use crate::execute::execute;
use crate::plane::Plane;
use crate::reshape::plan_reshape;
use crate::reshape::ReshapePlan;
use crate::shape::Dimensions;
use crate::shape::Shape;

/// A half-open index range `[start, end)` along one dimension, used by
/// [`Plane::subspace`].
///
/// A range with `start == end` selects the single index `start` and
/// drops the dimension, like [`Plane::slice`]. Any other range keeps
/// the dimension with extent `end - start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubRange {
    pub start: usize,
    pub end: usize,
}

impl SubRange {
    pub fn new(start: usize, end: usize) -> Self {
        assert!(start <= end, "range start {} exceeds end {}", start, end);
        Self { start, end }
    }

    /// Selects `index` and drops the dimension.
    pub fn index(index: usize) -> Self {
        Self {
            start: index,
            end: index,
        }
    }

    /// The whole extent of a dimension.
    pub fn full(extent: usize) -> Self {
        Self {
            start: 0,
            end: extent,
        }
    }

    /// Whether the dimension is dropped.
    pub fn is_degenerate(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for SubRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl<T: Element> Plane<T> {
    fn element_offset(&self, axis: usize, index: usize) -> isize {
        index as isize * self.strides()[axis] * self.channels() as isize
    }

    /// Reorders the dimensions so that new axis `i` is old axis
    /// `order[i]`.
    pub fn permute(&self, order: &[usize]) -> Self {
        self.with_shape(self.shape().permute(order), 0)
    }

    /// Fixes dimension `axis` at `index` and removes it.
    ///
    /// # Panics
    ///
    /// Panics if the plane has rank 1 or `index` is out of range.
    pub fn slice(&self, axis: usize, index: usize) -> Self {
        assert!(self.rank() > 1, "cannot slice a rank 1 plane");
        self.check_axis(axis);
        assert!(
            index < self.dimensions()[axis],
            "slice index {} out of range for dimension {} of extent {}",
            index,
            axis,
            self.dimensions()[axis]
        );
        let mut dims = self.dimensions().to_vec();
        let mut strides = self.strides().to_vec();
        dims.remove(axis);
        strides.remove(axis);
        self.with_shape(Shape::new(dims, strides), self.element_offset(axis, index))
    }

    /// Restricts dimension `axis` to `[start, end)`, keeping the rank.
    ///
    /// # Panics
    ///
    /// Panics unless `start < end <= dimensions()[axis]`.
    pub fn slab(&self, axis: usize, start: usize, end: usize) -> Self {
        self.check_axis(axis);
        assert!(
            start < end && end <= self.dimensions()[axis],
            "slab {}..{} invalid for dimension {} of extent {}",
            start,
            end,
            axis,
            self.dimensions()[axis]
        );
        let mut dims = self.dimensions().to_vec();
        dims[axis] = end - start;
        self.with_shape(
            Shape::new(dims, self.strides().clone()),
            self.element_offset(axis, start),
        )
    }

    /// Applies one [`SubRange`] per dimension, innermost first.
    ///
    /// # Panics
    ///
    /// Panics if the number of ranges differs from the rank, if any
    /// range is out of bounds, or if every dimension would be dropped.
    pub fn subspace(&self, ranges: &[SubRange]) -> Self {
        assert_eq!(
            ranges.len(),
            self.rank(),
            "{} ranges given for a rank {} plane",
            ranges.len(),
            self.rank()
        );
        let mut dims = Vec::with_capacity(ranges.len());
        let mut strides = Vec::with_capacity(ranges.len());
        let mut extra_offset = 0;
        for (axis, range) in ranges.iter().enumerate() {
            let extent = self.dimensions()[axis];
            if range.is_degenerate() {
                assert!(
                    range.start < extent,
                    "index {} out of range for dimension {} of extent {}",
                    range.start,
                    axis,
                    extent
                );
            } else {
                assert!(
                    range.start < range.end && range.end <= extent,
                    "range {} invalid for dimension {} of extent {}",
                    range,
                    axis,
                    extent
                );
                dims.push(range.end - range.start);
                strides.push(self.strides()[axis]);
            }
            extra_offset += self.element_offset(axis, range.start);
        }
        assert!(!dims.is_empty(), "subspace would drop every dimension");
        self.with_shape(Shape::new(dims, strides), extra_offset)
    }

    /// Inserts a length-1, stride-0 dimension at `axis`.
    ///
    /// # Panics
    ///
    /// Panics if `axis > rank()`.
    pub fn new_axis(&self, axis: usize) -> Self {
        assert!(
            axis <= self.rank(),
            "new axis position {} out of range for rank {}",
            axis,
            self.rank()
        );
        let mut dims = self.dimensions().to_vec();
        let mut strides = self.strides().to_vec();
        dims.insert(axis, 1);
        strides.insert(axis, 0);
        self.with_shape(Shape::new(dims, strides), 0)
    }

    /// Removes every length-1 dimension. A plane holding a single
    /// element keeps one dimension of extent 1.
    pub fn squeeze(&self) -> Self {
        let (dims, strides): (Vec<usize>, Vec<isize>) = self
            .dimensions()
            .iter()
            .zip(self.strides().iter())
            .filter(|&(&d, _)| d != 1)
            .map(|(&d, &s)| (d, s))
            .unzip();
        if dims.is_empty() {
            return self.with_shape(Shape::new([1], [1]), 0);
        }
        self.with_shape(Shape::new(dims, strides), 0)
    }

    /// Reshapes to `dims`, sharing the buffer whenever
    /// [`plan_reshape`] finds a zero-copy plan. Otherwise the result is
    /// a new dense plane with aligned strides.
    ///
    /// # Panics
    ///
    /// Panics if the element counts differ.
    pub fn reshape(&self, dims: impl Into<Dimensions>) -> Result<Self, BufferError> {
        let dims = dims.into();
        match plan_reshape(self.shape(), &dims) {
            ReshapePlan::Unchanged => Ok(self.clone()),
            ReshapePlan::Restride(strides) | ReshapePlan::InPlacePadded(strides) => {
                Ok(self.with_shape(Shape::new(dims, strides), 0))
            }
            ReshapePlan::Copy => {
                let target = Plane::dense(dims, self.channels())?;
                self.copy_into(&target);
                Ok(target)
            }
        }
    }

    /// Reshapes to a single dimension, zero-copy when possible.
    pub fn ravel(&self) -> Result<Self, BufferError> {
        self.reshape([self.total()])
    }

    /// Copies into a fresh packed plane of a single dimension.
    pub fn flatten(&self) -> Result<Self, BufferError> {
        let target = Plane::dense_unaligned([self.total()], self.channels())?;
        self.copy_into(&target);
        Ok(target)
    }

    /// Copies every logical value into `target`, which must hold the
    /// same number of values.
    pub fn copy_into(&self, target: &Plane<T>) {
        execute(|dst: &mut T, src: &mut T| *dst = *src, &[target, self]);
    }

    fn check_axis(&self, axis: usize) {
        assert!(
            axis < self.rank(),
            "axis {} out of range for rank {}",
            axis,
            self.rank()
        );
    }
}
