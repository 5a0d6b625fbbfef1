/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! A [`Plane`] is one buffer viewed through one shape.
//!
//! The plane maps a logical coordinate `x` and channel `c` to the
//! buffer index
//!
//! ```text
//! offset + channels * Σᵢ (x[i] * stride[i]) + c
//! ```
//!
//! Channels are interleaved components stored next to each other for
//! every element; strides step over whole elements. Planes never move
//! data: every view operation (see the `view` module) returns a new
//! plane over the same buffer, and only reshape may fall back to a
//! fresh allocation.

use std::fmt;
use std::mem;

use crate::buffer::Buffer;
use crate::buffer::BufferError;
use crate::element::Element;
use crate::shape::Dimensions;
use crate::shape::Shape;
use crate::shape::Strides;

/// A buffer, a shape, a channel count and an offset.
#[derive(Clone)]
pub struct Plane<T: Element> {
    buffer: Buffer<T>,
    shape: Shape,
    channels: usize,
    offset: usize,
}

impl<T: Element> Plane<T> {
    /// Views `buffer` through `shape`.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is zero, if `offset` is negative, or if
    /// any index reachable through the shape falls outside the
    /// buffer.
    pub fn new(buffer: Buffer<T>, shape: Shape, channels: usize, offset: isize) -> Self {
        assert!(channels >= 1, "a plane needs at least one channel");
        let channels_i = channels as isize;
        let lowest = offset + shape.min_index() * channels_i;
        let highest = offset + shape.max_index() * channels_i + channels_i - 1;
        assert!(
            lowest >= 0 && (highest as usize) < buffer.size(),
            "shape {} with {} channels at offset {} reaches [{}, {}] outside buffer of {} elements",
            shape,
            channels,
            offset,
            lowest,
            highest,
            buffer.size()
        );
        Self {
            buffer,
            shape,
            channels,
            offset: offset as usize,
        }
    }

    /// Allocates a dense plane with aligned strides. The alignment
    /// quantum is computed from the size of a whole element, i.e.
    /// `channels` values.
    pub fn dense(dims: impl Into<Dimensions>, channels: usize) -> Result<Self, BufferError> {
        assert!(channels >= 1, "a plane needs at least one channel");
        let shape = Shape::aligned(dims, mem::size_of::<T>() * channels);
        let buffer = Buffer::dense(shape.span() * channels)?;
        Ok(Self::new(buffer, shape, channels, 0))
    }

    /// Allocates a dense plane with packed strides.
    pub fn dense_unaligned(
        dims: impl Into<Dimensions>,
        channels: usize,
    ) -> Result<Self, BufferError> {
        assert!(channels >= 1, "a plane needs at least one channel");
        let shape = Shape::unaligned(dims);
        let buffer = Buffer::dense(shape.total() * channels)?;
        Ok(Self::new(buffer, shape, channels, 0))
    }

    /// Creates a sparse plane with packed strides.
    pub fn sparse(dims: impl Into<Dimensions>, channels: usize) -> Self {
        assert!(channels >= 1, "a plane needs at least one channel");
        let shape = Shape::unaligned(dims);
        let buffer = Buffer::sparse(shape.total() * channels);
        Self::new(buffer, shape, channels, 0)
    }

    /// Wraps `values`, given in logical order with channels
    /// interleaved, in a packed dense plane.
    ///
    /// # Panics
    ///
    /// Panics if the number of values does not match the dimensions
    /// and channel count, or if the allocation fails.
    pub fn from_vec(values: Vec<T>, dims: impl Into<Dimensions>, channels: usize) -> Self {
        let shape = Shape::unaligned(dims);
        assert_eq!(
            values.len(),
            shape.total() * channels,
            "{} values do not fill {} with {} channels",
            values.len(),
            shape.dims(),
            channels
        );
        let buffer = Buffer::from_vec(values)
            .unwrap_or_else(|err| panic!("cannot allocate plane storage: {err}"));
        Self::new(buffer, shape, channels, 0)
    }

    /// Reinterprets the same buffer under a different shape and
    /// channel count, at `offset() + extra_offset`.
    ///
    /// # Panics
    ///
    /// Panics if the new view reaches outside the buffer.
    pub fn like(
        &self,
        dims: impl Into<Dimensions>,
        strides: impl Into<Strides>,
        channels: usize,
        extra_offset: isize,
    ) -> Self {
        Self::new(
            self.buffer.clone(),
            Shape::new(dims, strides),
            channels,
            self.offset as isize + extra_offset,
        )
    }

    /// Same buffer and channels, new shape, shifted offset.
    pub(crate) fn with_shape(&self, shape: Shape, extra_offset: isize) -> Self {
        Self::new(
            self.buffer.clone(),
            shape,
            self.channels,
            self.offset as isize + extra_offset,
        )
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn dimensions(&self) -> &Dimensions {
        self.shape.dims()
    }

    pub fn strides(&self) -> &Strides {
        self.shape.strides()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn buffer(&self) -> &Buffer<T> {
        &self.buffer
    }

    /// Number of logical elements (each made of `channels` values).
    pub fn total(&self) -> usize {
        self.shape.total()
    }

    /// Number of logical values: `total() * channels()`.
    pub fn scalar_count(&self) -> usize {
        self.total() * self.channels
    }

    /// The part of the buffer reachable from the current offset.
    pub fn effective_size(&self) -> usize {
        self.buffer.size() - self.offset
    }

    /// Reads the buffer at `offset() + index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= effective_size()`.
    pub fn at(&self, index: usize) -> T {
        self.check_index(index);
        self.buffer.get(self.offset + index)
    }

    /// Writes the buffer at `offset() + index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= effective_size()`.
    pub fn set_at(&self, index: usize, value: T) {
        self.check_index(index);
        self.buffer.set(self.offset + index, value)
    }

    /// Reads the buffer at `offset() + index` without the plane-level
    /// range check. The buffer still rejects indices beyond its size.
    #[inline]
    pub fn get(&self, index: usize) -> T {
        self.buffer.get(self.offset + index)
    }

    /// Writes the buffer at `offset() + index` without the plane-level
    /// range check.
    #[inline]
    pub fn set(&self, index: usize, value: T) {
        self.buffer.set(self.offset + index, value)
    }

    fn check_index(&self, index: usize) {
        assert!(
            index < self.effective_size(),
            "index {} out of range for plane with {} reachable elements",
            index,
            self.effective_size()
        );
    }

    /// Buffer index of `channel` of the element at `coord`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate or channel is out of range.
    pub fn linear_index(&self, channel: usize, coord: &[usize]) -> usize {
        assert!(
            channel < self.channels,
            "channel {} out of range for {} channels",
            channel,
            self.channels
        );
        let index = self.offset as isize
            + self.shape.index_of(coord) * self.channels as isize
            + channel as isize;
        index as usize
    }

    /// Reads `channel` of the element at `coord`.
    pub fn slicing_value(&self, channel: usize, coord: &[usize]) -> T {
        self.buffer.get(self.linear_index(channel, coord))
    }

    /// Writes `channel` of the element at `coord`.
    pub fn set_slicing_value(&self, channel: usize, coord: &[usize], value: T) {
        self.buffer.set(self.linear_index(channel, coord), value)
    }

    /// Buffer indices of every logical value, innermost dimension
    /// fastest and channels fastest of all.
    pub fn indices(&self) -> LinearIndices<'_> {
        LinearIndices::new(&self.shape, self.channels, self.offset)
    }

    /// All logical values in traversal order.
    pub fn to_vec(&self) -> Vec<T> {
        self.indices().map(|i| self.buffer.get(i)).collect()
    }

    /// Copies the whole buffer into new storage, keeping shape and
    /// offset.
    pub fn deep_clone(&self) -> Result<Self, BufferError> {
        Ok(Self {
            buffer: self.buffer.deep_clone()?,
            shape: self.shape.clone(),
            channels: self.channels,
            offset: self.offset,
        })
    }
}

impl<T: Element> PartialEq for Plane<T> {
    /// Planes are equal when their buffers are (same storage, or same
    /// contents) and they start at the same offset.
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && self.buffer == other.buffer
    }
}

impl<T: Element> fmt::Debug for Plane<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plane")
            .field("shape", &self.shape)
            .field("channels", &self.channels)
            .field("offset", &self.offset)
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl<T: Element> fmt::Display for Plane<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}x{} @{}",
            T::NAME,
            self.shape,
            self.channels,
            self.offset
        )
    }
}

/// Iterator over the buffer indices of a plane in logical order.
pub struct LinearIndices<'a> {
    dims: &'a [usize],
    strides: &'a [isize],
    channels: usize,
    coord: Vec<usize>,
    channel: usize,
    base: isize,
    remaining: usize,
}

impl<'a> LinearIndices<'a> {
    fn new(shape: &'a Shape, channels: usize, offset: usize) -> Self {
        Self {
            dims: shape.dims(),
            strides: shape.strides(),
            channels,
            coord: vec![0; shape.rank()],
            channel: 0,
            base: offset as isize,
            remaining: shape.total() * channels,
        }
    }
}

impl Iterator for LinearIndices<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let index = (self.base + self.channel as isize) as usize;

        self.channel += 1;
        if self.channel == self.channels {
            self.channel = 0;
            // Odometer step, innermost first. `base` tracks the element
            // origin incrementally.
            let step = self.channels as isize;
            for axis in 0..self.dims.len() {
                self.coord[axis] += 1;
                self.base += self.strides[axis] * step;
                if self.coord[axis] < self.dims[axis] {
                    break;
                }
                self.base -= self.strides[axis] * step * self.dims[axis] as isize;
                self.coord[axis] = 0;
            }
        }
        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for LinearIndices<'_> {}
