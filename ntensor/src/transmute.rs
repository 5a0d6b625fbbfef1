/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Shape transmutations at the tensor level.
//!
//! Each operation rewrites one plane (plane 0 unless selected with
//! [`Tensor::on_plane`]) and returns a new tensor in which only that
//! plane is replaced. The other planes keep aliasing their buffers.

use crate::buffer::BufferError;
use crate::planes::AnyPlane;
use crate::shape::Dimensions;
use crate::tensor::capability::Transmutable;
use crate::tensor::Tensor;
use crate::view::SubRange;

/// Transmutations targeting one plane of a tensor.
pub struct PlaneOps<'a, C: Transmutable> {
    tensor: &'a Tensor<C>,
    idx: usize,
}

impl<C: Transmutable> Tensor<C> {
    /// Selects the plane the following transmutation applies to.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range.
    pub fn on_plane(&self, idx: usize) -> PlaneOps<'_, C> {
        self.plane(idx);
        PlaneOps { tensor: self, idx }
    }

    pub fn permute(&self, order: &[usize]) -> Self {
        self.on_plane(0).permute(order)
    }

    pub fn slice(&self, axis: usize, index: usize) -> Self {
        self.on_plane(0).slice(axis, index)
    }

    pub fn slab(&self, axis: usize, start: usize, end: usize) -> Self {
        self.on_plane(0).slab(axis, start, end)
    }

    pub fn subspace(&self, ranges: &[SubRange]) -> Self {
        self.on_plane(0).subspace(ranges)
    }

    pub fn new_axis(&self, axis: usize) -> Self {
        self.on_plane(0).new_axis(axis)
    }

    pub fn squeeze(&self) -> Self {
        self.on_plane(0).squeeze()
    }

    pub fn reshape(&self, dims: impl Into<Dimensions>) -> Result<Self, BufferError> {
        self.on_plane(0).reshape(dims)
    }

    pub fn ravel(&self) -> Result<Self, BufferError> {
        self.on_plane(0).ravel()
    }

    pub fn flatten(&self) -> Result<Self, BufferError> {
        self.on_plane(0).flatten()
    }
}

impl<C: Transmutable> PlaneOps<'_, C> {
    fn target(&self) -> &AnyPlane {
        self.tensor.plane(self.idx)
    }

    fn replaced(&self, plane: AnyPlane) -> Tensor<C> {
        self.tensor.with_plane(self.idx, plane)
    }

    /// See [`Plane::permute`](crate::Plane::permute).
    pub fn permute(&self, order: &[usize]) -> Tensor<C> {
        self.replaced(self.target().permute(order))
    }

    /// See [`Plane::slice`](crate::Plane::slice).
    pub fn slice(&self, axis: usize, index: usize) -> Tensor<C> {
        self.replaced(self.target().slice(axis, index))
    }

    /// See [`Plane::slab`](crate::Plane::slab).
    pub fn slab(&self, axis: usize, start: usize, end: usize) -> Tensor<C> {
        self.replaced(self.target().slab(axis, start, end))
    }

    /// See [`Plane::subspace`](crate::Plane::subspace).
    pub fn subspace(&self, ranges: &[SubRange]) -> Tensor<C> {
        self.replaced(self.target().subspace(ranges))
    }

    /// See [`Plane::new_axis`](crate::Plane::new_axis).
    pub fn new_axis(&self, axis: usize) -> Tensor<C> {
        self.replaced(self.target().new_axis(axis))
    }

    /// See [`Plane::squeeze`](crate::Plane::squeeze).
    pub fn squeeze(&self) -> Tensor<C> {
        self.replaced(self.target().squeeze())
    }

    /// See [`Plane::reshape`](crate::Plane::reshape).
    pub fn reshape(&self, dims: impl Into<Dimensions>) -> Result<Tensor<C>, BufferError> {
        Ok(self.replaced(self.target().reshape(&dims.into())?))
    }

    /// See [`Plane::ravel`](crate::Plane::ravel).
    pub fn ravel(&self) -> Result<Tensor<C>, BufferError> {
        Ok(self.replaced(self.target().ravel()?))
    }

    /// See [`Plane::flatten`](crate::Plane::flatten).
    pub fn flatten(&self) -> Result<Tensor<C>, BufferError> {
        Ok(self.replaced(self.target().flatten()?))
    }
}
