/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Tensors: a [`Planes`] collection plus a set of capabilities.
//!
//! The capability set is a type parameter. It decides which
//! operations a tensor exposes, but not what the tensor *is*: two
//! tensors compare equal whenever their planes do, whatever their
//! capabilities. [`Tensor::like`] moves the same planes to another
//! capability set.
//!
//! ```
//! use ntensor::Plane;
//! use ntensor::Tensor;
//! use ntensor::capability::Bare;
//!
//! let tensor: Tensor = Tensor::from_plane(Plane::from_vec((0u8..6).collect(), [3, 2], 1));
//! let transposed = tensor.permute(&[1, 0]);
//! assert_eq!(transposed.plane(0).dimensions().as_slice(), &[2, 3]);
//!
//! // A bare tensor has no shape operations; moving back is free.
//! let bare = transposed.like::<Bare>();
//! assert_eq!(bare, transposed);
//! ```

use std::fmt;
use std::marker::PhantomData;

use crate::buffer::BufferError;
use crate::element::Element;
use crate::plane::Plane;
use crate::planes::AnyPlane;
use crate::planes::Planes;
use crate::shape::Dimensions;

/// Capability sets.
pub mod capability {
    mod sealed {
        pub trait Sealed {}
    }

    /// A capability set usable as the parameter of a
    /// [`Tensor`](crate::Tensor).
    pub trait Capabilities: sealed::Sealed + Send + Sync + 'static {}

    /// Capability sets exposing shape transmutations.
    pub trait Transmutable: Capabilities {}

    /// Capability sets exposing element access by index.
    pub trait RawAccessible: Capabilities {}

    /// No operations beyond plane access.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Bare;

    /// Shape transmutations only.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Transmute;

    /// Raw element access only.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Raw;

    /// Every capability.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Full;

    impl sealed::Sealed for Bare {}
    impl sealed::Sealed for Transmute {}
    impl sealed::Sealed for Raw {}
    impl sealed::Sealed for Full {}

    impl Capabilities for Bare {}
    impl Capabilities for Transmute {}
    impl Capabilities for Raw {}
    impl Capabilities for Full {}

    impl Transmutable for Transmute {}
    impl Transmutable for Full {}

    impl RawAccessible for Raw {}
    impl RawAccessible for Full {}
}

use capability::Capabilities;
use capability::Full;
use capability::RawAccessible;

/// One logical tensor: at least one plane, viewed through the
/// capability set `C`.
pub struct Tensor<C: Capabilities = Full> {
    planes: Planes,
    capabilities: PhantomData<C>,
}

impl<C: Capabilities> Clone for Tensor<C> {
    fn clone(&self) -> Self {
        Self::new(self.planes.clone())
    }
}

impl<C: Capabilities> Tensor<C> {
    /// Wraps `planes`.
    ///
    /// # Panics
    ///
    /// Panics if `planes` is empty.
    pub fn new(planes: Planes) -> Self {
        assert!(!planes.is_empty(), "a tensor needs at least one plane");
        Self {
            planes,
            capabilities: PhantomData,
        }
    }

    /// A single-plane tensor.
    pub fn from_plane(plane: impl Into<AnyPlane>) -> Self {
        Self::new(Planes::new(vec![plane.into()]))
    }

    pub fn planes(&self) -> &Planes {
        &self.planes
    }

    pub fn into_planes(self) -> Planes {
        self.planes
    }

    /// The plane at `idx`.
    pub fn plane(&self, idx: usize) -> &AnyPlane {
        self.planes.plane(idx)
    }

    /// The plane at `idx` with its element type recovered.
    pub fn typed<T: Element>(&self, idx: usize) -> &Plane<T> {
        self.planes.typed(idx)
    }

    /// Number of planes.
    pub fn len(&self) -> usize {
        self.planes.len()
    }

    /// Always false: a tensor holds at least one plane.
    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// The same planes under another capability set.
    pub fn like<D: Capabilities>(&self) -> Tensor<D> {
        Tensor::new(self.planes.clone())
    }

    /// Other planes under another capability set.
    pub fn like_with<D: Capabilities>(&self, planes: Planes) -> Tensor<D> {
        Tensor::new(planes)
    }

    /// Copies every plane into new storage.
    pub fn deep_clone(&self) -> Result<Self, BufferError> {
        Ok(Self::new(self.planes.deep_clone()?))
    }

    /// The planes of this tensor with `plane` substituted at `idx`.
    pub(crate) fn with_plane(&self, idx: usize, plane: AnyPlane) -> Self {
        Self::new(self.planes.replace(idx, plane))
    }

    /// `components` single-channel planes of the same dimensions.
    pub fn planar<T: Element>(
        dims: impl Into<Dimensions>,
        components: usize,
    ) -> Result<Self, BufferError> {
        assert!(components >= 1, "a planar tensor needs at least one component");
        let dims = dims.into();
        (0..components)
            .map(|_| Plane::<T>::dense(dims.clone(), 1).map(AnyPlane::from))
            .collect::<Result<Planes, _>>()
            .map(Self::new)
    }

    /// One plane with `channels` values stored next to each other per
    /// element.
    pub fn interleaved<T: Element>(
        dims: impl Into<Dimensions>,
        channels: usize,
    ) -> Result<Self, BufferError> {
        Ok(Self::from_plane(Plane::<T>::dense(dims, channels)?))
    }

    /// A full-resolution single-channel plane followed by one plane
    /// holding the remaining `channels - 1` components interleaved at
    /// half resolution along the two innermost dimensions (rounded
    /// up), as in NV12-style images.
    pub fn semi_interleaved<T: Element>(
        dims: impl Into<Dimensions>,
        channels: usize,
    ) -> Result<Self, BufferError> {
        assert!(
            channels >= 2,
            "a semi-interleaved tensor needs at least two channels, got {}",
            channels
        );
        let dims = dims.into();
        let half: Vec<usize> = dims
            .iter()
            .enumerate()
            .map(|(axis, &d)| if axis < 2 { d.div_ceil(2) } else { d })
            .collect();
        let luma = Plane::<T>::dense(dims, 1)?;
        let chroma = Plane::<T>::dense(half, channels - 1)?;
        Ok(Self::new(Planes::new(vec![luma.into(), chroma.into()])))
    }

    /// One single-channel plane with the components as an extra
    /// innermost dimension of extent `components`.
    pub fn packed<T: Element>(
        dims: impl Into<Dimensions>,
        components: usize,
    ) -> Result<Self, BufferError> {
        assert!(components >= 1, "a packed tensor needs at least one component");
        let dims: Dimensions = dims.into();
        let extents: Vec<usize> = std::iter::once(components)
            .chain(dims.iter().copied())
            .collect();
        Ok(Self::from_plane(Plane::<T>::dense(extents, 1)?))
    }
}

impl<C: RawAccessible> Tensor<C> {
    /// Reads buffer element `offset + index` of plane `idx`.
    pub fn at<T: Element>(&self, idx: usize, index: usize) -> T {
        self.typed::<T>(idx).at(index)
    }

    /// Writes buffer element `offset + index` of plane `idx`.
    pub fn set_at<T: Element>(&self, idx: usize, index: usize, value: T) {
        self.typed::<T>(idx).set_at(index, value)
    }

    /// Reads `channel` of the element at `coord` in plane `idx`.
    pub fn slicing_value<T: Element>(&self, idx: usize, channel: usize, coord: &[usize]) -> T {
        self.typed::<T>(idx).slicing_value(channel, coord)
    }

    /// Writes `channel` of the element at `coord` in plane `idx`.
    pub fn set_slicing_value<T: Element>(
        &self,
        idx: usize,
        channel: usize,
        coord: &[usize],
        value: T,
    ) {
        self.typed::<T>(idx).set_slicing_value(channel, coord, value)
    }

    /// Storage address of plane `idx`; equal across views of one
    /// buffer.
    pub fn buffer_identity(&self, idx: usize) -> usize {
        self.plane(idx).buffer_identity()
    }
}

impl<C: Capabilities, D: Capabilities> PartialEq<Tensor<D>> for Tensor<C> {
    fn eq(&self, other: &Tensor<D>) -> bool {
        self.planes == other.planes
    }
}

impl<C: Capabilities> fmt::Debug for Tensor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("capabilities", &std::any::type_name::<C>())
            .field("planes", &self.planes)
            .finish()
    }
}

impl<C: Capabilities> fmt::Display for Tensor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor{}", self.planes)
    }
}
