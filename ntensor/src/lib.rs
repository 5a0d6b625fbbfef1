/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Layout and indexing core for strided multidimensional arrays.
//!
//! Provides [`Plane`], a view of a shared [`Buffer`] through a
//! [`Shape`] (per-dimension extents and element strides), a channel
//! count and an offset. A [`Tensor`] groups one or more planes, which
//! models planar, interleaved, semi-interleaved and packed
//! multi-component data.
//!
//! Shape transmutations (permute, slice, slab, subspace, new axis,
//! squeeze, reshape) only rewrite strides and offsets whenever that is
//! possible; see [`plan_reshape`] for when reshape has to copy.
//! [`execute`] applies a function element-wise across planes.
//!
//! Dimensions and strides are stored innermost first: index 0 is the
//! fastest-varying dimension.

/// Shared element storage, dense or sparse.
pub mod buffer;

/// Engine settings with environment overrides.
pub mod config;

mod element;
mod execute;
mod plane;
mod planes;
mod reshape;

/// Extents, strides and the functions relating them.
pub mod shape;

/// Text serialization of tensors.
pub mod stream;

mod tensor;
mod transmute;
mod view;

#[cfg(test)]
mod property_tests;
#[cfg(test)]
mod strategy;

pub use buffer::Buffer;
pub use buffer::BufferError;
pub use config::Config;
pub use config::ConfigError;
pub use element::Element;
pub use execute::execute;
pub use execute::execute_indexed;
pub use execute::execute_tensors;
pub use execute::Binary;
pub use execute::ElementFn;
pub use execute::Quaternary;
pub use execute::Ternary;
pub use execute::Unary;
pub use plane::LinearIndices;
pub use plane::Plane;
pub use planes::AnyPlane;
pub use planes::Planes;
pub use reshape::can_reshape_in_place;
pub use reshape::plan_reshape;
pub use reshape::ReshapePlan;
pub use shape::Dimensions;
pub use shape::Shape;
pub use shape::ShapeError;
pub use shape::Strides;
pub use shape::ALIGNMENT;
pub use stream::Delimiters;
pub use stream::Document;
pub use stream::StreamError;
pub use stream::StreamFormat;
/// Capability sets selecting the operations of a [`Tensor`].
pub use tensor::capability;
pub use tensor::Tensor;
pub use transmute::PlaneOps;
pub use view::SubRange;
