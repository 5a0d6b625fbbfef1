/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Ordered collections of planes that together form one tensor.
//!
//! The planes of a tensor may hold different element types (for
//! example an 8-bit luma plane next to a 16-bit depth plane), so the
//! collection stores type-erased [`AnyPlane`] values. Typed access goes
//! through [`Planes::typed`].
//!
//! Every structural edit returns a new collection; the planes it
//! contains still share their buffers with the original.

use std::fmt;

use crate::buffer::BufferError;
use crate::element::Element;
use crate::plane::Plane;
use crate::shape::Dimensions;
use crate::shape::Shape;
use crate::shape::Strides;
use crate::view::SubRange;

/// A plane of any supported element type.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyPlane {
    U8(Plane<u8>),
    U16(Plane<u16>),
    U32(Plane<u32>),
    U64(Plane<u64>),
    I8(Plane<i8>),
    I16(Plane<i16>),
    I32(Plane<i32>),
    I64(Plane<i64>),
    F32(Plane<f32>),
    F64(Plane<f64>),
}

/// Evaluates `$body` with `$plane` bound to the typed plane inside
/// `$value`, whatever its element type.
macro_rules! with_plane {
    ($value:expr, $plane:ident => $body:expr) => {
        match $value {
            $crate::planes::AnyPlane::U8($plane) => $body,
            $crate::planes::AnyPlane::U16($plane) => $body,
            $crate::planes::AnyPlane::U32($plane) => $body,
            $crate::planes::AnyPlane::U64($plane) => $body,
            $crate::planes::AnyPlane::I8($plane) => $body,
            $crate::planes::AnyPlane::I16($plane) => $body,
            $crate::planes::AnyPlane::I32($plane) => $body,
            $crate::planes::AnyPlane::I64($plane) => $body,
            $crate::planes::AnyPlane::F32($plane) => $body,
            $crate::planes::AnyPlane::F64($plane) => $body,
        }
    };
}

/// Like [`with_plane!`], but rewraps the resulting plane in the same
/// variant.
macro_rules! map_plane {
    ($value:expr, $plane:ident => $body:expr) => {
        match $value {
            $crate::planes::AnyPlane::U8($plane) => $crate::planes::AnyPlane::U8($body),
            $crate::planes::AnyPlane::U16($plane) => $crate::planes::AnyPlane::U16($body),
            $crate::planes::AnyPlane::U32($plane) => $crate::planes::AnyPlane::U32($body),
            $crate::planes::AnyPlane::U64($plane) => $crate::planes::AnyPlane::U64($body),
            $crate::planes::AnyPlane::I8($plane) => $crate::planes::AnyPlane::I8($body),
            $crate::planes::AnyPlane::I16($plane) => $crate::planes::AnyPlane::I16($body),
            $crate::planes::AnyPlane::I32($plane) => $crate::planes::AnyPlane::I32($body),
            $crate::planes::AnyPlane::I64($plane) => $crate::planes::AnyPlane::I64($body),
            $crate::planes::AnyPlane::F32($plane) => $crate::planes::AnyPlane::F32($body),
            $crate::planes::AnyPlane::F64($plane) => $crate::planes::AnyPlane::F64($body),
        }
    };
}

pub(crate) use with_plane;

impl AnyPlane {
    /// Name of the element type, e.g. `"u8"`.
    pub fn element_name(&self) -> &'static str {
        fn name<T: Element>(_: &Plane<T>) -> &'static str {
            T::NAME
        }
        with_plane!(self, p => name(p))
    }

    pub fn shape(&self) -> &Shape {
        with_plane!(self, p => p.shape())
    }

    pub fn dimensions(&self) -> &Dimensions {
        with_plane!(self, p => p.dimensions())
    }

    pub fn strides(&self) -> &Strides {
        with_plane!(self, p => p.strides())
    }

    pub fn channels(&self) -> usize {
        with_plane!(self, p => p.channels())
    }

    pub fn offset(&self) -> usize {
        with_plane!(self, p => p.offset())
    }

    pub fn rank(&self) -> usize {
        with_plane!(self, p => p.rank())
    }

    pub fn total(&self) -> usize {
        with_plane!(self, p => p.total())
    }

    /// Storage address shared by every view of the same buffer.
    pub fn buffer_identity(&self) -> usize {
        with_plane!(self, p => p.buffer().identity())
    }

    pub fn deep_clone(&self) -> Result<AnyPlane, BufferError> {
        Ok(map_plane!(self, p => p.deep_clone()?))
    }

    pub fn permute(&self, order: &[usize]) -> AnyPlane {
        map_plane!(self, p => p.permute(order))
    }

    pub fn slice(&self, axis: usize, index: usize) -> AnyPlane {
        map_plane!(self, p => p.slice(axis, index))
    }

    pub fn slab(&self, axis: usize, start: usize, end: usize) -> AnyPlane {
        map_plane!(self, p => p.slab(axis, start, end))
    }

    pub fn subspace(&self, ranges: &[SubRange]) -> AnyPlane {
        map_plane!(self, p => p.subspace(ranges))
    }

    pub fn new_axis(&self, axis: usize) -> AnyPlane {
        map_plane!(self, p => p.new_axis(axis))
    }

    pub fn squeeze(&self) -> AnyPlane {
        map_plane!(self, p => p.squeeze())
    }

    pub fn reshape(&self, dims: &Dimensions) -> Result<AnyPlane, BufferError> {
        Ok(map_plane!(self, p => p.reshape(dims.clone())?))
    }

    pub fn ravel(&self) -> Result<AnyPlane, BufferError> {
        Ok(map_plane!(self, p => p.ravel()?))
    }

    pub fn flatten(&self) -> Result<AnyPlane, BufferError> {
        Ok(map_plane!(self, p => p.flatten()?))
    }
}

impl<T: Element> From<Plane<T>> for AnyPlane {
    fn from(plane: Plane<T>) -> Self {
        T::wrap(plane)
    }
}

impl fmt::Display for AnyPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        with_plane!(self, p => fmt::Display::fmt(p, f))
    }
}

/// A fixed, ordered collection of planes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Planes {
    planes: Vec<AnyPlane>,
}

impl Planes {
    pub fn new(planes: Vec<AnyPlane>) -> Self {
        Self { planes }
    }

    /// Number of planes in the collection.
    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AnyPlane> {
        self.planes.iter()
    }

    pub fn as_slice(&self) -> &[AnyPlane] {
        &self.planes
    }

    pub fn into_vec(self) -> Vec<AnyPlane> {
        self.planes
    }

    fn check_index(&self, idx: usize) {
        assert!(
            idx < self.len(),
            "plane index {} out of range for {} planes",
            idx,
            self.len()
        );
    }

    /// The plane at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= len()`.
    pub fn plane(&self, idx: usize) -> &AnyPlane {
        self.check_index(idx);
        &self.planes[idx]
    }

    /// The plane at `idx` with its element type recovered.
    ///
    /// # Panics
    ///
    /// Panics if `idx >= len()` or the plane holds another element
    /// type.
    pub fn typed<T: Element>(&self, idx: usize) -> &Plane<T> {
        let plane = self.plane(idx);
        T::project(plane).unwrap_or_else(|| {
            panic!(
                "plane {} holds {} elements, not {}",
                idx,
                plane.element_name(),
                T::NAME
            )
        })
    }

    /// Prepends `planes`, keeping their relative order.
    pub fn push_front<I, P>(&self, planes: I) -> Planes
    where
        I: IntoIterator<Item = P>,
        P: Into<AnyPlane>,
    {
        planes
            .into_iter()
            .map(Into::into)
            .chain(self.planes.iter().cloned())
            .collect()
    }

    /// Appends `planes`, keeping their relative order.
    pub fn push_back<I, P>(&self, planes: I) -> Planes
    where
        I: IntoIterator<Item = P>,
        P: Into<AnyPlane>,
    {
        self.planes
            .iter()
            .cloned()
            .chain(planes.into_iter().map(Into::into))
            .collect()
    }

    /// Inserts `plane` so that it ends up at position `at`.
    ///
    /// # Panics
    ///
    /// Panics if `at > len()`.
    pub fn insert(&self, at: usize, plane: impl Into<AnyPlane>) -> Planes {
        assert!(
            at <= self.len(),
            "insert position {} out of range for {} planes",
            at,
            self.len()
        );
        let mut planes = self.planes.clone();
        planes.insert(at, plane.into());
        Planes { planes }
    }

    /// Drops the planes at `indices`; the remaining planes keep their
    /// relative order.
    ///
    /// # Panics
    ///
    /// Panics if an index repeats or is out of range.
    pub fn remove(&self, indices: &[usize]) -> Planes {
        let mut removed = vec![false; self.len()];
        for &idx in indices {
            self.check_index(idx);
            assert!(!removed[idx], "plane index {} removed twice", idx);
            removed[idx] = true;
        }
        self.planes
            .iter()
            .zip(removed)
            .filter(|&(_, removed)| !removed)
            .map(|(plane, _)| plane.clone())
            .collect()
    }

    /// Substitutes the plane at `at`.
    ///
    /// # Panics
    ///
    /// Panics if `at >= len()`.
    pub fn replace(&self, at: usize, plane: impl Into<AnyPlane>) -> Planes {
        self.check_index(at);
        let mut planes = self.planes.clone();
        planes[at] = plane.into();
        Planes { planes }
    }

    /// Projects onto the planes at `indices`, in that order. An index
    /// may be named more than once.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of range.
    pub fn keep(&self, indices: &[usize]) -> Planes {
        indices
            .iter()
            .map(|&idx| self.plane(idx).clone())
            .collect()
    }

    /// Partitions the collection before each of `cuts`. A leading cut
    /// at 0 does not produce an empty part.
    ///
    /// # Panics
    ///
    /// Panics unless the cuts are strictly increasing and below
    /// `len()`.
    pub fn split(&self, cuts: &[usize]) -> Vec<Planes> {
        for pair in cuts.windows(2) {
            assert!(
                pair[0] < pair[1],
                "cut points {:?} are not strictly increasing",
                cuts
            );
        }
        if let Some(&last) = cuts.last() {
            assert!(
                last < self.len(),
                "cut point {} out of range for {} planes",
                last,
                self.len()
            );
        }

        let mut parts = Vec::with_capacity(cuts.len() + 1);
        let mut start = 0;
        for &cut in cuts {
            if cut > start {
                parts.push(Planes::new(self.planes[start..cut].to_vec()));
            }
            start = cut;
        }
        parts.push(Planes::new(self.planes[start..].to_vec()));
        parts
    }

    /// This collection followed by `other`.
    pub fn merge(&self, other: &Planes) -> Planes {
        self.planes
            .iter()
            .chain(other.planes.iter())
            .cloned()
            .collect()
    }

    /// Copies every plane into new storage.
    pub fn deep_clone(&self) -> Result<Planes, BufferError> {
        self.planes.iter().map(AnyPlane::deep_clone).collect()
    }
}

impl FromIterator<AnyPlane> for Planes {
    fn from_iter<I: IntoIterator<Item = AnyPlane>>(iter: I) -> Self {
        Planes {
            planes: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Planes {
    type Item = &'a AnyPlane;
    type IntoIter = std::slice::Iter<'a, AnyPlane>;

    fn into_iter(self) -> Self::IntoIter {
        self.planes.iter()
    }
}

impl IntoIterator for Planes {
    type Item = AnyPlane;
    type IntoIter = std::vec::IntoIter<AnyPlane>;

    fn into_iter(self) -> Self::IntoIter {
        self.planes.into_iter()
    }
}

impl From<Vec<AnyPlane>> for Planes {
    fn from(planes: Vec<AnyPlane>) -> Self {
        Planes { planes }
    }
}

impl fmt::Display for Planes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, plane) in self.planes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", plane)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(planes: &Planes) -> Vec<usize> {
        planes.iter().map(AnyPlane::total).collect()
    }

    // Planes are told apart by their (distinct) element counts.
    fn sample() -> Planes {
        (1..=4)
            .map(|n| AnyPlane::from(Plane::from_vec(vec![0u8; n], [n], 1)))
            .collect()
    }

    #[test]
    fn test_push() {
        let planes = sample();
        let front = planes.push_front([Plane::from_vec(vec![0u8; 7], [7], 1)]);
        assert_eq!(ids(&front), vec![7, 1, 2, 3, 4]);
        let back = planes.push_back(vec![
            Plane::from_vec(vec![0u8; 8], [8], 1),
            Plane::from_vec(vec![0u8; 9], [9], 1),
        ]);
        assert_eq!(ids(&back), vec![1, 2, 3, 4, 8, 9]);
        // The original is untouched.
        assert_eq!(ids(&planes), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_insert_and_replace() {
        let planes = sample();
        let inserted = planes.insert(4, Plane::from_vec(vec![0u8; 6], [6], 1));
        assert_eq!(ids(&inserted), vec![1, 2, 3, 4, 6]);
        let replaced = planes.replace(1, Plane::from_vec(vec![0u8; 6], [6], 1));
        assert_eq!(ids(&replaced), vec![1, 6, 3, 4]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_insert_out_of_range() {
        sample().insert(5, Plane::from_vec(vec![0u8], [1], 1));
    }

    #[test]
    fn test_remove_and_keep() {
        let planes = sample();
        assert_eq!(ids(&planes.remove(&[2, 0])), vec![2, 4]);
        assert_eq!(ids(&planes.keep(&[3, 0, 1])), vec![4, 1, 2]);
        assert_eq!(ids(&planes.keep(&[1, 1])), vec![2, 2]);
    }

    #[test]
    #[should_panic(expected = "removed twice")]
    fn test_remove_duplicates() {
        sample().remove(&[1, 1]);
    }

    #[test]
    fn test_split_and_merge() {
        let planes = sample();
        let parts = planes.split(&[1, 3]);
        assert_eq!(parts.iter().map(ids).collect::<Vec<_>>(), vec![
            vec![1],
            vec![2, 3],
            vec![4]
        ]);
        let parts = planes.split(&[0, 2]);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].merge(&parts[1]), planes);
    }

    #[test]
    #[should_panic(expected = "strictly increasing")]
    fn test_split_unordered() {
        sample().split(&[2, 1]);
    }

    #[test]
    fn test_heterogeneous_typed_access() {
        let luma = Plane::from_vec(vec![1u8, 2, 3, 4], [2, 2], 1);
        let depth = Plane::from_vec(vec![1.5f32, 2.5], [2], 1);
        let planes = Planes::new(vec![luma.clone().into(), depth.into()]);
        assert_eq!(planes.typed::<u8>(0), &luma);
        assert_eq!(planes.typed::<f32>(1).to_vec(), vec![1.5, 2.5]);
        assert_eq!(planes.plane(1).element_name(), "f32");
    }

    #[test]
    #[should_panic(expected = "not u16")]
    fn test_typed_mismatch() {
        let planes = Planes::new(vec![Plane::from_vec(vec![1u8], [1], 1).into()]);
        planes.typed::<u16>(0);
    }

    #[test]
    fn test_edits_share_buffers() {
        let planes = sample();
        let kept = planes.keep(&[2]);
        assert_eq!(
            kept.plane(0).buffer_identity(),
            planes.plane(2).buffer_identity()
        );
        let copy = planes.deep_clone().unwrap();
        assert_eq!(copy, planes);
        assert_ne!(
            copy.plane(2).buffer_identity(),
            planes.plane(2).buffer_identity()
        );
    }

    #[test]
    fn test_display() {
        let planes = Planes::new(vec![Plane::from_vec(vec![1u8, 2], [2], 1).into()]);
        assert_eq!(planes.to_string(), "{u8 [sz=[2] st=[1]]x1 @0}");
    }
}
