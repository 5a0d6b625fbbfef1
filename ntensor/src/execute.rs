/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Element-wise traversal of one or more planes.
//!
//! [`execute`] calls a function once per logical value, handing it a
//! mutable reference to the corresponding value of every participating
//! plane. Two algorithms are used:
//!
//! - **lock-step**: when every plane has the same dimensions and
//!   channel count, the outermost dimension is peeled off one index at
//!   a time down to the innermost one, which is processed in batches of
//!   `execute_batch_bytes / size_of::<T>() / channels` elements (at
//!   least one). Each batch is loaded, transformed and stored back,
//!   mirroring a SIMD register.
//! - **by index**: when dimensions differ but every plane holds the
//!   same number of values, each logical index is decomposed into a
//!   coordinate per plane. This is slower and only used as a fallback,
//!   notably by the copy path of reshape.
//!
//! The arity of the callback is part of its type: closures taking one
//! to four `&mut T` arguments are accepted. Argument types must be
//! annotated so the arity can be inferred:
//!
//! ```
//! use ntensor::Plane;
//! use ntensor::execute;
//!
//! let a = Plane::from_vec(vec![1i32, 2, 3], [3], 1);
//! let b = Plane::from_vec(vec![10i32, 20, 30], [3], 1);
//! execute(|x: &mut i32, y: &mut i32| *x += *y, &[&a, &b]);
//! assert_eq!(a.to_vec(), vec![11, 22, 33]);
//! ```
//!
//! A callback of arity 1 given several planes visits each plane on its
//! own. Planes aliasing the same storage observe writes at batch
//! granularity.

use std::mem;

use crate::config;
use crate::element::Element;
use crate::plane::Plane;
use crate::shape::coordinates;
use crate::tensor::capability::Capabilities;
use crate::tensor::Tensor;

/// Marker for callbacks taking one value.
pub enum Unary {}
/// Marker for callbacks taking two values.
pub enum Binary {}
/// Marker for callbacks taking three values.
pub enum Ternary {}
/// Marker for callbacks taking four values.
pub enum Quaternary {}

/// A function applied to one value of each of `ARITY` planes.
///
/// `Args` is a marker type that keeps the implementations for the
/// different closure signatures apart.
pub trait ElementFn<T, Args> {
    const ARITY: usize;

    /// Calls the function; `values` holds exactly `ARITY` values.
    fn call(&mut self, values: &mut [T]);
}

impl<T, F> ElementFn<T, Unary> for F
where
    F: FnMut(&mut T),
{
    const ARITY: usize = 1;

    #[inline]
    fn call(&mut self, values: &mut [T]) {
        match values {
            [a] => self(a),
            _ => unreachable!("unary callback given {} values", values.len()),
        }
    }
}

impl<T, F> ElementFn<T, Binary> for F
where
    F: FnMut(&mut T, &mut T),
{
    const ARITY: usize = 2;

    #[inline]
    fn call(&mut self, values: &mut [T]) {
        match values {
            [a, b] => self(a, b),
            _ => unreachable!("binary callback given {} values", values.len()),
        }
    }
}

impl<T, F> ElementFn<T, Ternary> for F
where
    F: FnMut(&mut T, &mut T, &mut T),
{
    const ARITY: usize = 3;

    #[inline]
    fn call(&mut self, values: &mut [T]) {
        match values {
            [a, b, c] => self(a, b, c),
            _ => unreachable!("ternary callback given {} values", values.len()),
        }
    }
}

impl<T, F> ElementFn<T, Quaternary> for F
where
    F: FnMut(&mut T, &mut T, &mut T, &mut T),
{
    const ARITY: usize = 4;

    #[inline]
    fn call(&mut self, values: &mut [T]) {
        match values {
            [a, b, c, d] => self(a, b, c, d),
            _ => unreachable!("quaternary callback given {} values", values.len()),
        }
    }
}

/// Applies `f` to every logical value of `planes`.
///
/// # Panics
///
/// Panics if `planes` is empty, if the arity of `f` is neither 1 nor
/// the number of planes, or if the planes hold different numbers of
/// values.
pub fn execute<T, A, F>(mut f: F, planes: &[&Plane<T>])
where
    T: Element,
    F: ElementFn<T, A>,
{
    assert!(!planes.is_empty(), "execute needs at least one plane");
    if F::ARITY == planes.len() {
        traverse(planes, &mut |_, values: &mut [T]| f.call(values));
        return;
    }
    assert_eq!(
        F::ARITY,
        1,
        "callback of arity {} cannot run over {} planes",
        F::ARITY,
        planes.len()
    );
    tracing::trace!(planes = planes.len(), "executing unary callback per plane");
    for plane in planes {
        traverse(&[*plane], &mut |_, values: &mut [T]| f.call(values));
    }
}

/// Like [`execute`], but `f` also receives the logical index of the
/// value (channels fastest, then the innermost dimension) and one value
/// per plane as a slice.
pub fn execute_indexed<T, F>(mut f: F, planes: &[&Plane<T>])
where
    T: Element,
    F: FnMut(usize, &mut [T]),
{
    assert!(!planes.is_empty(), "execute needs at least one plane");
    traverse(planes, &mut f);
}

/// Applies `f` across every plane of every tensor, in order.
///
/// # Panics
///
/// Panics if a plane does not hold elements of type `T`, and under the
/// conditions listed for [`execute`].
pub fn execute_tensors<T, A, F, C>(f: F, tensors: &[&Tensor<C>])
where
    T: Element,
    F: ElementFn<T, A>,
    C: Capabilities,
{
    let planes: Vec<&Plane<T>> = tensors
        .iter()
        .flat_map(|tensor| tensor.planes().iter())
        .map(|plane| {
            T::project(plane).unwrap_or_else(|| {
                panic!(
                    "cannot execute a {} callback over a {} plane",
                    T::NAME,
                    plane.element_name()
                )
            })
        })
        .collect();
    execute(f, &planes);
}

fn traverse<T, F>(planes: &[&Plane<T>], f: &mut F)
where
    T: Element,
    F: FnMut(usize, &mut [T]),
{
    let first = planes[0];
    let lockstep = planes
        .iter()
        .all(|p| p.dimensions() == first.dimensions() && p.channels() == first.channels());

    if lockstep {
        let batch_bytes = config::global::get().execute_batch_bytes;
        let batch = (batch_bytes / mem::size_of::<T>() / first.channels()).max(1);
        tracing::trace!(
            planes = planes.len(),
            dims = %first.dimensions(),
            batch,
            "executing in lock-step"
        );
        Lockstep::new(planes, batch).run(f);
        return;
    }

    let values = first.scalar_count();
    for plane in planes {
        assert_eq!(
            plane.scalar_count(),
            values,
            "cannot execute over planes holding {} and {} values",
            values,
            plane.scalar_count()
        );
    }
    tracing::trace!(planes = planes.len(), values, "executing by index");
    by_index(planes, values, f);
}

/// State of the lock-step traversal. `scratch` holds one batch, laid
/// out value-major so that the values of all planes for one position
/// are contiguous.
struct Lockstep<'a, 'p, T: Element> {
    planes: &'a [&'p Plane<T>],
    dims: &'p [usize],
    channels: usize,
    batch: usize,
    scratch: Vec<T>,
    loaded: Vec<T>,
    linear: usize,
}

impl<'a, 'p, T: Element> Lockstep<'a, 'p, T> {
    fn new(planes: &'a [&'p Plane<T>], batch: usize) -> Self {
        let channels = planes[0].channels();
        let width = batch * channels * planes.len();
        Self {
            planes,
            dims: planes[0].dimensions(),
            channels,
            batch,
            scratch: vec![T::ZERO; width],
            loaded: vec![T::ZERO; width],
            linear: 0,
        }
    }

    fn run<F: FnMut(usize, &mut [T])>(&mut self, f: &mut F) {
        let bases: Vec<isize> = self.planes.iter().map(|p| p.offset() as isize).collect();
        self.peel(self.dims.len() - 1, &bases, f);
    }

    fn peel<F: FnMut(usize, &mut [T])>(&mut self, axis: usize, bases: &[isize], f: &mut F) {
        if axis == 0 {
            self.innermost(bases, f);
            return;
        }
        let channels = self.channels as isize;
        let mut next = bases.to_vec();
        for i in 0..self.dims[axis] {
            for (k, plane) in self.planes.iter().enumerate() {
                next[k] = bases[k] + i as isize * plane.strides()[axis] * channels;
            }
            self.peel(axis - 1, &next, f);
        }
    }

    fn innermost<F: FnMut(usize, &mut [T])>(&mut self, bases: &[isize], f: &mut F) {
        let count = self.planes.len();
        let channels = self.channels;
        let extent = self.dims[0];

        let mut start = 0;
        while start < extent {
            let run = self.batch.min(extent - start);
            let width = run * channels;

            for (k, plane) in self.planes.iter().enumerate() {
                let step = plane.strides()[0] * channels as isize;
                let buffer = plane.buffer();
                for j in 0..run {
                    let origin = bases[k] + (start + j) as isize * step;
                    for c in 0..channels {
                        let value = buffer.get((origin + c as isize) as usize);
                        self.scratch[(j * channels + c) * count + k] = value;
                    }
                }
            }
            self.loaded[..width * count].copy_from_slice(&self.scratch[..width * count]);

            for values in self.scratch[..width * count].chunks_exact_mut(count) {
                f(self.linear, values);
                self.linear += 1;
            }

            for (k, plane) in self.planes.iter().enumerate() {
                let step = plane.strides()[0] * channels as isize;
                let buffer = plane.buffer();
                for j in 0..run {
                    let origin = bases[k] + (start + j) as isize * step;
                    for c in 0..channels {
                        let slot = (j * channels + c) * count + k;
                        if !self.scratch[slot].same_bits(self.loaded[slot]) {
                            buffer.set((origin + c as isize) as usize, self.scratch[slot]);
                        }
                    }
                }
            }
            start += run;
        }
    }
}

fn by_index<T, F>(planes: &[&Plane<T>], values: usize, f: &mut F)
where
    T: Element,
    F: FnMut(usize, &mut [T]),
{
    let mut indices = vec![0usize; planes.len()];
    let mut current = vec![T::ZERO; planes.len()];
    let mut loaded = vec![T::ZERO; planes.len()];
    for linear in 0..values {
        for (k, plane) in planes.iter().enumerate() {
            let channels = plane.channels();
            let coord = coordinates(linear / channels, plane.dimensions());
            indices[k] = plane.linear_index(linear % channels, &coord);
            current[k] = plane.buffer().get(indices[k]);
        }
        loaded.copy_from_slice(&current);
        f(linear, &mut current);
        for (k, plane) in planes.iter().enumerate() {
            if !current[k].same_bits(loaded[k]) {
                plane.buffer().set(indices[k], current[k]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::config::global;

    #[test]
    fn test_fill_ascending() {
        let plane = Plane::<u16>::dense([6, 2, 4], 1).unwrap();
        let mut next = 0;
        execute(
            |x: &mut u16| {
                *x = next;
                next += 1;
            },
            &[&plane],
        );
        assert_eq!(plane.to_vec(), (0u16..48).collect::<Vec<_>>());
    }

    #[test]
    fn test_coverage_with_channels() {
        let plane = Plane::<f32>::dense([5, 3, 2], 3).unwrap();
        let mut seen = HashSet::new();
        let mut calls = 0;
        execute_indexed(
            |linear, values| {
                assert_eq!(values.len(), 1);
                assert!(seen.insert(linear));
                calls += 1;
            },
            &[&plane],
        );
        assert_eq!(calls, 5 * 3 * 2 * 3);
        assert_eq!(seen.len(), calls);
    }

    #[test]
    fn test_lockstep_binary() {
        let a = Plane::from_vec((0i64..24).collect(), [4, 3, 2], 1);
        let b = Plane::<i64>::dense([4, 3, 2], 1).unwrap();
        execute(|dst: &mut i64, src: &mut i64| *dst = *src * 2, &[&b, &a]);
        assert_eq!(b.to_vec(), (0i64..24).map(|x| x * 2).collect::<Vec<_>>());
        // The source is untouched.
        assert_eq!(a.to_vec(), (0i64..24).collect::<Vec<_>>());
    }

    #[test]
    fn test_lockstep_follows_views() {
        let base = Plane::from_vec((0i32..12).collect(), [4, 3], 1);
        let transposed = base.permute(&[1, 0]);
        let out = Plane::<i32>::dense([3, 4], 1).unwrap();
        execute(|dst: &mut i32, src: &mut i32| *dst = *src, &[&out, &transposed]);
        assert_eq!(out.slicing_value(0, &[2, 1]), base.slicing_value(0, &[1, 2]));
        assert_eq!(out.to_vec(), transposed.to_vec());
    }

    #[test]
    fn test_ternary_and_quaternary() {
        let a = Plane::from_vec(vec![1.0f64, 2.0], [2], 1);
        let b = Plane::from_vec(vec![3.0f64, 4.0], [2], 1);
        let c = Plane::<f64>::dense([2], 1).unwrap();
        execute(
            |a: &mut f64, b: &mut f64, c: &mut f64| *c = *a * *b,
            &[&a, &b, &c],
        );
        assert_eq!(c.to_vec(), vec![3.0, 8.0]);

        let d = Plane::<f64>::dense([2], 1).unwrap();
        execute(
            |a: &mut f64, b: &mut f64, c: &mut f64, d: &mut f64| *d = *a + *b + *c,
            &[&a, &b, &c, &d],
        );
        assert_eq!(d.to_vec(), vec![7.0, 14.0]);
    }

    #[test]
    fn test_index_fallback() {
        let src = Plane::from_vec((0u8..24).collect(), [6, 4], 1);
        let dst = Plane::<u8>::dense([2, 3, 4], 1).unwrap();
        execute(|d: &mut u8, s: &mut u8| *d = *s, &[&dst, &src]);
        assert_eq!(dst.to_vec(), src.to_vec());
        assert_eq!(dst.slicing_value(0, &[1, 2, 3]), 1 + 2 * 2 + 3 * 6);
    }

    #[test]
    fn test_index_fallback_regroups_channels() {
        let packed = Plane::from_vec((0u32..12).collect(), [12], 1);
        let rgb = Plane::<u32>::dense_unaligned([4], 3).unwrap();
        execute(|d: &mut u32, s: &mut u32| *d = *s, &[&rgb, &packed]);
        assert_eq!(rgb.slicing_value(2, &[1]), 5);
    }

    #[test]
    fn test_unary_over_many_planes() {
        let a = Plane::from_vec(vec![1i8; 3], [3], 1);
        let b = Plane::from_vec(vec![2i8; 5], [5], 1);
        let mut calls = 0;
        execute(
            |x: &mut i8| {
                *x = -*x;
                calls += 1;
            },
            &[&a, &b],
        );
        assert_eq!(calls, 8);
        assert_eq!(a.to_vec(), vec![-1; 3]);
        assert_eq!(b.to_vec(), vec![-2; 5]);
    }

    #[test]
    #[should_panic(expected = "arity 2")]
    fn test_arity_mismatch() {
        let a = Plane::from_vec(vec![1i8; 3], [3], 1);
        execute(|_: &mut i8, _: &mut i8| {}, &[&a, &a, &a]);
    }

    #[test]
    #[should_panic(expected = "holding")]
    fn test_total_mismatch() {
        let a = Plane::from_vec(vec![1i8; 3], [3], 1);
        let b = Plane::from_vec(vec![1i8; 4], [4], 1);
        execute(|_: &mut i8, _: &mut i8| {}, &[&a, &b]);
    }

    #[test]
    fn test_batch_width_does_not_change_results() {
        let config = global::lock();
        let src = Plane::from_vec((0i32..60).collect(), [10, 6], 1).slab(0, 1, 9);
        for bytes in [1, 4, 8, 32, 1024] {
            let _guard = config.override_batch_bytes(bytes);
            let dst = Plane::<i32>::dense([8, 6], 1).unwrap();
            let mut order = Vec::new();
            execute_indexed(
                |linear, values| {
                    order.push(linear);
                    values[0] = values[1];
                },
                &[&dst, &src],
            );
            assert_eq!(order, (0..48).collect::<Vec<_>>(), "batch bytes {bytes}");
            assert_eq!(dst.to_vec(), src.to_vec(), "batch bytes {bytes}");
        }
    }

    #[test]
    fn test_reversed_strides() {
        let plane = Plane::from_vec((0i16..6).collect(), [6], 1);
        let reversed = plane.like([6], [-1], 1, 5);
        let out = Plane::<i16>::dense([6], 1).unwrap();
        execute(|o: &mut i16, r: &mut i16| *o = *r, &[&out, &reversed]);
        assert_eq!(out.to_vec(), vec![5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_sparse_writes_only_non_zero() {
        let src = Plane::from_vec(vec![0u8, 3, 0, 0, 7, 0], [6], 1);
        let sparse = Plane::<u8>::sparse([6], 1);
        execute(|d: &mut u8, s: &mut u8| *d = *s, &[&sparse, &src]);
        assert_eq!(sparse.buffer().stored_len(), 2);
        assert_eq!(sparse.to_vec(), src.to_vec());
    }

    #[test]
    fn test_copies_negative_zero() {
        let src = Plane::from_vec(vec![-0.0f64, 1.0], [2], 1);
        let dst = Plane::<f64>::dense([2], 1).unwrap();
        execute(|d: &mut f64, s: &mut f64| *d = *s, &[&dst, &src]);
        assert!(dst.slicing_value(0, &[0]).is_sign_negative());

        // Same values through the index fallback.
        let regrouped = Plane::<f64>::dense([1, 2], 1).unwrap();
        execute(|d: &mut f64, s: &mut f64| *d = *s, &[&regrouped, &src]);
        assert!(regrouped.slicing_value(0, &[0, 0]).is_sign_negative());
        assert_eq!(regrouped.slicing_value(0, &[0, 1]), 1.0);
    }
}
