/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Arithmetic element types that can be stored in a [`Buffer`].
//!
//! The set of element types is closed: every type listed here has a
//! matching variant in [`AnyPlane`], which is what lets a [`Planes`]
//! collection hold planes of different element types side by side.
//!
//! [`Buffer`]: crate::Buffer
//! [`Planes`]: crate::Planes

use std::fmt;
use std::str::FromStr;

use crate::plane::Plane;
use crate::planes::AnyPlane;

mod sealed {
    // Only types in this module can implement it.
    pub trait Sealed {}
}

/// A fixed-size arithmetic value stored in plane buffers.
///
/// All implementors are plain numeric types for which the all-zero
/// bit pattern is the value zero. Dense buffers rely on this to
/// hand out zero-initialized storage.
pub trait Element:
    sealed::Sealed
    + Copy
    + Default
    + PartialEq
    + fmt::Debug
    + fmt::Display
    + FromStr
    + Send
    + Sync
    + 'static
{
    /// The additive identity; absent sparse entries read as this.
    const ZERO: Self;

    /// Short type name used in diagnostics and `Display` output.
    const NAME: &'static str;

    /// Bitwise identity. Unlike `==`, tells `-0.0` from `0.0` and
    /// matches a NaN with itself.
    fn same_bits(self, other: Self) -> bool;

    /// Erases the element type of a plane.
    fn wrap(plane: Plane<Self>) -> AnyPlane;

    /// Recovers a typed plane, if `plane` holds this element type.
    fn project(plane: &AnyPlane) -> Option<&Plane<Self>>;
}

macro_rules! impl_element {
    ($ty:ty => $variant:ident, |$a:ident, $b:ident| $same_bits:expr) => {
        impl sealed::Sealed for $ty {}

        impl Element for $ty {
            const ZERO: Self = 0 as $ty;
            const NAME: &'static str = stringify!($ty);

            #[inline]
            fn same_bits(self, other: Self) -> bool {
                let ($a, $b) = (self, other);
                $same_bits
            }

            #[inline]
            fn wrap(plane: Plane<Self>) -> AnyPlane {
                AnyPlane::$variant(plane)
            }

            #[inline]
            fn project(plane: &AnyPlane) -> Option<&Plane<Self>> {
                match plane {
                    AnyPlane::$variant(plane) => Some(plane),
                    _ => None,
                }
            }
        }
    };
}

impl_element!(u8 => U8, |a, b| a == b);
impl_element!(u16 => U16, |a, b| a == b);
impl_element!(u32 => U32, |a, b| a == b);
impl_element!(u64 => U64, |a, b| a == b);
impl_element!(i8 => I8, |a, b| a == b);
impl_element!(i16 => I16, |a, b| a == b);
impl_element!(i32 => I32, |a, b| a == b);
impl_element!(i64 => I64, |a, b| a == b);
impl_element!(f32 => F32, |a, b| a.to_bits() == b.to_bits());
impl_element!(f64 => F64, |a, b| a.to_bits() == b.to_bits());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_matches_default() {
        assert_eq!(u8::ZERO, u8::default());
        assert_eq!(i64::ZERO, i64::default());
        assert_eq!(f32::ZERO, f32::default());
        assert_eq!(f64::ZERO, 0.0);
    }

    #[test]
    fn test_same_bits() {
        assert!(7u32.same_bits(7));
        assert!(!(-1i8).same_bits(1));
        assert!(!(-0.0f64).same_bits(0.0));
        assert!((-0.0f32).same_bits(-0.0));
        assert!(f64::NAN.same_bits(f64::NAN));
    }

    #[test]
    fn test_wrap_and_project() {
        let plane = Plane::<i16>::from_vec(vec![1, 2, 3], vec![3], 1);
        let erased = i16::wrap(plane.clone());
        assert_eq!(erased.element_name(), "i16");
        assert_eq!(i16::project(&erased), Some(&plane));
        assert!(u16::project(&erased).is_none());
    }
}
