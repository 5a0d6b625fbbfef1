/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Shared element storage.
//!
//! A [`Buffer`] is a reference-counted handle to storage for a fixed
//! number of elements. Cloning a handle is shallow: both handles
//! address the same storage, which is released when the last handle
//! is dropped. [`Buffer::deep_clone`] copies into fresh storage.
//!
//! Two backings are provided:
//!
//! - **dense**: one contiguous allocation aligned to
//!   [`ALIGNMENT`](crate::ALIGNMENT) bytes, O(1) access;
//! - **sparse**: a hash map keyed by element index in which absent
//!   keys read as zero and writing zero stores nothing.
//!
//! Elements are only ever copied in and out, never borrowed, so
//! handles aliasing the same storage can read and write freely on a
//! single thread. Handles may be sent across threads, but concurrent
//! writers are not coordinated: the engine is safe for concurrent
//! readers only while no writer is active.

use std::alloc;
use std::alloc::Layout;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::ptr::NonNull;
use std::slice;
use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use parking_lot::RwLock;

use crate::config;
use crate::element::Element;
use crate::shape::ALIGNMENT;

/// Recoverable failures while obtaining storage.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("no valid layout for {len} elements of {elem_size} bytes")]
    Layout { len: usize, elem_size: usize },

    #[error("allocation of {bytes} bytes failed")]
    Allocation { bytes: usize },
}

/// A contiguous, aligned, zero-initialized run of element cells.
struct DenseStorage<T> {
    ptr: NonNull<AtomicCell<T>>,
    len: usize,
}

// SAFETY: the storage owns its allocation and only exposes it as
// `&[AtomicCell<T>]`, which is itself `Send + Sync` for `T: Send`.
unsafe impl<T: Send> Send for DenseStorage<T> {}
// SAFETY: see above.
unsafe impl<T: Send> Sync for DenseStorage<T> {}

impl<T: Element> DenseStorage<T> {
    fn layout(len: usize) -> Result<Layout, BufferError> {
        let elem_size = mem::size_of::<AtomicCell<T>>();
        let err = BufferError::Layout { len, elem_size };
        let bytes = len.checked_mul(elem_size).ok_or_else(|| err.clone())?;
        let align = ALIGNMENT.max(mem::align_of::<AtomicCell<T>>());
        Layout::from_size_align(bytes, align).map_err(|_| err)
    }

    fn allocate(len: usize) -> Result<Self, BufferError> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len,
            });
        }
        let layout = Self::layout(len)?;
        // SAFETY: `layout` has a non-zero size. Every `Element` is a
        // primitive number for which all-zero bytes are a valid value.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw.cast::<AtomicCell<T>>()).ok_or(BufferError::Allocation {
            bytes: layout.size(),
        })?;
        Ok(Self { ptr, len })
    }

    fn cells(&self) -> &[AtomicCell<T>] {
        // SAFETY: `ptr` is either dangling with `len == 0`, or points to
        // `len` initialized cells owned by `self`.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T> Drop for DenseStorage<T> {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        let elem_size = mem::size_of::<AtomicCell<T>>();
        let align = ALIGNMENT.max(mem::align_of::<AtomicCell<T>>());
        // SAFETY: this is the layout the allocation was made with; it
        // was valid then and `len` has not changed since.
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.len * elem_size, align);
            alloc::dealloc(self.ptr.as_ptr().cast::<u8>(), layout);
        }
    }
}

struct SparseStorage<T> {
    len: usize,
    values: RwLock<HashMap<usize, T>>,
}

enum Storage<T> {
    Dense(DenseStorage<T>),
    Sparse(SparseStorage<T>),
}

/// A shared handle to element storage.
pub struct Buffer<T: Element> {
    storage: Arc<Storage<T>>,
}

impl<T: Element> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<T: Element> Buffer<T> {
    /// Allocates dense, aligned storage for `len` elements.
    ///
    /// The initial contents are unspecified from the caller's point of
    /// view; callers must write before reading.
    pub fn dense(len: usize) -> Result<Self, BufferError> {
        let storage = DenseStorage::allocate(len)?;
        tracing::debug!(
            len,
            element = T::NAME,
            bytes = len * mem::size_of::<T>(),
            "allocated dense buffer"
        );
        Ok(Self {
            storage: Arc::new(Storage::Dense(storage)),
        })
    }

    /// Creates sparse storage addressing `len` elements. Only the
    /// entries written with a non-zero value occupy memory; the
    /// reservation is a capacity hint capped by the configured
    /// [`sparse_reserve_limit`](crate::config::Config::sparse_reserve_limit).
    pub fn sparse(len: usize) -> Self {
        let reserve = len.min(config::global::get().sparse_reserve_limit);
        Self {
            storage: Arc::new(Storage::Sparse(SparseStorage {
                len,
                values: RwLock::new(HashMap::with_capacity(reserve)),
            })),
        }
    }

    /// Copies `values` into a new dense buffer.
    pub fn from_vec(values: Vec<T>) -> Result<Self, BufferError> {
        let buffer = Self::dense(values.len())?;
        for (i, value) in values.into_iter().enumerate() {
            buffer.set(i, value);
        }
        Ok(buffer)
    }

    /// Number of addressable elements.
    pub fn size(&self) -> usize {
        match &*self.storage {
            Storage::Dense(dense) => dense.len,
            Storage::Sparse(sparse) => sparse.len,
        }
    }

    pub fn is_dense(&self) -> bool {
        matches!(&*self.storage, Storage::Dense(_))
    }

    pub fn is_sparse(&self) -> bool {
        matches!(&*self.storage, Storage::Sparse(_))
    }

    /// Number of elements that occupy memory: `size()` for dense
    /// buffers, the number of materialized entries for sparse ones.
    pub fn stored_len(&self) -> usize {
        match &*self.storage {
            Storage::Dense(dense) => dense.len,
            Storage::Sparse(sparse) => sparse.values.read().len(),
        }
    }

    fn check_index(&self, index: usize) {
        let size = self.size();
        assert!(
            index < size,
            "index {} out of range for buffer of {} elements",
            index,
            size
        );
    }

    /// Reads element `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= size()`.
    #[inline]
    pub fn get(&self, index: usize) -> T {
        self.check_index(index);
        match &*self.storage {
            Storage::Dense(dense) => dense.cells()[index].load(),
            Storage::Sparse(sparse) => sparse
                .values
                .read()
                .get(&index)
                .copied()
                .unwrap_or(T::ZERO),
        }
    }

    /// Writes element `index`. On sparse storage writing zero removes
    /// the entry (a no-op when it is absent).
    ///
    /// # Panics
    ///
    /// Panics if `index >= size()`.
    #[inline]
    pub fn set(&self, index: usize, value: T) {
        self.check_index(index);
        match &*self.storage {
            Storage::Dense(dense) => dense.cells()[index].store(value),
            Storage::Sparse(sparse) => {
                let mut values = sparse.values.write();
                if value.same_bits(T::ZERO) {
                    values.remove(&index);
                } else {
                    values.insert(index, value);
                }
            }
        }
    }

    /// Writes `value` to every element.
    pub fn fill(&self, value: T) {
        match &*self.storage {
            Storage::Dense(dense) => dense.cells().iter().for_each(|cell| cell.store(value)),
            Storage::Sparse(sparse) => {
                let mut values = sparse.values.write();
                values.clear();
                if !value.same_bits(T::ZERO) {
                    values.extend((0..sparse.len).map(|i| (i, value)));
                }
            }
        }
    }

    /// All elements in index order.
    pub fn to_vec(&self) -> Vec<T> {
        (0..self.size()).map(|i| self.get(i)).collect()
    }

    /// Copies the contents into new storage of the same kind.
    pub fn deep_clone(&self) -> Result<Self, BufferError> {
        match &*self.storage {
            Storage::Dense(dense) => {
                let copy = Self::dense(dense.len)?;
                for (i, cell) in dense.cells().iter().enumerate() {
                    copy.set(i, cell.load());
                }
                Ok(copy)
            }
            Storage::Sparse(sparse) => Ok(Self {
                storage: Arc::new(Storage::Sparse(SparseStorage {
                    len: sparse.len,
                    values: RwLock::new(sparse.values.read().clone()),
                })),
            }),
        }
    }

    /// Address identifying the shared storage; equal for all handles
    /// cloned from one another.
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.storage) as *const () as usize
    }

    pub fn same_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Number of live handles to this storage.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.storage)
    }

    /// Address of the first dense element, if this is a dense buffer.
    pub fn data_address(&self) -> Option<usize> {
        match &*self.storage {
            Storage::Dense(dense) => Some(dense.ptr.as_ptr() as usize),
            Storage::Sparse(_) => None,
        }
    }
}

impl<T: Element> PartialEq for Buffer<T> {
    fn eq(&self, other: &Self) -> bool {
        self.same_storage(other)
            || (self.size() == other.size() && (0..self.size()).all(|i| self.get(i) == other.get(i)))
    }
}

impl<T: Element> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("kind", &if self.is_dense() { "dense" } else { "sparse" })
            .field("element", &T::NAME)
            .field("size", &self.size())
            .field("handles", &self.handle_count())
            .finish()
    }
}
