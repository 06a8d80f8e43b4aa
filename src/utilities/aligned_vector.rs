//! Fixed-length, zero-initialized buffers with SIMD-friendly alignment.
//!
//! Unlike `Vec`, construction is fallible: an allocation failure comes back as
//! [`AlignedAllocError`] instead of aborting the process.

use std::{
    alloc::{alloc_zeroed, dealloc, Layout},
    marker::PhantomData,
    mem::{align_of, size_of},
    ops::{Deref, DerefMut},
    ptr::NonNull,
    slice,
};
use thiserror::Error;

/// Buffer alignment in bytes: one AVX-512 register, one cache line.
pub const ALIGN_BYTES: usize = 64;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AlignedAllocError {
    #[error("aligned_vector: size overflow for {len} elements of {elem_size} bytes")]
    Overflow { len: usize, elem_size: usize },
    #[error("aligned_vector: allocation of {bytes} bytes failed")]
    OutOfMemory { bytes: usize },
}

impl AlignedAllocError {
    /// Bytes that were requested, saturating for overflowed requests.
    pub fn requested_bytes(&self) -> usize {
        match *self {
            AlignedAllocError::Overflow { .. } => usize::MAX,
            AlignedAllocError::OutOfMemory { bytes } => bytes,
        }
    }
}

/// Plain-old-data element types that are valid when all bits are zero.
///
/// # Safety
/// Implementors must accept the all-zero bit pattern as a valid value.
pub unsafe trait Zeroable: Copy {}
unsafe impl Zeroable for f32 {}
unsafe impl Zeroable for f64 {}

pub struct AlignedVec<T: Zeroable = f64> {
    ptr: NonNull<T>,
    len: usize,
    _phantom: PhantomData<T>,
}

// The buffer owns its allocation exclusively, like `Vec<T>`.
unsafe impl<T: Zeroable + Send> Send for AlignedVec<T> {}
unsafe impl<T: Zeroable + Sync> Sync for AlignedVec<T> {}

impl<T: Zeroable> AlignedVec<T> {
    pub fn try_zeroed(len: usize) -> Result<Self, AlignedAllocError> {
        debug_assert!(ALIGN_BYTES >= align_of::<T>());
        if len == 0 || size_of::<T>() == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len,
                _phantom: PhantomData,
            });
        }

        let layout = Self::layout_for(len)?;
        let raw = unsafe { alloc_zeroed(layout) } as *mut T;
        let ptr = NonNull::new(raw).ok_or(AlignedAllocError::OutOfMemory { bytes: layout.size() })?;
        Ok(Self {
            ptr,
            len,
            _phantom: PhantomData,
        })
    }

    fn layout_for(len: usize) -> Result<Layout, AlignedAllocError> {
        let overflow = AlignedAllocError::Overflow {
            len,
            elem_size: size_of::<T>(),
        };
        let bytes = len.checked_mul(size_of::<T>()).ok_or(overflow.clone())?;
        Layout::from_size_align(bytes, ALIGN_BYTES).map_err(|_| overflow)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub fn is_aligned_to(&self, align: usize) -> bool {
        self.len == 0 || is_aligned(self.ptr.as_ptr(), align)
    }
}

impl<T: Zeroable> Drop for AlignedVec<T> {
    fn drop(&mut self) {
        if self.len == 0 || size_of::<T>() == 0 {
            return;
        }
        // Same inputs as construction, so the layout is known to be valid.
        if let Ok(layout) = Self::layout_for(self.len) {
            unsafe { dealloc(self.ptr.as_ptr() as *mut u8, layout) }
        }
    }
}

impl<T: Zeroable> Deref for AlignedVec<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T: Zeroable> DerefMut for AlignedVec<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<T: Zeroable + std::fmt::Debug> std::fmt::Debug for AlignedVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedVec")
            .field("len", &self.len)
            .field("align", &ALIGN_BYTES)
            .finish()
    }
}

#[inline]
pub fn is_aligned<T>(ptr: *const T, align: usize) -> bool {
    debug_assert!(align.is_power_of_two(), "Alignment must be power of 2");
    (ptr as usize) & (align - 1) == 0
}

#[inline]
pub const fn align_up(size: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (size + align - 1) & !(align - 1)
}

/// `align_up` that reports overflow instead of wrapping.
#[inline]
pub fn checked_align_up(size: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    size.checked_add(align - 1).map(|s| s & !(align - 1))
}
