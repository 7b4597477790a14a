//! Native buffers shared with the enhancement engine
//!
//! The engine addresses memory through raw pointers, so the bytes it reads
//! and writes must live in an allocator it can reach. Each buffer is
//! exclusively owned by the session that created it, grows by releasing
//! the old allocation and making a fresh one, and never shrinks.

use crate::{Error, Result};
use std::fmt;
use std::ptr::NonNull;
use std::slice;
use std::sync::Arc;

/// Allocator for memory the enhancement engine can address.
pub trait EngineHeap: fmt::Debug + Send + Sync {
    /// Allocates `size` bytes, or `None` when the heap refuses.
    fn alloc(&self, size: usize) -> Option<NonNull<u8>>;

    /// Releases an allocation made by [`EngineHeap::alloc`].
    ///
    /// # Safety
    /// `ptr` must have come from `alloc` on this same heap with this
    /// `size`, and must not be used afterwards.
    unsafe fn free(&self, ptr: NonNull<u8>, size: usize);
}

/// Process-heap allocator backed by `libc::malloc` and `libc::free`.
///
/// Suitable when the engine runs in-process and shares the C heap.
#[derive(Debug, Default)]
pub struct SystemHeap;

impl EngineHeap for SystemHeap {
    fn alloc(&self, size: usize) -> Option<NonNull<u8>> {
        // malloc(0) may return null; always request at least one byte.
        let ptr = unsafe { libc::malloc(size.max(1)) };
        NonNull::new(ptr as *mut u8)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, _size: usize) {
        unsafe { libc::free(ptr.as_ptr() as *mut libc::c_void) }
    }
}

/// A heap allocation shared with the engine.
///
/// `capacity` bytes are allocated; `len` of them are currently meaningful.
/// Growth replaces the allocation without preserving contents, so callers
/// overwrite before reading after any resize.
#[derive(Debug)]
pub struct NativeBuffer {
    ptr: NonNull<u8>,
    capacity: usize,
    len: usize,
    heap: Arc<dyn EngineHeap>,
}

// The buffer is exclusively owned and the heap is Send + Sync, so moving
// it to another thread is sound. It is deliberately not Sync.
unsafe impl Send for NativeBuffer {}

impl NativeBuffer {
    /// Allocates a buffer holding a copy of `bytes`.
    pub fn from_bytes(heap: Arc<dyn EngineHeap>, bytes: &[u8]) -> Result<Self> {
        let ptr = raw_alloc(&heap, bytes.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len());
        }
        Ok(Self {
            ptr,
            capacity: bytes.len(),
            len: bytes.len(),
            heap,
        })
    }

    /// Allocates a zero-filled buffer of `capacity` bytes with its logical
    /// length set to the full capacity.
    pub fn zeroed(heap: Arc<dyn EngineHeap>, capacity: usize) -> Result<Self> {
        let ptr = raw_alloc(&heap, capacity)?;
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, capacity);
        }
        Ok(Self {
            ptr,
            capacity,
            len: capacity,
            heap,
        })
    }

    /// Allocates a zeroed region for `count` 32-bit out-parameters the
    /// engine writes into.
    pub fn zeroed_u32(heap: Arc<dyn EngineHeap>, count: usize) -> Result<Self> {
        Self::zeroed(heap, count * 4)
    }

    /// Ensures capacity for at least `min_len` bytes and sets the logical
    /// length to exactly `min_len`.
    ///
    /// When the current capacity is short, the old allocation is released
    /// only after a fresh one of exactly `min_len` bytes is in hand; the
    /// contents are undefined until overwritten. Capacity never shrinks.
    pub fn grow_to(&mut self, min_len: usize) -> Result<()> {
        if self.capacity < min_len {
            let fresh = raw_alloc(&self.heap, min_len)?;
            let old = std::mem::replace(&mut self.ptr, fresh);
            unsafe {
                self.heap.free(old, self.capacity);
            }
            self.capacity = min_len;
        }
        self.len = min_len;
        Ok(())
    }

    /// Copies `bytes` into the buffer, growing it first when the capacity
    /// is short. The logical length becomes `bytes.len()`.
    pub fn overwrite(&mut self, bytes: &[u8]) -> Result<()> {
        self.grow_to(bytes.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr(), bytes.len());
        }
        Ok(())
    }

    /// Raw pointer for handing to the engine.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Mutable raw pointer for regions the engine writes.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// The meaningful bytes currently in the buffer.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Logical length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the logical length is zero.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reads back the 32-bit out-parameter at `index`.
    pub fn read_u32(&self, index: usize) -> u32 {
        assert!((index + 1) * 4 <= self.len);
        let mut raw = [0u8; 4];
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr().add(index * 4), raw.as_mut_ptr(), 4);
        }
        u32::from_ne_bytes(raw)
    }

    /// Writes the 32-bit out-parameter at `index`, as the engine does.
    pub fn write_u32(&mut self, index: usize, value: u32) {
        assert!((index + 1) * 4 <= self.len);
        let raw = value.to_ne_bytes();
        unsafe {
            std::ptr::copy_nonoverlapping(raw.as_ptr(), self.ptr.as_ptr().add(index * 4), 4);
        }
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        unsafe {
            self.heap.free(self.ptr, self.capacity);
        }
    }
}

fn raw_alloc(heap: &Arc<dyn EngineHeap>, size: usize) -> Result<NonNull<u8>> {
    heap.alloc(size).ok_or(Error::AllocationFailed { size })
}
