//! Allocator served to components through the memory callbacks.
//!
//! Every block carries a header recording its layout, so `free` can release
//! a pointer without the caller passing a size back. Blocks are zeroed, as
//! the callbacks follow `calloc` semantics.

use std::{
    alloc::{alloc_zeroed, dealloc, Layout},
    ffi::c_void,
    ptr,
};

const ALIGN: usize = 16;
const HEADER: usize = 16;

/// Allocates `count * size` zeroed bytes.
///
/// Returns null on overflow, on a zero-byte request, or if the allocator
/// fails.
pub(crate) fn calloc(count: usize, size: usize) -> *mut c_void {
    let Some(bytes) = count.checked_mul(size) else {
        return ptr::null_mut();
    };
    if bytes == 0 {
        return ptr::null_mut();
    }
    let Some(total) = bytes.checked_add(HEADER) else {
        return ptr::null_mut();
    };
    let Ok(layout) = Layout::from_size_align(total, ALIGN) else {
        return ptr::null_mut();
    };

    // SAFETY: `layout` has a non-zero size.
    let base = unsafe { alloc_zeroed(layout) };
    if base.is_null() {
        return ptr::null_mut();
    }

    // SAFETY: the block is at least HEADER bytes and ALIGN-aligned.
    unsafe {
        base.cast::<usize>().write(total);
        base.add(HEADER).cast()
    }
}

/// Releases a block returned by [`calloc`]. Null is ignored.
///
/// # Safety
///
/// `block` must be null or a pointer returned by [`calloc`] that has not
/// been freed.
pub(crate) unsafe fn free(block: *mut c_void) {
    if block.is_null() {
        return;
    }
    // SAFETY: guaranteed by the caller; the header precedes the block.
    unsafe {
        let base = block.cast::<u8>().sub(HEADER);
        let total = base.cast::<usize>().read();
        let layout = Layout::from_size_align_unchecked(total, ALIGN);
        dealloc(base, layout);
    }
}
