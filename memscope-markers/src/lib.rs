//! Patient-side instrumentation markers.
//!
//! Link this crate (or an equivalent C translation unit) into the program
//! you want to trace, then:
//!
//! - call [`mt_select_next_block`] right before the allocator call that
//!   returns the block you want monitored, so the tool selects it;
//! - call [`mt_start_tracing`] to start recording accesses to the
//!   selected block;
//! - do your work in that piece of memory;
//! - call [`mt_stop_tracing`] to stop recording.
//!
//! The marker bodies are empty. Their only purpose is to exist as named,
//! linkable symbols the instrumentation runtime can find and splice
//! callbacks around, so they must never be inlined or garbage-collected.
//! The names are a stable ABI; the tool side imports them through the
//! `*_SYMBOL` constants.

use std::alloc::{alloc, dealloc, Layout};
use std::mem::size_of;
use std::ptr;

/// Symbol name the runtime looks up for the select marker.
pub const SELECT_NEXT_BLOCK_SYMBOL: &str = "mt_select_next_block";
/// Symbol name the runtime looks up for the start marker.
pub const START_TRACING_SYMBOL: &str = "mt_start_tracing";
/// Symbol name the runtime looks up for the stop marker.
pub const STOP_TRACING_SYMBOL: &str = "mt_stop_tracing";

/// Select the block returned by the very next primary-allocator call for
/// tracing.
#[no_mangle]
#[inline(never)]
pub extern "C" fn mt_select_next_block() {}

/// Start recording all memory accesses to the previously selected block.
#[no_mangle]
#[inline(never)]
pub extern "C" fn mt_start_tracing() {}

/// Stop recording accesses to the selected block.
#[no_mangle]
#[inline(never)]
pub extern "C" fn mt_stop_tracing() {}

/// Allocate `bytes` of memory whose first byte is aligned to `alignment`.
///
/// `alignment` must be a power of two; returns null otherwise, or when the
/// underlying allocation fails. The original pointer and the allocation
/// size are stashed in the two words preceding the aligned pointer so
/// [`mt_aligned_free`] can recover them from the aligned pointer alone.
#[no_mangle]
pub extern "C" fn mt_aligned_malloc(bytes: usize, alignment: usize) -> *mut u8 {
    if alignment == 0 || !alignment.is_power_of_two() {
        return ptr::null_mut();
    }
    let word = size_of::<usize>();
    // room for the payload, the alignment shift, and the two stash words
    let total = bytes + alignment - 1 + 2 * word;
    let Ok(layout) = Layout::from_size_align(total, word) else {
        return ptr::null_mut();
    };
    // SAFETY: `layout` has non-zero size and valid alignment.
    unsafe {
        let original = alloc(layout);
        if original.is_null() {
            return ptr::null_mut();
        }
        let aligned = ((original as usize + 2 * word + alignment - 1) & !(alignment - 1)) as *mut u8;
        let stash = aligned.cast::<usize>().sub(2);
        stash.write(original as usize);
        stash.add(1).write(total);
        aligned
    }
}

/// Release a block obtained from [`mt_aligned_malloc`].
///
/// # Safety
///
/// `ptr` must be a non-null pointer previously returned by
/// [`mt_aligned_malloc`] and not freed since.
#[no_mangle]
pub unsafe extern "C" fn mt_aligned_free(ptr: *mut u8) {
    let stash = ptr.cast::<usize>().sub(2);
    let original = stash.read() as *mut u8;
    let total = stash.add(1).read();
    dealloc(
        original,
        Layout::from_size_align_unchecked(total, size_of::<usize>()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_malloc_respects_alignment() {
        for alignment in [8usize, 16, 64, 4096] {
            let ptr = mt_aligned_malloc(100, alignment);
            assert!(!ptr.is_null());
            assert_eq!(ptr as usize % alignment, 0, "alignment {alignment}");
            unsafe { mt_aligned_free(ptr) };
        }
    }

    #[test]
    fn aligned_block_is_fully_writable() {
        let ptr = mt_aligned_malloc(256, 64);
        assert!(!ptr.is_null());
        unsafe {
            for i in 0..256 {
                ptr.add(i).write(i as u8);
            }
            for i in 0..256 {
                assert_eq!(ptr.add(i).read(), i as u8);
            }
            mt_aligned_free(ptr);
        }
    }

    #[test]
    fn rejects_bad_alignment() {
        assert!(mt_aligned_malloc(16, 0).is_null());
        assert!(mt_aligned_malloc(16, 3).is_null());
    }
}
