//! Contract between the tracing core and the host instrumentation runtime.
//!
//! The runtime side (a Pin-style DBI framework, a sandbox, or the
//! in-process simulator in [`crate::sim`]) is expected to:
//!
//! - discover the marker symbols by name in loaded images and splice a
//!   call before each marker's entry (the names are re-exported below
//!   from the patient-side crate);
//! - splice calls around the patient's primary allocator (entry with the
//!   requested size, return with the result) and before `free`;
//! - visit the memory operands of every instrumented instruction and
//!   deliver a callback before the instruction executes, carrying the
//!   effective address and operand size;
//! - deliver thread start/finish notifications and a process-exit hook.
//!
//! Every callback runs on the patient thread that triggered it and
//! carries that thread's stable small-integer id. The core assumes
//! nothing else about how the runtime is implemented.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::domain::{Address, ThreadId};

pub use memscope_markers::{SELECT_NEXT_BLOCK_SYMBOL, START_TRACING_SYMBOL, STOP_TRACING_SYMBOL};

/// Hook surface the tool implements; the runtime invokes these.
pub trait PatientHooks: Send + Sync {
    fn thread_started(&self, thread: ThreadId);
    fn thread_finished(&self, thread: ThreadId);

    /// The select marker: observe the very next primary-allocator call.
    fn marker_select_next_block(&self);
    fn marker_start_tracing(&self, thread: ThreadId);
    fn marker_stop_tracing(&self);

    /// Entry of the primary allocator with the requested size.
    fn alloc_entered(&self, size: u64, thread: ThreadId);
    /// Return of the primary allocator with its result.
    fn alloc_returned(&self, retval: Address, thread: ThreadId);
    fn free_entered(&self, addr: Address, thread: ThreadId);

    /// A memory operand about to be read. Must never fault, block, or
    /// allocate; the runtime calls this on every instrumented read.
    fn mem_read(&self, ip: Address, addr: Address, size: u32, thread: ThreadId);
    /// A memory operand about to be written. Same constraints as
    /// [`PatientHooks::mem_read`].
    fn mem_write(&self, ip: Address, addr: Address, size: u32, thread: ThreadId);
}

/// Control surface the runtime implements for the tool.
pub trait RuntimeControl: Send + Sync {
    /// Terminate the patient with `status`. The first request wins; the
    /// runtime still delivers its process-exit path afterwards so the
    /// trace can be finalized.
    fn exit_patient(&self, status: i32);
}

const NO_EXIT: i32 = i32::MIN;

/// Latch-style [`RuntimeControl`]: remembers the first requested status.
pub struct ExitFlag(AtomicI32);

impl ExitFlag {
    pub const fn new() -> Self {
        ExitFlag(AtomicI32::new(NO_EXIT))
    }

    /// Status of the first exit request, if any was made.
    pub fn status(&self) -> Option<i32> {
        match self.0.load(Ordering::Acquire) {
            NO_EXIT => None,
            status => Some(status),
        }
    }
}

impl Default for ExitFlag {
    fn default() -> Self {
        ExitFlag::new()
    }
}

impl RuntimeControl for ExitFlag {
    fn exit_patient(&self, status: i32) {
        let _ = self
            .0
            .compare_exchange(NO_EXIT, status, Ordering::AcqRel, Ordering::Acquire);
    }
}
