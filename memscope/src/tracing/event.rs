//! The event record appended on every observed access.

use crate::domain::ThreadId;

/// Kind of recorded activity.
///
/// The short tags are the vocabulary of the report's data section and
/// must stay stable: `R`/`W` for accesses, `Tc`/`Td` for thread creation
/// and destruction, `?` for anything else.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Other = 0,
    ThreadCreate = 1,
    ThreadDestroy = 2,
    Read = 3,
    Write = 4,
}

impl EventKind {
    pub fn tag(self) -> &'static str {
        match self {
            EventKind::Other => "?",
            EventKind::ThreadCreate => "Tc",
            EventKind::ThreadDestroy => "Td",
            EventKind::Read => "R",
            EventKind::Write => "W",
        }
    }
}

/// One recorded event. Fixed 24-byte layout; written out verbatim.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Event {
    /// Nanoseconds since the process basetime, truncated to 32 bits.
    pub time: u32,
    /// Coarse time in slice units, assigned during quantization.
    pub coarse: u32,
    pub thread: u16,
    pub kind: EventKind,
    /// Access size in bytes; 0 for thread lifecycle events.
    pub size: u32,
    /// Byte offset from the start of the tracked block; 0 for thread
    /// lifecycle events.
    pub offset: u64,
}

impl Event {
    pub fn access(time: u32, thread: ThreadId, kind: EventKind, size: u32, offset: u64) -> Self {
        Event {
            time,
            coarse: 0,
            thread: thread.0,
            kind,
            size,
            offset,
        }
    }

    pub fn thread_marker(time: u32, thread: ThreadId, kind: EventKind) -> Self {
        Event::access(time, thread, kind, 0, 0)
    }
}

const _: () = assert!(std::mem::size_of::<Event>() == 24);
