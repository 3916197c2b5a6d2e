//! The tracing core
//!
//! Event records, the per-thread lock-free buffers they land in, the
//! tracked block with its marker pairing phase, and the tracer context
//! that wires all of it to the host-runtime callbacks.

pub mod block;
pub mod buffer;
pub mod event;
pub mod tracer;

pub use block::{MarkerPhase, TrackedBlock};
pub use buffer::ThreadTrace;
pub use event::{Event, EventKind};
pub use tracer::{Tracer, TracerConfig, DEFAULT_EVENTS_PER_THREAD, DEFAULT_MAX_THREADS};
