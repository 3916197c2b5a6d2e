//! The tracer context: marker state machine, allocator observer, access
//! filter, and end-of-run finalization.
//!
//! One `Tracer` exists per observed process. It implements
//! [`PatientHooks`], so the host runtime drives it directly from its
//! spliced-in callbacks:
//!
//! ```text
//! select marker ──▶ PreAlloc ──alloc entry──▶ PostAlloc ──alloc return──▶ block published
//! start marker  ──▶ being_traced = true   (fatal without a published block)
//! stop marker   ──▶ block cleared         (idempotent)
//! free(start)   ──▶ while tracing: block cleared, note recorded, patient
//!                   terminated cleanly so the trace ends where its data died
//! read/write    ──▶ lock-free bound check ──▶ append to the calling
//!                   thread's buffer
//! ```
//!
//! Marker and allocator transitions serialize on one process-wide mutex;
//! the access filter never takes it. Soft conditions (buffer overflow,
//! excess threads, single-event threads) become WARNING lines; fatal ones
//! record an ERROR line and terminate the patient through the runtime's
//! control surface.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use log::debug;

use crate::domain::{Address, FatalError, ThreadId};
use crate::merge;
use crate::report::{self, Sections};
use crate::runtime::{PatientHooks, RuntimeControl};
use crate::tracing::block::{MarkerPhase, TrackedBlock};
use crate::tracing::buffer::ThreadTrace;
use crate::tracing::event::{Event, EventKind};

/// Thread slots pre-allocated at startup.
pub const DEFAULT_MAX_THREADS: u16 = 32;
/// Events each thread can record before further ones are dropped.
pub const DEFAULT_EVENTS_PER_THREAD: usize = 64_000;

/// Knobs fixed before the patient starts; nothing is allocated on any
/// callback path afterwards.
#[derive(Debug, Clone, Copy)]
pub struct TracerConfig {
    pub max_threads: u16,
    pub events_per_thread: usize,
    /// Collapse idle spans of the coarse clock during quantization.
    pub collapse_idle: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        TracerConfig {
            max_threads: DEFAULT_MAX_THREADS,
            events_per_thread: DEFAULT_EVENTS_PER_THREAD,
            collapse_idle: true,
        }
    }
}

/// Process-wide tracing context.
pub struct Tracer {
    config: TracerConfig,
    /// Basetime every timestamp is rebased against, captured at startup
    /// so rebased values fit the 32-bit event field.
    started_at: Instant,
    traces: Box<[ThreadTrace]>,
    block: TrackedBlock,
    /// The single process-wide lock. Every transition touching the
    /// marker phase or the tracked block holds it.
    phase: Mutex<MarkerPhase>,
    sections: Mutex<Sections>,
    /// Events from thread ids beyond the configured slots.
    foreign_drops: AtomicU64,
    control: Arc<dyn RuntimeControl>,
}

impl Tracer {
    /// Pre-allocates every per-thread buffer; the recording paths never
    /// allocate again.
    pub fn new(config: TracerConfig, control: Arc<dyn RuntimeControl>) -> Self {
        let traces = (0..config.max_threads)
            .map(|_| ThreadTrace::with_capacity(config.events_per_thread))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Tracer {
            config,
            started_at: Instant::now(),
            traces,
            block: TrackedBlock::new(),
            phase: Mutex::new(MarkerPhase::NoSelection),
            sections: Mutex::new(Sections::default()),
            foreign_drops: AtomicU64::new(0),
            control,
        }
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    fn now(&self) -> u32 {
        // wraps after ~4.3s of rebased run, the window the 32-bit
        // timestamp field affords
        self.started_at.elapsed().as_nanos() as u32
    }

    /// Append an event to the calling thread's buffer. Hot path:
    /// allocation-free, lock-free, non-faulting.
    fn log_event(&self, thread: ThreadId, kind: EventKind, size: u32, offset: u64) {
        let Some(trace) = self.traces.get(thread.as_index()) else {
            self.foreign_drops.fetch_add(1, Ordering::Relaxed);
            return;
        };
        trace.push(Event::access(self.now(), thread, kind, size, offset));
    }

    /// Record a fatal condition and terminate the patient with its
    /// status. The report is written later, on the process-exit path.
    fn fatal(&self, error: FatalError) {
        self.sections().error(format!("ERROR: {error}"));
        self.control.exit_patient(error.exit_status());
    }

    fn sections(&self) -> std::sync::MutexGuard<'_, Sections> {
        self.sections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn phase(&self) -> std::sync::MutexGuard<'_, MarkerPhase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// End-of-run epilogue: merge, quantize, and write the report.
    ///
    /// `termination` is the status the runtime delivered to its
    /// process-exit hook; anything non-zero means the patient did not
    /// finish normally and only the ERROR section is written. Returns the
    /// process exit status the tool should report.
    pub fn finalize<W: Write>(self, termination: i32, out: W) -> io::Result<i32> {
        let Tracer {
            config,
            mut traces,
            sections,
            foreign_drops,
            ..
        } = self;
        let mut sections = sections
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        if termination != 0 {
            sections.error(format!(
                "ERROR: patient terminated abnormally with code {termination}"
            ));
            report::write(out, &sections, None)?;
            return Ok(termination);
        }

        let foreign = foreign_drops.into_inner();
        if foreign > 0 {
            sections.warning(format!(
                "WARNING: patient used more than {} threads; {foreign} events \
                 from excess threads were dropped",
                config.max_threads
            ));
        }

        let mut thread_count = 0u32;
        for (tid, trace) in traces.iter().enumerate() {
            if trace.is_empty() {
                continue;
            }
            thread_count += 1;
            if trace.overflow() > 0 {
                sections.warning(format!(
                    "WARNING: thread {tid} could not record {} events",
                    trace.overflow()
                ));
            }
        }

        let scan = merge::scan(&traces);
        for tid in &scan.single_event_threads {
            sections.warning(format!(
                "WARNING: thread {tid} recorded only one event, not usable \
                 for slice sizing"
            ));
        }
        if scan.total_events == 0 {
            let error = FatalError::NoEvents;
            sections.error(format!("ERROR: {error}"));
            report::write(out, &sections, None)?;
            return Ok(error.exit_status());
        }

        let mut merged = merge::merge(&mut traces, scan.slice_size);
        merge::quantize(&mut merged, config.collapse_idle);

        sections.metadata("slice-size", merged.slice_size());
        sections.metadata("thread-count", thread_count);
        sections.metadata("event-count", merged.len());
        sections.metadata("max-time", merged.max_coarse());

        report::write(out, &sections, Some(&merged))?;
        Ok(0)
    }
}

impl PatientHooks for Tracer {
    fn thread_started(&self, thread: ThreadId) {
        self.log_event(thread, EventKind::ThreadCreate, 0, 0);
    }

    fn thread_finished(&self, thread: ThreadId) {
        self.log_event(thread, EventKind::ThreadDestroy, 0, 0);
    }

    fn marker_select_next_block(&self) {
        // re-selecting before the allocator call just restarts the pairing
        *self.phase() = MarkerPhase::PreAlloc;
        debug!("select marker observed; watching the next allocation");
    }

    fn alloc_entered(&self, size: u64, thread: ThreadId) {
        let mut phase = self.phase();
        if *phase == MarkerPhase::PreAlloc {
            *phase = MarkerPhase::PostAlloc {
                size,
                owner: thread,
            };
        }
    }

    fn alloc_returned(&self, retval: Address, thread: ThreadId) {
        let mut phase = self.phase();
        let MarkerPhase::PostAlloc { size, owner } = *phase else {
            return;
        };
        // another thread's allocator call returning must not steal the
        // pairing; start and size always come from one call
        if owner != thread {
            return;
        }
        *phase = MarkerPhase::NoSelection;

        if retval.is_null() {
            self.fatal(FatalError::AllocatorFailure);
            return;
        }
        if size == 0 {
            self.fatal(FatalError::ZeroSize);
            return;
        }

        self.block.publish(retval, size);
        let mut sections = self.sections();
        sections.metadata("start-addr", retval);
        sections.metadata("end-addr", retval + (size - 1));
        sections.metadata("block-size", size);
        sections.metadata("owner-thread", thread.0);
        debug!("tracking block {retval}, {size} bytes, owner {thread}");
    }

    fn marker_start_tracing(&self, _thread: ThreadId) {
        let _phase = self.phase();
        if self.block.is_active() {
            return;
        }
        if self.block.start().is_null() || self.block.size() == 0 {
            self.fatal(FatalError::StartWithoutBlock);
            return;
        }
        self.block.activate();
        debug!("tracing started");
    }

    fn marker_stop_tracing(&self) {
        let _phase = self.phase();
        if !self.block.is_active() {
            return;
        }
        self.block.clear();
        debug!("tracing stopped");
    }

    fn free_entered(&self, addr: Address, thread: ThreadId) {
        let _phase = self.phase();
        if !self.block.is_active() || addr != self.block.start() {
            return;
        }
        // the block's data is gone, so the useful trace ends here; stop
        // and finish the patient cleanly
        self.block.clear();
        self.sections().error(format!(
            "trace stopped: free({addr}) called by thread {thread} while tracing"
        ));
        self.control.exit_patient(0);
    }

    fn mem_read(&self, _ip: Address, addr: Address, size: u32, thread: ThreadId) {
        if size == 0 {
            return;
        }
        if let Some(offset) = self.block.offset_within(addr) {
            self.log_event(thread, EventKind::Read, size, offset);
        }
    }

    fn mem_write(&self, _ip: Address, addr: Address, size: u32, thread: ThreadId) {
        if size == 0 {
            return;
        }
        if let Some(offset) = self.block.offset_within(addr) {
            self.log_event(thread, EventKind::Write, size, offset);
        }
    }
}
