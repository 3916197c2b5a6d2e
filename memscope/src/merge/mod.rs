//! End-of-run pipeline: scan, k-way merge, quantize, idle collapse.
//!
//! Runs single-threaded in the epilogue, after the runtime guarantees all
//! patient threads have terminated. The merged list references events in
//! place in the per-thread buffers; nothing is copied.

use std::iter::Peekable;
use std::slice::IterMut;

use crate::tracing::{Event, ThreadTrace};

/// Results of the first pass over the per-thread buffers.
pub struct TraceScan {
    pub total_events: usize,
    /// Smallest gap between two consecutive events of any single thread,
    /// in nanoseconds, clamped to at least 1. This is an operational
    /// lower bound on the clock resolution for the run and becomes the
    /// quantization unit.
    pub slice_size: u32,
    /// Threads that recorded exactly one event and therefore cannot
    /// contribute a gap.
    pub single_event_threads: Vec<u16>,
}

/// Pass 1: count events and find the minimum intra-thread gap.
pub fn scan(traces: &[ThreadTrace]) -> TraceScan {
    let mut total_events = 0;
    let mut slice_size = u32::MAX;
    let mut single_event_threads = Vec::new();

    for (tid, trace) in traces.iter().enumerate() {
        let events = trace.recorded();
        if events.is_empty() {
            continue;
        }
        total_events += events.len();
        if events.len() < 2 {
            single_event_threads.push(tid as u16);
            continue;
        }
        for pair in events.windows(2) {
            // timestamps wrap after ~4.3s of rebased run; modular
            // subtraction keeps gaps below that window correct
            let gap = pair[1].time.wrapping_sub(pair[0].time);
            slice_size = slice_size.min(gap);
        }
    }

    TraceScan {
        total_events,
        // a gap below the clock's resolution reads as zero
        slice_size: slice_size.max(1),
        single_event_threads,
    }
}

/// The globally time-ordered view over all per-thread buffers.
pub struct MergedTrace<'a> {
    events: Vec<&'a mut Event>,
    slice_size: u32,
}

impl<'a> MergedTrace<'a> {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn slice_size(&self) -> u32 {
        self.slice_size
    }

    /// Coarse time of the last event, the upper bound of the time axis.
    pub fn max_coarse(&self) -> u32 {
        self.events.last().map_or(0, |ev| ev.coarse)
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|ev| &**ev)
    }
}

/// Pass 2: k-way merge of the per-thread buffers by timestamp.
///
/// Ties are broken by the smaller thread id; events of one thread keep
/// their buffer order, so the merge is stable.
pub fn merge<'a>(traces: &'a mut [ThreadTrace], slice_size: u32) -> MergedTrace<'a> {
    let total: usize = traces.iter().map(ThreadTrace::len).sum();
    let mut cursors: Vec<Peekable<IterMut<'a, Event>>> = traces
        .iter_mut()
        .map(|trace| trace.recorded_mut().iter_mut().peekable())
        .collect();

    let mut events = Vec::with_capacity(total);
    for _ in 0..total {
        let mut earliest: Option<(usize, u32)> = None;
        for (tid, cursor) in cursors.iter_mut().enumerate() {
            if let Some(ev) = cursor.peek() {
                if earliest.map_or(true, |(_, time)| ev.time < time) {
                    earliest = Some((tid, ev.time));
                }
            }
        }
        let Some((tid, _)) = earliest else { break };
        if let Some(ev) = cursors[tid].next() {
            events.push(ev);
        }
    }

    MergedTrace { events, slice_size }
}

/// Pass 3: rebase to the first merged event and convert nanoseconds to
/// slice units; optionally collapse idle spans afterwards.
///
/// With collapse on, whenever the coarse clock would jump by more than
/// one slice with no thread doing anything, the remainder of the trace is
/// shifted back so the gap becomes exactly one. The produced axis is then
/// dense; with collapse off it stays faithful to wall-clock proportions.
pub fn quantize(merged: &mut MergedTrace<'_>, collapse_idle: bool) {
    let Some(first) = merged.events.first() else {
        return;
    };
    let base = first.time;
    let slice = merged.slice_size;
    for ev in merged.events.iter_mut() {
        ev.coarse = ev.time.wrapping_sub(base) / slice;
    }

    if !collapse_idle {
        return;
    }
    let mut shift = 0u32;
    let mut last_coarse = 0u32;
    for ev in merged.events.iter_mut() {
        if ev.coarse - shift > last_coarse + 1 {
            shift = ev.coarse - last_coarse - 1;
        }
        ev.coarse -= shift;
        last_coarse = ev.coarse;
    }
}
