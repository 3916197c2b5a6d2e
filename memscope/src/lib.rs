//! # memscope - heap-block access tracer
//!
//! memscope records every read and write a patient program performs
//! against one heap block of interest, across all of its threads, and
//! renders the result as a single time-ordered access trace.
//!
//! The patient marks the block with three cooperating markers: it selects
//! the next allocation, starts tracing once the block is filled, and stops
//! tracing when done. Between start and stop, every memory operand whose
//! effective address falls inside the block's bounds becomes an event in
//! the calling thread's pre-allocated buffer. At process exit the
//! per-thread buffers are merged into one stream and wall-clock
//! nanoseconds are quantized into a coarse logical clock whose unit is the
//! smallest gap observed between two events of any single thread.
//!
//! ## Architecture Overview
//!
//! ```text
//!  patient threads                      epilogue (single-threaded)
//! ┌──────────────────┐
//! │ markers ───────▶ │ marker state     ┌─────────┐   ┌──────────┐
//! │ allocator ─────▶ │ machine + block  │ merge & │──▶│  report  │
//! │ reads/writes ──▶ │ filter           │ quantize│   │ emitter  │
//! └──────────────────┘    │             └─────────┘   └──────────┘
//!                         ▼                  ▲
//!                  per-thread event ─────────┘
//!                  buffers (lock-free)
//! ```
//!
//! ## Module Structure
//!
//! - [`tracing`]: the core engine
//!   - `event`: the fixed-layout event record
//!   - `buffer`: fixed-capacity, cache-line-aligned per-thread buffers
//!   - `block`: the tracked block and the marker pairing phase
//!   - `tracer`: marker state machine, allocator observer, access filter
//! - [`merge`]: end-of-run scan / k-way merge / quantize / idle collapse
//! - [`report`]: the four-section plain-text report (ERROR, WARNING,
//!   METADATA, DATA)
//! - [`runtime`]: the callback contract between the core and a host
//!   instrumentation runtime
//! - [`sim`]: an in-process simulated runtime plus built-in patient
//!   programs, used by the binary and the test suite
//! - [`cli`]: command-line argument parsing
//! - [`domain`]: newtype ids and the fatal error taxonomy
//!
//! ## Key Concepts
//!
//! - **Patient**: the program under observation.
//! - **Marker**: a named, empty function the patient calls to signal a
//!   state transition to the tool.
//! - **Tracked block**: the single heap region whose accesses are recorded.
//! - **Slice / coarse time**: the quantized time unit derived from the
//!   minimum intra-thread inter-event gap.

pub mod cli;
pub mod domain;
pub mod merge;
pub mod report;
pub mod runtime;
pub mod sim;
pub mod tracing;
