//! In-process stand-in for the host instrumentation runtime.
//!
//! Patients are ordinary Rust functions running on real OS threads. Every
//! allocation, memory access, marker, and free goes through a [`Patient`]
//! handle that performs the real operation and delivers the corresponding
//! hook callback first, the way a DBI runtime delivers spliced-in calls
//! before the instruction executes. Thread ids are small integers
//! assigned in spawn order, with the main patient thread as 0.
//!
//! After an exit request the simulator stops delivering callbacks;
//! patient threads keep running their remaining (now unobserved)
//! operations and wind down, which approximates the runtime tearing the
//! patient down.

pub mod patients;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use crate::domain::{Address, ThreadId};
use crate::runtime::{ExitFlag, PatientHooks};

/// One live patient allocation; `base` is the real address of the backing
/// storage, so the tool observes genuine heap addresses.
struct Allocation {
    base: u64,
    data: Box<[u8]>,
}

struct SimInner<H> {
    hooks: Arc<H>,
    exit: Arc<ExitFlag>,
    next_thread: AtomicU16,
    memory: Mutex<Vec<Allocation>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    fail_next_alloc: AtomicBool,
}

impl<H> SimInner<H> {
    fn with_bytes<R>(&self, addr: Address, len: usize, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut memory = self.memory.lock().unwrap_or_else(PoisonError::into_inner);
        let alloc = memory
            .iter_mut()
            .find(|a| addr.0 >= a.base && addr.0 + len as u64 <= a.base + a.data.len() as u64)
            .unwrap_or_else(|| panic!("patient accessed unmapped memory at {addr}"));
        let offset = (addr.0 - alloc.base) as usize;
        f(&mut alloc.data[offset..offset + len])
    }
}

/// How the simulated run ended.
pub struct RunOutcome {
    /// Status of the first `exit_patient` request, if any.
    pub exit_status: Option<i32>,
    /// Whether any patient thread panicked.
    pub patient_panicked: bool,
}

impl RunOutcome {
    /// The code the runtime hands to its process-exit hook: an explicit
    /// exit request wins, a panic counts as abnormal termination.
    pub fn termination_code(&self) -> i32 {
        self.exit_status
            .unwrap_or(if self.patient_panicked { 3 } else { 0 })
    }
}

/// The simulated runtime. Owns the patient's memory and threads for the
/// duration of one run.
pub struct SimRuntime<H: PatientHooks + 'static> {
    inner: Arc<SimInner<H>>,
}

impl<H: PatientHooks + 'static> SimRuntime<H> {
    pub fn new(hooks: Arc<H>, exit: Arc<ExitFlag>) -> Self {
        SimRuntime {
            inner: Arc::new(SimInner {
                hooks,
                exit,
                next_thread: AtomicU16::new(1),
                memory: Mutex::new(Vec::new()),
                threads: Mutex::new(Vec::new()),
                fail_next_alloc: AtomicBool::new(false),
            }),
        }
    }

    /// Test knob: make the next simulated allocation return null.
    pub fn fail_next_alloc(&self) {
        self.inner.fail_next_alloc.store(true, Ordering::Relaxed);
    }

    /// Run `patient_main` as thread 0, join every thread it spawned, and
    /// report how the run ended. Consumes the runtime so the hooks are
    /// released when this returns.
    pub fn run<F: FnOnce(&Patient<H>)>(self, patient_main: F) -> RunOutcome {
        let main = Patient {
            inner: Arc::clone(&self.inner),
            thread: ThreadId(0),
        };
        main.on_thread_start();
        let mut patient_panicked =
            catch_unwind(AssertUnwindSafe(|| patient_main(&main))).is_err();

        // threads may spawn further threads while we join
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut threads = self
                    .inner
                    .threads
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *threads)
            };
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if handle.join().is_err() {
                    patient_panicked = true;
                }
            }
        }
        main.on_thread_end();

        RunOutcome {
            exit_status: self.inner.exit.status(),
            patient_panicked,
        }
    }
}

/// Per-thread handle patient code runs against.
pub struct Patient<H: PatientHooks + 'static> {
    inner: Arc<SimInner<H>>,
    thread: ThreadId,
}

impl<H: PatientHooks + 'static> Clone for Patient<H> {
    fn clone(&self) -> Self {
        Patient {
            inner: Arc::clone(&self.inner),
            thread: self.thread,
        }
    }
}

/// The simulator has no real instruction stream; callbacks carry a null
/// instruction pointer.
const NO_IP: Address = Address(0);

impl<H: PatientHooks + 'static> Patient<H> {
    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }

    fn live(&self) -> bool {
        self.inner.exit.status().is_none()
    }

    fn on_thread_start(&self) {
        if self.live() {
            self.inner.hooks.thread_started(self.thread);
        }
    }

    fn on_thread_end(&self) {
        if self.live() {
            self.inner.hooks.thread_finished(self.thread);
        }
    }

    /// Test knob: make this patient's next allocation return null.
    pub fn fail_next_alloc(&self) {
        self.inner.fail_next_alloc.store(true, Ordering::Relaxed);
    }

    pub fn select_next_block(&self) {
        if self.live() {
            self.inner.hooks.marker_select_next_block();
        }
    }

    pub fn start_tracing(&self) {
        if self.live() {
            self.inner.hooks.marker_start_tracing(self.thread);
        }
    }

    pub fn stop_tracing(&self) {
        if self.live() {
            self.inner.hooks.marker_stop_tracing();
        }
    }

    /// Allocate `size` bytes of zero-initialized patient memory.
    pub fn malloc(&self, size: usize) -> Address {
        if self.live() {
            self.inner.hooks.alloc_entered(size as u64, self.thread);
        }
        if self.inner.fail_next_alloc.swap(false, Ordering::Relaxed) {
            if self.live() {
                self.inner.hooks.alloc_returned(Address(0), self.thread);
            }
            return Address(0);
        }
        let data = vec![0u8; size].into_boxed_slice();
        let base = data.as_ptr() as u64;
        self.inner
            .memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Allocation { base, data });
        if self.live() {
            self.inner.hooks.alloc_returned(Address(base), self.thread);
        }
        Address(base)
    }

    pub fn free(&self, addr: Address) {
        if self.live() {
            self.inner.hooks.free_entered(addr, self.thread);
        }
        self.inner
            .memory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|a| a.base != addr.0);
    }

    /// Spawn another patient thread with the next small-integer id.
    pub fn spawn(&self, f: impl FnOnce(&Patient<H>) + Send + 'static) {
        let child = Patient {
            inner: Arc::clone(&self.inner),
            thread: ThreadId(self.inner.next_thread.fetch_add(1, Ordering::Relaxed)),
        };
        let handle = std::thread::spawn(move || {
            child.on_thread_start();
            f(&child);
            child.on_thread_end();
        });
        self.inner
            .threads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    fn touch_read(&self, addr: Address, size: u32) {
        if self.live() {
            self.inner.hooks.mem_read(NO_IP, addr, size, self.thread);
        }
    }

    fn touch_write(&self, addr: Address, size: u32) {
        if self.live() {
            self.inner.hooks.mem_write(NO_IP, addr, size, self.thread);
        }
    }

    pub fn read_u8(&self, addr: Address) -> u8 {
        self.touch_read(addr, 1);
        self.inner.with_bytes(addr, 1, |b| b[0])
    }

    pub fn write_u8(&self, addr: Address, value: u8) {
        self.touch_write(addr, 1);
        self.inner.with_bytes(addr, 1, |b| b[0] = value);
    }

    pub fn read_i32(&self, addr: Address) -> i32 {
        self.touch_read(addr, 4);
        self.inner
            .with_bytes(addr, 4, |b| i32::from_ne_bytes(b.try_into().expect("4 bytes")))
    }

    pub fn write_i32(&self, addr: Address, value: i32) {
        self.touch_write(addr, 4);
        self.inner
            .with_bytes(addr, 4, |b| b.copy_from_slice(&value.to_ne_bytes()));
    }

    pub fn read_f64(&self, addr: Address) -> f64 {
        self.touch_read(addr, 8);
        self.inner
            .with_bytes(addr, 8, |b| f64::from_ne_bytes(b.try_into().expect("8 bytes")))
    }

    pub fn write_f64(&self, addr: Address, value: f64) {
        self.touch_write(addr, 8);
        self.inner
            .with_bytes(addr, 8, |b| b.copy_from_slice(&value.to_ne_bytes()));
    }
}
