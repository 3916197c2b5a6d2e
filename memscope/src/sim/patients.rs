//! Built-in patient programs exercising the tracer end to end.
//!
//! The classic demo set: a bubblesort over a small int list, a square
//! byte-matrix transpose (naive or recursive), a two-thread alternator
//! over a mutex, and a sequential sweep over a chunk of doubles. Three
//! further patients deliberately misbehave so the failure paths can be
//! driven from the command line.
//!
//! Each patient parses its trailing arguments leniently and falls back to
//! defaults, so `memscope -- bubblesort` just works.

use std::str::FromStr;
use std::sync::{Arc, Condvar, Mutex};

use crate::domain::Address;
use crate::runtime::PatientHooks;
use crate::sim::Patient;
use crate::tracing::DEFAULT_EVENTS_PER_THREAD;

/// A named, built-in patient program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    /// Sort a list of ints; `<len> [seed]`, default the six-element
    /// example list.
    Bubblesort,
    /// Transpose an n by n byte matrix; `<n> [n|r]`, default 3 recursive.
    Sqtranspose,
    /// Two threads alternately writing a chunk of doubles; `<count>`,
    /// default 512.
    Alternator,
    /// Four sequential read passes over a chunk of doubles; `<count>`,
    /// default 256.
    Sweep,
    /// Selects a block but the allocation fails.
    Brokenmalloc,
    /// Starts tracing without ever selecting a block.
    Eagerstart,
    /// Writes one slot more often than a thread's buffer can hold.
    Hotloop,
}

impl FromStr for Program {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bubblesort" => Ok(Program::Bubblesort),
            "sqtranspose" => Ok(Program::Sqtranspose),
            "alternator" => Ok(Program::Alternator),
            "sweep" => Ok(Program::Sweep),
            "brokenmalloc" => Ok(Program::Brokenmalloc),
            "eagerstart" => Ok(Program::Eagerstart),
            "hotloop" => Ok(Program::Hotloop),
            other => Err(format!(
                "unknown patient program '{other}'; known programs: bubblesort, \
                 sqtranspose, alternator, sweep, brokenmalloc, eagerstart, hotloop"
            )),
        }
    }
}

impl Program {
    pub fn run<H: PatientHooks + 'static>(self, p: &Patient<H>, args: &[String]) {
        match self {
            Program::Bubblesort => bubblesort(p, args),
            Program::Sqtranspose => sqtranspose(p, args),
            Program::Alternator => alternator(p, args),
            Program::Sweep => sweep(p, args),
            Program::Brokenmalloc => brokenmalloc(p),
            Program::Eagerstart => eagerstart(p),
            Program::Hotloop => hotloop(p, args),
        }
    }
}

fn arg<T: FromStr>(args: &[String], index: usize, default: T) -> T {
    args.get(index)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

const EXAMPLE_LIST: [i32; 6] = [1, 6, 3, 2, 4, 5];

fn bubblesort<H: PatientHooks + 'static>(p: &Patient<H>, args: &[String]) {
    let len: usize = arg(args, 0, EXAMPLE_LIST.len());
    let mut seed: u64 = arg(args, 1, 0x5eed);
    let slot = |base: Address, i: usize| base + (i as u64) * 4;

    p.select_next_block();
    let base = p.malloc(len * 4);
    if base.is_null() || len == 0 {
        return;
    }
    // fill before the start marker, so only the sort itself is traced
    if len == EXAMPLE_LIST.len() {
        for (i, value) in EXAMPLE_LIST.iter().enumerate() {
            p.write_i32(slot(base, i), *value);
        }
    } else {
        for i in 0..len {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            p.write_i32(slot(base, i), ((seed >> 33) as i32).rem_euclid(10 * len as i32));
        }
    }

    p.start_tracing();
    let mut swapped = true;
    while swapped {
        swapped = false;
        for i in 0..len - 1 {
            let a = p.read_i32(slot(base, i));
            let b = p.read_i32(slot(base, i + 1));
            if a > b {
                p.write_i32(slot(base, i), b);
                p.write_i32(slot(base, i + 1), a);
                swapped = true;
            }
        }
    }
    p.stop_tracing();

    for i in 0..len - 1 {
        assert!(
            p.read_i32(slot(base, i)) <= p.read_i32(slot(base, i + 1)),
            "list not sorted at {i}"
        );
    }
    p.free(base);
}

fn sqtranspose<H: PatientHooks + 'static>(p: &Patient<H>, args: &[String]) {
    let n: usize = arg(args, 0, 3);
    let recursive = args.get(1).map_or(true, |v| v != "n");
    let cell = |base: Address, i: usize, j: usize| base + (i * n + j) as u64;

    p.select_next_block();
    let base = p.malloc(n * n);
    if base.is_null() {
        return;
    }
    let mut value = 0u8;
    for i in 0..n {
        for j in 0..n {
            p.write_u8(cell(base, i, j), value);
            value = value.wrapping_add(1);
        }
    }

    p.start_tracing();
    if recursive {
        transpose_recur(p, base, n, 0, 0, n);
    } else {
        transpose_naive(p, base, n);
    }
    p.stop_tracing();

    // column-major walk must now see the original row-major fill
    let mut expected = 0u8;
    for j in 0..n {
        for i in 0..n {
            assert_eq!(p.read_u8(cell(base, i, j)), expected, "cell ({i},{j})");
            expected = expected.wrapping_add(1);
        }
    }
    p.free(base);
}

fn transpose_naive<H: PatientHooks + 'static>(p: &Patient<H>, base: Address, n: usize) {
    let cell = |i: usize, j: usize| base + (i * n + j) as u64;
    for i in 0..n {
        for j in i + 1..n {
            let temp = p.read_u8(cell(i, j));
            p.write_u8(cell(i, j), p.read_u8(cell(j, i)));
            p.write_u8(cell(j, i), temp);
        }
    }
}

/// Cache-oblivious transpose: swap the off-diagonal quadrants, then
/// recurse into all four, bottoming out at hand-rolled 2x2 and 3x3
/// blocks.
fn transpose_recur<H: PatientHooks + 'static>(
    p: &Patient<H>,
    base: Address,
    n: usize,
    i: usize,
    j: usize,
    si: usize,
) {
    let cell = |i: usize, j: usize| base + (i * n + j) as u64;
    let swap = |a: Address, b: Address| {
        let x = p.read_u8(a);
        let y = p.read_u8(b);
        p.write_u8(a, y);
        p.write_u8(b, x);
    };

    if si >= 4 {
        let h = si / 2;
        let big = si - h;
        for di in 0..h {
            for dj in 0..h {
                swap(cell(i + di, j + big + dj), cell(i + big + di, j + dj));
            }
        }
        transpose_recur(p, base, n, i, j + big, h);
        transpose_recur(p, base, n, i + big, j, h);
        transpose_recur(p, base, n, i, j, big);
        transpose_recur(p, base, n, i + h, j + h, big);
        return;
    }

    if si >= 2 {
        swap(cell(i + 1, j), cell(i, j + 1));
        if si == 3 {
            swap(cell(i + 2, j), cell(i, j + 2));
            swap(cell(i + 2, j + 1), cell(i + 1, j + 2));
        }
    }
}

fn alternator<H: PatientHooks + 'static>(p: &Patient<H>, args: &[String]) {
    let count: usize = arg(args, 0, 512);

    p.select_next_block();
    let base = p.malloc(count * 8);
    if base.is_null() {
        return;
    }

    p.start_tracing();
    let turn = Arc::new((Mutex::new(0usize), Condvar::new()));
    let child_turn = Arc::clone(&turn);
    p.spawn(move |child| write_alternating(child, base, count, 1, &child_turn));
    write_alternating(p, base, count, 0, &turn);
    // the writer of the final slot advanced the turn past `count`, so
    // every write has happened by the time both loops exit
    p.stop_tracing();

    for i in 0..count {
        assert_eq!(p.read_f64(base + (i as u64) * 8), i as f64, "slot {i}");
    }
    p.free(base);
}

fn write_alternating<H: PatientHooks + 'static>(
    p: &Patient<H>,
    base: Address,
    count: usize,
    parity: usize,
    turn: &(Mutex<usize>, Condvar),
) {
    let (lock, condvar) = turn;
    let mut current = lock.lock().unwrap_or_else(|e| e.into_inner());
    loop {
        while *current < count && *current % 2 != parity {
            current = condvar.wait(current).unwrap_or_else(|e| e.into_inner());
        }
        if *current >= count {
            return;
        }
        p.write_f64(base + (*current as u64) * 8, *current as f64);
        *current += 1;
        condvar.notify_all();
    }
}

fn sweep<H: PatientHooks + 'static>(p: &Patient<H>, args: &[String]) {
    let count: usize = arg(args, 0, 256);

    p.select_next_block();
    let base = p.malloc(count * 8);
    if base.is_null() {
        return;
    }

    p.start_tracing();
    for _ in 0..4 {
        for i in 0..count {
            p.read_f64(base + (i as u64) * 8);
        }
    }
    p.stop_tracing();
    p.free(base);
}

fn brokenmalloc<H: PatientHooks + 'static>(p: &Patient<H>) {
    p.fail_next_alloc();
    p.select_next_block();
    let base = p.malloc(1024);
    assert!(base.is_null());
}

fn eagerstart<H: PatientHooks + 'static>(p: &Patient<H>) {
    p.start_tracing();
}

fn hotloop<H: PatientHooks + 'static>(p: &Patient<H>, args: &[String]) {
    let count: usize = arg(args, 0, DEFAULT_EVENTS_PER_THREAD + 512);

    p.select_next_block();
    let base = p.malloc(8);
    if base.is_null() {
        return;
    }
    p.start_tracing();
    for i in 0..count {
        p.write_f64(base, i as f64);
    }
    p.stop_tracing();
    p.free(base);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_names_parse() {
        assert_eq!("bubblesort".parse(), Ok(Program::Bubblesort));
        assert_eq!("alternator".parse(), Ok(Program::Alternator));
        assert!("quicksort".parse::<Program>().is_err());
    }

    #[test]
    fn lenient_argument_parsing() {
        let args = vec!["12".to_string(), "garbage".to_string()];
        assert_eq!(arg(&args, 0, 6usize), 12);
        assert_eq!(arg(&args, 1, 99u64), 99);
        assert_eq!(arg(&args, 2, 7i32), 7);
    }
}
