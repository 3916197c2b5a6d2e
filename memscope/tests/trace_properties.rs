//! End-to-end scenarios driven through the simulated runtime: the demo
//! patients, the failure modes, and the invariants of the emitted trace.

mod common;

use std::sync::{Arc, Mutex};

use common::{assert_report_invariants, run_traced, Report};
use memscope::sim::patients::Program;
use memscope::tracing::TracerConfig;

fn default_config() -> TracerConfig {
    TracerConfig {
        max_threads: 8,
        events_per_thread: 4096,
        collapse_idle: true,
    }
}

#[test]
fn bubblesort_seed_case() {
    let (status, text) = run_traced(default_config(), |p| {
        Program::Bubblesort.run(p, &[]);
    });
    assert_eq!(status, 0);
    let report = Report::parse(&text);
    assert_report_invariants(&report, true);

    assert_eq!(report.metadata_u64("block-size"), 24);
    let start = report.metadata_addr("start-addr");
    let end = report.metadata_addr("end-addr");
    assert_eq!(end - start + 1, 24);
    assert_eq!(report.metadata_u64("owner-thread"), 0);

    // int-sized accesses at int-aligned offsets only
    for row in report.access_rows() {
        assert_eq!(row.size, 4);
        assert_eq!(row.offset % 4, 0);
        assert!(row.offset < 24);
    }
    // the leading 6 bubbles all the way right: a write into the last slot
    assert!(report
        .access_rows()
        .any(|r| r.event == "W" && r.offset == 20));
    // the minimum is compared in place every pass
    assert!(report.access_rows().any(|r| r.event == "R" && r.offset == 0));
    // the fill ran before the start marker, so writes only happen on swaps
    let writes = report.access_rows().filter(|r| r.event == "W").count();
    assert!(writes >= 2);
}

#[test]
fn transpose_seed_case() {
    let (status, text) = run_traced(default_config(), |p| {
        Program::Sqtranspose.run(p, &["3".into(), "r".into()]);
    });
    assert_eq!(status, 0);
    let report = Report::parse(&text);
    assert_report_invariants(&report, true);

    assert_eq!(report.metadata_u64("block-size"), 9);
    // a transpose never touches the diagonal; cells 0, 4, 8 stay silent
    let off_diagonal = [1u64, 2, 3, 5, 6, 7];
    for row in report.access_rows() {
        assert_eq!(row.size, 1);
        assert!(off_diagonal.contains(&row.offset), "offset {}", row.offset);
    }
    // each off-diagonal cell is read once and written once
    for offset in off_diagonal {
        assert_eq!(
            report
                .access_rows()
                .filter(|r| r.event == "R" && r.offset == offset)
                .count(),
            1
        );
        assert_eq!(
            report
                .access_rows()
                .filter(|r| r.event == "W" && r.offset == offset)
                .count(),
            1
        );
    }
}

#[test]
fn alternator_seed_case() {
    let count = 64;
    let (status, text) = run_traced(default_config(), |p| {
        Program::Alternator.run(p, &[count.to_string()]);
    });
    assert_eq!(status, 0);
    let report = Report::parse(&text);
    assert_report_invariants(&report, true);

    let writes: Vec<_> = report
        .access_rows()
        .filter(|r| r.event == "W")
        .collect();
    assert_eq!(writes.len(), count);
    // slots are written front to back, one double each
    for (i, row) in writes.iter().enumerate() {
        assert_eq!(row.size, 8);
        assert_eq!(row.offset, (i as u64) * 8);
    }
    // the mutex handoff makes the two writers strictly alternate
    assert_eq!(writes[0].thread, 0);
    for pair in writes.windows(2) {
        assert_ne!(pair[0].thread, pair[1].thread);
    }
    assert_eq!(report.metadata_u64("thread-count"), 2);
}

#[test]
fn sweep_records_reads_only() {
    let count = 32;
    let (status, text) = run_traced(default_config(), |p| {
        Program::Sweep.run(p, &[count.to_string()]);
    });
    assert_eq!(status, 0);
    let report = Report::parse(&text);
    assert_report_invariants(&report, true);

    let reads = report.access_rows().filter(|r| r.event == "R").count();
    assert_eq!(reads, 4 * count);
    assert_eq!(report.access_rows().filter(|r| r.event == "W").count(), 0);
}

#[test]
fn collapse_off_keeps_wall_clock_proportions() {
    let config = TracerConfig {
        collapse_idle: false,
        ..default_config()
    };
    let (status, text) = run_traced(config, |p| {
        Program::Bubblesort.run(p, &[]);
    });
    assert_eq!(status, 0);
    let report = Report::parse(&text);
    assert_report_invariants(&report, false);
}

#[test]
fn premature_free_stops_the_trace_cleanly() {
    let (status, text) = run_traced(default_config(), |p| {
        p.select_next_block();
        let base = p.malloc(16);
        p.start_tracing();
        p.write_i32(base, 42);
        p.free(base);
        // unobserved from here on
        p.malloc(16);
    });
    assert_eq!(status, 0);
    let report = Report::parse(&text);
    assert!(report.errors.iter().any(|l| l.contains("free(")));
    assert!(report.has_data_section);
    assert_eq!(
        report.access_rows().filter(|r| r.event == "W").count(),
        1
    );
}

#[test]
fn stop_tracing_is_idempotent() {
    let (status, text) = run_traced(default_config(), |p| {
        p.select_next_block();
        let base = p.malloc(16);
        p.start_tracing();
        p.write_i32(base, 1);
        p.stop_tracing();
        p.stop_tracing();
        p.write_i32(base, 2);
        p.free(base);
    });
    assert_eq!(status, 0);
    let report = Report::parse(&text);
    assert_eq!(
        report.access_rows().filter(|r| r.event == "W").count(),
        1
    );
}

#[test]
fn selection_pairs_one_allocation_under_interleaving() {
    let observed: Arc<Mutex<(u64, Vec<u64>)>> = Arc::new(Mutex::new((0, Vec::new())));
    let in_patient = Arc::clone(&observed);
    let (status, text) = run_traced(default_config(), move |p| {
        let rival_log = Arc::clone(&in_patient);
        p.spawn(move |rival| {
            for _ in 0..25 {
                let addr = rival.malloc(128);
                rival_log.lock().unwrap().1.push(addr.0);
            }
        });
        p.select_next_block();
        let addr = p.malloc(64);
        in_patient.lock().unwrap().0 = addr.0;
        p.start_tracing();
        p.stop_tracing();
    });
    assert_eq!(status, 0);
    let report = Report::parse(&text);
    let (main_addr, rival_addrs) = &*observed.lock().unwrap();

    // whatever interleaving happened, start and size come from one call
    let start = report.metadata_addr("start-addr");
    let size = report.metadata_u64("block-size");
    match size {
        64 => assert_eq!(start, *main_addr),
        128 => assert!(rival_addrs.contains(&start), "start from a third call"),
        other => panic!("block size from no single call: {other}"),
    }
}

#[test]
fn overflow_warns_and_caps_the_thread() {
    let config = TracerConfig {
        max_threads: 2,
        events_per_thread: 4,
        collapse_idle: true,
    };
    let (status, text) = run_traced(config, |p| {
        p.select_next_block();
        let base = p.malloc(8);
        p.start_tracing();
        for i in 0..10 {
            p.write_f64(base, f64::from(i));
        }
        p.stop_tracing();
    });
    assert_eq!(status, 0);
    let report = Report::parse(&text);
    // 12 attempts (Tc + 10 writes + Td) against capacity 4
    assert!(report
        .warnings
        .iter()
        .any(|l| l.contains("thread 0") && l.contains("8 events")));
    assert_eq!(
        report.rows.iter().filter(|r| r.thread == 0).count(),
        4
    );
}

#[test]
fn excess_threads_are_dropped_with_a_warning() {
    let config = TracerConfig {
        max_threads: 1,
        events_per_thread: 64,
        collapse_idle: true,
    };
    let (status, text) = run_traced(config, |p| {
        p.select_next_block();
        let base = p.malloc(8);
        p.start_tracing();
        p.write_f64(base, 0.0);
        p.spawn(move |child| {
            child.write_f64(base, 1.0);
        });
    });
    assert_eq!(status, 0);
    let report = Report::parse(&text);
    assert!(report
        .warnings
        .iter()
        .any(|l| l.contains("more than 1 threads")));
    assert!(report.rows.iter().all(|r| r.thread == 0));
}

#[test]
fn single_event_thread_warns() {
    let config = TracerConfig {
        max_threads: 2,
        events_per_thread: 1,
        collapse_idle: true,
    };
    let (status, text) = run_traced(config, |p| {
        p.select_next_block();
        let base = p.malloc(8);
        p.start_tracing();
        p.write_f64(base, 0.0);
        p.stop_tracing();
    });
    assert_eq!(status, 0);
    let report = Report::parse(&text);
    assert!(report
        .warnings
        .iter()
        .any(|l| l.contains("only one event")));
}

#[test]
fn start_without_selection_fails_with_status_1() {
    let (status, text) = run_traced(default_config(), |p| {
        Program::Eagerstart.run(p, &[]);
    });
    assert_eq!(status, 1);
    let report = Report::parse(&text);
    assert!(!report.errors.is_empty());
    assert!(!report.has_data_section);
    assert!(report.warnings.is_empty());
    assert!(report.metadata.is_empty());
}

#[test]
fn failed_allocation_fails_with_status_2() {
    let (status, text) = run_traced(default_config(), |p| {
        Program::Brokenmalloc.run(p, &[]);
    });
    assert_eq!(status, 2);
    let report = Report::parse(&text);
    assert!(report.errors.iter().any(|l| l.contains("null")));
    assert!(!report.has_data_section);
}

#[test]
fn zero_size_allocation_fails_with_status_3() {
    let (status, text) = run_traced(default_config(), |p| {
        p.select_next_block();
        p.malloc(0);
    });
    assert_eq!(status, 3);
    let report = Report::parse(&text);
    assert!(report.errors.iter().any(|l| l.contains("size 0")));
    assert!(!report.has_data_section);
}

#[test]
fn hotloop_overflows_the_default_sized_buffer() {
    let config = TracerConfig {
        max_threads: 2,
        events_per_thread: 1000,
        collapse_idle: true,
    };
    let (status, text) = run_traced(config, |p| {
        Program::Hotloop.run(p, &["1500".into()]);
    });
    assert_eq!(status, 0);
    let report = Report::parse(&text);
    assert!(report
        .warnings
        .iter()
        .any(|l| l.contains("could not record")));
    assert_eq!(
        report.rows.iter().filter(|r| r.thread == 0).count(),
        1000
    );
}
