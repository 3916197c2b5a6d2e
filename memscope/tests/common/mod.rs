//! Shared helpers for the integration suite: run a patient closure under
//! the simulated runtime and parse the emitted report back into
//! structure.

#![allow(dead_code)]

use std::sync::Arc;

use memscope::runtime::ExitFlag;
use memscope::sim::{Patient, SimRuntime};
use memscope::tracing::{Tracer, TracerConfig};

/// One CSV record of the data section.
#[derive(Debug, Clone)]
pub struct Row {
    pub time: u32,
    pub thread: u16,
    pub event: String,
    pub size: u32,
    pub offset: u64,
}

/// A report parsed back from its text form.
#[derive(Debug, Default)]
pub struct Report {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub metadata: Vec<(String, String)>,
    pub rows: Vec<Row>,
    pub has_data_section: bool,
}

impl Report {
    pub fn parse(text: &str) -> Report {
        #[derive(PartialEq)]
        enum Section {
            None,
            Error,
            Warning,
            Metadata,
            Data,
        }
        let mut section = Section::None;
        let mut report = Report::default();
        for line in text.lines() {
            match line {
                "# ERROR" => section = Section::Error,
                "# WARNING" => section = Section::Warning,
                "# METADATA" => section = Section::Metadata,
                "# DATA" => {
                    section = Section::Data;
                    report.has_data_section = true;
                }
                _ => match section {
                    Section::Error => report.errors.push(line.to_string()),
                    Section::Warning => report.warnings.push(line.to_string()),
                    Section::Metadata => {
                        let (key, value) = line.split_once(':').expect("metadata line");
                        report
                            .metadata
                            .push((key.trim().to_string(), value.trim().to_string()));
                    }
                    Section::Data => {
                        if line == "time,thread,event,size,offset" {
                            continue;
                        }
                        let fields: Vec<&str> = line.split(',').collect();
                        assert_eq!(fields.len(), 5, "bad data row: {line}");
                        report.rows.push(Row {
                            time: fields[0].parse().expect("time"),
                            thread: fields[1].parse().expect("thread"),
                            event: fields[2].to_string(),
                            size: fields[3].parse().expect("size"),
                            offset: fields[4].parse().expect("offset"),
                        });
                    }
                    Section::None => panic!("content before any section: {line}"),
                },
            }
        }
        report
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn metadata_u64(&self, key: &str) -> u64 {
        self.metadata(key)
            .unwrap_or_else(|| panic!("missing metadata key {key}"))
            .parse()
            .expect("decimal metadata value")
    }

    pub fn metadata_addr(&self, key: &str) -> u64 {
        let raw = self
            .metadata(key)
            .unwrap_or_else(|| panic!("missing metadata key {key}"));
        u64::from_str_radix(raw.trim_start_matches("0x"), 16).expect("hex metadata value")
    }

    /// Rows that record memory accesses (R and W).
    pub fn access_rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(|r| r.event == "R" || r.event == "W")
    }
}

/// Run one patient closure under a fresh tracer and simulated runtime;
/// returns the tool's exit status and the report text.
pub fn run_traced(
    config: TracerConfig,
    patient: impl FnOnce(&Patient<Tracer>),
) -> (i32, String) {
    let exit = Arc::new(ExitFlag::new());
    let tracer = Arc::new(Tracer::new(config, exit.clone()));
    let outcome = SimRuntime::new(Arc::clone(&tracer), exit).run(patient);
    let tracer = Arc::try_unwrap(tracer)
        .ok()
        .expect("patient threads released the tracer");
    let mut buf = Vec::new();
    let status = tracer
        .finalize(outcome.termination_code(), &mut buf)
        .expect("write report");
    (status, String::from_utf8(buf).expect("utf8 report"))
}

/// The ordering, rebasing, compaction, and bookkeeping laws every normal
/// report must satisfy.
pub fn assert_report_invariants(report: &Report, collapse: bool) {
    assert!(report.has_data_section);
    assert!(!report.rows.is_empty());

    // the time axis starts at zero and never goes backwards
    assert_eq!(report.rows[0].time, 0);
    for pair in report.rows.windows(2) {
        assert!(pair[0].time <= pair[1].time, "time went backwards");
        if collapse {
            assert!(
                pair[1].time - pair[0].time <= 1,
                "idle span survived collapse"
            );
        }
    }

    // per-thread order is preserved
    let mut threads: Vec<u16> = report.rows.iter().map(|r| r.thread).collect();
    threads.sort_unstable();
    threads.dedup();
    for tid in &threads {
        let times: Vec<u32> = report
            .rows
            .iter()
            .filter(|r| r.thread == *tid)
            .map(|r| r.time)
            .collect();
        assert!(times.windows(2).all(|p| p[0] <= p[1]));
    }

    // no access escapes the block
    if let Some(block_size) = report.metadata("block-size") {
        let block_size: u64 = block_size.parse().expect("block-size");
        for row in report.access_rows() {
            assert!(row.offset < block_size, "offset {} escapes", row.offset);
        }
    }

    // counters agree with the data section
    assert_eq!(report.metadata_u64("event-count"), report.rows.len() as u64);
    assert_eq!(report.metadata_u64("thread-count"), threads.len() as u64);
    assert_eq!(
        report.metadata_u64("max-time"),
        u64::from(report.rows.last().expect("rows").time)
    );
    assert!(report.metadata_u64("slice-size") >= 1);
}
