//! The four-section plain-text report.
//!
//! Sections appear in fixed order and are elided when empty: `# ERROR`,
//! `# WARNING`, `# METADATA`, `# DATA`. A fatal run writes the ERROR
//! section alone. The data section opens with a fixed CSV header followed
//! by one record per merged event, coarse time first.

use std::fmt::Display;
use std::io::{self, Write};

use crate::merge::MergedTrace;

/// Header line of the data section.
pub const DATA_HEADER: &str = "time,thread,event,size,offset";

/// Accumulated ERROR, WARNING, and METADATA lines.
///
/// Filled on cold paths only: marker transitions and the epilogue. The
/// access-filter path never touches it.
#[derive(Debug, Default)]
pub struct Sections {
    errors: Vec<String>,
    warnings: Vec<String>,
    metadata: Vec<(&'static str, String)>,
}

impl Sections {
    pub fn error(&mut self, line: impl Into<String>) {
        self.errors.push(line.into());
    }

    pub fn warning(&mut self, line: impl Into<String>) {
        self.warnings.push(line.into());
    }

    pub fn metadata(&mut self, key: &'static str, value: impl Display) {
        self.metadata.push((key, value.to_string()));
    }
}

/// Write the report.
///
/// `data: None` marks a fatal run: only the ERROR section is emitted and
/// the rest of the trace is withheld.
pub fn write<W: Write>(mut out: W, sections: &Sections, data: Option<&MergedTrace>) -> io::Result<()> {
    if !sections.errors.is_empty() {
        writeln!(out, "# ERROR")?;
        for line in &sections.errors {
            writeln!(out, "{line}")?;
        }
    }
    let Some(merged) = data else {
        return Ok(());
    };

    if !sections.warnings.is_empty() {
        writeln!(out, "# WARNING")?;
        for line in &sections.warnings {
            writeln!(out, "{line}")?;
        }
    }

    if !sections.metadata.is_empty() {
        writeln!(out, "# METADATA")?;
        for (key, value) in &sections.metadata {
            writeln!(out, "{key}: {value}")?;
        }
    }

    writeln!(out, "# DATA")?;
    writeln!(out, "{DATA_HEADER}")?;
    for ev in merged.events() {
        writeln!(
            out,
            "{},{},{},{},{}",
            ev.coarse,
            ev.thread,
            ev.kind.tag(),
            ev.size,
            ev.offset
        )?;
    }
    Ok(())
}
