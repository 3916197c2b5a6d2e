//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

fn parse_yes_no(raw: &str) -> Result<bool, String> {
    match raw {
        "yes" => Ok(true),
        "no" => Ok(false),
        other => Err(format!("expected 'yes' or 'no', got '{other}'")),
    }
}

/// Trace every read and write against one selected heap block of a
/// patient program and write a time-ordered access report.
#[derive(Parser)]
#[command(name = "memscope", version)]
pub struct Args {
    /// Output file for the access report
    #[arg(short, long, default_value = "mem_access_pattern.map")]
    pub output: PathBuf,

    /// Collapse idle time spans during quantization
    #[arg(
        short,
        long,
        value_name = "yes|no",
        default_value = "yes",
        value_parser = parse_yes_no,
        action = clap::ArgAction::Set
    )]
    pub collapse: bool,

    /// Patient program to run under the simulated runtime, followed by
    /// its arguments (e.g. `-- bubblesort 6`)
    #[arg(last = true, required = true, value_name = "PATIENT [ARGS]")]
    pub patient: Vec<String>,
}
