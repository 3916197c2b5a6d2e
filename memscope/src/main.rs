//! # memscope - Main Entry Point
//!
//! Runs a built-in patient program under the in-process simulated
//! runtime, traces every access to the heap block the patient marks, and
//! writes the sectioned access report.
//!
//! ```bash
//! memscope -- bubblesort
//! memscope -o sort.map -- bubblesort 64 1234
//! memscope -c no -- alternator 512
//! ```
//!
//! Exit status: 0 on a normal run (including a trace cut short by a free
//! of the tracked block); 1 when tracing was started without a selected
//! block, no events were recorded, or initialization failed; 2 when the
//! observed allocator returned null; 3 when it was called with size zero
//! or the patient terminated abnormally.

use std::fs::File;
use std::io::BufWriter;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::info;

use memscope::cli::Args;
use memscope::runtime::ExitFlag;
use memscope::sim::{patients::Program, SimRuntime};
use memscope::tracing::{Tracer, TracerConfig};

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(args) {
        Ok(status) => ExitCode::from(status),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> Result<u8> {
    let (name, patient_args) = args
        .patient
        .split_first()
        .ok_or_else(|| anyhow!("missing patient program"))?;
    let program: Program = name.parse().map_err(|msg: String| anyhow!(msg))?;

    let exit = Arc::new(ExitFlag::new());
    let config = TracerConfig {
        collapse_idle: args.collapse,
        ..TracerConfig::default()
    };
    let tracer = Arc::new(Tracer::new(config, exit.clone()));

    info!("running patient '{name}' under the simulated runtime");
    let patient_args = patient_args.to_vec();
    let outcome =
        SimRuntime::new(Arc::clone(&tracer), exit).run(|p| program.run(p, &patient_args));

    let tracer = Arc::try_unwrap(tracer)
        .map_err(|_| anyhow!("patient threads still hold the tracer"))?;
    let file = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let status = tracer
        .finalize(outcome.termination_code(), BufWriter::new(file))
        .context("failed to write the report")?;

    info!("report written to {}", args.output.display());
    Ok(u8::try_from(status).unwrap_or(1))
}
