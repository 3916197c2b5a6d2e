//! Domain model for memscope
//!
//! Core newtypes and the fatal error taxonomy, kept separate from the
//! engine so signatures stay self-documenting.

pub mod errors;
pub mod types;

pub use errors::FatalError;
pub use types::{Address, ThreadId};
