//! Structured error types for memscope
//!
//! Using thiserror for automatic Display implementation. Fatal conditions
//! abort the patient and leave a report consisting only of an ERROR
//! section; everything softer accumulates into the WARNING stream and is
//! handled inline by the tracer.

use thiserror::Error;

/// Conditions that terminate the run.
///
/// Each carries the process exit status the tool reports for it. No error
/// is ever raised from within a memory-access callback; that path is
/// strictly non-faulting.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalError {
    #[error(
        "cannot start tracing without an observed allocation; \
         was the select marker called before the allocator call?"
    )]
    StartWithoutBlock,

    #[error("the observed allocator failed and returned null")]
    AllocatorFailure,

    #[error("the observed allocator was called with size 0; nothing to trace")]
    ZeroSize,

    #[error("no thread recorded any event")]
    NoEvents,
}

impl FatalError {
    /// Process exit status reported for this condition.
    pub fn exit_status(self) -> i32 {
        match self {
            FatalError::StartWithoutBlock | FatalError::NoEvents => 1,
            FatalError::AllocatorFailure => 2,
            FatalError::ZeroSize => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_statuses() {
        assert_eq!(FatalError::StartWithoutBlock.exit_status(), 1);
        assert_eq!(FatalError::AllocatorFailure.exit_status(), 2);
        assert_eq!(FatalError::ZeroSize.exit_status(), 3);
        assert_eq!(FatalError::NoEvents.exit_status(), 1);
    }

    #[test]
    fn messages_name_the_condition() {
        assert!(FatalError::StartWithoutBlock
            .to_string()
            .contains("select marker"));
        assert!(FatalError::AllocatorFailure.to_string().contains("null"));
    }
}
