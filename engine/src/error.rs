//! Typed errors raised by the runtime (spec.md §7).

use thiserror::Error;

/// Raised by `Generator::create` (spec.md §4.10 "Error handling").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("sample rate must be nonzero")]
    ZeroSampleRate,
    #[error("program operator nest depth {0} exceeds the runtime scratch-buffer budget")]
    NestTooDeep(u8),
}
