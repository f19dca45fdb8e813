//! Typed errors for the parser and program builder (spec.md §7).

use thiserror::Error;

/// Non-fatal parse-time problems (spec.md §4.4 "Fails with ParseError{...}
/// reported as warnings with line/column; the parser then re-synchronises").
///
/// Every variant is surfaced through [`crate::diagnostics::Diagnostics`] as a
/// warning, never as a hard failure — only [`ProgramError`] can fail the
/// pipeline (spec.md §7 "Propagation policy").
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected character '{0}'")]
    Unexpected(char),
    #[error("unexpected end of input")]
    Eof,
    #[error("label truncated at buffer limit")]
    TruncatedLabel,
    #[error("invalid note name '{0}'")]
    BadNote(String),
    #[error("unknown wave '{0}'")]
    InvalidWave(String),
    #[error("unknown ramp fill curve '{0}'")]
    InvalidRampShape(String),
    #[error("numeric value overflowed")]
    NumericOverflow,
    #[error("undefined label '{0}'")]
    UndefinedLabel(String),
    #[error("I/O error reading script: {0}")]
    Io(String),
}

/// Fatal program-build errors (spec.md §4.6 "Validation"); these abort
/// `build_program` and return no program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProgramError {
    #[error("too many voices: {0} exceeds the 65535 limit")]
    TooManyVoices(u32),
    #[error("too many operators: {0} exceeds the implementation limit")]
    TooManyOperators(u32),
    #[error("operator nesting too deep: {0} exceeds the 255 limit")]
    TooDeepNesting(u32),
    /// Reading the script from disk failed (spec.md §7 "ReaderIOError ...
    /// fatal to parse"), surfaced through the same `Result` the rest of the
    /// pipeline uses rather than a second error type the caller has to
    /// `match` on separately.
    #[error("{0}")]
    Io(#[from] ParseError),
}
