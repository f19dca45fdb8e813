//! Warning/error sink (spec.md §6 "Diagnostics surface").
//!
//! Modeled on the teacher's `core::logger::Logger`: a small struct that is
//! either `Standalone` (prints straight to stderr) or `Embedded` (forwards
//! over a `crossbeam_channel`) so the same parser/builder code works both as
//! a CLI tool and, one day, as a component embedded in a larger host without
//! hijacking its stdio.

use crossbeam_channel::Sender;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One diagnostic message, formatted per spec.md §6:
/// `"<component>: <file>:<line>[:<col>]: <message>"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub component: &'static str,
    pub file: String,
    pub line: u32,
    pub col: Option<u32>,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}:{}", self.component, self.file, self.line)?;
        if let Some(col) = self.col {
            write!(f, ":{col}")?;
        }
        write!(f, ": {}", self.message)
    }
}

enum Mode {
    Standalone,
    Embedded(Sender<Diagnostic>),
}

/// Collects parse/program-build diagnostics. Library code (`sau_lang`)
/// never panics or writes to stdio directly; every warning and error flows
/// through this sink, which the root binary wires to stderr by default.
pub struct Diagnostics {
    mode: Mode,
}

impl Diagnostics {
    pub fn standalone() -> Diagnostics {
        Diagnostics {
            mode: Mode::Standalone,
        }
    }

    pub fn embedded(sender: Sender<Diagnostic>) -> Diagnostics {
        Diagnostics {
            mode: Mode::Embedded(sender),
        }
    }

    pub fn emit(&self, diag: Diagnostic) {
        match &self.mode {
            Mode::Standalone => eprintln!("{diag}"),
            Mode::Embedded(sender) => {
                if sender.try_send(diag.clone()).is_err() {
                    eprintln!("diagnostics channel error: {diag}");
                }
            }
        }
    }

    pub fn warning(&self, component: &'static str, file: &str, line: u32, col: Option<u32>, message: impl Into<String>) {
        self.emit(Diagnostic {
            component,
            file: file.to_string(),
            line,
            col,
            severity: Severity::Warning,
            message: message.into(),
        });
    }

    pub fn error(&self, component: &'static str, file: &str, line: u32, col: Option<u32>, message: impl Into<String>) {
        self.emit(Diagnostic {
            component,
            file: file.to_string(),
            line,
            col,
            severity: Severity::Error,
            message: message.into(),
        });
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::standalone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_display_matches_spec_format() {
        let d = Diagnostic {
            component: "parser",
            file: "script.sau".to_string(),
            line: 4,
            col: Some(12),
            severity: Severity::Warning,
            message: "unexpected character 'x'".to_string(),
        };
        assert_eq!(d.to_string(), "parser: script.sau:4:12: unexpected character 'x'");
    }

    #[test]
    fn diagnostic_display_omits_missing_column() {
        let d = Diagnostic {
            component: "builder",
            file: "script.sau".to_string(),
            line: 9,
            col: None,
            severity: Severity::Error,
            message: "too many voices".to_string(),
        };
        assert_eq!(d.to_string(), "builder: script.sau:9: too many voices");
    }
}
