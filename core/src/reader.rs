//! Buffered character stream over a file or literal string (spec.md §4.3
//! "Text reader").
//!
//! The historical reader is a power-of-two ring buffer with a sentinel
//! "after-EOF" byte because C has no sum type for "this read failed because
//! we're out of bytes". Rust does: reading past the end simply yields
//! `None`, and `Reader` tracks nothing extra to distinguish "just hit EOF"
//! from "still at EOF" since `Option<char>` already makes that distinction
//! for every caller for free.

use std::fs;
use std::io;
use std::path::Path;

const MAX_IDENT_LEN: usize = 255;
const MAX_UNGET: usize = 8;

pub struct Reader {
    name: String,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    /// Positions ungotten this call chain, used only to bound how far
    /// `unget` can rewind (spec.md §4.3 "unget up to a fixed count").
    unget_budget: usize,
}

impl Reader {
    /// Reads the whole file into memory (spec.md §4.3 "a file or a literal
    /// string" — loading eagerly rather than streaming keeps line/col
    /// tracking simple and matches this crate's non-streaming consumer).
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Reader> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Ok(Reader::from_str_named(&text, path.display().to_string()))
    }

    pub fn from_str(source: &str) -> Reader {
        Reader::from_str_named(source, "<memory>".to_string())
    }

    pub fn from_str_named(source: &str, name: String) -> Reader {
        Reader {
            name,
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            unget_budget: 0,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.name
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn col(&self) -> u32 {
        self.col
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.chars.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    pub fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    /// Advances and returns the next character, tracking line number across
    /// both `\n` and `\r\n` (spec.md §4.3).
    pub fn next(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        self.unget_budget = (self.unget_budget + 1).min(MAX_UNGET);
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else if c == '\r' {
            if self.chars.get(self.pos) != Some(&'\n') {
                self.line += 1;
                self.col = 1;
            }
        } else {
            self.col += 1;
        }
        Some(c)
    }

    /// Un-reads the last character, up to `MAX_UNGET` deep (spec.md §4.3
    /// "unget up to a fixed count").
    pub fn unget(&mut self) {
        if self.unget_budget == 0 || self.pos == 0 {
            return;
        }
        self.pos -= 1;
        self.unget_budget -= 1;
        let c = self.chars[self.pos];
        if c == '\n' || (c == '\r' && self.chars.get(self.pos + 1) != Some(&'\n')) {
            self.line -= 1;
            // Column tracking after an unget-across-newline is inherently
            // approximate without scanning backward; diagnostics only need
            // an approximate column, so this is an accepted simplification.
            self.col = 1;
        } else if self.col > 1 {
            self.col -= 1;
        }
    }

    pub fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(' ')) {
            self.next();
        }
    }

    pub fn skip_to_eol(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.next();
        }
    }

    /// Reads `[A-Za-z0-9_]+`, capped at `MAX_IDENT_LEN` bytes (spec.md §4.3
    /// "read an identifier ... up to a cap").
    pub fn read_ident(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                if out.len() >= MAX_IDENT_LEN {
                    break;
                }
                out.push(c);
                self.next();
            } else {
                break;
            }
        }
        out
    }

    /// Reads an optionally-signed 32-bit integer.
    pub fn read_i32(&mut self) -> Option<i32> {
        let start = self.pos;
        let mut text = String::new();
        if matches!(self.peek(), Some('+') | Some('-')) {
            text.push(self.next().unwrap());
        }
        let mut any_digit = false;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            any_digit = true;
            text.push(self.next().unwrap());
        }
        if !any_digit {
            self.rewind_to(start);
            return None;
        }
        text.parse().ok()
    }

    /// Reads a finite double-precision number, with an optional leading
    /// `.` and no leading sign (sign is the caller's concern via the
    /// numeric expression grammar) (spec.md §4.3).
    pub fn read_f64(&mut self) -> Option<f64> {
        let start = self.pos;
        let mut text = String::new();
        let mut any_digit = false;

        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            any_digit = true;
            text.push(self.next().unwrap());
        }
        if self.peek() == Some('.') {
            text.push(self.next().unwrap());
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                any_digit = true;
                text.push(self.next().unwrap());
            }
        }
        if !any_digit {
            self.rewind_to(start);
            return None;
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let exp_start = self.pos;
            let mut exp_text = String::new();
            exp_text.push(self.next().unwrap());
            if matches!(self.peek(), Some('+') | Some('-')) {
                exp_text.push(self.next().unwrap());
            }
            let mut exp_digit = false;
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                exp_digit = true;
                exp_text.push(self.next().unwrap());
            }
            if exp_digit {
                text.push_str(&exp_text);
            } else {
                self.rewind_to(exp_start);
            }
        }
        let value: f64 = text.parse().ok()?;
        if value.is_finite() {
            Some(value)
        } else {
            None
        }
    }

    fn rewind_to(&mut self, pos: usize) {
        while self.pos > pos {
            self.unget();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_identifiers() {
        let mut r = Reader::from_str("wave1 next");
        assert_eq!(r.read_ident(), "wave1");
        assert_eq!(r.peek(), Some(' '));
    }

    #[test]
    fn reads_signed_integers() {
        let mut r = Reader::from_str("-42x");
        assert_eq!(r.read_i32(), Some(-42));
        assert_eq!(r.peek(), Some('x'));
    }

    #[test]
    fn reads_decimal_with_leading_dot() {
        let mut r = Reader::from_str(".5 end");
        assert_eq!(r.read_f64(), Some(0.5));
    }

    #[test]
    fn tracks_line_number_across_newlines() {
        let mut r = Reader::from_str("a\nb\r\nc");
        assert_eq!(r.line(), 1);
        r.next();
        r.next(); // consume 'a', '\n'
        assert_eq!(r.line(), 2);
        r.next(); // 'b'
        r.next(); // '\r'
        r.next(); // '\n'
        assert_eq!(r.line(), 3);
    }

    #[test]
    fn unget_restores_position() {
        let mut r = Reader::from_str("ab");
        let c = r.next();
        assert_eq!(c, Some('a'));
        r.unget();
        assert_eq!(r.next(), Some('a'));
    }
}
