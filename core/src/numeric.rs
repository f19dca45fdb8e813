//! Recursive-descent numeric expression evaluator (spec.md §4.4 "Numeric
//! expressions").
//!
//! Grammar, precedence lowest to highest: additive (`+ -`) < multiplicative
//! (`* / %`) < power (`^`, right-associative) < unary (`-`) < primary
//! (number, note name, parenthesised group, implied multiplication after a
//! closing paren). A note name or symbolic input resolves to a frequency in
//! Hz via [`crate::notes::parse_note_name`]; any other identifier is an
//! evaluation error. Infinite intermediate results discard the whole
//! enclosing expression, per spec.md §4.4.

use crate::notes::parse_note_name;
use crate::reader::Reader;

#[derive(Debug, Clone, PartialEq)]
pub enum NumericError {
    UnexpectedEnd,
    UnexpectedChar(char),
    UnknownSymbol(String),
    /// An intermediate or final value was non-finite; spec.md §4.4 says to
    /// discard the enclosing expression rather than propagate NaN/inf.
    NonFinite,
}

/// Evaluates a numeric expression starting at the reader's current
/// position, consuming exactly the characters that belong to it. `a4_hz` is
/// the tuning reference used to resolve any note names encountered.
pub fn eval_expr(r: &mut Reader, a4_hz: f64) -> Result<f64, NumericError> {
    let value = parse_additive(r, a4_hz)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(NumericError::NonFinite)
    }
}

fn skip_ws(r: &mut Reader) {
    r.skip_spaces();
}

fn parse_additive(r: &mut Reader, a4_hz: f64) -> Result<f64, NumericError> {
    let mut value = parse_multiplicative(r, a4_hz)?;
    loop {
        skip_ws(r);
        match r.peek() {
            Some('+') => {
                r.next();
                value += parse_multiplicative(r, a4_hz)?;
            }
            Some('-') => {
                r.next();
                value -= parse_multiplicative(r, a4_hz)?;
            }
            _ => break,
        }
    }
    Ok(value)
}

fn parse_multiplicative(r: &mut Reader, a4_hz: f64) -> Result<f64, NumericError> {
    let mut value = parse_power(r, a4_hz)?;
    loop {
        skip_ws(r);
        match r.peek() {
            Some('*') => {
                r.next();
                value *= parse_power(r, a4_hz)?;
            }
            Some('/') => {
                r.next();
                value /= parse_power(r, a4_hz)?;
            }
            Some('%') => {
                r.next();
                value %= parse_power(r, a4_hz)?;
            }
            _ => break,
        }
    }
    Ok(value)
}

fn parse_power(r: &mut Reader, a4_hz: f64) -> Result<f64, NumericError> {
    let base = parse_unary(r, a4_hz)?;
    skip_ws(r);
    if r.peek() == Some('^') {
        r.next();
        // Right-associative: the exponent is itself a power expression.
        let exponent = parse_power(r, a4_hz)?;
        Ok(base.powf(exponent))
    } else {
        Ok(base)
    }
}

fn parse_unary(r: &mut Reader, a4_hz: f64) -> Result<f64, NumericError> {
    skip_ws(r);
    if r.peek() == Some('-') {
        r.next();
        return Ok(-parse_unary(r, a4_hz)?);
    }
    if r.peek() == Some('+') {
        r.next();
        return parse_unary(r, a4_hz);
    }
    parse_primary(r, a4_hz)
}

fn parse_primary(r: &mut Reader, a4_hz: f64) -> Result<f64, NumericError> {
    skip_ws(r);
    match r.peek() {
        Some('(') => {
            r.next();
            let value = parse_additive(r, a4_hz)?;
            skip_ws(r);
            if r.peek() == Some(')') {
                r.next();
            }
            Ok(maybe_implied_mul(r, a4_hz, value)?)
        }
        Some(c) if c.is_ascii_digit() || c == '.' => {
            let value = r.read_f64().ok_or(NumericError::UnexpectedChar(c))?;
            Ok(value)
        }
        Some(c) if c.is_ascii_alphabetic() => {
            let ident = r.read_ident();
            match parse_note_name(&ident) {
                Some(note) => Ok(note.to_hz(a4_hz)),
                None => Err(NumericError::UnknownSymbol(ident)),
            }
        }
        Some(c) => Err(NumericError::UnexpectedChar(c)),
        None => Err(NumericError::UnexpectedEnd),
    }
}

/// After a `)` or a note/number, a following value with no operator between
/// them is an implied multiplication (spec.md §4.4 "implied multiplication
/// of `)` with a following value").
fn maybe_implied_mul(r: &mut Reader, a4_hz: f64, value: f64) -> Result<f64, NumericError> {
    skip_ws(r);
    match r.peek() {
        Some(c) if c.is_ascii_digit() || c == '.' || c == '(' || c.is_ascii_alphabetic() => {
            Ok(value * parse_unary(r, a4_hz)?)
        }
        _ => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A4: f64 = 440.0;

    fn eval(src: &str) -> f64 {
        let mut r = Reader::from_str(src);
        eval_expr(&mut r, A4).unwrap()
    }

    #[test]
    fn respects_precedence() {
        assert_eq!(eval("2+3*4"), 14.0);
        assert_eq!(eval("2*3^2"), 18.0);
    }

    #[test]
    fn power_is_right_associative() {
        // 2^(3^2) = 2^9 = 512, not (2^3)^2 = 64.
        assert_eq!(eval("2^3^2"), 512.0);
    }

    #[test]
    fn grouping_overrides_precedence() {
        assert_eq!(eval("(2+3)*4"), 20.0);
    }

    #[test]
    fn implied_multiplication_after_group() {
        assert_eq!(eval("(2+1)3"), 9.0);
    }

    #[test]
    fn unary_minus_applies_before_power() {
        assert_eq!(eval("-2^2"), -4.0);
    }

    #[test]
    fn note_names_resolve_to_hz() {
        let mut r = Reader::from_str("a4");
        let hz = eval_expr(&mut r, A4).unwrap();
        assert!((hz - A4 * (3.0 / 5.0) * (5.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn infinite_result_is_an_error() {
        let mut r = Reader::from_str("1/0");
        assert_eq!(eval_expr(&mut r, A4), Err(NumericError::NonFinite));
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        let mut r = Reader::from_str("zz9");
        assert!(matches!(eval_expr(&mut r, A4), Err(NumericError::UnknownSymbol(_))));
    }
}
