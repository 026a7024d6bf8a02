//! Arithmetic captcha used as a low-friction bot deterrent.
//!
//! Questions look like `"3 + 4"`. Only addition is ever evaluated; the
//! operator token is ignored.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptchaError {
    #[error("Incorrect captcha")]
    Incorrect,
}

/// Parses a leading integer the lenient way browsers do: optional
/// whitespace and sign, then digits, ignoring whatever follows.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'-') => (-1, &s[1..]),
        Some(b'+') => (1, &s[1..]),
        _ => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Returns the submitted answer as text, or `None` when it counts as absent.
pub fn answer_text(answer: Option<&Value>) -> Option<String> {
    match answer? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Checks `answer` against `int(token1) + int(token3)` of the question.
pub fn verify(question: &str, answer: &str) -> Result<(), CaptchaError> {
    let mut tokens = question.split(' ');
    let lhs = tokens.next().and_then(parse_leading_int);
    let _operator = tokens.next();
    let rhs = tokens.next().and_then(parse_leading_int);

    let expected = lhs.zip(rhs).and_then(|(a, b)| a.checked_add(b));
    match (expected, parse_leading_int(answer)) {
        (Some(expected), Some(given)) if expected == given => Ok(()),
        _ => Err(CaptchaError::Incorrect),
    }
}
