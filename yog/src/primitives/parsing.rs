//! Number literals from text.

use num_bigint::BigInt;

use crate::errors::{ErrorKind, Unwind};
use crate::numeric::normalize;
use crate::value::Value;
use crate::vm::VM;

/// Parses an integer or float literal.
///
/// Accepts an optional sign, the `0x`/`0o`/`0b` radix prefixes (integers
/// only) and `_` between digits. A `.` or an exponent makes the literal a
/// float. Integers come back as a fixnum when they fit.
pub fn parse_number(vm: &mut VM, text: &str) -> Result<Value, Unwind> {
    match parse(text.trim()) {
        Some(Literal::Int(value)) => Ok(normalize(vm, value)),
        Some(Literal::Float(value)) => Ok(vm.new_float(value)),
        None => {
            let message = format!("invalid literal for number: '{text}'");
            Err(vm.raise_error(ErrorKind::ValueError, &message))
        }
    }
}

#[derive(Debug, PartialEq)]
enum Literal {
    Int(BigInt),
    Float(f64),
}

fn parse(text: &str) -> Option<Literal> {
    let (negative, body) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = split_radix(body);
    let digits = strip_separators(digits, radix)?;

    let is_float = radix == 10 && digits.contains(['.', 'e', 'E']);
    if is_float {
        if !digits.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) {
            return None;
        }
        let value: f64 = digits.parse().ok()?;
        return Some(Literal::Float(if negative { -value } else { value }));
    }

    if !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let value = BigInt::parse_bytes(digits.as_bytes(), radix)?;
    Some(Literal::Int(if negative { -value } else { value }))
}

fn split_radix(body: &str) -> (u32, &str) {
    let prefix = body.get(..2).map(str::to_ascii_lowercase);
    match prefix.as_deref() {
        Some("0x") => (16, &body[2..]),
        Some("0o") => (8, &body[2..]),
        Some("0b") => (2, &body[2..]),
        _ => (10, body),
    }
}

/// Drops `_` separators; `None` unless every one sits between two digits
/// of `radix`, or if nothing is left.
fn strip_separators(digits: &str, radix: u32) -> Option<String> {
    if digits.is_empty() {
        return None;
    }
    let chars: Vec<char> = digits.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c != '_' {
            continue;
        }
        let before = i.checked_sub(1).and_then(|j| chars.get(j));
        let after = chars.get(i + 1);
        let is_digit = |c: Option<&char>| c.is_some_and(|c| c.is_digit(radix));
        if !is_digit(before) || !is_digit(after) {
            return None;
        }
    }
    Some(chars.into_iter().filter(|&c| c != '_').collect())
}
