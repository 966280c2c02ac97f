//! Text rendering of numbers.

use num_bigint::BigInt;
use num_traits::Signed;

/// Significant digits used by `Float#to_s`.
const FLOAT_DIGITS: i32 = 12;

/// Renders a float like C's `%#.12g`, then drops trailing zeros as long as
/// a digit precedes them (`2.0` stays `2.0`, `1.50` becomes `1.5`).
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    let precision = (FLOAT_DIGITS - 1) as usize;
    let scientific = format!("{value:.precision$e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    let text = if exponent < -4 || exponent >= FLOAT_DIGITS {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
    } else {
        let decimals = (FLOAT_DIGITS - 1 - exponent) as usize;
        let mut fixed = format!("{value:.decimals$}");
        if !fixed.contains('.') {
            fixed.push('.');
        }
        fixed
    };
    strip_trailing_zeros(&text)
}

fn strip_trailing_zeros(text: &str) -> String {
    let (digits, exponent) = match text.find('e') {
        Some(at) => text.split_at(at),
        None => (text, ""),
    };
    let bytes = digits.as_bytes();
    let mut end = bytes.len();
    while end >= 2 && bytes[end - 1] == b'0' && bytes[end - 2].is_ascii_digit() {
        end -= 1;
    }
    format!("{}{exponent}", &digits[..end])
}

/// `0x`-prefixed hexadecimal, sign in front.
pub fn format_hex(value: &BigInt) -> String {
    let digits = value.abs().to_str_radix(16);
    if value.is_negative() {
        format!("-0x{digits}")
    } else {
        format!("0x{digits}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_render_like_the_runtime() {
        assert_eq!(format_float(0.0), "0.0");
        assert_eq!(format_float(-0.0), "-0.0");
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(1.5), "1.5");
        assert_eq!(format_float(-3.25), "-3.25");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(1.0 / 3.0), "0.333333333333");
        assert_eq!(format_float(123456789012.0), "123456789012.");
        assert_eq!(format_float(1e20), "1.0e+20");
        assert_eq!(format_float(1.5e-7), "1.5e-07");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(f64::NAN), "NaN");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn hex_keeps_the_sign_outside_the_prefix() {
        assert_eq!(format_hex(&BigInt::from(0x1bd5b7ddff59c_i64)), "0x1bd5b7ddff59c");
        assert_eq!(format_hex(&BigInt::from(-255)), "-0xff");
        assert_eq!(format_hex(&BigInt::from(0)), "0x0");
    }
}
