//! printf-style rendering of a single number
//!
//! Supports `%d %i %u %x %X %o %c %f %F %e %E %g %G` and `%%`, with the `- + space 0 #` flags,
//! width and precision. Length modifiers (`l`, `h`, `L`) are accepted and ignored. At most one
//! conversion may appear in a format string.

use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

/// Longest output produced; longer renderings are cut.
pub const MAX_OUTPUT: usize = 79;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("format string is empty")]
    Empty,
    #[error("format string ends inside a conversion")]
    Incomplete,
    #[error("unsupported conversion '%{0}'")]
    Unsupported(char),
    #[error("format string has more than one conversion")]
    TooManyConversions,
}

#[derive(Debug, Default, Clone, Copy)]
struct Spec {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alternate: bool,
    width: usize,
    precision: Option<usize>,
    conversion: char,
}

/// Renders `number` through `format`. With `unsigned` set the number is first reinterpreted
/// as a 32-bit unsigned integer.
pub fn format_printf(format: &str, number: f64, unsigned: bool) -> Result<String, FormatError> {
    if format.is_empty() {
        return Err(FormatError::Empty);
    }

    let number = if unsigned {
        f64::from(number.trunc() as i64 as u32)
    } else {
        number
    };

    let mut out = String::with_capacity(format.len() + 16);
    let mut chars = format.chars().peekable();
    let mut converted = false;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let spec = parse_spec(&mut chars)?;
        if converted {
            return Err(FormatError::TooManyConversions);
        }
        converted = true;
        out.push_str(&render(&spec, number)?);
    }

    Ok(out.chars().take(MAX_OUTPUT).collect())
}

fn parse_spec(chars: &mut Peekable<Chars<'_>>) -> Result<Spec, FormatError> {
    let mut spec = Spec::default();

    while let Some(&c) = chars.peek() {
        match c {
            '-' => spec.left = true,
            '+' => spec.plus = true,
            ' ' => spec.space = true,
            '0' => spec.zero = true,
            '#' => spec.alternate = true,
            _ => break,
        }
        chars.next();
    }

    // Anything wider than the output limit would be cut anyway
    spec.width = read_digits(chars).unwrap_or(0).min(MAX_OUTPUT);
    if chars.peek() == Some(&'.') {
        chars.next();
        spec.precision = Some(read_digits(chars).unwrap_or(0).min(MAX_OUTPUT));
    }
    while matches!(chars.peek(), Some('l' | 'h' | 'L')) {
        chars.next();
    }

    spec.conversion = chars.next().ok_or(FormatError::Incomplete)?;
    Ok(spec)
}

fn read_digits(chars: &mut Peekable<Chars<'_>>) -> Option<usize> {
    let mut value: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(d as usize));
        chars.next();
    }
    value
}

/* ===================== Rendering ===================== */

fn render(spec: &Spec, number: f64) -> Result<String, FormatError> {
    let (prefix, body, zero_ok) = match spec.conversion {
        'd' | 'i' => {
            let v = number.trunc() as i64;
            (
                sign(v < 0, spec),
                min_digits(v.unsigned_abs().to_string(), spec.precision),
                spec.precision.is_none(),
            )
        }
        'u' | 'x' | 'X' | 'o' => {
            let v = number.trunc() as i64 as u64;
            let (digits, alt) = match spec.conversion {
                'x' => (format!("{:x}", v), "0x"),
                'X' => (format!("{:X}", v), "0X"),
                'o' => (format!("{:o}", v), "0"),
                _ => (v.to_string(), ""),
            };
            let prefix = if spec.alternate && v != 0 { alt } else { "" };
            (
                prefix.to_string(),
                min_digits(digits, spec.precision),
                spec.precision.is_none(),
            )
        }
        'c' => {
            let c = char::from_u32(number.trunc() as i64 as u32).unwrap_or('?');
            (String::new(), c.to_string(), false)
        }
        'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
            let body = float_body(number.abs(), spec);
            (
                sign(number.is_sign_negative() && !number.is_nan(), spec),
                body,
                number.is_finite(),
            )
        }
        other => return Err(FormatError::Unsupported(other)),
    };

    Ok(pad(&prefix, &body, spec, zero_ok))
}

fn sign(negative: bool, spec: &Spec) -> String {
    if negative {
        "-".to_string()
    } else if spec.plus {
        "+".to_string()
    } else if spec.space {
        " ".to_string()
    } else {
        String::new()
    }
}

fn min_digits(digits: String, precision: Option<usize>) -> String {
    match precision {
        Some(p) if digits.len() < p => format!("{}{}", "0".repeat(p - digits.len()), digits),
        _ => digits,
    }
}

fn pad(prefix: &str, body: &str, spec: &Spec, zero_ok: bool) -> String {
    let len = prefix.chars().count() + body.chars().count();
    if spec.width <= len {
        return format!("{}{}", prefix, body);
    }

    let fill = spec.width - len;
    if spec.left {
        format!("{}{}{}", prefix, body, " ".repeat(fill))
    } else if spec.zero && zero_ok {
        format!("{}{}{}", prefix, "0".repeat(fill), body)
    } else {
        format!("{}{}{}", " ".repeat(fill), prefix, body)
    }
}

/// Renders a non-negative float.
fn float_body(v: f64, spec: &Spec) -> String {
    let upper = spec.conversion.is_ascii_uppercase();

    let text = if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        "inf".to_string()
    } else {
        let p = spec.precision.unwrap_or(6);
        match spec.conversion.to_ascii_lowercase() {
            'f' => {
                let mut s = format!("{:.*}", p, v);
                if spec.alternate && p == 0 {
                    s.push('.');
                }
                s
            }
            'e' => exponential(v, p, spec.alternate),
            _ => general(v, p, spec.alternate),
        }
    };

    if upper {
        text.to_uppercase()
    } else {
        text
    }
}

fn exponential(v: f64, precision: usize, alternate: bool) -> String {
    let (mantissa, exponent) = split_exponential(v, precision);
    let dot = if alternate && precision == 0 { "." } else { "" };
    format!(
        "{}{}e{}{:02}",
        mantissa,
        dot,
        if exponent < 0 { '-' } else { '+' },
        exponent.abs()
    )
}

fn split_exponential(v: f64, precision: usize) -> (String, i32) {
    let s = format!("{:.*e}", precision, v);
    match s.split_once('e') {
        Some((mantissa, exponent)) => (mantissa.to_string(), exponent.parse().unwrap_or(0)),
        None => (s, 0),
    }
}

fn general(v: f64, precision: usize, alternate: bool) -> String {
    let p = precision.max(1);
    let exponent = if v == 0.0 {
        0
    } else {
        split_exponential(v, p - 1).1
    };

    if exponent >= -4 && (exponent as i64) < p as i64 {
        let decimals = (p as i64 - 1 - exponent as i64).max(0) as usize;
        let s = format!("{:.*}", decimals, v);
        if alternate {
            s
        } else {
            strip_fraction_zeros(&s)
        }
    } else {
        let s = exponential(v, p - 1, alternate);
        if alternate {
            return s;
        }
        match s.split_once('e') {
            Some((mantissa, rest)) => format!("{}e{}", strip_fraction_zeros(mantissa), rest),
            None => s,
        }
    }
}

fn strip_fraction_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: &str, n: f64) -> String {
        format_printf(format, n, false).unwrap()
    }

    #[test]
    fn test_fixed_point() {
        assert_eq!(fmt("%.2f", 3.14159), "3.14");
        assert_eq!(fmt("%f", 1.5), "1.500000");
        assert_eq!(fmt("%+.1f", 2.0), "+2.0");
        assert_eq!(fmt("%08.3f", -3.5), "-003.500");
    }

    #[test]
    fn test_integers_and_padding() {
        assert_eq!(fmt("%d", 42.9), "42");
        assert_eq!(fmt("%5d", 42.0), "   42");
        assert_eq!(fmt("%-5d|", 42.0), "42   |");
        assert_eq!(fmt("%05d", -42.0), "-0042");
        assert_eq!(fmt("%.4d", 7.0), "0007");
    }

    #[test]
    fn test_oversized_width_and_precision_are_capped() {
        let wide = fmt("%99999999999999999999d", 1.0);
        assert_eq!(wide.len(), MAX_OUTPUT);
        assert!(wide.ends_with('1'));

        let precise = fmt("%.99999999999999999999f", 0.5);
        assert_eq!(precise.len(), MAX_OUTPUT);
        assert!(precise.starts_with("0.5000"));

        let left = fmt("%-4000000000d|", 7.0);
        assert_eq!(left.len(), MAX_OUTPUT);
        assert!(left.starts_with('7'));
    }

    #[test]
    fn test_hex_and_octal() {
        assert_eq!(fmt("%x", 255.0), "ff");
        assert_eq!(fmt("%#X", 255.0), "0XFF");
        assert_eq!(fmt("%o", 8.0), "10");
        assert_eq!(fmt("%#08x", 255.0), "0x0000ff");
    }

    #[test]
    fn test_exponential_and_general() {
        assert_eq!(fmt("%e", 1234.5), "1.234500e+03");
        assert_eq!(fmt("%.2E", 0.000123), "1.23E-04");
        assert_eq!(fmt("%g", 0.0001), "0.0001");
        assert_eq!(fmt("%g", 1234567.0), "1.23457e+06");
        assert_eq!(fmt("%g", 100.0), "100");
        assert_eq!(fmt("%g", 0.0), "0");
    }

    #[test]
    fn test_surrounding_text_and_percent_escape() {
        assert_eq!(fmt("Health: %d%%", 75.9), "Health: 75%");
        assert_eq!(fmt("no conversion", 1.0), "no conversion");
    }

    #[test]
    fn test_unsigned_reinterpretation() {
        assert_eq!(format_printf("%u", -1.0, true).unwrap(), "4294967295");
        assert_eq!(format_printf("%.1f", -1.0, true).unwrap(), "4294967295.0");
    }

    #[test]
    fn test_output_is_truncated() {
        assert_eq!(fmt("%100d", 1.0).len(), MAX_OUTPUT);
    }

    #[test]
    fn test_format_errors() {
        assert_eq!(format_printf("", 1.0, false), Err(FormatError::Empty));
        assert_eq!(
            format_printf("%d and %d", 1.0, false),
            Err(FormatError::TooManyConversions)
        );
        assert_eq!(
            format_printf("%s", 1.0, false),
            Err(FormatError::Unsupported('s'))
        );
        assert_eq!(format_printf("abc %", 1.0, false), Err(FormatError::Incomplete));
    }
}
