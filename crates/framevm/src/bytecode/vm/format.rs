//! f-string opcodes and the format-spec mini-language.
//!
//! Supports `[[fill]align][sign][z][#][0][width][grouping][.precision][type]`
//! for strings, integers and floats, matching Python's built-in `format()`.

use std::str::FromStr;

use super::Frame;
use crate::{
    exception::{Fault, RunResult},
    value::{Value, float_repr},
};

/// `FORMAT_VALUE(flags)`: bits 0-1 select a conversion, bit 2 says a spec is on the stack.
pub(super) fn format_value(frame: &mut Frame, flags: u32) -> RunResult<()> {
    let spec = if flags & 4 == 4 { Some(frame.pop()?) } else { None };
    let value = convert(frame.pop()?, flags & 3)?;
    let spec = match &spec {
        Some(Value::Str(spec)) => &**spec,
        Some(other) => return Err(spec_type_error(other)),
        None => "",
    };
    frame.push(Value::from(format_with_spec(&value, spec)?));
    Ok(())
}

/// `FORMAT_SIMPLE`: `format(value, "")`.
pub(super) fn format_simple(frame: &mut Frame) -> RunResult<()> {
    let value = frame.pop()?;
    let formatted = match value {
        Value::Str(_) => value,
        other => Value::from(format_with_spec(&other, "")?),
    };
    frame.push(formatted);
    Ok(())
}

/// `FORMAT_WITH_SPEC`: pops the spec, then the value.
pub(super) fn format_with_spec_op(frame: &mut Frame) -> RunResult<()> {
    let spec = frame.pop()?;
    let value = frame.pop()?;
    let Value::Str(spec) = &spec else {
        return Err(spec_type_error(&spec));
    };
    frame.push(Value::from(format_with_spec(&value, spec)?));
    Ok(())
}

/// `CONVERT_VALUE(kind)`: 1 is `str()`, 2 is `repr()`, 3 is `ascii()`.
pub(super) fn convert_value(frame: &mut Frame, kind: u32) -> RunResult<()> {
    let value = frame.pop()?;
    let converted = convert(value, kind)?;
    frame.push(converted);
    Ok(())
}

fn convert(value: Value, kind: u32) -> RunResult<Value> {
    Ok(match kind {
        0 => value,
        1 => Value::from(value.py_str()),
        2 => Value::from(value.py_repr()),
        3 => Value::from(ascii(&value.py_repr())),
        other => return Err(Fault::unsupported(format!("unknown conversion {other}"))),
    })
}

fn spec_type_error(spec: &Value) -> Fault {
    Fault::type_mismatch(format!("format spec must be a str, not '{}'", spec.type_name()))
}

/// Escapes non-ASCII characters the way `ascii()` does.
fn ascii(repr: &str) -> String {
    let mut out = String::with_capacity(repr.len());
    for c in repr.chars() {
        let code = u32::from(c);
        match code {
            0..0x80 => out.push(c),
            0x80..0x100 => out.push_str(&format!("\\x{code:02x}")),
            0x100..0x10000 => out.push_str(&format!("\\u{code:04x}")),
            _ => out.push_str(&format!("\\U{code:08x}")),
        }
    }
    out
}

/// A parsed format spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParsedFormatSpec {
    fill: char,
    align: Option<char>,
    sign: char,
    /// `z`: negative zero formats as positive zero.
    coerce_zero: bool,
    alternate: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

impl Default for ParsedFormatSpec {
    fn default() -> Self {
        Self {
            fill: ' ',
            align: None,
            sign: '-',
            coerce_zero: false,
            alternate: false,
            width: 0,
            grouping: None,
            precision: None,
            kind: None,
        }
    }
}

impl FromStr for ParsedFormatSpec {
    type Err = Fault;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || Fault::invalid_value(format!("invalid format specifier '{spec}'"));
        let chars: Vec<char> = spec.chars().collect();
        let mut parsed = Self::default();
        let mut i = 0;

        let is_align = |c: char| matches!(c, '<' | '>' | '=' | '^');
        if chars.len() >= 2 && is_align(chars[1]) {
            parsed.fill = chars[0];
            parsed.align = Some(chars[1]);
            i = 2;
        } else if chars.first().copied().is_some_and(is_align) {
            parsed.align = Some(chars[0]);
            i = 1;
        }
        if let Some(&c) = chars.get(i)
            && matches!(c, '+' | '-' | ' ')
        {
            parsed.sign = c;
            i += 1;
        }
        if chars.get(i) == Some(&'z') {
            parsed.coerce_zero = true;
            i += 1;
        }
        if chars.get(i) == Some(&'#') {
            parsed.alternate = true;
            i += 1;
        }
        if chars.get(i) == Some(&'0') {
            if parsed.align.is_none() {
                parsed.fill = '0';
                parsed.align = Some('=');
            }
            i += 1;
        }
        let (width, next) = digits(&chars, i).ok_or_else(invalid)?;
        parsed.width = width.unwrap_or(0);
        i = next;
        if let Some(&c) = chars.get(i)
            && matches!(c, ',' | '_')
        {
            parsed.grouping = Some(c);
            i += 1;
        }
        if chars.get(i) == Some(&'.') {
            let (precision, next) = digits(&chars, i + 1).ok_or_else(invalid)?;
            parsed.precision = Some(precision.ok_or_else(invalid)?);
            i = next;
        }
        if let Some(&c) = chars.get(i) {
            if !"sbcdoxXneEfFgG%".contains(c) {
                return Err(Fault::invalid_value(format!("unknown format code '{c}'")));
            }
            parsed.kind = Some(c);
            i += 1;
        }
        if i == chars.len() { Ok(parsed) } else { Err(invalid()) }
    }
}

/// Reads a run of decimal digits starting at `start`; `None` on overflow.
fn digits(chars: &[char], start: usize) -> Option<(Option<usize>, usize)> {
    let mut end = start;
    let mut value: Option<usize> = None;
    while let Some(digit) = chars.get(end).and_then(|c| c.to_digit(10)) {
        value = Some(value.unwrap_or(0).checked_mul(10)?.checked_add(digit as usize)?);
        end += 1;
    }
    Some((value, end))
}

/// Python's `format(value, spec)` for the built-in scalar types.
pub(crate) fn format_with_spec(value: &Value, spec: &str) -> RunResult<String> {
    if spec.is_empty() {
        return Ok(value.py_str());
    }
    let spec: ParsedFormatSpec = spec.parse()?;
    match value {
        Value::Str(s) => format_str(s, &spec),
        Value::Int(_) | Value::Bool(_) => {
            let i = value.as_int().unwrap_or_default();
            match spec.kind {
                Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => format_float(i as f64, &spec),
                _ => format_int(i, &spec),
            }
        }
        Value::Float(f) => format_float(*f, &spec),
        other => {
            if spec.kind.is_some() || spec.sign != '-' || spec.precision.is_some() {
                return Err(Fault::type_mismatch(format!(
                    "unsupported format string passed to {}.__format__",
                    other.type_name()
                )));
            }
            format_str(&other.py_str(), &spec)
        }
    }
}

fn format_str(s: &str, spec: &ParsedFormatSpec) -> RunResult<String> {
    if !matches!(spec.kind, None | Some('s')) {
        return Err(Fault::invalid_value(format!(
            "unknown format code '{}' for object of type 'str'",
            spec.kind.unwrap_or('s')
        )));
    }
    if spec.sign != '-' {
        return Err(Fault::invalid_value("sign not allowed in string format specifier"));
    }
    if spec.align == Some('=') {
        return Err(Fault::invalid_value("'=' alignment not allowed in string format specifier"));
    }
    let body: String = match spec.precision {
        Some(precision) => s.chars().take(precision).collect(),
        None => s.to_owned(),
    };
    Ok(pad("", &body, spec, '<'))
}

fn format_int(i: i64, spec: &ParsedFormatSpec) -> RunResult<String> {
    if spec.precision.is_some() {
        return Err(Fault::invalid_value("precision not allowed in integer format specifier"));
    }
    let magnitude = i.unsigned_abs();
    let (digits, prefix, group_size) = match spec.kind {
        None | Some('d' | 'n') => (magnitude.to_string(), "", 3),
        Some('b') => (format!("{magnitude:b}"), "0b", 4),
        Some('o') => (format!("{magnitude:o}"), "0o", 4),
        Some('x') => (format!("{magnitude:x}"), "0x", 4),
        Some('X') => (format!("{magnitude:X}"), "0X", 4),
        Some('c') => {
            let c = u32::try_from(i)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(Fault::overflow)?;
            return Ok(pad("", &c.to_string(), spec, '<'));
        }
        Some(other) => {
            return Err(Fault::invalid_value(format!(
                "unknown format code '{other}' for object of type 'int'"
            )));
        }
    };
    let digits = match spec.grouping {
        Some(separator) => group(&digits, separator, group_size),
        None => digits,
    };
    let prefix = if spec.alternate { prefix } else { "" };
    let sign = sign_for(i < 0, spec.sign);
    Ok(pad(&format!("{sign}{prefix}"), &digits, spec, '>'))
}

fn format_float(f: f64, spec: &ParsedFormatSpec) -> RunResult<String> {
    if let Some(kind) = spec.kind
        && !"eEfFgGn%".contains(kind)
    {
        return Err(Fault::invalid_value(format!(
            "unknown format code '{kind}' for object of type 'float'"
        )));
    }
    let mut negative = f.is_sign_negative() && !f.is_nan();
    let magnitude = f.abs();
    let mut body = if magnitude.is_nan() {
        "nan".to_owned()
    } else if magnitude.is_infinite() {
        "inf".to_owned()
    } else {
        let precision = spec.precision.unwrap_or(6);
        match spec.kind {
            Some('f' | 'F') => format!("{magnitude:.precision$}"),
            Some('%') => {
                let percent = magnitude * 100.0;
                format!("{percent:.precision$}")
            }
            Some('e' | 'E') => scientific(magnitude, precision, spec.alternate),
            Some(_) => general(magnitude, precision, spec.alternate),
            None => match spec.precision {
                Some(precision) => general(magnitude, precision, spec.alternate),
                None => float_repr(magnitude),
            },
        }
    };
    if spec.kind == Some('%') {
        body.push('%');
    }
    if matches!(spec.kind, Some('E' | 'F' | 'G')) {
        body = body.to_uppercase();
    }
    if negative && spec.coerce_zero && body.chars().all(|c| !c.is_ascii_digit() || c == '0') {
        negative = false;
    }
    if let Some(separator) = spec.grouping {
        let split = body.find(|c: char| !c.is_ascii_digit()).unwrap_or(body.len());
        let (int_part, rest) = body.split_at(split);
        body = format!("{}{rest}", group(int_part, separator, 3));
    }
    let sign = sign_for(negative, spec.sign);
    Ok(pad(sign, &body, spec, '>'))
}

/// `e` presentation with a signed, at least two-digit exponent.
fn scientific(magnitude: f64, precision: usize, alternate: bool) -> String {
    let formatted = format!("{magnitude:.precision$e}");
    let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
    let exponent: i32 = exponent.parse().unwrap_or_default();
    let point = if alternate && precision == 0 { "." } else { "" };
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}{point}e{sign}{:02}", exponent.abs())
}

/// `g` presentation: fixed or scientific depending on the exponent, trailing zeros removed.
fn general(magnitude: f64, precision: usize, alternate: bool) -> String {
    let precision = precision.max(1);
    if magnitude == 0.0 {
        return if alternate {
            format!("{:.*}", precision - 1, 0.0)
        } else {
            "0".to_owned()
        };
    }
    let digits_after = precision - 1;
    let probe = format!("{magnitude:.digits_after$e}");
    let exponent: i64 = probe
        .split_once('e')
        .and_then(|(_, exp)| exp.parse().ok())
        .unwrap_or_default();
    let body = if exponent >= -4 && exponent < precision as i64 {
        let decimals = (precision as i64 - 1 - exponent).max(0) as usize;
        format!("{magnitude:.decimals$}")
    } else {
        scientific(magnitude, precision - 1, alternate)
    };
    if alternate { body } else { strip_trailing_zeros(&body) }
}

fn strip_trailing_zeros(body: &str) -> String {
    let (mantissa, exponent) = match body.find('e') {
        Some(at) => body.split_at(at),
        None => (body, ""),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    format!("{mantissa}{exponent}")
}

fn sign_for(negative: bool, sign: char) -> &'static str {
    match (negative, sign) {
        (true, _) => "-",
        (false, '+') => "+",
        (false, ' ') => " ",
        _ => "",
    }
}

/// Inserts `separator` every `size` digits from the right.
fn group(digits: &str, separator: char, size: usize) -> String {
    let count = digits.chars().count();
    let mut out = String::with_capacity(count + count / size);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (count - i) % size == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

/// Pads `prefix + body` to the spec width.
fn pad(prefix: &str, body: &str, spec: &ParsedFormatSpec, default_align: char) -> String {
    let len = prefix.chars().count() + body.chars().count();
    let fill_len = spec.width.saturating_sub(len);
    let fill = |n: usize| std::iter::repeat_n(spec.fill, n).collect::<String>();
    match spec.align.unwrap_or(default_align) {
        '<' => format!("{prefix}{body}{}", fill(fill_len)),
        '^' => format!("{}{prefix}{body}{}", fill(fill_len / 2), fill(fill_len - fill_len / 2)),
        '=' => format!("{prefix}{}{body}", fill(fill_len)),
        _ => format!("{}{prefix}{body}", fill(fill_len)),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn fmt(value: impl Into<Value>, spec: &str) -> String {
        format_with_spec(&value.into(), spec).unwrap()
    }

    #[test]
    fn test_alignment_and_fill() {
        assert_eq!(fmt("ab", "<5"), "ab   ");
        assert_eq!(fmt("ab", "*^6"), "**ab**");
        assert_eq!(fmt(42_i64, ">5"), "   42");
        assert_eq!(fmt(-42_i64, "=+6"), "-   42");
        assert_eq!(fmt(7_i64, "03"), "007");
    }

    #[test]
    fn test_integer_presentations() {
        assert_eq!(fmt(255_i64, "x"), "ff");
        assert_eq!(fmt(255_i64, "#X"), "0XFF");
        assert_eq!(fmt(5_i64, "#b"), "0b101");
        assert_eq!(fmt(1_234_567_i64, ","), "1,234,567");
        assert_eq!(fmt(65_i64, "c"), "A");
        assert_eq!(fmt(3_i64, "+d"), "+3");
    }

    #[test]
    fn test_float_presentations() {
        assert_eq!(fmt(1.23456, ".2f"), "1.23");
        assert_eq!(fmt(0.5, ".1%"), "50.0%");
        assert_eq!(fmt(12345.678, ".3e"), "1.235e+04");
        assert_eq!(fmt(0.000_012_5, "g"), "1.25e-05");
        assert_eq!(fmt(1234.5, "g"), "1234.5");
        assert_eq!(fmt(2.0, ""), "2.0");
        assert_eq!(fmt(1_234_567.891, ",.2f"), "1,234,567.89");
        assert_eq!(fmt(2_i64, ".1f"), "2.0");
    }

    #[test]
    fn test_negative_zero_coercion() {
        assert_eq!(fmt(-0.0001, ".2f"), "-0.00");
        assert_eq!(fmt(-0.0001, "z.2f"), "0.00");
    }

    #[test]
    fn test_non_finite_floats() {
        assert_eq!(fmt(f64::INFINITY, "f"), "inf");
        assert_eq!(fmt(f64::NEG_INFINITY, "F"), "-INF");
        assert_eq!(fmt(f64::NAN, ".2f"), "nan");
    }

    #[test]
    fn test_string_precision_truncates() {
        assert_eq!(fmt("hello", ".3"), "hel");
    }

    #[test]
    fn test_invalid_specs() {
        assert!(format_with_spec(&Value::str("x"), "+").is_err());
        assert!(format_with_spec(&Value::Int(1), ".2d").is_err());
        assert!(format_with_spec(&Value::Int(1), "q").is_err());
        assert!(format_with_spec(&Value::Int(1), "5.").is_err());
    }

    #[test]
    fn test_ascii_escapes() {
        assert_eq!(ascii("'é'"), "'\\xe9'");
        assert_eq!(ascii("'→'"), "'\\u2192'");
    }
}
