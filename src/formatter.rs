//! printf-style message formatting for matched values
//!
//! A format string is split once into a fixed prefix, at most one `%`
//! directive and a fixed suffix. Rendering a value only touches the
//! directive, so the prefix and suffix are copied verbatim.

use crate::codec::{is_set, set_at, MagicReader, MagicWriter};
use crate::error::{MagicError, Result};
use crate::window::ByteWindow;
use std::borrow::Cow;

const FLAG_PREFIX: u8 = 0;
const FLAG_EXPRESSION: u8 = 1;
const FLAG_SUFFIX: u8 = 2;

const DEFAULT_FLOAT_PRECISION: usize = 6;

/// A value extracted by a matcher, kept until the entry is known to be part
/// of the result and its message is rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchValue<'a> {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Text(Cow<'a, str>),
    Bytes(ByteWindow<'a>),
    None,
}

impl MatchValue<'_> {
    fn as_i128(&self) -> Option<i128> {
        match self {
            MatchValue::Signed(v) => Some(*v as i128),
            MatchValue::Unsigned(v) => Some(*v as i128),
            MatchValue::Float(v) => Some(*v as i128),
            _ => None,
        }
    }

    fn as_u64(&self) -> Option<u64> {
        match self {
            MatchValue::Signed(v) => Some(*v as u64),
            MatchValue::Unsigned(v) => Some(*v),
            MatchValue::Float(v) => Some(*v as u64),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            MatchValue::Signed(v) => Some(*v as f64),
            MatchValue::Unsigned(v) => Some(*v as f64),
            MatchValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Text form used by `%s` and by directives that cannot take this value.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            MatchValue::Signed(v) => Cow::Owned(v.to_string()),
            MatchValue::Unsigned(v) => Cow::Owned(v.to_string()),
            MatchValue::Float(v) => Cow::Owned(v.to_string()),
            MatchValue::Text(text) => Cow::Borrowed(text.as_ref()),
            MatchValue::Bytes(window) => Cow::Owned(
                window
                    .as_slice()
                    .iter()
                    .take_while(|&&b| b != 0)
                    .map(|&b| b as char)
                    .collect(),
            ),
            MatchValue::None => Cow::Borrowed(""),
        }
    }
}

/// The single `%[flags][width][.precision]conversion` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PercentExpression {
    source: String,
    left_justify: bool,
    plus_sign: bool,
    space_sign: bool,
    alternate: bool,
    zero_pad: bool,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
}

impl PercentExpression {
    /// Parses a directive such as `%-08.3lx`. The leading `%` is required.
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = || MagicError::InvalidFormat(source.to_string());
        let mut chars = source.chars().peekable();
        if chars.next() != Some('%') {
            return Err(invalid());
        }

        let mut expr = PercentExpression {
            source: source.to_string(),
            left_justify: false,
            plus_sign: false,
            space_sign: false,
            alternate: false,
            zero_pad: false,
            width: None,
            precision: None,
            conversion: 's',
        };

        while let Some(&c) = chars.peek() {
            match c {
                '-' => expr.left_justify = true,
                '+' => expr.plus_sign = true,
                ' ' => expr.space_sign = true,
                '#' => expr.alternate = true,
                '0' => expr.zero_pad = true,
                _ => break,
            }
            chars.next();
        }

        let mut width = String::new();
        while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
            width.push(c);
        }
        if !width.is_empty() {
            expr.width = Some(width.parse().map_err(|_| invalid())?);
        }

        if chars.next_if_eq(&'.').is_some() {
            let mut precision = String::new();
            while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
                precision.push(c);
            }
            expr.precision = Some(if precision.is_empty() {
                0
            } else {
                precision.parse().map_err(|_| invalid())?
            });
        }

        while chars
            .next_if(|&c| matches!(c, 'h' | 'l' | 'q' | 'j' | 'z' | 't' | 'L'))
            .is_some()
        {}

        expr.conversion = match chars.next() {
            Some(c @ ('d' | 'i' | 'u' | 'o' | 'x' | 'X' | 'c' | 's' | 'e' | 'E' | 'f' | 'F'
            | 'g' | 'G')) => c,
            _ => return Err(invalid()),
        };
        if chars.next().is_some() {
            return Err(invalid());
        }
        Ok(expr)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn conversion(&self) -> char {
        self.conversion
    }

    pub fn render(&self, value: &MatchValue<'_>, out: &mut String) {
        match self.conversion {
            'd' | 'i' => match value.as_i128() {
                Some(v) => self.render_integer(v < 0, v.unsigned_abs().to_string(), "", out),
                None => self.render_text(&value.to_text(), out),
            },
            'u' => match value.as_u64() {
                Some(v) => self.render_integer(false, v.to_string(), "", out),
                None => self.render_text(&value.to_text(), out),
            },
            'o' | 'x' | 'X' => match value.as_u64() {
                Some(v) => {
                    let (digits, prefix) = match self.conversion {
                        'o' => (format!("{v:o}"), if v != 0 { "0" } else { "" }),
                        'x' => (format!("{v:x}"), if v != 0 { "0x" } else { "" }),
                        _ => (format!("{v:X}"), if v != 0 { "0X" } else { "" }),
                    };
                    let prefix = if self.alternate { prefix } else { "" };
                    self.render_integer(false, digits, prefix, out)
                }
                None => self.render_text(&value.to_text(), out),
            },
            'c' => match value.as_u64() {
                Some(v) => self.pad(String::new(), (v as u8 as char).to_string(), false, out),
                None => self.render_text(&value.to_text(), out),
            },
            'e' | 'E' | 'f' | 'F' | 'g' | 'G' => match value.as_f64() {
                Some(v) => self.render_float(v, out),
                None => self.render_text(&value.to_text(), out),
            },
            _ => self.render_text(&value.to_text(), out),
        }
    }

    fn sign(&self, negative: bool) -> &'static str {
        if negative {
            "-"
        } else if self.plus_sign && self.is_signed_conversion() {
            "+"
        } else if self.space_sign && self.is_signed_conversion() {
            " "
        } else {
            ""
        }
    }

    fn is_signed_conversion(&self) -> bool {
        matches!(
            self.conversion,
            'd' | 'i' | 'e' | 'E' | 'f' | 'F' | 'g' | 'G'
        )
    }

    fn render_integer(&self, negative: bool, mut digits: String, prefix: &str, out: &mut String) {
        if let Some(precision) = self.precision {
            if precision == 0 && digits == "0" {
                digits.clear();
            }
            while digits.len() < precision {
                digits.insert(0, '0');
            }
        }
        let lead = format!("{}{}", self.sign(negative), prefix);
        let zero_pad = self.zero_pad && self.precision.is_none();
        self.pad(lead, digits, zero_pad, out);
    }

    fn render_float(&self, value: f64, out: &mut String) {
        if value.is_nan() {
            return self.pad(String::new(), "nan".to_string(), false, out);
        }
        let negative = value.is_sign_negative() && value != 0.0;
        let magnitude = value.abs();
        let precision = self.precision.unwrap_or(DEFAULT_FLOAT_PRECISION);
        let upper = self.conversion.is_ascii_uppercase();

        let body = if magnitude.is_infinite() {
            "inf".to_string()
        } else {
            match self.conversion.to_ascii_lowercase() {
                'f' => format!("{magnitude:.precision$}"),
                'e' => c_exponent(magnitude, precision),
                _ => self.general_float(magnitude, precision),
            }
        };
        let body = if upper { body.to_uppercase() } else { body };
        let lead = self.sign(negative).to_string();
        let zero_pad = self.zero_pad && magnitude.is_finite();
        self.pad(lead, body, zero_pad, out);
    }

    fn general_float(&self, magnitude: f64, precision: usize) -> String {
        let precision = precision.max(1);
        let exponent = if magnitude == 0.0 {
            0
        } else {
            let probe = format!("{:.*e}", precision - 1, magnitude);
            probe
                .rsplit('e')
                .next()
                .and_then(|e| e.parse::<i32>().ok())
                .unwrap_or(0)
        };

        let body = if exponent < -4 || exponent >= precision as i32 {
            c_exponent(magnitude, precision - 1)
        } else {
            let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
            format!("{magnitude:.decimals$}")
        };

        if self.alternate {
            return body;
        }
        match body.split_once('e') {
            Some((mantissa, exp)) => format!("{}e{}", strip_fraction_zeros(mantissa), exp),
            None => strip_fraction_zeros(&body).to_string(),
        }
    }

    fn render_text(&self, text: &str, out: &mut String) {
        let text = match self.precision {
            Some(precision) => text.chars().take(precision).collect(),
            None => text.to_string(),
        };
        self.pad(String::new(), text, false, out);
    }

    fn pad(&self, lead: String, body: String, zero_pad: bool, out: &mut String) {
        let len = lead.chars().count() + body.chars().count();
        let fill = self.width.unwrap_or(0).saturating_sub(len);
        if fill == 0 {
            out.push_str(&lead);
            out.push_str(&body);
        } else if self.left_justify {
            out.push_str(&lead);
            out.push_str(&body);
            out.extend(std::iter::repeat_n(' ', fill));
        } else if zero_pad {
            out.push_str(&lead);
            out.extend(std::iter::repeat_n('0', fill));
            out.push_str(&body);
        } else {
            out.extend(std::iter::repeat_n(' ', fill));
            out.push_str(&lead);
            out.push_str(&body);
        }
    }
}

fn c_exponent(magnitude: f64, precision: usize) -> String {
    let formatted = format!("{magnitude:.precision$e}");
    match formatted.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => formatted,
    }
}

fn strip_fraction_zeros(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// A parsed format string: `prefix`, optional directive, `suffix`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MagicFormatter {
    prefix: String,
    expression: Option<PercentExpression>,
    suffix: String,
}

impl MagicFormatter {
    /// Parses a format string. `%%` is a literal percent sign; only the
    /// first real directive is interpreted, later text belongs to the suffix.
    pub fn parse(format: &str) -> Result<Self> {
        let mut prefix = String::new();
        let mut rest = format;

        while let Some(pos) = rest.find('%') {
            prefix.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            if let Some(stripped) = after.strip_prefix('%') {
                prefix.push('%');
                rest = stripped;
                continue;
            }

            let end = after
                .char_indices()
                .find(|&(_, c)| {
                    c.is_ascii_alphabetic() && !matches!(c, 'h' | 'l' | 'q' | 'j' | 'z' | 't' | 'L')
                })
                .map(|(i, c)| i + c.len_utf8())
                .ok_or_else(|| MagicError::InvalidFormat(format.to_string()))?;
            let expression = PercentExpression::parse(&rest[pos..pos + 1 + end])?;
            let suffix = after[end..].replace("%%", "%");
            return Ok(Self {
                prefix,
                expression: Some(expression),
                suffix,
            });
        }

        prefix.push_str(rest);
        Ok(Self {
            prefix,
            expression: None,
            suffix: String::new(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn expression(&self) -> Option<&PercentExpression> {
        self.expression.as_ref()
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn format(&self, value: &MatchValue<'_>, out: &mut String) {
        out.push_str(&self.prefix);
        if let Some(expression) = &self.expression {
            expression.render(value, out);
        }
        out.push_str(&self.suffix);
    }

    pub fn format_to_string(&self, value: &MatchValue<'_>) -> String {
        let mut out = String::new();
        self.format(value, &mut out);
        out
    }

    pub fn write(&self, writer: &mut MagicWriter) {
        let mut flags = 0u8;
        flags = set_at(flags, FLAG_PREFIX, !self.prefix.is_empty());
        flags = set_at(flags, FLAG_EXPRESSION, self.expression.is_some());
        flags = set_at(flags, FLAG_SUFFIX, !self.suffix.is_empty());
        writer.write_u8(flags);
        if !self.prefix.is_empty() {
            writer.write_compact_string(&self.prefix);
        }
        if let Some(expression) = &self.expression {
            writer.write_compact_string(expression.source());
        }
        if !self.suffix.is_empty() {
            writer.write_compact_string(&self.suffix);
        }
    }

    pub fn read(reader: &mut MagicReader) -> Result<Self> {
        let flags = reader.read_u8()?;
        let prefix = if is_set(flags, FLAG_PREFIX) {
            reader.read_compact_string()?
        } else {
            String::new()
        };
        let expression = if is_set(flags, FLAG_EXPRESSION) {
            Some(PercentExpression::parse(&reader.read_compact_string()?)?)
        } else {
            None
        };
        let suffix = if is_set(flags, FLAG_SUFFIX) {
            reader.read_compact_string()?
        } else {
            String::new()
        };
        Ok(Self {
            prefix,
            expression,
            suffix,
        })
    }
}

impl std::fmt::Display for MagicFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.prefix.replace('%', "%%"))?;
        if let Some(expression) = &self.expression {
            f.write_str(expression.source())?;
        }
        f.write_str(&self.suffix.replace('%', "%%"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(format: &str, value: MatchValue<'_>) -> String {
        MagicFormatter::parse(format).unwrap().format_to_string(&value)
    }

    #[test]
    fn splits_prefix_directive_and_suffix() {
        let formatter = MagicFormatter::parse("version %d.x (100%%)").unwrap();
        assert_eq!(formatter.prefix(), "version ");
        assert_eq!(formatter.expression().unwrap().source(), "%d");
        assert_eq!(formatter.suffix(), ".x (100%)");
    }

    #[test]
    fn plain_text_has_no_directive() {
        let formatter = MagicFormatter::parse("PDF document").unwrap();
        assert!(formatter.expression().is_none());
        assert_eq!(formatter.format_to_string(&MatchValue::Signed(1)), "PDF document");
    }

    #[test]
    fn integer_conversions() {
        assert_eq!(fmt("%d", MatchValue::Signed(-42)), "-42");
        assert_eq!(fmt("%u", MatchValue::Signed(-1)), u64::MAX.to_string());
        assert_eq!(fmt("%x", MatchValue::Unsigned(0xBEEF)), "beef");
        assert_eq!(fmt("%#X", MatchValue::Unsigned(0xBEEF)), "0XBEEF");
        assert_eq!(fmt("%#o", MatchValue::Unsigned(8)), "010");
        assert_eq!(fmt("%c", MatchValue::Unsigned(b'A' as u64)), "A");
        assert_eq!(fmt("%ld bytes", MatchValue::Unsigned(7)), "7 bytes");
    }

    #[test]
    fn width_precision_and_padding() {
        assert_eq!(fmt("[%5d]", MatchValue::Signed(42)), "[   42]");
        assert_eq!(fmt("[%-5d]", MatchValue::Signed(42)), "[42   ]");
        assert_eq!(fmt("[%05d]", MatchValue::Signed(-42)), "[-0042]");
        assert_eq!(fmt("[%+d]", MatchValue::Signed(3)), "[+3]");
        assert_eq!(fmt("[%.3d]", MatchValue::Signed(7)), "[007]");
        assert_eq!(fmt("[%08x]", MatchValue::Unsigned(0x1F)), "[0000001f]");
        assert_eq!(fmt("[%.3s]", MatchValue::Text("abcdef".into())), "[abc]");
    }

    #[test]
    fn float_conversions() {
        assert_eq!(fmt("%f", MatchValue::Float(1.5)), "1.500000");
        assert_eq!(fmt("%.2f", MatchValue::Float(-3.14159)), "-3.14");
        assert_eq!(fmt("%e", MatchValue::Float(150.0)), "1.500000e+02");
        assert_eq!(fmt("%g", MatchValue::Float(0.0001)), "0.0001");
        assert_eq!(fmt("%g", MatchValue::Float(1234567.0)), "1.23457e+06");
        assert_eq!(fmt("%g", MatchValue::Float(2.5)), "2.5");
    }

    #[test]
    fn string_from_bytes_stops_at_nul() {
        let data = b"ABC\0DEF";
        let window = ByteWindow::new(data);
        assert_eq!(fmt("name: %s", MatchValue::Bytes(window)), "name: ABC");
    }

    #[test]
    fn rejects_bad_directives() {
        assert!(MagicFormatter::parse("broken %").is_err());
        assert!(PercentExpression::parse("%y").is_err());
        assert!(PercentExpression::parse("d").is_err());
    }

    #[test]
    fn codec_round_trip_preserves_parts() {
        let formatter = MagicFormatter::parse("at %08x%% off").unwrap();
        let mut writer = MagicWriter::new();
        formatter.write(&mut writer);
        let mut reader = MagicReader::new(writer.into_bytes());
        assert_eq!(MagicFormatter::read(&mut reader).unwrap(), formatter);
    }
}
