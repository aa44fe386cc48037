//! Label-value keys and label escaping

use core::fmt::{self, Write};

use super::{MAX_LABEL_KEY_LEN, MetricsError};

/// Terminator written after every value in a [`LabelKey`].
const TERMINATOR: char = '\0';

/// The label values of one sample joined into a single fixed-size key.
///
/// Each value is followed by a NUL terminator, so `["a", ""]` and `["a"]`
/// produce different keys and the tuple can be split back apart for export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelKey(heapless::String<MAX_LABEL_KEY_LEN>);

impl LabelKey {
    /// Key of a zero-label sample.
    pub const fn empty() -> Self {
        Self(heapless::String::new())
    }

    /// Join `values` into a key.
    ///
    /// Values are rejected, not truncated, when they do not fit or contain the
    /// terminator.
    pub fn join(values: &[&str]) -> Result<Self, MetricsError> {
        let mut key = heapless::String::new();
        for value in values {
            if value.contains(TERMINATOR) {
                return Err(MetricsError::InvalidLabelValue);
            }
            key.push_str(value)
                .and_then(|_| key.push(TERMINATOR))
                .map_err(|_| MetricsError::LabelValuesTooLong {
                    max: MAX_LABEL_KEY_LEN,
                })?;
        }
        Ok(Self(key))
    }

    /// The individual label values, in declaration order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.split_terminator(TERMINATOR)
    }

    /// Whether this key was produced from exactly `values`.
    pub fn matches(&self, values: &[&str]) -> bool {
        self.values().eq(values.iter().copied())
    }
}

/// A label value escaped for the text exposition format.
///
/// Backslash, double quote and line feed are escaped as `\\`, `\"` and `\n`.
pub struct EscapedLabelValue<'a>(pub &'a str);

impl fmt::Display for EscapedLabelValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        escape(f, self.0, true)
    }
}

/// Help text escaped for a `# HELP` line. Quotes are left alone.
pub struct EscapedHelp<'a>(pub &'a str);

impl fmt::Display for EscapedHelp<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        escape(f, self.0, false)
    }
}

fn escape(f: &mut fmt::Formatter<'_>, raw: &str, quotes: bool) -> fmt::Result {
    let mut rest = raw;
    while let Some(pos) = rest.find(|c: char| c == '\\' || c == '\n' || (quotes && c == '"')) {
        f.write_str(&rest[..pos])?;
        match rest.as_bytes()[pos] {
            b'\\' => f.write_str("\\\\")?,
            b'\n' => f.write_str("\\n")?,
            _ => f.write_str("\\\"")?,
        }
        rest = &rest[pos + 1..];
    }
    f.write_str(rest)
}

/// Write `name="value"` with the value escaped.
pub(crate) fn write_pair<W: Write + ?Sized>(out: &mut W, name: &str, value: &str) -> fmt::Result {
    write!(out, "{}=\"{}\"", name, EscapedLabelValue(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_split() {
        let key = LabelKey::join(&["BME280", "0x103"]).unwrap();
        let values: Vec<&str> = key.values().collect();
        assert_eq!(values, ["BME280", "0x103"]);
        assert!(key.matches(&["BME280", "0x103"]));
        assert!(!key.matches(&["BME280"]));
    }

    #[test]
    fn test_empty_values_keep_their_position() {
        let key = LabelKey::join(&["", "x"]).unwrap();
        let values: Vec<&str> = key.values().collect();
        assert_eq!(values, ["", "x"]);
        assert_ne!(key, LabelKey::join(&["x"]).unwrap());
    }

    #[test]
    fn test_join_rejects_oversized_and_nul_values() {
        let long = "x".repeat(MAX_LABEL_KEY_LEN);
        assert_eq!(
            LabelKey::join(&[long.as_str()]),
            Err(MetricsError::LabelValuesTooLong {
                max: MAX_LABEL_KEY_LEN
            })
        );
        assert_eq!(
            LabelKey::join(&["a\0b"]),
            Err(MetricsError::InvalidLabelValue)
        );
    }

    #[test]
    fn test_label_value_escaping() {
        let escaped = format!("{}", EscapedLabelValue("C:\\dir \"q\"\nnext"));
        assert_eq!(escaped, "C:\\\\dir \\\"q\\\"\\nnext");
    }

    #[test]
    fn test_help_escaping_keeps_quotes() {
        let escaped = format!("{}", EscapedHelp("say \"hi\"\\\n"));
        assert_eq!(escaped, "say \"hi\"\\\\\\n");
    }
}
