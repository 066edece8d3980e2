//! Distinguished name parsing.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component had no `=` or was blank.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component was missing the attribute name to the left of the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// The distinguished name ended with an escape character or a truncated hex pair.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

/// Parsed distinguished name.
///
/// The string the directory sent is kept verbatim and is what gets sent back on a modify, so
/// escaping differences between servers never change the target entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    raw: String,
}

impl DistinguishedName {
    /// Parses a distinguished name.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the input is empty or not RFC 4514 syntax.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        parse_rdns(raw)?;
        Ok(Self {
            raw: raw.to_string(),
        })
    }

    /// Borrows the distinguished name as received.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

/// Splits `raw` into RDNs (leaf first), each a list of unescaped `(attribute, value)` pairs.
fn parse_rdns(raw: &str) -> Result<Vec<Vec<(String, String)>>, DistinguishedNameError> {
    split_unescaped(raw, ',')?
        .into_iter()
        .map(|rdn| {
            split_unescaped(rdn, '+')?
                .into_iter()
                .map(parse_attribute_value)
                .collect::<Result<Vec<_>, _>>()
        })
        .collect()
}

/// Splits on `delimiter` where it is not preceded by a backslash escape.
fn split_unescaped(input: &str, delimiter: char) -> Result<Vec<&str>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (index, ch) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == delimiter {
            parts.push(input[start..index].trim());
            start = index + ch.len_utf8();
        }
    }

    if escaped {
        return Err(DistinguishedNameError::UnterminatedEscape);
    }
    parts.push(input[start..].trim());

    if parts.iter().any(|part| part.is_empty()) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn parse_attribute_value(component: &str) -> Result<(String, String), DistinguishedNameError> {
    let (attribute, value) = component
        .split_once('=')
        .ok_or_else(|| DistinguishedNameError::InvalidComponent(component.to_string()))?;

    let attribute = attribute.trim();
    if attribute.is_empty() {
        return Err(DistinguishedNameError::MissingAttribute(component.to_string()));
    }

    Ok((attribute.to_string(), unescape(value.trim_start())?))
}

/// Resolves `\c` and `\hh` escapes.
fn unescape(value: &str) -> Result<String, DistinguishedNameError> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }

        let first = chars.next().ok_or(DistinguishedNameError::UnterminatedEscape)?;
        if first.is_ascii_hexdigit() {
            let second = chars
                .next()
                .filter(char::is_ascii_hexdigit)
                .ok_or(DistinguishedNameError::UnterminatedEscape)?;
            let pair = [first, second].iter().collect::<String>();
            let byte = u8::from_str_radix(&pair, 16)
                .map_err(|_| DistinguishedNameError::UnterminatedEscape)?;
            bytes.push(byte);
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(first.encode_utf8(&mut buf).as_bytes());
        }
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
