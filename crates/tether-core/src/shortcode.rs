use crate::error::ShortenerError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Lengths accepted from callers. Minted codes are always inside it.
pub const CODE_LENGTHS: RangeInclusive<usize> = 3..=32;

/// The short alphabetic code substituted for an original URL.
///
/// Minted codes are fixed-length runs of ASCII letters. Codes coming from
/// callers go through [`ShortCode::new`] (or `parse`), which accepts only
/// ASCII letters within [`CODE_LENGTHS`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortCode(String);

impl ShortCode {
    pub fn new(code: impl Into<String>) -> Result<Self, ShortenerError> {
        let code = code.into();

        if !CODE_LENGTHS.contains(&code.len()) {
            return Err(ShortenerError::InvalidShortCode(format!(
                "'{code}' has {} characters, expected {} to {}",
                code.len(),
                CODE_LENGTHS.start(),
                CODE_LENGTHS.end()
            )));
        }
        if let Some(bad) = code.chars().find(|c| !c.is_ascii_alphabetic()) {
            return Err(ShortenerError::InvalidShortCode(format!(
                "'{code}' contains '{bad}', only ascii letters are allowed"
            )));
        }

        Ok(Self(code))
    }

    /// Wraps a code from a trusted source: the generator, or a row read
    /// back from the durable store.
    pub fn new_unchecked(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Joins the code onto `base_url`.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ShortCode {
    type Err = ShortenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ShortCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ShortCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn accepts_letters_within_bounds() {
        for code in ["abc", "AbcXyzQ", &"z".repeat(32)] {
            assert!(code.parse::<ShortCode>().is_ok(), "{code}");
        }
    }

    #[test]
    fn rejects_bad_lengths() {
        for code in ["", "ab", &"a".repeat(33)] {
            let err = ShortCode::new(code).unwrap_err();
            assert!(matches!(err, ShortenerError::InvalidShortCode(_)), "{code}");
        }
    }

    #[test]
    fn rejects_digits_and_symbols() {
        for code in ["abc123", "abc-def", "abc def", "ábcdef"] {
            assert!(ShortCode::new(code).is_err(), "{code}");
        }
    }

    #[test]
    fn joins_onto_base_url() {
        let code = ShortCode::new("abcXYZ").unwrap();
        assert_eq!(code.to_url("http://localhost:8080"), "http://localhost:8080/abcXYZ");
        assert_eq!(code.to_url("http://localhost:8080/"), "http://localhost:8080/abcXYZ");
        assert_eq!(code.to_string(), "abcXYZ");
    }

    #[test]
    fn looks_up_by_str() {
        let codes: HashSet<ShortCode> = [ShortCode::new_unchecked("qwErtYu")].into();
        assert!(codes.contains("qwErtYu"));
    }

    #[test]
    fn serializes_as_plain_string() {
        let code = ShortCode::new_unchecked("qwErtYu");
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"qwErtYu\"");
        let back: ShortCode = serde_json::from_str("\"qwErtYu\"").unwrap();
        assert_eq!(back, code);
    }
}
