//! ISO 4217 currency code type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`CurrencyCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyCodeError {
    /// The input string is empty.
    #[error("currency code cannot be empty")]
    Empty,
    /// The input is not exactly three characters long.
    #[error("currency code must be exactly 3 letters (got {0})")]
    InvalidLength(usize),
    /// The input contains a character that is not an ASCII letter.
    #[error("currency code must contain only ASCII letters")]
    InvalidCharacter,
}

/// A three-letter ISO 4217 currency code, stored uppercase.
///
/// Codes are parsed case-insensitively, so `"eur"` and `"EUR"` are the same
/// currency. All costs are reported in [`CurrencyCode::RON`].
///
/// ## Examples
///
/// ```
/// use pantry_core::CurrencyCode;
///
/// let eur = CurrencyCode::parse("eur").unwrap();
/// assert_eq!(eur.as_str(), "EUR");
/// assert!(CurrencyCode::RON.is_base());
/// assert!(CurrencyCode::parse("EURO").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode([u8; 3]);

impl CurrencyCode {
    /// Romanian leu, the base reporting currency.
    pub const RON: Self = Self(*b"RON");
    /// Euro.
    pub const EUR: Self = Self(*b"EUR");
    /// US dollar.
    pub const USD: Self = Self(*b"USD");

    /// Parse a `CurrencyCode` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, is not three characters long,
    /// or contains anything other than ASCII letters.
    pub fn parse(s: &str) -> Result<Self, CurrencyCodeError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CurrencyCodeError::Empty);
        }

        let bytes = trimmed.as_bytes();
        let [a, b, c] = bytes else {
            return Err(CurrencyCodeError::InvalidLength(trimmed.chars().count()));
        };

        let code = [*a, *b, *c];
        if !code.iter().all(u8::is_ascii_alphabetic) {
            return Err(CurrencyCodeError::InvalidCharacter);
        }

        Ok(Self(code.map(|byte| byte.to_ascii_uppercase())))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Only ASCII letters are ever stored.
        core::str::from_utf8(&self.0).unwrap_or("???")
    }

    /// Whether this is the base reporting currency.
    #[must_use]
    pub fn is_base(&self) -> bool {
        *self == Self::RON
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        Self::RON
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = CurrencyCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CurrencyCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.as_str().to_owned()
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for CurrencyCode {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for CurrencyCode {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for CurrencyCode {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case() {
        assert_eq!(CurrencyCode::parse("eur").unwrap(), CurrencyCode::EUR);
        assert_eq!(CurrencyCode::parse(" Ron ").unwrap(), CurrencyCode::RON);
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(CurrencyCode::parse(""), Err(CurrencyCodeError::Empty));
        assert_eq!(CurrencyCode::parse("   "), Err(CurrencyCodeError::Empty));
    }

    #[test]
    fn test_parse_wrong_length() {
        assert_eq!(
            CurrencyCode::parse("EURO"),
            Err(CurrencyCodeError::InvalidLength(4))
        );
        assert_eq!(
            CurrencyCode::parse("EU"),
            Err(CurrencyCodeError::InvalidLength(2))
        );
    }

    #[test]
    fn test_parse_non_letters() {
        assert_eq!(
            CurrencyCode::parse("E1R"),
            Err(CurrencyCodeError::InvalidCharacter)
        );
    }

    #[test]
    fn test_is_base() {
        assert!(CurrencyCode::RON.is_base());
        assert!(!CurrencyCode::EUR.is_base());
        assert!(CurrencyCode::default().is_base());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&CurrencyCode::USD).unwrap();
        assert_eq!(json, "\"USD\"");

        let parsed: CurrencyCode = serde_json::from_str("\"gbp\"").unwrap();
        assert_eq!(parsed.as_str(), "GBP");

        assert!(serde_json::from_str::<CurrencyCode>("\"pounds\"").is_err());
    }
}
