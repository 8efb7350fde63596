//! Validated text primitives shared across the PROM workspace.
//!
//! Values arriving from request bodies and CLI arguments are wrapped in these types at the
//! boundary so the core never has to re-check for blank identifiers.

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,

    /// The input is longer than the type allows
    #[error("Text exceeds {max} characters")]
    TooLong { max: usize },

    /// The input contains a character the type does not accept
    #[error("Invalid character {found:?} in identifier")]
    InvalidCharacter { found: char },
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the owned string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Unique hospital identifier of a patient or staff member.
///
/// A UHID is trimmed, non-empty and at most [`Uhid::MAX_LEN`] characters. Hospitals use
/// punctuation such as `.` or `/` in identifiers, so only characters that cannot sit inside a
/// narrative `Patient ID:` line are refused: whitespace, control characters and the XHTML
/// markup characters `<`, `>` and `&`. Case is preserved as supplied; comparisons against
/// narrative text are done case-insensitively by the locator, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uhid(String);

impl Uhid {
    /// Longest accepted identifier.
    pub const MAX_LEN: usize = 64;

    /// Validates and wraps a hospital identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] for blank input, [`TextError::TooLong`] when the trimmed
    /// value exceeds [`Uhid::MAX_LEN`], and [`TextError::InvalidCharacter`] for whitespace,
    /// control characters, `<`, `>` or `&`.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        if trimmed.chars().count() > Self::MAX_LEN {
            return Err(TextError::TooLong { max: Self::MAX_LEN });
        }
        if let Some(found) = trimmed
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || matches!(*c, '<' | '>' | '&'))
        {
            return Err(TextError::InvalidCharacter { found });
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Uhid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Uhid {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uhid::parse(s)
    }
}

impl AsRef<str> for Uhid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for Uhid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for Uhid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Uhid::parse(&s).map_err(serde::de::Error::custom)
    }
}
