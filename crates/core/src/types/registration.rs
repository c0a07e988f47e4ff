//! UK vehicle registration marks.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Registration`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Nothing left after removing whitespace.
    #[error("registration is required")]
    Empty,
    /// Longer than any issued mark.
    #[error("registration must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length (after normalization).
        max: usize,
    },
    /// Contains something other than ASCII letters and digits.
    #[error("registration may only contain letters and numbers")]
    InvalidCharacter(char),
}

/// A normalized vehicle registration mark (VRM).
///
/// Normalization removes all whitespace and uppercases the input, so
/// `"ab12 cde"` and `"AB12CDE"` are the same registration and share a cache
/// entry.
///
/// ## Examples
///
/// ```
/// use plateshield_core::Registration;
///
/// let a = Registration::parse("ab12 cde").unwrap();
/// let b = Registration::parse("AB12CDE").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "AB12CDE");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct Registration(String);

impl Registration {
    /// Longest mark accepted. Current UK marks are 7 characters; the slack
    /// covers cherished and Northern Ireland formats.
    pub const MAX_LENGTH: usize = 10;

    /// Normalize and validate a registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the normalized value is empty, too long, or contains
    /// characters other than ASCII letters and digits.
    pub fn parse(input: &str) -> Result<Self, RegistrationError> {
        let normalized = normalize(input);

        if normalized.is_empty() {
            return Err(RegistrationError::Empty);
        }
        if normalized.len() > Self::MAX_LENGTH {
            return Err(RegistrationError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        if let Some(c) = normalized.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(RegistrationError::InvalidCharacter(c));
        }

        Ok(Self(normalized))
    }

    /// Returns the normalized registration.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Strip all whitespace and uppercase.
///
/// This is the canonical form used for cache keys, even for input that
/// [`Registration::parse`] would reject.
#[must_use]
pub fn normalize(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

impl fmt::Display for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Registration {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Registration {
    type Error = RegistrationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Registration> for String {
    fn from(registration: Registration) -> Self {
        registration.0
    }
}

impl AsRef<str> for Registration {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
