//! Provides a validated [`SourceName`] for keys of the `sources` and `patches` maps of a
//! [`Recipe`](super::Recipe).

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validated name of a [`Source`](crate::Source) within a [`Recipe`](crate::Recipe).
///
/// Source names key the `sources` and `patches` maps and double as file names for
/// sources which resolve to a single file (HTTP downloads, inline files), so they
/// cannot be empty and must not contain a path separator (`/` or `\`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct SourceName(Box<str>);

impl SourceName {
    /// Create a new [`SourceName`], validating the given string.
    ///
    /// # Errors
    ///
    /// Returns an error if the given string is empty or contains a path separator
    /// (`/` or `\`).
    pub fn new<T>(name: T) -> Result<Self, InvalidSourceNameError>
    where
        T: AsRef<str> + Into<Box<str>>,
    {
        let name_str = name.as_ref();

        if name_str.is_empty() {
            return Err(InvalidSourceNameError::Empty);
        }
        if let Some(separator) = name_str.chars().find(|char| matches!(char, '/' | '\\')) {
            return Err(InvalidSourceNameError::PathSeparator(separator));
        }

        Ok(Self(name.into()))
    }

    /// [`SourceName`] as a string slice.
    ///
    /// Convenience method for `as_ref()` to a `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.as_ref()
    }
}

/// Error returned when attempting to create a [`SourceName`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidSourceNameError {
    /// Empty source name.
    #[error("source name cannot be empty")]
    Empty,

    /// Source name contains a path separator.
    #[error("source name must not contain path separator `{0}`")]
    PathSeparator(char),
}

impl TryFrom<String> for SourceName {
    type Error = InvalidSourceNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<Box<str>> for SourceName {
    type Error = InvalidSourceNameError;

    fn try_from(value: Box<str>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for SourceName {
    type Error = InvalidSourceNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for SourceName {
    type Err = InvalidSourceNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for SourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for SourceName {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SourceName> for Box<str> {
    fn from(value: SourceName) -> Self {
        value.0
    }
}

impl From<SourceName> for String {
    fn from(value: SourceName) -> Self {
        value.0.into_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid() {
        assert_eq!(
            SourceName::new("source-1.tar.gz").unwrap().as_str(),
            "source-1.tar.gz",
        );
    }

    #[test]
    fn empty_err() {
        assert_eq!(SourceName::new(""), Err(InvalidSourceNameError::Empty));
    }

    #[test]
    fn path_separator_err() {
        assert_eq!(
            SourceName::new("dir/file"),
            Err(InvalidSourceNameError::PathSeparator('/')),
        );
        assert_eq!(
            SourceName::new("dir\\file"),
            Err(InvalidSourceNameError::PathSeparator('\\')),
        );
    }

    #[test]
    fn deserialize_validates() {
        assert!(serde_yaml::from_str::<SourceName>("ok-name").is_ok());
        assert!(serde_yaml::from_str::<SourceName>("\"not/ok\"").is_err());
    }
}
