//! Provides the [`Http`] source variant.

use serde::{Deserialize, Serialize};
use url::Url;

/// Single file fetched over HTTP(S).
///
/// The fetched file is stored under the source's name in the recipe, not under the
/// URL's basename, so downstream consumers address it by the name they already know.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Http {
    /// URL of the artifact.
    pub url: Url,
}

impl From<Url> for Http {
    fn from(url: Url) -> Self {
        Self { url }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_is_validated() {
        assert!(serde_yaml::from_str::<Http>("url: https://example.com/src.tar.gz").is_ok());
        assert!(serde_yaml::from_str::<Http>("url: not a url").is_err());
    }
}
