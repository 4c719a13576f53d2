//! Provides the [`Context`] source variant.

use serde::{Deserialize, Serialize};

/// Host-side build context provided by the caller.
///
/// Resolution is delegated to the injected
/// [`ResolveContext`](crate::resolve::ResolveContext) capability, which owns concerns
/// like dockerignore handling; include/exclude filters are folded into the local
/// source op it produces.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct Context {
    /// Context name; defaults to `"context"`, the primary context of a build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Context {
    /// Name used when none is set.
    pub const DEFAULT_NAME: &'static str = "context";

    /// The context name, defaulted.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(Self::DEFAULT_NAME)
    }

    /// Populate the default name.
    pub fn fill_defaults(&mut self) {
        self.name.get_or_insert_with(|| Self::DEFAULT_NAME.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_name() {
        let context = Context::default();
        assert_eq!(context.name(), "context");

        let named = Context {
            name: Some("other".to_owned()),
        };
        assert_eq!(named.name(), "other");
    }
}
