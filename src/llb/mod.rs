//! A minimal LLB client layer: build op graphs as immutable [`State`] values and
//! marshal them into wire-compatible [`Definition`](pb::Definition)s.
//!
//! The surface mirrors the BuildKit client library the original frontends link
//! against: states are cheap persistent handles over reference-counted op nodes,
//! every combinator returns a new state, and marshaling walks the graph
//! dependencies-first, linking ops by content digest.

mod exec;
mod file;
mod marshal;
pub mod pb;
mod source;

use std::{collections::BTreeMap, sync::Arc};

pub use self::{
    exec::{CacheSharingMode, Exec, Mount},
    file::{Copy, FileAction, Mkdir, Mkfile},
    source::{GitSource, HttpSource, ImageSource, LocalSource},
};

/// Boxed error type returned by injected capabilities.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Resolves image references to their configs.
///
/// A resolver is carried by image source ops for consumers which need to inspect the
/// referenced image, such as dockerfile forwarders resolving `FROM` lines. Nothing in
/// this crate invokes it and it does not participate in marshaling.
pub trait MetaResolver {
    /// Resolve `reference` to the image's raw config.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    fn resolve_image_config(&self, reference: &str) -> Result<ResolvedImage, BoxError>;
}

/// Result of [`MetaResolver::resolve_image_config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    /// Possibly-updated reference, e.g. pinned by digest.
    pub reference: String,

    /// Content digest of the config, when known.
    pub digest: Option<String>,

    /// Raw OCI image config bytes.
    pub config: Vec<u8>,
}

/// An immutable handle to a point in an LLB op graph, plus the process metadata
/// (environment, working directory) later exec ops inherit.
///
/// States are persistent values: every combinator returns a new state and existing
/// ones stay valid, so a state can be mounted or copied from any number of times.
#[derive(Clone)]
pub struct State {
    pub(crate) output: Option<Output>,
    pub(crate) env: Vec<(String, String)>,
    pub(crate) cwd: Option<String>,
}

impl State {
    /// The empty state.
    #[must_use]
    pub fn scratch() -> Self {
        Self {
            output: None,
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Whether this is the empty state.
    #[must_use]
    pub fn is_scratch(&self) -> bool {
        self.output.is_none()
    }

    /// Set an environment variable inherited by exec ops run from this state.
    ///
    /// Entries are kept sorted by key; setting an existing key replaces its value.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        insert_env(&mut self.env, key.into(), value.into());
        self
    }

    /// Set the working directory inherited by exec ops run from this state.
    ///
    /// Relative paths are joined onto the previous working directory, which is the
    /// root when unset.
    #[must_use]
    pub fn dir(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        if path.is_empty() {
            return self;
        }

        self.cwd = Some(if path.starts_with('/') {
            path
        } else {
            let prev = self.cwd.as_deref().unwrap_or("/");
            if prev.ends_with('/') {
                format!("{prev}{path}")
            } else {
                format!("{prev}/{path}")
            }
        });
        self
    }

    pub(crate) fn from_source(
        identifier: String,
        attrs: BTreeMap<String, String>,
        resolver: Option<Arc<dyn MetaResolver>>,
    ) -> Self {
        Self {
            output: Some(Output {
                node: Arc::new(Node::Source(SourceNode {
                    identifier,
                    attrs,
                    _resolver: resolver,
                })),
                kind: OutputKind::Index(0),
            }),
            env: Vec::new(),
            cwd: None,
        }
    }
}

/// Insert `key=value` into a key-sorted environment, replacing an existing entry.
pub(crate) fn insert_env(env: &mut Vec<(String, String)>, key: String, value: String) {
    match env.binary_search_by(|(existing, _)| existing.as_str().cmp(&key)) {
        Ok(i) => env[i].1 = value,
        Err(i) => env.insert(i, (key, value)),
    }
}

/// One output of an op node.
#[derive(Clone)]
pub(crate) struct Output {
    pub(crate) node: Arc<Node>,
    pub(crate) kind: OutputKind,
}

/// How an [`Output`] maps to an output index of its node.
#[derive(Clone)]
pub(crate) enum OutputKind {
    /// Fixed index; sources and file ops have a single output 0.
    Index(i64),

    /// Output of the writable bind mount at `dest`; the index depends on the final
    /// mount layout and is resolved at marshal time.
    Mount(String),
}

/// An op node of the graph.
pub(crate) enum Node {
    Source(SourceNode),
    Exec(exec::ExecNode),
    File(file::FileNode),
}

pub(crate) struct SourceNode {
    pub(crate) identifier: String,
    pub(crate) attrs: BTreeMap<String, String>,
    /// Carried for consumers, not marshaled.
    _resolver: Option<Arc<dyn MetaResolver>>,
}

/// Normalize a path to be absolute, as the wire format expects.
pub(crate) fn abs_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_is_sorted_and_replaces() {
        let state = State::scratch()
            .env("FOO", "1")
            .env("BAR", "2")
            .env("FOO", "3");

        assert_eq!(
            state.env,
            [
                ("BAR".to_owned(), "2".to_owned()),
                ("FOO".to_owned(), "3".to_owned()),
            ],
        );
    }

    #[test]
    fn dir_joins_relative_paths() {
        assert_eq!(State::scratch().dir("src").cwd.as_deref(), Some("/src"));
        assert_eq!(
            State::scratch().dir("/build").dir("sub").cwd.as_deref(),
            Some("/build/sub"),
        );
        assert_eq!(
            State::scratch().dir("/build").dir("/other").cwd.as_deref(),
            Some("/other"),
        );
        assert_eq!(State::scratch().dir("").cwd, None);
    }

    #[test]
    fn abs_path_normalizes() {
        assert_eq!(abs_path("sub"), "/sub");
        assert_eq!(abs_path("/sub"), "/sub");
        assert_eq!(abs_path(""), "/");
    }
}
