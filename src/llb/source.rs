//! Source op builders: image pulls, git fetches, HTTP downloads, and local contexts.

use std::{collections::BTreeMap, sync::Arc};

use super::{MetaResolver, State};

/// Container image source, identified as `docker-image://<ref>`.
pub struct ImageSource {
    reference: String,
    resolver: Option<Arc<dyn MetaResolver>>,
}

impl ImageSource {
    /// Pull the image at `reference`. The reference is used verbatim.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            resolver: None,
        }
    }

    /// Attach a [`MetaResolver`] for consumers that inspect the image's config.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn MetaResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Build the source state.
    #[must_use]
    pub fn state(self) -> State {
        State::from_source(
            format!("docker-image://{}", self.reference),
            BTreeMap::new(),
            self.resolver,
        )
    }
}

/// Git source, identified as `git://<munged remote>#<commit>`.
///
/// The identifier strips the scheme and, for SSH remotes, the user; the first `:`
/// after an SSH host is replaced by `/` so SCP-style remotes read like paths. The
/// `git.fullurl` attribute always carries the remote exactly as given.
pub struct GitSource {
    remote: String,
    commit: String,
    keep_git_dir: bool,
}

// TODO: pass git auth secrets through to the source op attributes.
impl GitSource {
    /// Fetch `commit` from `remote`.
    pub fn new(remote: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            remote: remote.into(),
            commit: commit.into(),
            keep_git_dir: false,
        }
    }

    /// Keep the `.git` directory in the checkout.
    #[must_use]
    pub fn keep_git_dir(mut self) -> Self {
        self.keep_git_dir = true;
        self
    }

    /// Build the source state.
    #[must_use]
    pub fn state(self) -> State {
        let mut identifier = format!("git://{}", munge_remote(&self.remote));
        if !self.commit.is_empty() {
            identifier.push('#');
            identifier.push_str(&self.commit);
        }

        let mut attrs = BTreeMap::from([("git.fullurl".to_owned(), self.remote)]);
        if self.keep_git_dir {
            attrs.insert("git.keepgitdir".to_owned(), "true".to_owned());
        }

        State::from_source(identifier, attrs, None)
    }
}

/// Strip the scheme from a git remote and flatten SSH remotes into path form.
fn munge_remote(remote: &str) -> String {
    const SCHEMES: [(&str, bool); 4] = [
        ("http://", false),
        ("https://", false),
        ("git://", false),
        ("ssh://", true),
    ];

    for (scheme, ssh) in SCHEMES {
        if let Some(rest) = remote.strip_prefix(scheme) {
            return if ssh { munge_ssh(rest) } else { rest.to_owned() };
        }
    }

    // no scheme: SCP-style SSH
    munge_ssh(remote)
}

fn munge_ssh(remote: &str) -> String {
    let remote = match remote.split_once('@') {
        Some((_user, rest)) => rest,
        None => remote,
    };
    match remote.split_once(':') {
        Some((host, path)) => format!("{host}/{path}"),
        None => remote.to_owned(),
    }
}

/// HTTP(S) source, identified by the URL itself.
pub struct HttpSource {
    url: String,
    filename: Option<String>,
}

impl HttpSource {
    /// Download the file at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            filename: None,
        }
    }

    /// Store the download under `filename` instead of the URL's basename.
    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Build the source state.
    #[must_use]
    pub fn state(self) -> State {
        let mut attrs = BTreeMap::new();
        if let Some(filename) = self.filename {
            attrs.insert("http.filename".to_owned(), filename);
        }

        State::from_source(self.url, attrs, None)
    }
}

/// Local context source, identified as `local://<name>`.
pub struct LocalSource {
    name: String,
    include_patterns: Vec<String>,
    exclude_patterns: Vec<String>,
}

impl LocalSource {
    /// Use the caller-provided context named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }

    /// Glob patterns selecting the files to transfer.
    #[must_use]
    pub fn include_patterns(mut self, patterns: impl Into<Vec<String>>) -> Self {
        self.include_patterns = patterns.into();
        self
    }

    /// Glob patterns selecting files to skip.
    #[must_use]
    pub fn exclude_patterns(mut self, patterns: impl Into<Vec<String>>) -> Self {
        self.exclude_patterns = patterns.into();
        self
    }

    /// Build the source state.
    #[must_use]
    pub fn state(self) -> State {
        let mut attrs = BTreeMap::new();
        if !self.include_patterns.is_empty() {
            attrs.insert(
                "local.includepattern".to_owned(),
                pattern_json(&self.include_patterns),
            );
        }
        if !self.exclude_patterns.is_empty() {
            attrs.insert(
                "local.excludepatterns".to_owned(),
                pattern_json(&self.exclude_patterns),
            );
        }

        State::from_source(format!("local://{}", self.name), attrs, None)
    }
}

/// Pattern lists are JSON arrays in the wire format.
fn pattern_json(patterns: &[String]) -> String {
    serde_json::to_string(patterns).expect("a string list always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn munge_scp_style() {
        assert_eq!(
            munge_remote("user@host:22:test.git"),
            "host/22:test.git",
            "the first colon after the host becomes the path separator",
        );
        assert_eq!(
            munge_remote("git@example.com:org/repo.git"),
            "example.com/org/repo.git",
        );
    }

    #[test]
    fn munge_explicit_schemes() {
        assert_eq!(
            munge_remote("https://example.com/repo.git"),
            "example.com/repo.git",
        );
        assert_eq!(
            munge_remote("git://example.com/repo.git"),
            "example.com/repo.git",
        );
        assert_eq!(
            munge_remote("ssh://git@example.com:22/repo.git"),
            "example.com/22/repo.git",
        );
    }
}
