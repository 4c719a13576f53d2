//! Provides the [`Git`] source variant and [`GitRef`], the parser for the remote forms
//! git accepts.

use std::ops::Not;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Git repository pinned to a commit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Git {
    /// Repository URL. `http(s)://`, `git://`, `ssh://`, and SCP-style
    /// `user@host:path` forms are accepted.
    pub url: String,

    /// Commit (or tag) to check out.
    pub commit: String,

    /// Keep the `.git` directory in the checkout.
    #[serde(default, skip_serializing_if = "Not::not")]
    pub keep_git_dir: bool,
}

/// A validated git remote.
///
/// `remote` is kept exactly as written; classification only records which transport
/// the remote uses so consumers can build transport-specific identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRef {
    /// The remote exactly as given.
    pub remote: String,

    /// Transport the remote uses.
    pub protocol: GitProtocol,
}

/// Transports a [`GitRef`] may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitProtocol {
    /// `http://`
    Http,

    /// `https://`
    Https,

    /// `git://`
    Git,

    /// `ssh://` or SCP-style `user@host:path`.
    Ssh,
}

impl GitRef {
    /// Parse and classify a git remote.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote is empty, uses an unrecognized transport, or has
    /// an explicit scheme but is not a well-formed URL.
    pub fn parse(remote: &str) -> Result<Self, ParseGitRefError> {
        const SCHEMES: [(&str, GitProtocol); 4] = [
            ("http://", GitProtocol::Http),
            ("https://", GitProtocol::Https),
            ("git://", GitProtocol::Git),
            ("ssh://", GitProtocol::Ssh),
        ];

        if remote.is_empty() {
            return Err(ParseGitRefError::Empty);
        }

        for (scheme, protocol) in SCHEMES {
            if remote.starts_with(scheme) {
                Url::parse(remote)?;
                return Ok(Self {
                    remote: remote.to_owned(),
                    protocol,
                });
            }
        }

        if is_implicit_ssh(remote) {
            return Ok(Self {
                remote: remote.to_owned(),
                protocol: GitProtocol::Ssh,
            });
        }

        Err(ParseGitRefError::UnknownTransport)
    }
}

/// SCP-style `user@host:path` remotes, which are not RFC URLs and so get their own
/// detection.
fn is_implicit_ssh(remote: &str) -> bool {
    let Some((user, rest)) = remote.split_once('@') else {
        return false;
    };
    let Some((host, _path)) = rest.split_once(':') else {
        return false;
    };

    !user.is_empty()
        && user
            .chars()
            .all(|char| char.is_ascii_alphanumeric() || matches!(char, '-' | '_'))
        && !host.is_empty()
        && host
            .chars()
            .all(|char| char.is_ascii_alphanumeric() || matches!(char, '-' | '.'))
}

/// Error returned when attempting to parse a [`GitRef`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseGitRefError {
    /// Empty remote.
    #[error("git remote cannot be empty")]
    Empty,

    /// Remote matches none of the recognized transports.
    #[error("unrecognized git transport, expected http(s)://, git://, ssh://, or user@host:path")]
    UnknownTransport,

    /// Remote has an explicit scheme but is not a well-formed URL.
    #[error("invalid git URL: {0}")]
    Url(#[from] url::ParseError),
}
