//! Provides the [`Image`] source variant: a container image, optionally post-processed
//! by a [`Command`] pipeline run against it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::Source;

/// Container image source.
///
/// Without a [`Command`], the source resolves to the image rootfs. With one, the
/// pipeline's output directory becomes the source contents instead.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Image {
    /// Image reference, e.g. `docker.io/library/busybox:latest`. Used verbatim, no
    /// normalization is applied.
    #[serde(rename = "ref")]
    pub reference: String,

    /// Command pipeline run against the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Command>,
}

impl Image {
    /// Create an [`Image`] from a reference, without a command pipeline.
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            cmd: None,
        }
    }
}

/// Command pipeline for an [`Image`] source.
///
/// Each step runs in the image with the shared environment and working directory; the
/// output accumulates in the directory selected by the enclosing source's subpath.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Command {
    /// Working directory for every step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Environment variables shared by every step.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,

    /// Persistent cache mounts available to every step, keyed by destination path.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub cache_dirs: IndexMap<String, CacheDir>,

    /// Extra sources mounted into every step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<SourceMount>,

    /// The commands to run, in order.
    pub steps: Vec<BuildStep>,
}

/// One command of a [`Command`] pipeline, run as `/bin/sh -c <command>`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BuildStep {
    /// Shell command to run.
    pub command: String,

    /// Environment variables added for this step only.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
}

impl BuildStep {
    /// Create a [`BuildStep`] from a shell command, without extra environment
    /// variables.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: IndexMap::new(),
        }
    }
}

/// A [`Source`] mounted into the steps of a [`Command`].
///
/// The mounted spec may be any variant, including another image with commands; mounts
/// nest to arbitrary depth.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SourceMount {
    /// Destination path inside the step's filesystem.
    pub dest: String,

    /// The source to mount.
    pub spec: Box<Source>,
}

/// Persistent cache directory configuration for a [`Command`].
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct CacheDir {
    /// How the cache may be shared between concurrent builds.
    #[serde(default)]
    pub mode: CacheSharing,

    /// Cache key; defaults to the destination path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Sharing modes for a [`CacheDir`].
#[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheSharing {
    /// Concurrent builds share the cache.
    #[default]
    Shared,

    /// Each concurrent build gets its own copy.
    Private,

    /// Concurrent builds take turns holding the cache.
    Locked,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_sharing_default() {
        let cache: CacheDir = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cache.mode, CacheSharing::Shared);
        assert_eq!(cache.key, None);
    }

    #[test]
    fn cache_sharing_invalid_err() {
        assert!(serde_yaml::from_str::<CacheDir>("mode: exclusive").is_err());
    }

    #[test]
    fn command() {
        let cmd: Command = serde_yaml::from_str(
            "dir: /build\n\
                env:\n  FOO: bar\n\
                cache_dirs:\n  /root/.cache:\n    mode: locked\n\
                steps:\n  - command: make\n    env:\n      BAR: baz\n",
        )
        .unwrap();

        assert_eq!(cmd.dir.as_deref(), Some("/build"));
        assert_eq!(cmd.env.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(
            cmd.cache_dirs.get("/root/.cache").map(|cache| cache.mode),
            Some(CacheSharing::Locked),
        );
        assert_eq!(cmd.steps.len(), 1);
        assert_eq!(cmd.steps[0].command, "make");
    }
}
