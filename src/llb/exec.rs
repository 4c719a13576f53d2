//! Command execution: the [`Exec`] builder and its mounts.

use std::sync::Arc;

use super::{insert_env, Node, Output, OutputKind, State};

impl State {
    /// Start building an exec op running `args` with this state as the rootfs.
    ///
    /// The exec inherits the state's environment and working directory. Seal the
    /// builder with [`Exec::add_mount`] or [`Exec::root`].
    #[must_use]
    pub fn run<I, S>(&self, args: I) -> Exec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Exec {
            args: args.into_iter().map(Into::into).collect(),
            env: self.env.clone(),
            cwd: self.cwd.clone(),
            mounts: vec![MountNode {
                dest: "/".to_owned(),
                input: self.output.clone(),
                selector: None,
                readonly: false,
                cache: None,
            }],
        }
    }
}

/// Builder for an exec op.
///
/// Mounts other than the rootfs are emitted sorted by destination; output indices
/// number the writable bind mounts in that order, rootfs first.
pub struct Exec {
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<String>,
    mounts: Vec<MountNode>,
}

impl Exec {
    /// Set an environment variable for this exec only, on top of the rootfs state's
    /// environment. Entries stay sorted by key; an existing key is replaced.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        insert_env(&mut self.env, key.into(), value.into());
        self
    }

    /// Add a bind mount.
    #[must_use]
    pub fn mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount.node);
        self
    }

    /// Add a persistent cache mount at `dest`.
    #[must_use]
    pub fn cache_mount(
        mut self,
        dest: impl Into<String>,
        id: impl Into<String>,
        sharing: CacheSharingMode,
    ) -> Self {
        self.mounts.push(MountNode {
            dest: dest.into(),
            input: None,
            selector: None,
            readonly: false,
            cache: Some((id.into(), sharing)),
        });
        self
    }

    /// Seal the exec with a final writable bind mount of `source` at `dest` and
    /// return the state of that mount's post-exec contents.
    #[must_use]
    pub fn add_mount(mut self, dest: impl Into<String>, source: &State) -> State {
        let dest = dest.into();
        self.mounts.push(MountNode {
            dest: dest.clone(),
            input: source.output.clone(),
            selector: None,
            readonly: false,
            cache: None,
        });

        self.seal(OutputKind::Mount(dest))
    }

    /// Seal the exec and return the state of its rootfs after execution.
    #[must_use]
    pub fn root(self) -> State {
        self.seal(OutputKind::Mount("/".to_owned()))
    }

    fn seal(self, kind: OutputKind) -> State {
        let Exec {
            args,
            env,
            cwd,
            mut mounts,
        } = self;

        // rootfs stays mount 0, the rest sort by destination
        let rest = mounts.split_off(1);
        mounts.extend(sorted_by_dest(rest));

        let mut env: Vec<String> = env
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        env.sort();

        let node = Arc::new(Node::Exec(ExecNode {
            args,
            env,
            cwd: cwd.unwrap_or_else(|| "/".to_owned()),
            mounts,
        }));

        State {
            output: Some(Output { node, kind }),
            env: Vec::new(),
            cwd: None,
        }
    }
}

fn sorted_by_dest(mut mounts: Vec<MountNode>) -> Vec<MountNode> {
    mounts.sort_by(|a, b| a.dest.cmp(&b.dest));
    mounts
}

/// A bind mount of a state into an [`Exec`].
pub struct Mount {
    node: MountNode,
}

impl Mount {
    /// Bind `source` at `dest`, writable, mounting the whole state.
    pub fn new(dest: impl Into<String>, source: &State) -> Self {
        Self {
            node: MountNode {
                dest: dest.into(),
                input: source.output.clone(),
                selector: None,
                readonly: false,
                cache: None,
            },
        }
    }

    /// Mount only `path` of the source state.
    #[must_use]
    pub fn source_path(mut self, path: impl Into<String>) -> Self {
        self.node.selector = Some(path.into());
        self
    }

    /// Make the mount read-only.
    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.node.readonly = true;
        self
    }
}

/// Sharing modes for cache mounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSharingMode {
    /// Concurrent builds share the cache.
    Shared,

    /// Each concurrent build gets its own copy.
    Private,

    /// Concurrent builds take turns holding the cache.
    Locked,
}

pub(crate) struct ExecNode {
    pub(crate) args: Vec<String>,
    /// `KEY=value` entries, sorted.
    pub(crate) env: Vec<String>,
    pub(crate) cwd: String,
    /// Emitted order: rootfs first, the rest sorted by destination.
    pub(crate) mounts: Vec<MountNode>,
}

impl ExecNode {
    /// Output index of the writable bind mount at `dest`, counting writable bind
    /// mounts in emitted order.
    pub(crate) fn output_index(&self, dest: &str) -> i64 {
        let mut index = 0;
        for mount in &self.mounts {
            if mount.readonly || mount.cache.is_some() {
                continue;
            }
            if mount.dest == dest {
                return index;
            }
            index += 1;
        }
        -1
    }
}

pub(crate) struct MountNode {
    pub(crate) dest: String,
    /// Mounted state; `None` is scratch.
    pub(crate) input: Option<Output>,
    pub(crate) selector: Option<String>,
    pub(crate) readonly: bool,
    pub(crate) cache: Option<(String, CacheSharingMode)>,
}
