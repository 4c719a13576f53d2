//! Wire types of the BuildKit LLB solver, hand-written with [`prost`] derives.
//!
//! Field numbers match BuildKit's `solver/pb` definitions so marshaled
//! [`Definition`]s are wire-compatible with a BuildKit daemon. Attribute maps are
//! [`BTreeMap`]s, which prost serializes in key order, keeping encoding
//! deterministic.

use std::collections::BTreeMap;

/// A marshaled LLB graph: one encoded [`Op`] per entry, dependencies before
/// dependents, terminated by a return op referencing the graph's result.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Definition {
    /// Serialized [`Op`] messages.
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub def: Vec<Vec<u8>>,
}

/// One node of the LLB graph.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Op {
    /// Outputs of other ops this op consumes.
    #[prost(message, repeated, tag = "1")]
    pub inputs: Vec<Input>,

    /// The op's payload; a return op has none.
    #[prost(oneof = "op::Kind", tags = "2, 3, 4")]
    pub kind: Option<op::Kind>,
}

/// Nested types of [`Op`].
pub mod op {
    /// Payload of an [`Op`](super::Op).
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        /// Command execution.
        #[prost(message, tag = "2")]
        Exec(super::ExecOp),

        /// Source fetch (image, git, http, local).
        #[prost(message, tag = "3")]
        Source(super::SourceOp),

        /// Filesystem manipulation.
        #[prost(message, tag = "4")]
        File(super::FileOp),
    }
}

impl Op {
    /// The op's [`SourceOp`] payload, if it is a source op.
    #[must_use]
    pub fn as_source(&self) -> Option<&SourceOp> {
        match &self.kind {
            Some(op::Kind::Source(source)) => Some(source),
            _ => None,
        }
    }

    /// The op's [`ExecOp`] payload, if it is an exec op.
    #[must_use]
    pub fn as_exec(&self) -> Option<&ExecOp> {
        match &self.kind {
            Some(op::Kind::Exec(exec)) => Some(exec),
            _ => None,
        }
    }

    /// The op's [`FileOp`] payload, if it is a file op.
    #[must_use]
    pub fn as_file(&self) -> Option<&FileOp> {
        match &self.kind {
            Some(op::Kind::File(file)) => Some(file),
            _ => None,
        }
    }
}

/// Reference to one output of another op.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Input {
    /// Content digest of the referenced op.
    #[prost(string, tag = "1")]
    pub digest: String,

    /// Output index of the referenced op.
    #[prost(int64, tag = "2")]
    pub index: i64,
}

/// A source fetch.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SourceOp {
    /// Scheme-prefixed identifier, e.g. `docker-image://...`, `git://...`,
    /// `https://...`, or `local://...`.
    #[prost(string, tag = "1")]
    pub identifier: String,

    /// Scheme-specific attributes.
    #[prost(btree_map = "string, string", tag = "2")]
    pub attrs: BTreeMap<String, String>,
}

/// A command execution.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExecOp {
    /// Process metadata.
    #[prost(message, optional, tag = "1")]
    pub meta: Option<Meta>,

    /// Filesystem mounts; mount 0 is the rootfs.
    #[prost(message, repeated, tag = "2")]
    pub mounts: Vec<Mount>,
}

/// Process metadata of an [`ExecOp`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Meta {
    /// Argument vector.
    #[prost(string, repeated, tag = "1")]
    pub args: Vec<String>,

    /// Environment as sorted `KEY=value` entries.
    #[prost(string, repeated, tag = "2")]
    pub env: Vec<String>,

    /// Working directory.
    #[prost(string, tag = "3")]
    pub cwd: String,
}

/// Attachment of a state to a path inside an [`ExecOp`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Mount {
    /// Index into [`Op::inputs`] of the mounted state; `-1` mounts scratch.
    #[prost(int64, tag = "1")]
    pub input: i64,

    /// Subpath of the input to mount.
    #[prost(string, tag = "2")]
    pub selector: String,

    /// Destination path.
    #[prost(string, tag = "3")]
    pub dest: String,

    /// Output index the mount's post-exec contents are exposed as; `-1` for none.
    #[prost(int64, tag = "4")]
    pub output: i64,

    /// Read-only bind.
    #[prost(bool, tag = "5")]
    pub readonly: bool,

    /// Kind of mount.
    #[prost(enumeration = "MountType", tag = "6")]
    pub mount_type: i32,

    /// Cache configuration, for [`MountType::Cache`] mounts.
    #[prost(message, optional, tag = "20")]
    pub cache_opt: Option<CacheOpt>,
}

/// Kinds of [`Mount`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MountType {
    /// Bind to another state.
    Bind = 0,

    /// Secret file.
    Secret = 1,

    /// SSH agent socket.
    Ssh = 2,

    /// Persistent cache directory.
    Cache = 3,

    /// Temporary filesystem.
    Tmpfs = 4,
}

/// Cache configuration of a [`Mount`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CacheOpt {
    /// Cache key.
    #[prost(string, tag = "1")]
    pub id: String,

    /// How concurrent builds share the cache.
    #[prost(enumeration = "CacheSharingOpt", tag = "2")]
    pub sharing: i32,
}

/// Sharing modes of a cache [`Mount`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum CacheSharingOpt {
    /// Concurrent builds share the cache.
    Shared = 0,

    /// Each concurrent build gets its own copy.
    Private = 1,

    /// Concurrent builds take turns holding the cache.
    Locked = 2,
}

/// A filesystem manipulation.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileOp {
    /// Actions applied in order.
    #[prost(message, repeated, tag = "1")]
    pub actions: Vec<FileAction>,
}

/// One action of a [`FileOp`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileAction {
    /// Index into [`Op::inputs`] of the base the action applies to; `-1` is scratch.
    #[prost(int64, tag = "1")]
    pub input: i64,

    /// Index into [`Op::inputs`] of the secondary input (the copy source); `-1` for
    /// none.
    #[prost(int64, tag = "2")]
    pub secondary_input: i64,

    /// Output index the action's result is exposed as; `-1` for intermediate actions.
    #[prost(int64, tag = "3")]
    pub output: i64,

    /// The action itself.
    #[prost(oneof = "file_action::Action", tags = "4, 5, 6")]
    pub action: Option<file_action::Action>,
}

/// Nested types of [`FileAction`].
pub mod file_action {
    /// Payload of a [`FileAction`](super::FileAction).
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Action {
        /// Copy files between states.
        #[prost(message, tag = "4")]
        Copy(super::FileActionCopy),

        /// Create a file.
        #[prost(message, tag = "5")]
        Mkfile(super::FileActionMkFile),

        /// Create a directory.
        #[prost(message, tag = "6")]
        Mkdir(super::FileActionMkDir),
    }
}

impl FileAction {
    /// The action's copy payload, if it is a copy.
    #[must_use]
    pub fn as_copy(&self) -> Option<&FileActionCopy> {
        match &self.action {
            Some(file_action::Action::Copy(copy)) => Some(copy),
            _ => None,
        }
    }

    /// The action's mkfile payload, if it is a mkfile.
    #[must_use]
    pub fn as_mkfile(&self) -> Option<&FileActionMkFile> {
        match &self.action {
            Some(file_action::Action::Mkfile(mkfile)) => Some(mkfile),
            _ => None,
        }
    }

    /// The action's mkdir payload, if it is a mkdir.
    #[must_use]
    pub fn as_mkdir(&self) -> Option<&FileActionMkDir> {
        match &self.action {
            Some(file_action::Action::Mkdir(mkdir)) => Some(mkdir),
            _ => None,
        }
    }
}

/// Copy files from the secondary input into the primary input.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileActionCopy {
    /// Path to copy from, within the secondary input.
    #[prost(string, tag = "1")]
    pub src: String,

    /// Path to copy to, within the primary input.
    #[prost(string, tag = "2")]
    pub dest: String,

    /// Optional ownership override.
    #[prost(message, optional, tag = "3")]
    pub owner: Option<ChownOpt>,

    /// Mode bits override; `-1` preserves the source mode.
    #[prost(int32, tag = "4")]
    pub mode: i32,

    /// Follow symlinks in `src`.
    #[prost(bool, tag = "5")]
    pub follow_symlink: bool,

    /// Copy the contents of a directory `src`, not the directory itself.
    #[prost(bool, tag = "6")]
    pub dir_copy_contents: bool,

    /// Create parent directories of `dest` as needed.
    #[prost(bool, tag = "8")]
    pub create_dest_path: bool,

    /// Allow wildcards in `src`.
    #[prost(bool, tag = "9")]
    pub allow_wildcard: bool,

    /// Timestamp override in nanoseconds; `-1` preserves source timestamps.
    #[prost(int64, tag = "11")]
    pub timestamp: i64,

    /// Glob patterns selecting the files to copy.
    #[prost(string, repeated, tag = "12")]
    pub include_patterns: Vec<String>,

    /// Glob patterns selecting files to skip.
    #[prost(string, repeated, tag = "13")]
    pub exclude_patterns: Vec<String>,
}

/// Create a file in the primary input.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileActionMkFile {
    /// Path of the file.
    #[prost(string, tag = "1")]
    pub path: String,

    /// Mode bits.
    #[prost(int32, tag = "2")]
    pub mode: i32,

    /// File contents.
    #[prost(bytes = "vec", tag = "3")]
    pub data: Vec<u8>,

    /// Ownership.
    #[prost(message, optional, tag = "4")]
    pub owner: Option<ChownOpt>,

    /// Timestamp in nanoseconds; `-1` for the default.
    #[prost(int64, tag = "5")]
    pub timestamp: i64,
}

/// Create a directory in the primary input.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileActionMkDir {
    /// Path of the directory.
    #[prost(string, tag = "1")]
    pub path: String,

    /// Mode bits.
    #[prost(int32, tag = "2")]
    pub mode: i32,

    /// Create parent directories as needed.
    #[prost(bool, tag = "3")]
    pub make_parents: bool,

    /// Ownership.
    #[prost(message, optional, tag = "4")]
    pub owner: Option<ChownOpt>,

    /// Timestamp in nanoseconds; `-1` for the default.
    #[prost(int64, tag = "5")]
    pub timestamp: i64,
}

/// Ownership of a created file or directory.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChownOpt {
    /// Owning user.
    #[prost(message, optional, tag = "1")]
    pub user: Option<UserOpt>,

    /// Owning group.
    #[prost(message, optional, tag = "2")]
    pub group: Option<UserOpt>,
}

/// A user or group reference.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserOpt {
    /// How the user is identified.
    #[prost(oneof = "user_opt::User", tags = "1, 2")]
    pub user: Option<user_opt::User>,
}

/// Nested types of [`UserOpt`].
pub mod user_opt {
    /// Identification of a [`UserOpt`](super::UserOpt).
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum User {
        /// By name, looked up in an input state.
        #[prost(message, tag = "1")]
        ByName(super::NamedUserOpt),

        /// By numeric id.
        #[prost(uint32, tag = "2")]
        ById(u32),
    }
}

/// A user identified by name within an input state.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NamedUserOpt {
    /// User name.
    #[prost(string, tag = "1")]
    pub name: String,

    /// Index into [`Op::inputs`] of the state whose passwd database is consulted.
    #[prost(int64, tag = "2")]
    pub input: i64,
}
