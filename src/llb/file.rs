//! File actions: single-action file ops appended to a [`State`].

use std::sync::Arc;

use super::{abs_path, Node, Output, OutputKind, State};

impl State {
    /// Append a file action, returning the state of its result.
    #[must_use]
    pub fn file(&self, action: impl Into<FileAction>) -> State {
        let node = Arc::new(Node::File(FileNode {
            input: self.output.clone(),
            action: action.into(),
        }));

        State {
            output: Some(Output {
                node,
                kind: OutputKind::Index(0),
            }),
            env: self.env.clone(),
            cwd: self.cwd.clone(),
        }
    }
}

pub(crate) struct FileNode {
    /// Base the action applies to; `None` is scratch.
    pub(crate) input: Option<Output>,
    pub(crate) action: FileAction,
}

/// A file action accepted by [`State::file`].
pub enum FileAction {
    /// Create a directory.
    Mkdir(Mkdir),

    /// Create a file.
    Mkfile(Mkfile),

    /// Copy from another state.
    Copy(Copy),
}

impl From<Mkdir> for FileAction {
    fn from(value: Mkdir) -> Self {
        Self::Mkdir(value)
    }
}

impl From<Mkfile> for FileAction {
    fn from(value: Mkfile) -> Self {
        Self::Mkfile(value)
    }
}

impl From<Copy> for FileAction {
    fn from(value: Copy) -> Self {
        Self::Copy(value)
    }
}

/// Create a directory.
pub struct Mkdir {
    pub(crate) path: String,
    pub(crate) mode: u32,
    pub(crate) make_parents: bool,
    pub(crate) owner: (u32, u32),
}

impl Mkdir {
    /// Create the directory at `path` with `mode`, owned by root, without parents.
    pub fn new(path: impl AsRef<str>, mode: u32) -> Self {
        Self {
            path: abs_path(path.as_ref()),
            mode,
            make_parents: false,
            owner: (0, 0),
        }
    }

    /// Create parent directories as needed.
    #[must_use]
    pub fn make_parents(mut self) -> Self {
        self.make_parents = true;
        self
    }

    /// Set the owning user and group ids.
    #[must_use]
    pub fn owner(mut self, uid: u32, gid: u32) -> Self {
        self.owner = (uid, gid);
        self
    }
}

/// Create a file.
pub struct Mkfile {
    pub(crate) path: String,
    pub(crate) mode: u32,
    pub(crate) data: Vec<u8>,
    pub(crate) owner: (u32, u32),
}

impl Mkfile {
    /// Create the file at `path` with `mode` and `data` as contents, owned by root.
    pub fn new(path: impl AsRef<str>, mode: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: abs_path(path.as_ref()),
            mode,
            data: data.into(),
            owner: (0, 0),
        }
    }

    /// Set the owning user and group ids.
    #[must_use]
    pub fn owner(mut self, uid: u32, gid: u32) -> Self {
        self.owner = (uid, gid);
        self
    }
}

/// Copy `src` of another state to `dest` of this one.
pub struct Copy {
    pub(crate) from: Option<Output>,
    pub(crate) src: String,
    pub(crate) dest: String,
    pub(crate) dir_copy_contents: bool,
    pub(crate) create_dest_path: bool,
    pub(crate) include_patterns: Vec<String>,
    pub(crate) exclude_patterns: Vec<String>,
}

impl Copy {
    /// Copy `src` within `from` to `dest` within the state the action is appended to.
    pub fn new(from: &State, src: impl AsRef<str>, dest: impl AsRef<str>) -> Self {
        Self {
            from: from.output.clone(),
            src: abs_path(src.as_ref()),
            dest: abs_path(dest.as_ref()),
            dir_copy_contents: false,
            create_dest_path: false,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }

    /// When `src` is a directory, copy its contents rather than the directory itself.
    #[must_use]
    pub fn dir_contents_only(mut self) -> Self {
        self.dir_copy_contents = true;
        self
    }

    /// Create parent directories of `dest` as needed.
    #[must_use]
    pub fn create_dest_path(mut self) -> Self {
        self.create_dest_path = true;
        self
    }

    /// Glob patterns selecting the files to copy.
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
}
