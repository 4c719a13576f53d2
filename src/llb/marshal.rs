//! Deterministic marshaling of [`State`] graphs into [`pb::Definition`]s.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use prost::Message;
use sha2::{Digest, Sha256};

use super::{
    exec::ExecNode,
    file::{FileAction, FileNode},
    pb, Node, Output, OutputKind, SourceNode, State,
};

impl State {
    /// Marshal the op graph reachable from this state.
    ///
    /// Ops are emitted dependencies-first and linked by content digest, followed by a
    /// return op referencing this state's output. The walk, every map, and every
    /// list are ordered, so marshaling the same state twice yields byte-identical
    /// definitions.
    #[must_use]
    pub fn marshal(&self) -> pb::Definition {
        let mut marshaler = Marshaler::default();

        let inputs = match &self.output {
            Some(output) => vec![marshaler.input(output)],
            None => Vec::new(),
        };
        let terminal = pb::Op {
            inputs,
            kind: None,
        };
        marshaler.def.push(terminal.encode_to_vec());

        pb::Definition { def: marshaler.def }
    }
}

impl pb::Definition {
    /// Decode every op of the definition, the terminal return op included.
    ///
    /// # Errors
    ///
    /// Returns an error if an entry is not a valid [`pb::Op`] message.
    pub fn ops(&self) -> Result<Vec<pb::Op>, prost::DecodeError> {
        self.def
            .iter()
            .map(|bytes| pb::Op::decode(bytes.as_slice()))
            .collect()
    }
}

#[derive(Default)]
struct Marshaler {
    def: Vec<Vec<u8>>,
    visited: HashMap<usize, String>,
    emitted: HashSet<String>,
}

impl Marshaler {
    /// Emit the op graph behind `output` and return the input referencing it.
    fn input(&mut self, output: &Output) -> pb::Input {
        let digest = self.visit(&output.node);
        let index = match &output.kind {
            OutputKind::Index(index) => *index,
            OutputKind::Mount(dest) => match output.node.as_ref() {
                Node::Exec(exec) => exec.output_index(dest),
                // mount outputs only ever point at exec nodes
                Node::Source(_) | Node::File(_) => 0,
            },
        };

        pb::Input { digest, index }
    }

    /// Emit `node` (dependencies first, at most once) and return its digest.
    fn visit(&mut self, node: &Arc<Node>) -> String {
        let key = Arc::as_ptr(node) as *const () as usize;
        if let Some(digest) = self.visited.get(&key) {
            return digest.clone();
        }

        let op = match node.as_ref() {
            Node::Source(source) => source_op(source),
            Node::Exec(exec) => self.exec_op(exec),
            Node::File(file) => self.file_op(file),
        };

        let bytes = op.encode_to_vec();
        let digest = format!("sha256:{:x}", Sha256::digest(&bytes));
        if self.emitted.insert(digest.clone()) {
            self.def.push(bytes);
        }
        self.visited.insert(key, digest.clone());
        digest
    }

    fn exec_op(&mut self, exec: &ExecNode) -> pb::Op {
        let mut inputs = Vec::new();
        let mut mounts = Vec::with_capacity(exec.mounts.len());

        for mount in &exec.mounts {
            let input = match &mount.input {
                None => -1,
                Some(output) => {
                    let input = self.input(output);
                    index_of(&mut inputs, input)
                }
            };
            let output = if mount.readonly || mount.cache.is_some() {
                -1
            } else {
                exec.output_index(&mount.dest)
            };
            let mount_type = if mount.cache.is_some() {
                pb::MountType::Cache
            } else {
                pb::MountType::Bind
            };

            mounts.push(pb::Mount {
                input,
                selector: mount.selector.clone().unwrap_or_default(),
                dest: mount.dest.clone(),
                output,
                readonly: mount.readonly,
                mount_type: mount_type as i32,
                cache_opt: mount.cache.as_ref().map(|(id, sharing)| pb::CacheOpt {
                    id: id.clone(),
                    sharing: pb::CacheSharingOpt::from(*sharing) as i32,
                }),
            });
        }

        pb::Op {
            inputs,
            kind: Some(pb::op::Kind::Exec(pb::ExecOp {
                meta: Some(pb::Meta {
                    args: exec.args.clone(),
                    env: exec.env.clone(),
                    cwd: exec.cwd.clone(),
                }),
                mounts,
            })),
        }
    }

    fn file_op(&mut self, file: &FileNode) -> pb::Op {
        let mut inputs = Vec::new();
        let input = match &file.input {
            None => -1,
            Some(output) => {
                let input = self.input(output);
                index_of(&mut inputs, input)
            }
        };

        let (secondary_input, action) = match &file.action {
            FileAction::Mkdir(mkdir) => (
                -1,
                pb::file_action::Action::Mkdir(pb::FileActionMkDir {
                    path: mkdir.path.clone(),
                    mode: mkdir.mode as i32,
                    make_parents: mkdir.make_parents,
                    owner: Some(chown(mkdir.owner)),
                    timestamp: -1,
                }),
            ),
            FileAction::Mkfile(mkfile) => (
                -1,
                pb::file_action::Action::Mkfile(pb::FileActionMkFile {
                    path: mkfile.path.clone(),
                    mode: mkfile.mode as i32,
                    data: mkfile.data.clone(),
                    owner: Some(chown(mkfile.owner)),
                    timestamp: -1,
                }),
            ),
            FileAction::Copy(copy) => {
                let secondary = match &copy.from {
                    None => -1,
                    Some(output) => {
                        let input = self.input(output);
                        index_of(&mut inputs, input)
                    }
                };
                (
                    secondary,
                    pb::file_action::Action::Copy(pb::FileActionCopy {
                        src: copy.src.clone(),
                        dest: copy.dest.clone(),
                        owner: None,
                        mode: -1,
                        follow_symlink: false,
                        dir_copy_contents: copy.dir_copy_contents,
                        create_dest_path: copy.create_dest_path,
                        allow_wildcard: false,
                        timestamp: -1,
                        include_patterns: copy.include_patterns.clone(),
                        exclude_patterns: copy.exclude_patterns.clone(),
                    }),
                )
            }
        };

        pb::Op {
            inputs,
            kind: Some(pb::op::Kind::File(pb::FileOp {
                actions: vec![pb::FileAction {
                    input,
                    secondary_input,
                    output: 0,
                    action: Some(action),
                }],
            })),
        }
    }
}

fn source_op(source: &SourceNode) -> pb::Op {
    pb::Op {
        inputs: Vec::new(),
        kind: Some(pb::op::Kind::Source(pb::SourceOp {
            identifier: source.identifier.clone(),
            attrs: source.attrs.clone(),
        })),
    }
}

/// Position of `input` in `inputs`, appending it if new.
fn index_of(inputs: &mut Vec<pb::Input>, input: pb::Input) -> i64 {
    match inputs.iter().position(|existing| *existing == input) {
        Some(index) => index as i64,
        None => {
            inputs.push(input);
            (inputs.len() - 1) as i64
        }
    }
}

fn chown((uid, gid): (u32, u32)) -> pb::ChownOpt {
    pb::ChownOpt {
        user: Some(pb::UserOpt {
            user: Some(pb::user_opt::User::ById(uid)),
        }),
        group: Some(pb::UserOpt {
            user: Some(pb::user_opt::User::ById(gid)),
        }),
    }
}

impl From<super::CacheSharingMode> for pb::CacheSharingOpt {
    fn from(value: super::CacheSharingMode) -> Self {
        match value {
            super::CacheSharingMode::Shared => Self::Shared,
            super::CacheSharingMode::Private => Self::Private,
            super::CacheSharingMode::Locked => Self::Locked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{CacheSharingMode, Copy, ImageSource, Mkfile, Mount};
    use super::*;

    fn ops(state: &State) -> Vec<pb::Op> {
        state.marshal().ops().unwrap()
    }

    #[test]
    fn scratch_is_a_lone_return_op() {
        let ops = ops(&State::scratch());
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0], pb::Op::default());
    }

    #[test]
    fn ops_are_linked_by_digest() {
        let image = ImageSource::new("example.com/img:latest").state();
        let file = image.file(Mkfile::new("/hello", 0o644, "hi"));

        let def = file.marshal();
        let ops = def.ops().unwrap();
        assert_eq!(ops.len(), 3);

        let source_digest = format!("sha256:{:x}", Sha256::digest(&def.def[0]));
        assert_eq!(ops[1].inputs, [pb::Input { digest: source_digest, index: 0 }]);

        let file_digest = format!("sha256:{:x}", Sha256::digest(&def.def[1]));
        assert_eq!(ops[2].inputs, [pb::Input { digest: file_digest, index: 0 }]);
    }

    #[test]
    fn marshal_is_deterministic() {
        let build = || {
            let image = ImageSource::new("example.com/img:latest").state();
            image
                .run(["/bin/sh", "-c", "make"])
                .env("B", "2")
                .env("A", "1")
                .cache_mount("/cache", "cache-key", CacheSharingMode::Locked)
                .mount(Mount::new("/in", &ImageSource::new("example.com/dep").state()).readonly())
                .add_mount("/out", &State::scratch())
                .marshal()
        };

        assert_eq!(build(), build());
    }

    #[test]
    fn exec_mounts_are_ordered_and_indexed() {
        let image = ImageSource::new("example.com/img:latest").state();
        let out = image
            .run(["/bin/sh", "-c", "true"])
            .mount(Mount::new("/z", &State::scratch()))
            .mount(Mount::new("/a", &State::scratch()).readonly())
            .add_mount("/out", &State::scratch());

        let ops = ops(&out);
        let exec = ops[1].as_exec().unwrap();

        let dests: Vec<&str> = exec.mounts.iter().map(|m| m.dest.as_str()).collect();
        assert_eq!(dests, ["/", "/a", "/out", "/z"]);

        // writable binds are numbered in emitted order, readonly mounts get none
        let outputs: Vec<i64> = exec.mounts.iter().map(|m| m.output).collect();
        assert_eq!(outputs, [0, -1, 1, 2]);

        // the sealed state refers to the /out mount
        let return_op = ops.last().unwrap();
        assert_eq!(return_op.inputs[0].index, 1);
    }

    #[test]
    fn cache_mounts_carry_cache_opt() {
        let image = ImageSource::new("example.com/img:latest").state();
        let out = image
            .run(["/bin/sh", "-c", "true"])
            .cache_mount("/root/.cache", "key", CacheSharingMode::Private)
            .add_mount("/out", &State::scratch());

        let ops = ops(&out);
        let exec = ops[1].as_exec().unwrap();
        let cache = &exec.mounts[1];

        assert_eq!(cache.mount_type, pb::MountType::Cache as i32);
        assert_eq!(cache.input, -1);
        assert_eq!(cache.output, -1);
        assert_eq!(
            cache.cache_opt,
            Some(pb::CacheOpt {
                id: "key".to_owned(),
                sharing: pb::CacheSharingOpt::Private as i32,
            }),
        );
    }

    #[test]
    fn copy_records_both_inputs() {
        let from = ImageSource::new("example.com/img:latest").state();
        let filtered = State::scratch().file(
            Copy::new(&from, "sub", "/")
                .dir_contents_only()
                .include_patterns(vec!["foo".to_owned()]),
        );

        let ops = ops(&filtered);
        let file = ops[1].as_file().unwrap();
        let action = &file.actions[0];

        assert_eq!(action.input, -1);
        assert_eq!(action.secondary_input, 0);
        let copy = action.as_copy().unwrap();
        assert_eq!(copy.src, "/sub");
        assert_eq!(copy.dest, "/");
        assert!(copy.dir_copy_contents);
        assert_eq!(copy.include_patterns, ["foo"]);
    }

    #[test]
    fn shared_nodes_are_emitted_once() {
        let image = ImageSource::new("example.com/img:latest").state();
        let a = image.run(["/bin/sh", "-c", "a"]).add_mount("/out", &State::scratch());
        let merged = State::scratch().file(Copy::new(&a, "/", "/").dir_contents_only());

        // image is reachable both directly and through the exec
        let both = merged.run(["/bin/sh", "-c", "b"]).mount(Mount::new("/img", &image)).add_mount(
            "/out",
            &State::scratch(),
        );

        let ops = ops(&both);
        let image_ops = ops
            .iter()
            .filter(|op| op.as_source().is_some_and(|s| s.identifier.contains("img")))
            .count();
        assert_eq!(image_ops, 1);
    }
}
