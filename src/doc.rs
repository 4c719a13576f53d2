//! Renders a reproducibility record for a [`Source`].
//!
//! The output is embedded verbatim in generated package metadata (such as RPM spec
//! sections) so consumers of a package can see how each input was produced;
//! formatting is tab-indented and every map is rendered in sorted key order to keep
//! the record stable.

use std::fmt::Write;

use indexmap::IndexMap;
use itertools::Itertools;

use crate::source::{
    Dockerfile, Git, GitRef, Image, Inline, InlineDir, InlineFile, ParseGitRefError, Source,
    SourceVariant,
};
use crate::Build;

impl Source {
    /// Render the details of how this source is produced.
    ///
    /// `name` is the source's name in the enclosing recipe, which names the files of
    /// HTTP and inline file sources.
    ///
    /// # Errors
    ///
    /// Returns an error if a git source's URL cannot be parsed.
    pub fn doc(&self, name: &str) -> Result<String, ParseGitRefError> {
        let mut out = String::new();

        match &self.variant {
            SourceVariant::Context(_) => {
                line(
                    &mut out,
                    "Generated from a local docker build context and is unreproducible.",
                );
            }
            SourceVariant::Build(build) => build_doc(&mut out, build, name)?,
            SourceVariant::Http(http) => {
                line(&mut out, "Generated from a http(s) source:");
                line(&mut out, &format!("\tURL: {}", http.url));
            }
            SourceVariant::Git(git) => self.git_doc(&mut out, git)?,
            SourceVariant::Image(image) => self.image_doc(&mut out, image, name)?,
            SourceVariant::Inline(inline) => {
                line(&mut out, "Generated from an inline source:");
                inline_doc(&mut out, inline);
            }
        }

        Ok(out)
    }

    fn git_doc(&self, out: &mut String, git: &Git) -> Result<(), ParseGitRefError> {
        let git_ref = GitRef::parse(&git.url)?;

        line(out, "Generated from a git repository:");
        line(out, &format!("\tRemote: {}", git_ref.remote));
        line(out, &format!("\tRef: {}", git.commit));
        if let Some(path) = non_empty(self.path.as_deref()) {
            line(out, &format!("\tExtracted path: {path}"));
        }
        Ok(())
    }

    fn image_doc(
        &self,
        out: &mut String,
        image: &Image,
        name: &str,
    ) -> Result<(), ParseGitRefError> {
        let Some(cmd) = &image.cmd else {
            line(out, "Generated from a docker image:");
            line(out, &format!("\tImage: {}", image.reference));
            if let Some(path) = non_empty(self.path.as_deref()) {
                line(out, &format!("\tExtracted path: {path}"));
            }
            return Ok(());
        };

        line(out, "Generated from running a command(s) in a docker image:");
        line(out, &format!("\tImage: {}", image.reference));
        if let Some(path) = non_empty(self.path.as_deref()) {
            line(out, &format!("\tExtracted path: {path}"));
        }

        if !cmd.env.is_empty() {
            line(
                out,
                "\tWith the following environment variables set for all commands:",
            );
            env_doc(out, &cmd.env, "\t\t");
        }
        if let Some(dir) = non_empty(cmd.dir.as_deref()) {
            line(out, &format!("\tWorking Directory: {dir}"));
        }

        line(out, "\tCommand(s):");
        for step in &cmd.steps {
            line(out, &format!("\t\t{}", step.command));
            if !step.env.is_empty() {
                line(
                    out,
                    "\t\t\tWith the following environment variables set for this command:",
                );
                env_doc(out, &step.env, "\t\t\t\t");
            }
        }

        if !cmd.mounts.is_empty() {
            line(out, "\tWith the following items mounted:");
            for mount in &cmd.mounts {
                line(out, &format!("\t\tDestination Path: {}", mount.dest));
                let sub = mount.spec.doc(name)?;
                indented(out, &sub, "\t\t\t");
            }
        }
        Ok(())
    }
}

fn build_doc(out: &mut String, build: &Build, name: &str) -> Result<(), ParseGitRefError> {
    line(out, "Generated from a docker build:");
    line(
        out,
        &format!(
            "\tDocker Build Target: {}",
            build.target.as_deref().unwrap_or_default(),
        ),
    );

    if let Some(source) = &build.source {
        let sub = source.doc(name)?;
        indented(out, &sub, "\t\t\t");
    }

    if !build.args.is_empty() {
        line(out, "\tBuild Args:");
        env_doc(out, &build.args, "\t\t");
    }

    match &build.dockerfile {
        Some(Dockerfile::Inline(text)) => {
            line(out, "\tDockerfile:");
            indented(out, text, "\t\t");
        }
        Some(Dockerfile::File(path)) => {
            line(out, &format!("\tDockerfile path in context: {path}"));
        }
        None => {
            line(
                out,
                &format!("\tDockerfile path in context: {}", Dockerfile::DEFAULT_PATH),
            );
        }
    }
    Ok(())
}

fn inline_doc(out: &mut String, inline: &Inline) {
    match inline {
        Inline::File(file) => {
            line(out, "\tFile:");
            inline_file_doc(out, file, "\t\t");
        }
        Inline::Dir(dir) => inline_dir_doc(out, dir),
    }
}

fn inline_file_doc(out: &mut String, file: &InlineFile, indent: &str) {
    line(out, &format!("{indent}Permissions: {:04o}", file.mode()));
    line(out, &format!("{indent}UID: {}", file.uid));
    line(out, &format!("{indent}GID: {}", file.gid));
}

fn inline_dir_doc(out: &mut String, dir: &InlineDir) {
    line(out, "\tDirectory:");
    line(out, &format!("\t\tPermissions: {:04o}", dir.mode()));
    line(out, &format!("\t\tUID: {}", dir.uid));
    line(out, &format!("\t\tGID: {}", dir.gid));
    if !dir.files.is_empty() {
        line(out, "\t\tFiles:");
        for name in dir.files.keys().sorted() {
            line(out, &format!("\t\t\t{name}"));
            inline_file_doc(out, &dir.files[name], "\t\t\t\t");
        }
    }
}

/// Append `k=v` lines for every entry, sorted by key.
fn env_doc(out: &mut String, env: &IndexMap<String, String>, indent: &str) {
    for key in env.keys().sorted() {
        line(out, &format!("{indent}{key}={}", env[key]));
    }
}

/// Append every line of `text` prefixed with `indent`.
fn indented(out: &mut String, text: &str, indent: &str) {
    for text_line in text.lines() {
        line(out, &format!("{indent}{text_line}"));
    }
}

fn line(out: &mut String, content: &str) {
    // writing to a String cannot fail
    let _ = writeln!(out, "{content}");
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use crate::source::{BuildStep, Command, Context, Http, SourceMount};

    use super::*;

    #[test]
    fn git() {
        let source = Source {
            path: Some("subdir".to_owned()),
            ..Source::from(Git {
                url: "https://example.com/repo.git".to_owned(),
                commit: "abc123".to_owned(),
                keep_git_dir: false,
            })
        };

        assert_eq!(
            source.doc("src").unwrap(),
            "Generated from a git repository:\n\
                \tRemote: https://example.com/repo.git\n\
                \tRef: abc123\n\
                \tExtracted path: subdir\n",
        );
    }

    #[test]
    fn git_invalid_url_err() {
        let source = Source::from(Git {
            url: "not-a-remote".to_owned(),
            commit: "abc".to_owned(),
            keep_git_dir: false,
        });

        assert!(source.doc("src").is_err());
    }

    #[test]
    fn http() {
        let source = Source::from(Http {
            url: "https://example.com/src.tar.gz".parse().unwrap(),
        });

        assert_eq!(
            source.doc("src").unwrap(),
            "Generated from a http(s) source:\n\tURL: https://example.com/src.tar.gz\n",
        );
    }

    #[test]
    fn context_is_unreproducible() {
        let source = Source::from(Context::default());
        assert_eq!(
            source.doc("src").unwrap(),
            "Generated from a local docker build context and is unreproducible.\n",
        );
    }

    #[test]
    fn image_with_commands_sorts_env() {
        let source = Source::from(Image {
            reference: "example.com/builder:latest".to_owned(),
            cmd: Some(Command {
                dir: Some("/build".to_owned()),
                env: IndexMap::from([
                    ("ZED".to_owned(), "z".to_owned()),
                    ("ALPHA".to_owned(), "a".to_owned()),
                ]),
                cache_dirs: IndexMap::new(),
                mounts: vec![SourceMount {
                    dest: "/input".to_owned(),
                    spec: Box::new(Source::from(Http {
                        url: "https://example.com/dep.tar.gz".parse().unwrap(),
                    })),
                }],
                steps: vec![BuildStep {
                    command: "make".to_owned(),
                    env: IndexMap::from([("B".to_owned(), "2".to_owned())]),
                }],
            }),
        });

        assert_eq!(
            source.doc("src").unwrap(),
            "Generated from running a command(s) in a docker image:\n\
                \tImage: example.com/builder:latest\n\
                \tWith the following environment variables set for all commands:\n\
                \t\tALPHA=a\n\
                \t\tZED=z\n\
                \tWorking Directory: /build\n\
                \tCommand(s):\n\
                \t\tmake\n\
                \t\t\tWith the following environment variables set for this command:\n\
                \t\t\t\tB=2\n\
                \tWith the following items mounted:\n\
                \t\tDestination Path: /input\n\
                \t\t\tGenerated from a http(s) source:\n\
                \t\t\t\tURL: https://example.com/dep.tar.gz\n",
        );
    }

    #[test]
    fn build_inline_dockerfile() {
        let source = Source::from(Build {
            source: Some(Box::new(Source::from(Context::default()))),
            dockerfile: Some(Dockerfile::Inline(
                "FROM busybox:latest\nRUN echo hello\n".to_owned(),
            )),
            target: Some("final".to_owned()),
            args: IndexMap::from([("B".to_owned(), "2".to_owned()), ("A".to_owned(), "1".to_owned())]),
        });

        assert_eq!(
            source.doc("src").unwrap(),
            "Generated from a docker build:\n\
                \tDocker Build Target: final\n\
                \t\t\tGenerated from a local docker build context and is unreproducible.\n\
                \tBuild Args:\n\
                \t\tA=1\n\
                \t\tB=2\n\
                \tDockerfile:\n\
                \t\tFROM busybox:latest\n\
                \t\tRUN echo hello\n",
        );
    }

    #[test]
    fn inline_dir_lists_files_sorted() {
        let source = Source::from(Inline::Dir(InlineDir {
            files: IndexMap::from([
                ("b.txt".to_owned(), InlineFile::new("b")),
                ("a.txt".to_owned(), InlineFile::new("a")),
            ]),
            ..InlineDir::default()
        }));

        assert_eq!(
            source.doc("src").unwrap(),
            "Generated from an inline source:\n\
                \tDirectory:\n\
                \t\tPermissions: 0755\n\
                \t\tUID: 0\n\
                \t\tGID: 0\n\
                \t\tFiles:\n\
                \t\t\ta.txt\n\
                \t\t\t\tPermissions: 0644\n\
                \t\t\t\tUID: 0\n\
                \t\t\t\tGID: 0\n\
                \t\t\tb.txt\n\
                \t\t\t\tPermissions: 0644\n\
                \t\t\t\tUID: 0\n\
                \t\t\t\tGID: 0\n",
        );
    }
}
