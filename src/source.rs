//! Provides [`Source`], the declarative description of one named input of a
//! [`Recipe`](crate::Recipe), and its [`SourceVariant`]s.

pub mod build;
pub mod context;
pub mod git;
pub mod http;
pub mod image;
pub mod inline;

use std::fmt::{self, Display, Formatter};

use serde::{de, Deserialize, Serialize};

pub use self::{
    build::{Build, Dockerfile},
    context::Context,
    git::{Git, GitProtocol, GitRef, ParseGitRefError},
    http::Http,
    image::{BuildStep, CacheDir, CacheSharing, Command, Image, SourceMount},
    inline::{Inline, InlineDir, InlineFile},
};

/// Where the contents of one named input of a [`Recipe`](crate::Recipe) come from.
///
/// A source is one [`SourceVariant`], (de)serialized from/to a sibling key of the
/// common fields, plus an optional subpath to extract and optional include/exclude
/// glob filters which apply to every variant.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Source {
    /// The kind of source, represented as one of the `image`, `git`, `http`,
    /// `context`, `build`, or `inline` keys. Exactly one must be set.
    #[serde(flatten, with = "variant")]
    pub variant: SourceVariant,

    /// Subpath to extract from the resolved contents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Glob patterns selecting the files to keep.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,

    /// Glob patterns selecting files to drop.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
}

impl Source {
    /// Whether the resolved contents of this source form a directory tree.
    ///
    /// All variants resolve to directories except [`Http`] and [`Inline`] files,
    /// which resolve to a single file named after the source.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        match &self.variant {
            SourceVariant::Image(_)
            | SourceVariant::Git(_)
            | SourceVariant::Context(_)
            | SourceVariant::Build(_) => true,
            SourceVariant::Http(_) => false,
            SourceVariant::Inline(inline) => matches!(inline, Inline::Dir(_)),
        }
    }

    /// Populate defaulted fields: empty subpaths are normalized away, inline files and
    /// directories receive their default permissions, and nested sources are filled
    /// recursively.
    ///
    /// Resolution applies the same fallbacks, so calling this is not required for
    /// lowering; it is useful when the filled form should be serialized back out.
    pub fn fill_defaults(&mut self) {
        if self.path.as_deref() == Some("") {
            self.path = None;
        }

        match &mut self.variant {
            SourceVariant::Image(image) => {
                if let Some(cmd) = &mut image.cmd {
                    for mount in &mut cmd.mounts {
                        mount.spec.fill_defaults();
                    }
                }
            }
            SourceVariant::Context(context) => context.fill_defaults(),
            SourceVariant::Build(build) => {
                if let Some(source) = &mut build.source {
                    source.fill_defaults();
                }
            }
            SourceVariant::Inline(inline) => inline.fill_defaults(),
            SourceVariant::Git(_) | SourceVariant::Http(_) => {}
        }
    }
}

impl From<SourceVariant> for Source {
    fn from(variant: SourceVariant) -> Self {
        Self {
            variant,
            path: None,
            includes: Vec::new(),
            excludes: Vec::new(),
        }
    }
}

impl From<Image> for Source {
    fn from(value: Image) -> Self {
        SourceVariant::from(value).into()
    }
}

impl From<Git> for Source {
    fn from(value: Git) -> Self {
        SourceVariant::from(value).into()
    }
}

impl From<Http> for Source {
    fn from(value: Http) -> Self {
        SourceVariant::from(value).into()
    }
}

impl From<Context> for Source {
    fn from(value: Context) -> Self {
        SourceVariant::from(value).into()
    }
}

impl From<Build> for Source {
    fn from(value: Build) -> Self {
        SourceVariant::from(value).into()
    }
}

impl From<Inline> for Source {
    fn from(value: Inline) -> Self {
        SourceVariant::from(value).into()
    }
}

/// The tagged variants of a [`Source`].
///
/// (De)serializes from/to a struct with exactly one of the `image`, `git`, `http`,
/// `context`, `build`, or `inline` fields, which is flattened into [`Source`].
#[derive(Debug, Clone, PartialEq)]
pub enum SourceVariant {
    /// Container image, optionally post-processed by running commands in it.
    Image(Image),

    /// Git repository at a specific commit.
    Git(Git),

    /// Single file fetched over HTTP(S).
    Http(Http),

    /// Host-side build context provided by the caller.
    Context(Context),

    /// Sub-build whose output becomes the source contents.
    Build(Build),

    /// File or directory tree synthesized from the recipe itself.
    Inline(Inline),
}

impl SourceVariant {
    /// Struct name for (de)serializing.
    const NAME: &'static str = "SourceVariant";

    /// Possible fields.
    const FIELDS: [&'static str; 6] = [
        Field::Image.as_str(),
        Field::Git.as_str(),
        Field::Http.as_str(),
        Field::Context.as_str(),
        Field::Build.as_str(),
        Field::Inline.as_str(),
    ];

    /// Variant key as a static string slice, i.e. the field the variant (de)serializes
    /// from/to.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        Field::from_variant(self).as_str()
    }
}

impl From<Image> for SourceVariant {
    fn from(value: Image) -> Self {
        Self::Image(value)
    }
}

impl From<Git> for SourceVariant {
    fn from(value: Git) -> Self {
        Self::Git(value)
    }
}

impl From<Http> for SourceVariant {
    fn from(value: Http) -> Self {
        Self::Http(value)
    }
}

impl From<Context> for SourceVariant {
    fn from(value: Context) -> Self {
        Self::Context(value)
    }
}

impl From<Build> for SourceVariant {
    fn from(value: Build) -> Self {
        Self::Build(value)
    }
}

impl From<Inline> for SourceVariant {
    fn from(value: Inline) -> Self {
        Self::Inline(value)
    }
}

impl Serialize for SourceVariant {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct(Self::NAME, 1)?;

        let key = Field::from_variant(self).as_str();
        match self {
            Self::Image(image) => state.serialize_field(key, image)?,
            Self::Git(git) => state.serialize_field(key, git)?,
            Self::Http(http) => state.serialize_field(key, http)?,
            Self::Context(context) => state.serialize_field(key, context)?,
            Self::Build(build) => state.serialize_field(key, build)?,
            Self::Inline(inline) => state.serialize_field(key, inline)?,
        }

        state.end()
    }
}

impl<'de> Deserialize<'de> for SourceVariant {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_struct(Self::NAME, &Self::FIELDS, Visitor)
    }
}

/// (De)serialize [`SourceVariant`], for use in `#[serde(flatten, with = "variant")]`.
///
/// Deserialization returns an error if no variant field is present, if more than one
/// variant field is present, or if a field is repeated.
mod variant {
    use serde::{Deserializer, Serialize, Serializer};

    use super::{SourceVariant, Visitor};

    /// Serialize [`SourceVariant`] as its single variant field.
    ///
    /// # Errors
    ///
    /// Returns an error if the `serializer` does while serializing.
    pub(super) fn serialize<S: Serializer>(
        value: &SourceVariant,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    /// Deserialize [`SourceVariant`] from a map with exactly one variant field.
    ///
    /// # Errors
    ///
    /// Returns an error if the `deserializer` does, if there is an error deserializing
    /// a variant's value, if no variant field or more than one variant field is
    /// present, or if a field is repeated.
    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<SourceVariant, D::Error> {
        deserializer.deserialize_struct(SourceVariant::NAME, &SourceVariant::FIELDS, Visitor)
    }
}

/// [`de::Visitor`](serde::de::Visitor) for deserializing [`SourceVariant`].
struct Visitor;

impl<'de> de::Visitor<'de> for Visitor {
    type Value = SourceVariant;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str(
            "a source variant, one of `image`, `git`, `http`, `context`, `build`, or `inline`",
        )
    }

    fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut variant = None;
        while let Some(key) = map.next_key()? {
            check_conflict(&variant, key)?;
            variant = Some(match key {
                Field::Image => SourceVariant::Image(map.next_value()?),
                Field::Git => SourceVariant::Git(map.next_value()?),
                Field::Http => SourceVariant::Http(map.next_value()?),
                Field::Context => SourceVariant::Context(map.next_value()?),
                Field::Build => SourceVariant::Build(map.next_value()?),
                Field::Inline => SourceVariant::Inline(map.next_value()?),
            });
        }

        variant.ok_or_else(|| {
            de::Error::custom(
                "no source variant found, one of `image`, `git`, `http`, `context`, \
                    `build`, or `inline` must be set",
            )
        })
    }
}

/// Check if `variant` is occupied and return [`Err`] naming both keys if so.
fn check_conflict<E: de::Error>(variant: &Option<SourceVariant>, next: Field) -> Result<(), E> {
    if let Some(variant) = variant {
        Err(E::custom(format_args!(
            "source variants `{}` and `{}` conflict, exactly one may be set",
            Field::from_variant(variant),
            next,
        )))
    } else {
        Ok(())
    }
}

/// Possible [`SourceVariant`] fields.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(field_identifier, rename_all = "lowercase")]
enum Field {
    Image,
    Git,
    Http,
    Context,
    Build,
    Inline,
}

impl Field {
    /// Field identifier as a static string slice.
    const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Git => "git",
            Self::Http => "http",
            Self::Context => "context",
            Self::Build => "build",
            Self::Inline => "inline",
        }
    }

    /// Field a [`SourceVariant`] (de)serializes from/to.
    const fn from_variant(variant: &SourceVariant) -> Self {
        match variant {
            SourceVariant::Image(_) => Self::Image,
            SourceVariant::Git(_) => Self::Git,
            SourceVariant::Http(_) => Self::Http,
            SourceVariant::Context(_) => Self::Context,
            SourceVariant::Build(_) => Self::Build,
            SourceVariant::Inline(_) => Self::Inline,
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deserialize(source: &str) -> serde_yaml::Result<Source> {
        serde_yaml::from_str(source)
    }

    #[test]
    fn git() {
        let source = deserialize(
            "git:\n  url: https://example.com/repo.git\n  commit: abc123\npath: sub\n",
        )
        .unwrap();

        assert_eq!(
            source.variant,
            SourceVariant::Git(Git {
                url: "https://example.com/repo.git".to_owned(),
                commit: "abc123".to_owned(),
                keep_git_dir: false,
            }),
        );
        assert_eq!(source.path.as_deref(), Some("sub"));
    }

    #[test]
    fn filters() {
        let source = deserialize(
            "http:\n  url: https://example.com/src.tar.gz\nincludes: [foo]\nexcludes: [bar]\n",
        )
        .unwrap();

        assert_eq!(source.includes, ["foo"]);
        assert_eq!(source.excludes, ["bar"]);
    }

    #[test]
    fn no_variant_err() {
        assert!(deserialize("path: sub\n").is_err());
    }

    #[test]
    fn multiple_variants_err() {
        let err = deserialize(
            "git:\n  url: https://example.com/repo.git\n  commit: abc\n\
                http:\n  url: https://example.com/src.tar.gz\n",
        )
        .unwrap_err();

        assert!(err.to_string().contains("conflict"), "{err}");
    }

    #[test]
    fn round_trip() {
        let source = Source {
            path: Some("subdir".to_owned()),
            includes: vec!["*.c".to_owned()],
            ..Source::from(Git {
                url: "https://example.com/repo.git".to_owned(),
                commit: "abc123".to_owned(),
                keep_git_dir: true,
            })
        };

        let yaml = serde_yaml::to_string(&source).unwrap();
        assert_eq!(deserialize(&yaml).unwrap(), source);
    }

    #[test]
    fn is_dir() {
        let git = Source::from(Git {
            url: "https://example.com/repo.git".to_owned(),
            commit: "abc".to_owned(),
            keep_git_dir: false,
        });
        assert!(git.is_dir());

        let http = Source::from(Http {
            url: "https://example.com/src.tar.gz".parse().unwrap(),
        });
        assert!(!http.is_dir());

        let file = Source::from(Inline::File(InlineFile::default()));
        assert!(!file.is_dir());

        let dir = Source::from(Inline::Dir(InlineDir::default()));
        assert!(dir.is_dir());
    }

    #[test]
    fn fill_defaults_normalizes_empty_path() {
        let mut source = Source {
            path: Some(String::new()),
            ..Source::from(Context::default())
        };
        source.fill_defaults();

        assert_eq!(source.path, None);
        assert_eq!(
            source.variant,
            SourceVariant::Context(Context {
                name: Some(Context::DEFAULT_NAME.to_owned()),
            }),
        );
    }
}
