//! Provides the [`Inline`] source variant: file trees synthesized from the recipe
//! itself.

use std::fmt::{self, Formatter};

use indexmap::IndexMap;
use serde::{
    de::{self, MapAccess},
    ser::SerializeStruct,
    Deserialize, Deserializer, Serialize, Serializer,
};

/// Default mode of an [`InlineFile`].
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default mode of an [`InlineDir`].
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// File or directory tree synthesized from the recipe.
///
/// Represents either the `file` or `dir` fields, which conflict with each other. A
/// file resolves to `/<name>` where `<name>` is the source's name in the recipe; a
/// directory resolves to `/` with one entry per named file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    /// A single file.
    ///
    /// Represents the `file` field.
    File(InlineFile),

    /// A directory of files.
    ///
    /// Represents the `dir` field.
    Dir(InlineDir),
}

impl Inline {
    /// Struct name for (de)serializing.
    const NAME: &'static str = "Inline";

    /// Possible fields.
    const FIELDS: [&'static str; 2] = [Field::File.as_str(), Field::Dir.as_str()];

    /// Populate default permissions, recursively for directories.
    pub fn fill_defaults(&mut self) {
        match self {
            Self::File(file) => file.fill_defaults(),
            Self::Dir(dir) => dir.fill_defaults(),
        }
    }
}

/// A file synthesized from the recipe.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct InlineFile {
    /// File contents.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub contents: String,

    /// Owning user id.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub uid: u32,

    /// Owning group id.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub gid: u32,

    /// File mode bits; defaults to `0o644`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<u32>,
}

impl InlineFile {
    /// Create an [`InlineFile`] from its contents.
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            contents: contents.into(),
            ..Self::default()
        }
    }

    /// The file mode, defaulted.
    #[must_use]
    pub fn mode(&self) -> u32 {
        self.permissions.unwrap_or(DEFAULT_FILE_MODE)
    }

    /// Populate the default mode.
    pub fn fill_defaults(&mut self) {
        self.permissions.get_or_insert(DEFAULT_FILE_MODE);
    }
}

/// A directory of [`InlineFile`]s synthesized from the recipe.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, Eq)]
pub struct InlineDir {
    /// Owning user id.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub uid: u32,

    /// Owning group id.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub gid: u32,

    /// Directory mode bits; defaults to `0o755`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<u32>,

    /// Files of the directory, keyed by file name. Emitted in sorted key order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub files: IndexMap<String, InlineFile>,
}

impl InlineDir {
    /// The directory mode, defaulted.
    #[must_use]
    pub fn mode(&self) -> u32 {
        self.permissions.unwrap_or(DEFAULT_DIR_MODE)
    }

    /// Populate default modes, including for each file.
    pub fn fill_defaults(&mut self) {
        self.permissions.get_or_insert(DEFAULT_DIR_MODE);
        for file in self.files.values_mut() {
            file.fill_defaults();
        }
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(id: &u32) -> bool {
    *id == 0
}

impl Serialize for Inline {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct(Self::NAME, 1)?;

        let key = Field::from(self).as_str();
        match self {
            Self::File(file) => state.serialize_field(key, file)?,
            Self::Dir(dir) => state.serialize_field(key, dir)?,
        }

        state.end()
    }
}

impl<'de> Deserialize<'de> for Inline {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_struct(Self::NAME, &Self::FIELDS, Visitor)
    }
}

/// Possible [`Inline`] fields.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(field_identifier, rename_all = "lowercase")]
enum Field {
    File,
    Dir,
}

impl Field {
    /// Field identifier as a static string slice.
    const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Dir => "dir",
        }
    }
}

impl From<&Inline> for Field {
    fn from(value: &Inline) -> Self {
        match value {
            Inline::File(_) => Self::File,
            Inline::Dir(_) => Self::Dir,
        }
    }
}

/// [`de::Visitor`] for deserializing [`Inline`].
struct Visitor;

impl<'de> de::Visitor<'de> for Visitor {
    type Value = Inline;

    fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.write_str("`file` or `dir`")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut field = None;
        while let Some(key) = map.next_key()? {
            if field.is_some() {
                return Err(de::Error::custom(
                    "only one of `file` or `dir` can be specified",
                ));
            }
            match key {
                Field::File => field = Some(Inline::File(map.next_value()?)),
                Field::Dir => field = Some(Inline::Dir(map.next_value()?)),
            }
        }

        field.ok_or_else(|| de::Error::custom("missing field `file` or `dir`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deserialize(source: &str) -> serde_yaml::Result<Inline> {
        serde_yaml::from_str(source)
    }

    #[test]
    fn file() {
        let inline = deserialize("file:\n  contents: hello\n  uid: 1000\n").unwrap();
        let Inline::File(file) = inline else {
            panic!("expected a file");
        };

        assert_eq!(file.contents, "hello");
        assert_eq!(file.uid, 1000);
        assert_eq!(file.gid, 0);
        assert_eq!(file.mode(), DEFAULT_FILE_MODE);
    }

    #[test]
    fn dir() {
        let inline = deserialize(
            "dir:\n  permissions: 0o700\n  files:\n    main.c:\n      contents: int main;\n",
        )
        .unwrap();
        let Inline::Dir(dir) = inline else {
            panic!("expected a dir");
        };

        assert_eq!(dir.mode(), 0o700);
        assert_eq!(dir.files.len(), 1);
    }

    #[test]
    fn both_err() {
        assert!(deserialize("file: {}\ndir: {}\n").is_err());
    }

    #[test]
    fn neither_err() {
        assert!(deserialize("{}").is_err());
    }

    #[test]
    fn fill_defaults() {
        let mut dir = InlineDir {
            files: IndexMap::from([("a".to_owned(), InlineFile::default())]),
            ..InlineDir::default()
        };
        dir.fill_defaults();

        assert_eq!(dir.permissions, Some(DEFAULT_DIR_MODE));
        assert_eq!(dir.files["a"].permissions, Some(DEFAULT_FILE_MODE));
    }
}
