//! Provides the [`Build`] source variant: a sub-build whose output becomes the source
//! contents.

use std::fmt::{self, Display, Formatter};

use indexmap::IndexMap;
use serde::{
    de::{self, MapAccess},
    ser::SerializeStruct,
    Deserialize, Deserializer, Serialize, Serializer,
};

use super::Source;

/// Sub-build source.
///
/// `source` is the build context; the dockerfile comes either from a path inside that
/// context or from inline text. An absent context with an inline dockerfile means the
/// dockerfile is the entire input.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Build {
    /// Build context; may be any source variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Box<Source>>,

    /// Where the dockerfile comes from.
    ///
    /// Represents either the `file` or `inline` fields, which conflict with each
    /// other.
    ///
    /// This is (de)serialized by flattening [`Dockerfile`]. When deserializing, if
    /// neither the `file` nor `inline` fields are present, this is [`None`]. If both
    /// fields are present, or either is repeated, then an error is returned.
    #[serde(flatten, with = "dockerfile_option")]
    pub dockerfile: Option<Dockerfile>,

    /// Target stage to build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Build arguments.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub args: IndexMap<String, String>,
}

/// Represents either the `file` or `inline` fields of a [`Build`] source.
///
/// These fields conflict with each other so they are represented as an enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dockerfile {
    /// Path of the dockerfile inside the build context.
    ///
    /// Represents the `file` field.
    File(String),

    /// Dockerfile content as inline text.
    ///
    /// Represents the `inline` field.
    Inline(String),
}

impl Dockerfile {
    /// Struct name for (de)serializing.
    const NAME: &'static str = "Dockerfile";

    /// Possible fields.
    const FIELDS: [&'static str; 2] = [Field::File.as_str(), Field::Inline.as_str()];

    /// Path used when no dockerfile is specified.
    pub const DEFAULT_PATH: &'static str = "Dockerfile";
}

impl Serialize for Dockerfile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct(Self::NAME, 1)?;

        let key = Field::from(self).as_str();
        match self {
            Self::File(path) => state.serialize_field(key, path)?,
            Self::Inline(text) => state.serialize_field(key, text)?,
        }

        state.end()
    }
}

impl<'de> Deserialize<'de> for Dockerfile {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_struct(Self::NAME, &Self::FIELDS, Visitor)
    }
}

/// (De)serialize `Option<Dockerfile>`, for use in
/// `#[serde(flatten, with = "dockerfile_option")]`.
mod dockerfile_option {
    use serde::{Deserializer, Serialize, Serializer};

    use super::{Dockerfile, OptionVisitor};

    /// Serialize `Option<Dockerfile>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `serializer` does while serializing.
    pub(super) fn serialize<S: Serializer>(
        value: &Option<Dockerfile>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.serialize(serializer)
    }

    /// Deserialize `Option<Dockerfile>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the `deserializer` does, if there is an error deserializing
    /// either field value, if both fields are present, or if either field is repeated.
    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Dockerfile>, D::Error> {
        deserializer.deserialize_struct(Dockerfile::NAME, &Dockerfile::FIELDS, OptionVisitor)
    }
}

/// Possible [`Dockerfile`] fields.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(field_identifier, rename_all = "lowercase")]
enum Field {
    File,
    Inline,
}

impl Field {
    /// Field identifier as a static string slice.
    const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Inline => "inline",
        }
    }
}

impl From<&Dockerfile> for Field {
    fn from(value: &Dockerfile) -> Self {
        match value {
            Dockerfile::File(_) => Self::File,
            Dockerfile::Inline(_) => Self::Inline,
        }
    }
}

impl Display for Field {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// [`de::Visitor`] for deserializing [`Dockerfile`].
struct Visitor;

impl<'de> de::Visitor<'de> for Visitor {
    type Value = Dockerfile;

    fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
        OptionVisitor.expecting(formatter)
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        OptionVisitor
            .visit_map(map)?
            .ok_or_else(|| de::Error::custom("missing field `file` or `inline`"))
    }
}

/// [`de::Visitor`] for deserializing `Option<Dockerfile>`.
struct OptionVisitor;

impl<'de> de::Visitor<'de> for OptionVisitor {
    type Value = Option<Dockerfile>;

    fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.write_str("`file` or `inline`")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut field = None;
        while let Some(key) = map.next_key()? {
            if field.is_some() {
                return Err(de::Error::custom(
                    "only one of `file` or `inline` can be specified",
                ));
            }
            match key {
                Field::File => field = Some(Dockerfile::File(map.next_value()?)),
                Field::Inline => field = Some(Dockerfile::Inline(map.next_value()?)),
            }
        }

        Ok(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deserialize(source: &str) -> serde_yaml::Result<Build> {
        serde_yaml::from_str(source)
    }

    #[test]
    fn inline() {
        let build = deserialize("inline: |\n  FROM busybox:latest\n  RUN echo hello\n").unwrap();
        assert_eq!(
            build.dockerfile,
            Some(Dockerfile::Inline(
                "FROM busybox:latest\nRUN echo hello\n".to_owned(),
            )),
        );
        assert_eq!(build.source, None);
    }

    #[test]
    fn file() {
        let build = deserialize(
            "source:\n  context: {}\nfile: docker/Dockerfile\ntarget: final\nargs:\n  A: b\n",
        )
        .unwrap();

        assert_eq!(
            build.dockerfile,
            Some(Dockerfile::File("docker/Dockerfile".to_owned())),
        );
        assert_eq!(build.target.as_deref(), Some("final"));
        assert_eq!(build.args.get("A").map(String::as_str), Some("b"));
        assert!(build.source.is_some());
    }

    #[test]
    fn neither_is_none() {
        let build = deserialize("target: final\n").unwrap();
        assert_eq!(build.dockerfile, None);
    }

    #[test]
    fn both_err() {
        assert!(deserialize("file: Dockerfile\ninline: FROM scratch\n").is_err());
    }
}
