//! Types for (de)serializing package build [`Recipe`]s and lowering their sources
//! into BuildKit LLB.
//!
//! A recipe declares named [`Source`]s (where input bits come from), patches to apply
//! to them, and build metadata. [`resolve_source`] lowers one source into an
//! [`llb::State`], an immutable handle to a graph of image pulls, git fetches, HTTP
//! downloads, local contexts, synthesized files, nested builds, and command
//! executions; [`llb::State::marshal`] serializes that graph into the wire format a
//! BuildKit daemon executes. [`patch_sources`] applies a recipe's patch lists on top
//! of the resolved states.
//!
//! The types are validated while they are deserialized where possible: source names
//! reject path separators, a source must carry exactly one variant, and exclusive
//! field pairs (a build's `file`/`inline`, an inline source's `file`/`dir`) are
//! enforced during deserialization. Deserialize only from self-describing formats
//! like YAML or JSON; several types flatten fields in ways that require it.
//!
//! Everything here is purely functional: resolution performs no I/O of its own and
//! the same input always marshals to byte-identical output. Fetching, caching, and
//! execution belong to the BuildKit daemon; dockerfile lowering and local context
//! handling are injected through [`SourceOpts`].

mod doc;
pub mod llb;
mod name;
mod patch;
mod resolve;
pub mod source;

use ::serde::{Deserialize, Serialize};
use indexmap::IndexMap;

pub use self::{
    name::{InvalidSourceNameError, SourceName},
    patch::{patch_sources, MissingStateError},
    resolve::{
        resolve_source, Forward, LocalOptions, ResolveContext, ResolveError, SourceOpts,
    },
    source::{Build, Context, Git, Http, Image, Inline, Source, SourceVariant},
};

/// A declarative package build recipe.
///
/// Only the parts source resolution consumes are modeled here; build steps,
/// artifacts, and per-distro target customization are consumed by the package
/// backends layered on top of this crate.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Recipe {
    /// Package name.
    pub name: String,

    /// Package version.
    pub version: String,

    /// The named inputs of the build.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub sources: IndexMap<SourceName, Source>,

    /// Patches applied to resolved sources, keyed by the source they modify.
    ///
    /// Each [`PatchSpec`] names another entry of [`sources`](Self::sources) which
    /// produces the patch file.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub patches: IndexMap<SourceName, Vec<PatchSpec>>,
}

impl Recipe {
    /// Populate defaulted fields of every source and patch.
    ///
    /// Resolution applies the same fallbacks, so calling this is not required for
    /// lowering; it is useful when the filled form should be serialized back out.
    pub fn fill_defaults(&mut self) {
        for source in self.sources.values_mut() {
            source.fill_defaults();
        }
        for patches in self.patches.values_mut() {
            for patch in patches {
                patch.strip.get_or_insert(PatchSpec::DEFAULT_STRIP);
            }
        }
    }
}

/// One patch application.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PatchSpec {
    /// Name of the source which produces the patch file.
    pub source: SourceName,

    /// Strip count handed to `patch -p<n>`; defaults to 1, matching git-formatted
    /// patches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip: Option<u32>,
}

impl PatchSpec {
    /// Strip count used when none is set.
    pub const DEFAULT_STRIP: u32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPE: &str = "\
name: demo
version: 1.2.3
sources:
  src:
    git:
      url: https://example.com/repo.git
      commit: abc123
    path: subdir
  fix:
    http:
      url: https://example.com/fix.patch
  files:
    inline:
      dir:
        files:
          main.c:
            contents: int main() {}
patches:
  src:
    - source: fix
";

    #[test]
    fn recipe_round_trip() {
        let recipe: Recipe = serde_yaml::from_str(RECIPE).unwrap();

        assert_eq!(recipe.name, "demo");
        assert_eq!(recipe.version, "1.2.3");
        assert_eq!(recipe.sources.len(), 3);
        assert_eq!(
            recipe.patches[&SourceName::new("src").unwrap()],
            [PatchSpec {
                source: SourceName::new("fix").unwrap(),
                strip: None,
            }],
        );

        let yaml = serde_yaml::to_string(&recipe).unwrap();
        let reparsed: Recipe = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(reparsed, recipe);
    }

    #[test]
    fn source_names_are_validated() {
        let invalid = RECIPE.replace("  src:", "  bad/name:");
        assert!(serde_yaml::from_str::<Recipe>(&invalid).is_err());
    }

    #[test]
    fn fill_defaults_sets_patch_strip() {
        let mut recipe: Recipe = serde_yaml::from_str(RECIPE).unwrap();
        recipe.fill_defaults();

        assert_eq!(
            recipe.patches[&SourceName::new("src").unwrap()][0].strip,
            Some(PatchSpec::DEFAULT_STRIP),
        );
    }
}
