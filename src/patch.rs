//! Applies a recipe's patch lists to its resolved source states.

use indexmap::IndexMap;
use itertools::Itertools;
use thiserror::Error;

use crate::{
    llb::{Mount, State},
    PatchSpec, Recipe, SourceName,
};

/// Error returned when the map handed to [`patch_sources`] is missing the state of a
/// source a patch refers to.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no resolved state for source {0}")]
pub struct MissingStateError(pub SourceName);

/// Apply every patch list of `recipe` to its source's resolved state.
///
/// `worker` must be a state carrying a `patch` binary and a shell. `states` must map
/// every source of the recipe, patch-producing sources included, to its resolved
/// state; [`Recipe::resolve_sources`] produces such a map. The input map is never
/// modified, patched states are returned in a new map.
///
/// Sources are processed in sorted name order and each source's patches apply in
/// declaration order, so the returned graph is deterministic.
///
/// # Errors
///
/// Returns an error if a patched source or a patch's source has no entry in
/// `states`.
pub fn patch_sources(
    worker: &State,
    recipe: &Recipe,
    states: &IndexMap<SourceName, State>,
) -> Result<IndexMap<SourceName, State>, MissingStateError> {
    let mut patched = states.clone();

    for name in recipe.sources.keys().sorted() {
        let Some(patches) = recipe.patches.get(name) else {
            continue;
        };
        let state = patched
            .get(name)
            .cloned()
            .ok_or_else(|| MissingStateError(name.clone()))?;

        let state = patch_source(worker, state, &patched, patches)?;
        patched.insert(name.clone(), state);
    }

    Ok(patched)
}

/// Apply `patches` in order: each application mounts the patch read-only at `/patch`
/// and the current source state writable at `/src`; the post-exec contents of `/src`
/// become the input of the next application.
fn patch_source(
    worker: &State,
    mut source: State,
    states: &IndexMap<SourceName, State>,
    patches: &[PatchSpec],
) -> Result<State, MissingStateError> {
    for patch in patches {
        let patch_state = states
            .get(&patch.source)
            .ok_or_else(|| MissingStateError(patch.source.clone()))?;
        let strip = patch.strip.unwrap_or(PatchSpec::DEFAULT_STRIP);

        source = worker
            .clone()
            .dir("src")
            .run(["sh", "-c", &format!("patch -p{strip} < /patch")])
            .mount(
                Mount::new("/patch", patch_state)
                    .source_path(patch.source.as_str())
                    .readonly(),
            )
            .add_mount("/src", &source);
    }

    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llb::{pb, HttpSource, ImageSource};

    fn recipe_with_patches(patches: Vec<PatchSpec>) -> (Recipe, IndexMap<SourceName, State>) {
        let src = SourceName::new("src").unwrap();
        let fix = SourceName::new("fix").unwrap();

        let recipe = Recipe {
            name: "test".to_owned(),
            version: "0.1.0".to_owned(),
            sources: IndexMap::from([
                (
                    src.clone(),
                    crate::source::Git {
                        url: "https://example.com/repo.git".to_owned(),
                        commit: "abc".to_owned(),
                        keep_git_dir: false,
                    }
                    .into(),
                ),
                (
                    fix.clone(),
                    crate::source::Http {
                        url: "https://example.com/fix.patch".parse().unwrap(),
                    }
                    .into(),
                ),
            ]),
            patches: IndexMap::from([(src.clone(), patches)]),
        };

        let states = IndexMap::from([
            (src, ImageSource::new("example.com/src-stand-in").state()),
            (fix, HttpSource::new("https://example.com/fix.patch").filename("fix").state()),
        ]);

        (recipe, states)
    }

    fn patch_spec(source: &str, strip: Option<u32>) -> PatchSpec {
        PatchSpec {
            source: SourceName::new(source).unwrap(),
            strip,
        }
    }

    fn worker() -> State {
        ImageSource::new("example.com/worker:latest").state()
    }

    #[test]
    fn applies_patch_under_worker() {
        let (recipe, states) = recipe_with_patches(vec![patch_spec("fix", None)]);

        let patched = patch_sources(&worker(), &recipe, &states).unwrap();
        let ops = patched[&SourceName::new("src").unwrap()]
            .marshal()
            .ops()
            .unwrap();

        // worker, patch file, original source, exec, return
        assert_eq!(ops.len(), 5);

        let exec = ops[3].as_exec().unwrap();
        let meta = exec.meta.as_ref().unwrap();
        assert_eq!(meta.args, ["sh", "-c", "patch -p1 < /patch"]);
        assert_eq!(meta.cwd, "/src");

        let dests: Vec<&str> = exec.mounts.iter().map(|m| m.dest.as_str()).collect();
        assert_eq!(dests, ["/", "/patch", "/src"]);

        let patch_mount = &exec.mounts[1];
        assert!(patch_mount.readonly);
        assert_eq!(patch_mount.selector, "fix");
        assert_eq!(patch_mount.output, -1);

        let src_mount = &exec.mounts[2];
        assert!(!src_mount.readonly);
        assert_eq!(src_mount.output, 1);
    }

    #[test]
    fn patches_apply_in_declaration_order() {
        let (recipe, states) =
            recipe_with_patches(vec![patch_spec("fix", Some(0)), patch_spec("fix", Some(2))]);

        let patched = patch_sources(&worker(), &recipe, &states).unwrap();
        let ops = patched[&SourceName::new("src").unwrap()]
            .marshal()
            .ops()
            .unwrap();

        let commands: Vec<&str> = ops
            .iter()
            .filter_map(pb::Op::as_exec)
            .map(|exec| exec.meta.as_ref().unwrap().args[2].as_str())
            .collect();
        assert_eq!(commands, ["patch -p0 < /patch", "patch -p2 < /patch"]);

        // swapping the patches changes the graph
        let (recipe_swapped, _) =
            recipe_with_patches(vec![patch_spec("fix", Some(2)), patch_spec("fix", Some(0))]);
        let swapped = patch_sources(&worker(), &recipe_swapped, &states).unwrap();
        assert_ne!(
            patched[&SourceName::new("src").unwrap()].marshal(),
            swapped[&SourceName::new("src").unwrap()].marshal(),
        );
    }

    #[test]
    fn input_map_is_not_mutated() {
        let (recipe, states) = recipe_with_patches(vec![patch_spec("fix", None)]);
        let before: Vec<pb::Definition> =
            states.values().map(State::marshal).collect();

        let patched = patch_sources(&worker(), &recipe, &states).unwrap();

        let after: Vec<pb::Definition> = states.values().map(State::marshal).collect();
        assert_eq!(before, after);
        assert_ne!(
            states[&SourceName::new("src").unwrap()].marshal(),
            patched[&SourceName::new("src").unwrap()].marshal(),
        );
    }

    #[test]
    fn unpatched_sources_pass_through() {
        let (recipe, states) = recipe_with_patches(vec![patch_spec("fix", None)]);

        let patched = patch_sources(&worker(), &recipe, &states).unwrap();
        let fix = SourceName::new("fix").unwrap();
        assert_eq!(states[&fix].marshal(), patched[&fix].marshal());
    }

    #[test]
    fn missing_patch_source_err() {
        let (recipe, mut states) = recipe_with_patches(vec![patch_spec("fix", None)]);
        states.shift_remove(&SourceName::new("fix").unwrap());

        let result = patch_sources(&worker(), &recipe, &states);
        assert!(matches!(
            result,
            Err(MissingStateError(name)) if name.as_str() == "fix",
        ));
    }
}
