//! Lowers a [`Source`] into an LLB [`State`]: variant dispatch, the filter planner,
//! and the command composer for image sources.

use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::{
    llb::{
        BoxError, CacheSharingMode, Copy, Exec, GitSource, HttpSource, ImageSource, MetaResolver,
        Mkdir, Mkfile, Mount, State,
    },
    source::{
        CacheSharing, Command, Dockerfile, GitRef, Image, Inline, InlineDir, InlineFile,
        ParseGitRefError, Source, SourceVariant,
    },
    Build, Recipe, SourceName,
};

/// Lowers a dockerfile-style build into LLB.
///
/// Implementations reject builds whose dockerfile cannot be determined; with
/// [`Dockerfile`] being an exclusive pair, a conflicting file/inline combination is
/// already unrepresentable.
pub trait Forward {
    /// Lower `build` with `context` as its build context.
    ///
    /// # Errors
    ///
    /// Returns an error if the build cannot be lowered.
    fn forward(&self, context: State, build: &Build) -> Result<State, BoxError>;
}

impl<F> Forward for F
where
    F: Fn(State, &Build) -> Result<State, BoxError>,
{
    fn forward(&self, context: State, build: &Build) -> Result<State, BoxError> {
        self(context, build)
    }
}

/// Resolves a named host-side build context into a local source state.
///
/// Implementations own client-side concerns like dockerignore handling and fold the
/// given [`LocalOptions`] into the local source op they produce.
pub trait ResolveContext {
    /// Resolve the context named `name`, or `None` if no such context exists.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution itself fails.
    fn resolve_context(&self, name: &str, options: &LocalOptions)
        -> Result<Option<State>, BoxError>;
}

impl<F> ResolveContext for F
where
    F: Fn(&str, &LocalOptions) -> Result<Option<State>, BoxError>,
{
    fn resolve_context(
        &self,
        name: &str,
        options: &LocalOptions,
    ) -> Result<Option<State>, BoxError> {
        self(name, options)
    }
}

/// Filters a [`ResolveContext`] implementation folds into the local source op.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LocalOptions {
    /// Glob patterns selecting the files to transfer.
    pub include_patterns: Vec<String>,

    /// Glob patterns selecting files to skip.
    pub exclude_patterns: Vec<String>,
}

/// Injected capabilities source resolution depends on.
///
/// Only the capabilities a recipe's sources actually use need to be present:
/// resolving a `build` source without [`forward`](Self::forward) or a `context`
/// source without [`get_context`](Self::get_context) is an error.
#[derive(Default)]
pub struct SourceOpts<'a> {
    /// Attached to image source ops for consumers that inspect image configs.
    pub resolver: Option<Arc<dyn MetaResolver>>,

    /// Lowers `build` sources.
    pub forward: Option<&'a dyn Forward>,

    /// Resolves `context` sources.
    pub get_context: Option<&'a dyn ResolveContext>,
}

/// Error returned when resolving a [`Source`].
#[derive(Error, Debug)]
pub enum ResolveError {
    /// A per-source failure, wrapped with the source's name for diagnostics.
    #[error("invalid source {name}: {error}")]
    InvalidSource {
        /// Name of the failing source.
        name: SourceName,
        /// The underlying failure.
        #[source]
        error: Box<ResolveError>,
    },

    /// A `build` source has no context and no inline dockerfile to stand in for one.
    #[error("no source variant found")]
    NoSourceVariant,

    /// An image source has a command pipeline with no steps.
    #[error("no steps defined for image source")]
    NoSteps,

    /// A git source's URL could not be parsed.
    #[error("could not parse git ref: {0}")]
    GitRef(#[from] ParseGitRefError),

    /// The context resolver had no context under the requested name.
    #[error("context {0:?} not found")]
    ContextNotFound(String),

    /// A `build` source was resolved without a [`Forward`] capability.
    #[error("build source requires a forward capability")]
    MissingForward,

    /// A `context` source was resolved without a [`ResolveContext`] capability.
    #[error("context source requires a context resolver capability")]
    MissingContextResolver,

    /// The [`Forward`] capability failed.
    #[error("could not forward build: {0}")]
    Forward(#[source] BoxError),

    /// The [`ResolveContext`] capability failed.
    #[error("could not resolve context: {0}")]
    Context(#[source] BoxError),
}

/// Lower `source` into an LLB state.
///
/// `name` is the source's name in the enclosing recipe; it names the downloaded file
/// of HTTP sources and the synthesized file of inline file sources.
///
/// # Errors
///
/// Any failure is wrapped as [`ResolveError::InvalidSource`] carrying `name`.
pub fn resolve_source(
    source: &Source,
    name: &SourceName,
    opts: &SourceOpts,
) -> Result<State, ResolveError> {
    resolve(source, name.as_str(), false, opts).map_err(|error| ResolveError::InvalidSource {
        name: name.clone(),
        error: Box::new(error),
    })
}

impl Recipe {
    /// Resolve every source of the recipe, in declaration order.
    ///
    /// The returned map is suitable as input to
    /// [`patch_sources`](crate::patch_sources).
    ///
    /// # Errors
    ///
    /// Returns the first failing source's error.
    pub fn resolve_sources(
        &self,
        opts: &SourceOpts,
    ) -> Result<IndexMap<SourceName, State>, ResolveError> {
        self.sources
            .iter()
            .map(|(name, source)| Ok((name.clone(), resolve_source(source, name, opts)?)))
            .collect()
    }
}

/// Flags a variant sets when it absorbs a filtering concern itself, read by the
/// filter planner afterwards.
#[derive(Default)]
struct Handled {
    path: bool,
    include_exclude: bool,
}

fn resolve(
    source: &Source,
    name: &str,
    for_mount: bool,
    opts: &SourceOpts,
) -> Result<State, ResolveError> {
    let mut handled = Handled::default();
    let state = lower_variant(source, name, for_mount, opts, &mut handled)?;
    Ok(apply_filters(state, source, for_mount, &handled))
}

/// Paths that select the whole source, making a subpath copy unnecessary.
fn is_root_path(path: &str) -> bool {
    matches!(path, "" | "/" | ".")
}

fn needs_filter(source: &Source, for_mount: bool, handled: &Handled) -> bool {
    if !is_root_path(source.path.as_deref().unwrap_or("")) && !for_mount && !handled.path {
        return true;
    }
    if handled.include_exclude {
        return false;
    }
    !source.includes.is_empty() || !source.excludes.is_empty()
}

/// The filter planner: append the single copy op realizing subpath selection and
/// include/exclude filtering, unless the variant absorbed those concerns or nothing
/// needs filtering.
fn apply_filters(state: State, source: &Source, for_mount: bool, handled: &Handled) -> State {
    if !needs_filter(source, for_mount, handled) {
        return state;
    }

    let src_path = if handled.path {
        "/"
    } else {
        source.path.as_deref().unwrap_or("/")
    };

    State::scratch().file(
        Copy::new(&state, src_path, "/")
            .dir_contents_only()
            .include_patterns(source.includes.clone())
            .exclude_patterns(source.excludes.clone()),
    )
}

fn lower_variant(
    source: &Source,
    name: &str,
    for_mount: bool,
    opts: &SourceOpts,
    handled: &mut Handled,
) -> Result<State, ResolveError> {
    match &source.variant {
        SourceVariant::Image(image) => {
            let state = image_state(image, opts);
            match &image.cmd {
                None => Ok(state),
                Some(cmd) => {
                    let subpath = source.path.as_deref().unwrap_or("");
                    let state = command_state(state, cmd, name, subpath, opts)?;
                    handled.path = true;
                    Ok(state)
                }
            }
        }
        SourceVariant::Git(git) => {
            let git_ref = GitRef::parse(&git.url)?;
            let mut git_source = GitSource::new(git_ref.remote, &git.commit);
            if git.keep_git_dir {
                git_source = git_source.keep_git_dir();
            }
            Ok(git_source.state())
        }
        SourceVariant::Http(http) => Ok(HttpSource::new(http.url.as_str())
            .filename(name)
            .state()),
        SourceVariant::Context(context) => {
            let resolver = opts
                .get_context
                .ok_or(ResolveError::MissingContextResolver)?;
            let options = LocalOptions {
                include_patterns: source.includes.clone(),
                exclude_patterns: source.excludes.clone(),
            };
            let state = resolver
                .resolve_context(context.name(), &options)
                .map_err(ResolveError::Context)?
                .ok_or_else(|| ResolveError::ContextNotFound(name.to_owned()))?;

            handled.include_exclude = true;
            Ok(state)
        }
        SourceVariant::Build(build) => {
            let context = match &build.source {
                Some(nested) => resolve(nested, name, for_mount, opts)?,
                None if matches!(build.dockerfile, Some(Dockerfile::Inline(_))) => State::scratch(),
                None => return Err(ResolveError::NoSourceVariant),
            };

            let forward = opts.forward.ok_or(ResolveError::MissingForward)?;
            forward.forward(context, build).map_err(ResolveError::Forward)
        }
        SourceVariant::Inline(inline) => Ok(inline_state(inline, name)),
    }
}

fn image_state(image: &Image, opts: &SourceOpts) -> State {
    let mut source = ImageSource::new(&image.reference);
    if let Some(resolver) = &opts.resolver {
        source = source.with_resolver(Arc::clone(resolver));
    }
    source.state()
}

/// The command composer: run each step of `cmd` in the image, chaining the output
/// directory at `subpath` from step to step.
fn command_state(
    base: State,
    cmd: &Command,
    name: &str,
    subpath: &str,
    opts: &SourceOpts,
) -> Result<State, ResolveError> {
    if cmd.steps.is_empty() {
        return Err(ResolveError::NoSteps);
    }

    let mut base = base;
    for (key, value) in &cmd.env {
        base = base.env(key, value);
    }
    if let Some(dir) = &cmd.dir {
        base = base.dir(dir);
    }

    // mount sources resolve once and are shared by every step
    let mut mounts = Vec::with_capacity(cmd.mounts.len());
    for mount in &cmd.mounts {
        let state = resolve(&mount.spec, name, true, opts)?;
        mounts.push((mount.dest.clone(), state, mount_selector(&mount.spec)));
    }

    let mut out = State::scratch();
    for step in &cmd.steps {
        let mut run = base.run(["/bin/sh", "-c", step.command.as_str()]);
        run = with_cache_mounts(run, cmd);
        for (dest, state, source_path) in &mounts {
            let mut bind = Mount::new(dest, state);
            if let Some(path) = source_path {
                bind = bind.source_path(path);
            }
            run = run.mount(bind);
        }
        for (key, value) in &step.env {
            run = run.env(key, value);
        }
        out = run.add_mount(subpath, &out);
    }

    Ok(out)
}

/// The mount selector for a command mount's source: its subpath, unless glob filters
/// forced a filter copy instead.
fn mount_selector(spec: &Source) -> Option<String> {
    let path = spec.path.as_deref()?;
    if path.is_empty() || !spec.includes.is_empty() || !spec.excludes.is_empty() {
        return None;
    }
    Some(path.to_owned())
}

fn with_cache_mounts(mut run: Exec, cmd: &Command) -> Exec {
    for (dest, cache) in &cmd.cache_dirs {
        run = run.cache_mount(
            dest,
            cache.key.as_deref().unwrap_or(dest),
            cache.mode.into(),
        );
    }
    run
}

impl From<CacheSharing> for CacheSharingMode {
    fn from(value: CacheSharing) -> Self {
        match value {
            CacheSharing::Shared => Self::Shared,
            CacheSharing::Private => Self::Private,
            CacheSharing::Locked => Self::Locked,
        }
    }
}

fn inline_state(inline: &Inline, name: &str) -> State {
    match inline {
        Inline::File(file) => inline_file_state(file, name, &State::scratch()),
        Inline::Dir(dir) => inline_dir_state(dir),
    }
}

fn inline_file_state(file: &InlineFile, name: &str, base: &State) -> State {
    base.file(
        Mkfile::new(name, file.mode(), file.contents.as_bytes().to_vec())
            .owner(file.uid, file.gid),
    )
}

fn inline_dir_state(dir: &InlineDir) -> State {
    use itertools::Itertools;

    let mut state = State::scratch().file(Mkdir::new("/", dir.mode()).owner(dir.uid, dir.gid));
    for name in dir.files.keys().sorted() {
        state = inline_file_state(&dir.files[name], name, &state);
    }
    state
}
