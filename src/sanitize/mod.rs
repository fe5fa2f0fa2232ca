//! Output sanitization: an ordered pipeline of named string rewrites that
//! turn machine-specific output into stable snapshot text.
//!
//! Sanitizers receive a [`SanitizeContext`] carrying the working directory
//! and root-dir cache explicitly. The process-wide pipeline behind
//! [`global`] is only consulted by `RunContext::clean_result`.

pub mod builtin;
pub mod root_dir;

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tracing::warn;

use self::root_dir::{RootDirCache, RootDirLocator};

/// Root dirs discovered for contexts built by [`SanitizeContext::current`].
static CURRENT_ROOT_DIRS: LazyLock<Arc<RootDirCache>> = LazyLock::new(Default::default);

static GLOBAL: LazyLock<RwLock<Pipeline>> = LazyLock::new(|| RwLock::new(Pipeline::defaults()));

/// Inputs a sanitizer may depend on besides the text itself.
#[derive(Debug, Clone)]
pub struct SanitizeContext {
    cwd: PathBuf,
    root_dirs: Arc<RootDirCache>,
    locator: RootDirLocator,
}

impl SanitizeContext {
    /// Context for `cwd` (lexically normalized) with a fresh root-dir cache.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: root_dir::normalize(&cwd.into()),
            root_dirs: Arc::default(),
            locator: RootDirLocator::default(),
        }
    }

    /// Context for the process working directory, sharing one root-dir
    /// cache across calls.
    pub fn current() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|e| {
            warn!(err = %e, "cannot read working directory; path rewriting disabled");
            PathBuf::new()
        });
        Self::new(cwd).with_cache(Arc::clone(&CURRENT_ROOT_DIRS))
    }

    pub fn with_cache(mut self, cache: Arc<RootDirCache>) -> Self {
        self.root_dirs = cache;
        self
    }

    pub fn with_locator(mut self, locator: RootDirLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Project root for the working directory, memoized in the cache.
    pub fn root_dir(&self) -> PathBuf {
        self.root_dirs.get_or_locate(&self.cwd, &self.locator)
    }
}

pub type SanitizeFn = dyn Fn(&str, &SanitizeContext) -> String + Send + Sync;

/// A named rewrite step.
#[derive(Clone)]
pub struct Sanitizer {
    name: Cow<'static, str>,
    func: Arc<SanitizeFn>,
}

impl Sanitizer {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, func: F) -> Self
    where
        F: Fn(&str, &SanitizeContext) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Sanitizer that ignores the context.
    pub fn from_fn<F>(name: impl Into<Cow<'static, str>>, func: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::new(name, move |s: &str, _: &SanitizeContext| func(s))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, input: &str, ctx: &SanitizeContext) -> String {
        (self.func)(input, ctx)
    }
}

impl fmt::Debug for Sanitizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sanitizer").field(&self.name).finish()
    }
}

/// Sanitizers applied in list order, each to the previous one's output.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    steps: Vec<Sanitizer>,
}

impl Pipeline {
    /// Empty pipeline; applying it returns the input unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defaults() -> Self {
        Self {
            steps: builtin::defaults(),
        }
    }

    pub fn push(&mut self, sanitizer: Sanitizer) -> &mut Self {
        self.steps.push(sanitizer);
        self
    }

    /// Insert at `index`, clamped to the end of the list.
    pub fn insert(&mut self, index: usize, sanitizer: Sanitizer) -> &mut Self {
        let index = index.min(self.steps.len());
        self.steps.insert(index, sanitizer);
        self
    }

    /// Remove every step called `name`. Returns whether any was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.steps.len();
        self.steps.retain(|step| step.name() != name);
        self.steps.len() != before
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.name() == name)
    }

    pub fn truncate(&mut self, len: usize) {
        self.steps.truncate(len);
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn reset_to_defaults(&mut self) {
        self.steps = builtin::defaults();
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(Sanitizer::name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sanitizer> {
        self.steps.iter()
    }

    pub fn apply(&self, input: &str, ctx: &SanitizeContext) -> String {
        self.steps
            .iter()
            .fold(input.to_string(), |text, step| step.apply(&text, ctx))
    }
}

impl Extend<Sanitizer> for Pipeline {
    fn extend<T: IntoIterator<Item = Sanitizer>>(&mut self, iter: T) {
        self.steps.extend(iter);
    }
}

/// The process-wide pipeline used by `RunContext::clean_result`, seeded
/// with the defaults on first use.
///
/// Shared by every test in the process; tests that mutate it should reset
/// it with [`Pipeline::reset_to_defaults`].
pub fn global() -> &'static RwLock<Pipeline> {
    &GLOBAL
}

pub(crate) fn snapshot() -> Pipeline {
    GLOBAL.read().unwrap_or_else(PoisonError::into_inner).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &'static str) -> Sanitizer {
        Sanitizer::from_fn(name, move |s| format!("{s}[{name}]"))
    }

    fn ctx() -> SanitizeContext {
        SanitizeContext::new("/nowhere")
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        assert_eq!(Pipeline::new().apply("as is", &ctx()), "as is");
    }

    #[test]
    fn test_steps_apply_in_order() {
        let mut pipeline = Pipeline::new();
        pipeline.push(tag("a")).push(tag("b"));
        pipeline.insert(0, tag("first"));
        pipeline.insert(99, tag("last"));

        assert_eq!(pipeline.apply("x", &ctx()), "x[first][a][b][last]");
        assert_eq!(pipeline.position("b"), Some(2));
    }

    #[test]
    fn test_remove_and_truncate() {
        let mut pipeline = Pipeline::new();
        pipeline.extend([tag("a"), tag("b"), tag("c")]);

        assert!(pipeline.remove("b"));
        assert!(!pipeline.remove("b"));
        assert_eq!(pipeline.names().collect::<Vec<_>>(), ["a", "c"]);

        pipeline.truncate(1);
        assert_eq!(pipeline.apply("x", &ctx()), "x[a]");

        pipeline.clear();
        assert!(pipeline.is_empty());
        pipeline.reset_to_defaults();
        assert_eq!(pipeline.len(), Pipeline::defaults().len());
    }

    #[test]
    fn test_custom_sanitizer_sees_context() {
        let mut pipeline = Pipeline::defaults();
        pipeline.push(Sanitizer::new("where", |s: &str, ctx: &SanitizeContext| {
            format!("{s} in {}", ctx.cwd().display())
        }));
        assert_eq!(pipeline.apply("ran", &ctx()), "ran in /nowhere");
    }

    #[test]
    fn test_root_dir_memoized_in_shared_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".hg")).unwrap();
        let nested = dir.path().join("a");
        std::fs::create_dir(&nested).unwrap();

        let cache = Arc::new(RootDirCache::new());
        let ctx = SanitizeContext::new(&nested).with_cache(Arc::clone(&cache));
        assert_eq!(ctx.root_dir(), dir.path());
        assert_eq!(cache.get(&nested), Some(dir.path().to_path_buf()));
    }

    #[test]
    fn test_locator_override() {
        let locator = RootDirLocator::with_tiers(Vec::new());
        let ctx = SanitizeContext::new("/x/y").with_locator(locator);
        assert_eq!(ctx.root_dir(), PathBuf::from("/x/y"));
    }

    #[test]
    fn test_sanitizer_debug_shows_name() {
        assert_eq!(format!("{:?}", tag("n")), "Sanitizer(\"n\")");
    }
}
