//! Per-directory ignore rules with ancestor fallback.
//!
//! Every directory that carries an ignore file gets one compiled
//! [`IgnoreSet`]: the built-in denylist, then the ignore files of each
//! ancestor down to the directory itself. Deeper files win, as in git.
//! Lookups walk upward from a file's parent until a set is found and stop
//! at the workspace root, whose set always exists.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use parking_lot::Mutex;
use walkdir::WalkDir;

use crate::error::IgnoreError;
use crate::Result;

/// Built-in denylist, always merged under every project ignore file.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    // VCS and editor metadata
    ".git/",
    ".hg/",
    ".svn/",
    ".idea/",
    ".vscode/",
    ".DS_Store",
    "Thumbs.db",
    // Dependency and build output
    "node_modules/",
    "bower_components/",
    "target/",
    "build/",
    "out/",
    ".next/",
    "coverage/",
    "__pycache__/",
    ".venv/",
    "venv/",
    "vendor/",
    // Lockfiles
    "*.lock",
    "package-lock.json",
    "pnpm-lock.yaml",
    // Minified and generated assets
    "*.min.js",
    "*.min.css",
    "*.map",
    // Binaries and objects
    "*.exe",
    "*.dll",
    "*.so",
    "*.dylib",
    "*.o",
    "*.a",
    "*.class",
    "*.jar",
    "*.pyc",
    "*.wasm",
    // Media
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.bmp",
    "*.ico",
    "*.webp",
    "*.mp3",
    "*.mp4",
    "*.wav",
    "*.mov",
    "*.avi",
    "*.pdf",
    "*.woff",
    "*.woff2",
    "*.ttf",
    "*.eot",
    // Archives
    "*.zip",
    "*.tar",
    "*.gz",
    "*.7z",
    "*.rar",
];

/// Compiled ignore rules bound to one directory.
#[derive(Debug, Clone)]
pub struct IgnoreSet {
    dir: PathBuf,
    /// Shallowest first; the baseline is always `layers[0]`.
    layers: Vec<Arc<Gitignore>>,
}

impl IgnoreSet {
    /// Directory this set is bound to.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of rule layers, baseline included.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Whether `path` is excluded. The deepest layer with an opinion wins.
    #[must_use]
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        for layer in self.layers.iter().rev() {
            if path == layer.path() || !path.starts_with(layer.path()) {
                continue;
            }
            match layer.matched_path_or_any_parents(path, is_dir) {
                Match::Ignore(_) => return true,
                Match::Whitelist(_) => return false,
                Match::None => {}
            }
        }
        false
    }
}

/// Resolves whether a path is eligible for indexing.
#[derive(Debug)]
pub struct IgnoreResolver {
    ignore_file_name: String,
    extra_ignore: Vec<String>,
    include: Option<GlobMatcher>,
    /// Baseline matcher per workspace root.
    roots: Mutex<BTreeMap<PathBuf, Arc<Gitignore>>>,
    cache: Mutex<HashMap<PathBuf, Arc<IgnoreSet>>>,
}

impl IgnoreResolver {
    /// Create a resolver with no roots.
    ///
    /// # Errors
    ///
    /// Returns an error if the inclusion glob or an extra ignore line does
    /// not compile.
    pub fn new(
        ignore_file_name: impl Into<String>,
        extra_ignore: Vec<String>,
        include_glob: Option<&str>,
    ) -> Result<Self> {
        let include = include_glob
            .map(|glob| {
                GlobBuilder::new(glob)
                    .literal_separator(true)
                    .build()
                    .map(|g| g.compile_matcher())
                    .map_err(|e| IgnoreError::invalid_pattern(glob, e))
            })
            .transpose()?;

        let resolver = Self {
            ignore_file_name: ignore_file_name.into(),
            extra_ignore,
            include,
            roots: Mutex::new(BTreeMap::new()),
            cache: Mutex::new(HashMap::new()),
        };

        // Surface bad extra lines now rather than on first root.
        resolver.build_baseline(Path::new("/"))?;

        Ok(resolver)
    }

    /// Register a workspace root and load every ignore file below it.
    ///
    /// Returns the number of ignore files compiled.
    ///
    /// # Errors
    ///
    /// Returns an error if the baseline rules fail to compile.
    pub fn add_root(&self, root: &Path) -> Result<usize> {
        let baseline = Arc::new(self.build_baseline(root)?);
        self.roots.lock().insert(root.to_path_buf(), baseline);
        Ok(self.load_ignore_files(root))
    }

    /// [`add_root`](Self::add_root) on a blocking thread; the ignore-file
    /// walk touches every directory under the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the baseline rules fail to compile or the
    /// blocking task panics.
    pub async fn add_root_async(self: &Arc<Self>, root: &Path) -> Result<usize> {
        let resolver = Arc::clone(self);
        let root = root.to_path_buf();

        tokio::task::spawn_blocking(move || resolver.add_root(&root))
            .await
            .map_err(|e| crate::Error::internal(format!("Ignore load task failed: {e}")))?
    }

    /// [`reload_root`](Self::reload_root) on a blocking thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the blocking task panics.
    pub async fn reload_root_async(self: &Arc<Self>, root: &Path) -> Result<usize> {
        let resolver = Arc::clone(self);
        let root = root.to_path_buf();

        tokio::task::spawn_blocking(move || resolver.reload_root(&root))
            .await
            .map_err(|e| crate::Error::internal(format!("Ignore reload task failed: {e}")))
    }

    /// Forget a workspace root and every set compiled below it.
    pub fn remove_root(&self, root: &Path) {
        self.roots.lock().remove(root);
        self.cache.lock().retain(|dir, _| !dir.starts_with(root));
    }

    /// Drop and recompile every set below `root`.
    pub fn reload_root(&self, root: &Path) -> usize {
        self.cache.lock().retain(|dir, _| !dir.starts_with(root));
        self.load_ignore_files(root)
    }

    /// Registered roots.
    #[must_use]
    pub fn roots(&self) -> Vec<PathBuf> {
        self.roots.lock().keys().cloned().collect()
    }

    /// The innermost workspace root containing `path`.
    #[must_use]
    pub fn root_of(&self, path: &Path) -> Option<PathBuf> {
        self.roots
            .lock()
            .keys()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .cloned()
    }

    /// Whether `path` names an ignore file.
    #[must_use]
    pub fn is_ignore_file(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| name == self.ignore_file_name.as_str())
    }

    /// Whether a file must be kept out of the index.
    ///
    /// Paths outside every root are excluded. When an inclusion glob is set,
    /// non-matching paths are excluded whatever the ignore files say.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        let Some(root) = self.root_of(path) else {
            return true;
        };

        if let Some(include) = &self.include {
            let relative = path.strip_prefix(&root).unwrap_or(path);
            if !include.is_match(relative) {
                return true;
            }
        }

        self.resolve(path)
            .is_some_and(|set| set.is_ignored(path, false))
    }

    /// Whether a directory should be pruned from scans.
    ///
    /// The inclusion glob is not applied to directories.
    #[must_use]
    pub fn is_dir_excluded(&self, dir: &Path) -> bool {
        match self.root_of(dir) {
            Some(root) if root == dir => false,
            Some(_) => self
                .resolve(dir)
                .is_some_and(|set| set.is_ignored(dir, true)),
            None => true,
        }
    }

    /// The nearest set governing `path`: the first directory, walking up
    /// from its parent, that has one.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> Option<Arc<IgnoreSet>> {
        let root = self.root_of(path)?;
        let parent = path.parent().filter(|p| p.starts_with(&root))?;
        Some(self.set_for_dir(parent, &root))
    }

    /// React to an ignore file being created, changed or deleted.
    ///
    /// Sets for its directory and everything below are dropped; unless the
    /// file was deleted, the directory's set is recompiled straight away.
    pub fn ignore_file_changed(&self, path: &Path, deleted: bool) {
        let Some(dir) = path.parent() else {
            return;
        };
        let Some(root) = self.root_of(dir) else {
            return;
        };

        let dropped = {
            let mut cache = self.cache.lock();
            let before = cache.len();
            cache.retain(|d, _| !d.starts_with(dir));
            before - cache.len()
        };

        tracing::debug!(
            dir = %dir.display(),
            dropped,
            deleted,
            "Ignore file changed, invalidated rule sets"
        );

        if !deleted {
            let _ = self.set_for_dir(dir, &root);
        }
    }

    /// Number of cached sets.
    #[must_use]
    pub fn cached_sets(&self) -> usize {
        self.cache.lock().len()
    }

    fn set_for_dir(&self, dir: &Path, root: &Path) -> Arc<IgnoreSet> {
        if let Some(set) = self.cache.lock().get(dir) {
            return Arc::clone(set);
        }

        let is_root = dir == root;
        let has_own_file = dir.join(&self.ignore_file_name).is_file();

        if !is_root && !has_own_file {
            if let Some(parent) = dir.parent() {
                return self.set_for_dir(parent, root);
            }
        }

        let set = Arc::new(self.compile(dir, root, is_root, has_own_file));
        self.cache
            .lock()
            .insert(dir.to_path_buf(), Arc::clone(&set));
        set
    }

    fn compile(&self, dir: &Path, root: &Path, is_root: bool, has_own_file: bool) -> IgnoreSet {
        let baseline = self.baseline_for(root);

        let mut layers = if is_root {
            vec![Arc::clone(&baseline)]
        } else {
            dir.parent()
                .map(|parent| self.set_for_dir(parent, root).layers.clone())
                .unwrap_or_else(|| vec![Arc::clone(&baseline)])
        };

        if has_own_file {
            let file = dir.join(&self.ignore_file_name);
            match compile_ignore_file(dir, &file) {
                Ok(own) => layers.push(Arc::new(own)),
                Err(e) => {
                    tracing::warn!(
                        path = %file.display(),
                        error = %e,
                        "Failed to load ignore file, using built-in rules only"
                    );
                    layers = vec![baseline];
                }
            }
        }

        IgnoreSet {
            dir: dir.to_path_buf(),
            layers,
        }
    }

    fn baseline_for(&self, root: &Path) -> Arc<Gitignore> {
        if let Some(baseline) = self.roots.lock().get(root) {
            return Arc::clone(baseline);
        }
        // Only reachable if a root is removed mid-lookup.
        Arc::new(
            self.build_baseline(root)
                .unwrap_or_else(|_| Gitignore::empty()),
        )
    }

    fn build_baseline(&self, root: &Path) -> Result<Gitignore> {
        let mut builder = GitignoreBuilder::new(root);
        let lines = DEFAULT_IGNORE_PATTERNS
            .iter()
            .copied()
            .chain(std::iter::once(self.ignore_file_name.as_str()))
            .chain(self.extra_ignore.iter().map(String::as_str));

        for line in lines {
            builder
                .add_line(None, line)
                .map_err(|e| IgnoreError::invalid_pattern(line, e))?;
        }

        builder
            .build()
            .map_err(|e| IgnoreError::invalid_pattern("<baseline>", e).into())
    }

    fn load_ignore_files(&self, root: &Path) -> usize {
        let mut loaded = 0;
        let _ = self.set_for_dir(root, root);

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !self.is_dir_excluded(entry.path())
            });

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.depth() > 0
                        && entry.file_type().is_file()
                        && self.is_ignore_file(entry.path())
                    {
                        if let Some(dir) = entry.path().parent() {
                            let _ = self.set_for_dir(dir, root);
                            loaded += 1;
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable entry while loading ignore files");
                }
            }
        }

        tracing::debug!(root = %root.display(), loaded, "Loaded ignore files");
        loaded
    }
}

fn compile_ignore_file(dir: &Path, file: &Path) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(dir);
    if let Some(e) = builder.add(file) {
        return Err(IgnoreError::Parse {
            path: file.display().to_string(),
            reason: e.to_string(),
        }
        .into());
    }
    builder.build().map_err(|e| {
        IgnoreError::Parse {
            path: file.display().to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        (tmp, root)
    }

    fn resolver_for(root: &Path, include: Option<&str>) -> IgnoreResolver {
        let resolver = IgnoreResolver::new(".gitignore", Vec::new(), include).unwrap();
        resolver.add_root(root).unwrap();
        resolver
    }

    #[test]
    fn test_baseline_without_ignore_file() {
        let (_tmp, root) = workspace();
        let resolver = resolver_for(&root, None);

        assert!(resolver.is_excluded(&root.join("node_modules/pkg/index.js")));
        assert!(resolver.is_excluded(&root.join(".git/HEAD")));
        assert!(resolver.is_excluded(&root.join("assets/logo.png")));
        assert!(resolver.is_excluded(&root.join("Cargo.lock")));
        assert!(resolver.is_excluded(&root.join("dist/app.min.js")));
        assert!(resolver.is_excluded(&root.join(".gitignore")));
        assert!(!resolver.is_excluded(&root.join("src/main.rs")));
    }

    #[test]
    fn test_outside_root_is_excluded() {
        let (_tmp, root) = workspace();
        let resolver = resolver_for(&root, None);
        assert!(resolver.is_excluded(Path::new("/definitely/elsewhere/a.rs")));
    }

    #[test]
    fn test_root_gitignore() {
        let (_tmp, root) = workspace();
        fs::write(root.join(".gitignore"), "dist/\n*.log\n").unwrap();
        let resolver = resolver_for(&root, None);

        assert!(resolver.is_excluded(&root.join("dist/b.js")));
        assert!(resolver.is_excluded(&root.join("src/debug.log")));
        assert!(!resolver.is_excluded(&root.join("src/a.ts")));
        assert!(resolver.is_dir_excluded(&root.join("dist")));
        assert!(!resolver.is_dir_excluded(&root.join("src")));
    }

    #[test]
    fn test_nested_precedence() {
        let (_tmp, root) = workspace();
        let d2 = root.join("d2");
        let d3 = d2.join("d3");
        fs::create_dir_all(&d3).unwrap();
        fs::write(root.join(".gitignore"), "*.tmp\n").unwrap();
        fs::write(d2.join(".gitignore"), "!special.tmp\n").unwrap();
        fs::write(d3.join(".gitignore"), "special.tmp\n").unwrap();

        let resolver = resolver_for(&root, None);

        let set = resolver.resolve(&d3.join("special.tmp")).unwrap();
        assert_eq!(set.dir(), d3.as_path());
        assert_eq!(set.depth(), 4);

        assert!(resolver.is_excluded(&root.join("special.tmp")));
        assert!(!resolver.is_excluded(&d2.join("special.tmp")));
        assert!(resolver.is_excluded(&d3.join("special.tmp")));
        // Baseline still applies at the deepest level.
        assert!(resolver.is_excluded(&d3.join("node_modules/x.js")));
    }

    #[test]
    fn test_lookup_walks_up_to_nearest_set() {
        let (_tmp, root) = workspace();
        let d2 = root.join("d2");
        fs::create_dir_all(d2.join("a/b")).unwrap();
        fs::write(d2.join(".gitignore"), "generated.rs\n").unwrap();

        let resolver = resolver_for(&root, None);

        let set = resolver.resolve(&d2.join("a/b/generated.rs")).unwrap();
        assert_eq!(set.dir(), d2.as_path());
        assert!(resolver.is_excluded(&d2.join("a/b/generated.rs")));
        assert!(!resolver.is_excluded(&root.join("generated.rs")));
    }

    #[test]
    fn test_broken_ignore_file_falls_back_to_baseline() {
        let (_tmp, root) = workspace();
        let sub = root.join("sub");
        fs::create_dir_all(&sub).unwrap();
        fs::write(root.join(".gitignore"), "*.log\n").unwrap();
        fs::write(sub.join(".gitignore"), "broken[\n*.txt\n").unwrap();

        let resolver = resolver_for(&root, None);

        let set = resolver.resolve(&sub.join("notes.txt")).unwrap();
        assert_eq!(set.depth(), 1);
        assert!(!resolver.is_excluded(&sub.join("notes.txt")));
        assert!(resolver.is_excluded(&sub.join("node_modules/y.js")));
        assert!(resolver.is_excluded(&root.join("x.log")));
    }

    #[test]
    fn test_inclusion_glob_overrides_ignore_rules() {
        let (_tmp, root) = workspace();
        fs::write(root.join(".gitignore"), "!*.md\n").unwrap();
        let resolver = resolver_for(&root, Some("src/**/*.ts"));

        assert!(!resolver.is_excluded(&root.join("src/a.ts")));
        assert!(!resolver.is_excluded(&root.join("src/deep/b.ts")));
        assert!(resolver.is_excluded(&root.join("README.md")));
        assert!(resolver.is_excluded(&root.join("src/c.js")));
        // Matching the allowlist does not rescue a denied path.
        assert!(resolver.is_excluded(&root.join("src/node_modules/d.ts")));
    }

    #[test]
    fn test_invalid_inclusion_glob() {
        let err = IgnoreResolver::new(".gitignore", Vec::new(), Some("src/[")).unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));
    }

    #[test]
    fn test_extra_ignore_lines() {
        let (_tmp, root) = workspace();
        let resolver =
            IgnoreResolver::new(".gitignore", vec!["*.snap".to_string()], None).unwrap();
        resolver.add_root(&root).unwrap();

        assert!(resolver.is_excluded(&root.join("tests/output.snap")));
    }

    #[test]
    fn test_ignore_file_changed_recompiles() {
        let (_tmp, root) = workspace();
        let sub = root.join("sub");
        fs::create_dir_all(&sub).unwrap();
        let resolver = resolver_for(&root, None);
        assert!(!resolver.is_excluded(&sub.join("a.gen.rs")));

        fs::write(sub.join(".gitignore"), "*.gen.rs\n").unwrap();
        resolver.ignore_file_changed(&sub.join(".gitignore"), false);
        assert!(resolver.is_excluded(&sub.join("a.gen.rs")));

        fs::remove_file(sub.join(".gitignore")).unwrap();
        resolver.ignore_file_changed(&sub.join(".gitignore"), true);
        assert!(!resolver.is_excluded(&sub.join("a.gen.rs")));
    }

    #[test]
    fn test_parent_change_invalidates_descendants() {
        let (_tmp, root) = workspace();
        let sub = root.join("sub");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join(".gitignore"), "local.txt\n").unwrap();
        let resolver = resolver_for(&root, None);
        assert!(!resolver.is_excluded(&sub.join("x.cache")));

        fs::write(root.join(".gitignore"), "*.cache\n").unwrap();
        resolver.ignore_file_changed(&root.join(".gitignore"), false);

        assert!(resolver.is_excluded(&sub.join("x.cache")));
        assert!(resolver.is_excluded(&sub.join("local.txt")));
    }

    #[test]
    fn test_remove_root_drops_sets() {
        let (_tmp, root) = workspace();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("sub/.gitignore"), "x\n").unwrap();
        let resolver = resolver_for(&root, None);
        assert!(resolver.cached_sets() >= 2);

        resolver.remove_root(&root);
        assert_eq!(resolver.cached_sets(), 0);
        assert!(resolver.roots().is_empty());
        assert!(resolver.is_excluded(&root.join("sub/a.rs")));
    }

    #[test]
    fn test_root_of_prefers_innermost() {
        let (_tmp, root) = workspace();
        let inner = root.join("inner");
        fs::create_dir_all(&inner).unwrap();
        let resolver = resolver_for(&root, None);
        resolver.add_root(&inner).unwrap();

        assert_eq!(resolver.root_of(&inner.join("a.rs")), Some(inner.clone()));
        assert_eq!(resolver.root_of(&root.join("b.rs")), Some(root));
    }

    #[tokio::test]
    async fn test_async_load_and_reload() {
        let (_tmp, root) = workspace();
        fs::create_dir_all(root.join("a/b")).unwrap();
        fs::write(root.join("a/.gitignore"), "*.gen\n").unwrap();
        fs::write(root.join("a/b/.gitignore"), "*.tmp\n").unwrap();

        let resolver = Arc::new(IgnoreResolver::new(".gitignore", Vec::new(), None).unwrap());
        assert_eq!(resolver.add_root_async(&root).await.unwrap(), 2);
        assert!(resolver.is_excluded(&root.join("a/b/x.gen")));

        fs::remove_file(root.join("a/b/.gitignore")).unwrap();
        assert_eq!(resolver.reload_root_async(&root).await.unwrap(), 1);
        assert!(!resolver.is_excluded(&root.join("a/b/x.tmp")));
    }
}
