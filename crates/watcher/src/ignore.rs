//! Ignore rules for watched roots
//!
//! Supports multiple sources of ignore patterns:
//! 1. Built-in patterns (VCS metadata, editor temp files - always active)
//! 2. .watchignore patterns (watcher-specific, can whitelist)
//! 3. .gitignore patterns (optional, enabled by default)
//! 4. Config-based patterns (gitignore syntax)

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use treewatch_core::{ChangeFilter, ChangedFile};

const GITIGNORE_FILE: &str = ".gitignore";

/// Name of the watcher-specific ignore file looked up in each root
pub const WATCHIGNORE_FILE: &str = ".watchignore";

/// Directories never worth reporting, matched on any path component
const BUILTIN_DIRS: &[&str] = &[".git", ".hg", ".svn", ".jj"];

/// Ignore rule manager for one root
///
/// Precedence, highest first:
/// 1. Built-in patterns (always enforced)
/// 2. .watchignore (a `!pattern` whitelists over .gitignore)
/// 3. .gitignore
/// 4. Additional config patterns
///
/// The ignore files are re-read with [`IgnoreRules::reload_ignore_files`]
/// while the rules are shared with a running poller.
pub struct IgnoreRules {
    /// Root the patterns are anchored at
    root: PathBuf,

    /// Configuration
    config: IgnoreConfig,

    /// Compiled patterns, swapped wholesale on reload
    matchers: RwLock<Matchers>,
}

#[derive(Default)]
struct Matchers {
    /// Gitignore patterns (optional)
    gitignore: Option<Gitignore>,

    /// Watcher-specific ignore patterns (optional)
    watchignore: Option<Gitignore>,

    /// Patterns from configuration
    additional: Option<Gitignore>,
}

impl IgnoreRules {
    /// Load ignore rules for a root
    pub fn load(root: &Path, config: IgnoreConfig) -> Result<Self, ignore::Error> {
        let rules = Self {
            root: root.to_path_buf(),
            config,
            matchers: RwLock::new(Matchers::default()),
        };

        rules.reload_ignore_files()?;
        Ok(rules)
    }

    /// Reload ignore files from disk
    ///
    /// On a parse error the previous rules stay in effect.
    pub fn reload_ignore_files(&self) -> Result<(), ignore::Error> {
        let gitignore = if self.config.use_gitignore {
            self.build_from_file(GITIGNORE_FILE)?
        } else {
            None
        };

        let watchignore = if self.config.use_watchignore {
            self.build_from_file(WATCHIGNORE_FILE)?
        } else {
            None
        };

        let additional = if self.config.additional_patterns.is_empty() {
            None
        } else {
            let mut builder = GitignoreBuilder::new(&self.root);
            for pattern in &self.config.additional_patterns {
                builder.add_line(None, pattern)?;
            }
            Some(builder.build()?)
        };

        *self.matchers.write() = Matchers {
            gitignore,
            watchignore,
            additional,
        };
        Ok(())
    }

    fn build_from_file(&self, name: &str) -> Result<Option<Gitignore>, ignore::Error> {
        let path = self.root.join(name);
        if !path.is_file() {
            return Ok(None);
        }

        let mut builder = GitignoreBuilder::new(&self.root);
        if let Some(err) = builder.add(&path) {
            return Err(err);
        }
        Ok(Some(builder.build()?))
    }

    /// Whether `relative` names one of the ignore files these rules read
    pub fn is_ignore_file(&self, relative: &Path) -> bool {
        (self.config.use_gitignore && relative == Path::new(GITIGNORE_FILE))
            || (self.config.use_watchignore && relative == Path::new(WATCHIGNORE_FILE))
    }

    /// Check if a file path (relative to the root) should be ignored
    ///
    /// A file is also ignored when any of its parent directories match.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        // 1. Built-in patterns (highest priority - always enforced)
        if is_builtin_ignored(relative) {
            return true;
        }

        let matchers = self.matchers.read();

        // 2. .watchignore (overrides .gitignore)
        if let Some(ref watchignore) = matchers.watchignore {
            match watchignore.matched_path_or_any_parents(relative, false) {
                Match::Ignore(_) => return true,
                Match::Whitelist(_) => return false,
                Match::None => {}
            }
        }

        // 3. .gitignore
        if let Some(ref gitignore) = matchers.gitignore {
            if gitignore
                .matched_path_or_any_parents(relative, false)
                .is_ignore()
            {
                return true;
            }
        }

        // 4. Additional config patterns
        if let Some(ref additional) = matchers.additional {
            if additional
                .matched_path_or_any_parents(relative, false)
                .is_ignore()
            {
                return true;
            }
        }

        false
    }

    /// Get number of active ignore sources
    pub fn active_sources(&self) -> usize {
        let matchers = self.matchers.read();
        1 + usize::from(matchers.gitignore.is_some())
            + usize::from(matchers.watchignore.is_some())
            + usize::from(matchers.additional.is_some())
    }

    /// Get the root the rules are anchored at
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ChangeFilter for IgnoreRules {
    fn accept(&self, change: &ChangedFile) -> bool {
        !self.is_ignored(change.path())
    }
}

/// Check if a path matches built-in ignore patterns
fn is_builtin_ignored(path: &Path) -> bool {
    let in_vcs_dir = path.components().any(|component| match component {
        Component::Normal(name) => name
            .to_str()
            .is_some_and(|name| BUILTIN_DIRS.contains(&name)),
        _ => false,
    });

    in_vcs_dir || is_editor_temp(path)
}

/// Check if a file name looks like an editor or OS scratch file
///
/// Covers: Vim, Emacs, MacOS/Windows system files
fn is_editor_temp(path: &Path) -> bool {
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

    // Vim swap files (.swp, .swo, .swn, .swm)
    if [".swp", ".swo", ".swn", ".swm"]
        .iter()
        .any(|ext| filename.ends_with(ext))
    {
        return true;
    }

    // Vim/Emacs backup files (~)
    if filename.ends_with('~') {
        return true;
    }

    // Emacs auto-save (#*#) and lock files (.#*)
    if (filename.len() > 1 && filename.starts_with('#') && filename.ends_with('#'))
        || filename.starts_with(".#")
    {
        return true;
    }

    // MacOS and Windows system files
    filename == ".DS_Store" || filename.starts_with("._") || filename == "Thumbs.db"
}

/// Ignore configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreConfig {
    /// Use .gitignore patterns (default: true)
    #[serde(default = "default_true")]
    pub use_gitignore: bool,

    /// Use .watchignore patterns (default: true)
    #[serde(default = "default_true")]
    pub use_watchignore: bool,

    /// Additional gitignore-syntax patterns
    #[serde(default)]
    pub additional_patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            use_gitignore: true,
            use_watchignore: true,
            additional_patterns: vec![],
        }
    }
}

fn default_true() -> bool {
    true
}
