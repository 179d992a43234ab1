//! Resolution of logical tool names to executables
//!
//! Packages and importers never spawn `git` or `make` directly: they ask the
//! [`ToolResolver`] for the executable behind a logical name. The resolver
//! consults an override mapping first (so that `cvs` can be redirected to
//! `my_cvs_tool` or to an absolute path), then searches the active search
//! path.
//!
//! Resolved paths are cached per tool name together with the override value
//! and the search path that produced them. An entry is only reused while both
//! are unchanged, so modifying the mapping or `PATH` never requires manual
//! cache invalidation.

use std::collections::HashMap;
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::debug;

use crate::error::{Error, Result};

/// Looks up a program in a search path.
///
/// Split out of the resolver so tests can observe how often a real search
/// happens.
pub trait ExecutableFinder: Send + Sync {
    fn find(&self, program: &str, search_path: &OsStr) -> Option<PathBuf>;
}

/// Default finder, backed by the `which` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhichFinder;

impl ExecutableFinder for WhichFinder {
    fn find(&self, program: &str, search_path: &OsStr) -> Option<PathBuf> {
        let cwd = env::current_dir().ok()?;
        which::which_in(program, Some(search_path), cwd).ok()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    path: PathBuf,
    program: String,
    search_path: OsString,
}

/// Maps logical tool names to absolute executable paths.
pub struct ToolResolver {
    programs: Mutex<HashMap<String, String>>,
    search_path: Mutex<Option<OsString>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    finder: Box<dyn ExecutableFinder>,
}

impl ToolResolver {
    /// A resolver that searches the process `PATH`.
    pub fn new() -> Self {
        Self::with_finder(Box::new(WhichFinder))
    }

    pub fn with_finder(finder: Box<dyn ExecutableFinder>) -> Self {
        Self {
            programs: Mutex::new(HashMap::new()),
            search_path: Mutex::new(None),
            cache: Mutex::new(HashMap::new()),
            finder,
        }
    }

    /// Overrides the program used for `name`, e.g. `cvs` -> `/opt/cvs/bin/cvs`.
    pub fn set_program(&self, name: &str, program: impl Into<String>) -> Result<()> {
        lock(&self.programs, "tool overrides")?.insert(name.to_string(), program.into());
        Ok(())
    }

    pub fn remove_program(&self, name: &str) -> Result<Option<String>> {
        Ok(lock(&self.programs, "tool overrides")?.remove(name))
    }

    /// The program configured for `name`, or `name` itself.
    pub fn program(&self, name: &str) -> Result<String> {
        Ok(lock(&self.programs, "tool overrides")?
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string()))
    }

    /// Pins the search path. `None` goes back to reading the process `PATH`
    /// at every resolution.
    pub fn set_search_path(&self, search_path: Option<OsString>) -> Result<()> {
        *lock(&self.search_path, "search path")? = search_path;
        Ok(())
    }

    /// The search path resolution currently uses.
    pub fn search_path(&self) -> Result<OsString> {
        let pinned = lock(&self.search_path, "search path")?.clone();
        Ok(pinned.unwrap_or_else(|| env::var_os("PATH").unwrap_or_default()))
    }

    /// Resolves `name` to the absolute path of an executable.
    ///
    /// Absolute override values are accepted verbatim. Anything else is
    /// searched in [`ToolResolver::search_path`]. The cache lock is held for
    /// the whole resolution, so concurrent callers never search twice for the
    /// same entry.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let program = self.program(name)?;
        let search_path = self.search_path()?;

        let mut cache = lock(&self.cache, "tool cache")?;
        if let Some(entry) = cache.get(name) {
            if entry.program == program && entry.search_path == search_path {
                return Ok(entry.path.clone());
            }
            debug!("cached path for tool {} is stale, resolving again", name);
            cache.remove(name);
        }

        let path = if Path::new(&program).is_absolute() {
            PathBuf::from(&program)
        } else {
            self.finder
                .find(&program, &search_path)
                .ok_or_else(|| Error::ToolNotFound {
                    tool: name.to_string(),
                    program: program.clone(),
                    search_path: search_path.to_string_lossy().into_owned(),
                })?
        };

        debug!("tool {} resolved to {}", name, path.display());
        cache.insert(
            name.to_string(),
            CacheEntry {
                path: path.clone(),
                program,
                search_path,
            },
        );
        Ok(path)
    }

    pub fn clear_cache(&self) -> Result<()> {
        lock(&self.cache, "tool cache")?.clear();
        Ok(())
    }
}

impl Default for ToolResolver {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| Error::LockPoisoned {
        context: context.to_string(),
    })
}
