//! # Importers
//!
//! An [`Importer`] knows how to obtain a package's source tree and how to
//! bring an existing tree up to date. Every backend in this module follows the
//! same protocol:
//!
//! 1. When the source directory does not exist, [`Importer::checkout`] creates
//!    it from the repository.
//! 2. Otherwise [`Importer::update`] first checks that the working copy really
//!    comes from the declared repository. A mismatch is a configuration error:
//!    it is never retried and the working copy is left untouched.
//! 3. The update itself runs through the [`Runner`] with retry enabled, since
//!    network operations are the usual source of transient failures.
//!
//! Backends that must talk to a remote to update skip the update with a
//! warning when [`ImportOptions::only_local`] is set.

use std::fmt;
use std::fs;
use std::path::Path;

use log::info;

use crate::error::{Error, Result};
use crate::package::Phase;
use crate::subcommand::{RunOptions, Runner};

pub mod archive;
pub mod cvs;
pub mod darcs;
pub mod git;
pub mod hg;
pub mod svn;

pub use archive::{ArchiveImporter, ArchiveMode};
pub use cvs::CvsImporter;
pub use darcs::DarcsImporter;
pub use git::GitImporter;
pub use hg::HgImporter;
pub use svn::SvnImporter;

/// Options that apply to every import of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Never contact a remote; backends that cannot update locally skip
    pub only_local: bool,
    /// Update existing working copies. When false, only missing sources are
    /// checked out.
    pub update: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            only_local: false,
            update: true,
        }
    }
}

/// The package an importer works on.
pub struct ImportContext<'a> {
    pub package: &'a str,
    pub srcdir: &'a Path,
    pub runner: &'a Runner,
}

impl<'a> ImportContext<'a> {
    pub fn new(package: &'a str, srcdir: &'a Path, runner: &'a Runner) -> Self {
        Self {
            package,
            srcdir,
            runner,
        }
    }

    /// Runs a tool on behalf of the package's import phase.
    pub fn run<I, S>(&self, tool: &str, args: I, options: &RunOptions) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        self.runner
            .run(self.package, Phase::Import, tool, args, options)
    }

    /// A configuration error attributed to the package.
    pub fn config_error(&self, message: impl Into<String>) -> Error {
        Error::config(Some(self.package), message)
    }
}

/// Checks out and updates the sources of a package.
pub trait Importer: Send + Sync + fmt::Debug {
    /// Short backend name, e.g. `git`
    fn kind(&self) -> &'static str;

    /// A stable description of the repository this importer pulls from.
    fn repository_id(&self) -> &str;

    /// Whether [`Importer::update`] can tell an unchanged working copy from a
    /// changed one. Backends that cannot always report a change.
    fn detects_changes(&self) -> bool {
        true
    }

    /// Creates the source directory from the repository.
    fn checkout(&self, ctx: &ImportContext<'_>) -> Result<()>;

    /// Brings an existing working copy up to date. Returns whether it changed.
    fn update(&self, ctx: &ImportContext<'_>, options: &ImportOptions) -> Result<bool>;

    /// Checks out missing sources or updates existing ones. Returns whether
    /// the source tree changed.
    fn import(&self, ctx: &ImportContext<'_>, options: &ImportOptions) -> Result<bool> {
        if ctx.srcdir.exists() {
            if !options.update {
                info!("{}: not updating {}", ctx.package, ctx.srcdir.display());
                return Ok(false);
            }
            return self.update(ctx, options);
        }

        if options.only_local {
            return Err(ctx.config_error(format!(
                "{} does not exist and only local operations are allowed",
                ctx.srcdir.display()
            )));
        }
        info!(
            "{}: checking out {} into {}",
            ctx.package,
            self.repository_id(),
            ctx.srcdir.display()
        );
        self.checkout(ctx)?;
        Ok(true)
    }
}

/// Makes sure `srcdir` can receive a fresh checkout: it must not exist or be
/// empty, and its parent directory is created.
pub fn prepare_checkout_target(ctx: &ImportContext<'_>) -> Result<()> {
    if ctx.srcdir.exists() && fs::read_dir(ctx.srcdir)?.next().is_some() {
        return Err(ctx.config_error(format!(
            "{} exists and is not empty, refusing to check out into it",
            ctx.srcdir.display()
        )));
    }
    if let Some(parent) = ctx.srcdir.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Splits `srcdir` into the directory a checkout command runs in and the
/// name of the directory it creates.
pub(crate) fn checkout_location(ctx: &ImportContext<'_>) -> Result<(std::path::PathBuf, String)> {
    let name = ctx
        .srcdir
        .file_name()
        .ok_or_else(|| ctx.config_error(format!("invalid source directory {}", ctx.srcdir.display())))?
        .to_string_lossy()
        .into_owned();
    let parent = match ctx.srcdir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    Ok((parent, name))
}

/// Reduces a repository URL to a form where equivalent spellings compare
/// equal: `https://host/a/b.git`, `git@host:a/b` and `ssh://git@host/a/b/`
/// all become `host/a/b`.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let (has_scheme, rest) = match url.split_once("://") {
        Some((scheme, rest))
            if !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-')) =>
        {
            (true, rest)
        }
        _ => (false, url),
    };

    let host_end = rest.find('/').unwrap_or(rest.len());
    let rest = match rest[..host_end].rfind('@') {
        Some(at) => &rest[at + 1..],
        None => rest,
    };

    let mut normalized = rest.to_string();
    if !has_scheme {
        // scp-like syntax: host:path
        if let Some(colon) = rest.find(':') {
            let before_slash = rest.find('/').map_or(true, |slash| colon < slash);
            if colon > 0 && before_slash && !rest[colon + 1..].starts_with('/') {
                normalized = format!("{}/{}", &rest[..colon], &rest[colon + 1..]);
            }
        }
    }

    let trimmed = normalized.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    trimmed.trim_end_matches('/').to_string()
}

/// Fails with a configuration error when the working copy's origin differs
/// from the declared one.
pub fn verify_origin(ctx: &ImportContext<'_>, kind: &str, actual: &str, expected: &str) -> Result<()> {
    if normalize_url(actual) == normalize_url(expected) {
        return Ok(());
    }
    Err(ctx.config_error(format!(
        "{} working copy in {} is from {}, was expecting {}",
        kind,
        ctx.srcdir.display(),
        actual.trim(),
        expected
    )))
}

/// Requires `marker` to exist inside the working copy.
pub(crate) fn require_working_copy(ctx: &ImportContext<'_>, marker: &str, kind: &str) -> Result<()> {
    if ctx.srcdir.join(marker).exists() {
        return Ok(());
    }
    Err(ctx.config_error(format!(
        "{} is not a {} working copy",
        ctx.srcdir.display(),
        kind
    )))
}

/// Value of the `key:` line in the output of an info-style command.
pub(crate) fn field<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    output.lines().find_map(|line| {
        line.strip_prefix(key)
            .and_then(|rest| rest.strip_prefix(':'))
            .map(str::trim)
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Debug, Default)]
    struct CountingImporter {
        checkouts: AtomicUsize,
        updates: AtomicUsize,
    }

    impl Importer for CountingImporter {
        fn kind(&self) -> &'static str {
            "counting"
        }

        fn repository_id(&self) -> &str {
            "counting:repo"
        }

        fn checkout(&self, ctx: &ImportContext<'_>) -> Result<()> {
            self.checkouts.fetch_add(1, Ordering::SeqCst);
            fs::create_dir_all(ctx.srcdir)?;
            Ok(())
        }

        fn update(&self, _ctx: &ImportContext<'_>, _options: &ImportOptions) -> Result<bool> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }
    }

    #[test]
    fn test_import_checks_out_missing_sources() {
        let temp = TempDir::new().unwrap();
        let runner = test_support::runner(&temp.path().join("log"));
        let srcdir = temp.path().join("src").join("pkg");
        let ctx = ImportContext::new("pkg", &srcdir, &runner);
        let importer = CountingImporter::default();

        assert!(importer.import(&ctx, &ImportOptions::default()).unwrap());
        assert!(!importer.import(&ctx, &ImportOptions::default()).unwrap());
        assert_eq!(importer.checkouts.load(Ordering::SeqCst), 1);
        assert_eq!(importer.updates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_import_without_update_leaves_existing_sources() {
        let temp = TempDir::new().unwrap();
        let runner = test_support::runner(&temp.path().join("log"));
        let ctx = ImportContext::new("pkg", temp.path(), &runner);
        let importer = CountingImporter::default();
        let options = ImportOptions {
            update: false,
            ..ImportOptions::default()
        };

        assert!(!importer.import(&ctx, &options).unwrap());
        assert_eq!(importer.updates.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_only_local_cannot_check_out() {
        let temp = TempDir::new().unwrap();
        let runner = test_support::runner(&temp.path().join("log"));
        let srcdir = temp.path().join("missing");
        let ctx = ImportContext::new("pkg", &srcdir, &runner);
        let importer = CountingImporter::default();
        let options = ImportOptions {
            only_local: true,
            ..ImportOptions::default()
        };

        let err = importer.import(&ctx, &options).unwrap_err();
        assert!(err.is_config());
        assert_eq!(importer.checkouts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_prepare_checkout_target() {
        let temp = TempDir::new().unwrap();
        let runner = test_support::runner(&temp.path().join("log"));

        let fresh = temp.path().join("a").join("b").join("pkg");
        prepare_checkout_target(&ImportContext::new("pkg", &fresh, &runner)).unwrap();
        assert!(fresh.parent().unwrap().is_dir());

        let busy = temp.path().join("busy");
        fs::create_dir_all(&busy).unwrap();
        fs::write(busy.join("README"), "hello").unwrap();
        let err = prepare_checkout_target(&ImportContext::new("pkg", &busy, &runner)).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_normalize_url() {
        let expected = "github.com/org/repo";
        for url in [
            "https://github.com/org/repo.git",
            "https://github.com/org/repo",
            "https://github.com/org/repo/",
            "git@github.com:org/repo.git",
            "ssh://git@github.com/org/repo",
            "git://github.com/org/repo.git/",
        ] {
            assert_eq!(normalize_url(url), expected, "{}", url);
        }
        assert_ne!(normalize_url("https://github.com/org/other"), expected);
        assert_eq!(normalize_url("/srv/repos/base"), "/srv/repos/base");
    }

    #[test]
    fn test_verify_origin() {
        let temp = TempDir::new().unwrap();
        let runner = test_support::runner(&temp.path().join("log"));
        let ctx = ImportContext::new("pkg", temp.path(), &runner);

        verify_origin(&ctx, "git", "git@host:a/b.git\n", "https://host/a/b").unwrap();
        let err = verify_origin(&ctx, "git", "https://host/a/c", "https://host/a/b").unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("was expecting https://host/a/b"));
    }

    #[test]
    fn test_field() {
        let output = "Path: .\nURL: svn://host/repo/trunk\nRevision: 42\n";
        assert_eq!(field(output, "URL"), Some("svn://host/repo/trunk"));
        assert_eq!(field(output, "Revision"), Some("42"));
        assert_eq!(field(output, "Author"), None);
    }
}
