//! Tarball and zip importer
//!
//! The archive is first copied into a cache directory, then extracted into the
//! package's source directory. A marker file in the source directory records
//! which URL it was extracted from, so that a later update can tell whether
//! the source directory belongs to this importer.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use url::Url;

use super::{prepare_checkout_target, ImportContext, ImportOptions, Importer};
use crate::error::{Error, Result};
use crate::package::Phase;
use crate::subcommand::{RunOptions, Runner};

/// Name of the file recording the origin of an extracted tree
pub const MARKER_FILE: &str = ".metabuild-archive";

const SCHEMES: [&str; 4] = ["http", "https", "ftp", "file"];

/// Compression of an archive, derived from its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    Plain,
    Gzip,
    Bzip,
    Xz,
    Zip,
}

impl ArchiveMode {
    /// The mode matching the file name at the end of `url`.
    pub fn from_url(url: &str) -> Option<Self> {
        let name = url.rsplit('/').next().unwrap_or(url).to_lowercase();
        if name.ends_with(".tar") {
            Some(ArchiveMode::Plain)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveMode::Gzip)
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") {
            Some(ArchiveMode::Bzip)
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Some(ArchiveMode::Xz)
        } else if name.ends_with(".zip") {
            Some(ArchiveMode::Zip)
        } else {
            None
        }
    }

    fn tar_flags(self) -> Option<&'static str> {
        match self {
            ArchiveMode::Plain => Some("xf"),
            ArchiveMode::Gzip => Some("xzf"),
            ArchiveMode::Bzip => Some("xjf"),
            ArchiveMode::Xz => Some("xJf"),
            ArchiveMode::Zip => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveImporter {
    url: Url,
    mode: ArchiveMode,
    cached_archive: PathBuf,
    strip_components: u32,
    repository_id: String,
}

impl ArchiveImporter {
    /// An importer for the archive at `url`, cached under `cache_dir`.
    ///
    /// Fails with a configuration error for URLs that cannot be fetched
    /// (schemes other than http, https, ftp and file) or whose file name does
    /// not tell the archive format.
    pub fn new(url: &str, cache_dir: impl AsRef<Path>) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::config(None, format!("invalid archive URL {}: {}", url, e)))?;
        if !SCHEMES.contains(&parsed.scheme()) {
            return Err(Error::config(
                None,
                format!(
                    "unsupported URL scheme '{}' in {}, expected one of {}",
                    parsed.scheme(),
                    url,
                    SCHEMES.join(", ")
                ),
            ));
        }
        let mode = ArchiveMode::from_url(parsed.path())
            .ok_or_else(|| Error::config(None, format!("cannot guess the archive format of {}", url)))?;
        let filename = parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::config(None, format!("no file name in archive URL {}", url)))?
            .to_string();

        Ok(Self {
            repository_id: format!("archive:{}", url),
            cached_archive: cache_dir.as_ref().join(filename),
            url: parsed,
            mode,
            strip_components: 0,
        })
    }

    /// Drops the first `count` path components when extracting tarballs.
    pub fn with_strip_components(mut self, count: u32) -> Self {
        self.strip_components = count;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn mode(&self) -> ArchiveMode {
        self.mode
    }

    /// Where the downloaded archive is kept.
    pub fn cached_archive(&self) -> &Path {
        &self.cached_archive
    }

    fn is_local(&self) -> bool {
        self.url.scheme() == "file"
    }

    /// Refreshes the cached copy of the archive. Returns whether it changed.
    pub fn update_cache(&self, runner: &Runner, package: &str) -> Result<bool> {
        if let Some(parent) = self.cached_archive.parent() {
            fs::create_dir_all(parent)?;
        }
        if self.is_local() {
            self.update_local_cache()
        } else {
            self.update_remote_cache(runner, package)
        }
    }

    fn update_local_cache(&self) -> Result<bool> {
        let source = self
            .url
            .to_file_path()
            .map_err(|_| Error::config(None, format!("invalid file URL {}", self.url)))?;
        let source_meta = fs::metadata(&source)?;
        let source_mtime = source_meta.modified()?;

        if let Ok(cached) = fs::metadata(&self.cached_archive) {
            if cached.len() == source_meta.len() && cached.modified()? == source_mtime {
                debug!("{} is up to date", self.cached_archive.display());
                return Ok(false);
            }
        }

        fs::copy(&source, &self.cached_archive)?;
        File::options()
            .write(true)
            .open(&self.cached_archive)?
            .set_modified(source_mtime)?;
        info!("cached {} in {}", self.url, self.cached_archive.display());
        Ok(true)
    }

    fn update_remote_cache(&self, runner: &Runner, package: &str) -> Result<bool> {
        let mut partial = self.cached_archive.clone().into_os_string();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        runner.run(
            package,
            Phase::Import,
            "curl",
            [
                OsStr::new("-fsSL"),
                OsStr::new("-R"),
                OsStr::new("-o"),
                partial.as_os_str(),
                OsStr::new(self.url.as_str()),
            ],
            &RunOptions::new().retry(true),
        )?;

        if same_contents(&partial, &self.cached_archive).unwrap_or(false) {
            fs::remove_file(&partial)?;
            return Ok(false);
        }
        fs::rename(&partial, &self.cached_archive)?;
        info!("downloaded {} to {}", self.url, self.cached_archive.display());
        Ok(true)
    }

    fn extract(&self, ctx: &ImportContext<'_>) -> Result<()> {
        fs::create_dir_all(ctx.srcdir)?;
        let archive = self.cached_archive.as_os_str();
        let srcdir = ctx.srcdir.as_os_str();

        match self.mode.tar_flags() {
            Some(flags) => {
                let strip = format!("--strip-components={}", self.strip_components);
                let mut args = vec![OsStr::new(flags), archive, OsStr::new("-C"), srcdir];
                if self.strip_components > 0 {
                    args.push(OsStr::new(&strip));
                }
                ctx.run("tar", args, &RunOptions::new())?;
            }
            None => {
                if self.strip_components > 0 {
                    return Err(ctx.config_error("stripping path components is not supported for zip archives"));
                }
                ctx.run(
                    "unzip",
                    [OsStr::new("-o"), OsStr::new("-q"), archive, OsStr::new("-d"), srcdir],
                    &RunOptions::new(),
                )?;
            }
        }
        fs::write(ctx.srcdir.join(MARKER_FILE), format!("{}\n", self.url))?;
        Ok(())
    }
}

/// Whether two files hold the same bytes, compared chunk by chunk.
fn same_contents(left: &Path, right: &Path) -> io::Result<bool> {
    if fs::metadata(left)?.len() != fs::metadata(right)?.len() {
        return Ok(false);
    }
    let mut left = BufReader::new(File::open(left)?);
    let mut right = BufReader::new(File::open(right)?);
    loop {
        let ours = left.fill_buf()?;
        let theirs = right.fill_buf()?;
        let len = ours.len().min(theirs.len());
        if len == 0 {
            return Ok(ours.is_empty() && theirs.is_empty());
        }
        if ours[..len] != theirs[..len] {
            return Ok(false);
        }
        left.consume(len);
        right.consume(len);
    }
}

impl Importer for ArchiveImporter {
    fn kind(&self) -> &'static str {
        "archive"
    }

    fn repository_id(&self) -> &str {
        &self.repository_id
    }

    fn update(&self, ctx: &ImportContext<'_>, options: &ImportOptions) -> Result<bool> {
        let marker = ctx.srcdir.join(MARKER_FILE);
        let origin = fs::read_to_string(&marker).map_err(|_| {
            ctx.config_error(format!(
                "{} was not extracted from an archive",
                ctx.srcdir.display()
            ))
        })?;
        if origin.trim() != self.url.as_str() {
            return Err(ctx.config_error(format!(
                "{} was extracted from {}, was expecting {}",
                ctx.srcdir.display(),
                origin.trim(),
                self.url
            )));
        }

        if options.only_local && !self.is_local() {
            warn!("{}: not downloading {} in local mode", ctx.package, self.url);
            return Ok(false);
        }
        if !self.update_cache(ctx.runner, ctx.package)? {
            return Ok(false);
        }
        // Files dropped from the new archive must not survive
        fs::remove_dir_all(ctx.srcdir)?;
        self.extract(ctx)?;
        Ok(true)
    }

    fn checkout(&self, ctx: &ImportContext<'_>) -> Result<()> {
        prepare_checkout_target(ctx)?;
        self.update_cache(ctx.runner, ctx.package)?;
        self.extract(ctx)
    }
}
