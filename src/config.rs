//! # Manifest Schema and Parsing
//!
//! This module defines the data structures that represent a `metabuild.yaml`
//! manifest, as well as the logic that turns it into a [`Registry`] ready to
//! be scheduled.
//!
//! ## Layout
//!
//! ```yaml
//! settings:
//!   jobs: 4
//!   keep_going: true
//!   on_package_failures: report
//!   log_dir: build/log
//!   retries: 1
//!   programs: { git: /usr/local/bin/git }
//!   mail: { to: [dev@example.com], smtp_host: localhost }
//! packages:
//!   - name: base
//!     srcdir: src/base
//!     import: { type: git, url: https://example.com/base.git, branch: main }
//!     build: [["make"]]
//!     install: [["make", "install"]]
//! ```
//!
//! Every section is optional. Relative paths (source directories, prefixes,
//! the log and cache directories, local archives) are resolved against the
//! directory holding the manifest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::defaults;
use crate::error::{Error, Result};
use crate::importer::{
    ArchiveImporter, CvsImporter, DarcsImporter, GitImporter, HgImporter, ImportOptions, Importer,
    SvnImporter,
};
use crate::package::{CommandSteps, Package};
use crate::registry::Registry;
use crate::reporting::{MailConfig, OnPackageFailures};
use crate::retry::RetryPolicy;
use crate::scheduler::SchedulerConfig;

/// Global settings of a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Parallel jobs; one per CPU when unset
    pub jobs: Option<usize>,
    pub keep_going: bool,
    pub on_package_failures: OnPackageFailures,
    pub log_dir: Option<PathBuf>,
    /// Where archives are downloaded
    pub cache_dir: Option<PathBuf>,
    /// Never touch the network while importing
    pub only_local: bool,
    /// Update existing working copies
    pub update: bool,
    /// Extra attempts for failing network operations
    pub retries: Option<u32>,
    /// Overrides of the program used for a tool
    pub programs: BTreeMap<String, String>,
    pub mail: Option<MailConfig>,
    /// Printed, and mailed, when a build succeeds
    pub post_success_message: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jobs: None,
            keep_going: true,
            on_package_failures: OnPackageFailures::default(),
            log_dir: None,
            cache_dir: None,
            only_local: false,
            update: true,
            retries: None,
            programs: BTreeMap::new(),
            mail: None,
            post_success_message: None,
        }
    }
}

/// Where the sources of a package come from, tagged by `type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ImportSpec {
    Git {
        url: String,
        branch: Option<String>,
        remote: Option<String>,
    },
    Svn {
        url: String,
    },
    Hg {
        url: String,
        branch: Option<String>,
    },
    Darcs {
        url: String,
    },
    Cvs {
        root: String,
        module: String,
        update_options: Option<Vec<String>>,
        checkout_options: Option<Vec<String>>,
    },
    /// A tarball or zip file, given as a URL or a local path
    #[serde(alias = "tar", alias = "zip")]
    Archive {
        url: String,
        #[serde(default)]
        strip_components: u32,
    },
}

impl ImportSpec {
    /// Builds the importer, resolving local archive paths against `base_dir`.
    pub fn build(&self, base_dir: &Path, cache_dir: &Path) -> Result<Box<dyn Importer>> {
        let importer: Box<dyn Importer> = match self {
            ImportSpec::Git { url, branch, remote } => {
                let mut git = GitImporter::new(url);
                if let Some(branch) = branch {
                    git = git.with_branch(branch);
                }
                if let Some(remote) = remote {
                    git = git.with_remote(remote);
                }
                Box::new(git)
            }
            ImportSpec::Svn { url } => Box::new(SvnImporter::new(url)),
            ImportSpec::Hg { url, branch } => {
                let mut hg = HgImporter::new(url);
                if let Some(branch) = branch {
                    hg = hg.with_branch(branch);
                }
                Box::new(hg)
            }
            ImportSpec::Darcs { url } => Box::new(DarcsImporter::new(url)),
            ImportSpec::Cvs {
                root,
                module,
                update_options,
                checkout_options,
            } => {
                let mut cvs = CvsImporter::new(root, module)?;
                if let Some(options) = update_options {
                    cvs = cvs.with_update_options(options);
                }
                if let Some(options) = checkout_options {
                    cvs = cvs.with_checkout_options(options);
                }
                Box::new(cvs)
            }
            ImportSpec::Archive { url, strip_components } => {
                let url = archive_url(url, base_dir)?;
                Box::new(ArchiveImporter::new(&url, cache_dir)?.with_strip_components(*strip_components))
            }
        };
        Ok(importer)
    }
}

/// Turns a bare path into a `file://` URL.
fn archive_url(url: &str, base_dir: &Path) -> Result<String> {
    if url.contains("://") {
        return Ok(url.to_string());
    }
    let path = std::path::absolute(base_dir.join(url))?;
    Url::from_file_path(&path)
        .map(String::from)
        .map_err(|_| Error::config(None, format!("cannot use {} as an archive location", path.display())))
}

/// A package as declared in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    /// Source directory; the package name when unset
    #[serde(default)]
    pub srcdir: Option<PathBuf>,
    #[serde(default)]
    pub prefix: Option<PathBuf>,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub import: Option<ImportSpec>,
    #[serde(flatten)]
    pub steps: CommandSteps,
}

/// A parsed manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub packages: Vec<PackageSpec>,
    /// Directory relative paths are resolved against
    #[serde(skip, default = "current_dir")]
    base_dir: PathBuf,
}

fn current_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Manifest {
    /// Parse a manifest from YAML text, relative paths being resolved against
    /// the current directory.
    pub fn parse(yaml_content: &str) -> Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(yaml_content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parse a manifest from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut manifest = Self::parse(&content)?;
        manifest.base_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => current_dir(),
        };
        debug!(
            "loaded {} packages from {}",
            manifest.packages.len(),
            path.display()
        );
        Ok(manifest)
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn validate(&self) -> Result<()> {
        if let Some(spec) = self.packages.iter().find(|spec| spec.name.trim().is_empty()) {
            return Err(Error::config(
                None,
                format!("package names cannot be empty (srcdir: {:?})", spec.srcdir),
            ));
        }
        if self.settings.jobs == Some(0) {
            return Err(Error::config(None, "jobs must be at least 1"));
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// The directory receiving the subcommand logs.
    pub fn log_dir(&self) -> PathBuf {
        match &self.settings.log_dir {
            Some(dir) => self.resolve(dir),
            None => defaults::default_log_dir(&self.base_dir),
        }
    }

    /// The directory archives are downloaded to.
    pub fn cache_dir(&self) -> PathBuf {
        match &self.settings.cache_dir {
            Some(dir) => self.resolve(dir),
            None => defaults::default_cache_dir(),
        }
    }

    pub fn import_options(&self) -> ImportOptions {
        ImportOptions {
            only_local: self.settings.only_local,
            update: self.settings.update,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        match self.settings.retries {
            Some(retries) => RetryPolicy::with_retries(retries),
            None => RetryPolicy::default(),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let mut config = SchedulerConfig::default()
            .with_keep_going(self.settings.keep_going)
            .with_import_options(self.import_options());
        if let Some(jobs) = self.settings.jobs {
            config = config.with_jobs(jobs);
        }
        config
    }

    /// Mail settings with the log directory filled in.
    pub fn mail_config(&self) -> Option<MailConfig> {
        self.settings.mail.clone().map(|mut mail| {
            if mail.log_dir.is_none() {
                mail.log_dir = Some(self.log_dir());
            }
            mail
        })
    }

    /// Registers every declared package, in declaration order.
    pub fn into_registry(self, cache_dir: &Path) -> Result<Registry> {
        let mut registry = Registry::new();
        for spec in &self.packages {
            let srcdir = spec
                .srcdir
                .clone()
                .unwrap_or_else(|| PathBuf::from(&spec.name));
            let prefix = spec
                .prefix
                .clone()
                .unwrap_or_else(|| PathBuf::from("install"));

            let mut package = Package::new(&spec.name)
                .with_srcdir(self.resolve(&srcdir))
                .with_prefix(self.resolve(&prefix))
                .with_dependencies(&spec.depends)
                .with_steps(spec.steps.clone());
            if let Some(import) = &spec.import {
                let importer = import
                    .build(&self.base_dir, cache_dir)
                    .map_err(|e| attribute(e, &spec.name))?;
                package = package.with_boxed_importer(importer);
            }
            registry.register(package)?;
        }
        Ok(registry)
    }
}

/// Attributes an unattributed configuration error to `package`.
fn attribute(error: Error, package: &str) -> Error {
    match error {
        Error::Config { package: None, message } => Error::config(Some(package), message),
        other => other,
    }
}
