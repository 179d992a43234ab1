//! CVS importer

use std::fs;

use log::warn;

use super::{checkout_location, prepare_checkout_target, ImportContext, ImportOptions, Importer};
use crate::error::{Error, Result};
use crate::subcommand::RunOptions;

/// Gets a module from a CVS repository.
#[derive(Debug, Clone)]
pub struct CvsImporter {
    root: String,
    module: String,
    update_options: Vec<String>,
    checkout_options: Vec<String>,
    repository_id: String,
}

impl CvsImporter {
    /// An importer for `module` in the repository `root`, e.g.
    /// `:ext:user@host:/cvsroot`.
    pub fn new(root: impl Into<String>, module: impl Into<String>) -> Result<Self> {
        let root = root.into();
        let module = module.into();
        if module.is_empty() {
            return Err(Error::config(None, "no module given for CVS repository"));
        }
        Ok(Self {
            repository_id: format!("cvs:{}:{}", root, module),
            root,
            module,
            update_options: vec!["-dP".to_string()],
            checkout_options: vec!["-P".to_string()],
        })
    }

    /// Options passed to `cvs up`. Default: `-dP`.
    pub fn with_update_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Options passed to `cvs co`. Default: `-P`.
    pub fn with_checkout_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checkout_options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn update_options(&self) -> &[String] {
        &self.update_options
    }

    pub fn checkout_options(&self) -> &[String] {
        &self.checkout_options
    }

    fn verify_working_copy(&self, ctx: &ImportContext<'_>) -> Result<()> {
        let admin = ctx.srcdir.join("CVS");
        let root_file = admin.join("Root");
        if !root_file.exists() {
            return Err(ctx.config_error(format!(
                "{} is not a CVS working copy",
                ctx.srcdir.display()
            )));
        }
        let root = fs::read_to_string(&root_file)?;
        let module = fs::read_to_string(admin.join("Repository")).unwrap_or_default();

        let root = comparable_root(root.trim_end());
        let module = module.trim_end();
        let expected_root = comparable_root(&self.root);
        if root != expected_root || module != self.module {
            return Err(ctx.config_error(format!(
                "checkout in {} is from {}:{}, was expecting {}:{}",
                ctx.srcdir.display(),
                root,
                module,
                expected_root,
                self.module
            )));
        }
        Ok(())
    }
}

/// Drops the access method and the optional `:` between host and path.
fn comparable_root(root: &str) -> String {
    root.strip_prefix(":ext:").unwrap_or(root).replace(':', "")
}

impl Importer for CvsImporter {
    fn kind(&self) -> &'static str {
        "cvs"
    }

    fn repository_id(&self) -> &str {
        &self.repository_id
    }

    fn detects_changes(&self) -> bool {
        false
    }

    fn update(&self, ctx: &ImportContext<'_>, options: &ImportOptions) -> Result<bool> {
        if options.only_local {
            warn!(
                "{}: the CVS importer does not support local updates, skipping",
                ctx.package
            );
            return Ok(false);
        }

        self.verify_working_copy(ctx)?;
        let mut args = vec!["up".to_string()];
        args.extend(self.update_options.iter().cloned());
        ctx.run("cvs", &args, &RunOptions::in_dir(ctx.srcdir).retry(true))?;
        Ok(true)
    }

    fn checkout(&self, ctx: &ImportContext<'_>) -> Result<()> {
        prepare_checkout_target(ctx)?;
        let (parent, name) = checkout_location(ctx)?;

        let mut args = vec![
            "-d".to_string(),
            self.root.clone(),
            "co".to_string(),
            "-d".to_string(),
            name,
        ];
        args.extend(self.checkout_options.iter().cloned());
        args.push(self.module.clone());
        ctx.run("cvs", &args, &RunOptions::in_dir(parent).retry(true))?;
        Ok(())
    }
}
