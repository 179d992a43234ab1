//! Git importer
//!
//! Uses the system `git`, so SSH keys, credential helpers and anything else
//! configured in `~/.gitconfig` apply.

use log::{debug, info};

use super::{
    checkout_location, prepare_checkout_target, require_working_copy, verify_origin, ImportContext, ImportOptions,
    Importer,
};
use crate::error::{Error, Result};
use crate::subcommand::RunOptions;

#[derive(Debug, Clone)]
pub struct GitImporter {
    url: String,
    branch: Option<String>,
    remote: String,
    repository_id: String,
}

impl GitImporter {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            repository_id: format!("git:{}", url),
            url,
            branch: None,
            remote: "origin".to_string(),
        }
    }

    /// Tracks `branch` instead of the remote's default branch.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Name of the remote in the working copy. Default: `origin`.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    fn head(&self, ctx: &ImportContext<'_>) -> Result<String> {
        let output = ctx.run("git", ["rev-parse", "HEAD"], &RunOptions::in_dir(ctx.srcdir))?;
        Ok(output.trim().to_string())
    }
}

impl Importer for GitImporter {
    fn kind(&self) -> &'static str {
        "git"
    }

    fn repository_id(&self) -> &str {
        &self.repository_id
    }

    fn update(&self, ctx: &ImportContext<'_>, options: &ImportOptions) -> Result<bool> {
        require_working_copy(ctx, ".git", "git")?;
        let here = RunOptions::in_dir(ctx.srcdir);

        let config_key = format!("remote.{}.url", self.remote);
        let origin = match ctx.run("git", ["config", "--get", config_key.as_str()], &here) {
            Ok(origin) => origin,
            // `git config --get` exits with 1 when the key is unset
            Err(Error::SubcommandFailed { .. }) => {
                return Err(ctx.config_error(format!(
                    "{} has no remote {}",
                    ctx.srcdir.display(),
                    self.remote
                )))
            }
            Err(error) => return Err(error),
        };
        verify_origin(ctx, "git", &origin, &self.url)?;

        let before = self.head(ctx)?;
        if options.only_local {
            debug!("{}: not fetching from {}", ctx.package, self.remote);
        } else {
            ctx.run("git", ["fetch", self.remote.as_str()], &here.clone().retry(true))?;
        }

        let target = match &self.branch {
            Some(branch) => format!("{}/{}", self.remote, branch),
            None => "@{upstream}".to_string(),
        };
        ctx.run("git", ["merge", "--ff-only", target.as_str()], &here)?;

        let after = self.head(ctx)?;
        if before != after {
            info!("{}: updated from {} to {}", ctx.package, before, after);
        }
        Ok(before != after)
    }

    fn checkout(&self, ctx: &ImportContext<'_>) -> Result<()> {
        prepare_checkout_target(ctx)?;
        let (parent, name) = checkout_location(ctx)?;

        let mut args = vec!["clone".to_string()];
        if let Some(branch) = &self.branch {
            args.push("--branch".to_string());
            args.push(branch.clone());
        }
        args.extend([
            "--origin".to_string(),
            self.remote.clone(),
            self.url.clone(),
            name,
        ]);
        ctx.run("git", &args, &RunOptions::in_dir(parent).retry(true))?;
        Ok(())
    }
}
