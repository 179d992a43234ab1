//! Mercurial importer

use log::debug;

use super::{
    checkout_location, prepare_checkout_target, require_working_copy, verify_origin, ImportContext, ImportOptions,
    Importer,
};
use crate::error::Result;
use crate::subcommand::RunOptions;

#[derive(Debug, Clone)]
pub struct HgImporter {
    url: String,
    branch: Option<String>,
    repository_id: String,
}

impl HgImporter {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            repository_id: format!("hg:{}", url),
            url,
            branch: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    fn identify(&self, ctx: &ImportContext<'_>) -> Result<String> {
        let output = ctx.run("hg", ["id", "-i"], &RunOptions::in_dir(ctx.srcdir))?;
        Ok(output.trim().to_string())
    }
}

impl Importer for HgImporter {
    fn kind(&self) -> &'static str {
        "hg"
    }

    fn repository_id(&self) -> &str {
        &self.repository_id
    }

    fn update(&self, ctx: &ImportContext<'_>, options: &ImportOptions) -> Result<bool> {
        require_working_copy(ctx, ".hg", "Mercurial")?;
        let here = RunOptions::in_dir(ctx.srcdir);

        let default = ctx.run("hg", ["paths", "default"], &here)?;
        verify_origin(ctx, "Mercurial", &default, &self.url)?;

        let before = self.identify(ctx)?;
        if options.only_local {
            debug!("{}: not pulling from {}", ctx.package, self.url);
        } else {
            ctx.run("hg", ["pull", self.url.as_str()], &here.clone().retry(true))?;
        }
        match &self.branch {
            Some(branch) => ctx.run("hg", ["update", branch.as_str()], &here)?,
            None => ctx.run("hg", ["update"], &here)?,
        };
        Ok(before != self.identify(ctx)?)
    }

    fn checkout(&self, ctx: &ImportContext<'_>) -> Result<()> {
        prepare_checkout_target(ctx)?;
        let (parent, name) = checkout_location(ctx)?;

        let mut args = vec!["clone".to_string()];
        if let Some(branch) = &self.branch {
            args.push("-u".to_string());
            args.push(branch.clone());
        }
        args.push(self.url.clone());
        args.push(name);
        ctx.run("hg", &args, &RunOptions::in_dir(parent).retry(true))?;
        Ok(())
    }
}
