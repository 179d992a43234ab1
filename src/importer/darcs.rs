//! Darcs importer

use std::fs;

use log::warn;

use super::{checkout_location, prepare_checkout_target, verify_origin, ImportContext, ImportOptions, Importer};
use crate::error::Result;
use crate::subcommand::RunOptions;

#[derive(Debug, Clone)]
pub struct DarcsImporter {
    url: String,
    repository_id: String,
}

impl DarcsImporter {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            repository_id: format!("darcs:{}", url),
            url,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Importer for DarcsImporter {
    fn kind(&self) -> &'static str {
        "darcs"
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
                "{}: the darcs importer does not support local updates, skipping",
                ctx.package
            );
            return Ok(false);
        }

        let prefs = ctx.srcdir.join("_darcs").join("prefs").join("defaultrepo");
        if !prefs.exists() {
            return Err(ctx.config_error(format!(
                "{} is not a darcs working copy",
                ctx.srcdir.display()
            )));
        }
        let default = fs::read_to_string(&prefs)?;
        verify_origin(ctx, "darcs", &default, &self.url)?;

        ctx.run(
            "darcs",
            ["pull", "-a", self.url.as_str()],
            &RunOptions::in_dir(ctx.srcdir).retry(true),
        )?;
        Ok(true)
    }

    fn checkout(&self, ctx: &ImportContext<'_>) -> Result<()> {
        prepare_checkout_target(ctx)?;
        let (parent, name) = checkout_location(ctx)?;
        ctx.run(
            "darcs",
            ["get", self.url.as_str(), name.as_str()],
            &RunOptions::in_dir(parent).retry(true),
        )?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::importer::test_support::{runner, script};
    use tempfile::TempDir;

    #[test]
    fn test_update_checks_default_repository() {
        let temp = TempDir::new().unwrap();
        let runner = runner(&temp.path().join("log"));
        let record = temp.path().join("calls");
        let darcs = script(
            temp.path(),
            "fake-darcs",
            &format!("echo \"$*\" >> {}", record.display()),
        );
        runner.tools().set_program("darcs", darcs.to_string_lossy()).unwrap();
        let srcdir = temp.path().join("base");
        fs::create_dir_all(srcdir.join("_darcs").join("prefs")).unwrap();
        fs::write(
            srcdir.join("_darcs").join("prefs").join("defaultrepo"),
            "http://darcs.example.com/base\n",
        )
        .unwrap();
        let ctx = ImportContext::new("base", &srcdir, &runner);

        let importer = DarcsImporter::new("http://darcs.example.com/base");
        assert!(!importer.detects_changes());
        assert!(importer.update(&ctx, &ImportOptions::default()).unwrap());
        assert_eq!(
            fs::read_to_string(&record).unwrap(),
            "pull -a http://darcs.example.com/base\n"
        );

        let err = DarcsImporter::new("http://darcs.example.com/other")
            .update(&ctx, &ImportOptions::default())
            .unwrap_err();
        assert!(err.is_config());
    }
}
