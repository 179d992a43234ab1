//! Subversion importer

use log::warn;

use super::{
    checkout_location, field, prepare_checkout_target, require_working_copy, verify_origin, ImportContext,
    ImportOptions, Importer,
};
use crate::error::Result;
use crate::subcommand::RunOptions;

#[derive(Debug, Clone)]
pub struct SvnImporter {
    url: String,
    repository_id: String,
}

impl SvnImporter {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            repository_id: format!("svn:{}", url),
            url,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn info(&self, ctx: &ImportContext<'_>) -> Result<String> {
        ctx.run("svn", ["info", "--non-interactive"], &RunOptions::in_dir(ctx.srcdir))
    }
}

impl Importer for SvnImporter {
    fn kind(&self) -> &'static str {
        "svn"
    }

    fn repository_id(&self) -> &str {
        &self.repository_id
    }

    fn update(&self, ctx: &ImportContext<'_>, options: &ImportOptions) -> Result<bool> {
        if options.only_local {
            warn!(
                "{}: the Subversion importer does not support local updates, skipping",
                ctx.package
            );
            return Ok(false);
        }
        require_working_copy(ctx, ".svn", "Subversion")?;

        let info = self.info(ctx)?;
        let url = field(&info, "URL")
            .ok_or_else(|| ctx.config_error(format!("cannot find the URL of {}", ctx.srcdir.display())))?;
        verify_origin(ctx, "Subversion", url, &self.url)?;
        let before = field(&info, "Revision").map(str::to_string);

        ctx.run(
            "svn",
            ["up", "--non-interactive"],
            &RunOptions::in_dir(ctx.srcdir).retry(true),
        )?;

        let info = self.info(ctx)?;
        let after = field(&info, "Revision").map(str::to_string);
        Ok(before != after)
    }

    fn checkout(&self, ctx: &ImportContext<'_>) -> Result<()> {
        prepare_checkout_target(ctx)?;
        let (parent, name) = checkout_location(ctx)?;
        ctx.run(
            "svn",
            ["co", "--non-interactive", self.url.as_str(), name.as_str()],
            &RunOptions::in_dir(parent).retry(true),
        )?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::importer::test_support::{runner, script};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_update_detects_revision_change() {
        let temp = TempDir::new().unwrap();
        let runner = runner(&temp.path().join("log"));
        let svn = script(
            temp.path(),
            "fake-svn",
            r#"case "$1" in
  info) read rev < REV; echo "URL: svn://example.com/repo/trunk"; echo "Revision: $rev" ;;
  up) if [ -f NEXT ]; then read rev < NEXT; echo "$rev" > REV; fi ;;
esac"#,
        );
        runner.tools().set_program("svn", svn.to_string_lossy()).unwrap();
        let srcdir = temp.path().join("base");
        fs::create_dir_all(srcdir.join(".svn")).unwrap();
        fs::write(srcdir.join("REV"), "10\n").unwrap();
        let ctx = ImportContext::new("base", &srcdir, &runner);
        let importer = SvnImporter::new("svn://example.com/repo/trunk/");

        assert!(!importer.update(&ctx, &ImportOptions::default()).unwrap());
        fs::write(srcdir.join("NEXT"), "11\n").unwrap();
        assert!(importer.update(&ctx, &ImportOptions::default()).unwrap());

        let other = SvnImporter::new("svn://example.com/repo/branches/b");
        assert!(other.update(&ctx, &ImportOptions::default()).unwrap_err().is_config());
    }

    #[test]
    fn test_only_local_update_is_skipped() {
        let temp = TempDir::new().unwrap();
        let runner = runner(&temp.path().join("log"));
        let ctx = ImportContext::new("base", temp.path(), &runner);
        let options = ImportOptions {
            only_local: true,
            ..ImportOptions::default()
        };

        assert!(!SvnImporter::new("svn://example.com/repo")
            .update(&ctx, &options)
            .unwrap());
        assert!(runner.log_files().is_empty());
    }
}
