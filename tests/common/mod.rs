//! Shared test utilities for integration and E2E tests.
//!
//! Add `mod common;` to a test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_manifest(manifests::SINGLE);
//!     fixture.command().arg("build").assert().success();
//! }
//! ```

use assert_cmd::cargo::cargo_bin_cmd;
use assert_fs::prelude::*;
use std::path::Path;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::manifests;
    pub use super::TestFixture;
}

/// Manifests used across test files.
#[allow(dead_code)]
pub mod manifests {
    /// One package writing a marker file in its source directory.
    pub const SINGLE: &str = r#"
packages:
  - name: base
    srcdir: src/base
    build: [["sh", "-c", "echo built > built.txt"]]
"#;

    /// `broken` fails to build; `app` depends on it, `other` does not.
    pub const ONE_FAILURE: &str = r#"
settings:
  jobs: 2
packages:
  - name: broken
    srcdir: src/broken
    build: [["sh", "-c", "exit 3"]]
  - name: app
    srcdir: src/app
    depends: [broken]
    build: [["sh", "-c", "echo built > built.txt"]]
  - name: other
    srcdir: src/other
    build: [["sh", "-c", "echo built > built.txt"]]
"#;

    /// Two packages depending on each other.
    pub const CYCLE: &str = r#"
packages:
  - name: a
    depends: [b]
  - name: b
    depends: [a]
"#;

    pub const INVALID_YAML: &str = "packages: [unclosed";
}

/// A temporary directory holding a manifest and package sources.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Writes `metabuild.yaml` and creates the `src/<name>` directory of
    /// every package it declares with an explicit `src/` srcdir.
    pub fn with_manifest(self, content: &str) -> Self {
        self.temp_dir
            .child("metabuild.yaml")
            .write_str(content)
            .expect("Failed to write manifest");
        for line in content.lines() {
            if let Some(srcdir) = line.trim().strip_prefix("srcdir: ") {
                self.temp_dir
                    .child(srcdir)
                    .create_dir_all()
                    .expect("Failed to create source directory");
            }
        }
        self
    }

    /// Add a file with the given path and content.
    #[allow(dead_code)]
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a child path in the temp directory.
    #[allow(dead_code)]
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// A `metabuild` command running in the fixture directory, without
    /// colors and with archives cached inside the fixture.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("metabuild");
        cmd.current_dir(self.path())
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .env("METABUILD_CACHE", self.path().join("cache"));
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
