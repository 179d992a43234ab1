//! # Order Command Implementation
//!
//! This module implements the `order` subcommand, which prints the order in
//! which the packages of the manifest would be built, or with `--tree` the
//! dependency tree of every top-level package.
//!
//! Cycles and unknown dependencies are reported exactly as `build` would
//! report them. This command never runs anything.

use std::borrow::Cow;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ptree::{print_tree, TreeItem};

use metabuild::config::Manifest;
use metabuild::defaults;
use metabuild::graph::DependencyGraph;
use metabuild::registry::Registry;

/// Print the order in which packages are built
#[derive(Args, Debug)]
pub struct OrderArgs {
    /// Path to the manifest describing the packages.
    #[arg(short, long, value_name = "FILE", default_value = defaults::MANIFEST_FILE)]
    pub manifest: PathBuf,

    /// Show the dependency tree of each top-level package instead.
    #[arg(long)]
    pub tree: bool,
}

/// Execute the `order` command.
pub fn execute(args: OrderArgs) -> Result<()> {
    let manifest = Manifest::from_file(&args.manifest)
        .with_context(|| format!("Failed to load manifest from {}", args.manifest.display()))?;
    let cache_dir = manifest.cache_dir();
    let registry = manifest.into_registry(&cache_dir)?;
    let graph = DependencyGraph::build(&registry)?;

    if args.tree {
        for root in tree_roots(&registry, &graph) {
            print_tree(&root).context("Failed to display tree")?;
        }
    } else {
        for name in build_order(&registry, &graph) {
            println!("{}", name);
        }
    }
    Ok(())
}

fn build_order<'a>(registry: &'a Registry, graph: &DependencyGraph) -> Vec<&'a str> {
    let names = registry.names();
    graph
        .topological_order()
        .iter()
        .map(|&index| names[index])
        .collect()
}

/// One tree per package that nothing depends on.
fn tree_roots(registry: &Registry, graph: &DependencyGraph) -> Vec<TreeNode> {
    let names = registry.names();
    (0..graph.len())
        .filter(|&index| graph.dependents(index).is_empty())
        .map(|index| build_tree_node(&names, graph, index))
        .collect()
}

fn build_tree_node(names: &[&str], graph: &DependencyGraph, index: usize) -> TreeNode {
    TreeNode {
        label: names[index].to_string(),
        children: graph
            .dependencies(index)
            .into_iter()
            .map(|dependency| build_tree_node(names, graph, dependency))
            .collect(),
    }
}

/// Tree node structure for ptree visualization
#[derive(Clone, Debug)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _style: &ptree::Style) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        Cow::Borrowed(&self.children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const MANIFEST: &str = r#"
packages:
  - name: app
    depends: [lib, tools]
  - name: lib
    depends: [base]
  - name: base
  - name: tools
    depends: [base]
  - name: docs
"#;

    fn registry() -> Registry {
        Manifest::parse(MANIFEST)
            .unwrap()
            .into_registry(Path::new("/cache"))
            .unwrap()
    }

    #[test]
    fn test_build_order() {
        let registry = registry();
        let graph = DependencyGraph::build(&registry).unwrap();
        assert_eq!(
            build_order(&registry, &graph),
            vec!["base", "lib", "tools", "app", "docs"]
        );
    }

    #[test]
    fn test_tree_roots() {
        let registry = registry();
        let graph = DependencyGraph::build(&registry).unwrap();
        let roots = tree_roots(&registry, &graph);

        let labels: Vec<&str> = roots.iter().map(|node| node.label.as_str()).collect();
        assert_eq!(labels, vec!["app", "docs"]);

        let app = &roots[0];
        let children: Vec<&str> = app.children.iter().map(|node| node.label.as_str()).collect();
        assert_eq!(children, vec!["lib", "tools"]);
        assert_eq!(app.children[0].children[0].label, "base");
    }

    #[test]
    fn test_execute_missing_manifest() {
        let args = OrderArgs {
            manifest: PathBuf::from("/nonexistent/metabuild.yaml"),
            tree: false,
        };
        let error = execute(args).unwrap_err();
        assert!(error.to_string().contains("Failed to load manifest"));
    }
}
