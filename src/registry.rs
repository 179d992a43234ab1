//! The set of declared packages
//!
//! A [`Registry`] is an ordinary owned value: build one, register packages in
//! it and hand it to the scheduler. Iteration follows registration order.
//! Dependencies are only checked when the dependency graph is built, so
//! packages may be registered in any order.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::failure::Failure;
use crate::package::Package;

#[derive(Debug, Default)]
pub struct Registry {
    packages: Vec<Package>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a package. Fails when a package with the same name exists.
    pub fn register(&mut self, package: Package) -> Result<()> {
        if self.index.contains_key(package.name()) {
            return Err(Error::DuplicateName {
                name: package.name().to_string(),
            });
        }
        self.index.insert(package.name().to_string(), self.packages.len());
        self.packages.push(package);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Package> {
        self.index.get(name).map(|&i| &self.packages[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Package> {
        self.index.get(name).map(|&i| &mut self.packages[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Packages in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.iter()
    }

    /// `(name, package)` pairs in registration order.
    pub fn each(&self) -> impl Iterator<Item = (&str, &Package)> {
        self.packages.iter().map(|package| (package.name(), package))
    }

    pub fn names(&self) -> Vec<&str> {
        self.packages.iter().map(Package::name).collect()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Removes every package.
    pub fn clear(&mut self) {
        self.packages.clear();
        self.index.clear();
    }

    /// Every recorded failure, by registration order of the packages and then
    /// by the order the failures were recorded in.
    pub fn failures(&self) -> Vec<Failure> {
        self.packages
            .iter()
            .flat_map(|package| package.failures().iter().cloned())
            .collect()
    }

    /// Forgets the outcome of a previous run.
    pub fn reset_outcomes(&mut self) {
        for package in &mut self.packages {
            package.reset_outcome();
        }
    }

    pub(crate) fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub(crate) fn by_index(&self, index: usize) -> &Package {
        &self.packages[index]
    }

    pub(crate) fn by_index_mut(&mut self, index: usize) -> &mut Package {
        &mut self.packages[index]
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a Package;
    type IntoIter = std::slice::Iter<'a, Package>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.iter()
    }
}
