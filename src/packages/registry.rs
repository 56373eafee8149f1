// src/packages/registry.rs

//! Detector registry
//!
//! Maps stable detector names (such as `"dpkg"`) to detector instances.
//! Orchestration builds the registry explicitly at startup with
//! [`DetectorRegistry::with_defaults`] and runs every registered detector
//! against each layer snapshot.

use crate::diagnostics::WarningSink;
use crate::error::{Error, Result};
use crate::packages::dpkg::{self, DpkgDetector};
use crate::packages::traits::{FileMap, Package, PackagesDetector};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Name-indexed set of installed-package detectors
#[derive(Default, Clone)]
pub struct DetectorRegistry {
    detectors: BTreeMap<String, Arc<dyn PackagesDetector>>,
}

impl DetectorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding every built-in detector
    pub fn with_defaults(sink: Arc<dyn WarningSink>) -> Self {
        let mut registry = Self::new();
        registry.register(dpkg::DETECTOR_NAME, Arc::new(DpkgDetector::with_sink(sink)));
        registry
    }

    /// Register a detector under `name`
    ///
    /// Returns `false` and keeps the existing detector if the name is
    /// already taken.
    pub fn register(&mut self, name: &str, detector: Arc<dyn PackagesDetector>) -> bool {
        if self.detectors.contains_key(name) {
            debug!("Detector '{}' already registered, ignoring", name);
            return false;
        }
        self.detectors.insert(name.to_string(), detector);
        true
    }

    /// Look up a detector by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn PackagesDetector>> {
        self.detectors.get(name)
    }

    /// Registered detector names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.detectors.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// A registry containing only the named detectors
    pub fn restrict(&self, names: &[String]) -> Result<Self> {
        let mut restricted = Self::new();
        for name in names {
            let detector = self
                .detectors
                .get(name)
                .ok_or_else(|| Error::UnknownDetector(name.clone()))?;
            restricted.register(name, Arc::clone(detector));
        }
        Ok(restricted)
    }

    /// Sorted union of the files every registered detector reads
    pub fn required_files(&self) -> Vec<String> {
        let files: BTreeSet<&str> = self
            .detectors
            .values()
            .flat_map(|d| d.required_files().iter().copied())
            .collect();
        files.into_iter().map(str::to_string).collect()
    }

    /// Whether the layer contains any file a registered detector reads
    pub fn has_required_files(&self, data: &FileMap) -> bool {
        self.detectors
            .values()
            .flat_map(|d| d.required_files().iter())
            .any(|path| data.contains_key(*path))
    }

    /// Run every detector over the layer and merge the results
    ///
    /// Packages are de-duplicated by key and sorted by name, then version.
    pub fn detect(&self, data: &FileMap) -> Result<Vec<Package>> {
        let mut merged: BTreeMap<String, Package> = BTreeMap::new();

        for (name, detector) in &self.detectors {
            let packages = detector.detect(data)?;
            debug!("Detector '{}' found {} packages", name, packages.len());
            for pkg in packages {
                merged.entry(pkg.key()).or_insert(pkg);
            }
        }

        let mut packages: Vec<Package> = merged.into_values().collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.version.cmp(&b.version)));
        Ok(packages)
    }
}
