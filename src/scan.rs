// src/scan.rs

//! Image scanning
//!
//! Runs the detector registry over an ordered list of layers (base layer
//! first) and works out which packages each layer installs or removes.
//!
//! A layer that contains none of the files the detectors read (for example
//! an application layer that only adds `/app`) has the same packages as its
//! parent. A layer that does contain them is authoritative: dpkg rewrites
//! the whole status file on every install or removal.

use crate::config::ScanConfig;
use crate::error::Result;
use crate::layer::{LayerSource, LoadedLayer};
use crate::packages::{DetectorRegistry, FileMap, Package};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Packages added and removed by a layer relative to its parent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageDiff {
    pub installed: Vec<Package>,
    pub removed: Vec<Package>,
}

impl PackageDiff {
    /// Compare two package sets by key
    pub fn between(parent: &[Package], child: &[Package]) -> Self {
        let parent: BTreeMap<String, &Package> = parent.iter().map(|p| (p.key(), p)).collect();
        let child: BTreeMap<String, &Package> = child.iter().map(|p| (p.key(), p)).collect();

        let installed = child
            .iter()
            .filter(|(key, _)| !parent.contains_key(*key))
            .map(|(_, p)| (*p).clone())
            .collect();
        let removed = parent
            .iter()
            .filter(|(key, _)| !child.contains_key(*key))
            .map(|(_, p)| (*p).clone())
            .collect();

        Self { installed, removed }
    }

    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.removed.is_empty()
    }
}

/// Detection output for a single layer, before parent resolution
#[derive(Debug, Clone)]
pub struct DetectedLayer {
    pub source: LayerSource,
    pub digest: Option<String>,
    /// `None` when the layer holds none of the detectors' files
    pub packages: Option<Vec<Package>>,
}

/// Packages present once a layer is applied
#[derive(Debug, Clone, Serialize)]
pub struct LayerReport {
    pub source: LayerSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// True when the package set was carried over from the parent layer
    pub inherited: bool,
    pub packages: Vec<Package>,
    pub diff: PackageDiff,
}

/// Result of scanning an ordered set of layers
#[derive(Debug, Clone, Serialize)]
pub struct ImageReport {
    pub scanned_at: DateTime<Utc>,
    pub detectors: Vec<String>,
    pub layers: Vec<LayerReport>,
}

impl ImageReport {
    /// Packages present in the topmost layer
    pub fn packages(&self) -> &[Package] {
        self.layers.last().map(|l| l.packages.as_slice()).unwrap_or(&[])
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs detectors over layers
pub struct Scanner {
    registry: DetectorRegistry,
    config: ScanConfig,
}

impl Scanner {
    /// Create a scanner using the detectors `config` selects from `registry`
    pub fn new(registry: &DetectorRegistry, config: ScanConfig) -> Result<Self> {
        let registry = config.select(registry)?;
        Ok(Self { registry, config })
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    /// Detect packages in one layer's files
    ///
    /// Returns `None` when none of the required files are present.
    pub fn detect_files(&self, files: &FileMap) -> Result<Option<Vec<Package>>> {
        if !self.registry.has_required_files(files) {
            return Ok(None);
        }
        self.registry.detect(files).map(Some)
    }

    fn detect_loaded(&self, layer: LoadedLayer) -> Result<DetectedLayer> {
        let packages = self.detect_files(&layer.files)?;
        debug!(
            "Layer {}: {}",
            layer.source.path().display(),
            match &packages {
                Some(p) => format!("{} packages", p.len()),
                None => "no package database".to_string(),
            }
        );
        Ok(DetectedLayer {
            source: layer.source,
            digest: layer.digest,
            packages,
        })
    }

    fn load_and_detect(&self, source: &LayerSource, required: &[String]) -> Result<DetectedLayer> {
        let layer = source.load(required, self.config.max_file_size)?;
        self.detect_loaded(layer)
    }

    /// Scan layers on disk, base layer first
    pub fn scan_layers(&self, sources: &[LayerSource]) -> Result<ImageReport> {
        let required = self.registry.required_files();

        let detected: Vec<DetectedLayer> = if self.config.parallel {
            sources
                .par_iter()
                .map(|source| self.load_and_detect(source, &required))
                .collect::<Result<_>>()?
        } else {
            sources
                .iter()
                .map(|source| self.load_and_detect(source, &required))
                .collect::<Result<_>>()?
        };

        Ok(self.assemble(detected))
    }

    /// Resolve inheritance and diffs for detected layers, base layer first
    pub fn assemble(&self, detected: Vec<DetectedLayer>) -> ImageReport {
        let mut layers: Vec<LayerReport> = Vec::with_capacity(detected.len());

        for layer in detected {
            let parent: &[Package] = layers.last().map(|l| l.packages.as_slice()).unwrap_or(&[]);
            let (packages, inherited) = match layer.packages {
                Some(packages) => (packages, false),
                None => (parent.to_vec(), true),
            };
            let diff = PackageDiff::between(parent, &packages);

            layers.push(LayerReport {
                source: layer.source,
                digest: layer.digest,
                inherited,
                packages,
                diff,
            });
        }

        let report = ImageReport {
            scanned_at: Utc::now(),
            detectors: self.registry.names().into_iter().map(str::to_string).collect(),
            layers,
        };
        info!(
            "Scanned {} layers, {} packages in final layer",
            report.layers.len(),
            report.packages().len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::default_sink;
    use crate::packages::dpkg::DPKG_STATUS_PATH;
    use crate::version::DebVersion;
    use std::path::PathBuf;

    fn pkg(name: &str, version: &str) -> Package {
        Package::new(name, DebVersion::parse(version).unwrap())
    }

    fn scanner() -> Scanner {
        let registry = DetectorRegistry::with_defaults(default_sink());
        Scanner::new(&registry, ScanConfig::default()).unwrap()
    }

    fn detected(name: &str, packages: Option<Vec<Package>>) -> DetectedLayer {
        DetectedLayer {
            source: LayerSource::Directory(PathBuf::from(name)),
            digest: None,
            packages,
        }
    }

    #[test]
    fn test_diff_between() {
        let parent = vec![pkg("bash", "5.1-2"), pkg("zlib", "1.2.11")];
        let child = vec![pkg("bash", "5.1-2"), pkg("zlib", "1.2.13"), pkg("curl", "7.88.1-10")];

        let diff = PackageDiff::between(&parent, &child);
        assert_eq!(diff.installed, vec![pkg("curl", "7.88.1-10"), pkg("zlib", "1.2.13")]);
        assert_eq!(diff.removed, vec![pkg("zlib", "1.2.11")]);
        assert!(PackageDiff::between(&child, &child).is_empty());
    }

    #[test]
    fn test_detect_files_without_database() {
        let mut files = FileMap::new();
        files.insert("app/main.py".to_string(), b"print()".to_vec());
        assert_eq!(scanner().detect_files(&files).unwrap(), None);
    }

    #[test]
    fn test_detect_files_with_database() {
        let mut files = FileMap::new();
        files.insert(DPKG_STATUS_PATH.to_string(), b"Package: tar\nVersion: 1.34+dfsg-1\n".to_vec());
        assert_eq!(
            scanner().detect_files(&files).unwrap(),
            Some(vec![pkg("tar", "1.34+dfsg-1")])
        );
    }

    #[test]
    fn test_assemble_inherits_and_diffs() {
        let report = scanner().assemble(vec![
            detected("base", Some(vec![pkg("bash", "5.1-2"), pkg("dash", "0.5.11")])),
            detected("app", None),
            detected("cleanup", Some(vec![pkg("bash", "5.1-2")])),
        ]);

        assert_eq!(report.detectors, vec!["dpkg"]);
        assert_eq!(report.layers.len(), 3);

        let base = &report.layers[0];
        assert!(!base.inherited);
        assert_eq!(base.diff.installed.len(), 2);
        assert!(base.diff.removed.is_empty());

        let app = &report.layers[1];
        assert!(app.inherited);
        assert_eq!(app.packages, base.packages);
        assert!(app.diff.is_empty());

        let cleanup = &report.layers[2];
        assert_eq!(cleanup.diff.removed, vec![pkg("dash", "0.5.11")]);
        assert_eq!(report.packages(), &[pkg("bash", "5.1-2")]);
    }

    #[test]
    fn test_empty_image() {
        let report = scanner().assemble(Vec::new());
        assert!(report.packages().is_empty());
    }

    #[test]
    fn test_report_json() {
        let report = scanner().assemble(vec![detected("base", Some(vec![pkg("bash", "5.1-2")]))]);
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["layers"][0]["packages"][0]["version"], "5.1-2");
        assert_eq!(value["layers"][0]["source"]["kind"], "directory");
        assert!(value["layers"][0].get("digest").is_none());
    }
}
