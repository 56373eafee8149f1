// src/lib.rs

//! Layerscan
//!
//! Installed-package inventory extraction for container image layers.
//! Given the files of a filesystem layer, layerscan identifies installed
//! packages and their versions from package-manager databases, producing a
//! de-duplicated list ready for vulnerability matching.
//!
//! # Architecture
//!
//! - Detectors: one per package database format, behind `PackagesDetector`
//! - Registry: explicit name → detector mapping built at startup
//! - Layers: tarballs or directories reduced to the files detectors need
//! - Scanner: per-layer detection, parent inheritance, installed/removed diffs

pub mod config;
pub mod diagnostics;
mod error;
pub mod layer;
pub mod packages;
pub mod scan;
pub mod version;

pub use config::ScanConfig;
pub use diagnostics::{CollectingSink, ScanWarning, TracingSink, WarningSink};
pub use error::{Error, Result};
pub use packages::{DetectorRegistry, DpkgDetector, FileMap, Package, PackagesDetector};
pub use scan::{ImageReport, LayerReport, PackageDiff, Scanner};
pub use version::DebVersion;
