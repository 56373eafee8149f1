// src/packages/mod.rs

//! Installed-package detection
//!
//! Each package database format implements the `PackagesDetector` trait.
//! The registry runs every detector against a layer's files.

pub mod dpkg;
pub mod registry;
pub mod traits;

pub use dpkg::DpkgDetector;
pub use registry::DetectorRegistry;
pub use traits::{FileMap, Package, PackagesDetector};
