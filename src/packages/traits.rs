// src/packages/traits.rs

//! Common types and traits for installed-package detectors

use crate::error::Result;
use crate::version::DebVersion;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Contents of one layer: relative path (no leading `/`) to raw file bytes
pub type FileMap = HashMap<String, Vec<u8>>;

/// An installed package found in a layer
///
/// Two records are equal when their `key()`s are: the version is compared
/// by its canonical string, so `1.0` and `1.00` are different records even
/// though dpkg orders them as equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: DebVersion,
}

impl Package {
    pub fn new(name: impl Into<String>, version: DebVersion) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Identity used for de-duplication: `name|version`
    pub fn key(&self) -> String {
        format!("{}|{}", self.name, self.version)
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version.to_string() == other.version.to_string()
    }
}

impl Eq for Package {}

/// Common interface for installed-package detectors (dpkg, and future formats)
///
/// Implementations must be pure with respect to their input: all state
/// lives inside a single `detect` call, so one detector can serve many
/// layers concurrently.
pub trait PackagesDetector: Send + Sync {
    /// Extract the packages recorded in the given layer files
    ///
    /// Returns an empty list when the files this detector needs are absent.
    fn detect(&self, data: &FileMap) -> Result<Vec<Package>>;

    /// Relative paths (no leading `/`) this detector reads
    fn required_files(&self) -> &'static [&'static str];
}
