// src/config.rs

//! Runtime scan options

use crate::error::{Error, Result};
use crate::packages::DetectorRegistry;

/// Default limit for a single extracted file (512 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 512 * 1024 * 1024;

/// Options controlling a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Detectors to run; empty means every registered detector
    pub detectors: Vec<String>,
    /// Largest file, in bytes, that will be read out of a layer
    pub max_file_size: u64,
    /// Load and detect layers concurrently
    pub parallel: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            detectors: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            parallel: true,
        }
    }
}

impl ScanConfig {
    /// Check the options against the available detectors
    pub fn validate(&self, registry: &DetectorRegistry) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(Error::ConfigError(
                "max file size must be greater than zero".to_string(),
            ));
        }
        if let Some(unknown) = self.detectors.iter().find(|d| registry.get(d).is_none()) {
            return Err(Error::UnknownDetector(unknown.clone()));
        }
        Ok(())
    }

    /// The registry narrowed to the configured detectors
    pub fn select(&self, registry: &DetectorRegistry) -> Result<DetectorRegistry> {
        self.validate(registry)?;
        if self.detectors.is_empty() {
            Ok(registry.clone())
        } else {
            registry.restrict(&self.detectors)
        }
    }
}
