// src/diagnostics.rs

//! Recoverable scan warnings
//!
//! Detectors report data problems (such as an unparseable version) through a
//! [`WarningSink`] they are constructed with, instead of a process-wide
//! logger. The default sink forwards to `tracing`; tests use
//! [`CollectingSink`] to assert on what was reported.

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// A recoverable problem found while scanning a layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanWarning {
    /// A version string failed to parse; the field was left unset
    InvalidVersion {
        detector: &'static str,
        package: String,
        version: String,
        reason: String,
    },
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanWarning::InvalidVersion {
                detector,
                package,
                version,
                reason,
            } => write!(
                f,
                "{}: could not parse version '{}' of package '{}': {}. skipping",
                detector, version, package, reason
            ),
        }
    }
}

/// Receiver for recoverable scan warnings
pub trait WarningSink: Send + Sync {
    fn warn(&self, warning: ScanWarning);
}

/// Forwards warnings to the `tracing` subscriber at WARN level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl WarningSink for TracingSink {
    fn warn(&self, warning: ScanWarning) {
        warn!("{}", warning);
    }
}

/// Stores warnings in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    warnings: Mutex<Vec<ScanWarning>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of every warning received so far
    pub fn warnings(&self) -> Vec<ScanWarning> {
        self.warnings
            .lock()
            .map(|w| w.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl WarningSink for CollectingSink {
    fn warn(&self, warning: ScanWarning) {
        let mut warnings = self
            .warnings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        warnings.push(warning);
    }
}

/// The sink used when the caller does not provide one
pub fn default_sink() -> Arc<dyn WarningSink> {
    Arc::new(TracingSink)
}
