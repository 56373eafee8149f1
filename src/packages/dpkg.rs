// src/packages/dpkg.rs

//! dpkg status database detector
//!
//! Reads `var/lib/dpkg/status`, a sequence of RFC 822-like paragraphs, one
//! per installed package. Only three fields matter here:
//!
//! - `Package:` starts a new package
//! - `Source:` names the source package and may carry its version, as in
//!   `Source: glibc (2.31-13)`
//! - `Version:` gives the binary package version
//!
//! A version given on the `Source:` line wins over the `Version:` field.
//! Debian advisories are keyed by source package and source version, which
//! omits binary-only rebuild suffixes such as `+b1`.

use crate::diagnostics::{ScanWarning, WarningSink, default_sink};
use crate::error::Result;
use crate::packages::traits::{FileMap, Package, PackagesDetector};
use crate::version::DebVersion;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Location of the dpkg status database inside a root filesystem
pub const DPKG_STATUS_PATH: &str = "var/lib/dpkg/status";

/// Name this detector is registered under
pub const DETECTOR_NAME: &str = "dpkg";

static SOURCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Source: (?P<name>[^\s]*)( \((?P<version>.*)\))?")
        .expect("dpkg Source pattern is valid")
});

/// Fields captured from a `Source:` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceField {
    pub name: String,
    pub version: Option<String>,
}

/// Parse a `Source:` line
///
/// Grammar: `Source: <name>[ (<version>)]`, where `<name>` is a run of
/// non-whitespace characters and `<version>` is everything between the
/// first ` (` and the last `)`. Returns `None` when the line is not a
/// `Source:` line.
pub fn parse_source_line(line: &str) -> Option<SourceField> {
    let caps = SOURCE_RE.captures(line)?;

    let name = caps
        .name("name")
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    let version = caps
        .name("version")
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty());

    Some(SourceField { name, version })
}

/// Package being assembled from the current paragraph
#[derive(Debug, Default)]
struct Candidate {
    name: String,
    version: Option<DebVersion>,
}

impl Candidate {
    fn named(name: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            version: None,
        }
    }

    fn is_complete(&self) -> bool {
        !self.name.is_empty() && self.version.is_some()
    }

    fn seal(self) -> Option<Package> {
        match self.version {
            Some(version) if !self.name.is_empty() => Some(Package::new(self.name, version)),
            _ => None,
        }
    }
}

/// Detects packages installed by dpkg
pub struct DpkgDetector {
    sink: Arc<dyn WarningSink>,
}

impl DpkgDetector {
    /// Create a detector that reports warnings through `tracing`
    pub fn new() -> Self {
        Self::with_sink(default_sink())
    }

    /// Create a detector that reports warnings to the given sink
    pub fn with_sink(sink: Arc<dyn WarningSink>) -> Self {
        Self { sink }
    }

    /// Parse the contents of a dpkg status file
    pub fn parse_status(&self, content: &str) -> Vec<Package> {
        let mut packages: BTreeMap<String, Package> = BTreeMap::new();
        let mut current: Option<Candidate> = None;

        for line in content.lines() {
            if let Some(name) = line.strip_prefix("Package: ") {
                // An unfinished previous paragraph is dropped here
                current = Some(Candidate::named(name));
            } else if line.starts_with("Source: ") {
                if let (Some(candidate), Some(source)) = (current.as_mut(), parse_source_line(line)) {
                    candidate.name = source.name;
                    if let Some(version) = source.version {
                        candidate.version = self.parse_version(&candidate.name, &version);
                    }
                }
            } else if let Some(version) = line.strip_prefix("Version: ") {
                if let Some(candidate) = current.as_mut() {
                    if candidate.version.is_none() {
                        candidate.version = self.parse_version(&candidate.name, version);
                    }
                }
            }

            if current.as_ref().is_some_and(Candidate::is_complete) {
                if let Some(pkg) = current.take().and_then(Candidate::seal) {
                    packages.insert(pkg.key(), pkg);
                }
            }
        }

        packages.into_values().collect()
    }

    fn parse_version(&self, package: &str, version: &str) -> Option<DebVersion> {
        match DebVersion::parse(version) {
            Ok(v) => Some(v),
            Err(e) => {
                let reason = match e {
                    crate::Error::InvalidVersion { reason, .. } => reason,
                    other => other.to_string(),
                };
                self.sink.warn(ScanWarning::InvalidVersion {
                    detector: DETECTOR_NAME,
                    package: package.to_string(),
                    version: version.trim().to_string(),
                    reason,
                });
                None
            }
        }
    }
}

impl Default for DpkgDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PackagesDetector for DpkgDetector {
    fn detect(&self, data: &FileMap) -> Result<Vec<Package>> {
        let Some(content) = data.get(DPKG_STATUS_PATH) else {
            return Ok(Vec::new());
        };

        let packages = self.parse_status(&String::from_utf8_lossy(content));
        debug!("dpkg: detected {} packages", packages.len());
        Ok(packages)
    }

    fn required_files(&self) -> &'static [&'static str] {
        &[DPKG_STATUS_PATH]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;

    fn status_map(content: &str) -> FileMap {
        let mut data = FileMap::new();
        data.insert(DPKG_STATUS_PATH.to_string(), content.as_bytes().to_vec());
        data
    }

    fn pairs(packages: &[Package]) -> Vec<(String, String)> {
        let mut out: Vec<_> = packages
            .iter()
            .map(|p| (p.name.clone(), p.version.to_string()))
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_missing_status_file_is_empty() {
        let detector = DpkgDetector::new();
        let mut data = FileMap::new();
        data.insert("etc/os-release".to_string(), b"ID=debian\n".to_vec());

        let packages = detector.detect(&data).unwrap();
        assert!(packages.is_empty());
    }

    #[test]
    fn test_basic_extraction() {
        let detector = DpkgDetector::new();
        let packages = detector
            .detect(&status_map("Package: foo\nVersion: 1.0\n"))
            .unwrap();

        assert_eq!(pairs(&packages), vec![("foo".to_string(), "1.0".to_string())]);
    }

    #[test]
    fn test_source_name_and_version_take_precedence() {
        let detector = DpkgDetector::new();
        let packages = detector
            .detect(&status_map("Package: foo\nSource: bar (2.0)\nVersion: 3.0-1\n"))
            .unwrap();

        assert_eq!(pairs(&packages), vec![("bar".to_string(), "2.0".to_string())]);
    }

    #[test]
    fn test_source_without_version_falls_back_to_version_field() {
        let detector = DpkgDetector::new();
        let packages = detector
            .detect(&status_map("Package: foo\nSource: bar\nVersion: 3.0-1\n"))
            .unwrap();

        assert_eq!(pairs(&packages), vec![("bar".to_string(), "3.0-1".to_string())]);
    }

    #[test]
    fn test_version_before_source_seals_with_binary_name() {
        // The paragraph seals as soon as name and version are known
        let detector = DpkgDetector::new();
        let packages = detector
            .detect(&status_map("Package: foo\nVersion: 3.0-1\nSource: bar (2.0)\n"))
            .unwrap();

        assert_eq!(pairs(&packages), vec![("foo".to_string(), "3.0-1".to_string())]);
    }

    #[test]
    fn test_duplicates_are_collapsed() {
        let detector = DpkgDetector::new();
        let content = "\
Package: libssl3
Source: openssl (3.0.11-1)
Version: 3.0.11-1~deb12u2

Package: openssl
Source: openssl (3.0.11-1)
Version: 3.0.11-1~deb12u2
";
        let packages = detector.detect(&status_map(content)).unwrap();
        assert_eq!(
            pairs(&packages),
            vec![("openssl".to_string(), "3.0.11-1".to_string())]
        );
    }

    #[test]
    fn test_malformed_version_is_skipped_and_reported() {
        let sink = CollectingSink::new();
        let detector = DpkgDetector::with_sink(sink.clone());
        let content = "\
Package: broken
Version: not-a-version

Package: good
Version: 1.2-3
";
        let packages = detector.detect(&status_map(content)).unwrap();
        assert_eq!(pairs(&packages), vec![("good".to_string(), "1.2-3".to_string())]);

        let warnings = sink.warnings();
        assert_eq!(warnings.len(), 1);
        match &warnings[0] {
            ScanWarning::InvalidVersion {
                detector,
                package,
                version,
                ..
            } => {
                assert_eq!(*detector, "dpkg");
                assert_eq!(package, "broken");
                assert_eq!(version, "not-a-version");
            }
        }
    }

    #[test]
    fn test_malformed_source_version_reports_captured_string() {
        let sink = CollectingSink::new();
        let detector = DpkgDetector::with_sink(sink.clone());
        let packages = detector
            .detect(&status_map("Package: foo\nSource: bar (oops)\nVersion: 1.0-1\n"))
            .unwrap();

        // Source left the version unset, so the Version field fills it
        assert_eq!(pairs(&packages), vec![("bar".to_string(), "1.0-1".to_string())]);
        assert_eq!(
            sink.warnings(),
            vec![ScanWarning::InvalidVersion {
                detector: "dpkg",
                package: "bar".to_string(),
                version: "oops".to_string(),
                reason: "upstream version does not start with a digit".to_string(),
            }]
        );
    }

    #[test]
    fn test_paragraph_without_version_is_dropped() {
        let detector = DpkgDetector::new();
        let content = "Package: orphan\nStatus: install ok installed\nPackage: real\nVersion: 2.0\n";
        let packages = detector.detect(&status_map(content)).unwrap();
        assert_eq!(pairs(&packages), vec![("real".to_string(), "2.0".to_string())]);
    }

    #[test]
    fn test_lines_before_any_package_are_ignored() {
        let detector = DpkgDetector::new();
        let content = "Version: 9.9\nSource: ghost (1.0)\nPackage: foo\nVersion: 1.0\n";
        let packages = detector.detect(&status_map(content)).unwrap();
        assert_eq!(pairs(&packages), vec![("foo".to_string(), "1.0".to_string())]);
    }

    #[test]
    fn test_realistic_status_paragraphs() {
        let detector = DpkgDetector::new();
        let content = "\
Package: base-files
Essential: yes
Status: install ok installed
Priority: required
Section: admin
Installed-Size: 340
Maintainer: Santiago Vila <sanvila@debian.org>
Architecture: amd64
Multi-Arch: foreign
Version: 12.4+deb12u5
Description: Debian base system miscellaneous files
 This package contains the basic filesystem hierarchy of a Debian system.

Package: libc6
Status: install ok installed
Architecture: amd64
Multi-Arch: same
Source: glibc
Version: 2.36-9+deb12u4
Depends: libgcc-s1

Package: bsdutils
Source: util-linux (2.38.1-5)
Version: 1:2.38.1-5+b1
";
        let packages = detector.detect(&status_map(content)).unwrap();
        assert_eq!(
            pairs(&packages),
            vec![
                ("base-files".to_string(), "12.4+deb12u5".to_string()),
                ("glibc".to_string(), "2.36-9+deb12u4".to_string()),
                ("util-linux".to_string(), "2.38.1-5".to_string()),
            ]
        );
    }

    #[test]
    fn test_crlf_line_endings() {
        let detector = DpkgDetector::new();
        let packages = detector
            .detect(&status_map("Package: foo\r\nVersion: 1.0\r\n"))
            .unwrap();
        assert_eq!(pairs(&packages), vec![("foo".to_string(), "1.0".to_string())]);
    }

    #[test]
    fn test_detect_is_idempotent() {
        let detector = DpkgDetector::new();
        let data = status_map("Package: a\nVersion: 1\n\nPackage: b\nSource: c (2)\n");
        let first = pairs(&detector.detect(&data).unwrap());
        let second = pairs(&detector.detect(&data).unwrap());
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_required_files() {
        assert_eq!(DpkgDetector::new().required_files(), &["var/lib/dpkg/status"]);
    }

    #[test]
    fn test_parse_source_line() {
        assert_eq!(
            parse_source_line("Source: glibc (2.36-9)"),
            Some(SourceField {
                name: "glibc".to_string(),
                version: Some("2.36-9".to_string()),
            })
        );
        assert_eq!(
            parse_source_line("Source: glibc"),
            Some(SourceField {
                name: "glibc".to_string(),
                version: None,
            })
        );
        assert_eq!(parse_source_line("Version: 1.0"), None);
    }

    #[test]
    fn test_parse_source_line_empty_parens() {
        let field = parse_source_line("Source: foo ()").unwrap();
        assert_eq!(field.name, "foo");
        assert_eq!(field.version, None);
    }
}
