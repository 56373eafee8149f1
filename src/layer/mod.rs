// src/layer/mod.rs

//! Layer snapshots
//!
//! Turns a layer on disk (a tarball, optionally compressed, or an unpacked
//! root filesystem directory) into the `FileMap` detectors consume. Only
//! the files detectors ask for are read.

use crate::error::{Error, Result};
use crate::packages::FileMap;
use flate2::read::GzDecoder;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::debug;
use walkdir::WalkDir;
use xz2::read::XzDecoder;

const GZIP_MAGIC: &[u8] = &[0x1F, 0x8B];
const XZ_MAGIC: &[u8] = &[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xB5, 0x2F, 0xFD];

/// Compression applied to a layer tarball
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
    Zstd,
}

impl Compression {
    /// Detect compression from the leading bytes of a stream
    pub fn detect(magic: &[u8]) -> Self {
        if magic.starts_with(GZIP_MAGIC) {
            Self::Gzip
        } else if magic.starts_with(XZ_MAGIC) {
            Self::Xz
        } else if magic.starts_with(ZSTD_MAGIC) {
            Self::Zstd
        } else {
            Self::None
        }
    }
}

/// Wrap a layer stream in the decoder its magic bytes call for
pub fn decompress<'a, R: Read + 'a>(reader: R) -> Result<Box<dyn Read + 'a>> {
    let mut reader = BufReader::new(reader);
    let compression = Compression::detect(reader.fill_buf()?);
    debug!("Layer compression: {:?}", compression);

    let reader: Box<dyn Read + 'a> = match compression {
        Compression::Gzip => Box::new(GzDecoder::new(reader)),
        Compression::Xz => Box::new(XzDecoder::new(reader)),
        Compression::Zstd => Box::new(zstd::Decoder::with_buffer(reader)?),
        Compression::None => Box::new(reader),
    };
    Ok(reader)
}

/// Strip the `./` and `/` prefixes tar entries commonly carry
pub fn normalize_path(path: &str) -> &str {
    path.trim_start_matches("./").trim_start_matches('/')
}

/// `path` is a required file itself or lies beneath a required directory
fn is_required(path: &str, required: &[String]) -> bool {
    required.iter().any(|r| {
        let r = normalize_path(r).trim_end_matches('/');
        path == r
            || path
                .strip_prefix(r)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Read the required files out of a layer tarball
///
/// A regular file is kept when its normalized path equals one of `required`
/// or sits below it as a directory; siblings sharing a name prefix
/// (`status-old`) are skipped. A kept file larger than `max_file_size`
/// aborts the read.
pub fn extract_required<R: Read>(reader: R, required: &[String], max_file_size: u64) -> Result<FileMap> {
    let mut archive = Archive::new(decompress(reader)?);
    let mut files = FileMap::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let raw_path = entry.path()?.to_string_lossy().to_string();
        let path = normalize_path(&raw_path);
        if !is_required(path, required) {
            continue;
        }

        let size = entry.header().size()?;
        if size > max_file_size {
            return Err(Error::FileTooLarge {
                path: path.to_string(),
                size,
                limit: max_file_size,
            });
        }

        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        debug!("Extracted {} ({} bytes)", path, content.len());
        files.insert(path.to_string(), content);
    }

    Ok(files)
}

/// Read the required files out of an unpacked root filesystem
///
/// Required entries naming a directory are read recursively. Symlinks are
/// never followed, since they may point outside the layer root.
pub fn read_directory(root: &Path, required: &[String], max_file_size: u64) -> Result<FileMap> {
    let mut files = FileMap::new();

    for rel in required {
        let rel = normalize_path(rel);
        let full = root.join(rel);
        match fs::symlink_metadata(&full) {
            Ok(meta) if meta.is_file() => {
                read_file(&full, rel.to_string(), meta.len(), max_file_size, &mut files)?
            }
            Ok(meta) if meta.is_dir() => collect_dir(root, &full, max_file_size, &mut files)?,
            Ok(_) => debug!("Skipping {}: not a regular file or directory", rel),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(files)
}

fn collect_dir(root: &Path, dir: &Path, max_file_size: u64, files: &mut FileMap) -> Result<()> {
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .map_err(|e| Error::ParseError(format!("Path outside layer root: {}", e)))?
            .to_string_lossy()
            .to_string();
        let size = entry.metadata().map_err(io::Error::from)?.len();
        read_file(path, rel, size, max_file_size, files)?;
    }
    Ok(())
}

fn read_file(path: &Path, rel: String, size: u64, max_file_size: u64, files: &mut FileMap) -> Result<()> {
    if size > max_file_size {
        return Err(Error::FileTooLarge {
            path: rel,
            size,
            limit: max_file_size,
        });
    }
    let content = fs::read(path)?;
    debug!("Read {} ({} bytes)", rel, content.len());
    files.insert(rel, content);
    Ok(())
}

/// SHA-256 of a file, formatted as `sha256:<hex>`
pub fn file_digest(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};

    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

/// Where a layer's contents come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum LayerSource {
    Tarball(PathBuf),
    Directory(PathBuf),
}

/// A layer's required files, ready for detection
#[derive(Debug, Clone)]
pub struct LoadedLayer {
    pub source: LayerSource,
    /// Content digest, for tarballs only
    pub digest: Option<String>,
    pub files: FileMap,
}

impl LayerSource {
    /// Classify a path as a tarball or directory layer
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta = fs::metadata(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::LayerNotFound(path.display().to_string()),
            _ => Error::Io(e),
        })?;

        if meta.is_dir() {
            Ok(Self::Directory(path.to_path_buf()))
        } else {
            Ok(Self::Tarball(path.to_path_buf()))
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Tarball(p) | Self::Directory(p) => p,
        }
    }

    /// Read the required files from this layer
    pub fn load(&self, required: &[String], max_file_size: u64) -> Result<LoadedLayer> {
        debug!("Loading layer {}", self.path().display());

        let (digest, files) = match self {
            Self::Tarball(path) => {
                let digest = file_digest(path)?;
                let files = extract_required(File::open(path)?, required, max_file_size)?;
                (Some(digest), files)
            }
            Self::Directory(path) => (None, read_directory(path, required, max_file_size)?),
        };

        Ok(LoadedLayer {
            source: self.clone(),
            digest,
            files,
        })
    }
}
