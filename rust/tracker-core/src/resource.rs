// rust/tracker-core/src/resource.rs

//! Extraction of embedded artifacts (tracker scripts, native libraries) to
//! real files that other programs can open.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::error::{Result, TrackerError};

/// An artifact compiled into the binary, usually with `include_bytes!`.
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedResource {
    /// Absolute resource path, e.g. `/tracker.py`.
    pub path: &'static str,
    pub bytes: &'static [u8],
}

impl EmbeddedResource {
    pub const fn new(path: &'static str, bytes: &'static [u8]) -> Self {
        Self { path, bytes }
    }
}

/// A set of embedded resources addressed by path.
#[derive(Debug, Clone, Default)]
pub struct ResourceBundle {
    resources: Vec<EmbeddedResource>,
}

impl ResourceBundle {
    pub fn new(resources: impl IntoIterator<Item = EmbeddedResource>) -> Self {
        Self {
            resources: resources.into_iter().collect(),
        }
    }

    pub fn get(&self, path: &str) -> Option<&'static [u8]> {
        self.resources
            .iter()
            .find(|r| r.path == path)
            .map(|r| r.bytes)
    }

    /// Copy the resource at `path` into a uniquely named temporary file.
    ///
    /// The temp file name starts with the resource's base name up to its
    /// first `.` and ends with the rest of the extension. The file lives as
    /// long as the returned guard.
    ///
    /// # Errors
    ///
    /// `InvalidName` if `path` is not absolute or its base name is shorter
    /// than three characters, `NotFound` if no such resource is embedded,
    /// `Io` if the temp file cannot be written.
    pub fn extract(&self, path: &str) -> Result<ExtractedResource> {
        let (prefix, suffix) = temp_name_parts(path)?;
        let bytes = self.get(path).ok_or_else(|| TrackerError::not_found(path))?;

        let mut file = tempfile::Builder::new()
            .prefix(prefix)
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| TrackerError::io("resource extraction", e))?;
        file.write_all(bytes)
            .and_then(|()| file.flush())
            .map_err(|e| TrackerError::io("resource extraction", e))?;

        let extracted = ExtractedResource {
            path: file.into_temp_path(),
        };
        tracing::debug!(resource = path, file = %extracted.path().display(), "extracted resource");
        Ok(extracted)
    }
}

/// A resource copied to disk. The file is removed when this is dropped.
#[derive(Debug)]
pub struct ExtractedResource {
    path: TempPath,
}

impl ExtractedResource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file on disk past the lifetime of this guard.
    pub fn keep(self) -> Result<PathBuf> {
        self.path
            .keep()
            .map_err(|e| TrackerError::io("resource extraction", e.error))
    }
}

fn temp_name_parts(path: &str) -> Result<(&str, String)> {
    if !path.starts_with('/') {
        return Err(TrackerError::invalid_name(
            path,
            "the path has to be absolute (start with '/')",
        ));
    }
    let file_name = path.rsplit('/').next().unwrap_or_default();
    let (prefix, suffix) = match file_name.split_once('.') {
        Some((prefix, ext)) => (prefix, format!(".{ext}")),
        None => (file_name, String::new()),
    };
    if prefix.chars().count() < 3 {
        return Err(TrackerError::invalid_name(
            path,
            "the file name has to be at least 3 characters long",
        ));
    }
    Ok((prefix, suffix))
}
