//! Compression: package a filtered directory subtree into one artifact.
//!
//! The produced [`Tarball`] owns its file on disk. Dropping it deletes
//! the file, so every exit path after an upload attempt cleans up.

mod tarball;

use std::{
    fs, io,
    path::{Path, PathBuf},
};

pub use tarball::TarballCompressor;

/// Errors that can occur while packaging a directory.
#[derive(Debug, thiserror::Error)]
pub enum CompressError {
    /// The directory to compress does not exist.
    ///
    /// Kept apart from "nothing matched", which yields an empty archive.
    #[error("source directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("invalid filter pattern: {pattern}")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to walk {}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },

    #[error("failed to {operation} {}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl CompressError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = core::result::Result<T, CompressError>;

/// Packages the files of a directory that match a set of glob filters.
pub trait Compressor: Send + Sync {
    /// Compress every file under `dir` whose relative path matches one of `filters`.
    ///
    /// Each call produces a fresh artifact; concurrent calls never share a path.
    fn compress_files_in_dir(&self, dir: &Path, filters: &[String]) -> Result<Tarball>;
}

/// A packaged archive on local disk, removed when dropped.
#[derive(Debug)]
pub struct Tarball {
    path: PathBuf,
}

impl Tarball {
    /// Takes ownership of the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Tarball {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed tarball"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove tarball");
            }
        }
    }
}
