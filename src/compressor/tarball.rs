//! Streaming tar + zstd compressor.
//!
//! Walks the source directory in sorted order, appends each matching
//! regular file to a tar stream, and compresses the stream with zstd
//! as it is written. Headers use deterministic mode, so the same tree
//! always produces the same bytes.

use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use uuid::Uuid;

use super::{CompressError, Compressor, Result, Tarball};

const COMPRESSION_LEVEL: i32 = 3;

/// Writes `logs-<uuid>.tar.zst` archives into a scratch directory.
#[derive(Debug, Clone)]
pub struct TarballCompressor {
    tmp_dir: PathBuf,
}

impl TarballCompressor {
    pub fn new(tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            tmp_dir: tmp_dir.into(),
        }
    }

    fn next_artifact_path(&self) -> PathBuf {
        self.tmp_dir.join(format!("logs-{}.tar.zst", Uuid::new_v4()))
    }
}

impl Compressor for TarballCompressor {
    fn compress_files_in_dir(&self, dir: &Path, filters: &[String]) -> Result<Tarball> {
        match fs::metadata(dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(CompressError::SourceNotFound(dir.to_path_buf())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CompressError::SourceNotFound(dir.to_path_buf()));
            }
            Err(e) => return Err(CompressError::io("inspect", dir, e)),
        }

        let matcher = build_matcher(filters)?;

        fs::create_dir_all(&self.tmp_dir)
            .map_err(|e| CompressError::io("create", &self.tmp_dir, e))?;

        // Owned before the first byte is written: a failed write drops it
        // and the partial archive goes with it.
        let tarball = Tarball::new(self.next_artifact_path());
        let archived = write_archive(tarball.path(), dir, &matcher)?;

        tracing::debug!(
            dir = %dir.display(),
            tarball = %tarball.path().display(),
            archived,
            "compressed files"
        );
        Ok(tarball)
    }
}

/// Compile filters with shell-glob semantics: `*` stays within one path
/// component, `**` spans any number of them.
fn build_matcher(filters: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in filters {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| CompressError::InvalidFilter {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| CompressError::InvalidFilter {
        pattern: filters.join(" "),
        source,
    })
}

/// Stream every matching file under `dir` into a compressed archive at `out`.
///
/// Returns the number of files archived.
fn write_archive(out: &Path, dir: &Path, matcher: &GlobSet) -> Result<usize> {
    let file = File::create(out).map_err(|e| CompressError::io("create", out, e))?;
    let encoder = zstd::Encoder::new(file, COMPRESSION_LEVEL)
        .map_err(|e| CompressError::io("compress", out, e))?;

    let mut archive = tar::Builder::new(encoder);
    archive.mode(tar::HeaderMode::Deterministic);
    archive.follow_symlinks(false);

    let walker = WalkBuilder::new(dir)
        .standard_filters(false) // Log directories have no ignore files worth honoring.
        .follow_links(false)
        .sort_by_file_name(Ord::cmp)
        .build();

    let mut archived = 0;
    for entry in walker {
        let entry = entry.map_err(|source| CompressError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;

        // Regular files only; directories are implied by entry names.
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }

        let path = entry.path();
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        if !matcher.is_match(relative) {
            continue;
        }

        if append_file(&mut archive, path, relative)? {
            archived += 1;
        }
    }

    let encoder = archive
        .into_inner()
        .map_err(|e| CompressError::io("finish archive", out, e))?;
    let file = encoder
        .finish()
        .map_err(|e| CompressError::io("finish compressing", out, e))?;
    file.sync_all()
        .map_err(|e| CompressError::io("sync", out, e))?;

    Ok(archived)
}

/// Append one file as it stood when opened.
///
/// The entry holds exactly the length seen at open time. Bytes a writer
/// appends afterwards are left out, and a file truncated mid-read is padded
/// with zeros, so the header always agrees with the data that follows it.
/// Returns `false` if the file vanished after the walk saw it.
fn append_file<W: Write>(
    archive: &mut tar::Builder<W>,
    path: &Path,
    relative: &Path,
) -> Result<bool> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "log file vanished before archiving, skipping");
            return Ok(false);
        }
        Err(e) => return Err(CompressError::io("open", path, e)),
    };
    let meta = file
        .metadata()
        .map_err(|e| CompressError::io("inspect", path, e))?;
    let len = meta.len();

    let mut header = tar::Header::new_gnu();
    header.set_metadata_in_mode(&meta, tar::HeaderMode::Deterministic);
    header.set_size(len);

    let data = file.take(len).chain(io::repeat(0)).take(len);
    archive
        .append_data(&mut header, relative, data)
        .map_err(|e| CompressError::io("archive", path, e))?;
    Ok(true)
}
