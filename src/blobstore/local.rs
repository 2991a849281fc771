//! Directory-backed blob store.
//!
//! Each blob lives at `<root>/<id>`. Writes land under a dot-prefixed
//! temporary name and are renamed into place once complete, so a reader
//! never sees a half-written blob.

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use uuid::Uuid;

use super::{
    Blobstore, BlobstoreError, CreatedBlob, Result, copy_with_digest, validate_blob_id,
};

#[derive(Debug, Clone)]
pub struct LocalBlobstore {
    root: PathBuf,
}

impl LocalBlobstore {
    /// Creates a store rooted at `root`. The directory is created on first upload.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }
}

impl Blobstore for LocalBlobstore {
    fn create(&self, path: &Path) -> Result<CreatedBlob> {
        fs::create_dir_all(&self.root).map_err(|e| {
            BlobstoreError::from_io(format!("create store {}", self.root.display()), e)
        })?;

        let mut source = File::open(path)
            .map_err(|e| BlobstoreError::from_io(format!("open {}", path.display()), e))?;

        let id = Uuid::new_v4().to_string();
        let staging = self.root.join(format!(".{id}.partial"));
        let fingerprint = write_blob(&mut source, &staging, &self.blob_path(&id)).map_err(|e| {
            let _ = fs::remove_file(&staging);
            BlobstoreError::from_io(format!("store blob {id}"), e)
        })?;

        tracing::debug!(blob_id = %id, fingerprint = %fingerprint, "stored blob");
        Ok(CreatedBlob {
            id,
            fingerprint: Some(fingerprint),
        })
    }

    fn get(&self, id: &str, destination: &Path) -> Result<()> {
        validate_blob_id(id)?;

        let mut source = match File::open(self.blob_path(id)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BlobstoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(BlobstoreError::from_io(format!("open blob {id}"), e)),
        };

        let mut dest = File::create(destination).map_err(|e| {
            BlobstoreError::from_io(format!("create {}", destination.display()), e)
        })?;
        copy_with_digest(&mut source, &mut dest)
            .map_err(|e| BlobstoreError::from_io(format!("fetch blob {id}"), e))?;
        Ok(())
    }
}

/// Copy `source` into `staging`, then move it to `target`. Returns the digest.
fn write_blob(source: &mut File, staging: &Path, target: &Path) -> io::Result<String> {
    let mut dest = File::create(staging)?;
    let digest = copy_with_digest(source, &mut dest)?;
    dest.sync_all()?;
    fs::rename(staging, target)?;
    Ok(digest)
}
