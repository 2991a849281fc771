//! Blob store backed by an external client binary.
//!
//! The client speaks a small command-line protocol:
//!
//! ```text
//! <command> -c <config> put <local-path> <blob-id>
//! <command> -c <config> get <blob-id> <local-path>
//! ```
//!
//! Blob IDs are minted here, so the client only moves bytes. The
//! fingerprint is computed locally before upload.

use std::{
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
    process::Command,
};

use uuid::Uuid;

use super::{Blobstore, BlobstoreError, CreatedBlob, Result, file_digest, validate_blob_id};

#[derive(Debug, Clone)]
pub struct ExternalBlobstore {
    command: String,
    config: PathBuf,
}

impl ExternalBlobstore {
    pub fn new(command: impl Into<String>, config: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            config: config.into(),
        }
    }

    /// Run the client with `args` after the `-c <config>` prefix.
    fn run(&self, args: &[&OsStr]) -> Result<()> {
        if !self.config.is_file() {
            return Err(BlobstoreError::Permanent {
                message: format!("blobstore config not found: {}", self.config.display()),
                source: None,
            });
        }

        let output = Command::new(&self.command)
            .arg("-c")
            .arg(&self.config)
            .args(args)
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let args: Vec<_> = args.iter().map(|a| a.to_string_lossy()).collect();
            return Err(BlobstoreError::Transient {
                message: format!(
                    "{} {} failed ({}): {}",
                    self.command,
                    args.join(" "),
                    output.status,
                    stderr.trim()
                ),
                source: None,
            });
        }

        Ok(())
    }

    fn spawn_error(&self, e: io::Error) -> BlobstoreError {
        let message = format!("failed to run {}", self.command);
        match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                BlobstoreError::Permanent {
                    message,
                    source: Some(e),
                }
            }
            _ => BlobstoreError::Transient {
                message,
                source: Some(e),
            },
        }
    }
}

impl Blobstore for ExternalBlobstore {
    fn create(&self, path: &Path) -> Result<CreatedBlob> {
        let fingerprint = file_digest(path)
            .map_err(|e| BlobstoreError::from_io(format!("read {}", path.display()), e))?;

        let id = Uuid::new_v4().to_string();
        self.run(&[OsStr::new("put"), path.as_os_str(), OsStr::new(&id)])?;

        tracing::debug!(blob_id = %id, command = %self.command, "uploaded blob");
        Ok(CreatedBlob {
            id,
            fingerprint: Some(fingerprint),
        })
    }

    fn get(&self, id: &str, destination: &Path) -> Result<()> {
        validate_blob_id(id)?;
        self.run(&[OsStr::new("get"), OsStr::new(id), destination.as_os_str()])
    }
}
