//! Blobstore clients: deliver local artifacts to a blob store and fetch them back.
//!
//! Uploads are not idempotent at this layer. Retrying a failed `create`
//! may produce a second, distinct blob ID; retry policy belongs to the caller.

mod external;
mod local;

use std::{
    fs::File,
    io::{self, Read, Write},
    path::Path,
};

use sha2::{Digest, Sha256};

pub use external::ExternalBlobstore;
pub use local::LocalBlobstore;

/// Errors that can occur while talking to a blob store.
#[derive(Debug, thiserror::Error)]
pub enum BlobstoreError {
    /// A failure worth retrying: network hiccup, store briefly unavailable.
    #[error("transient blobstore failure: {message}")]
    Transient {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// A failure that will recur on retry: bad credentials, missing client.
    #[error("permanent blobstore failure: {message}")]
    Permanent {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid blob id: {0:?}")]
    InvalidBlobId(String),
}

impl BlobstoreError {
    /// Whether a caller may retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Classify a local I/O failure. Missing files and permission problems
    /// do not fix themselves.
    pub(crate) fn from_io(message: impl Into<String>, source: io::Error) -> Self {
        let message = message.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound => Self::Permanent {
                message,
                source: Some(source),
            },
            _ => Self::Transient {
                message,
                source: Some(source),
            },
        }
    }
}

pub type Result<T> = core::result::Result<T, BlobstoreError>;

/// A successfully stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedBlob {
    /// Opaque handle for later retrieval.
    pub id: String,

    /// Lowercase hex SHA-256 of the stored bytes, when the store reports one.
    pub fingerprint: Option<String>,
}

/// A remote store for opaque blobs.
pub trait Blobstore: Send + Sync {
    /// Upload the file at `path`, returning its new blob ID and fingerprint.
    fn create(&self, path: &Path) -> Result<CreatedBlob>;

    /// Download the blob `id` into `destination`.
    fn get(&self, id: &str, destination: &Path) -> Result<()>;
}

impl<B: Blobstore + ?Sized> Blobstore for Box<B> {
    fn create(&self, path: &Path) -> Result<CreatedBlob> {
        (**self).create(path)
    }

    fn get(&self, id: &str, destination: &Path) -> Result<()> {
        (**self).get(id, destination)
    }
}

/// Reject IDs that could escape a store's namespace when used as a path.
pub(crate) fn validate_blob_id(id: &str) -> Result<()> {
    let bad = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\'])
        || id.contains('\0');
    if bad {
        return Err(BlobstoreError::InvalidBlobId(id.to_string()));
    }
    Ok(())
}

/// Stream `reader` into `writer`, returning the hex SHA-256 of what was copied.
pub(crate) fn copy_with_digest(
    reader: &mut impl Read,
    writer: &mut impl Write,
) -> io::Result<String> {
    let mut digesting = DigestWriter {
        inner: writer,
        hasher: Sha256::new(),
    };
    io::copy(reader, &mut digesting)?;
    digesting.flush()?;
    Ok(hex::encode(digesting.hasher.finalize()))
}

/// Hashes exactly the bytes its inner writer accepts.
struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Hex SHA-256 of a file's contents, read in bounded chunks.
pub(crate) fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    copy_with_digest(&mut file, &mut io::sink())
}
