//! Blob storage for uploaded PDF files
//!
//! Blobs live in a single flat directory under the data directory. Records
//! refer to them by a relative location (`<upload_dir>/<name>`), so moving the
//! data directory keeps every record valid.

use crate::error::{CoreError, InvalidInputKind, Result};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Storage backend for memo blobs.
///
/// Names are single path components; implementations never resolve a name
/// outside their root.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under a new `name`. Fails with
    /// [`io::ErrorKind::AlreadyExists`] if the name is taken; an existing
    /// blob is never replaced.
    async fn create(&self, name: &str, data: &[u8]) -> io::Result<()>;

    async fn read(&self, name: &str) -> io::Result<Vec<u8>>;

    async fn delete(&self, name: &str) -> io::Result<()>;

    async fn exists(&self, name: &str) -> io::Result<bool>;

    /// Location recorded in the database for `name`
    fn location(&self, name: &str) -> String;

    /// Blob name for a location produced by [`BlobStore::location`]
    fn resolve<'a>(&self, location: &'a str) -> Option<&'a str>;
}

/// Reject anything that is not a plain file name
pub fn validate_blob_name(name: &str) -> Result<()> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && !Path::new(name).is_absolute();

    if plain {
        Ok(())
    } else {
        Err(CoreError::invalid(
            InvalidInputKind::Malformed,
            format!("Invalid file name: {:?}", name),
        ))
    }
}

fn checked(name: &str) -> io::Result<()> {
    validate_blob_name(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))
}

/// Filesystem blob store rooted at `<base_dir>/<dir_name>`
pub struct FilesystemBlobStore {
    root: PathBuf,
    dir_name: String,
}

impl FilesystemBlobStore {
    /// Create the store, making sure the upload directory exists
    pub fn new(base_dir: impl AsRef<Path>, dir_name: impl Into<String>) -> Result<Self> {
        let dir_name = dir_name.into();
        validate_blob_name(&dir_name)
            .map_err(|_| CoreError::Config(format!("Invalid upload directory: {:?}", dir_name)))?;

        let root = base_dir.as_ref().join(&dir_name);
        std::fs::create_dir_all(&root)?;

        Ok(FilesystemBlobStore { root, dir_name })
    }

    /// Absolute directory holding the blobs
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, name: &str) -> io::Result<PathBuf> {
        checked(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn create(&self, name: &str, data: &[u8]) -> io::Result<()> {
        let path = self.full_path(name)?;

        // Write a sibling temp file, then link it into place. Linking fails
        // if the target exists, so concurrent creates cannot clobber each other.
        let tmp = self
            .root
            .join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));
        let result = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::hard_link(&tmp, &path).await
        }
        .await;

        if let Err(e) = fs::remove_file(&tmp).await {
            tracing::warn!("Failed to remove temp file {}: {}", tmp.display(), e);
        }
        result
    }

    async fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.full_path(name)?).await
    }

    async fn delete(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.full_path(name)?).await
    }

    async fn exists(&self, name: &str) -> io::Result<bool> {
        fs::try_exists(self.full_path(name)?).await
    }

    fn location(&self, name: &str) -> String {
        format!("{}/{}", self.dir_name, name)
    }

    fn resolve<'a>(&self, location: &'a str) -> Option<&'a str> {
        let name = location
            .strip_prefix(self.dir_name.as_str())?
            .strip_prefix(['/', '\\'])?;
        validate_blob_name(name).ok().map(|_| name)
    }
}
