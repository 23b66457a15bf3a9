//! Filesystem storage for uploaded post images.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use slug::slugify;
use thiserror::Error;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use crate::application::media::{MAX_IMAGE_PATH_LEN, MediaError, MediaStore, POST_IMAGE_DIR};

const SUFFIX_LEN: usize = 7;
const MAX_NAME_ATTEMPTS: usize = 8;
const MAX_EXTENSION_LEN: usize = 10;

/// Errors that can occur while interacting with the upload storage backend.
#[derive(Debug, Error)]
pub enum UploadStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file is empty")]
    EmptyPayload,
    #[error("uploaded file size exceeds supported range")]
    SizeOverflow,
    #[error("could not find a free file name for `{0}`")]
    NameExhausted(String),
}

impl From<UploadStorageError> for MediaError {
    fn from(error: UploadStorageError) -> Self {
        match error {
            UploadStorageError::InvalidPath => MediaError::InvalidPath,
            UploadStorageError::EmptyPayload => MediaError::Empty,
            other => MediaError::Storage(other.to_string()),
        }
    }
}

/// Result of storing an upload payload.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub stored_path: String,
    pub checksum: String,
    pub size_bytes: i64,
}

/// Filesystem-backed upload storage.
#[derive(Debug)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Store a payload under `directory`, keeping the sanitized original name
    /// when it is free and appending a short random suffix otherwise.
    ///
    /// The stem is shortened so that `directory/stem_suffix.ext` never exceeds
    /// `max_path_len` characters.
    pub async fn store(
        &self,
        directory: &str,
        original_name: &str,
        data: Bytes,
        max_path_len: usize,
    ) -> Result<StoredUpload, UploadStorageError> {
        if data.is_empty() {
            return Err(UploadStorageError::EmptyPayload);
        }

        let size_bytes =
            i64::try_from(data.len()).map_err(|_| UploadStorageError::SizeOverflow)?;
        let (mut stem, extension) = sanitize_filename(original_name);
        let reserved = directory.len()
            + 1
            + 1
            + SUFFIX_LEN
            + extension.as_ref().map_or(0, |ext| ext.len() + 1);
        let stem_budget = max_path_len
            .checked_sub(reserved)
            .filter(|budget| *budget > 0)
            .ok_or(UploadStorageError::InvalidPath)?;
        truncate_stem(&mut stem, stem_budget);

        let parent = self.resolve(directory)?;
        fs::create_dir_all(&parent).await?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let filename = if attempt == 0 {
                join_name(&stem, extension.as_deref())
            } else {
                join_name(&format!("{stem}_{}", random_suffix()), extension.as_deref())
            };
            let stored_path = format!("{directory}/{filename}");
            let absolute = self.resolve(&stored_path)?;

            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&absolute)
                .await
            {
                Ok(file) => file,
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(UploadStorageError::Io(err)),
            };

            if let Err(err) = file.write_all(&data).await {
                drop(file);
                let _ = fs::remove_file(&absolute).await;
                return Err(UploadStorageError::Io(err));
            }
            file.flush().await?;

            let checksum = hex::encode(Sha256::digest(&data));
            debug!(
                target = "scrivo::uploads",
                stored_path = %stored_path,
                size_bytes,
                checksum = %checksum,
                "stored upload"
            );

            return Ok(StoredUpload {
                stored_path,
                checksum,
                size_bytes,
            });
        }

        Err(UploadStorageError::NameExhausted(join_name(
            &stem,
            extension.as_deref(),
        )))
    }

    /// Attempt to read the stored payload into memory.
    pub async fn read(&self, stored_path: &str) -> Result<Bytes, UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Delete a stored upload. A file that is already gone is not an error.
    pub async fn remove(&self, stored_path: &str) -> Result<(), UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UploadStorageError::Io(err)),
        }
    }

    fn resolve(&self, stored_path: &str) -> Result<PathBuf, UploadStorageError> {
        let relative = Path::new(stored_path);
        if stored_path.is_empty()
            || relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(UploadStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl MediaStore for UploadStorage {
    async fn store_post_image(
        &self,
        original_name: &str,
        data: Bytes,
    ) -> Result<String, MediaError> {
        let stored = self
            .store(POST_IMAGE_DIR, original_name, data, MAX_IMAGE_PATH_LEN)
            .await?;
        Ok(stored.stored_path)
    }

    async fn remove_post_image(&self, stored_path: &str) -> Result<(), MediaError> {
        Ok(self.remove(stored_path).await?)
    }
}

fn sanitize_filename(original: &str) -> (String, Option<String>) {
    // Browsers on some platforms send the full client path.
    let base_name = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original);
    let path = Path::new(base_name);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("upload");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "upload".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| {
            !value.is_empty()
                && value.len() <= MAX_EXTENSION_LEN
                && value.chars().all(|c| c.is_ascii_alphanumeric())
        });

    (base, extension)
}

/// Slugs are ASCII, so cutting at a byte index is safe.
fn truncate_stem(stem: &mut String, max_len: usize) {
    if stem.len() > max_len {
        stem.truncate(max_len);
        let trimmed = stem.trim_end_matches('-').len();
        stem.truncate(trimmed);
        if stem.is_empty() {
            stem.push_str("upload");
            stem.truncate(max_len);
        }
    }
}

fn join_name(stem: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

fn random_suffix() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(SUFFIX_LEN);
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, UploadStorage) {
        let dir = tempfile::tempdir().expect("temp dir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");
        (dir, storage)
    }

    #[tokio::test]
    async fn keeps_original_name_when_free() {
        let (_dir, storage) = storage();
        let stored = storage
            .store_post_image("test.gif", Bytes::from_static(b"GIF89a"))
            .await
            .expect("stored");
        assert_eq!(stored, "posts/test.gif");

        let read = storage.read(&stored).await.expect("read back");
        assert_eq!(read.as_ref(), b"GIF89a");
    }

    #[tokio::test]
    async fn suffixes_colliding_names() {
        let (_dir, storage) = storage();
        let first = storage
            .store_post_image("cat.png", Bytes::from_static(b"one"))
            .await
            .expect("first");
        let second = storage
            .store_post_image("cat.png", Bytes::from_static(b"two"))
            .await
            .expect("second");

        assert_eq!(first, "posts/cat.png");
        assert_ne!(first, second);
        assert!(second.starts_with("posts/cat_"));
        assert!(second.ends_with(".png"));
        assert_eq!(
            storage.read(&first).await.expect("first file").as_ref(),
            b"one"
        );
    }

    #[tokio::test]
    async fn rejects_empty_payloads() {
        let (_dir, storage) = storage();
        let err = storage
            .store("posts", "empty.gif", Bytes::new(), MAX_IMAGE_PATH_LEN)
            .await
            .expect_err("empty payload rejected");
        assert!(matches!(err, UploadStorageError::EmptyPayload));
    }

    #[tokio::test]
    async fn records_checksum_and_size() {
        let (_dir, storage) = storage();
        let stored = storage
            .store("posts", "a.txt", Bytes::from_static(b"abc"), MAX_IMAGE_PATH_LEN)
            .await
            .expect("stored");
        assert_eq!(stored.size_bytes, 3);
        assert_eq!(
            stored.checksum,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn long_names_fit_the_image_column() {
        let (_dir, storage) = storage();
        let long_name = format!("{}.gif", "a".repeat(120));

        let first = storage
            .store_post_image(&long_name, Bytes::from_static(b"GIF89a"))
            .await
            .expect("first stored");
        let second = storage
            .store_post_image(&long_name, Bytes::from_static(b"GIF89a"))
            .await
            .expect("second stored");

        for stored in [&first, &second] {
            assert!(stored.len() <= MAX_IMAGE_PATH_LEN, "{stored} is {} chars", stored.len());
            assert!(stored.starts_with("posts/aaaa"));
            assert!(stored.ends_with(".gif"));
        }
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn remove_deletes_stored_files() {
        let (_dir, storage) = storage();
        let stored = storage
            .store_post_image("gone.gif", Bytes::from_static(b"GIF89a"))
            .await
            .expect("stored");

        storage.remove_post_image(&stored).await.expect("removed");
        assert!(storage.read(&stored).await.is_err());
        storage
            .remove_post_image(&stored)
            .await
            .expect("removing twice is fine");
    }

    #[test]
    fn rejects_traversal() {
        let (_dir, storage) = storage();
        assert!(matches!(
            storage.resolve("../etc/passwd"),
            Err(UploadStorageError::InvalidPath)
        ));
        assert!(matches!(
            storage.resolve("/etc/passwd"),
            Err(UploadStorageError::InvalidPath)
        ));
        assert!(storage.resolve("posts/ok.gif").is_ok());
    }

    #[test]
    fn sanitizes_client_paths() {
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\My Photo.JPG"),
            ("my-photo".to_string(), Some("jpg".to_string()))
        );
        assert_eq!(sanitize_filename("..."), ("upload".to_string(), None));
        assert_eq!(
            sanitize_filename("photo.abcdefghijklmnop"),
            ("photo".to_string(), None)
        );
    }
}
