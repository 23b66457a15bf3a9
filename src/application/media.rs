//! Storage seam for uploaded post images.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Directory (relative to the media root) holding post images.
pub const POST_IMAGE_DIR: &str = "posts";

/// Width of the `posts.image` column.
pub const MAX_IMAGE_PATH_LEN: usize = 100;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid media path")]
    InvalidPath,
    #[error("uploaded file is empty")]
    Empty,
    #[error("media storage failed: {0}")]
    Storage(String),
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Persist a post image and return its path relative to the media root,
    /// e.g. `posts/test.gif`.
    async fn store_post_image(&self, original_name: &str, data: Bytes)
    -> Result<String, MediaError>;

    /// Remove an image stored by [`MediaStore::store_post_image`].
    async fn remove_post_image(&self, stored_path: &str) -> Result<(), MediaError>;
}
