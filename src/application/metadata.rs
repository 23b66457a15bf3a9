//! Header inspection for uploaded images.

use imagesize::{ImageError, ImageSize};
use thiserror::Error;

pub(crate) const MAX_DIMENSION: usize = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageProbeError {
    #[error("unsupported image format")]
    Unsupported,
    #[error("corrupted image")]
    Corrupted,
    #[error("image dimensions {width}x{height} are out of range")]
    Dimensions { width: usize, height: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width: usize,
    pub height: usize,
}

/// Confirm that `bytes` start with a recognised image header and return its size.
pub fn probe_image(bytes: &[u8]) -> Result<ImageDimensions, ImageProbeError> {
    let ImageSize { width, height } = match imagesize::blob_size(bytes) {
        Ok(size) => size,
        Err(ImageError::NotSupported) => return Err(ImageProbeError::Unsupported),
        Err(ImageError::CorruptedImage) | Err(ImageError::IoError(_)) => {
            return Err(ImageProbeError::Corrupted);
        }
    };

    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ImageProbeError::Dimensions { width, height });
    }

    Ok(ImageDimensions { width, height })
}
