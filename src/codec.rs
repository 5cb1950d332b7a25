//! Photo Storage - Bitmap Codec
//!
//! JPEG compression and decoding of in-memory bitmaps.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};

use crate::error::{StorageError, StorageResult};

/// Compression quality used by both stores
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Compress a bitmap as JPEG at the given quality (1..=100)
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> StorageResult<Vec<u8>> {
    if !(1..=100).contains(&quality) {
        return Err(StorageError::Encode(format!("quality {} out of range", quality)));
    }

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(StorageError::Encode("empty bitmap".into()));
    }

    // JPEG has no alpha channel and no 16-bit samples
    let rgb = image.to_rgb8();

    let mut output = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);
        encoder
            .encode_image(&rgb)
            .map_err(|e| StorageError::Encode(e.to_string()))?;
    }

    Ok(output)
}

/// Decode image bytes into a bitmap
pub fn decode(bytes: &[u8]) -> StorageResult<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| StorageError::Decode(e.to_string()))
}

/// Width and height of a bitmap
pub fn dimensions(image: &DynamicImage) -> (u32, u32) {
    image.dimensions()
}
