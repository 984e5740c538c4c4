//! Decoding and size normalization via the `image` crate.

use crate::image::OwnedImage;
use crate::util::{ImageError, ImageResult};
use image::imageops::FilterType;
use image::GrayImage;
use std::path::Path;

/// Decodes encoded image bytes (PNG or JPEG) into an 8-bit grayscale image.
pub fn decode_gray(bytes: &[u8]) -> ImageResult<GrayImage> {
    let img = image::load_from_memory(bytes).map_err(|err| ImageError::Unreadable {
        reason: err.to_string(),
    })?;
    Ok(img.to_luma8())
}

/// Loads an image from disk and converts it to grayscale.
pub fn load_gray<P: AsRef<Path>>(path: P) -> ImageResult<GrayImage> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|err| ImageError::Unreadable {
        reason: format!("{}: {err}", path.display()),
    })?;
    decode_gray(&bytes)
}

/// Downscales `img` so that its largest side is at most `max_dimension`.
///
/// Aspect ratio is preserved and images already within bounds are returned
/// untouched. A `max_dimension` of zero disables the cap.
pub fn downscale_to_fit(img: GrayImage, max_dimension: u32) -> GrayImage {
    let (width, height) = img.dimensions();
    let largest = width.max(height);
    if max_dimension == 0 || largest <= max_dimension {
        return img;
    }
    let scale = f64::from(max_dimension) / f64::from(largest);
    let new_width = ((f64::from(width) * scale).round() as u32).clamp(1, max_dimension);
    let new_height = ((f64::from(height) * scale).round() as u32).clamp(1, max_dimension);
    image::imageops::resize(&img, new_width, new_height, FilterType::Triangle)
}

/// Creates an owned image from a grayscale image buffer.
pub fn owned_from_gray_image(img: GrayImage) -> ImageResult<OwnedImage> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    OwnedImage::new(img.into_raw(), width, height)
}

#[cfg(test)]
mod tests {
    use super::{decode_gray, downscale_to_fit, owned_from_gray_image};
    use crate::util::ImageError;
    use image::GrayImage;

    #[test]
    fn rejects_garbage_bytes() {
        let err = decode_gray(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ImageError::Unreadable { .. }));
    }

    #[test]
    fn downscale_preserves_aspect_ratio() {
        let img = GrayImage::new(2048, 1024);
        let scaled = downscale_to_fit(img, 1024);
        assert_eq!(scaled.dimensions(), (1024, 512));

        let small = GrayImage::new(300, 200);
        assert_eq!(downscale_to_fit(small, 1024).dimensions(), (300, 200));
    }

    #[test]
    fn owned_conversion_keeps_pixels() {
        let img = GrayImage::from_raw(2, 2, vec![1, 2, 3, 4]).unwrap();
        let owned = owned_from_gray_image(img).unwrap();
        assert_eq!((owned.width(), owned.height()), (2, 2));
        assert_eq!(owned.data(), &[1, 2, 3, 4]);
    }
}
