//! Image embedding for the Word report.
//!
//! The merge engine never decodes pictures itself; it asks an [`ImageEncoder`]
//! for a ready-to-embed payload so the backing image library can be swapped.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

/// EMUs (English Metric Units) per pixel at 96 DPI.
pub const EMU_PER_PIXEL: u64 = 9_525;

/// A picture ready to be written into `word/media`.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedImage {
    pub data: Vec<u8>,
    /// File extension registered in `[Content_Types].xml` (e.g., "png").
    pub extension: &'static str,
    pub content_type: &'static str,
    pub width_emu: u64,
    pub height_emu: u64,
}

/// Turns raw image bytes into an [`EmbeddedImage`] of a fixed display size.
pub trait ImageEncoder: Send + Sync {
    fn encode(&self, bytes: &[u8], width_px: u32, height_px: u32) -> Result<EmbeddedImage, String>;

    /// The transparent placeholder used for empty photo slots.
    fn blank(&self, width_px: u32, height_px: u32) -> Result<EmbeddedImage, String>;
}

/// Default encoder backed by the `image` crate.
///
/// PNG, JPEG, GIF and BMP payloads are embedded as-is; anything else the
/// crate can decode (e.g., WebP from a phone camera) is re-encoded to PNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultImageEncoder;

impl DefaultImageEncoder {
    fn sized(
        data: Vec<u8>,
        format: ImageFormat,
        width_px: u32,
        height_px: u32,
    ) -> Result<EmbeddedImage, String> {
        let (extension, content_type) = match format {
            ImageFormat::Png => ("png", "image/png"),
            ImageFormat::Jpeg => ("jpeg", "image/jpeg"),
            ImageFormat::Gif => ("gif", "image/gif"),
            ImageFormat::Bmp => ("bmp", "image/bmp"),
            other => return Err(format!("unsupported embedded format {:?}", other)),
        };
        Ok(EmbeddedImage {
            data,
            extension,
            content_type,
            width_emu: u64::from(width_px) * EMU_PER_PIXEL,
            height_emu: u64::from(height_px) * EMU_PER_PIXEL,
        })
    }

    fn to_png(decoded: &DynamicImage) -> Result<Vec<u8>, String> {
        let mut out = Cursor::new(Vec::new());
        decoded
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| e.to_string())?;
        Ok(out.into_inner())
    }
}

impl ImageEncoder for DefaultImageEncoder {
    fn encode(&self, bytes: &[u8], width_px: u32, height_px: u32) -> Result<EmbeddedImage, String> {
        if bytes.is_empty() {
            return Err("image payload is empty".to_string());
        }

        let format = image::guess_format(bytes).map_err(|e| e.to_string())?;
        match format {
            ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::Bmp => {
                Self::sized(bytes.to_vec(), format, width_px, height_px)
            }
            _ => {
                log::debug!("Re-encoding {:?} image to PNG for embedding", format);
                let decoded = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
                let png = Self::to_png(&decoded)?;
                Self::sized(png, ImageFormat::Png, width_px, height_px)
            }
        }
    }

    fn blank(&self, width_px: u32, height_px: u32) -> Result<EmbeddedImage, String> {
        let pixel = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 0]));
        let png = Self::to_png(&DynamicImage::ImageRgba8(pixel))?;
        Self::sized(png, ImageFormat::Png, width_px, height_px)
    }
}
