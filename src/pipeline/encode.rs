//! Image encoding: `DynamicImage` → bytes under a size ceiling.
//!
//! PNG is tried first because it is lossless and rendered text stays crisp.
//! Providers reject oversized payloads, so a PNG above the ceiling is
//! re-encoded as JPEG at decreasing quality until it fits or the ladder runs
//! out. The last attempt is returned even if it is still too large; the
//! provider gets the final say.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::{debug, info};

/// One encoded page image, ready to attach to a transcription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// 1-indexed page number the image was rendered from.
    pub page_num: usize,
    /// Encoded bytes (PNG or JPEG).
    pub bytes: Vec<u8>,
    /// `image/png` or `image/jpeg`.
    pub mime_type: &'static str,
}

impl EncodedImage {
    /// Wrap as base64 `ImageData` for the VLM API.
    ///
    /// `detail: "high"` lets GPT-4-class models use their full tile budget;
    /// without it fine print and footnotes are lost.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(STANDARD.encode(&self.bytes), self.mime_type).with_detail("high")
    }
}

/// Encode a rasterised page, re-encoding as JPEG if it exceeds `max_bytes`.
pub fn encode_page(
    page_num: usize,
    img: &DynamicImage,
    max_bytes: usize,
    quality_ladder: &[u8],
) -> Result<EncodedImage, image::ImageError> {
    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;
    debug!("Page {}: PNG {} bytes", page_num, png.len());

    if png.len() <= max_bytes || quality_ladder.is_empty() {
        return Ok(EncodedImage {
            page_num,
            bytes: png,
            mime_type: "image/png",
        });
    }

    info!(
        "Page {}: compressing large image ({} bytes > {} ceiling)",
        page_num,
        png.len(),
        max_bytes
    );

    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut jpeg = Vec::new();
    for &quality in quality_ladder {
        jpeg.clear();
        let encoder = JpegEncoder::new_with_quality(&mut jpeg, quality);
        rgb.write_with_encoder(encoder)?;
        debug!("Page {}: JPEG q{} → {} bytes", page_num, quality, jpeg.len());
        if jpeg.len() <= max_bytes {
            info!("Page {}: compressed to {} bytes", page_num, jpeg.len());
            break;
        }
    }

    Ok(EncodedImage {
        page_num,
        bytes: jpeg,
        mime_type: "image/jpeg",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn noisy_image(w: u32, h: u32) -> DynamicImage {
        // Pseudo-random pixels compress poorly as PNG.
        let mut seed: u32 = 0x1234_5678;
        let img = RgbaImage::from_fn(w, h, |_, _| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let [r, g, b, _] = seed.to_le_bytes();
            Rgba([r, g, b, 255])
        });
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn small_image_stays_png() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let enc = encode_page(1, &img, 1024 * 1024, &[85, 70]).expect("encode should succeed");
        assert_eq!(enc.mime_type, "image/png");
        assert_eq!(&enc.bytes[1..4], b"PNG");
        assert_eq!(enc.page_num, 1);
    }

    #[test]
    fn oversized_png_falls_back_to_jpeg() {
        let img = noisy_image(200, 200);
        let enc = encode_page(7, &img, 20_000, &[85, 70, 60, 50]).expect("encode");
        assert_eq!(enc.mime_type, "image/jpeg");
        // JPEG SOI marker
        assert_eq!(&enc.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn empty_ladder_keeps_png() {
        let img = noisy_image(64, 64);
        let enc = encode_page(2, &img, 10, &[]).expect("encode");
        assert_eq!(enc.mime_type, "image/png");
    }

    #[test]
    fn image_data_is_base64() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        let enc = encode_page(1, &img, usize::MAX, &[85]).expect("encode");
        let data = enc.to_image_data();
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, enc.bytes);
    }
}
