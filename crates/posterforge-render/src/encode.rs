//! Raster encoders and data URL helpers.

use crate::error::{RenderError, RenderResult};
use crate::raster::RasterImage;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;

/// Encode as PNG, keeping alpha.
pub fn encode_png(image: &RasterImage) -> RenderResult<Vec<u8>> {
    let mut data = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut data, image.width, image.height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder
            .write_header()
            .map_err(|e| RenderError::Encode(format!("PNG header: {e}")))?;
        writer
            .write_image_data(&image.pixels)
            .map_err(|e| RenderError::Encode(format!("PNG data: {e}")))?;
    }
    Ok(data)
}

/// Encode as JPEG at `quality` (1-100). Transparent pixels are composited over white.
pub fn encode_jpeg(image: &RasterImage, quality: u8) -> RenderResult<Vec<u8>> {
    let rgb = flatten_over_white(image);
    let mut data = Vec::new();
    JpegEncoder::new_with_quality(&mut data, quality.clamp(1, 100))
        .write_image(
            &rgb,
            image.width,
            image.height,
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| RenderError::Encode(format!("JPEG: {e}")))?;
    Ok(data)
}

/// Encode as WEBP. The encoder is lossless, so `quality` drives a color
/// quantization pass beforehand: lower quality, fewer distinct colors.
pub fn encode_webp(image: &RasterImage, quality: u8) -> RenderResult<Vec<u8>> {
    let step = quantization_step(quality);
    let pixels: Vec<u8> = if step <= 1 {
        image.pixels.clone()
    } else {
        image
            .pixels
            .chunks_exact(4)
            .flat_map(|p| {
                [
                    quantize(p[0], step),
                    quantize(p[1], step),
                    quantize(p[2], step),
                    p[3],
                ]
            })
            .collect()
    };

    let mut data = Vec::new();
    WebPEncoder::new_lossless(&mut data)
        .write_image(
            &pixels,
            image.width,
            image.height,
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|e| RenderError::Encode(format!("WEBP: {e}")))?;
    Ok(data)
}

/// Channel bucket width for a WEBP quality: 1 at 100, 64 at 10 and below.
fn quantization_step(quality: u8) -> u8 {
    let q = u32::from(quality.clamp(10, 100));
    (1 + (100 - q) * 63 / 90) as u8
}

fn quantize(value: u8, step: u8) -> u8 {
    let step = u16::from(step);
    let bucket = u16::from(value) / step * step;
    (bucket + step / 2).min(255) as u8
}

pub(crate) fn flatten_over_white(image: &RasterImage) -> Vec<u8> {
    image
        .pixels
        .chunks_exact(4)
        .flat_map(|p| {
            let a = u16::from(p[3]);
            let blend = |c: u8| ((u16::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
            [blend(p[0]), blend(p[1]), blend(p[2])]
        })
        .collect()
}

/// `data:{mime};base64,...`
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Split a base64 data URL into its MIME type and decoded bytes.
pub fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(payload.trim()).ok()?;
    Some((mime.to_string(), bytes))
}

/// Size of the bytes behind a base64 payload of `encoded_len` characters.
pub fn estimated_size(encoded_len: usize) -> usize {
    encoded_len * 3 / 4
}

/// Estimated transfer size of `bytes` once base64 encoded and decoded again.
pub fn estimated_payload_size(bytes: &[u8]) -> usize {
    estimated_size(base64::encoded_len(bytes.len(), true).unwrap_or(usize::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ImageFormat;

    fn gradient(width: u32, height: u32, alpha: u8) -> RasterImage {
        let mut pixels = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let (r, g, b) = ((x * 7) as u8, (y * 5) as u8, ((x ^ y) * 3) as u8);
                pixels.extend_from_slice(&[r, g, b, alpha]);
            }
        }
        RasterImage {
            width,
            height,
            pixels,
        }
    }

    #[test]
    fn test_png_signature() {
        let data = encode_png(&gradient(8, 8, 255)).unwrap();
        assert_eq!(ImageFormat::from_magic_bytes(&data), Some(ImageFormat::Png));
    }

    #[test]
    fn test_jpeg_quality_shrinks_output() {
        let image = gradient(64, 64, 255);
        let high = encode_jpeg(&image, 95).unwrap();
        let low = encode_jpeg(&image, 10).unwrap();
        assert_eq!(ImageFormat::from_magic_bytes(&high), Some(ImageFormat::Jpeg));
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_jpeg_flattens_over_white() {
        let rgb = flatten_over_white(&gradient(1, 1, 0));
        assert_eq!(rgb, vec![255, 255, 255]);
    }

    #[test]
    fn test_webp_signature_and_quantization() {
        let image = gradient(64, 64, 255);
        let full = encode_webp(&image, 100).unwrap();
        let coarse = encode_webp(&image, 10).unwrap();
        assert_eq!(ImageFormat::from_magic_bytes(&full), Some(ImageFormat::WebP));
        assert!(coarse.len() <= full.len());
    }

    #[test]
    fn test_quantization_step_bounds() {
        assert_eq!(quantization_step(100), 1);
        assert_eq!(quantization_step(10), 64);
        assert_eq!(quantization_step(0), 64);
        assert_eq!(quantize(255, 64), 224);
        assert_eq!(quantize(10, 64), 32);
    }

    #[test]
    fn test_data_url_roundtrip() {
        let url = to_data_url("image/png", &[1, 2, 3, 4]);
        assert!(url.starts_with("data:image/png;base64,"));
        let (mime, bytes) = decode_data_url(&url).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, vec![1, 2, 3, 4]);
        assert!(decode_data_url("https://example.com/a.png").is_none());
    }

    #[test]
    fn test_estimated_size_is_three_quarters_of_base64() {
        assert_eq!(estimated_size(400), 300);
        assert_eq!(estimated_payload_size(&[0u8; 300]), 300);
    }
}
