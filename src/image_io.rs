//! Raster buffer, container codec and resampling helpers.
//!
//! The engine works on a flat RGBA buffer; only the RGB channels are ever
//! written, alpha passes through untouched. Containers are detected from
//! magic bytes and the cleaned raster is re-encoded into the same container
//! it arrived in.

use crate::pipeline::CleanError;
use rgb::RGBA8;

/// Decoded raster: contiguous row-major RGBA pixels.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<RGBA8>,
}

impl ImageData {
    #[inline]
    pub fn idx(&self, x: usize, y: usize) -> usize {
        y * self.width as usize + x
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> RGBA8 {
        self.pixels[y * self.width as usize + x]
    }

    /// Luminance plane, `0.299 R + 0.587 G + 0.114 B`.
    pub fn luma_plane(&self) -> Vec<u8> {
        self.pixels
            .iter()
            .map(|p| (0.299 * p.r as f64 + 0.587 * p.g as f64 + 0.114 * p.b as f64) as u8)
            .collect()
    }
}

/// Supported input/output containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Jpeg,
    Png,
    Webp,
}

/// Sniff the container from magic bytes.
pub fn sniff_container(bytes: &[u8]) -> Option<Container> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(Container::Jpeg)
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some(Container::Png)
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some(Container::Webp)
    } else {
        None
    }
}

/// Decode encoded bytes into an RGBA buffer, reporting the container.
pub fn decode_bytes(bytes: &[u8]) -> Result<(ImageData, Container), CleanError> {
    let container = sniff_container(bytes).ok_or(CleanError::UnsupportedContainer)?;
    let decoded = image::load_from_memory(bytes)?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(CleanError::EmptyImage);
    }
    let pixels: Vec<RGBA8> = rgba
        .pixels()
        .map(|p| RGBA8::new(p[0], p[1], p[2], p[3]))
        .collect();
    Ok((ImageData { width, height, pixels }, container))
}

/// Re-encode a buffer into the given container (JPEG q98, WEBP lossy q95,
/// PNG lossless).
pub fn encode_image(image: &ImageData, container: Container) -> Result<Vec<u8>, CleanError> {
    let mut out = Vec::new();
    let w = image.width;
    let h = image.height;
    match container {
        Container::Jpeg => {
            // JPEG carries no alpha; flatten to RGB.
            let rgb: Vec<u8> = image
                .pixels
                .iter()
                .flat_map(|p| [p.r, p.g, p.b])
                .collect();
            let mut enc = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 98);
            enc.encode(&rgb, w, h, image::ColorType::Rgb8)
                .map_err(CleanError::Encode)?;
        }
        Container::Png => {
            let rgba: Vec<u8> = image
                .pixels
                .iter()
                .flat_map(|p| [p.r, p.g, p.b, p.a])
                .collect();
            use image::ImageEncoder;
            image::codecs::png::PngEncoder::new(&mut out)
                .write_image(&rgba, w, h, image::ColorType::Rgba8)
                .map_err(CleanError::Encode)?;
        }
        Container::Webp => {
            let rgba: Vec<u8> = image
                .pixels
                .iter()
                .flat_map(|p| [p.r, p.g, p.b, p.a])
                .collect();
            use image::codecs::webp::WebPEncoder;
            use image::ImageEncoder;
            WebPEncoder::new_lossless(&mut out)
                .write_image(&rgba, w, h, image::ColorType::Rgba8)
                .map_err(CleanError::Encode)?;
        }
    }
    Ok(out)
}

/// A nearest-neighbor downscale plus the factors that map its coordinates
/// back to the source frame (`full = down * scale`).
#[derive(Debug, Clone)]
pub struct Downscaled {
    pub image: ImageData,
    pub scale_x: f64,
    pub scale_y: f64,
}

/// Nearest-neighbor downscale to at most `target_width` columns. Images
/// already at or below the target are copied with scale 1.
pub fn downscale_nearest(image: &ImageData, target_width: u32) -> Downscaled {
    if image.width <= target_width {
        return Downscaled {
            image: image.clone(),
            scale_x: 1.0,
            scale_y: 1.0,
        };
    }
    let sw = target_width.max(1);
    let sh = ((image.height as u64 * sw as u64) / image.width as u64).max(1) as u32;
    let scale_x = image.width as f64 / sw as f64;
    let scale_y = image.height as f64 / sh as f64;

    let mut pixels = Vec::with_capacity((sw * sh) as usize);
    let w = image.width as usize;
    for y in 0..sh {
        let src_y = ((y as f64 * scale_y) as usize).min(image.height as usize - 1);
        let row = src_y * w;
        for x in 0..sw {
            let src_x = ((x as f64 * scale_x) as usize).min(w - 1);
            pixels.push(image.pixels[row + src_x]);
        }
    }
    Downscaled {
        image: ImageData { width: sw, height: sh, pixels },
        scale_x,
        scale_y,
    }
}
