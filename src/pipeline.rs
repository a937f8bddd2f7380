//! The fixed cleaning pipeline.
//!
//! Stages run in a strict order: texture estimate, local box detection,
//! candidate merging, local-box mask inpainting, band repainting, ROI mask
//! inpainting, smoothing, re-encode. Detector failures degrade to empty
//! candidate sets; only decode/encode problems and cancellation are fatal.

use crate::ai_boxes;
use crate::box_detector::{detect_overlay_strokes, detect_rectangles};
use crate::calibration::Calibration;
use crate::geometry::{merge_boxes, NormalizedBox, PixelRect};
use crate::image_io::{decode_bytes, encode_image, ImageData};
use crate::inpaint::{inpaint, smooth_changed, InpaintAlgorithm};
use crate::mask_detector::{corner_line_mask, edge_mask_in_box, stroke_mask, EDGE_MASK_THRESHOLD};
use crate::painter::{paint_rectangle, strong_column_mask, strong_edge_band_mask, UsedRect};
use crate::texture::texture_score;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::debug;

/// Most used rectangles remembered for ROI construction.
const MAX_USED_RECTS: usize = 24;
/// ROI frame-band width bounds around a used rectangle.
const ROI_BAND_MIN: usize = 10;
const ROI_BAND_MAX: usize = 34;

/// Fatal pipeline errors. Detector-local problems never surface here.
#[derive(Debug, Error)]
pub enum CleanError {
    #[error("unsupported or unrecognized image container")]
    UnsupportedContainer,
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has no pixels")]
    EmptyImage,
    #[error("failed to encode output: {0}")]
    Encode(image::ImageError),
    #[error("operation cancelled")]
    Cancelled,
}

/// Cooperative cancellation handle, checked between pipeline stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-invocation configuration.
#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    pub calibration: Calibration,
    pub algorithm: InpaintAlgorithm,
    pub cancel: Option<CancelToken>,
}

/// Diagnostic statistics for one invocation.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CleanStats {
    /// Pixels written by any stage.
    pub changed_pixels: u64,
    /// Pixels only fillable by uniform neighborhood averaging.
    pub fallback_pixels: u64,
    /// Width times height.
    pub total_pixels: u64,
    /// Wall-clock time of the invocation.
    pub duration_ms: u64,
    /// Scene complexity score; high values mean conservative policies ran.
    pub texture_score: f64,
}

/// Result of [`clean_bytes`]: re-encoded image plus statistics.
#[derive(Debug, Clone)]
pub struct CleanOutput {
    pub bytes: Vec<u8>,
    pub stats: CleanStats,
}

fn check_cancel(options: &CleanOptions) -> Result<(), CleanError> {
    match &options.cancel {
        Some(token) if token.is_cancelled() => Err(CleanError::Cancelled),
        _ => Ok(()),
    }
}

/// Clean encoded image bytes. The output is encoded in the same container
/// the input arrived in; when neither the caller nor the local detectors
/// produce any candidate box, the input bytes are returned untouched.
pub fn clean_bytes(
    bytes: &[u8],
    boxes: &[NormalizedBox],
    options: &CleanOptions,
) -> Result<CleanOutput, CleanError> {
    let start = Instant::now();
    let (image, container) = decode_bytes(bytes)?;
    match run_pipeline(&image, boxes, options)? {
        None => {
            let mut stats = CleanStats {
                total_pixels: image.width as u64 * image.height as u64,
                ..CleanStats::default()
            };
            stats.duration_ms = start.elapsed().as_millis() as u64;
            Ok(CleanOutput { bytes: bytes.to_vec(), stats })
        }
        Some((cleaned, mut stats)) => {
            let out = encode_image(&cleaned, container)?;
            stats.duration_ms = start.elapsed().as_millis() as u64;
            Ok(CleanOutput { bytes: out, stats })
        }
    }
}

/// Clean an already-decoded raster.
pub fn clean_image(
    image: &ImageData,
    boxes: &[NormalizedBox],
    options: &CleanOptions,
) -> Result<(ImageData, CleanStats), CleanError> {
    let start = Instant::now();
    if image.width == 0 || image.height == 0 {
        return Err(CleanError::EmptyImage);
    }
    let (cleaned, mut stats) = match run_pipeline(image, boxes, options)? {
        None => (
            image.clone(),
            CleanStats {
                total_pixels: image.width as u64 * image.height as u64,
                ..CleanStats::default()
            },
        ),
        Some(result) => result,
    };
    stats.duration_ms = start.elapsed().as_millis() as u64;
    Ok((cleaned, stats))
}

/// The fixed stage sequence. Returns `None` when no candidate box exists at
/// all, which callers translate into a bytewise-identical output.
fn run_pipeline(
    image: &ImageData,
    boxes: &[NormalizedBox],
    options: &CleanOptions,
) -> Result<Option<(ImageData, CleanStats)>, CleanError> {
    let cal = &options.calibration;
    let width = image.width;
    let height = image.height;
    let total = width as u64 * height as u64;
    if total == 0 {
        return Err(CleanError::EmptyImage);
    }

    check_cancel(options)?;
    let tex = texture_score(image);
    let complex = tex > cal.texture_complexity;

    check_cancel(options)?;
    let mut local_boxes = detect_rectangles(image);
    local_boxes.extend(detect_overlay_strokes(image));
    debug!(local = local_boxes.len(), "local box detection done");

    let ai_boxes: Vec<NormalizedBox> = boxes
        .iter()
        .map(|b| NormalizedBox::sanitized(b.xmin, b.ymin, b.xmax, b.ymax))
        .collect();
    let merged = merge_boxes(&ai_boxes, &local_boxes);
    if merged.is_empty() {
        return Ok(None);
    }

    let mut work = image.clone();
    let mut changed = vec![0u8; total as usize];
    let mut fallback_pixels = 0u64;

    // Strong-color and edge-gradient masks around locally-detected boxes.
    check_cancel(options)?;
    let pad = (0.008 * width.min(height) as f64).round().max(2.0) as usize;
    for lb in &local_boxes {
        let rect = lb.to_pixel_rect(width, height).padded(pad, width, height);
        if rect.is_empty() {
            continue;
        }
        let mut mask = strong_edge_band_mask(&work, &rect);
        fallback_pixels += inpaint(&mut work, &mut mask, &mut changed, options.algorithm, cal);
        let mut mask = strong_column_mask(&work, &rect);
        fallback_pixels += inpaint(&mut work, &mut mask, &mut changed, options.algorithm, cal);
        let mut mask = edge_mask_in_box(&work, &rect, EDGE_MASK_THRESHOLD);
        fallback_pixels += inpaint(&mut work, &mut mask, &mut changed, options.algorithm, cal);
    }

    // Band repainting of every merged candidate.
    check_cancel(options)?;
    let mut used_rects: Vec<UsedRect> = Vec::new();
    for mb in &merged {
        if let Some(used) =
            paint_rectangle(&mut work, &mut changed, mb, &local_boxes, cal, complex, false)
        {
            if used_rects.len() < MAX_USED_RECTS {
                used_rects.push(used);
            }
        }
    }

    // ROI-restricted fallback masks.
    check_cancel(options)?;
    if !used_rects.is_empty() {
        let roi = build_roi(&used_rects, width as usize, height as usize);
        let mut mask = corner_line_mask(&work, &roi, cal);
        fallback_pixels += inpaint(&mut work, &mut mask, &mut changed, options.algorithm, cal);
        let mut mask = stroke_mask(&work, complex, &roi, cal);
        fallback_pixels += inpaint(&mut work, &mut mask, &mut changed, options.algorithm, cal);
    }

    check_cancel(options)?;
    smooth_changed(&mut work, &changed, complex);

    let changed_pixels = changed.iter().map(|&c| c as u64).sum();
    let stats = CleanStats {
        changed_pixels,
        fallback_pixels,
        total_pixels: total,
        duration_ms: 0,
        texture_score: tex,
    };
    Ok(Some((work, stats)))
}

/// Region the fallback mask detectors may act in. A repainted rectangle
/// contributes its frame band; a rectangle the painter declined contributes
/// its whole interior, so stray strokes inside a candidate box still get
/// cleaned by the mask detectors.
fn build_roi(used_rects: &[UsedRect], w: usize, h: usize) -> Vec<u8> {
    let mut roi = vec![0u8; w * h];
    for used in used_rects {
        let rect = used.rect;
        let fb = ((0.06 * rect.width().min(rect.height()) as f64).round() as usize)
            .clamp(ROI_BAND_MIN, ROI_BAND_MAX);
        let outer = rect.padded(fb, w as u32, h as u32);
        let inner = if used.painted {
            PixelRect::clamped(
                (rect.x1 + fb) as i64,
                (rect.y1 + fb) as i64,
                rect.x2 as i64 - fb as i64,
                rect.y2 as i64 - fb as i64,
                w as u32,
                h as u32,
            )
        } else {
            PixelRect { x1: 0, y1: 0, x2: 0, y2: 0 }
        };
        for y in outer.y1..outer.y2 {
            for x in outer.x1..outer.x2 {
                if !inner.contains(x, y) {
                    roi[y * w + x] = 1;
                }
            }
        }
    }
    roi
}

/// Parse an upstream box-list JSON document and clean the image with it.
/// Convenience wrapper for callers holding the provider response verbatim.
pub fn clean_bytes_with_raw_boxes(
    bytes: &[u8],
    raw_boxes_json: &str,
    options: &CleanOptions,
) -> Result<CleanOutput, CleanError> {
    let boxes = ai_boxes::parse_box_list(raw_boxes_json);
    clean_bytes(bytes, &boxes, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_io::Container;
    use rgb::RGBA8;

    fn white(w: u32, h: u32) -> ImageData {
        ImageData {
            width: w,
            height: h,
            pixels: vec![RGBA8::new(255, 255, 255, 255); (w * h) as usize],
        }
    }

    #[test]
    fn test_empty_call_returns_input_bytewise() {
        let img = white(64, 64);
        let bytes = encode_image(&img, Container::Png).unwrap();
        let out = clean_bytes(&bytes, &[], &CleanOptions::default()).unwrap();
        assert_eq!(out.bytes, bytes);
        assert_eq!(out.stats.changed_pixels, 0);
        assert_eq!(out.stats.total_pixels, 64 * 64);
    }

    #[test]
    fn test_blank_image_with_box_changes_nothing() {
        let img = white(100, 100);
        let boxes = [NormalizedBox::sanitized(0.2, 0.2, 0.6, 0.6)];
        let (out, stats) = clean_image(&img, &boxes, &CleanOptions::default()).unwrap();
        assert_eq!(stats.changed_pixels, 0);
        assert_eq!(out.pixels, img.pixels);
    }

    #[test]
    fn test_out_of_range_boxes_are_sanitized() {
        let img = white(100, 100);
        let boxes = [NormalizedBox {
            xmin: 1.8,
            ymin: -0.4,
            xmax: 0.1,
            ymax: 0.5,
        }];
        // Must not panic; the swapped/clamped box is processed normally.
        let (_, stats) = clean_image(&img, &boxes, &CleanOptions::default()).unwrap();
        assert_eq!(stats.changed_pixels, 0);
    }

    #[test]
    fn test_cancellation_is_fatal() {
        let img = white(100, 100);
        let token = CancelToken::new();
        token.cancel();
        let options = CleanOptions {
            cancel: Some(token),
            ..CleanOptions::default()
        };
        let boxes = [NormalizedBox::sanitized(0.1, 0.1, 0.9, 0.9)];
        assert!(matches!(
            clean_image(&img, &boxes, &options),
            Err(CleanError::Cancelled)
        ));
    }

    #[test]
    fn test_zero_sized_image_is_fatal() {
        let img = ImageData {
            width: 0,
            height: 0,
            pixels: Vec::new(),
        };
        assert!(matches!(
            clean_image(&img, &[], &CleanOptions::default()),
            Err(CleanError::EmptyImage)
        ));
    }

    #[test]
    fn test_build_roi_band_shape() {
        let used = [UsedRect {
            rect: PixelRect { x1: 40, y1: 40, x2: 160, y2: 160 },
            band: 10,
            painted: true,
        }];
        let roi = build_roi(&used, 200, 200);
        // fb = clamp(10, 34, 0.06*120) = 10
        assert_eq!(roi[40 * 200 + 40], 1); // on the rect corner
        assert_eq!(roi[30 * 200 + 100], 1); // just outside the top edge
        assert_eq!(roi[100 * 200 + 100], 0); // deep interior
        assert_eq!(roi[10 * 200 + 10], 0); // far outside
    }

    #[test]
    fn test_build_roi_unpainted_rect_keeps_interior() {
        let used = [UsedRect {
            rect: PixelRect { x1: 40, y1: 40, x2: 160, y2: 160 },
            band: 10,
            painted: false,
        }];
        let roi = build_roi(&used, 200, 200);
        assert_eq!(roi[100 * 200 + 100], 1); // interior stays eligible
        assert_eq!(roi[10 * 200 + 10], 0);
    }
}
