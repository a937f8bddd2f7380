//! Band repainting of rectangle edges.
//!
//! For every candidate rectangle the painter finds the true annotation
//! lines inside a search strip at each edge, then rewrites a narrow band
//! around each line from perpendicular background samples. Two auxiliary
//! passes emit inpaint masks for strongly-colored edge bands and for
//! saturated vertical column runs that the band logic cannot express.

use crate::calibration::Calibration;
use crate::color::{is_likely_mark, is_marker, is_overlay_like_strong, is_strong_for_inpaint};
use crate::geometry::{NormalizedBox, PixelRect};
use crate::image_io::ImageData;
use crate::mask_detector::dilate_mask;
use rgb::RGBA8;
use tracing::debug;

/// Band width bounds (pixels).
const BAND_MIN: usize = 4;
const BAND_MAX: usize = 22;
/// Band cap for huge boxes.
const BAND_MAX_HUGE: usize = 12;
/// Stride when scoring frame bands for marker color.
const SCORE_STRIDE: usize = 3;
/// Axis-swap acceptance: swapped score must reach this floor...
const SWAP_MIN_SCORE: u32 = 12;
/// ...and dominate the original by this factor.
const SWAP_DOMINANCE: u32 = 2;
/// First perpendicular sample offset past the band, and how far it may creep.
const SAMPLE_EXTRA: usize = 3;
const SAMPLE_CREEP: usize = 12;
/// Radius of the directional relaxed average.
const RELAXED_RADIUS: usize = 8;
/// Luma contrast floor for the strong-color edge band.
const STRONG_EDGE_CONTRAST: i32 = 22;

/// A rectangle the painter evaluated, with the band width it used and
/// whether the bands were actually repainted (the huge-box guard may
/// decline). The orchestrator builds the ROI from these.
#[derive(Debug, Clone, Copy)]
pub struct UsedRect {
    pub rect: PixelRect,
    pub band: usize,
    pub painted: bool,
}

/// Count marker-colored pixels in the frame band of `rect`, sampling every
/// third pixel. This is the "frame score" used by the axis-swap check and
/// the huge-box guard.
pub fn frame_score(image: &ImageData, rect: &PixelRect) -> u32 {
    if rect.is_empty() {
        return 0;
    }
    let band = band_width(rect, false);
    let w = image.width as usize;
    let mut score = 0u32;

    let mut tally = |x: usize, y: usize| {
        let p = image.pixels[y * w + x];
        if is_marker(p.r, p.g, p.b) {
            score += 1;
        }
    };

    let top_end = (rect.y1 + band).min(rect.y2);
    let bottom_start = rect.y2.saturating_sub(band).max(rect.y1);
    for y in rect.y1..top_end {
        for x in (rect.x1..rect.x2).step_by(SCORE_STRIDE) {
            tally(x, y);
        }
    }
    for y in bottom_start..rect.y2 {
        for x in (rect.x1..rect.x2).step_by(SCORE_STRIDE) {
            tally(x, y);
        }
    }
    let left_end = (rect.x1 + band).min(rect.x2);
    let right_start = rect.x2.saturating_sub(band).max(rect.x1);
    for x in rect.x1..left_end {
        for y in (rect.y1..rect.y2).step_by(SCORE_STRIDE) {
            tally(x, y);
        }
    }
    for x in right_start..rect.x2 {
        for y in (rect.y1..rect.y2).step_by(SCORE_STRIDE) {
            tally(x, y);
        }
    }
    score
}

fn band_width(rect: &PixelRect, huge: bool) -> usize {
    let base = (0.08 * rect.width().min(rect.height()) as f64).round() as usize;
    let band = base.clamp(BAND_MIN, BAND_MAX);
    if huge {
        band.min(BAND_MAX_HUGE)
    } else {
        band
    }
}

/// Repaint one candidate rectangle: axis-swap sanity, band width, huge-box
/// guard, line location, band repaint. Returns the rectangle and band
/// actually used; a guard-declined rectangle comes back with `painted:
/// false` so the mask detectors still get their chance inside it.
#[allow(clippy::too_many_arguments)]
pub fn paint_rectangle(
    image: &mut ImageData,
    changed: &mut [u8],
    candidate: &NormalizedBox,
    local_boxes: &[NormalizedBox],
    cal: &Calibration,
    conservative: bool,
    force_paint_hint: bool,
) -> Option<UsedRect> {
    let width = image.width;
    let height = image.height;

    // Axis-order sanity: a confused upstream sometimes sends (y, x) pairs.
    let rect = candidate.to_pixel_rect(width, height);
    let swapped_box = candidate.axis_swapped();
    let swapped_rect = swapped_box.to_pixel_rect(width, height);
    let s1 = frame_score(image, &rect);
    let s2 = frame_score(image, &swapped_rect);
    let (nbox, rect, score) = if s2 >= SWAP_MIN_SCORE && s2 > SWAP_DOMINANCE * s1 {
        debug!(s1, s2, "axis-swap sanity preferred swapped box orientation");
        (swapped_box, swapped_rect, s2)
    } else {
        (*candidate, rect, s1)
    };

    if rect.width() < 8 || rect.height() < 8 {
        return None;
    }

    let total = width as u64 * height as u64;
    let huge = rect.area() as f64 > cal.huge_box_area_ratio * total as f64;
    let band = band_width(&rect, huge);

    // Unmatched huge boxes are suspicious; require a convincing frame.
    if huge {
        let matched = local_boxes.iter().any(|lb| nbox.iou(lb) > 0.55);
        if !matched {
            let floor = if conservative {
                cal.huge_box_min_score_complex
            } else {
                cal.huge_box_min_score_simple
            };
            if score < floor {
                debug!(score, floor, "huge-box guard declined to repaint candidate");
                return Some(UsedRect { rect, band, painted: false });
            }
        }
    }

    let w = rect.width();
    let h = rect.height();
    let run_factor = if conservative { 0.28 } else { 0.22 };

    let search_y = ((0.45 * h as f64).round() as usize).clamp(40, 280).min(h);
    let search_x = ((0.45 * w as f64).round() as usize).clamp(40, 280).min(w);
    let row_threshold = ((run_factor * w as f64) as usize).max(60);
    let col_threshold = ((run_factor * h as f64) as usize).max(60);

    let (top_row, top_hit) = locate_line_row(
        image, &rect, rect.y1, rect.y1 + search_y, row_threshold, rect.y1 + band / 2,
    );
    let (bottom_row, bottom_hit) = locate_line_row(
        image,
        &rect,
        rect.y2.saturating_sub(search_y).max(rect.y1),
        rect.y2,
        row_threshold,
        rect.y2 - 1 - (band / 2).min(rect.y2 - 1),
    );
    let (left_col, left_hit) = locate_line_col(
        image, &rect, rect.x1, rect.x1 + search_x, col_threshold, rect.x1 + band / 2,
    );
    let (right_col, right_hit) = locate_line_col(
        image,
        &rect,
        rect.x2.saturating_sub(search_x).max(rect.x1),
        rect.x2,
        col_threshold,
        rect.x2 - 1 - (band / 2).min(rect.x2 - 1),
    );

    let sides_hit = [top_hit, bottom_hit, left_hit, right_hit]
        .iter()
        .filter(|&&b| b)
        .count();
    let force_paint = force_paint_hint || sides_hit >= 2;

    let thresholds = PaintThresholds::new(conservative);
    repaint_row_band(image, changed, &rect, top_row, band, force_paint, &thresholds);
    repaint_row_band(image, changed, &rect, bottom_row, band, force_paint, &thresholds);
    repaint_col_band(image, changed, &rect, left_col, band, force_paint, &thresholds);
    repaint_col_band(image, changed, &rect, right_col, band, force_paint, &thresholds);

    Some(UsedRect { rect, band, painted: true })
}

struct PaintThresholds {
    side_diff_max: i32,
    force_color_diff: i32,
    outlier_diff: i32,
}

impl PaintThresholds {
    fn new(conservative: bool) -> Self {
        if conservative {
            Self { side_diff_max: 110, force_color_diff: 90, outlier_diff: 96 }
        } else {
            Self { side_diff_max: 140, force_color_diff: 72, outlier_diff: 84 }
        }
    }
}

/// Find the row in `[y_from, y_to)` whose longest contiguous run of
/// likely-mark pixels is maximal. Returns `(row, true)` when the run meets
/// `threshold`, else `(fallback, false)`.
fn locate_line_row(
    image: &ImageData,
    rect: &PixelRect,
    y_from: usize,
    y_to: usize,
    threshold: usize,
    fallback: usize,
) -> (usize, bool) {
    let w = image.width as usize;
    let mut best_row = fallback;
    let mut best_run = 0usize;
    for y in y_from..y_to.min(rect.y2) {
        let mut run = 0usize;
        let mut row_best = 0usize;
        for x in rect.x1..rect.x2 {
            let p = image.pixels[y * w + x];
            if is_likely_mark(p.r, p.g, p.b) {
                run += 1;
                row_best = row_best.max(run);
            } else {
                run = 0;
            }
        }
        if row_best > best_run {
            best_run = row_best;
            best_row = y;
        }
    }
    if best_run >= threshold {
        (best_row, true)
    } else {
        (fallback, false)
    }
}

fn locate_line_col(
    image: &ImageData,
    rect: &PixelRect,
    x_from: usize,
    x_to: usize,
    threshold: usize,
    fallback: usize,
) -> (usize, bool) {
    let w = image.width as usize;
    let mut best_col = fallback;
    let mut best_run = 0usize;
    for x in x_from..x_to.min(rect.x2) {
        let mut run = 0usize;
        let mut col_best = 0usize;
        for y in rect.y1..rect.y2 {
            let p = image.pixels[y * w + x];
            if is_likely_mark(p.r, p.g, p.b) {
                run += 1;
                col_best = col_best.max(run);
            } else {
                run = 0;
            }
        }
        if col_best > best_run {
            best_run = col_best;
            best_col = x;
        }
    }
    if best_run >= threshold {
        (best_col, true)
    } else {
        (fallback, false)
    }
}

/// One background sample at increasing perpendicular offsets from the line.
fn sample_at_offsets(
    image: &ImageData,
    x: i64,
    y: i64,
    dx: i64,
    dy: i64,
    base_offset: usize,
) -> Option<RGBA8> {
    let w = image.width as i64;
    let h = image.height as i64;
    let mut off = base_offset as i64;
    while off <= (base_offset + SAMPLE_CREEP) as i64 {
        let sx = x + dx * off;
        let sy = y + dy * off;
        if sx >= 0 && sx < w && sy >= 0 && sy < h {
            let p = image.pixels[(sy * w + sx) as usize];
            if !is_likely_mark(p.r, p.g, p.b) {
                return Some(p);
            }
        }
        off += 2;
    }
    None
}

/// Average of non-mark pixels within `RELAXED_RADIUS` steps along the
/// perpendicular, both directions.
fn relaxed_average(image: &ImageData, x: i64, y: i64, dx: i64, dy: i64) -> Option<[u8; 3]> {
    let w = image.width as i64;
    let h = image.height as i64;
    let mut sum = [0u32; 3];
    let mut n = 0u32;
    for dir in [-1i64, 1] {
        for d in 1..=RELAXED_RADIUS as i64 {
            let sx = x + dx * d * dir;
            let sy = y + dy * d * dir;
            if sx < 0 || sx >= w || sy < 0 || sy >= h {
                continue;
            }
            let p = image.pixels[(sy * w + sx) as usize];
            if is_likely_mark(p.r, p.g, p.b) {
                continue;
            }
            sum[0] += p.r as u32;
            sum[1] += p.g as u32;
            sum[2] += p.b as u32;
            n += 1;
        }
    }
    if n == 0 {
        return None;
    }
    Some([(sum[0] / n) as u8, (sum[1] / n) as u8, (sum[2] / n) as u8])
}

#[inline]
fn l1(a: [u8; 3], b: [u8; 3]) -> i32 {
    (a[0] as i32 - b[0] as i32).abs()
        + (a[1] as i32 - b[1] as i32).abs()
        + (a[2] as i32 - b[2] as i32).abs()
}

/// Replacement estimate for one pixel: perpendicular side averages when
/// available, the relaxed directional average otherwise.
fn replacement_for(
    image: &ImageData,
    x: i64,
    y: i64,
    line_x: i64,
    line_y: i64,
    dx: i64,
    dy: i64,
    band: usize,
) -> Option<([u8; 3], i32)> {
    let base_offset = band + SAMPLE_EXTRA;
    // Sample outward from the located line, not from the current scanline,
    // so the whole band shares stable anchors.
    let (ax, ay) = if dx == 0 { (x, line_y) } else { (line_x, y) };
    let a = sample_at_offsets(image, ax, ay, -dx, -dy, base_offset);
    let b = sample_at_offsets(image, ax, ay, dx, dy, base_offset);
    match (a, b) {
        (Some(pa), Some(pb)) => {
            let ca = [pa.r, pa.g, pa.b];
            let cb = [pb.r, pb.g, pb.b];
            let avg = [
                ((ca[0] as u16 + cb[0] as u16) / 2) as u8,
                ((ca[1] as u16 + cb[1] as u16) / 2) as u8,
                ((ca[2] as u16 + cb[2] as u16) / 2) as u8,
            ];
            Some((avg, l1(ca, cb)))
        }
        (Some(p), None) | (None, Some(p)) => Some(([p.r, p.g, p.b], 0)),
        (None, None) => relaxed_average(image, x, y, dx, dy).map(|avg| (avg, 0)),
    }
}

fn decide_candidate(
    pixel: RGBA8,
    replacement: [u8; 3],
    side_diff: i32,
    force_paint: bool,
    t: &PaintThresholds,
) -> bool {
    if is_marker(pixel.r, pixel.g, pixel.b) {
        return true;
    }
    let color_diff = l1([pixel.r, pixel.g, pixel.b], replacement);
    if force_paint {
        side_diff <= t.side_diff_max && color_diff >= t.force_color_diff
    } else {
        color_diff >= t.outlier_diff
    }
}

/// Write grouped candidate runs along one scanline. `min_run` filters noise
/// while keeping long straight lines.
fn commit_runs(
    image: &mut ImageData,
    changed: &mut [u8],
    candidates: &[Option<[u8; 3]>],
    min_run: usize,
    mut write: impl FnMut(&mut ImageData, &mut [u8], usize, [u8; 3]),
) {
    let mut i = 0usize;
    while i < candidates.len() {
        if candidates[i].is_none() {
            i += 1;
            continue;
        }
        let start = i;
        while i < candidates.len() && candidates[i].is_some() {
            i += 1;
        }
        if i - start >= min_run {
            for j in start..i {
                if let Some(color) = candidates[j] {
                    write(image, changed, j, color);
                }
            }
        }
    }
}

fn repaint_row_band(
    image: &mut ImageData,
    changed: &mut [u8],
    rect: &PixelRect,
    line_y: usize,
    band: usize,
    force_paint: bool,
    t: &PaintThresholds,
) {
    let w = image.width as usize;
    let h = image.height as usize;
    let half = (band / 2).max(2);
    let min_run = ((0.06 * rect.width() as f64).round() as usize).max(8);

    let y_from = line_y.saturating_sub(half);
    let y_to = (line_y + half + 1).min(h);
    for y in y_from..y_to {
        let mut candidates: Vec<Option<[u8; 3]>> = vec![None; rect.width()];
        for x in rect.x1..rect.x2 {
            let pixel = image.pixels[y * w + x];
            if let Some((replacement, side_diff)) = replacement_for(
                image,
                x as i64,
                y as i64,
                x as i64,
                line_y as i64,
                0,
                1,
                band,
            ) {
                if decide_candidate(pixel, replacement, side_diff, force_paint, t) {
                    candidates[x - rect.x1] = Some(replacement);
                }
            }
        }
        commit_runs(image, changed, &candidates, min_run, |img, chg, j, color| {
            let x = rect.x1 + j;
            let idx = y * w + x;
            let a = img.pixels[idx].a;
            img.pixels[idx] = RGBA8::new(color[0], color[1], color[2], a);
            chg[idx] = 1;
        });
    }
}

fn repaint_col_band(
    image: &mut ImageData,
    changed: &mut [u8],
    rect: &PixelRect,
    line_x: usize,
    band: usize,
    force_paint: bool,
    t: &PaintThresholds,
) {
    let w = image.width as usize;
    let half = (band / 2).max(2);
    let min_run = ((0.06 * rect.height() as f64).round() as usize).max(8);

    let x_from = line_x.saturating_sub(half);
    let x_to = (line_x + half + 1).min(w);
    for x in x_from..x_to {
        let mut candidates: Vec<Option<[u8; 3]>> = vec![None; rect.height()];
        for y in rect.y1..rect.y2 {
            let pixel = image.pixels[y * w + x];
            if let Some((replacement, side_diff)) = replacement_for(
                image,
                x as i64,
                y as i64,
                line_x as i64,
                y as i64,
                1,
                0,
                band,
            ) {
                if decide_candidate(pixel, replacement, side_diff, force_paint, t) {
                    candidates[y - rect.y1] = Some(replacement);
                }
            }
        }
        commit_runs(image, changed, &candidates, min_run, |img, chg, j, color| {
            let y = rect.y1 + j;
            let idx = y * w + x;
            let a = img.pixels[idx].a;
            img.pixels[idx] = RGBA8::new(color[0], color[1], color[2], a);
            chg[idx] = 1;
        });
    }
}

/// Strong-color edge-band mask for a locally-detected box: saturated pixels
/// with real luma contrast inside the frame band, dilated by one.
pub fn strong_edge_band_mask(image: &ImageData, rect: &PixelRect) -> Vec<u8> {
    let w = image.width as usize;
    let h = image.height as usize;
    let mut mask = vec![0u8; w * h];
    if rect.is_empty() {
        return mask;
    }
    let eb = ((0.06 * rect.width().min(rect.height()) as f64).round() as usize).clamp(6, 16);
    let luma = image.luma_plane();

    let mark = |x: usize, y: usize, mask: &mut Vec<u8>| {
        let p = image.pixels[y * w + x];
        if !is_strong_for_inpaint(p.r, p.g, p.b) {
            return;
        }
        let l = luma[y * w + x] as i32;
        let mut contrast = 0i32;
        if x > 0 {
            contrast = contrast.max((l - luma[y * w + x - 1] as i32).abs());
        }
        if x + 1 < w {
            contrast = contrast.max((l - luma[y * w + x + 1] as i32).abs());
        }
        if y > 0 {
            contrast = contrast.max((l - luma[(y - 1) * w + x] as i32).abs());
        }
        if y + 1 < h {
            contrast = contrast.max((l - luma[(y + 1) * w + x] as i32).abs());
        }
        if contrast >= STRONG_EDGE_CONTRAST {
            mask[y * w + x] = 1;
        }
    };

    for y in rect.y1..rect.y2 {
        for x in rect.x1..rect.x2 {
            let in_band = x < rect.x1 + eb
                || x + eb >= rect.x2
                || y < rect.y1 + eb
                || y + eb >= rect.y2;
            if in_band {
                mark(x, y, &mut mask);
            }
        }
    }
    dilate_mask(&mask, w, h, 1)
}

/// Columns in the left/right edge bands dominated by strong overlay red:
/// long runs plus high totals flag the column, whose strong pixels are
/// masked for inpainting.
pub fn strong_column_mask(image: &ImageData, rect: &PixelRect) -> Vec<u8> {
    let w = image.width as usize;
    let h = image.height as usize;
    let mut mask = vec![0u8; w * h];
    if rect.is_empty() {
        return mask;
    }
    let eb = ((0.06 * rect.width().min(rect.height()) as f64).round() as usize).clamp(6, 16);
    let rh = rect.height();
    let min_run = ((0.28 * rh as f64) as usize).max(28);
    let min_count = ((0.22 * rh as f64) as usize).max(36);

    let flag_column = |x: usize, mask: &mut Vec<u8>| {
        let mut run = 0usize;
        let mut longest = 0usize;
        let mut count = 0usize;
        for y in rect.y1..rect.y2 {
            let p = image.pixels[y * w + x];
            if is_overlay_like_strong(p.r, p.g, p.b) {
                run += 1;
                longest = longest.max(run);
                count += 1;
            } else {
                run = 0;
            }
        }
        if longest >= min_run && count >= min_count {
            for y in rect.y1..rect.y2 {
                let p = image.pixels[y * w + x];
                if is_overlay_like_strong(p.r, p.g, p.b) {
                    mask[y * w + x] = 1;
                }
            }
        }
    };

    let left_end = (rect.x1 + eb).min(rect.x2);
    let right_start = rect.x2.saturating_sub(eb).max(left_end);
    for x in rect.x1..left_end {
        flag_column(x, &mut mask);
    }
    for x in right_start..rect.x2 {
        flag_column(x, &mut mask);
    }
    dilate_mask(&mask, w, h, 1)
}

#[cfg(test)]
mod tests {
    include!("painter_tests.rs");
}
