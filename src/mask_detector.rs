//! Pixel-mask detectors feeding the inpainter.
//!
//! Three producers: corner-connected long-run lines, generic colored
//! strokes in HSV hue bands, and Sobel edge response inside candidate
//! boxes. The first two run on a downscale and are restricted to the ROI so
//! they cannot eat scene content far from any accepted rectangle.

use crate::calibration::Calibration;
use crate::color::{is_marker, is_marker_like_hsv};
use crate::geometry::PixelRect;
use crate::image_io::{downscale_nearest, Downscaled, ImageData};
use crate::texture::sobel_response;
use std::collections::VecDeque;

/// Minimum run length, in downscaled pixels, for the line-run masks.
const MIN_RUN: usize = 8;
/// Chebyshev radius within which a horizontal and a vertical run must meet
/// to seed a corner.
const CORNER_SEED_RADIUS: usize = 4;
/// Sobel response threshold for the in-box edge mask.
pub const EDGE_MASK_THRESHOLD: u32 = 420;

/// Square dilation of a byte mask, Chebyshev radius `radius`.
pub(crate) fn dilate_mask(mask: &[u8], w: usize, h: usize, radius: usize) -> Vec<u8> {
    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            if mask[y * w + x] == 0 {
                continue;
            }
            let y0 = y.saturating_sub(radius);
            let y1 = (y + radius + 1).min(h);
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(w);
            for ny in y0..y1 {
                for nx in x0..x1 {
                    out[ny * w + nx] = 1;
                }
            }
        }
    }
    out
}

struct MaskComponent {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
    pixels: Vec<usize>,
}

fn mask_components(mask: &[u8], w: usize, h: usize) -> Vec<MaskComponent> {
    let mut visited = vec![false; w * h];
    let mut out = Vec::new();
    for sy in 0..h {
        for sx in 0..w {
            let start = sy * w + sx;
            if visited[start] || mask[start] == 0 {
                continue;
            }
            let mut pixels = Vec::new();
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (sx, sy, sx, sy);
            let mut queue = VecDeque::new();
            visited[start] = true;
            queue.push_back((sx, sy));
            while let Some((x, y)) = queue.pop_front() {
                pixels.push(y * w + x);
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
                for (dx, dy) in [
                    (0i64, 1i64),
                    (1, 0),
                    (0, -1),
                    (-1, 0),
                    (1, 1),
                    (1, -1),
                    (-1, 1),
                    (-1, -1),
                ] {
                    let nx = x as i64 + dx;
                    let ny = y as i64 + dy;
                    if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                        continue;
                    }
                    let nidx = ny as usize * w + nx as usize;
                    if !visited[nidx] && mask[nidx] != 0 {
                        visited[nidx] = true;
                        queue.push_back((nx as usize, ny as usize));
                    }
                }
            }
            out.push(MaskComponent { min_x, min_y, max_x, max_y, pixels });
        }
    }
    out
}

/// Spread a downscaled mask back over the full-resolution frame: every
/// downscaled pixel claims its source block.
fn upscale_mask(
    down_mask: &[u8],
    down: &Downscaled,
    full_w: usize,
    full_h: usize,
) -> Vec<u8> {
    let sw = down.image.width as usize;
    let sh = down.image.height as usize;
    let mut out = vec![0u8; full_w * full_h];
    for y in 0..sh {
        for x in 0..sw {
            if down_mask[y * sw + x] == 0 {
                continue;
            }
            let x0 = (x as f64 * down.scale_x) as usize;
            let x1 = (((x + 1) as f64 * down.scale_x).ceil() as usize).min(full_w);
            let y0 = (y as f64 * down.scale_y) as usize;
            let y1 = (((y + 1) as f64 * down.scale_y).ceil() as usize).min(full_h);
            for fy in y0..y1 {
                for fx in x0..x1 {
                    out[fy * full_w + fx] = 1;
                }
            }
        }
    }
    out
}

fn intersect_with_roi(mask: &mut [u8], roi: &[u8]) {
    for (m, r) in mask.iter_mut().zip(roi.iter()) {
        if *r == 0 {
            *m = 0;
        }
    }
}

/// Corner-connected long-run line mask.
///
/// Marks pixels reachable from a corner seed (a spot where a horizontal and
/// a vertical run of marker color meet) through the run union, filtered of
/// banners, solids and border-huggers, then mapped to full resolution and
/// clipped to the ROI.
pub fn corner_line_mask(image: &ImageData, roi: &[u8], cal: &Calibration) -> Vec<u8> {
    let full_w = image.width as usize;
    let full_h = image.height as usize;
    let down = downscale_nearest(image, crate::box_detector::detect_target_width(image.width));
    let sw = down.image.width as usize;
    let sh = down.image.height as usize;
    if sw < MIN_RUN || sh < MIN_RUN {
        return vec![0u8; full_w * full_h];
    }

    let grid: Vec<bool> = down
        .image
        .pixels
        .iter()
        .map(|p| is_marker(p.r, p.g, p.b))
        .collect();

    // Long horizontal and vertical runs.
    let mut horiz = vec![false; sw * sh];
    for y in 0..sh {
        let mut run_start = 0usize;
        let mut run_len = 0usize;
        for x in 0..=sw {
            if x < sw && grid[y * sw + x] {
                if run_len == 0 {
                    run_start = x;
                }
                run_len += 1;
            } else {
                if run_len >= MIN_RUN {
                    for rx in run_start..run_start + run_len {
                        horiz[y * sw + rx] = true;
                    }
                }
                run_len = 0;
            }
        }
    }
    let mut vert = vec![false; sw * sh];
    for x in 0..sw {
        let mut run_start = 0usize;
        let mut run_len = 0usize;
        for y in 0..=sh {
            if y < sh && grid[y * sw + x] {
                if run_len == 0 {
                    run_start = y;
                }
                run_len += 1;
            } else {
                if run_len >= MIN_RUN {
                    for ry in run_start..run_start + run_len {
                        vert[ry * sw + x] = true;
                    }
                }
                run_len = 0;
            }
        }
    }

    // Corner seeds: a horizontal and a vertical run within Chebyshev
    // distance 4 of each other.
    let union: Vec<bool> = horiz.iter().zip(vert.iter()).map(|(&a, &b)| a || b).collect();
    let mut seeds = Vec::new();
    for y in 0..sh {
        for x in 0..sw {
            if !union[y * sw + x] {
                continue;
            }
            let y0 = y.saturating_sub(CORNER_SEED_RADIUS);
            let y1 = (y + CORNER_SEED_RADIUS + 1).min(sh);
            let x0 = x.saturating_sub(CORNER_SEED_RADIUS);
            let x1 = (x + CORNER_SEED_RADIUS + 1).min(sw);
            let mut has_h = false;
            let mut has_v = false;
            'scan: for ny in y0..y1 {
                for nx in x0..x1 {
                    let i = ny * sw + nx;
                    has_h |= horiz[i];
                    has_v |= vert[i];
                    if has_h && has_v {
                        break 'scan;
                    }
                }
            }
            if has_h && has_v {
                seeds.push((x, y));
            }
        }
    }
    if seeds.is_empty() {
        return vec![0u8; full_w * full_h];
    }

    // BFS from seeds through the run union.
    let mut reach = vec![0u8; sw * sh];
    let mut queue: VecDeque<(usize, usize)> = VecDeque::new();
    for &(x, y) in &seeds {
        if reach[y * sw + x] == 0 {
            reach[y * sw + x] = 1;
            queue.push_back((x, y));
        }
    }
    while let Some((x, y)) = queue.pop_front() {
        for (dx, dy) in [
            (0i64, 1i64),
            (1, 0),
            (0, -1),
            (-1, 0),
            (1, 1),
            (1, -1),
            (-1, 1),
            (-1, -1),
        ] {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= sw as i64 || ny >= sh as i64 {
                continue;
            }
            let ni = ny as usize * sw + nx as usize;
            if reach[ni] == 0 && union[ni] {
                reach[ni] = 1;
                queue.push_back((nx as usize, ny as usize));
            }
        }
    }

    let reach = dilate_mask(&reach, sw, sh, 2);

    // Component filters: border-huggers, oversized blobs, banners, solids.
    let mut kept = vec![0u8; sw * sh];
    let max_area = cal.max_component_area_ratio * (sw * sh) as f64;
    for c in mask_components(&reach, sw, sh) {
        let bw = (c.max_x - c.min_x + 1) as f64;
        let bh = (c.max_y - c.min_y + 1) as f64;
        if c.min_x == 0 || c.min_y == 0 || c.max_x + 1 == sw || c.max_y + 1 == sh {
            continue;
        }
        if c.pixels.len() as f64 > max_area {
            continue;
        }
        let banner = (bw > 0.7 * sw as f64 && bh < 0.12 * sh as f64)
            || (bh > 0.7 * sh as f64 && bw < 0.12 * sw as f64);
        if banner {
            continue;
        }
        if c.pixels.len() as f64 / (bw * bh) > cal.max_fill_ratio {
            continue;
        }
        for &i in &c.pixels {
            kept[i] = 1;
        }
    }

    let full = upscale_mask(&kept, &down, full_w, full_h);
    let mut full = dilate_mask(&full, full_w, full_h, 2);
    intersect_with_roi(&mut full, roi);
    full
}

/// Generic colored-stroke mask over HSV hue bands.
pub fn stroke_mask(
    image: &ImageData,
    complex_scene: bool,
    roi: &[u8],
    cal: &Calibration,
) -> Vec<u8> {
    let full_w = image.width as usize;
    let full_h = image.height as usize;
    let down = downscale_nearest(image, crate::box_detector::detect_target_width(image.width));
    let sw = down.image.width as usize;
    let sh = down.image.height as usize;
    if sw == 0 || sh == 0 {
        return vec![0u8; full_w * full_h];
    }

    let grid: Vec<u8> = down
        .image
        .pixels
        .iter()
        .map(|p| is_marker_like_hsv(p.r, p.g, p.b, complex_scene) as u8)
        .collect();

    let mut kept = vec![0u8; sw * sh];
    let max_area = cal.max_stroke_area_ratio * (sw * sh) as f64;
    for c in mask_components(&grid, sw, sh) {
        let area = c.pixels.len();
        if area <= 12 || (area as f64) >= max_area {
            continue;
        }
        let bw = (c.max_x - c.min_x + 1) as f64;
        let bh = (c.max_y - c.min_y + 1) as f64;
        if area as f64 / (bw * bh) >= cal.stroke_max_fill {
            continue;
        }
        for &i in &c.pixels {
            kept[i] = 1;
        }
    }

    let full = upscale_mask(&kept, &down, full_w, full_h);
    let mut full = dilate_mask(&full, full_w, full_h, 2);
    intersect_with_roi(&mut full, roi);
    full
}

/// Sobel edge mask inside one padded candidate box. Marks full-resolution
/// pixels whose gradient response meets `threshold`.
pub fn edge_mask_in_box(image: &ImageData, rect: &PixelRect, threshold: u32) -> Vec<u8> {
    let full_w = image.width as usize;
    let full_h = image.height as usize;
    let mut mask = vec![0u8; full_w * full_h];
    if rect.is_empty() || rect.width() < 3 || rect.height() < 3 {
        return mask;
    }

    let rw = rect.width();
    let rh = rect.height();
    let mut gray = Vec::with_capacity(rw * rh);
    for y in rect.y1..rect.y2 {
        for x in rect.x1..rect.x2 {
            let p = image.pixels[y * full_w + x];
            gray.push((0.299 * p.r as f64 + 0.587 * p.g as f64 + 0.114 * p.b as f64) as u8);
        }
    }
    let resp = sobel_response(&gray, rw, rh);
    for y in 0..rh {
        for x in 0..rw {
            if resp[y * rw + x] >= threshold {
                mask[(rect.y1 + y) * full_w + rect.x1 + x] = 1;
            }
        }
    }
    mask
}
