//! Mask filling from surrounding context.
//!
//! Two interchangeable algorithms, chosen once per invocation and never
//! mixed: a weighted inverse-distance onion peel (fast) and a patch
//! synthesis search (slow, better texture). Both leave a pixel for the
//! uniform-average fallback pass when the context disagrees with itself;
//! fallback fills are counted as a quality signal.

use crate::calibration::Calibration;
use crate::color::{is_likely_mark, is_marker};
use crate::image_io::ImageData;
use crate::mask_detector::dilate_mask;
use rgb::RGBA8;

/// Which filling algorithm an invocation uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InpaintAlgorithm {
    /// Weighted-IDW onion peel. Fast, slightly soft output.
    #[default]
    Weighted,
    /// Patch synthesis with a local source search. Slower, keeps texture.
    Patch,
}

/// Maximum onion-peel passes for the weighted algorithm.
const WEIGHTED_PASSES: usize = 4;
/// Sample cap per pixel for the weighted algorithm.
const WEIGHTED_MAX_SAMPLES: usize = 6;
/// Sampling radius range along the 8 compass directions.
const WEIGHTED_MAX_RADIUS: i64 = 12;
/// Patch synthesis: patch half side, search radius, search stride.
const PATCH_HALF: i64 = 2;
const PATCH_SEARCH_RADIUS: i64 = 40;
const PATCH_SEARCH_STEP: usize = 2;
/// Patch passes (onion peeling).
const PATCH_PASSES: usize = 10;
/// Minimum known pixels in the 5x5 patch before a pixel may be synthesized.
const PATCH_MIN_KNOWN: usize = 4;
/// Per-pixel score charged for comparing against a masked/out-of-frame spot.
const PATCH_MISS_PENALTY: f64 = 2500.0;
/// Mean-SSD early acceptance.
const PATCH_ACCEPT_SSD: f64 = 20.0;
/// Locality bias factor on squared source distance.
const PATCH_DIST_BIAS: f64 = 0.02;
/// Fallback neighborhood half sides.
const FALLBACK_HALF_WEIGHTED: i64 = 2;
const FALLBACK_HALF_PATCH: i64 = 6;
/// Smoothing is skipped above this changed-pixel ratio.
const SMOOTH_MAX_CHANGED_RATIO: f64 = 0.35;
/// Below this ratio smoothing runs twice.
const SMOOTH_TWO_PASS_RATIO: f64 = 0.15;

const COMPASS: [(i64, i64); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Fill every masked pixel. Clears `mask` as it goes, marks written pixels
/// in `changed`, and returns the number of fallback-filled pixels.
pub fn inpaint(
    image: &mut ImageData,
    mask: &mut Vec<u8>,
    changed: &mut [u8],
    algorithm: InpaintAlgorithm,
    cal: &Calibration,
) -> u64 {
    if mask.iter().all(|&m| m == 0) {
        return 0;
    }
    match algorithm {
        InpaintAlgorithm::Weighted => {
            weighted_fill(image, mask, changed, cal);
            fallback_fill(image, mask, changed, FALLBACK_HALF_WEIGHTED)
        }
        InpaintAlgorithm::Patch => {
            *mask = dilate_mask(mask, image.width as usize, image.height as usize, 2);
            patch_fill(image, mask, changed);
            fallback_fill(image, mask, changed, FALLBACK_HALF_PATCH)
        }
    }
}

/// Weighted-IDW onion peel. Pixels whose samples straddle an edge (large
/// per-channel range sum) are deferred to a later pass so texture is not
/// averaged across a boundary.
fn weighted_fill(image: &mut ImageData, mask: &mut [u8], changed: &mut [u8], cal: &Calibration) {
    let w = image.width as i64;
    let h = image.height as i64;

    for _pass in 0..WEIGHTED_PASSES {
        let mut progress = false;
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) as usize;
                if mask[idx] == 0 {
                    continue;
                }

                // Up to 6 samples, nearest radii first.
                let mut samples: Vec<(RGBA8, i64)> = Vec::with_capacity(WEIGHTED_MAX_SAMPLES);
                'gather: for r in 1..=WEIGHTED_MAX_RADIUS {
                    for (dx, dy) in COMPASS {
                        let sx = x + dx * r;
                        let sy = y + dy * r;
                        if sx < 0 || sx >= w || sy < 0 || sy >= h {
                            continue;
                        }
                        let sidx = (sy * w + sx) as usize;
                        if mask[sidx] != 0 {
                            continue;
                        }
                        let p = image.pixels[sidx];
                        if is_likely_mark(p.r, p.g, p.b) {
                            continue;
                        }
                        let dist_sq = (dx * dx + dy * dy) * r * r;
                        samples.push((p, dist_sq));
                        if samples.len() >= WEIGHTED_MAX_SAMPLES {
                            break 'gather;
                        }
                    }
                }
                if samples.len() < 2 {
                    continue;
                }

                // Cross-edge risk: defer when the samples span too wide a
                // color range for their count.
                let mut range_sum = 0u32;
                for c in 0..3usize {
                    let vals = samples.iter().map(|(p, _)| channel(p, c));
                    let max = vals.clone().max().unwrap_or(0);
                    let min = vals.min().unwrap_or(0);
                    range_sum += (max - min) as u32;
                }
                let limit = if samples.len() >= 3 {
                    cal.inpaint_sample_range_3
                } else {
                    cal.inpaint_sample_range_2
                };
                if range_sum > limit {
                    continue;
                }

                let mut acc = [0.0f64; 3];
                let mut weight_total = 0.0f64;
                for (p, dist_sq) in &samples {
                    let weight = 1.0 / (*dist_sq as f64);
                    acc[0] += weight * p.r as f64;
                    acc[1] += weight * p.g as f64;
                    acc[2] += weight * p.b as f64;
                    weight_total += weight;
                }
                let old = image.pixels[idx];
                let new = RGBA8::new(
                    (acc[0] / weight_total).round() as u8,
                    (acc[1] / weight_total).round() as u8,
                    (acc[2] / weight_total).round() as u8,
                    old.a,
                );
                mask[idx] = 0;
                progress = true;
                if (new.r, new.g, new.b) != (old.r, old.g, old.b) {
                    image.pixels[idx] = new;
                    changed[idx] = 1;
                }
            }
        }
        if !progress {
            break;
        }
    }
}

#[inline]
fn channel(p: &RGBA8, c: usize) -> u8 {
    match c {
        0 => p.r,
        1 => p.g,
        _ => p.b,
    }
}

/// Patch synthesis: for each boundary pixel with enough known context, copy
/// the center of the best-matching nearby source patch.
fn patch_fill(image: &mut ImageData, mask: &mut [u8], changed: &mut [u8]) {
    let w = image.width as i64;
    let h = image.height as i64;

    for _pass in 0..PATCH_PASSES {
        let mut progress = false;
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) as usize;
                if mask[idx] == 0 {
                    continue;
                }
                if known_neighbors(mask, w, h, x, y) < PATCH_MIN_KNOWN {
                    continue;
                }

                if let Some(src_idx) = best_source(image, mask, w, h, x, y) {
                    let src = image.pixels[src_idx];
                    let old = image.pixels[idx];
                    mask[idx] = 0;
                    progress = true;
                    if (src.r, src.g, src.b) != (old.r, old.g, old.b) {
                        image.pixels[idx] = RGBA8::new(src.r, src.g, src.b, old.a);
                        changed[idx] = 1;
                    }
                }
            }
        }
        if !progress {
            break;
        }
    }
}

fn known_neighbors(mask: &[u8], w: i64, h: i64, x: i64, y: i64) -> usize {
    let mut known = 0usize;
    for dy in -PATCH_HALF..=PATCH_HALF {
        for dx in -PATCH_HALF..=PATCH_HALF {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = x + dx;
            let ny = y + dy;
            if nx >= 0 && nx < w && ny >= 0 && ny < h && mask[(ny * w + nx) as usize] == 0 {
                known += 1;
            }
        }
    }
    known
}

fn best_source(image: &ImageData, mask: &[u8], w: i64, h: i64, x: i64, y: i64) -> Option<usize> {
    let mut best: Option<(f64, usize)> = None;

    let y_from = (y - PATCH_SEARCH_RADIUS).max(PATCH_HALF);
    let y_to = (y + PATCH_SEARCH_RADIUS).min(h - 1 - PATCH_HALF);
    let x_from = (x - PATCH_SEARCH_RADIUS).max(PATCH_HALF);
    let x_to = (x + PATCH_SEARCH_RADIUS).min(w - 1 - PATCH_HALF);

    let mut sy = y_from;
    'search: while sy <= y_to {
        let mut sx = x_from;
        while sx <= x_to {
            let sidx = (sy * w + sx) as usize;
            if mask[sidx] == 0 {
                let p = image.pixels[sidx];
                if !is_likely_mark(p.r, p.g, p.b) {
                    let mut sum = 0.0f64;
                    let mut count = 0u32;
                    for dy in -PATCH_HALF..=PATCH_HALF {
                        for dx in -PATCH_HALF..=PATCH_HALF {
                            let tx = x + dx;
                            let ty = y + dy;
                            let cx = sx + dx;
                            let cy = sy + dy;
                            if tx < 0 || tx >= w || ty < 0 || ty >= h {
                                continue;
                            }
                            let tidx = (ty * w + tx) as usize;
                            let cidx = (cy * w + cx) as usize;
                            if mask[tidx] != 0 || mask[cidx] != 0 {
                                sum += PATCH_MISS_PENALTY;
                                count += 1;
                                continue;
                            }
                            let tp = image.pixels[tidx];
                            let cp = image.pixels[cidx];
                            let dr = tp.r as f64 - cp.r as f64;
                            let dg = tp.g as f64 - cp.g as f64;
                            let db = tp.b as f64 - cp.b as f64;
                            sum += dr * dr + dg * dg + db * db;
                            count += 1;
                        }
                    }
                    if count > 0 {
                        let dist_sq = ((sx - x) * (sx - x) + (sy - y) * (sy - y)) as f64;
                        let score = sum / count as f64 + PATCH_DIST_BIAS * dist_sq;
                        if best.map_or(true, |(b, _)| score < b) {
                            best = Some((score, sidx));
                            if score < PATCH_ACCEPT_SSD {
                                break 'search;
                            }
                        }
                    }
                }
            }
            sx += PATCH_SEARCH_STEP as i64;
        }
        sy += PATCH_SEARCH_STEP as i64;
    }
    best.map(|(_, idx)| idx)
}

/// Uniform neighborhood mean for anything the main algorithm left behind.
/// Pixels with no usable neighborhood are left unchanged (and not counted).
fn fallback_fill(image: &mut ImageData, mask: &mut [u8], changed: &mut [u8], half: i64) -> u64 {
    let w = image.width as i64;
    let h = image.height as i64;
    let mut fallback = 0u64;

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if mask[idx] == 0 {
                continue;
            }
            let mut acc = [0u32; 3];
            let mut n = 0u32;
            for dy in -half..=half {
                for dx in -half..=half {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let nx = x + dx;
                    let ny = y + dy;
                    if nx < 0 || nx >= w || ny < 0 || ny >= h {
                        continue;
                    }
                    let nidx = (ny * w + nx) as usize;
                    if mask[nidx] != 0 {
                        continue;
                    }
                    let p = image.pixels[nidx];
                    if is_marker(p.r, p.g, p.b) {
                        continue;
                    }
                    acc[0] += p.r as u32;
                    acc[1] += p.g as u32;
                    acc[2] += p.b as u32;
                    n += 1;
                }
            }
            mask[idx] = 0;
            if n == 0 {
                continue;
            }
            let old = image.pixels[idx];
            let new = RGBA8::new((acc[0] / n) as u8, (acc[1] / n) as u8, (acc[2] / n) as u8, old.a);
            if (new.r, new.g, new.b) == (old.r, old.g, old.b) {
                continue;
            }
            image.pixels[idx] = new;
            changed[idx] = 1;
            fallback += 1;
        }
    }
    fallback
}

/// Conservative 3x3 weighted box blur restricted to changed pixels.
/// Unchanged neighbors outweigh changed ones 3:1 to pull repainted areas
/// toward the original texture. Skipped for heavy repaints and complex
/// scenes.
pub fn smooth_changed(image: &mut ImageData, changed: &[u8], complex_scene: bool) {
    let total = changed.len().max(1);
    let changed_count = changed.iter().filter(|&&c| c != 0).count();
    let ratio = changed_count as f64 / total as f64;
    if changed_count == 0 || complex_scene || ratio > SMOOTH_MAX_CHANGED_RATIO {
        return;
    }
    let passes = if ratio < SMOOTH_TWO_PASS_RATIO { 2 } else { 1 };

    let w = image.width as i64;
    let h = image.height as i64;
    for _ in 0..passes {
        let snapshot = image.pixels.clone();
        for y in 0..h {
            for x in 0..w {
                let idx = (y * w + x) as usize;
                if changed[idx] == 0 {
                    continue;
                }
                let mut acc = [0u32; 3];
                let mut weight_total = 0u32;
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        let nx = x + dx;
                        let ny = y + dy;
                        if nx < 0 || nx >= w || ny < 0 || ny >= h {
                            continue;
                        }
                        let nidx = (ny * w + nx) as usize;
                        let weight = if dx == 0 && dy == 0 {
                            2
                        } else if changed[nidx] == 0 {
                            3
                        } else {
                            1
                        };
                        let p = snapshot[nidx];
                        acc[0] += weight * p.r as u32;
                        acc[1] += weight * p.g as u32;
                        acc[2] += weight * p.b as u32;
                        weight_total += weight;
                    }
                }
                let a = image.pixels[idx].a;
                image.pixels[idx] = RGBA8::new(
                    (acc[0] / weight_total) as u8,
                    (acc[1] / weight_total) as u8,
                    (acc[2] / weight_total) as u8,
                    a,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAY: RGBA8 = RGBA8 { r: 120, g: 120, b: 120, a: 255 };

    fn solid(w: u32, h: u32, p: RGBA8) -> ImageData {
        ImageData {
            width: w,
            height: h,
            pixels: vec![p; (w * h) as usize],
        }
    }

    fn hole_mask(w: usize, h: usize, x1: usize, y1: usize, x2: usize, y2: usize) -> Vec<u8> {
        let mut mask = vec![0u8; w * h];
        for y in y1..y2 {
            for x in x1..x2 {
                mask[y * w + x] = 1;
            }
        }
        mask
    }

    #[test]
    fn test_weighted_fills_flat_region_exactly() {
        let mut img = solid(40, 40, GRAY);
        // A marker blot covers the hole; restoration must bring back gray.
        for y in 15..25 {
            for x in 15..25 {
                img.pixels[y * 40 + x] = RGBA8::new(220, 30, 30, 255);
            }
        }
        let mut mask = hole_mask(40, 40, 15, 15, 25, 25);
        let mut changed = vec![0u8; 40 * 40];
        let fallback = inpaint(
            &mut img,
            &mut mask,
            &mut changed,
            InpaintAlgorithm::Weighted,
            &Calibration::default(),
        );
        assert_eq!(fallback, 0);
        assert!(mask.iter().all(|&m| m == 0));
        for p in &img.pixels {
            assert_eq!((p.r, p.g, p.b), (120, 120, 120));
        }
        let n: usize = changed.iter().map(|&c| c as usize).sum();
        assert_eq!(n, 100);
    }

    #[test]
    fn test_weighted_leaves_unsampleable_pixels() {
        // Everything around the hole is marker red: no valid samples, the
        // pixel is left untouched and not counted as fallback.
        let mut img = solid(20, 20, RGBA8::new(255, 0, 0, 255));
        let mut mask = hole_mask(20, 20, 8, 8, 12, 12);
        let before = img.pixels.clone();
        let mut changed = vec![0u8; 20 * 20];
        let fallback = inpaint(
            &mut img,
            &mut mask,
            &mut changed,
            InpaintAlgorithm::Weighted,
            &Calibration::default(),
        );
        assert_eq!(fallback, 0);
        assert!(mask.iter().all(|&m| m == 0));
        assert_eq!(img.pixels, before);
        assert!(changed.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_weighted_defers_across_edge_to_fallback() {
        // Sharp black/white boundary through the hole: center pixels sample
        // both sides, exceed the range limit every pass, and end in the
        // fallback counter.
        let mut img = solid(40, 40, RGBA8::new(255, 255, 255, 255));
        for y in 0..40 {
            for x in 20..40 {
                img.pixels[y * 40 + x] = RGBA8::new(0, 0, 0, 255);
            }
        }
        let mut mask = hole_mask(40, 40, 14, 14, 26, 26);
        let mut changed = vec![0u8; 40 * 40];
        let fallback = inpaint(
            &mut img,
            &mut mask,
            &mut changed,
            InpaintAlgorithm::Weighted,
            &Calibration::default(),
        );
        assert!(mask.iter().all(|&m| m == 0));
        assert!(fallback > 0);
    }

    #[test]
    fn test_patch_reconstructs_stripes() {
        // Vertical stripes; the search finds a phase-aligned source and
        // reproduces the pattern inside the hole.
        let mut img = solid(60, 60, GRAY);
        for y in 0..60 {
            for x in 0..60 {
                if x % 2 == 0 {
                    img.pixels[y * 60 + x] = RGBA8::new(200, 200, 200, 255);
                } else {
                    img.pixels[y * 60 + x] = RGBA8::new(60, 60, 60, 255);
                }
            }
        }
        let reference = img.pixels.clone();
        for y in 28..33 {
            for x in 28..33 {
                img.pixels[y * 60 + x] = RGBA8::new(220, 30, 30, 255);
            }
        }
        let mut mask = hole_mask(60, 60, 28, 28, 33, 33);
        let mut changed = vec![0u8; 60 * 60];
        let fallback = inpaint(
            &mut img,
            &mut mask,
            &mut changed,
            InpaintAlgorithm::Patch,
            &Calibration::default(),
        );
        assert_eq!(fallback, 0);
        assert!(mask.iter().all(|&m| m == 0));
        for y in 28..33 {
            for x in 28..33 {
                let got = img.pixels[y * 60 + x];
                let want = reference[y * 60 + x];
                assert_eq!((got.r, got.g, got.b), (want.r, want.g, want.b), "at ({x},{y})");
            }
        }
    }

    #[test]
    fn test_smooth_skipped_for_complex_and_heavy() {
        let mut img = solid(10, 10, GRAY);
        img.pixels[55] = RGBA8::new(10, 10, 10, 255);
        let mut changed = vec![0u8; 100];
        changed[55] = 1;

        let before = img.pixels.clone();
        smooth_changed(&mut img, &changed, true);
        assert_eq!(img.pixels, before); // complex scene: untouched

        let heavy = vec![1u8; 100];
        let mut img2 = solid(10, 10, GRAY);
        img2.pixels[55] = RGBA8::new(10, 10, 10, 255);
        let before2 = img2.pixels.clone();
        smooth_changed(&mut img2, &heavy, false);
        assert_eq!(img2.pixels, before2); // ratio 1.0: untouched
    }

    #[test]
    fn test_smooth_pulls_changed_toward_neighbors() {
        let mut img = solid(10, 10, GRAY);
        img.pixels[55] = RGBA8::new(0, 0, 0, 255);
        let mut changed = vec![0u8; 100];
        changed[55] = 1;
        smooth_changed(&mut img, &changed, false);
        let p = img.pixels[55];
        assert!(p.r > 90, "smoothed value {p:?}");
        // Unchanged neighbors stay put.
        assert_eq!(img.pixels[54], GRAY);
    }
}
