//! Scene-complexity estimate from Sobel gradient density.
//!
//! The score gates several conservative policies downstream: narrower hue
//! bands in the stroke mask, stricter huge-box acceptance in the painter,
//! and skipping the final smoothing pass.

use crate::image_io::{downscale_nearest, ImageData};

/// Downscale ceiling for the estimate.
const TEXTURE_TARGET_WIDTH: u32 = 320;
/// Mean-gradient divisor that maps typical photos into roughly 0..40.
const GRADIENT_DIVISOR: f64 = 12.0;
/// Score cap.
const SCORE_CAP: f64 = 100.0;

const SOBEL_X: [i32; 9] = [-1, 0, 1, -2, 0, 2, -1, 0, 1];
const SOBEL_Y: [i32; 9] = [-1, -2, -1, 0, 0, 0, 1, 2, 1];

/// Mean `|Gx| + |Gy|` over a <=320-px-wide luma downscale, divided by 12
/// and capped at 100.
pub fn texture_score(image: &ImageData) -> f64 {
    let down = downscale_nearest(image, TEXTURE_TARGET_WIDTH);
    let gray = down.image.luma_plane();
    let w = down.image.width as usize;
    let h = down.image.height as usize;
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut total: u64 = 0;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut gx = 0i32;
            let mut gy = 0i32;
            for ky in 0..3usize {
                for kx in 0..3usize {
                    let v = gray[(y + ky - 1) * w + (x + kx - 1)] as i32;
                    let k = ky * 3 + kx;
                    gx += v * SOBEL_X[k];
                    gy += v * SOBEL_Y[k];
                }
            }
            total += (gx.abs() + gy.abs()) as u64;
        }
    }
    let count = ((w - 2) * (h - 2)) as f64;
    (total as f64 / count / GRADIENT_DIVISOR).min(SCORE_CAP)
}

/// Sobel `|Gx| + |Gy|` response for a luma plane; border pixels are zero.
/// Shared by the in-box edge mask, which thresholds the raw response.
pub fn sobel_response(gray: &[u8], w: usize, h: usize) -> Vec<u32> {
    let mut out = vec![0u32; w * h];
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut gx = 0i32;
            let mut gy = 0i32;
            for ky in 0..3usize {
                for kx in 0..3usize {
                    let v = gray[(y + ky - 1) * w + (x + kx - 1)] as i32;
                    let k = ky * 3 + kx;
                    gx += v * SOBEL_X[k];
                    gy += v * SOBEL_Y[k];
                }
            }
            out[y * w + x] = (gx.abs() + gy.abs()) as u32;
        }
    }
    out
}
