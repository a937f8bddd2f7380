//! Color classifiers for annotation markers.
//!
//! Pure functions `(r, g, b) -> bool` modeling how annotation colors look
//! after JPEG compression and anti-aliasing. The liberal [`is_marker`] /
//! strict-at-sampling [`is_likely_mark`] pair is deliberate: the liberal
//! rule decides what may be repainted, the wider rule decides what must
//! never be sampled as background.

/// Saturation floor for the liberal marker rule.
const MARKER_MIN_SAT: f64 = 0.22;
/// Brightness floor for the liberal marker rule.
const MARKER_MIN_MAX: u8 = 30;
/// HSV value floor for the stroke-band rule.
const HSV_MIN_VALUE: u8 = 100;
/// HSV saturation floor for the stroke-band rule.
const HSV_MIN_SAT: f64 = 0.55;

#[inline]
fn channel_stats(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let mid = (r as u16 + g as u16 + b as u16 - max as u16 - min as u16) as u8;
    (max, mid, min)
}

#[inline]
fn saturation(max: u8, min: u8) -> f64 {
    if max == 0 {
        0.0
    } else {
        (max - min) as f64 / max as f64
    }
}

/// Liberal classifier: any saturated red/orange/yellow/blue/magenta that an
/// annotation pen could have produced.
pub fn is_marker(r: u8, g: u8, b: u8) -> bool {
    let (max, _, min) = channel_stats(r, g, b);
    if max < MARKER_MIN_MAX || saturation(max, min) < MARKER_MIN_SAT {
        return false;
    }
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);

    // Red/orange dominance. Permissive on purpose; background sampling uses
    // is_likely_mark to compensate.
    let reddish = rf >= gf * 1.03 && rf >= bf * 1.03 && r >= 60;
    // Yellow band: red and green both high, blue clearly below.
    let yellow = r >= 120 && g >= 90 && rf - bf >= 50.0 && gf - bf >= 40.0;
    // Blue dominance.
    let blue = b >= 90 && bf >= rf * 1.12 && bf >= gf * 1.08;
    // Magenta band: red and blue high, green the trough.
    let magenta = r >= 110 && b >= 90 && rf - gf >= 40.0 && bf - gf >= 30.0;

    reddish || yellow || blue || magenta
}

/// Wider rule used when *sampling background*: everything `is_marker`
/// accepts, plus strongly saturated pixels the liberal rule's band tests
/// miss. A sample rejected here can never leak line color into a repaint.
pub fn is_likely_mark(r: u8, g: u8, b: u8) -> bool {
    if is_marker(r, g, b) {
        return true;
    }
    let (max, mid, min) = channel_stats(r, g, b);
    max >= 80 && saturation(max, min) >= 0.45 && max - mid >= 70
}

/// Strong line-seed color for the corner-connected line detector.
pub fn is_strong_for_corner(r: u8, g: u8, b: u8) -> bool {
    let (max, mid, _) = channel_stats(r, g, b);
    max >= 155 && max - mid >= 90
}

/// Strong color for the ROI inpaint mask.
pub fn is_strong_for_inpaint(r: u8, g: u8, b: u8) -> bool {
    let (max, mid, _) = channel_stats(r, g, b);
    max >= 160 && max - mid >= 95
}

/// Rectangle-outline line color.
pub fn is_line_color(r: u8, g: u8, b: u8) -> bool {
    let (max, mid, _) = channel_stats(r, g, b);
    max >= 150 && max - mid >= 80
}

/// Pure-red overlay stroke color.
pub fn is_overlay_red(r: u8, g: u8, b: u8) -> bool {
    r > 160 && g < 140 && b < 140 && r as f64 > 1.3 * g as f64
}

/// Very strong red used by the vertical-column overpaint.
pub fn is_overlay_like_strong(r: u8, g: u8, b: u8) -> bool {
    r > 180 && r.saturating_sub(g) >= 70 && r.saturating_sub(b) >= 70
}

/// HSV-band classifier for the generic stroke mask. Complex scenes drop the
/// blue band, which collides with sky and water far too often.
pub fn is_marker_like_hsv(r: u8, g: u8, b: u8, complex: bool) -> bool {
    let (h, s, v) = rgb_to_hsv(r, g, b);
    if v < HSV_MIN_VALUE || s < HSV_MIN_SAT {
        return false;
    }
    let red = h <= 30.0 || h >= 330.0;
    let orange_yellow = (30.0..=90.0).contains(&h);
    let magenta = (285.0..330.0).contains(&h);
    let blue = !complex && (190.0..=260.0).contains(&h);
    red || orange_yellow || magenta || blue
}

/// RGB to HSV. Hue in degrees `[0, 360)`, saturation in `[0, 1]`, value as
/// the raw max channel.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, u8) {
    let (max, _, min) = channel_stats(r, g, b);
    let s = saturation(max, min);
    if max == min {
        return (0.0, s, max);
    }
    let delta = (max - min) as f64;
    let (rf, gf, bf) = (r as f64, g as f64, b as f64);
    let mut h = if max == r {
        (gf - bf) / delta % 6.0
    } else if max == g {
        (bf - rf) / delta + 2.0
    } else {
        (rf - gf) / delta + 4.0
    } * 60.0;
    if h < 0.0 {
        h += 360.0;
    }
    (h, s, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_accepts_annotation_colors() {
        assert!(is_marker(255, 0, 0)); // red
        assert!(is_marker(255, 165, 0)); // orange
        assert!(is_marker(255, 235, 0)); // yellow
        assert!(is_marker(40, 80, 230)); // blue
        assert!(is_marker(220, 40, 200)); // magenta
    }

    #[test]
    fn test_marker_rejects_neutrals() {
        assert!(!is_marker(255, 255, 255));
        assert!(!is_marker(128, 128, 128));
        assert!(!is_marker(0, 0, 0));
        assert!(!is_marker(20, 10, 10)); // too dark
    }

    #[test]
    fn test_likely_mark_superset_of_marker() {
        for &(r, g, b) in &[
            (255u8, 0u8, 0u8),
            (255, 165, 0),
            (40, 80, 230),
            (200, 60, 60),
            (180, 180, 40),
        ] {
            if is_marker(r, g, b) {
                assert!(is_likely_mark(r, g, b), "({r},{g},{b})");
            }
        }
    }

    #[test]
    fn test_likely_mark_catches_saturated_extras() {
        // High max, high saturation, big primary diff, but green-dominant so
        // the liberal band tests miss it.
        assert!(!is_marker(40, 200, 40));
        assert!(is_likely_mark(40, 200, 40));
    }

    #[test]
    fn test_overlay_red() {
        assert!(is_overlay_red(255, 30, 30));
        assert!(is_overlay_red(200, 100, 80));
        assert!(!is_overlay_red(150, 30, 30)); // too dim
        assert!(!is_overlay_red(200, 160, 30)); // green too high
    }

    #[test]
    fn test_overlay_like_strong() {
        assert!(is_overlay_like_strong(255, 40, 40));
        assert!(!is_overlay_like_strong(170, 40, 40));
        assert!(!is_overlay_like_strong(255, 200, 40));
    }

    #[test]
    fn test_strong_tiers_ordered() {
        // Inpaint tier is the strictest, line color the loosest of the three.
        let fire = |f: fn(u8, u8, u8) -> bool| f(250, 120, 60);
        assert!(fire(is_line_color));
        assert!(fire(is_strong_for_corner));
        assert!(fire(is_strong_for_inpaint));
        let borderline = |f: fn(u8, u8, u8) -> bool| f(159, 60, 40);
        assert!(borderline(is_line_color));
        assert!(borderline(is_strong_for_corner));
        assert!(!borderline(is_strong_for_inpaint));
    }

    #[test]
    fn test_rgb_to_hsv_primaries() {
        let (h, s, v) = rgb_to_hsv(255, 0, 0);
        assert!(h.abs() < 1e-9);
        assert!((s - 1.0).abs() < 1e-9);
        assert_eq!(v, 255);

        let (h, _, _) = rgb_to_hsv(0, 255, 0);
        assert!((h - 120.0).abs() < 1e-9);

        let (h, _, _) = rgb_to_hsv(0, 0, 255);
        assert!((h - 240.0).abs() < 1e-9);
    }

    #[test]
    fn test_hsv_band_blue_dropped_when_complex() {
        // Saturated annotation blue.
        assert!(is_marker_like_hsv(30, 80, 240, false));
        assert!(!is_marker_like_hsv(30, 80, 240, true));
        // Red survives both modes.
        assert!(is_marker_like_hsv(240, 40, 40, false));
        assert!(is_marker_like_hsv(240, 40, 40, true));
    }

    #[test]
    fn test_hsv_band_rejects_dim_and_washed() {
        assert!(!is_marker_like_hsv(90, 20, 20, false)); // value below floor
        assert!(!is_marker_like_hsv(220, 180, 170, false)); // saturation below floor
    }
}
