// Integration tests for demark
use demark::image_io::{encode_image, Container, ImageData};
use demark::{clean_bytes, clean_image, CleanOptions, NormalizedBox};
use rgb::RGBA8;

const WHITE: RGBA8 = RGBA8 { r: 255, g: 255, b: 255, a: 255 };

// Build a synthetic test image programmatically
fn image_from_fn(w: u32, h: u32, f: impl Fn(u32, u32) -> (u8, u8, u8)) -> ImageData {
    let mut pixels = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            let (r, g, b) = f(x, y);
            pixels.push(RGBA8::new(r, g, b, 255));
        }
    }
    ImageData { width: w, height: h, pixels }
}

fn blank(w: u32, h: u32) -> ImageData {
    image_from_fn(w, h, |_, _| (255, 255, 255))
}

fn draw_outline(img: &mut ImageData, x1: usize, y1: usize, x2: usize, y2: usize, t: usize, color: RGBA8) {
    let w = img.width as usize;
    for y in y1..y2 {
        for x in x1..x2 {
            if x < x1 + t || x >= x2 - t || y < y1 + t || y >= y2 - t {
                img.pixels[y * w + x] = color;
            }
        }
    }
}

fn saturation(p: &RGBA8) -> f64 {
    let max = p.r.max(p.g).max(p.b);
    let min = p.r.min(p.g).min(p.b);
    if max == 0 {
        0.0
    } else {
        (max - min) as f64 / max as f64
    }
}

// Scenario 1: empty call on a plain image returns the input bytewise.
#[test]
fn test_empty_call_is_identity() {
    let img = blank(200, 200);
    let bytes = encode_image(&img, Container::Png).expect("encode");
    let out = clean_bytes(&bytes, &[], &CleanOptions::default()).expect("clean");
    assert_eq!(out.bytes, bytes);
    assert_eq!(out.stats.changed_pixels, 0);
    assert_eq!(out.stats.total_pixels, 200 * 200);
}

// Scenario 2: a centered hollow red rectangle is found by the local
// detector and fully repainted to white.
#[test]
fn test_red_hollow_rectangle_removed() {
    let mut img = blank(200, 200);
    draw_outline(&mut img, 50, 50, 150, 150, 4, RGBA8::new(255, 0, 0, 255));

    let (out, stats) = clean_image(&img, &[], &CleanOptions::default()).expect("clean");
    assert_eq!(out.width, 200);
    assert_eq!(out.height, 200);
    for (i, p) in out.pixels.iter().enumerate() {
        assert!(
            p.r >= 253 && p.g >= 253 && p.b >= 253,
            "residual color {p:?} at index {i}"
        );
    }
    assert!(
        stats.changed_pixels >= 1500 && stats.changed_pixels <= 2000,
        "changed {}",
        stats.changed_pixels
    );
}

// Scenario 3: an orange L-stroke inside a caller box is removed by the
// stroke mask plus inpainter.
#[test]
fn test_orange_stroke_removed() {
    let mut img = blank(200, 200);
    let w = 200usize;
    // Two connected ~60 px segments.
    for x in 60..120 {
        for t in 0..4 {
            img.pixels[(80 + t) * w + x] = RGBA8::new(255, 165, 0, 255);
        }
    }
    for y in 80..140 {
        for t in 0..4 {
            img.pixels[y * w + 60 + t] = RGBA8::new(255, 165, 0, 255);
        }
    }

    let boxes = [NormalizedBox::sanitized(0.1, 0.1, 0.9, 0.9)];
    let (out, stats) = clean_image(&img, &boxes, &CleanOptions::default()).expect("clean");
    assert!(stats.changed_pixels > 0);
    for (i, p) in out.pixels.iter().enumerate() {
        assert!(saturation(p) <= 0.1, "saturated pixel {p:?} at index {i}");
    }
}

// Scenario 4: a brighter red outline on a red background. The strong-red
// classifier fires on the line, and whatever the pipeline does, the
// background must not drift.
#[test]
fn test_red_on_red_background_drift_bounded() {
    assert!(demark::color::is_overlay_red(255, 30, 30));
    assert!(demark::color::is_overlay_like_strong(255, 30, 30));

    let bg = (200u8, 60u8, 60u8);
    let mut img = image_from_fn(200, 200, |_, _| bg);
    draw_outline(&mut img, 60, 60, 140, 140, 2, RGBA8::new(255, 30, 30, 255));
    let original = img.pixels.clone();

    let boxes = [NormalizedBox::sanitized(0.25, 0.25, 0.75, 0.75)];
    let (out, _) = clean_image(&img, &boxes, &CleanOptions::default()).expect("clean");
    for (p, o) in out.pixels.iter().zip(original.iter()) {
        if (o.r, o.g, o.b) == bg {
            assert!(
                (p.r as i32 - o.r as i32).abs() <= 15
                    && (p.g as i32 - o.g as i32).abs() <= 15
                    && (p.b as i32 - o.b as i32).abs() <= 15,
                "background drifted: {o:?} -> {p:?}"
            );
        }
    }
}

// Scenario 5: a huge erroneous box over a busy photograph is rejected by
// the huge-box guard; nothing changes.
#[test]
fn test_huge_box_rejected_on_busy_photo() {
    // Deterministic grayscale noise: busy texture, zero saturation.
    let mut state = 0x2545f491u32;
    let mut img = blank(200, 200);
    for p in img.pixels.iter_mut() {
        state = state.wrapping_mul(1664525).wrapping_add(1013904223);
        let v = (state >> 24) as u8;
        *p = RGBA8::new(v, v, v, 255);
    }

    let boxes = [NormalizedBox::sanitized(0.0, 0.0, 1.0, 1.0)];
    let (out, stats) = clean_image(&img, &boxes, &CleanOptions::default()).expect("clean");
    assert!(stats.texture_score > 15.0, "texture {}", stats.texture_score);
    assert_eq!(stats.changed_pixels, 0);
    assert_eq!(out.pixels, img.pixels);
}

// Scenario 6: upstream sent the box with axes swapped; the sanity check
// must paint the true frame, not the literal coordinates.
#[test]
fn test_axis_swap_paints_true_frame() {
    let mut img = blank(200, 200);
    // True frame: x 10-20%, y 60-80%.
    draw_outline(&mut img, 20, 120, 40, 160, 3, RGBA8::new(255, 0, 0, 255));
    let boxes = [NormalizedBox::sanitized(0.6, 0.1, 0.8, 0.2)];

    let (out, stats) = clean_image(&img, &boxes, &CleanOptions::default()).expect("clean");
    assert!(stats.changed_pixels > 0);

    let w = 200usize;
    // The frame is gone.
    for y in 118..162 {
        for x in 18..42 {
            let p = out.pixels[y * w + x];
            assert!(
                !demark::color::is_marker(p.r, p.g, p.b),
                "marker left at ({x},{y})"
            );
        }
    }
    // Every change lies within 4 px of the true frame rectangle; the
    // literal (unswapped) region is untouched.
    for y in 0..200 {
        for x in 0..200 {
            let p = out.pixels[y * w + x];
            let o = img.pixels[y * w + x];
            if (p.r, p.g, p.b) != (o.r, o.g, o.b) {
                assert!(
                    (16..44).contains(&x) && (116..164).contains(&y),
                    "unexpected change at ({x},{y})"
                );
            }
        }
    }
}

// Untouched pixels are bit-identical to the input.
#[test]
fn test_pixels_outside_boxes_untouched() {
    let mut img = blank(200, 200);
    draw_outline(&mut img, 50, 50, 150, 150, 4, RGBA8::new(255, 0, 0, 255));
    // Scene content far from the rectangle.
    let w = 200usize;
    for y in 5..15 {
        for x in 5..15 {
            img.pixels[y * w + x] = RGBA8::new(30, 90, 45, 255);
        }
    }

    let (out, _) = clean_image(&img, &[], &CleanOptions::default()).expect("clean");
    for y in 0..20 {
        for x in 0..20 {
            assert_eq!(out.pixels[y * w + x], img.pixels[y * w + x]);
        }
    }
}

// Near-idempotence: a second run changes no more than the first.
#[test]
fn test_second_run_changes_no_more() {
    let mut img = blank(200, 200);
    draw_outline(&mut img, 50, 50, 150, 150, 4, RGBA8::new(255, 0, 0, 255));
    let boxes = [NormalizedBox::sanitized(0.2, 0.2, 0.8, 0.8)];
    let options = CleanOptions::default();

    let (once, stats1) = clean_image(&img, &boxes, &options).expect("first");
    let (_, stats2) = clean_image(&once, &boxes, &options).expect("second");
    assert!(
        stats2.changed_pixels <= stats1.changed_pixels,
        "second run changed {} > first {}",
        stats2.changed_pixels,
        stats1.changed_pixels
    );
}

// Output container matches input container.
#[test]
fn test_container_preserved() {
    let mut img = blank(200, 200);
    draw_outline(&mut img, 50, 50, 150, 150, 4, RGBA8::new(255, 0, 0, 255));

    let png = encode_image(&img, Container::Png).expect("png");
    let out = clean_bytes(&png, &[], &CleanOptions::default()).expect("clean png");
    assert!(out.bytes.starts_with(&[0x89, b'P', b'N', b'G']));

    let jpeg = encode_image(&img, Container::Jpeg).expect("jpeg");
    let out = clean_bytes(&jpeg, &[], &CleanOptions::default()).expect("clean jpeg");
    assert!(out.bytes.starts_with(&[0xFF, 0xD8, 0xFF]));
}

// Stats serialize for the report consumers.
#[test]
fn test_stats_serialize() {
    let mut img = blank(200, 200);
    draw_outline(&mut img, 50, 50, 150, 150, 4, RGBA8 { r: 255, g: 0, b: 0, a: 255 });
    let (_, stats) = clean_image(&img, &[], &CleanOptions::default()).expect("clean");
    let json = serde_json::to_string(&stats).expect("serialize");
    assert!(json.contains("\"changed_pixels\""));
    assert!(json.contains("\"fallback_pixels\""));
    assert!(json.contains("\"total_pixels\""));
    assert!(json.contains("\"duration_ms\""));
}

// Both inpaint algorithms drive the full pipeline to a clean result.
#[test]
fn test_patch_algorithm_full_pipeline() {
    let mut img = blank(200, 200);
    draw_outline(&mut img, 50, 50, 150, 150, 4, RGBA8::new(255, 0, 0, 255));
    let options = CleanOptions {
        algorithm: demark::InpaintAlgorithm::Patch,
        ..CleanOptions::default()
    };
    let (out, stats) = clean_image(&img, &[], &options).expect("clean");
    assert!(stats.changed_pixels > 0);
    for p in &out.pixels {
        assert!(!demark::color::is_marker(p.r, p.g, p.b));
    }
}
