//! Detectors for closed rectangular outlines and red overlay strokes.
//!
//! Both run on a nearest-neighbor downscale of the frame and emit candidate
//! boxes in normalized coordinates. Detector failures are never fatal: a
//! degenerate downscale simply yields no candidates.

use crate::color::{is_line_color, is_overlay_red};
use crate::geometry::NormalizedBox;
use crate::image_io::{downscale_nearest, ImageData};
use std::collections::VecDeque;

/// Candidate cap for the rectangle-outline detector.
const MAX_RECT_CANDIDATES: usize = 12;
/// Candidate cap for the overlay-stroke detector.
const MAX_OVERLAY_CANDIDATES: usize = 18;
/// Minimum side, in downscaled pixels, of a credible outline rectangle.
const MIN_RECT_SIDE: usize = 25;
/// Pixels of the downscaled border where components are distrusted.
const BORDER_MARGIN: usize = 2;

/// Downscale target for both detectors.
pub fn detect_target_width(width: u32) -> u32 {
    if width >= 2000 {
        960
    } else {
        720
    }
}

/// A connected component of classifier-positive pixels.
struct Component {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
    pixels: Vec<(usize, usize)>,
}

impl Component {
    fn bw(&self) -> usize {
        self.max_x - self.min_x + 1
    }
    fn bh(&self) -> usize {
        self.max_y - self.min_y + 1
    }
    fn fill(&self) -> f64 {
        self.pixels.len() as f64 / (self.bw() * self.bh()) as f64
    }

    /// True when the component reaches within `margin` pixels of the given
    /// bounding-box edge *near its center* (the central half of the span).
    /// The trivial extremes of a bare corner do not count as touching.
    fn touches_edge(&self, edge: Edge, margin: usize) -> bool {
        let (lo, hi) = match edge {
            Edge::Top | Edge::Bottom => {
                let span = self.bw();
                (self.min_x + span / 4, self.min_x + span - span / 4)
            }
            Edge::Left | Edge::Right => {
                let span = self.bh();
                (self.min_y + span / 4, self.min_y + span - span / 4)
            }
        };
        self.pixels.iter().any(|&(x, y)| match edge {
            Edge::Top => y <= self.min_y + margin && x >= lo && x < hi,
            Edge::Bottom => y + margin >= self.max_y && x >= lo && x < hi,
            Edge::Left => x <= self.min_x + margin && y >= lo && y < hi,
            Edge::Right => x + margin >= self.max_x && y >= lo && y < hi,
        })
    }

    fn touched_edge_count(&self, margin: usize) -> usize {
        [Edge::Top, Edge::Bottom, Edge::Left, Edge::Right]
            .into_iter()
            .filter(|&e| self.touches_edge(e, margin))
            .count()
    }

    /// Longest horizontal or vertical run of component pixels.
    fn longest_axis_run(&self) -> usize {
        let bw = self.bw();
        let bh = self.bh();
        let mut bitmap = vec![false; bw * bh];
        for &(x, y) in &self.pixels {
            bitmap[(y - self.min_y) * bw + (x - self.min_x)] = true;
        }
        let mut best = 0usize;
        for y in 0..bh {
            let mut run = 0usize;
            for x in 0..bw {
                if bitmap[y * bw + x] {
                    run += 1;
                    best = best.max(run);
                } else {
                    run = 0;
                }
            }
        }
        for x in 0..bw {
            let mut run = 0usize;
            for y in 0..bh {
                if bitmap[y * bw + x] {
                    run += 1;
                    best = best.max(run);
                } else {
                    run = 0;
                }
            }
        }
        best
    }
}

#[derive(Clone, Copy)]
enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

/// 8-connectivity flood fill over a boolean grid.
fn find_components(grid: &[bool], w: usize, h: usize) -> Vec<Component> {
    let mut visited = vec![false; w * h];
    let mut components = Vec::new();

    for sy in 0..h {
        for sx in 0..w {
            let start = sy * w + sx;
            if visited[start] || !grid[start] {
                continue;
            }
            let mut pixels = Vec::new();
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (sx, sy, sx, sy);
            let mut queue = VecDeque::new();
            visited[start] = true;
            queue.push_back((sx, sy));

            while let Some((x, y)) = queue.pop_front() {
                pixels.push((x, y));
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
                    if !visited[nidx] && grid[nidx] {
                        visited[nidx] = true;
                        queue.push_back((nx as usize, ny as usize));
                    }
                }
            }
            components.push(Component { min_x, min_y, max_x, max_y, pixels });
        }
    }
    components
}

/// Square dilation with Chebyshev radius `radius`.
fn dilate(grid: &[bool], w: usize, h: usize, radius: usize) -> Vec<bool> {
    let mut out = vec![false; w * h];
    for y in 0..h {
        for x in 0..w {
            if !grid[y * w + x] {
                continue;
            }
            let y0 = y.saturating_sub(radius);
            let y1 = (y + radius + 1).min(h);
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(w);
            for ny in y0..y1 {
                for nx in x0..x1 {
                    out[ny * w + nx] = true;
                }
            }
        }
    }
    out
}

fn component_to_box(c: &Component, sw: usize, sh: usize) -> NormalizedBox {
    let pad = (0.08 * c.bw().min(c.bh()) as f64).round().max(6.0);
    NormalizedBox::sanitized(
        (c.min_x as f64 - pad) / sw as f64,
        (c.min_y as f64 - pad) / sh as f64,
        (c.max_x as f64 + 1.0 + pad) / sw as f64,
        (c.max_y as f64 + 1.0 + pad) / sh as f64,
    )
}

fn near_border(c: &Component, sw: usize, sh: usize) -> bool {
    c.min_x < BORDER_MARGIN
        || c.min_y < BORDER_MARGIN
        || c.max_x + BORDER_MARGIN >= sw
        || c.max_y + BORDER_MARGIN >= sh
}

/// Find closed rectangular colored outlines.
pub fn detect_rectangles(image: &ImageData) -> Vec<NormalizedBox> {
    let down = downscale_nearest(image, detect_target_width(image.width));
    let sw = down.image.width as usize;
    let sh = down.image.height as usize;
    if sw < MIN_RECT_SIDE || sh < MIN_RECT_SIDE {
        return Vec::new();
    }

    let grid: Vec<bool> = down
        .image
        .pixels
        .iter()
        .map(|p| is_line_color(p.r, p.g, p.b))
        .collect();

    let mut accepted: Vec<(usize, NormalizedBox)> = Vec::new();
    for c in find_components(&grid, sw, sh) {
        let bw = c.bw();
        let bh = c.bh();
        if bw < MIN_RECT_SIDE || bh < MIN_RECT_SIDE {
            continue;
        }
        if bw as f64 > 0.95 * sw as f64 || bh as f64 > 0.95 * sh as f64 {
            continue;
        }
        let fill = c.fill();
        if fill <= 0.04 || fill >= 0.38 {
            continue;
        }
        if c.touched_edge_count(2) < 4 {
            continue;
        }
        if near_border(&c, sw, sh) {
            continue;
        }
        accepted.push((c.pixels.len(), component_to_box(&c, sw, sh)));
    }

    accepted.sort_by(|a, b| b.0.cmp(&a.0));
    accepted.truncate(MAX_RECT_CANDIDATES);
    accepted.into_iter().map(|(_, b)| b).collect()
}

/// Find red overlay strokes: same skeleton as the rectangle detector, but
/// the grid is dilated 5x5 first (thin strokes break apart at low
/// resolution), closure is not required, and a minimum straight run must be
/// present.
pub fn detect_overlay_strokes(image: &ImageData) -> Vec<NormalizedBox> {
    let down = downscale_nearest(image, detect_target_width(image.width));
    let sw = down.image.width as usize;
    let sh = down.image.height as usize;
    if sw < MIN_RECT_SIDE || sh < MIN_RECT_SIDE {
        return Vec::new();
    }

    let grid: Vec<bool> = down
        .image
        .pixels
        .iter()
        .map(|p| is_overlay_red(p.r, p.g, p.b))
        .collect();
    let grid = dilate(&grid, sw, sh, 2);

    let mut accepted: Vec<(usize, NormalizedBox)> = Vec::new();
    for c in find_components(&grid, sw, sh) {
        let bw = c.bw();
        let bh = c.bh();
        if bw.max(bh) < MIN_RECT_SIDE || bw.min(bh) < 4 {
            continue;
        }
        if bw as f64 > 0.95 * sw as f64 || bh as f64 > 0.95 * sh as f64 {
            continue;
        }
        if c.touched_edge_count(2) < 2 {
            continue;
        }
        let min_run = (0.12 * bw.min(bh) as f64).max(6.0) as usize;
        if c.longest_axis_run() <= min_run {
            continue;
        }
        if near_border(&c, sw, sh) {
            continue;
        }
        accepted.push((c.pixels.len(), component_to_box(&c, sw, sh)));
    }

    accepted.sort_by(|a, b| b.0.cmp(&a.0));
    accepted.truncate(MAX_OVERLAY_CANDIDATES);
    accepted.into_iter().map(|(_, b)| b).collect()
}
