//! Calibration table for the cleaning pipeline.
//!
//! Every heuristic threshold that is worth tuning per deployment lives here.
//! The table is an immutable value carried inside [`CleanOptions`]; nothing
//! in the engine reads global state.
//!
//! [`CleanOptions`]: crate::CleanOptions

use serde::Deserialize;

/// Tunable thresholds with their shipped defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Calibration {
    /// Texture score above which a scene counts as complex.
    pub texture_complexity: f64,
    /// Fraction of the image area above which a candidate box is "huge".
    pub huge_box_area_ratio: f64,
    /// Minimum frame score to accept an unmatched huge box in a complex scene.
    pub huge_box_min_score_complex: u32,
    /// Minimum frame score to accept an unmatched huge box in a simple scene.
    pub huge_box_min_score_simple: u32,
    /// Cross-edge deferral threshold for 3+ inpaint samples.
    pub inpaint_sample_range_3: u32,
    /// Cross-edge deferral threshold for exactly 2 inpaint samples.
    pub inpaint_sample_range_2: u32,
    /// Area ceiling for corner-connected line components, as a fraction of
    /// the downscaled frame.
    pub max_component_area_ratio: f64,
    /// Bounding-box fill above which a component is a solid block, not an
    /// outline.
    pub max_fill_ratio: f64,
    /// Bounding-box fill above which a stroke component is a blob.
    pub stroke_max_fill: f64,
    /// Area ceiling for stroke components, as a fraction of the downscaled
    /// frame.
    pub max_stroke_area_ratio: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            texture_complexity: 15.0,
            huge_box_area_ratio: 0.20,
            huge_box_min_score_complex: 32,
            huge_box_min_score_simple: 24,
            inpaint_sample_range_3: 160,
            inpaint_sample_range_2: 210,
            max_component_area_ratio: 0.12,
            max_fill_ratio: 0.55,
            stroke_max_fill: 0.38,
            max_stroke_area_ratio: 0.10,
        }
    }
}
