//! demark - removal of human-drawn annotation markers from photos
//!
//! This library removes rectangular annotation overlays (red/orange/yellow/
//! blue outline boxes and strokes) from photographic images while
//! preserving the underlying content.
//!
//! ## Features
//!
//! - **Color-space classifiers** tuned for annotation inks under JPEG
//!   compression and anti-aliasing
//! - **Connected-component box detection** on a downscaled copy, for
//!   closed outlines and red overlay strokes
//! - **Directional band repainting** of located rectangle edges
//! - **Texture-synthesis inpainting** (weighted onion-peel or patch
//!   search) for everything the band logic cannot express
//!
//! The pipeline is deterministic: identical input bytes and box lists
//! always produce identical output.
//!
//! ## Example
//!
//! ```rust,no_run
//! use demark::{clean_file, CleanOptions, NormalizedBox};
//! use std::path::Path;
//!
//! let boxes = vec![NormalizedBox::sanitized(0.1, 0.1, 0.6, 0.6)];
//! let stats = clean_file(
//!     Path::new("annotated.jpg"),
//!     Path::new("restored.jpg"),
//!     &boxes,
//!     &CleanOptions::default(),
//! )
//! .expect("cleaning failed");
//! println!("changed {} of {} pixels", stats.changed_pixels, stats.total_pixels);
//! ```

pub mod ai_boxes;
pub mod box_detector;
pub mod calibration;
pub mod color;
pub mod geometry;
pub mod image_io;
pub mod inpaint;
pub mod mask_detector;
pub mod painter;
pub mod pipeline;
pub mod texture;

pub use ai_boxes::parse_box_list;
pub use anyhow::Result;
pub use calibration::Calibration;
pub use geometry::NormalizedBox;
pub use image_io::ImageData;
pub use inpaint::InpaintAlgorithm;
pub use pipeline::{
    clean_bytes, clean_image, CancelToken, CleanError, CleanOptions, CleanOutput, CleanStats,
};

/// Clean one image file on disk.
///
/// Reads `input`, runs the pipeline with the given candidate boxes, and
/// writes the result to `output` in the input's container format.
pub fn clean_file(
    input: &std::path::Path,
    output: &std::path::Path,
    boxes: &[NormalizedBox],
    options: &CleanOptions,
) -> Result<CleanStats> {
    let bytes = std::fs::read(input)?;
    let out = clean_bytes(&bytes, boxes, options)?;
    std::fs::write(output, &out.bytes)?;
    Ok(out.stats)
}
