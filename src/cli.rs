use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "demark")]
#[command(about = "Remove human-drawn annotation boxes and strokes from photos")]
#[command(version)]
pub struct Cli {
    /// Input image file or directory (batch mode)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file or directory (default: alongside input, ".cleaned" suffix)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON file with candidate boxes from an upstream detector.
    /// In batch mode a "<name>.boxes.json" sidecar is looked up per image.
    #[arg(short, long)]
    pub boxes: Option<PathBuf>,

    /// Inpainting algorithm (weighted is faster, patch keeps more texture)
    #[arg(short, long, value_enum, default_value = "weighted")]
    pub algorithm: AlgorithmArg,

    /// Calibration override file (JSON, partial keys allowed)
    #[arg(long)]
    pub calibration: Option<PathBuf>,

    /// Write statistics JSON to this path
    #[arg(long)]
    pub stats: Option<PathBuf>,

    /// Suppress per-file progress output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum AlgorithmArg {
    Weighted,
    Patch,
}

impl From<AlgorithmArg> for demark::InpaintAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Weighted => demark::InpaintAlgorithm::Weighted,
            AlgorithmArg::Patch => demark::InpaintAlgorithm::Patch,
        }
    }
}

/// Check if a file extension is a container the engine can re-encode.
pub fn is_supported_image(path: &std::path::Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        matches!(ext.to_lowercase().as_str(), "jpg" | "jpeg" | "png" | "webp")
    } else {
        false
    }
}
