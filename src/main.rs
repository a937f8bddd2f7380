mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use demark::{clean_file, parse_box_list, Calibration, CleanOptions, CleanStats, NormalizedBox};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let calibration = match &cli.calibration {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading calibration file {}", path.display()))?;
            serde_json::from_str::<Calibration>(&text)
                .with_context(|| format!("parsing calibration file {}", path.display()))?
        }
        None => Calibration::default(),
    };
    let options = CleanOptions {
        calibration,
        algorithm: cli.algorithm.into(),
        cancel: None,
    };

    if cli.input.is_dir() {
        run_batch(&cli, &options)
    } else {
        run_single(&cli, &options)
    }
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let ext = input.extension().and_then(|s| s.to_str()).unwrap_or("png");
    input.with_file_name(format!("{stem}.cleaned.{ext}"))
}

fn load_boxes(path: &Path) -> Result<Vec<NormalizedBox>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading box list {}", path.display()))?;
    Ok(parse_box_list(&text))
}

fn sidecar_boxes(image: &Path) -> Result<Vec<NormalizedBox>> {
    let stem = image.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let sidecar = image.with_file_name(format!("{stem}.boxes.json"));
    if sidecar.is_file() {
        load_boxes(&sidecar)
    } else {
        Ok(Vec::new())
    }
}

fn run_single(cli: &Cli, options: &CleanOptions) -> Result<()> {
    let output = cli.output.clone().unwrap_or_else(|| default_output(&cli.input));
    let boxes = match &cli.boxes {
        Some(path) => load_boxes(path)?,
        None => sidecar_boxes(&cli.input)?,
    };

    if !cli.quiet {
        println!(
            "Cleaning {} ({} candidate boxes) -> {}...",
            cli.input.display(),
            boxes.len(),
            output.display()
        );
    }
    let stats = clean_file(&cli.input, &output, &boxes, options)?;
    if !cli.quiet {
        println!(
            "Done: {} of {} pixels changed ({} fallback) in {} ms",
            stats.changed_pixels, stats.total_pixels, stats.fallback_pixels, stats.duration_ms
        );
    }
    if let Some(path) = &cli.stats {
        fs::write(path, serde_json::to_string_pretty(&stats)?)?;
    }
    Ok(())
}

fn run_batch(cli: &Cli, options: &CleanOptions) -> Result<()> {
    let out_dir = cli.output.clone().unwrap_or_else(|| cli.input.clone());
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    let mut inputs: Vec<PathBuf> = fs::read_dir(&cli.input)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && cli::is_supported_image(p))
        .collect();
    inputs.sort();

    if !cli.quiet {
        println!("Cleaning {} images from {}...", inputs.len(), cli.input.display());
    }

    // Each invocation is independent; fan the files out across threads.
    let results: Vec<(PathBuf, Result<CleanStats>)> = inputs
        .par_iter()
        .map(|input| {
            let run = || -> Result<CleanStats> {
                let boxes = sidecar_boxes(input)?;
                let name = input.file_name().and_then(|s| s.to_str()).unwrap_or("output");
                let output = if out_dir == cli.input {
                    default_output(input)
                } else {
                    out_dir.join(name)
                };
                clean_file(input, &output, &boxes, options)
            };
            (input.clone(), run())
        })
        .collect();

    let mut failures = 0usize;
    let mut reports = Vec::new();
    for (input, result) in &results {
        match result {
            Ok(stats) => {
                if !cli.quiet {
                    println!(
                        "  {}: {} pixels changed",
                        input.display(),
                        stats.changed_pixels
                    );
                }
                reports.push(serde_json::json!({
                    "file": input.display().to_string(),
                    "stats": stats,
                }));
            }
            Err(err) => {
                eprintln!("  {}: FAILED: {err:#}", input.display());
                failures += 1;
            }
        }
    }
    if let Some(path) = &cli.stats {
        fs::write(path, serde_json::to_string_pretty(&reports)?)?;
    }
    if !cli.quiet {
        println!("Batch complete: {} ok, {} failed", results.len() - failures, failures);
    }
    if failures > 0 {
        anyhow::bail!("{failures} of {} images failed", results.len());
    }
    Ok(())
}
