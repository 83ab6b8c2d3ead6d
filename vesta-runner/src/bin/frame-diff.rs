//! Frame diff tool for inspecting visual regressions
//!
//! Compares two rendered frames with the harness's divergence metric,
//! useful for inspecting why a golden comparison failed.

use anyhow::{Context as _, Result};
use clap::Parser;
use image::ImageFormat;
use std::path::PathBuf;
use vesta_core::compare;

#[derive(Parser)]
#[command(name = "frame-diff")]
#[command(about = "Compare two rendered frames and report their divergence", long_about = None)]
struct Cli {
    /// First frame (PNG)
    frame_a: PathBuf,

    /// Second frame (PNG)
    frame_b: PathBuf,

    /// Divergence threshold; exits non-zero when exceeded
    #[arg(short, long, default_value_t = 0.01)]
    max_divergence: f32,

    /// Write the difference image to this path
    #[arg(short, long)]
    diff_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    vesta_runner::init_tracing();
    let cli = Cli::parse();

    let frame_a = image::open(&cli.frame_a)
        .with_context(|| format!("failed to open {}", cli.frame_a.display()))?
        .to_rgb8();
    let frame_b = image::open(&cli.frame_b)
        .with_context(|| format!("failed to open {}", cli.frame_b.display()))?
        .to_rgb8();

    let diff = compare::difference_image(&frame_a, &frame_b)?;
    let divergence = compare::divergence(&diff);
    println!("divergence: {divergence:.6}");

    if let Some(path) = &cli.diff_out {
        diff.save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("diff image written to {}", path.display());
    }

    if divergence > cli.max_divergence {
        println!(
            "divergence exceeds threshold {:.6}",
            cli.max_divergence
        );
        std::process::exit(1);
    }

    Ok(())
}
