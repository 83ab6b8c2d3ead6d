//! Per-frame comparison against a reference archive
//!
//! One driver instance serves one test invocation: the reference archive
//! is opened up front (a missing archive aborts the invocation before a
//! surface even exists) and consumed strictly in order, one entry per
//! rendered frame.

use anyhow::Result;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use vesta_core::{CompareError, CompareSpec, compare};
use vesta_std::{ArchiveError, ReferenceArchive, Surface, capture_frame};

/// Drives sequential golden-frame comparison for one test.
#[derive(Debug)]
pub struct ComparisonDriver {
    reference: ReferenceArchive,
    max_divergence: f32,
    test_name: String,
    diff_root: PathBuf,
}

impl ComparisonDriver {
    /// Opens the reference archive named by `spec`.
    ///
    /// # Errors
    ///
    /// Fails with [`ArchiveError::ReferenceNotFound`] when the archive
    /// does not exist.
    pub fn open(root: &Path, test_name: &str, spec: &CompareSpec) -> Result<Self, ArchiveError> {
        let reference = ReferenceArchive::open(root, &spec.reference)?;
        tracing::debug!(
            test = test_name,
            reference = %spec.reference,
            frames = reference.len(),
            "reference archive opened"
        );
        Ok(Self {
            reference,
            max_divergence: spec.max_divergence,
            test_name: test_name.to_owned(),
            diff_root: root.to_path_buf(),
        })
    }

    /// Compares the surface's current frame against the next reference
    /// entry, persisting a diagnostic diff image when the divergence
    /// exceeds the threshold.
    pub fn compare_next<S: Surface + ?Sized>(&mut self, surface: &S) -> Result<()> {
        let (entry, expected) = self.reference.next_frame()?;
        let actual = capture_frame(surface);
        let diff = compare::difference_image(&expected, &actual)?;
        let divergence = compare::divergence(&diff);

        if divergence > self.max_divergence {
            // Best-effort debugging aid; losing it must not mask the failure.
            let artifact = self
                .diff_root
                .join(format!("diff_{}_{}", self.test_name, entry));
            match diff.save_with_format(&artifact, ImageFormat::Png) {
                Ok(()) => tracing::info!(artifact = %artifact.display(), "diff image persisted"),
                Err(err) => tracing::warn!(%err, "failed to persist diff image"),
            }
            return Err(CompareError::DivergenceExceeded {
                entry,
                divergence,
                max_divergence: self.max_divergence,
            }
            .into());
        }

        tracing::trace!(entry = %entry, divergence, "frame matches reference");
        Ok(())
    }
}
