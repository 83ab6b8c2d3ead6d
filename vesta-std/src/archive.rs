//! Golden-frame archives: capture and playback
//!
//! An archive is a directory holding one PNG per captured frame, entries
//! named `{name}_{NNNN}.png` with a 1-based zero-padded index, plus a JSON
//! manifest recording the entries in capture order. The recorder appends
//! during a run; the reference reader replays entries strictly in that
//! order during comparison.

use crate::surface::Surface;
use image::{ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

const MANIFEST_NAME: &str = "manifest.json";

/// Errors raised by archive capture and playback.
#[derive(Debug)]
pub enum ArchiveError {
    /// The named reference archive does not exist.
    ReferenceNotFound { name: String },
    /// More frames were requested than the archive holds.
    ArchiveExhausted { name: String, frames: usize },
    /// A frame was appended after the archive was finalized.
    Closed { name: String },
    Io(io::Error),
    Image(image::ImageError),
    Manifest(serde_json::Error),
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Image(err) => Some(err),
            Self::Manifest(err) => Some(err),
            Self::ReferenceNotFound { .. } | Self::ArchiveExhausted { .. } | Self::Closed { .. } => {
                None
            }
        }
    }
}

impl std::fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ReferenceNotFound { name } => write!(f, "reference archive not found: {name}"),
            Self::ArchiveExhausted { name, frames } => {
                write!(f, "archive {name} exhausted after {frames} frames")
            }
            Self::Closed { name } => write!(f, "archive {name} is already closed"),
            Self::Io(err) => write!(f, "archive io error: {err}"),
            Self::Image(err) => write!(f, "archive image error: {err}"),
            Self::Manifest(err) => write!(f, "archive manifest error: {err}"),
        }
    }
}

impl From<io::Error> for ArchiveError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<image::ImageError> for ArchiveError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    name: String,
    entries: Vec<String>,
}

/// Captures a surface's pixels as an RGB image in display orientation.
///
/// The read-back buffer is bottom-to-top; row 0 of the returned image is
/// the last read-back row. Alpha is dropped.
#[must_use]
pub fn capture_frame<S: Surface + ?Sized>(surface: &S) -> RgbImage {
    let (width, height) = surface.size();
    let raw = surface.read_back();

    let mut image = RgbImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let offset = ((x + width * y) * 4) as usize;
            let r = raw[offset];
            let g = raw[offset + 1];
            let b = raw[offset + 2];
            image.put_pixel(x, height - (y + 1), Rgb([r, g, b]));
        }
    }
    image
}

/// Appends frames to a fresh archive, in capture order.
#[derive(Debug)]
pub struct Recorder {
    dir: PathBuf,
    name: String,
    frame: u32,
    entries: Vec<String>,
    closed: bool,
}

impl Recorder {
    /// Starts a fresh, empty archive named `name` under `root`, replacing
    /// any previous archive of the same name.
    pub fn create(root: &Path, name: &str) -> Result<Self, ArchiveError> {
        let dir = root.join(name);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        tracing::debug!(archive = name, "recording started");
        Ok(Self {
            dir,
            name: name.to_owned(),
            frame: 0,
            entries: Vec::new(),
            closed: false,
        })
    }

    /// Appends one frame as the next sequential entry.
    pub fn append_frame(&mut self, frame: &RgbImage) -> Result<(), ArchiveError> {
        if self.closed {
            return Err(ArchiveError::Closed {
                name: self.name.clone(),
            });
        }

        self.frame += 1;
        let entry = format!("{}_{:04}.png", self.name, self.frame);
        frame.save_with_format(self.dir.join(&entry), ImageFormat::Png)?;
        self.entries.push(entry);
        Ok(())
    }

    /// Captures the surface's current pixels and appends them.
    pub fn snapshot<S: Surface + ?Sized>(&mut self, surface: &S) -> Result<(), ArchiveError> {
        self.append_frame(&capture_frame(surface))
    }

    /// Number of frames appended so far.
    #[must_use]
    #[inline]
    pub const fn frames(&self) -> u32 {
        self.frame
    }

    /// Deletes the archive from disk, consuming the recorder.
    pub fn clear(mut self) -> Result<(), ArchiveError> {
        self.closed = true;
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }

    /// Finalizes the archive by writing the manifest. Safe to call once;
    /// subsequent calls are no-ops and appending afterwards is an error.
    pub fn close(&mut self) -> Result<(), ArchiveError> {
        if self.closed {
            return Ok(());
        }

        let manifest = Manifest {
            name: self.name.clone(),
            entries: self.entries.clone(),
        };
        let json = serde_json::to_vec_pretty(&manifest).map_err(ArchiveError::Manifest)?;
        fs::write(self.dir.join(MANIFEST_NAME), json)?;
        self.closed = true;
        tracing::debug!(archive = %self.name, frames = self.frame, "recording finished");
        Ok(())
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::error!(archive = %self.name, %err, "failed to finalize archive");
        }
    }
}

/// Sequential reader over a stored reference archive.
#[derive(Debug)]
pub struct ReferenceArchive {
    dir: PathBuf,
    name: String,
    entries: Vec<String>,
    next: usize,
}

impl ReferenceArchive {
    /// Opens the named archive under `root`.
    ///
    /// # Errors
    ///
    /// Fails with [`ArchiveError::ReferenceNotFound`] when no finalized
    /// archive of that name exists.
    pub fn open(root: &Path, name: &str) -> Result<Self, ArchiveError> {
        let dir = root.join(name);
        let manifest_path = dir.join(MANIFEST_NAME);
        if !manifest_path.exists() {
            return Err(ArchiveError::ReferenceNotFound {
                name: name.to_owned(),
            });
        }

        let manifest: Manifest =
            serde_json::from_slice(&fs::read(&manifest_path)?).map_err(ArchiveError::Manifest)?;
        Ok(Self {
            dir,
            name: name.to_owned(),
            entries: manifest.entries,
            next: 0,
        })
    }

    /// Returns the next entry in archive order.
    ///
    /// # Errors
    ///
    /// Fails with [`ArchiveError::ArchiveExhausted`] once every entry has
    /// been read.
    pub fn next_frame(&mut self) -> Result<(String, RgbImage), ArchiveError> {
        let Some(entry) = self.entries.get(self.next) else {
            return Err(ArchiveError::ArchiveExhausted {
                name: self.name.clone(),
                frames: self.entries.len(),
            });
        };
        self.next += 1;

        let image = image::open(self.dir.join(entry))?.to_rgb8();
        Ok((entry.clone(), image))
    }

    /// Total number of entries in the archive.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
