//! Rendering-surface seam and headless software implementation
//!
//! The frame loop only needs a narrow interface to the windowing layer:
//! create a surface for a requested size and context version, present a
//! frame, pace the loop to a target rate, and read the pixels back.
//! [`HeadlessSurface`] implements that interface over an in-memory
//! framebuffer so the whole harness can be exercised without a display.

use std::time::{Duration, Instant};

/// Parameters for surface creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceRequest {
    pub width: u32,
    pub height: u32,
    pub version_major: u32,
    pub version_minor: u32,
    /// Window title; the harness passes the test's name.
    pub title: String,
}

#[derive(Debug)]
pub enum SurfaceError {
    Creation { reason: String },
    Present { reason: String },
}

impl std::error::Error for SurfaceError {}

impl std::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creation { reason } => write!(f, "surface creation failed: {reason}"),
            Self::Present { reason } => write!(f, "presenting frame failed: {reason}"),
        }
    }
}

/// One rendering surface, exclusively owned by a single test invocation.
///
/// Releasing the surface is `Drop`; implementations swallow their own
/// release errors rather than mask a test failure.
pub trait Surface {
    /// Surface dimensions in pixels.
    fn size(&self) -> (u32, u32);

    /// Presents the current frame.
    fn present(&mut self) -> Result<(), SurfaceError>;

    /// Blocks until the frame-pacing deadline for `fps` has elapsed.
    /// A rate of zero returns immediately.
    fn sync_to_rate(&mut self, fps: u32);

    /// Reads the framebuffer back as tightly packed RGBA8, rows ordered
    /// bottom-to-top as a GL read-back returns them.
    fn read_back(&self) -> Vec<u8>;
}

/// Creates surfaces for the harness.
pub trait SurfaceProvider {
    type Surface: Surface;

    /// Acquires a surface. A failure here aborts the test invocation
    /// before any hook runs.
    fn create_surface(&mut self, request: &SurfaceRequest) -> Result<Self::Surface, SurfaceError>;
}

/// Deadline-based frame pacing.
///
/// Measures the time since the previous sync and sleeps off the remainder
/// of the frame budget.
#[derive(Debug)]
pub struct FramePacer {
    last: Instant,
}

impl FramePacer {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    /// Blocks until one frame at `fps` has elapsed since the last sync.
    pub fn sync(&mut self, fps: u32) {
        if fps == 0 {
            return;
        }

        let duration = Duration::from_secs(1) / fps;
        let elapsed = self.last.elapsed();

        if elapsed < duration {
            spin_sleep::sleep(duration - elapsed);
        }

        self.last = Instant::now();
    }
}

impl Default for FramePacer {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// An in-memory software surface.
///
/// The framebuffer is stored in native read-back order (row 0 at the
/// bottom), so tests exercise the same vertical-axis handling as a real
/// GL surface.
#[derive(Debug)]
pub struct HeadlessSurface {
    width: u32,
    height: u32,
    title: String,
    pixels: Vec<u8>,
    pacer: FramePacer,
    presented: u32,
    fail_present: bool,
}

impl HeadlessSurface {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            title: String::new(),
            pixels: vec![0; (width * height * 4) as usize],
            pacer: FramePacer::new(),
            presented: 0,
            fail_present: false,
        }
    }

    fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_owned();
        self
    }

    /// Fills the framebuffer with one RGBA color.
    pub fn clear(&mut self, rgba: [u8; 4]) {
        for pixel in self.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&rgba);
        }
    }

    /// Writes one pixel in native read-back coordinates (`y == 0` is the
    /// bottom row).
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        debug_assert!(x < self.width && y < self.height, "pixel out of bounds");
        let offset = ((x + self.width * y) * 4) as usize;
        self.pixels[offset..offset + 4].copy_from_slice(&rgba);
    }

    /// Number of frames presented so far.
    #[must_use]
    #[inline]
    pub const fn presented(&self) -> u32 {
        self.presented
    }

    #[must_use]
    #[inline]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Makes every subsequent `present` call fail. Fault injection for
    /// exercising the fatal swap path.
    pub const fn set_fail_present(&mut self, fail: bool) {
        self.fail_present = fail;
    }
}

impl Surface for HeadlessSurface {
    #[inline]
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn present(&mut self) -> Result<(), SurfaceError> {
        if self.fail_present {
            return Err(SurfaceError::Present {
                reason: "injected present fault".to_owned(),
            });
        }
        self.presented += 1;
        Ok(())
    }

    fn sync_to_rate(&mut self, fps: u32) {
        self.pacer.sync(fps);
    }

    fn read_back(&self) -> Vec<u8> {
        self.pixels.clone()
    }
}

impl Drop for HeadlessSurface {
    fn drop(&mut self) {
        tracing::debug!(title = %self.title, presented = self.presented, "surface released");
    }
}

/// Provider of [`HeadlessSurface`]s.
#[derive(Debug, Default)]
pub struct HeadlessProvider {
    created: u32,
}

impl HeadlessProvider {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of surfaces created over this provider's lifetime.
    #[must_use]
    #[inline]
    pub const fn created(&self) -> u32 {
        self.created
    }
}

impl SurfaceProvider for HeadlessProvider {
    type Surface = HeadlessSurface;

    fn create_surface(&mut self, request: &SurfaceRequest) -> Result<HeadlessSurface, SurfaceError> {
        if request.width == 0 || request.height == 0 {
            return Err(SurfaceError::Creation {
                reason: format!("degenerate surface size {}x{}", request.width, request.height),
            });
        }

        self.created += 1;
        tracing::debug!(
            title = %request.title,
            width = request.width,
            height = request.height,
            version = %format_args!("{}.{}", request.version_major, request.version_minor),
            "surface created"
        );
        Ok(HeadlessSurface::new(request.width, request.height).with_title(&request.title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_fills_every_pixel() {
        let mut surface = HeadlessSurface::new(3, 2);
        surface.clear([9, 8, 7, 255]);

        let raw = surface.read_back();
        assert_eq!(raw.len(), 3 * 2 * 4);
        assert!(raw.chunks_exact(4).all(|p| p == [9, 8, 7, 255]));
    }

    #[test]
    fn put_pixel_writes_native_readback_order() {
        let mut surface = HeadlessSurface::new(2, 2);
        surface.put_pixel(1, 0, [1, 2, 3, 4]);

        let raw = surface.read_back();
        // Row 0 is the first chunk of the read-back buffer.
        assert_eq!(&raw[4..8], [1, 2, 3, 4]);
    }

    #[test]
    fn present_counts_and_injected_fault_fails() {
        let mut surface = HeadlessSurface::new(1, 1);
        surface.present().unwrap();
        surface.present().unwrap();
        assert_eq!(surface.presented(), 2);

        surface.set_fail_present(true);
        assert!(surface.present().is_err());
        assert_eq!(surface.presented(), 2);
    }

    #[test]
    fn provider_rejects_degenerate_sizes() {
        let mut provider = HeadlessProvider::new();
        let request = SurfaceRequest {
            width: 0,
            height: 64,
            version_major: 3,
            version_minor: 2,
            title: "degenerate".to_owned(),
        };

        match provider.create_surface(&request) {
            Err(SurfaceError::Creation { .. }) => {}
            other => panic!("expected creation failure, got {other:?}"),
        }
        assert_eq!(provider.created(), 0);
    }

    #[test]
    fn pacer_blocks_for_the_frame_budget() {
        let mut pacer = FramePacer::new();
        let start = Instant::now();
        pacer.sync(100);
        pacer.sync(100);
        // Two frames at 100 fps take at least one full frame budget from
        // the second sync.
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn pacer_rate_zero_is_unthrottled() {
        let mut pacer = FramePacer::new();
        let start = Instant::now();
        for _ in 0..1000 {
            pacer.sync(0);
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
