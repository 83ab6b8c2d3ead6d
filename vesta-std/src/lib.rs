//! Std-side collaborators of the Vesta harness
//!
//! The pieces of the harness that touch the operating system: the reference
//! archive (golden-frame capture and playback on disk) and the rendering
//! surface seam with a headless software implementation used by the test
//! suite.

pub mod archive;
pub mod surface;

pub use archive::{ArchiveError, Recorder, ReferenceArchive, capture_frame};
pub use surface::{
    FramePacer, HeadlessProvider, HeadlessSurface, Surface, SurfaceError, SurfaceProvider,
    SurfaceRequest,
};
