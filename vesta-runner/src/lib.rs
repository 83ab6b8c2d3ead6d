//! Frame-loop test execution engine for the Vesta harness
//!
//! This crate ties the engine together: it resolves each test's effective
//! configuration, acquires a rendering surface, drives the bounded frame
//! loop with per-frame golden comparison, collects failures and reconciles
//! them against declared expectations, and reports outcomes through the
//! host-driver notification interface.

pub mod comparison;
pub mod runner;

pub use comparison::ComparisonDriver;
pub use runner::{Harness, Hook, Rule, RunNotifier, Statement, TestCase, TracingNotifier};

// Engine types consumers need alongside the runner.
pub use vesta_core::{
    CompareBlock, CompareError, CompareSpec, ConfigBlock, ErrorAggregator, ExpectedKind, Failure,
    MissingExpectedFailure, OverrideLayer, RunConfig, RunResult, Stage, SwapMode,
};
pub use vesta_std::{
    ArchiveError, FramePacer, HeadlessProvider, HeadlessSurface, Recorder, ReferenceArchive,
    Surface, SurfaceError, SurfaceProvider, SurfaceRequest, capture_frame,
};

/// Installs an env-filtered fmt subscriber for tests and tools.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _unused = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
