//! Core engine of the Vesta visual-regression harness
//!
//! This crate contains the deterministic pieces of the harness: resolving
//! hierarchical per-test configuration into one effective configuration,
//! computing difference images and divergence scores, and aggregating the
//! failures raised during a test run against declared expectations.
//!
//! Everything here is pure with respect to the filesystem and the rendering
//! surface; the archive and surface collaborators live in `vesta-std`, and
//! the frame loop that ties them together lives in `vesta-runner`.

pub mod compare;
pub mod config;
pub mod failure;

pub use compare::{CompareError, difference_image, divergence};
pub use config::{CompareBlock, CompareSpec, ConfigBlock, OverrideLayer, RunConfig, SwapMode};
pub use failure::{
    ErrorAggregator, ExpectedKind, Failure, MissingExpectedFailure, RunResult, Stage,
};
