//! Test lifecycle orchestration and the frame loop
//!
//! A [`TestCase`] carries everything the host driver declares for one
//! test: explicit setup/body/teardown hooks, configuration override
//! layers, expected-failure kinds and rule middleware. [`Harness::run`]
//! resolves the effective configuration, acquires a surface, drives the
//! bounded frame loop and reconciles every collected failure against the
//! declared expectations.

use crate::comparison::ComparisonDriver;
use anyhow::Result;
use std::mem;
use std::path::{Path, PathBuf};
use vesta_core::{
    ConfigBlock, ErrorAggregator, ExpectedKind, Failure, OverrideLayer, RunConfig, RunResult,
    Stage, config,
};
use vesta_std::{Surface as _, SurfaceProvider, SurfaceRequest};

/// A setup, body or teardown hook operating on the test's surface.
pub type Hook<'a, S> = Box<dyn FnMut(&mut S) -> Result<()> + 'a>;

/// One unit of wrapped execution.
///
/// Rule middleware receives the next statement in the chain and is free to
/// run code before and after delegating to it, or to skip delegation.
pub trait Statement {
    fn evaluate(&mut self) -> Result<()>;
}

/// Rule middleware around a [`Statement`]. Rules compose outer-to-inner in
/// declaration order.
pub type Rule<'a> = Box<dyn FnMut(&mut dyn Statement) -> Result<()> + 'a>;

/// Host-driver notification interface.
pub trait RunNotifier {
    fn test_started(&mut self, test: &str);
    fn test_failure(&mut self, test: &str, failure: &Failure);
    fn test_finished(&mut self, test: &str);
}

/// Notifier that forwards run events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl RunNotifier for TracingNotifier {
    fn test_started(&mut self, test: &str) {
        tracing::info!(test, "test started");
    }

    fn test_failure(&mut self, test: &str, failure: &Failure) {
        tracing::warn!(test, %failure, "test failure");
    }

    fn test_finished(&mut self, test: &str) {
        tracing::info!(test, "test finished");
    }
}

/// Everything the host driver declares for one test.
pub struct TestCase<'a, S> {
    name: String,
    class_layer: OverrideLayer,
    method_layer: OverrideLayer,
    setup: Vec<Hook<'a, S>>,
    body: Hook<'a, S>,
    teardown: Vec<Hook<'a, S>>,
    expected: Vec<ExpectedKind>,
    rules: Vec<Rule<'a>>,
}

impl<'a, S> TestCase<'a, S> {
    #[must_use]
    pub fn new(name: impl Into<String>, body: impl FnMut(&mut S) -> Result<()> + 'a) -> Self {
        Self {
            name: name.into(),
            class_layer: OverrideLayer::new(),
            method_layer: OverrideLayer::new(),
            setup: Vec::new(),
            body: Box::new(body),
            teardown: Vec::new(),
            expected: Vec::new(),
            rules: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_class_layer(mut self, layer: OverrideLayer) -> Self {
        self.class_layer = layer;
        self
    }

    #[must_use]
    pub fn with_method_layer(mut self, layer: OverrideLayer) -> Self {
        self.method_layer = layer;
        self
    }

    /// Appends a setup hook; hooks run in declaration order.
    #[must_use]
    pub fn with_setup(mut self, hook: impl FnMut(&mut S) -> Result<()> + 'a) -> Self {
        self.setup.push(Box::new(hook));
        self
    }

    /// Appends a teardown hook; hooks run in declaration order.
    #[must_use]
    pub fn with_teardown(mut self, hook: impl FnMut(&mut S) -> Result<()> + 'a) -> Self {
        self.teardown.push(Box::new(hook));
        self
    }

    /// Declares that a failure of the given kind is expected.
    #[must_use]
    pub fn with_expected(mut self, kind: ExpectedKind) -> Self {
        self.expected.push(kind);
        self
    }

    /// Appends rule middleware; the first declared rule is outermost.
    #[must_use]
    pub fn with_rule(mut self, rule: impl FnMut(&mut dyn Statement) -> Result<()> + 'a) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The test execution harness.
///
/// Owns the surface provider and the archive root, and carries the loop
/// failure policy. One `run` call executes one test invocation with a
/// configuration resolved fresh for that invocation.
pub struct Harness<P: SurfaceProvider> {
    provider: P,
    defaults: ConfigBlock,
    archive_root: PathBuf,
    abort_on_failure: bool,
}

impl<P: SurfaceProvider> Harness<P> {
    #[must_use]
    pub fn new(provider: P, archive_root: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            defaults: ConfigBlock::default(),
            archive_root: archive_root.into(),
            abort_on_failure: true,
        }
    }

    /// Replaces the built-in configuration defaults.
    #[must_use]
    pub fn with_defaults(mut self, defaults: ConfigBlock) -> Self {
        self.defaults = defaults;
        self
    }

    /// Chooses the mid-loop failure policy.
    ///
    /// Under `true` (the default) the first recorded failure stops further
    /// iterations. Under `false` the loop always runs to its full
    /// iteration count and keeps collecting failures; frame-pacing sync is
    /// still skipped once a failure has been recorded.
    #[must_use]
    pub const fn with_abort_on_failure(mut self, abort: bool) -> Self {
        self.abort_on_failure = abort;
        self
    }

    #[must_use]
    #[inline]
    pub const fn provider(&self) -> &P {
        &self.provider
    }

    #[must_use]
    #[inline]
    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    /// Executes one test invocation and reports its outcome.
    pub fn run(&mut self, case: TestCase<'_, P::Surface>, notifier: &mut dyn RunNotifier) -> RunResult {
        let TestCase {
            name,
            class_layer,
            method_layer,
            setup,
            body,
            teardown,
            expected,
            mut rules,
        } = case;

        let mut runner = LoopRunner {
            provider: &mut self.provider,
            defaults: self.defaults,
            archive_root: &self.archive_root,
            abort_on_failure: self.abort_on_failure,
            notifier,
            name,
            class_layer,
            method_layer,
            setup,
            body,
            teardown,
            expected,
            errors: ErrorAggregator::new(),
            iteration: 0,
            state: DriverState::NotStarted,
            result: None,
        };

        if let Err(error) = run_with_rules(&mut rules, &mut runner) {
            // Mirrors the escaped-failure path of the host driver: one
            // failure notification, no finished notification.
            let failure = Failure::new(Stage::Harness, error);
            runner.notifier.test_failure(&runner.name, &failure);
            return RunResult::from_failure(failure);
        }

        runner.result.take().unwrap_or_default()
    }
}

/// Runs `base` wrapped by `rules`, first rule outermost.
fn run_with_rules(rules: &mut [Rule<'_>], base: &mut dyn Statement) -> Result<()> {
    match rules.split_first_mut() {
        None => base.evaluate(),
        Some((head, tail)) => {
            let mut next = NestedStatement { rules: tail, base };
            head(&mut next)
        }
    }
}

struct NestedStatement<'s, 'a> {
    rules: &'s mut [Rule<'a>],
    base: &'s mut dyn Statement,
}

impl Statement for NestedStatement<'_, '_> {
    fn evaluate(&mut self) -> Result<()> {
        run_with_rules(self.rules, self.base)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    NotStarted,
    Running,
    Completed,
    Aborted,
}

struct LoopRunner<'h, 'a, P: SurfaceProvider> {
    provider: &'h mut P,
    defaults: ConfigBlock,
    archive_root: &'h Path,
    abort_on_failure: bool,
    notifier: &'h mut dyn RunNotifier,
    name: String,
    class_layer: OverrideLayer,
    method_layer: OverrideLayer,
    setup: Vec<Hook<'a, P::Surface>>,
    body: Hook<'a, P::Surface>,
    teardown: Vec<Hook<'a, P::Surface>>,
    expected: Vec<ExpectedKind>,
    errors: ErrorAggregator,
    iteration: u32,
    state: DriverState,
    result: Option<RunResult>,
}

impl<P: SurfaceProvider> Statement for LoopRunner<'_, '_, P> {
    fn evaluate(&mut self) -> Result<()> {
        self.notifier.test_started(&self.name);

        let config = config::resolve(
            self.defaults,
            &self.class_layer,
            &self.method_layer,
            &self.name,
        );

        // A missing reference archive aborts before the surface exists.
        let mut comparison = match &config.comparison {
            Some(spec) => Some(ComparisonDriver::open(self.archive_root, &self.name, spec)?),
            None => None,
        };

        let request = SurfaceRequest {
            width: config.width,
            height: config.height,
            version_major: config.version_major(),
            version_minor: config.version_minor(),
            title: self.name.clone(),
        };
        let mut surface = self.provider.create_surface(&request)?;

        self.state = DriverState::Running;
        if let Err((stage, error)) = self.run_phases(&mut surface, comparison.as_mut(), &config) {
            self.state = DriverState::Aborted;
            self.errors.record(stage, error);
        }
        // Release is best-effort; the surface's Drop swallows its own
        // failures rather than mask a recorded one.
        drop(surface);
        tracing::debug!(test = %self.name, state = ?self.state, "frame loop finished");

        let result = mem::take(&mut self.errors).reconcile(&self.expected);
        for failure in result.failures() {
            self.notifier.test_failure(&self.name, failure);
        }
        self.notifier.test_finished(&self.name);
        self.result = Some(result);
        Ok(())
    }
}

impl<P: SurfaceProvider> LoopRunner<'_, '_, P> {
    /// Setup, loop, teardown. A fatal comparison or present error skips
    /// the teardown hooks; every other failure is recorded and the
    /// remaining phases still run.
    fn run_phases(
        &mut self,
        surface: &mut P::Surface,
        comparison: Option<&mut ComparisonDriver>,
        config: &RunConfig,
    ) -> Result<(), (Stage, anyhow::Error)> {
        self.run_setup(surface);
        let state = self.run_loop(surface, comparison, config)?;
        self.state = state;
        self.run_teardown(surface);
        Ok(())
    }

    fn run_setup(&mut self, surface: &mut P::Surface) {
        for hook in &mut self.setup {
            if let Err(error) = hook(surface) {
                self.errors.record(Stage::Setup, error);
            }
        }
    }

    fn run_teardown(&mut self, surface: &mut P::Surface) {
        for hook in &mut self.teardown {
            if let Err(error) = hook(surface) {
                self.errors.record(Stage::Teardown, error);
            }
        }
    }

    /// The bounded frame loop.
    ///
    /// The counter is pre-incremented and compared with `<=`, so the body
    /// executes for counter values `1..=iterations`; recorded golden
    /// archives stay frame-count compatible with that bound.
    fn run_loop(
        &mut self,
        surface: &mut P::Surface,
        mut comparison: Option<&mut ComparisonDriver>,
        config: &RunConfig,
    ) -> Result<DriverState, (Stage, anyhow::Error)> {
        loop {
            if self.abort_on_failure && !self.errors.is_empty() {
                return Ok(DriverState::Aborted);
            }
            self.iteration += 1;
            if self.iteration > config.iterations {
                return Ok(DriverState::Completed);
            }

            tracing::trace!(test = %self.name, iteration = self.iteration, "iteration");
            if let Err(error) = (self.body)(surface) {
                self.errors.record(Stage::Body, error);
            }
            if let Some(driver) = comparison.as_deref_mut() {
                driver
                    .compare_next(surface)
                    .map_err(|error| (Stage::Comparison, error))?;
            }
            if config.auto_swap {
                surface
                    .present()
                    .map_err(|error| (Stage::Present, anyhow::Error::new(error)))?;
            }
            if config.fps > 0 && self.errors.is_empty() {
                surface.sync_to_rate(config.fps);
            }
        }
    }
}
