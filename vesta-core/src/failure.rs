//! Failure aggregation and expected-failure reconciliation
//!
//! Failures raised anywhere in a test's lifetime are collected in raise
//! order without unwinding the run. Once the invocation ends they are
//! reconciled against the declared expected kinds exactly once: matching
//! failures are swallowed, non-matching ones surface verbatim, and a
//! declared kind that never occurred yields a synthetic failure of its own.

use anyhow::Error;

/// Lifecycle stage a failure was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Setup hooks before the frame loop.
    Setup,
    /// The test body, any iteration.
    Body,
    /// Per-frame comparison against the reference archive.
    Comparison,
    /// Presenting the frame after an iteration.
    Present,
    /// Teardown hooks after the frame loop.
    Teardown,
    /// Outside the test's own code: acquisition, rules, archive opening.
    Harness,
    /// Synthesized during reconciliation.
    Expectation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Setup => "setup",
            Self::Body => "body",
            Self::Comparison => "comparison",
            Self::Present => "present",
            Self::Teardown => "teardown",
            Self::Harness => "harness",
            Self::Expectation => "expectation",
        };
        f.write_str(name)
    }
}

/// One collected failure.
#[derive(Debug)]
pub struct Failure {
    stage: Stage,
    error: Error,
}

impl Failure {
    #[must_use]
    #[inline]
    pub fn new(stage: Stage, error: Error) -> Self {
        Self { stage, error }
    }

    #[must_use]
    #[inline]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    #[inline]
    pub const fn error(&self) -> &Error {
        &self.error
    }

    #[must_use]
    #[inline]
    pub fn into_error(self) -> Error {
        self.error
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.stage, self.error)
    }
}

/// A declared expected-failure kind.
///
/// A kind matches a collected failure when the failure's error chain
/// contains the declared type. A test declares at most one kind; the
/// aggregator accepts a set.
#[derive(Clone, Copy)]
pub struct ExpectedKind {
    name: &'static str,
    predicate: fn(&Error) -> bool,
}

impl ExpectedKind {
    /// Declares that a failure of type `T` is expected.
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: std::error::Error + Send + Sync + 'static,
    {
        Self {
            name: std::any::type_name::<T>(),
            predicate: |error| error.is::<T>(),
        }
    }

    #[must_use]
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    #[inline]
    pub fn matches(&self, error: &Error) -> bool {
        (self.predicate)(error)
    }
}

impl std::fmt::Debug for ExpectedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpectedKind").field("name", &self.name).finish()
    }
}

/// A declared expected-failure kind that never occurred.
#[derive(Debug)]
pub struct MissingExpectedFailure {
    expected: &'static str,
}

impl std::error::Error for MissingExpectedFailure {}

impl std::fmt::Display for MissingExpectedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected failure: {}", self.expected)
    }
}

/// Collects every failure raised during one test invocation.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    failures: Vec<Failure>,
}

impl ErrorAggregator {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure, preserving raise order.
    pub fn record(&mut self, stage: Stage, error: Error) {
        tracing::debug!(%stage, %error, "failure recorded");
        self.failures.push(Failure::new(stage, error));
    }

    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Reconciles the collected failures against the declared expected
    /// kinds, consuming the aggregator.
    ///
    /// Failures matching any expected kind are swallowed. Every kind with
    /// no matching failure appends one [`MissingExpectedFailure`] after the
    /// genuine failures.
    #[must_use]
    pub fn reconcile(self, expected: &[ExpectedKind]) -> RunResult {
        let mut satisfied = Vec::new();
        let mut unsatisfied = Vec::new();
        for kind in expected {
            if self.failures.iter().any(|f| kind.matches(f.error())) {
                satisfied.push(kind.name());
            } else {
                unsatisfied.push(kind.name());
            }
        }

        let mut reported: Vec<Failure> = self
            .failures
            .into_iter()
            .filter(|f| !expected.iter().any(|kind| kind.matches(f.error())))
            .collect();
        for &expected in &unsatisfied {
            reported.push(Failure::new(
                Stage::Expectation,
                MissingExpectedFailure { expected }.into(),
            ));
        }

        RunResult {
            failures: reported,
            satisfied,
            unsatisfied,
        }
    }
}

/// The terminal outcome of one test invocation.
#[derive(Debug, Default)]
pub struct RunResult {
    failures: Vec<Failure>,
    satisfied: Vec<&'static str>,
    unsatisfied: Vec<&'static str>,
}

impl RunResult {
    /// Wraps a single failure that escaped before reconciliation could run.
    #[must_use]
    pub fn from_failure(failure: Failure) -> Self {
        Self {
            failures: vec![failure],
            satisfied: Vec::new(),
            unsatisfied: Vec::new(),
        }
    }

    /// The reported failures, raise order first, synthesized
    /// missing-expected failures appended.
    #[must_use]
    #[inline]
    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    /// Expected kinds that matched at least one collected failure.
    #[must_use]
    #[inline]
    pub fn satisfied(&self) -> &[&'static str] {
        &self.satisfied
    }

    /// Expected kinds that never occurred.
    #[must_use]
    #[inline]
    pub fn unsatisfied(&self) -> &[&'static str] {
        &self.unsatisfied
    }

    #[must_use]
    #[inline]
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}
