//! Hierarchical per-test configuration resolution
//!
//! A test's effective configuration is merged from up to three scopes:
//! built-in defaults, a class-level [`OverrideLayer`] and a method-level
//! [`OverrideLayer`]. Within one scope the coarse [`ConfigBlock`] fragment
//! applies first and the single-field fragments after it, so an author can
//! set a full baseline with one declaration and tweak individual fields
//! with smaller ones. Later scopes win over earlier ones field by field.

/// Buffer-swap policy for a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwapMode {
    /// The driver presents the frame after every iteration.
    Auto,
    /// The test body presents frames itself (or not at all).
    #[default]
    Manual,
}

/// A full general-configuration fragment.
///
/// When present in a layer it overwrites every general field at once,
/// including the ones left at their defaults, matching the semantics of a
/// declaration that always carries a value for each field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigBlock {
    pub profile: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub iterations: u32,
    pub swap: SwapMode,
}

impl Default for ConfigBlock {
    #[inline]
    fn default() -> Self {
        Self {
            profile: 320,
            width: 640,
            height: 480,
            fps: 60,
            iterations: 120,
            swap: SwapMode::Manual,
        }
    }
}

/// A comparison fragment.
///
/// `reference` is optional; the effective reference name falls back to the
/// test's own name. `max_divergence` always carries a concrete value, so a
/// later layer's fragment overwrites the threshold even when left at the
/// default.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareBlock {
    pub reference: Option<String>,
    pub max_divergence: f32,
}

impl CompareBlock {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    #[must_use]
    pub const fn with_max_divergence(mut self, max_divergence: f32) -> Self {
        self.max_divergence = max_divergence;
        self
    }
}

impl Default for CompareBlock {
    #[inline]
    fn default() -> Self {
        Self {
            reference: None,
            max_divergence: 0.01,
        }
    }
}

/// Partial configuration attached to one declaration scope.
///
/// Every fragment is optional; absent fragments leave the accumulator
/// untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideLayer {
    config: Option<ConfigBlock>,
    profile: Option<u32>,
    window: Option<(u32, u32)>,
    fps: Option<u32>,
    iterations: Option<u32>,
    swap: Option<SwapMode>,
    compare: Option<CompareBlock>,
}

impl OverrideLayer {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_config(mut self, config: ConfigBlock) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub const fn with_profile(mut self, profile: u32) -> Self {
        self.profile = Some(profile);
        self
    }

    #[must_use]
    pub const fn with_window(mut self, width: u32, height: u32) -> Self {
        self.window = Some((width, height));
        self
    }

    #[must_use]
    pub const fn with_fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }

    #[must_use]
    pub const fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = Some(iterations);
        self
    }

    #[must_use]
    pub const fn with_swap(mut self, swap: SwapMode) -> Self {
        self.swap = Some(swap);
        self
    }

    #[must_use]
    pub fn with_compare(mut self, compare: CompareBlock) -> Self {
        self.compare = Some(compare);
        self
    }

    /// Applies this layer's general fragments onto `acc`, coarse block
    /// first, then the single-field fragments in declaration-kind order.
    fn apply_general(&self, acc: &mut ConfigBlock) {
        if let Some(config) = self.config {
            *acc = config;
        }
        if let Some(profile) = self.profile {
            acc.profile = profile;
        }
        if let Some((width, height)) = self.window {
            acc.width = width;
            acc.height = height;
        }
        if let Some(fps) = self.fps {
            acc.fps = fps;
        }
        if let Some(iterations) = self.iterations {
            acc.iterations = iterations;
        }
        if let Some(swap) = self.swap {
            acc.swap = swap;
        }
    }
}

/// Resolved comparison policy for one test invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompareSpec {
    /// Name of the reference archive. Never empty.
    pub reference: String,
    /// Divergence threshold in `[0, 1]` above which a frame fails.
    pub max_divergence: f32,
}

/// The effective configuration governing one test invocation.
///
/// Constructed fresh by [`resolve`] for every invocation and discarded at
/// its end; never cached across invocations.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub profile: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub iterations: u32,
    pub auto_swap: bool,
    pub comparison: Option<CompareSpec>,
}

impl RunConfig {
    /// Major context version encoded in the profile code (320 -> 3).
    #[must_use]
    #[inline]
    pub const fn version_major(&self) -> u32 {
        self.profile / 100
    }

    /// Minor context version encoded in the profile code (320 -> 2).
    #[must_use]
    #[inline]
    pub const fn version_minor(&self) -> u32 {
        self.profile % 100 / 10
    }
}

/// Merges `defaults` with the class- and method-level layers into the
/// effective configuration for the named test.
///
/// Pure and deterministic: no I/O, no caching. The comparison spec is only
/// constructed when at least one layer declares a compare fragment; its
/// reference name falls back to `test_name`.
#[must_use]
pub fn resolve(
    defaults: ConfigBlock,
    class_layer: &OverrideLayer,
    method_layer: &OverrideLayer,
    test_name: &str,
) -> RunConfig {
    let mut acc = defaults;
    class_layer.apply_general(&mut acc);
    method_layer.apply_general(&mut acc);

    let comparison = resolve_compare(class_layer, method_layer, test_name);

    let config = RunConfig {
        profile: acc.profile,
        width: acc.width,
        height: acc.height,
        fps: acc.fps,
        iterations: acc.iterations,
        auto_swap: acc.swap == SwapMode::Auto,
        comparison,
    };
    tracing::debug!(test = test_name, ?config, "resolved effective configuration");
    config
}

fn resolve_compare(
    class_layer: &OverrideLayer,
    method_layer: &OverrideLayer,
    test_name: &str,
) -> Option<CompareSpec> {
    if class_layer.compare.is_none() && method_layer.compare.is_none() {
        return None;
    }

    let mut reference = test_name.to_owned();
    let mut max_divergence = CompareBlock::default().max_divergence;
    for block in [&class_layer.compare, &method_layer.compare]
        .into_iter()
        .flatten()
    {
        if let Some(explicit) = &block.reference
            && !explicit.is_empty()
        {
            reference.clone_from(explicit);
        }
        max_divergence = block.max_divergence;
    }

    Some(CompareSpec {
        reference,
        max_divergence,
    })
}
