/// Configuration for the dataflow solver and the analyses built on top of it.
///
/// Mirrors the shape of a typical dataflow-framework configuration: an interprocedural toggle,
/// plus a safety limit on worklist iterations. The monotone framework guarantees termination, so
/// the limit is not expected to ever trip in a correctly-implemented analysis; its only purpose
/// is to turn a buggy, non-monotone lattice into a loud panic instead of a silent hang.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    interprocedural: bool,
    iteration_limit: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            interprocedural: false,
            iteration_limit: 1_000_000,
        }
    }
}

impl AnalysisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub const fn is_interprocedural(&self) -> bool {
        self.interprocedural
    }

    /// Enables interprocedural points-to analysis, i.e. `new_frame`/`restore_frame` actually
    /// enter callee bodies rather than treating calls as opaque.
    pub fn set_interprocedural(&mut self, yes: bool) -> &mut Self {
        self.interprocedural = yes;
        self
    }

    #[inline(always)]
    pub const fn iteration_limit(&self) -> usize {
        self.iteration_limit
    }

    pub fn set_iteration_limit(&mut self, limit: usize) -> &mut Self {
        self.iteration_limit = limit;
        self
    }

    /// Asserts that a worklist solver has not exceeded the configured iteration limit.
    ///
    /// Tripping this is always a programmer error (a lattice that isn't actually monotone, or
    /// has infinite height), never a property of the input program.
    #[track_caller]
    pub fn assert_within_iteration_limit(&self, iterations: usize) {
        assert!(
            iterations <= self.iteration_limit,
            "dataflow solver exceeded its iteration limit ({}); this indicates the lattice is not \
             actually monotone or does not have finite height",
            self.iteration_limit
        );
    }
}
