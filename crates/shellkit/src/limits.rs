//! Resource limits for script execution
//!
//! The runner walks trees with boxed recursive futures, so unbounded
//! recursion (a function calling itself, a file sourcing itself) would grow
//! without limit. These bounds turn such scripts into a fatal
//! [`Error::ResourceLimit`](crate::Error::ResourceLimit).

/// Resource limits for script execution
#[derive(Debug, Clone)]
pub struct ExecutionLimits {
    /// Maximum function call depth (recursion limit)
    /// Default: 100
    pub max_function_depth: usize,

    /// Maximum nesting of `source`/`.` and `eval`
    /// Default: 100
    pub max_source_depth: usize,

    /// Maximum iterations for a single loop
    /// Default: unbounded
    pub max_loop_iterations: usize,

    /// Maximum number of alias substitutions for one command
    /// Default: 32
    pub max_alias_depth: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_function_depth: 100,
            max_source_depth: 100,
            max_loop_iterations: usize::MAX,
            max_alias_depth: 32,
        }
    }
}

impl ExecutionLimits {
    /// Create new limits with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum function depth
    pub fn max_function_depth(mut self, depth: usize) -> Self {
        self.max_function_depth = depth;
        self
    }

    /// Set maximum source/eval nesting
    pub fn max_source_depth(mut self, depth: usize) -> Self {
        self.max_source_depth = depth;
        self
    }

    /// Set maximum loop iterations
    pub fn max_loop_iterations(mut self, count: usize) -> Self {
        self.max_loop_iterations = count;
        self
    }

    /// Set maximum alias substitutions per command
    pub fn max_alias_depth(mut self, depth: usize) -> Self {
        self.max_alias_depth = depth;
        self
    }

    /// Check a loop's iteration count against the limit
    pub fn check_loop(&self, iterations: usize) -> Result<(), LimitExceeded> {
        if iterations > self.max_loop_iterations {
            return Err(LimitExceeded::MaxLoopIterations(self.max_loop_iterations));
        }
        Ok(())
    }
}

/// Nesting counters, copied into every subshell.
#[derive(Debug, Clone, Default)]
pub struct ExecutionCounters {
    /// Current function call depth
    pub function_depth: usize,

    /// Current source/eval depth
    pub source_depth: usize,
}

impl ExecutionCounters {
    /// Create new counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Push function call, returns error if depth exceeded
    pub fn push_function(&mut self, limits: &ExecutionLimits) -> Result<(), LimitExceeded> {
        // Check before incrementing so we don't leave invalid state on failure
        if self.function_depth >= limits.max_function_depth {
            return Err(LimitExceeded::MaxFunctionDepth(limits.max_function_depth));
        }
        self.function_depth += 1;
        Ok(())
    }

    /// Pop function call
    pub fn pop_function(&mut self) {
        self.function_depth = self.function_depth.saturating_sub(1);
    }

    /// Push a source/eval level, returns error if depth exceeded
    pub fn push_source(&mut self, limits: &ExecutionLimits) -> Result<(), LimitExceeded> {
        if self.source_depth >= limits.max_source_depth {
            return Err(LimitExceeded::MaxSourceDepth(limits.max_source_depth));
        }
        self.source_depth += 1;
        Ok(())
    }

    /// Pop a source/eval level
    pub fn pop_source(&mut self) {
        self.source_depth = self.source_depth.saturating_sub(1);
    }
}

/// Error returned when a resource limit is exceeded
#[derive(Debug, Clone, thiserror::Error)]
pub enum LimitExceeded {
    #[error("maximum loop iterations exceeded ({0})")]
    MaxLoopIterations(usize),

    #[error("maximum function depth exceeded ({0})")]
    MaxFunctionDepth(usize),

    #[error("maximum source depth exceeded ({0})")]
    MaxSourceDepth(usize),

    #[error("maximum alias depth exceeded ({0})")]
    MaxAliasDepth(usize),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.max_function_depth, 100);
        assert_eq!(limits.max_source_depth, 100);
        assert_eq!(limits.max_loop_iterations, usize::MAX);
        assert_eq!(limits.max_alias_depth, 32);
    }

    #[test]
    fn test_builder_pattern() {
        let limits = ExecutionLimits::new()
            .max_function_depth(10)
            .max_source_depth(3)
            .max_loop_iterations(50)
            .max_alias_depth(2);

        assert_eq!(limits.max_function_depth, 10);
        assert_eq!(limits.max_source_depth, 3);
        assert_eq!(limits.max_loop_iterations, 50);
        assert_eq!(limits.max_alias_depth, 2);
    }

    #[test]
    fn test_loop_check() {
        let limits = ExecutionLimits::new().max_loop_iterations(3);
        assert!(limits.check_loop(3).is_ok());
        assert!(matches!(
            limits.check_loop(4),
            Err(LimitExceeded::MaxLoopIterations(3))
        ));
    }

    #[test]
    fn test_function_depth() {
        let limits = ExecutionLimits::new().max_function_depth(2);
        let mut counters = ExecutionCounters::new();

        assert!(counters.push_function(&limits).is_ok());
        assert!(counters.push_function(&limits).is_ok());

        // 3rd call should fail
        assert!(matches!(
            counters.push_function(&limits),
            Err(LimitExceeded::MaxFunctionDepth(2))
        ));

        // Pop and try again
        counters.pop_function();
        assert!(counters.push_function(&limits).is_ok());
    }

    #[test]
    fn test_source_depth() {
        let limits = ExecutionLimits::new().max_source_depth(1);
        let mut counters = ExecutionCounters::new();
        assert!(counters.push_source(&limits).is_ok());
        assert!(counters.push_source(&limits).is_err());
        counters.pop_source();
        counters.pop_source();
        assert_eq!(counters.source_depth, 0);
    }
}
