use std::{
    fmt,
    time::{Duration, Instant},
};

/// Recommended maximum call depth if not otherwise specified.
///
/// Matches CPython's default recursion limit.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

/// Error returned when a resource limit is exceeded during execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Maximum instruction operations exceeded.
    Operation { limit: usize, count: usize },
    /// Maximum execution time exceeded.
    Time { limit: Duration, elapsed: Duration },
    /// Maximum call depth exceeded.
    Recursion { limit: usize, depth: usize },
    /// A single operation would build a sequence longer than allowed.
    Size { limit: usize, requested: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation { limit, count } => {
                write!(f, "operation limit exceeded: {count} > {limit}")
            }
            Self::Time { limit, elapsed } => {
                write!(f, "time limit exceeded: {elapsed:?} > {limit:?}")
            }
            Self::Recursion { limit, depth } => {
                write!(f, "maximum recursion depth exceeded: {depth} > {limit}")
            }
            Self::Size { limit, requested } => {
                write!(f, "sequence size limit exceeded: {requested} > {limit}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

/// Trait for tracking resource usage while a frame stack executes.
///
/// The VM consults the tracker before every instruction and before every new
/// call frame is pushed, so an implementation can stop a runaway program
/// without the program's cooperation.
pub trait ResourceTracker: fmt::Debug {
    /// Called before each instruction is dispatched.
    ///
    /// Returns `Ok(())` if within configured execution limits, or a
    /// `ResourceError` if a limit is exceeded (for example `Time` or `Operation`).
    fn check_time(&mut self) -> Result<(), ResourceError>;

    /// Called before pushing a new call frame to check recursion depth.
    ///
    /// # Arguments
    /// * `current_depth` - Current call stack depth (before the new frame is pushed)
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError>;

    /// Called before operations that build a sequence whose size is known up front,
    /// such as `[0] * n` or `"ab" * n`.
    ///
    /// # Arguments
    /// * `requested_len` - Number of elements (or characters) the result would hold
    fn check_large_result(&self, requested_len: usize) -> Result<(), ResourceError>;

    /// Returns the number of instructions executed, if this tracker counts them.
    fn operation_count(&self) -> Option<usize> {
        None
    }
}

/// A tracker that applies no limits except the default recursion depth.
///
/// Without any depth limit a runaway recursive program would grow the
/// frame stack until the host runs out of memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn check_time(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if current_depth >= DEFAULT_MAX_RECURSION_DEPTH {
            Err(ResourceError::Recursion {
                limit: DEFAULT_MAX_RECURSION_DEPTH,
                depth: current_depth + 1,
            })
        } else {
            Ok(())
        }
    }

    #[inline]
    fn check_large_result(&self, _requested_len: usize) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// Configuration for resource limits.
///
/// All limits are optional - set to `None` to disable a specific limit.
/// Use `ResourceLimits::default()` for no limits, or build custom limits
/// with the builder pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of VM operations (instructions) per run.
    #[serde(default)]
    pub max_operations: Option<usize>,
    /// Maximum execution time.
    #[serde(default)]
    pub max_duration: Option<Duration>,
    /// Maximum call depth (frame stack depth).
    #[serde(default)]
    pub max_recursion_depth: Option<usize>,
    /// Maximum length of a sequence built by a single repetition operation.
    #[serde(default)]
    pub max_sequence_len: Option<usize>,
}

impl ResourceLimits {
    /// Creates a new ResourceLimits with all limits disabled, except max recursion which is set to 1000.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_recursion_depth: Some(DEFAULT_MAX_RECURSION_DEPTH),
            ..Default::default()
        }
    }

    /// Sets the maximum number of VM operations (instructions) per run.
    #[must_use]
    pub fn max_operations(mut self, limit: usize) -> Self {
        self.max_operations = Some(limit);
        self
    }

    /// Sets the maximum execution duration.
    #[must_use]
    pub fn max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    /// Sets the maximum recursion depth (frame stack depth).
    #[must_use]
    pub fn max_recursion_depth(mut self, limit: Option<usize>) -> Self {
        self.max_recursion_depth = limit;
        self
    }

    /// Sets the maximum length of a sequence produced by repetition.
    #[must_use]
    pub fn max_sequence_len(mut self, limit: usize) -> Self {
        self.max_sequence_len = Some(limit);
        self
    }
}

/// A resource tracker that enforces configurable limits.
///
/// The start time is recorded when the tracker is created, so create it
/// immediately before starting execution.
#[derive(Debug, Clone)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    start_time: Instant,
    /// Number of VM operations executed.
    operation_count: usize,
}

impl LimitedTracker {
    /// Creates a new LimitedTracker with the given limits.
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            start_time: Instant::now(),
            operation_count: 0,
        }
    }

    /// Returns the elapsed time since tracker creation.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the configured limits.
    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

impl ResourceTracker for LimitedTracker {
    fn check_time(&mut self) -> Result<(), ResourceError> {
        self.operation_count += 1;
        if let Some(max) = self.limits.max_operations
            && self.operation_count > max
        {
            return Err(ResourceError::Operation {
                limit: max,
                count: self.operation_count,
            });
        }

        if let Some(max) = self.limits.max_duration {
            let elapsed = self.start_time.elapsed();
            if elapsed > max {
                return Err(ResourceError::Time { limit: max, elapsed });
            }
        }
        Ok(())
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_recursion_depth {
            // current_depth is before push, so new depth would be current_depth + 1
            if current_depth >= max {
                return Err(ResourceError::Recursion {
                    limit: max,
                    depth: current_depth + 1,
                });
            }
        }
        Ok(())
    }

    fn check_large_result(&self, requested_len: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_sequence_len
            && requested_len > max
        {
            return Err(ResourceError::Size {
                limit: max,
                requested: requested_len,
            });
        }
        Ok(())
    }

    fn operation_count(&self) -> Option<usize> {
        Some(self.operation_count)
    }
}

impl<T: ResourceTracker> ResourceTracker for &mut T {
    fn check_time(&mut self) -> Result<(), ResourceError> {
        (**self).check_time()
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        (**self).check_recursion_depth(current_depth)
    }

    fn check_large_result(&self, requested_len: usize) -> Result<(), ResourceError> {
        (**self).check_large_result(requested_len)
    }

    fn operation_count(&self) -> Option<usize> {
        (**self).operation_count()
    }
}
