//! Resource accounting for heap allocation and call depth.
//!
//! The heap and the dispatch engine are generic over a [`ResourceTracker`] so
//! embedders can run untrusted code under memory/recursion budgets. Limit
//! violations surface as uncatchable Python exceptions (`MemoryError`,
//! `RecursionError`): user code cannot suppress them with `try`/`except`.

use std::fmt;

/// Default maximum call depth before a `RecursionError` is raised.
///
/// This also protects the host stack: dunder dispatch re-enters the runtime
/// recursively, so unbounded Python recursion would otherwise become
/// unbounded Rust recursion.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

/// Maximum inheritance chain length accepted when linearizing a class.
pub(crate) const MAX_INHERITANCE_DEPTH: usize = 256;

/// Maximum MRO length produced by C3 linearization.
pub(crate) const MAX_MRO_LENGTH: usize = 1024;

/// Error raised when a resource limit is exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ResourceError {
    /// Memory budget exhausted.
    Memory {
        /// Configured limit in bytes.
        limit: usize,
        /// Size of the allocation that crossed the limit.
        requested: usize,
    },
    /// Allocation-count budget exhausted.
    Allocations {
        /// Configured allocation limit.
        limit: usize,
    },
    /// Call depth exceeded the recursion limit.
    Recursion {
        /// Configured depth limit.
        limit: usize,
    },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory { limit, requested } => {
                write!(f, "memory limit of {limit} bytes exceeded (requested {requested})")
            }
            Self::Allocations { limit } => write!(f, "allocation limit of {limit} exceeded"),
            Self::Recursion { limit } => {
                write!(f, "maximum recursion depth exceeded (limit {limit})")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

/// Hooks invoked by the heap and call machinery to account for resources.
pub trait ResourceTracker: fmt::Debug {
    /// Called before each heap allocation.
    ///
    /// `get_size` computes the approximate size in bytes of the allocation;
    /// it is only invoked when the tracker actually accounts for memory.
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError>;

    /// Called when a heap slot is reclaimed.
    fn on_free(&mut self, get_size: impl FnOnce() -> usize);

    /// Called before entering a call at the given depth.
    fn on_call(&mut self, depth: usize) -> Result<(), ResourceError>;
}

/// Tracker that enforces no memory limits, only the default recursion bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self, _get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn on_free(&mut self, _get_size: impl FnOnce() -> usize) {}

    #[inline]
    fn on_call(&mut self, depth: usize) -> Result<(), ResourceError> {
        if depth > DEFAULT_MAX_RECURSION_DEPTH {
            return Err(ResourceError::Recursion {
                limit: DEFAULT_MAX_RECURSION_DEPTH,
            });
        }
        Ok(())
    }
}

/// Configurable limits for [`LimitedTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceLimits {
    /// Maximum estimated heap memory in bytes, if any.
    pub max_memory: Option<usize>,
    /// Maximum number of heap allocations, if any.
    pub max_allocations: Option<usize>,
    /// Maximum call depth.
    pub max_recursion_depth: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory: None,
            max_allocations: None,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

/// Tracker enforcing [`ResourceLimits`].
#[derive(Debug, Clone, Default)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    memory_used: usize,
    allocations: usize,
}

impl LimitedTracker {
    /// Creates a tracker enforcing the given limits.
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            memory_used: 0,
            allocations: 0,
        }
    }

    /// Returns the current estimated memory usage in bytes.
    #[must_use]
    pub fn memory_used(&self) -> usize {
        self.memory_used
    }

    /// Returns the total number of allocations performed.
    #[must_use]
    pub fn allocations(&self) -> usize {
        self.allocations
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_allocations
            && self.allocations >= max
        {
            return Err(ResourceError::Allocations { limit: max });
        }
        self.allocations += 1;

        let size = get_size();
        if let Some(max) = self.limits.max_memory
            && self.memory_used + size > max
        {
            return Err(ResourceError::Memory {
                limit: max,
                requested: size,
            });
        }
        self.memory_used += size;
        Ok(())
    }

    fn on_free(&mut self, get_size: impl FnOnce() -> usize) {
        self.memory_used = self.memory_used.saturating_sub(get_size());
    }

    fn on_call(&mut self, depth: usize) -> Result<(), ResourceError> {
        if depth > self.limits.max_recursion_depth {
            return Err(ResourceError::Recursion {
                limit: self.limits.max_recursion_depth,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limited_tracker_enforces_allocation_budget() {
        let mut tracker = LimitedTracker::new(ResourceLimits {
            max_allocations: Some(2),
            ..ResourceLimits::default()
        });
        assert!(tracker.on_allocate(|| 8).is_ok());
        assert!(tracker.on_allocate(|| 8).is_ok());
        assert_eq!(
            tracker.on_allocate(|| 8),
            Err(ResourceError::Allocations { limit: 2 })
        );
    }

    #[test]
    fn limited_tracker_enforces_memory_budget() {
        let mut tracker = LimitedTracker::new(ResourceLimits {
            max_memory: Some(100),
            ..ResourceLimits::default()
        });
        assert!(tracker.on_allocate(|| 60).is_ok());
        assert!(matches!(
            tracker.on_allocate(|| 60),
            Err(ResourceError::Memory { limit: 100, .. })
        ));
        tracker.on_free(|| 60);
        assert!(tracker.on_allocate(|| 60).is_ok());
    }

    #[test]
    fn no_limit_tracker_still_bounds_recursion() {
        let mut tracker = NoLimitTracker;
        assert!(tracker.on_call(DEFAULT_MAX_RECURSION_DEPTH).is_ok());
        assert!(tracker.on_call(DEFAULT_MAX_RECURSION_DEPTH + 1).is_err());
    }
}
