//! Performance-core configuration with documented constants
//!
//! All magic numbers are collected here with explanations of their purpose
//! and how they interact with each other.

/// Configuration for the spatial indexes, worker pool and shared memory
///
/// These values mirror what the games shipping on this core have been
/// tuned against. Changing them affects query cost and frame pacing.
#[derive(Debug, Clone)]
pub struct PerfConfig {
    // === SPATIAL SYSTEM ===
    /// Node capacity before a quadtree/octree node subdivides
    ///
    /// Smaller = deeper trees, cheaper per-node scans, more pointer chasing.
    /// Larger = shallower trees, more linear filtering per node.
    pub tree_max_objects: usize,

    /// Maximum quadtree depth; at this depth overflow is tolerated
    /// instead of subdividing further
    pub quadtree_max_levels: usize,

    /// Maximum octree depth
    ///
    /// 3D trees fan out 8-way, so they reach unusable node counts sooner;
    /// the default is two levels shallower than the quadtree.
    pub octree_max_levels: usize,

    /// Default cell size for the spatial hash (world units)
    ///
    /// Should be in the same ballpark as the typical query radius. Smaller
    /// cells mean more buckets per query ring; larger cells mean more
    /// candidates to distance-filter per bucket.
    pub hash_cell_size: f32,

    // === WORKER POOL ===
    /// Worker thread count; 0 means use the host's reported parallelism
    pub worker_count: usize,

    // === SHARED MEMORY ===
    /// Total budget for shared segments, in bytes
    ///
    /// Allocation requests past this point fail gracefully (callers fall
    /// back to copy-based messaging), mirroring a host without a
    /// shared-memory primitive.
    pub shared_memory_budget: usize,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            // Spatial
            tree_max_objects: 10,
            quadtree_max_levels: 8,
            octree_max_levels: 6,
            hash_cell_size: 10.0,

            // Pool (0 = host parallelism)
            worker_count: 0,

            // Shared memory: 256 MiB
            shared_memory_budget: 256 * 1024 * 1024,
        }
    }
}

impl PerfConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.tree_max_objects == 0 {
            return Err("tree_max_objects must be at least 1".into());
        }

        if self.quadtree_max_levels == 0 || self.octree_max_levels == 0 {
            return Err("tree depth limits must be at least 1".into());
        }

        if self.hash_cell_size <= 0.0 {
            return Err(format!(
                "hash_cell_size ({}) must be positive",
                self.hash_cell_size
            ));
        }

        if self.shared_memory_budget == 0 {
            return Err("shared_memory_budget must be positive".into());
        }

        Ok(())
    }

    /// Resolve the worker count, falling back to host parallelism
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count > 0 {
            self.worker_count
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

// === GLOBAL CONFIG ACCESS ===

use std::sync::OnceLock;

static CONFIG: OnceLock<PerfConfig> = OnceLock::new();

/// Get the global config (initializes with defaults if not set)
pub fn config() -> &'static PerfConfig {
    CONFIG.get_or_init(PerfConfig::default)
}

/// Set the global config (can only be called once)
///
/// Returns Err if config was already set.
pub fn set_config(config: PerfConfig) -> Result<(), PerfConfig> {
    CONFIG.set(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PerfConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_cell_size_rejected() {
        let cfg = PerfConfig {
            hash_cell_size: 0.0,
            ..PerfConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_effective_worker_count_never_zero() {
        let cfg = PerfConfig::default();
        assert!(cfg.effective_worker_count() >= 1);

        let pinned = PerfConfig {
            worker_count: 3,
            ..PerfConfig::default()
        };
        assert_eq!(pinned.effective_worker_count(), 3);
    }
}
