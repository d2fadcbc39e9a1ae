//! Simpulse - performance core for real-time simulations
//!
//! Two building blocks shared by every game that uses this crate:
//! spatial indexes (quadtree, octree, spatial hash) for near-logarithmic
//! proximity queries, and a worker pool that offloads per-frame computation
//! (grid pathfinding, boid flocking) to resident kernels on worker threads,
//! with shared typed buffers for zero-copy result transport.

pub mod core;
pub mod kernels;
pub mod memory;
pub mod pool;
pub mod spatial;
