//! Spatial indexing: quadtree, octree and spatial hash
//!
//! Three interchangeable strategies behind one trait. Pick at construction
//! time based on entity distribution: trees for static-ish or clustered
//! populations (level geometry, loot), the hash for roughly uniform
//! populations that move every frame (flocking agents).

pub mod bounds;
pub mod octree;
pub mod quadtree;
pub mod spatial_hash;

use serde::Serialize;

use crate::core::types::{EntityId, Vec3};
use bounds::Aabb;

/// Entity reference as stored by an index: id plus the fields it reads
///
/// The caller keeps the authoritative record; the index holds a copy of
/// the position and optional full extents. 2D callers leave `z` at 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialEntity {
    pub id: EntityId,
    pub pos: Vec3,
    /// Full extents (width, height, depth), centered on `pos`; None = point
    pub extent: Option<Vec3>,
}

impl SpatialEntity {
    /// 2D point entity
    pub fn point(id: EntityId, x: f32, y: f32) -> Self {
        Self { id, pos: Vec3::planar(x, y), extent: None }
    }

    /// 3D point entity
    pub fn point3(id: EntityId, x: f32, y: f32, z: f32) -> Self {
        Self { id, pos: Vec3::new(x, y, z), extent: None }
    }

    /// 2D entity with extents
    pub fn sized(id: EntityId, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            id,
            pos: Vec3::planar(x, y),
            extent: Some(Vec3::planar(width, height)),
        }
    }

    /// 3D entity with extents
    pub fn sized3(id: EntityId, pos: Vec3, extent: Vec3) -> Self {
        Self { id, pos, extent: Some(extent) }
    }

    /// Bounding box centered on the position (zero-size for points)
    pub fn aabb(&self) -> Aabb {
        Aabb::centered(self.pos, self.extent.unwrap_or(Vec3::ZERO))
    }

    /// Positions must be finite; extents, when present, finite and >= 0
    pub fn is_valid(&self) -> bool {
        if !self.pos.is_finite() {
            return false;
        }
        match self.extent {
            Some(e) => e.is_finite() && e.x >= 0.0 && e.y >= 0.0 && e.z >= 0.0,
            None => true,
        }
    }
}

/// Read-only snapshot of index shape, for dashboards and tests
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SpatialStats {
    /// Entities currently stored
    pub object_count: usize,
    /// Tree nodes, or occupied hash buckets
    pub node_count: usize,
    /// Deepest subdivision level (0 for the hash)
    pub depth: usize,
}

/// Common contract of the three index strategies
///
/// All operations are synchronous and run on the orchestrating thread.
pub trait SpatialIndex {
    /// Add an entity reference. Entities with non-finite coordinates are
    /// rejected with a logged warning; returns false in that case.
    fn insert(&mut self, entity: SpatialEntity) -> bool;

    /// Remove by id; returns whether anything was removed.
    fn remove(&mut self, id: EntityId) -> bool;

    /// All stored entities whose bounds intersect the query bounds.
    fn query(&self, bounds: &Aabb) -> Vec<SpatialEntity>;

    /// All stored entities whose center lies within `radius` of `center`.
    fn query_radius(&self, center: Vec3, radius: f32) -> Vec<SpatialEntity>;

    /// Drop every stored entity (trees also release their nodes).
    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> SpatialStats;
}

/// Shared insert-time validation: warn and reject malformed entities
pub(crate) fn validate_entity(entity: &SpatialEntity, index_kind: &str) -> bool {
    if entity.is_valid() {
        true
    } else {
        tracing::warn!(
            "{}: rejecting entity {:?} with non-finite coordinates",
            index_kind,
            entity.id
        );
        false
    }
}
