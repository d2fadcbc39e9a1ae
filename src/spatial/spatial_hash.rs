//! Uniform spatial hash for entities that move every frame
//!
//! O(1) amortized insert/update at the cost of wasted buckets for sparse
//! or clustered populations. Prefer the trees for static-ish entities;
//! prefer the hash for flocking agents and projectiles.

use ahash::AHashMap;

use crate::core::config::config;
use crate::core::types::{EntityId, Vec3};

use super::bounds::Aabb;
use super::{validate_entity, SpatialEntity, SpatialIndex, SpatialStats};

type CellKey = (i32, i32, i32);

struct HashEntry {
    entity: SpatialEntity,
    /// Last-computed cell key, so a move costs one remove + one insert
    key: CellKey,
}

/// Spatial hash with a fixed cell size
///
/// One implementation serves both dimensionalities: a 2D caller leaves
/// z at 0 and gets planar cell rings; a 3D caller gets cubic rings.
pub struct SpatialHash {
    cell_size: f32,
    cells: AHashMap<CellKey, Vec<EntityId>>,
    entries: AHashMap<EntityId, HashEntry>,
}

impl SpatialHash {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: if cell_size > 0.0 { cell_size } else { 1.0 },
            cells: AHashMap::new(),
            entries: AHashMap::new(),
        }
    }

    /// Construct with the cell size from [`config`]
    pub fn with_defaults() -> Self {
        Self::new(config().hash_cell_size)
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    fn cell_key(&self, pos: Vec3) -> CellKey {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.y / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    fn unlink(&mut self, id: EntityId, key: CellKey) {
        if let Some(bucket) = self.cells.get_mut(&key) {
            bucket.retain(|&e| e != id);
            if bucket.is_empty() {
                self.cells.remove(&key);
            }
        }
    }

    /// Re-key an entity after it moved
    ///
    /// Same cell: only the stored position is refreshed. New cell: the
    /// entity is unlinked from its old bucket and appended to the new one.
    /// Unknown ids are ignored.
    pub fn update(&mut self, id: EntityId, new_pos: Vec3) {
        if !new_pos.is_finite() {
            tracing::warn!("spatial hash: ignoring non-finite update for {:?}", id);
            return;
        }

        let new_key = self.cell_key(new_pos);
        let Some(entry) = self.entries.get_mut(&id) else {
            return;
        };
        entry.entity.pos = new_pos;

        let old_key = entry.key;
        if old_key == new_key {
            return;
        }
        entry.key = new_key;

        self.unlink(id, old_key);
        self.cells.entry(new_key).or_default().push(id);
    }

    /// Mean bucket occupancy, for tuning cell size
    pub fn average_per_cell(&self) -> f32 {
        if self.cells.is_empty() {
            0.0
        } else {
            self.entries.len() as f32 / self.cells.len() as f32
        }
    }
}

impl SpatialIndex for SpatialHash {
    fn insert(&mut self, entity: SpatialEntity) -> bool {
        if !validate_entity(&entity, "spatial hash") {
            return false;
        }

        // Re-inserting an existing id replaces its record
        if self.entries.contains_key(&entity.id) {
            self.remove(entity.id);
        }

        let key = self.cell_key(entity.pos);
        self.cells.entry(key).or_default().push(entity.id);
        self.entries.insert(entity.id, HashEntry { entity, key });
        true
    }

    fn remove(&mut self, id: EntityId) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                self.unlink(id, entry.key);
                true
            }
            None => false,
        }
    }

    fn query(&self, bounds: &Aabb) -> Vec<SpatialEntity> {
        let lo = self.cell_key(bounds.min);
        let hi = self.cell_key(bounds.max());

        let mut out = Vec::new();
        for cx in lo.0..=hi.0 {
            for cy in lo.1..=hi.1 {
                for cz in lo.2..=hi.2 {
                    let Some(bucket) = self.cells.get(&(cx, cy, cz)) else {
                        continue;
                    };
                    for id in bucket {
                        let entry = &self.entries[id];
                        if entry.entity.aabb().intersects(bounds) {
                            out.push(entry.entity);
                        }
                    }
                }
            }
        }
        out
    }

    /// Scans every cell within `ceil(radius / cell_size)` rings of the
    /// center cell, then applies the exact squared-distance filter.
    /// A center with z = 0 restricts the scan to the z = 0 cell plane.
    fn query_radius(&self, center: Vec3, radius: f32) -> Vec<SpatialEntity> {
        let cell_radius = (radius / self.cell_size).ceil() as i32;
        let (cx, cy, cz) = self.cell_key(center);
        let planar = center.z == 0.0;
        let radius_sq = radius * radius;

        let z_range = if planar { 0..=0 } else { -cell_radius..=cell_radius };

        let mut out = Vec::new();
        for dx in -cell_radius..=cell_radius {
            for dy in -cell_radius..=cell_radius {
                for dz in z_range.clone() {
                    let Some(bucket) = self.cells.get(&(cx + dx, cy + dy, cz + dz)) else {
                        continue;
                    };
                    for id in bucket {
                        let entry = &self.entries[id];
                        if entry.entity.pos.distance_sq(&center) <= radius_sq {
                            out.push(entry.entity);
                        }
                    }
                }
            }
        }
        out
    }

    fn clear(&mut self) {
        self.cells.clear();
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn stats(&self) -> SpatialStats {
        SpatialStats {
            object_count: self.entries.len(),
            node_count: self.cells.len(),
            depth: 0,
        }
    }
}
