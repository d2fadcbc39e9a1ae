//! Recursive octant tree: the 3D counterpart of the quadtree
//!
//! Same split/straddle policy, eight equal children per division, full
//! AABB tests on all three axes.

use crate::core::config::config;
use crate::core::types::{EntityId, Vec3};

use super::bounds::Aabb;
use super::{validate_entity, SpatialEntity, SpatialIndex, SpatialStats};

struct Node {
    bounds: Aabb,
    level: usize,
    objects: Vec<SpatialEntity>,
    children: Option<Box<[Node; 8]>>,
}

impl Node {
    fn new(bounds: Aabb, level: usize) -> Self {
        Self {
            bounds,
            level,
            objects: Vec::new(),
            children: None,
        }
    }

    fn accepts(&self, entity: &SpatialEntity) -> bool {
        match entity.extent {
            None => self.bounds.contains_point(entity.pos),
            Some(_) => self.bounds.contains(&entity.aabb()),
        }
    }

    fn child_for(&self, entity: &SpatialEntity) -> Option<usize> {
        let children = self.children.as_ref()?;
        children.iter().position(|c| c.accepts(entity))
    }

    fn insert(&mut self, entity: SpatialEntity, max_objects: usize, max_levels: usize) {
        if let Some(idx) = self.child_for(&entity) {
            let children = self.children.as_mut().unwrap();
            children[idx].insert(entity, max_objects, max_levels);
            return;
        }

        self.objects.push(entity);

        if self.objects.len() > max_objects && self.level < max_levels {
            if self.children.is_none() {
                self.split();
            }
            self.redistribute(max_objects, max_levels);
        }
    }

    fn split(&mut self) {
        let min = self.bounds.min;
        let half = self.bounds.size * 0.5;
        let next = self.level + 1;

        let octant = |ix: f32, iy: f32, iz: f32| {
            Aabb::new(
                Vec3::new(
                    min.x + half.x * ix,
                    min.y + half.y * iy,
                    min.z + half.z * iz,
                ),
                half,
            )
        };

        self.children = Some(Box::new([
            Node::new(octant(0.0, 0.0, 0.0), next),
            Node::new(octant(1.0, 0.0, 0.0), next),
            Node::new(octant(0.0, 1.0, 0.0), next),
            Node::new(octant(1.0, 1.0, 0.0), next),
            Node::new(octant(0.0, 0.0, 1.0), next),
            Node::new(octant(1.0, 0.0, 1.0), next),
            Node::new(octant(0.0, 1.0, 1.0), next),
            Node::new(octant(1.0, 1.0, 1.0), next),
        ]));
    }

    fn redistribute(&mut self, max_objects: usize, max_levels: usize) {
        let all = std::mem::take(&mut self.objects);

        for entity in all {
            match self.child_for(&entity) {
                Some(idx) => {
                    let children = self.children.as_mut().unwrap();
                    children[idx].insert(entity, max_objects, max_levels);
                }
                None => self.objects.push(entity),
            }
        }
    }

    fn query(&self, bounds: &Aabb, out: &mut Vec<SpatialEntity>) {
        if !self.bounds.intersects(bounds) {
            return;
        }

        for obj in &self.objects {
            if obj.aabb().intersects(bounds) {
                out.push(*obj);
            }
        }

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query(bounds, out);
            }
        }
    }

    fn remove(&mut self, id: EntityId) -> bool {
        if let Some(idx) = self.objects.iter().position(|o| o.id == id) {
            self.objects.remove(idx);
            return true;
        }

        if let Some(children) = &mut self.children {
            for child in children.iter_mut() {
                if child.remove(id) {
                    return true;
                }
            }
        }

        false
    }

    fn collect_all(&self, out: &mut Vec<SpatialEntity>) {
        out.extend_from_slice(&self.objects);
        if let Some(children) = &self.children {
            for child in children.iter() {
                child.collect_all(out);
            }
        }
    }

    fn node_count(&self) -> usize {
        1 + self
            .children
            .as_ref()
            .map(|c| c.iter().map(Node::node_count).sum())
            .unwrap_or(0)
    }

    fn depth(&self) -> usize {
        match &self.children {
            None => self.level,
            Some(children) => children.iter().map(Node::depth).max().unwrap_or(self.level),
        }
    }
}

/// 3D octant tree
pub struct Octree {
    root: Node,
    max_objects: usize,
    max_levels: usize,
    len: usize,
}

impl Octree {
    pub fn new(bounds: Aabb, max_objects: usize, max_levels: usize) -> Self {
        Self {
            root: Node::new(bounds, 0),
            max_objects: max_objects.max(1),
            max_levels: max_levels.max(1),
            len: 0,
        }
    }

    /// Construct with the capacity and depth limits from [`config`]
    pub fn with_defaults(bounds: Aabb) -> Self {
        let cfg = config();
        Self::new(bounds, cfg.tree_max_objects, cfg.octree_max_levels)
    }

    pub fn bounds(&self) -> &Aabb {
        &self.root.bounds
    }

    pub fn collect_all(&self) -> Vec<SpatialEntity> {
        let mut out = Vec::with_capacity(self.len);
        self.root.collect_all(&mut out);
        out
    }
}

impl SpatialIndex for Octree {
    fn insert(&mut self, entity: SpatialEntity) -> bool {
        if !validate_entity(&entity, "octree") {
            return false;
        }
        self.root.insert(entity, self.max_objects, self.max_levels);
        self.len += 1;
        true
    }

    fn remove(&mut self, id: EntityId) -> bool {
        let removed = self.root.remove(id);
        if removed {
            self.len -= 1;
        }
        removed
    }

    fn query(&self, bounds: &Aabb) -> Vec<SpatialEntity> {
        let mut out = Vec::new();
        self.root.query(bounds, &mut out);
        out
    }

    fn query_radius(&self, center: Vec3, radius: f32) -> Vec<SpatialEntity> {
        // Box circumscribing the sphere, then exact squared-distance filter
        let prefilter = Aabb::centered(
            center,
            Vec3::new(radius * 2.0, radius * 2.0, radius * 2.0),
        );
        let radius_sq = radius * radius;

        let mut out = self.query(&prefilter);
        out.retain(|e| e.pos.distance_sq(&center) <= radius_sq);
        out
    }

    fn clear(&mut self) {
        let bounds = self.root.bounds;
        self.root = Node::new(bounds, 0);
        self.len = 0;
    }

    fn len(&self) -> usize {
        self.len
    }

    fn stats(&self) -> SpatialStats {
        SpatialStats {
            object_count: self.len,
            node_count: self.root.node_count(),
            depth: self.root.depth(),
        }
    }
}
