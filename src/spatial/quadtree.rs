//! Recursive quadrant tree for 2D range and radius queries
//!
//! Splits a region into four equal children once a node passes its object
//! capacity. Entities that straddle a split line stay at the node that
//! could not hand them down, so nothing is ever stored twice and a small
//! position change never forces a re-balance. The z components of bounds
//! and positions are ignored throughout.

use crate::core::config::config;
use crate::core::types::{EntityId, Vec3};

use super::bounds::Aabb;
use super::{validate_entity, SpatialEntity, SpatialIndex, SpatialStats};

struct Node {
    bounds: Aabb,
    level: usize,
    objects: Vec<SpatialEntity>,
    /// None = leaf; Some = fully divided, all four children allocated
    children: Option<Box<[Node; 4]>>,
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

    /// A child can take an entity only if it contains it entirely
    fn accepts(&self, entity: &SpatialEntity) -> bool {
        match entity.extent {
            None => self.bounds.contains_point_xy(entity.pos),
            Some(_) => self.bounds.contains_xy(&entity.aabb()),
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

    /// Allocate the four equal quadrants
    fn split(&mut self) {
        let min = self.bounds.min;
        let half = self.bounds.size * 0.5;
        let next = self.level + 1;

        let quadrant = |ix: f32, iy: f32| {
            Aabb::new(
                Vec3::new(min.x + half.x * ix, min.y + half.y * iy, min.z),
                Vec3::new(half.x, half.y, self.bounds.size.z),
            )
        };

        self.children = Some(Box::new([
            Node::new(quadrant(0.0, 0.0), next),
            Node::new(quadrant(1.0, 0.0), next),
            Node::new(quadrant(0.0, 1.0), next),
            Node::new(quadrant(1.0, 1.0), next),
        ]));
    }

    /// Move contained entities down; straddlers stay here
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
        if !self.bounds.intersects_xy(bounds) {
            return;
        }

        for obj in &self.objects {
            if obj.aabb().intersects_xy(bounds) {
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

/// 2D quadrant tree
pub struct Quadtree {
    root: Node,
    max_objects: usize,
    max_levels: usize,
    len: usize,
}

impl Quadtree {
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
        Self::new(bounds, cfg.tree_max_objects, cfg.quadtree_max_levels)
    }

    pub fn bounds(&self) -> &Aabb {
        &self.root.bounds
    }

    /// Every stored entity, in node order
    pub fn collect_all(&self) -> Vec<SpatialEntity> {
        let mut out = Vec::with_capacity(self.len);
        self.root.collect_all(&mut out);
        out
    }
}

impl SpatialIndex for Quadtree {
    fn insert(&mut self, entity: SpatialEntity) -> bool {
        if !validate_entity(&entity, "quadtree") {
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
        // Box circumscribing the circle, then an exact distance-squared
        // filter on entity centers. No square roots on the hot path.
        let prefilter = Aabb::rect(
            center.x - radius,
            center.y - radius,
            radius * 2.0,
            radius * 2.0,
        );
        let radius_sq = radius * radius;

        let mut out = self.query(&prefilter);
        out.retain(|e| e.pos.distance_sq_xy(&center) <= radius_sq);
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

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Quadtree {
        Quadtree::new(Aabb::rect(0.0, 0.0, 100.0, 100.0), 4, 5)
    }

    #[test]
    fn test_insert_below_capacity_stays_leaf() {
        let mut t = tree();
        for i in 0..4 {
            t.insert(SpatialEntity::point(EntityId::new(), i as f32 * 10.0, 5.0));
        }

        let stats = t.stats();
        assert_eq!(stats.object_count, 4);
        assert_eq!(stats.node_count, 1);
        assert_eq!(stats.depth, 0);
    }

    #[test]
    fn test_overflow_splits_and_redistributes() {
        let mut t = tree();
        // Scatter across all four quadrants
        let spots = [
            (10.0, 10.0),
            (90.0, 10.0),
            (10.0, 90.0),
            (90.0, 90.0),
            (30.0, 30.0),
        ];
        for (x, y) in spots {
            t.insert(SpatialEntity::point(EntityId::new(), x, y));
        }

        let stats = t.stats();
        assert_eq!(stats.object_count, 5);
        assert_eq!(stats.node_count, 5);
        assert_eq!(stats.depth, 1);
    }

    #[test]
    fn test_capacity_invariant_for_points() {
        let mut t = tree();
        // Deterministic pseudo-scatter; points never land on split lines
        for i in 0..200 {
            let x = (i as f32 * 37.3) % 99.0 + 0.3;
            let y = (i as f32 * 53.7) % 99.0 + 0.3;
            t.insert(SpatialEntity::point(EntityId::new(), x, y));
        }

        fn check(node: &Node, max_objects: usize, max_levels: usize) {
            if node.level < max_levels {
                assert!(
                    node.objects.len() <= max_objects,
                    "node at level {} holds {} objects",
                    node.level,
                    node.objects.len()
                );
            }
            if let Some(children) = &node.children {
                for c in children.iter() {
                    check(c, max_objects, max_levels);
                }
            }
        }
        check(&t.root, t.max_objects, t.max_levels);
    }

    #[test]
    fn test_coincident_points_respect_depth_limit() {
        let mut t = tree();
        for _ in 0..50 {
            t.insert(SpatialEntity::point(EntityId::new(), 1.0, 1.0));
        }

        let stats = t.stats();
        assert_eq!(stats.object_count, 50);
        assert!(stats.depth <= 5);
        // All 50 pile up in the deepest node; overflow is tolerated there
        assert_eq!(t.query_radius(Vec3::planar(1.0, 1.0), 0.5).len(), 50);
    }

    #[test]
    fn test_straddler_stays_queryable_from_both_sides() {
        let mut t = tree();
        // Force a split first
        for (x, y) in [(10.0, 10.0), (90.0, 10.0), (10.0, 90.0), (90.0, 90.0), (20.0, 20.0)] {
            t.insert(SpatialEntity::point(EntityId::new(), x, y));
        }

        // Entity spanning the vertical split line at x = 50
        let straddler = EntityId::new();
        t.insert(SpatialEntity::sized(straddler, 50.0, 25.0, 10.0, 10.0));

        let left = t.query(&Aabb::rect(0.0, 0.0, 48.0, 100.0));
        let right = t.query(&Aabb::rect(52.0, 0.0, 48.0, 100.0));
        assert!(left.iter().any(|e| e.id == straddler));
        assert!(right.iter().any(|e| e.id == straddler));
    }

    #[test]
    fn test_query_exact_against_brute_force() {
        let mut t = tree();
        let mut all = Vec::new();
        for i in 0..60 {
            let e = SpatialEntity::point(
                EntityId::new(),
                (i as f32 * 17.9) % 100.0,
                (i as f32 * 31.1) % 100.0,
            );
            all.push(e);
            t.insert(e);
        }

        let q = Aabb::rect(20.0, 20.0, 40.0, 40.0);
        let mut got: Vec<EntityId> = t.query(&q).iter().map(|e| e.id).collect();
        let mut want: Vec<EntityId> = all
            .iter()
            .filter(|e| e.aabb().intersects_xy(&q))
            .map(|e| e.id)
            .collect();
        got.sort_by_key(|id| id.0);
        want.sort_by_key(|id| id.0);
        assert_eq!(got, want);
    }

    #[test]
    fn test_remove() {
        let mut t = tree();
        let id = EntityId::new();
        t.insert(SpatialEntity::point(id, 40.0, 40.0));
        t.insert(SpatialEntity::point(EntityId::new(), 60.0, 60.0));

        assert!(t.remove(id));
        assert!(!t.remove(id));
        assert_eq!(t.len(), 1);
        assert!(t.query_radius(Vec3::planar(40.0, 40.0), 5.0).is_empty());
    }

    #[test]
    fn test_invalid_entity_rejected() {
        let mut t = tree();
        let e = SpatialEntity::point(EntityId::new(), f32::NAN, 10.0);
        assert!(!t.insert(e));
        assert_eq!(t.len(), 0);
    }

    #[test]
    fn test_clear_releases_nodes() {
        let mut t = tree();
        for i in 0..30 {
            t.insert(SpatialEntity::point(EntityId::new(), (i * 3) as f32, (i * 2) as f32));
        }
        t.clear();

        let stats = t.stats();
        assert_eq!(stats.object_count, 0);
        assert_eq!(stats.node_count, 1);
        assert!(t.is_empty());
    }
}
