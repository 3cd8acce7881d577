//! Geometry objects: the per-collidable record the spaces index.

use super::collider::{Aabb, Pose, Shape, ShapeClass};
use super::slots::SlotKey;
use super::SpaceId;

/// Handle to a geom owned by a [`CollisionWorld`](super::CollisionWorld).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeomId(pub(crate) SlotKey);

/// Opaque reference to the rigid body a geom is attached to.
///
/// Geoms sharing the same body never collide with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub u32);

bitflags::bitflags! {
    /// State bits of a geom.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct GeomFlags: u8 {
        /// Disabled geoms are skipped by every collision pass.
        const ENABLED = 1 << 0;
        /// The geom sits in its space's dirty list.
        const DIRTY = 1 << 1;
        /// The stored AABB no longer matches the pose or shape.
        const AABB_BAD = 1 << 2;
    }
}

/// What a geom stands for: a collision shape, or a nested space.
#[derive(Debug)]
pub enum GeomKind {
    Shape(Shape),
    Space(SpaceId),
}

/// Which list of its owning space currently holds the geom, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSlot {
    Dirty(usize),
    Clean(usize),
}

/// One collidable object.
#[derive(Debug)]
pub struct Geom {
    pub(crate) kind: GeomKind,
    pub(crate) pose: Pose,
    pub(crate) aabb: Aabb,
    pub(crate) flags: GeomFlags,
    pub(crate) category_bits: u64,
    pub(crate) collide_bits: u64,
    pub(crate) body: Option<BodyId>,
    pub(crate) space: Option<SpaceId>,
    pub(crate) slot: Option<ListSlot>,
}

impl Geom {
    pub(crate) fn new(kind: GeomKind) -> Self {
        Self {
            kind,
            pose: Pose::IDENTITY,
            aabb: Aabb::EMPTY,
            flags: GeomFlags::ENABLED | GeomFlags::DIRTY | GeomFlags::AABB_BAD,
            category_bits: u64::MAX,
            collide_bits: u64::MAX,
            body: None,
            space: None,
            slot: None,
        }
    }

    /// What the geom stands for.
    pub fn kind(&self) -> &GeomKind {
        &self.kind
    }

    /// The collision shape, or `None` for a space geom.
    pub fn shape(&self) -> Option<&Shape> {
        match &self.kind {
            GeomKind::Shape(shape) => Some(shape),
            GeomKind::Space(_) => None,
        }
    }

    pub fn as_space(&self) -> Option<SpaceId> {
        match self.kind {
            GeomKind::Space(space) => Some(space),
            GeomKind::Shape(_) => None,
        }
    }

    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    /// Bounding box as of the last recompute.
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn flags(&self) -> GeomFlags {
        self.flags
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.contains(GeomFlags::ENABLED)
    }

    pub fn category_bits(&self) -> u64 {
        self.category_bits
    }

    pub fn collide_bits(&self) -> u64 {
        self.collide_bits
    }

    pub fn body(&self) -> Option<BodyId> {
        self.body
    }

    pub fn space(&self) -> Option<SpaceId> {
        self.space
    }

    pub(crate) fn recompute_shape_aabb(&mut self) {
        if let GeomKind::Shape(shape) = &self.kind {
            self.aabb = shape.compute_aabb(&self.pose);
        }
    }

    /// Shape-specific rejection of another object's AABB. Spaces never reject.
    pub(crate) fn aabb_test(&self, aabb: &Aabb) -> bool {
        match &self.kind {
            GeomKind::Shape(shape) => shape.aabb_test(&self.pose, aabb),
            GeomKind::Space(_) => true,
        }
    }
}

/// Filter applied to every candidate pair before the user callback sees it.
///
/// Rejects pairs on the same body, pairs whose category and collide bits do not meet, and
/// pairs where either shape can prove it misses the other's AABB.
pub(crate) fn pair_passes_filter(g1: &Geom, g2: &Geom) -> bool {
    if g1.body.is_some() && g1.body == g2.body {
        return false;
    }
    if (g1.category_bits & g2.collide_bits) == 0 && (g2.category_bits & g1.collide_bits) == 0 {
        return false;
    }
    g1.aabb_test(&g2.aabb) && g2.aabb_test(&g1.aabb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn sphere_at(x: f32) -> Geom {
        let mut geom = Geom::new(GeomKind::Shape(Shape::sphere(1.0)));
        geom.pose = Pose::from_translation(Vec3::new(x, 0.0, 0.0));
        geom.recompute_shape_aabb();
        geom
    }

    #[test]
    fn test_new_geom_is_enabled_and_dirty() {
        let geom = Geom::new(GeomKind::Shape(Shape::sphere(1.0)));
        assert!(geom.is_enabled());
        assert!(geom.flags().contains(GeomFlags::DIRTY | GeomFlags::AABB_BAD));
        assert!(geom.aabb().is_empty());
    }

    #[test]
    fn test_filter_same_body() {
        let mut a = sphere_at(0.0);
        let mut b = sphere_at(0.5);
        assert!(pair_passes_filter(&a, &b));
        a.body = Some(BodyId(7));
        b.body = Some(BodyId(7));
        assert!(!pair_passes_filter(&a, &b));
        b.body = Some(BodyId(8));
        assert!(pair_passes_filter(&a, &b));
    }

    #[test]
    fn test_filter_category_bits() {
        let mut a = sphere_at(0.0);
        let mut b = sphere_at(0.5);
        a.category_bits = 0b01;
        a.collide_bits = 0b01;
        b.category_bits = 0b10;
        b.collide_bits = 0b10;
        assert!(!pair_passes_filter(&a, &b));
        // One direction matching is enough
        b.collide_bits = 0b01;
        assert!(pair_passes_filter(&a, &b));
    }

    #[test]
    fn test_filter_shape_rejection() {
        let a = sphere_at(0.0);
        let mut b = Geom::new(GeomKind::Shape(Shape::cuboid(Vec3::splat(0.5))));
        b.pose = Pose::from_translation(Vec3::splat(1.2));
        b.recompute_shape_aabb();
        assert!(a.aabb().overlaps(b.aabb()));
        assert!(!pair_passes_filter(&a, &b));
    }
}
