//! Collider shapes, poses and bounding boxes.
//!
//! Every shape class implements [`ShapeClass`]: it knows how to bound itself for the
//! broadphase and may reject another object's AABB cheaply before narrowphase runs.

use std::fmt;

use glam::{Mat3, Quat, Vec3};

use super::convex::ConvexHull;

/// Position plus rotation matrix of a placeable geom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Mat3,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Mat3::IDENTITY,
    };

    pub fn from_translation(position: Vec3) -> Self {
        Self {
            position,
            rotation: Mat3::IDENTITY,
        }
    }

    pub fn from_rotation_translation(rotation: Quat, position: Vec3) -> Self {
        Self {
            position,
            rotation: Mat3::from_quat(rotation),
        }
    }

    #[inline]
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.rotation * local + self.position
    }

    #[inline]
    pub fn transform_vector(&self, local: Vec3) -> Vec3 {
        self.rotation * local
    }

    /// Third column of the rotation; rays point along it.
    #[inline]
    pub fn z_axis(&self) -> Vec3 {
        self.rotation.z_axis
    }
}

/// Axis-aligned bounding box for broadphase collision detection.
///
/// Unbounded directions use `f32::INFINITY`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub const INFINITE: Self = Self {
        min: Vec3::NEG_INFINITY,
        max: Vec3::INFINITY,
    };

    /// Inverted box that overlaps nothing and is the identity for [`Aabb::union`].
    pub const EMPTY: Self = Self {
        min: Vec3::INFINITY,
        max: Vec3::NEG_INFINITY,
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Test whether two AABBs overlap. Intervals are closed, so touching boxes overlap.
    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    #[inline]
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    #[inline]
    pub fn min_on(&self, axis: usize) -> f32 {
        self.min[axis]
    }

    #[inline]
    pub fn max_on(&self, axis: usize) -> f32 {
        self.max[axis]
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    fn from_points(points: impl IntoIterator<Item = Vec3>) -> Aabb {
        points.into_iter().fold(Aabb::EMPTY, |aabb, p| Aabb {
            min: aabb.min.min(p),
            max: aabb.max.max(p),
        })
    }
}

/// Behaviour every shape class exposes to the broadphase.
///
/// Custom shape classes implement this and are stored as [`Shape::Custom`]. Their
/// destructor hook is `Drop`, run when the owning geom is destroyed.
pub trait ShapeClass: fmt::Debug {
    /// Bound the shape at `pose` in world space.
    fn compute_aabb(&self, pose: &Pose) -> Aabb;

    /// Return `false` when the shape can prove it does not touch `aabb`.
    fn aabb_test(&self, _pose: &Pose, _aabb: &Aabb) -> bool {
        true
    }
}

/// Tag of a shape class, used for narrowphase dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeClassId {
    Sphere,
    Cuboid,
    Capsule,
    Plane,
    Ray,
    Convex,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub radius: f32,
}

/// Box centered on the pose. The matching hull is built once, on construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Cuboid {
    half_extents: Vec3,
    hull: ConvexHull,
}

impl Cuboid {
    pub fn new(half_extents: Vec3) -> Self {
        Self {
            half_extents,
            hull: ConvexHull::cuboid(half_extents),
        }
    }

    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        self.half_extents
    }

    /// Hull the convex colliders run against.
    #[inline]
    pub fn hull(&self) -> &ConvexHull {
        &self.hull
    }
}

/// Capsule along the local Z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    pub radius: f32,
    pub half_height: f32,
}

/// World-space plane `normal · x = offset`. The side `normal · x <= offset` is solid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub offset: f32,
}

impl Plane {
    /// Build a plane, normalizing `normal` and scaling `offset` to match.
    pub fn new(normal: Vec3, offset: f32) -> Self {
        let len = normal.length();
        if len > 0.0 {
            Self {
                normal: normal / len,
                offset: offset / len,
            }
        } else {
            Self {
                normal: Vec3::Z,
                offset,
            }
        }
    }

    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.offset
    }
}

/// Ray starting at the pose position and pointing along the pose Z axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub length: f32,
}

impl ShapeClass for Sphere {
    fn compute_aabb(&self, pose: &Pose) -> Aabb {
        Aabb::from_center_half_extents(pose.position, Vec3::splat(self.radius))
    }

    fn aabb_test(&self, pose: &Pose, aabb: &Aabb) -> bool {
        let closest = pose.position.clamp(aabb.min, aabb.max);
        closest.distance_squared(pose.position) <= self.radius * self.radius
    }
}

impl ShapeClass for Cuboid {
    fn compute_aabb(&self, pose: &Pose) -> Aabb {
        aabb_from_extents(self.half_extents, pose)
    }
}

impl ShapeClass for Capsule {
    fn compute_aabb(&self, pose: &Pose) -> Aabb {
        let axis = pose.z_axis() * self.half_height;
        let radius = Vec3::splat(self.radius);
        let a = pose.position + axis;
        let b = pose.position - axis;
        Aabb {
            min: a.min(b) - radius,
            max: a.max(b) + radius,
        }
    }
}

impl ShapeClass for Plane {
    /// Unbounded, except that an axis-aligned normal bounds the solid side of its axis.
    fn compute_aabb(&self, _pose: &Pose) -> Aabb {
        let mut aabb = Aabb::INFINITE;
        let n = self.normal;
        for axis in 0..3 {
            let (o1, o2) = ((axis + 1) % 3, (axis + 2) % 3);
            if n[o1] == 0.0 && n[o2] == 0.0 && n[axis] != 0.0 {
                if n[axis] > 0.0 {
                    aabb.max[axis] = self.offset;
                } else {
                    aabb.min[axis] = -self.offset;
                }
            }
        }
        aabb
    }

    fn aabb_test(&self, _pose: &Pose, aabb: &Aabb) -> bool {
        if !aabb.min.is_finite() || !aabb.max.is_finite() {
            return true;
        }
        let center = aabb.center();
        let reach = aabb.half_extents().dot(self.normal.abs());
        self.signed_distance(center) <= reach
    }
}

impl ShapeClass for Ray {
    fn compute_aabb(&self, pose: &Pose) -> Aabb {
        let start = pose.position;
        let end = start + pose.z_axis() * self.length;
        Aabb {
            min: start.min(end),
            max: start.max(end),
        }
    }
}

impl ShapeClass for ConvexHull {
    fn compute_aabb(&self, pose: &Pose) -> Aabb {
        if self.vertices().is_empty() {
            return Aabb::new(pose.position, pose.position);
        }
        Aabb::from_points(self.vertices().iter().map(|v| pose.transform_point(*v)))
    }
}

/// Collider shape of a geom.
#[derive(Debug)]
pub enum Shape {
    Sphere(Sphere),
    Cuboid(Cuboid),
    Capsule(Capsule),
    Plane(Plane),
    Ray(Ray),
    Convex(ConvexHull),
    Custom(Box<dyn ShapeClass>),
}

impl Shape {
    pub fn sphere(radius: f32) -> Self {
        Shape::Sphere(Sphere { radius })
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Shape::Cuboid(Cuboid::new(half_extents))
    }

    pub fn capsule(radius: f32, half_height: f32) -> Self {
        Shape::Capsule(Capsule {
            radius,
            half_height,
        })
    }

    pub fn plane(normal: Vec3, offset: f32) -> Self {
        Shape::Plane(Plane::new(normal, offset))
    }

    pub fn ray(length: f32) -> Self {
        Shape::Ray(Ray { length })
    }

    pub fn class(&self) -> ShapeClassId {
        match self {
            Shape::Sphere(_) => ShapeClassId::Sphere,
            Shape::Cuboid(_) => ShapeClassId::Cuboid,
            Shape::Capsule(_) => ShapeClassId::Capsule,
            Shape::Plane(_) => ShapeClassId::Plane,
            Shape::Ray(_) => ShapeClassId::Ray,
            Shape::Convex(_) => ShapeClassId::Convex,
            Shape::Custom(_) => ShapeClassId::Custom,
        }
    }

    /// Planes live in world space and ignore the geom pose.
    pub fn is_placeable(&self) -> bool {
        !matches!(self, Shape::Plane(_))
    }

    fn as_class(&self) -> &dyn ShapeClass {
        match self {
            Shape::Sphere(s) => s,
            Shape::Cuboid(s) => s,
            Shape::Capsule(s) => s,
            Shape::Plane(s) => s,
            Shape::Ray(s) => s,
            Shape::Convex(s) => s,
            Shape::Custom(s) => s.as_ref(),
        }
    }
}

impl ShapeClass for Shape {
    #[inline]
    fn compute_aabb(&self, pose: &Pose) -> Aabb {
        self.as_class().compute_aabb(pose)
    }

    #[inline]
    fn aabb_test(&self, pose: &Pose, aabb: &Aabb) -> bool {
        self.as_class().aabb_test(pose, aabb)
    }
}

/// Compute world-space AABB from local half-extents and a pose.
#[inline]
fn aabb_from_extents(half_extents: Vec3, pose: &Pose) -> Aabb {
    let r = pose.rotation;
    // For each world axis, project the local box axes
    let extent = r.x_axis.abs() * half_extents.x
        + r.y_axis.abs() * half_extents.y
        + r.z_axis.abs() * half_extents.z;
    Aabb::from_center_half_extents(pose.position, extent)
}
