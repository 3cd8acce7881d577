//! Rein collision core
//!
//! Broadphase and narrowphase collision detection for rigid body simulation.
//!
//! # Architecture
//!
//! The library is organized into layers:
//!
//! 1. **physics::collider / convex** - Shapes, poses and bounding boxes
//! 2. **physics::geom** - Collidable objects with filter bits and dirty state
//! 3. **physics::radix_sort** - Coherent float radix sort used by box pruning
//! 4. **physics::broadphase** - Sweep-and-prune spaces
//! 5. **physics** (narrowphase) - Contact generation for a candidate pair
//!
//! Everything is owned by a [`CollisionWorld`]:
//!
//! ```
//! use rein_collide::{CollideFlags, CollisionWorld, Shape};
//! use rein_collide::glam::Vec3;
//!
//! let mut world = CollisionWorld::default();
//! let space = world.create_space(None).unwrap();
//! let ground = world.create_geom(Shape::plane(Vec3::Z, 0.0), Some(space)).unwrap();
//! let ball = world.create_geom(Shape::sphere(0.5), Some(space)).unwrap();
//! world.set_position(ball, Vec3::new(0.0, 0.0, 0.4)).unwrap();
//!
//! let mut contacts = Vec::new();
//! world
//!     .collide(space, |w, a, b| {
//!         w.collide_geoms(a, b, CollideFlags::default(), &mut contacts).unwrap();
//!     })
//!     .unwrap();
//! assert_eq!(contacts.len(), 1);
//! # let _ = ground;
//! ```

pub mod physics;

// Re-export commonly used types
pub use physics::{
    box_pruning, Aabb, AxisOrder, BodyId, Capsule, CollideFlags, CollisionConfig,
    CollisionError, CollisionResult, CollisionWorld, ContactGeom, ConvexHull, Cuboid, Geom,
    GeomFlags, GeomId, GeomKind, Plane, Pose, RadixSort, Ray, SapConfig, SapSpace, Shape,
    ShapeClass, ShapeClassId, SortScratch, SpaceId, Sphere,
};

// Re-export glam for convenience
pub use glam;
