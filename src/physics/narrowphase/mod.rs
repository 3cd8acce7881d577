//! Narrowphase collision detection: exact contacts for a candidate pair.
//!
//! Dispatch is by shape class. Each collider is written for one argument order; when a
//! pair arrives the other way round the arguments are swapped and the normals negated, so
//! every stored contact keeps the `g2 -> g1` normal convention. Cuboids use their hull
//! for every convex collider.

mod convex;

use glam::Vec3;
use tracing::trace;

use super::collider::{Plane, Pose, Ray, Shape, Sphere};
use super::contact::{CollideFlags, ContactGeom, ContactSink};
use super::convex::ConvexHull;
use super::geom::{Geom, GeomId};

use self::convex::{convex_convex, convex_plane, ray_convex, sphere_convex};

/// Collide two geoms, appending at most `flags.max_contacts` contacts to `out`.
///
/// Returns the number of contacts appended. Space geoms and unsupported shape pairs
/// produce none.
pub(crate) fn collide(
    g1: &Geom,
    id1: GeomId,
    g2: &Geom,
    id2: GeomId,
    flags: CollideFlags,
    out: &mut Vec<ContactGeom>,
) -> usize {
    if flags.max_contacts == 0 || id1 == id2 {
        return 0;
    }
    let (Some(s1), Some(s2)) = (g1.shape(), g2.shape()) else {
        return 0;
    };

    let mut sink = ContactSink::new(out, flags.max_contacts, id1, id2);
    if !collide_ordered(s1, g1.pose(), s2, g2.pose(), flags, &mut sink) {
        sink.flip();
        if !collide_ordered(s2, g2.pose(), s1, g1.pose(), flags, &mut sink) {
            trace!(a = ?s1.class(), b = ?s2.class(), "no collider for shape pair");
        }
    }
    sink.len()
}

/// Run the collider for `(a, b)` in this order. Returns `false` if none exists.
fn collide_ordered(
    a: &Shape,
    pa: &Pose,
    b: &Shape,
    pb: &Pose,
    flags: CollideFlags,
    sink: &mut ContactSink,
) -> bool {
    match (a, b) {
        (Shape::Sphere(s1), Shape::Sphere(s2)) => sphere_sphere(s1, pa, s2, pb, sink),
        (Shape::Sphere(sphere), Shape::Plane(plane)) => sphere_plane(sphere, pa, plane, sink),
        (Shape::Ray(ray), Shape::Sphere(sphere)) => ray_sphere(ray, pa, sphere, pb, sink),
        (Shape::Ray(ray), Shape::Plane(plane)) => ray_plane(ray, pa, plane, sink),
        (Shape::Sphere(sphere), other) => {
            let Some(hull) = as_hull(other) else {
                return false;
            };
            sphere_convex(sphere, pa, hull, pb, sink);
        }
        (Shape::Ray(ray), other) => {
            let Some(hull) = as_hull(other) else {
                return false;
            };
            ray_convex(ray, pa, hull, pb, flags, sink);
        }
        (other, Shape::Plane(plane)) => {
            let Some(hull) = as_hull(other) else {
                return false;
            };
            convex_plane(hull, pa, plane, sink);
        }
        (x, y) => {
            let (Some(h1), Some(h2)) = (as_hull(x), as_hull(y)) else {
                return false;
            };
            convex_convex(h1, pa, h2, pb, sink);
        }
    }
    true
}

fn as_hull(shape: &Shape) -> Option<&ConvexHull> {
    match shape {
        Shape::Convex(hull) => Some(hull),
        Shape::Cuboid(cuboid) => Some(cuboid.hull()),
        _ => None,
    }
}

/// Sphere-sphere test. The contact sits midway through the overlap.
fn sphere_sphere(a: &Sphere, pa: &Pose, b: &Sphere, pb: &Pose, sink: &mut ContactSink) {
    let diff = pa.position - pb.position;
    let dist_sq = diff.length_squared();
    let min_dist = a.radius + b.radius;

    if dist_sq > min_dist * min_dist {
        return;
    }

    let dist = dist_sq.sqrt();
    let normal = if dist > 1e-6 { diff / dist } else { Vec3::X };

    let depth = min_dist - dist;
    let point = pa.position - normal * (a.radius - depth * 0.5);
    sink.push(point, normal, depth);
}

fn sphere_plane(sphere: &Sphere, pose: &Pose, plane: &Plane, sink: &mut ContactSink) {
    let depth = sphere.radius - plane.signed_distance(pose.position);
    if depth >= 0.0 {
        let point = pose.position - plane.normal * sphere.radius;
        sink.push(point, plane.normal, depth);
    }
}

/// First intersection of the ray with the sphere surface. A ray starting inside hits the
/// far side, with the normal pointing inward.
fn ray_sphere(ray: &Ray, pr: &Pose, sphere: &Sphere, ps: &Pose, sink: &mut ContactSink) {
    let origin = pr.position;
    let dir = pr.z_axis();
    let q = origin - ps.position;
    let b = q.dot(dir);
    let c = q.length_squared() - sphere.radius * sphere.radius;
    let k = b * b - c;
    if k < 0.0 {
        return;
    }
    let k = k.sqrt();

    let (mut alpha, mut sign) = (-b - k, 1.0f32);
    if alpha < 0.0 {
        alpha = -b + k;
        sign = -1.0;
    }
    if alpha < 0.0 || alpha > ray.length {
        return;
    }

    let point = origin + dir * alpha;
    let normal = (point - ps.position).normalize_or_zero() * sign;
    sink.push(point, normal, alpha);
}

fn ray_plane(ray: &Ray, pose: &Pose, plane: &Plane, sink: &mut ContactSink) {
    let origin = pose.position;
    let dir = pose.z_axis();
    let alpha = plane.offset - plane.normal.dot(origin);
    // Positive alpha means the ray starts on the solid side
    let sign: f32 = if alpha > 0.0 { -1.0 } else { 1.0 };
    let k = plane.normal.dot(dir);
    if k == 0.0 {
        return;
    }
    let t = alpha / k;
    if t < 0.0 || t > ray.length {
        return;
    }
    sink.push(origin + dir * t, plane.normal * sign, t);
}
