//! Convex hull colliders: hull-plane, sphere-hull, hull-hull (separating axes) and
//! ray-hull.

use glam::{Vec3, Vec4};

use crate::physics::collider::{Plane, Pose, Ray, Sphere};
use crate::physics::contact::{CollideFlags, ContactSink};
use crate::physics::convex::ConvexHull;

/// Edge pairs whose cross product is shorter than this, relative to the edge lengths, are
/// treated as parallel and give no axis.
const PARALLEL_EDGE_EPSILON: f32 = 1e-10;

/// Slack when checking that a ray hit lies behind every other face.
const SURFACE_EPSILON: f32 = 1e-5;

/// Hull geometry moved into world space.
struct WorldHull {
    vertices: Vec<Vec3>,
    planes: Vec<Vec4>,
}

impl WorldHull {
    fn new(hull: &ConvexHull, pose: &Pose) -> Self {
        Self {
            vertices: world_vertices(hull, pose),
            planes: hull.planes().iter().map(|p| world_plane(*p, pose)).collect(),
        }
    }
}

fn world_vertices(hull: &ConvexHull, pose: &Pose) -> Vec<Vec3> {
    hull.vertices()
        .iter()
        .map(|v| pose.transform_point(*v))
        .collect()
}

fn world_plane(plane: Vec4, pose: &Pose) -> Vec4 {
    let normal = pose.transform_vector(plane.truncate()).normalize_or_zero();
    normal.extend(plane.w + normal.dot(pose.position))
}

/// Projection interval of `vertices` on `axis`, measured from the axis plane.
fn interval(vertices: &[Vec3], axis: Vec4) -> (f32, f32) {
    let n = axis.truncate();
    vertices
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), v| {
            let d = n.dot(*v) - axis.w;
            (min.min(d), max.max(d))
        })
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PolygonRegion {
    Inside,
    /// Closest point on the polygon boundary.
    Outside(Vec3),
}

/// Locate `p` relative to a convex polygon, testing the vertex and edge Voronoi regions
/// of each fan triangle `(a, b, c)` in turn.
fn point_in_polygon(p: Vec3, polygon: &[u32], vertices: &[Vec3]) -> PolygonRegion {
    let n = polygon.len();
    for i in 0..n {
        let a = vertices[polygon[i] as usize];
        let b = vertices[polygon[(i + 1) % n] as usize];
        let c = vertices[polygon[(i + 2) % n] as usize];

        let ab = b - a;
        let ac = c - a;
        let ap = p - a;
        let d1 = ab.dot(ap);
        let d2 = ac.dot(ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return PolygonRegion::Outside(a);
        }

        let bp = p - b;
        let d3 = ab.dot(bp);
        let d4 = ac.dot(bp);
        if d3 >= 0.0 && d4 <= d3 {
            return PolygonRegion::Outside(b);
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let denom = d1 - d3;
            let v = if denom > 0.0 { d1 / denom } else { 0.0 };
            return PolygonRegion::Outside(a + ab * v);
        }
    }
    PolygonRegion::Inside
}

/// Hull against a half-space.
///
/// Every vertex at or below the surface becomes a contact. The hull must have vertices on
/// both sides of the plane (a vertex exactly on it counts as both); a hull entirely on
/// one side reports nothing.
pub(super) fn convex_plane(hull: &ConvexHull, pose: &Pose, plane: &Plane, sink: &mut ContactSink) {
    let mut below = false;
    let mut above = false;

    for v in hull.vertices() {
        let p = pose.transform_point(*v);
        let d = plane.signed_distance(p);
        if d <= 0.0 {
            below = true;
            above |= d == 0.0;
            sink.push(p, plane.normal, -d);
        } else {
            above = true;
        }
        if sink.is_full() && below && above {
            break;
        }
    }

    if !(below && above) {
        sink.discard();
    }
}

/// Sphere against a hull. Produces at most one contact.
pub(super) fn sphere_convex(
    sphere: &Sphere,
    sphere_pose: &Pose,
    hull: &ConvexHull,
    hull_pose: &Pose,
    sink: &mut ContactSink,
) {
    let center = sphere_pose.position;
    let radius = sphere.radius;
    let offset = center - hull_pose.position;
    let vertices = world_vertices(hull, hull_pose);

    let mut inside = true;
    let mut closest_dist = f32::INFINITY;
    let mut closest_normal = None;

    for (plane, polygon) in hull.planes().iter().zip(hull.polygons()) {
        let normal = hull_pose.transform_vector(plane.truncate());
        let dist = normal.dot(offset) - plane.w;

        if dist > 0.0 {
            if dist < radius {
                match point_in_polygon(center, polygon, &vertices) {
                    PolygonRegion::Inside => {
                        sink.push(center - normal * radius, normal, radius - dist);
                        return;
                    }
                    PolygonRegion::Outside(boundary) => {
                        // Edge or vertex contact
                        let delta = center - boundary;
                        let dist_sq = delta.length_squared();
                        if dist_sq < radius * radius && dist_sq > 0.0 {
                            let dist = dist_sq.sqrt();
                            let normal = delta / dist;
                            sink.push(center - normal * radius, normal, radius - dist);
                            return;
                        }
                    }
                }
            }
            inside = false;
        }

        if inside && dist.abs() < closest_dist {
            closest_dist = dist.abs();
            closest_normal = Some(normal);
        }
    }

    // Center inside every face: push out through the nearest one
    if inside {
        if let Some(normal) = closest_normal {
            sink.push(center, normal, closest_dist + radius);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Owner {
    First,
    Second,
}

/// Face picked for contact generation.
#[derive(Debug, Clone, Copy)]
struct ReferenceFace {
    owner: Owner,
    face: usize,
    normal: Vec3,
}

/// Test the face normals of `owner` as separating axes. Returns `false` on separation.
///
/// Faces the other hull straddles compete for the reference face by smallest depth.
fn face_axes_overlap(
    owner: &WorldHull,
    other: &WorldHull,
    side: Owner,
    min_depth: &mut f32,
    reference: &mut Option<ReferenceFace>,
) -> bool {
    for (face, plane) in owner.planes.iter().enumerate() {
        let (min1, max1) = interval(&owner.vertices, *plane);
        let (min2, max2) = interval(&other.vertices, *plane);
        if max2 < min1 || max1 < min2 {
            return false;
        }
        let depth = max1.min(max2) - min1.max(min2);
        if max2 * min2 < 0.0 && depth.abs() < min_depth.abs() {
            *min_depth = depth;
            *reference = Some(ReferenceFace {
                owner: side,
                face,
                normal: plane.truncate(),
            });
        }
    }
    true
}

/// Test the cross products of every edge pair as separating axes.
fn edge_axes_overlap(h1: &ConvexHull, a: &WorldHull, h2: &ConvexHull, b: &WorldHull) -> bool {
    for &(i0, i1) in h1.edges() {
        let e1 = a.vertices[i1 as usize] - a.vertices[i0 as usize];
        for &(j0, j1) in h2.edges() {
            let e2 = b.vertices[j1 as usize] - b.vertices[j0 as usize];
            let axis = e1.cross(e2);
            let scale = e1.length_squared() * e2.length_squared();
            if axis.length_squared() <= PARALLEL_EDGE_EPSILON * scale {
                continue;
            }
            let axis = axis.extend(0.0);
            let (min1, max1) = interval(&a.vertices, axis);
            let (min2, max2) = interval(&b.vertices, axis);
            if max2 < min1 || max1 < min2 {
                return false;
            }
        }
    }
    true
}

/// Hull against hull by the separating axis theorem.
///
/// Contacts are the vertices of the reference face, the penetrated face with the smallest
/// depth. The normal is that face's normal, oriented from the second hull to the first.
pub(super) fn convex_convex(
    h1: &ConvexHull,
    p1: &Pose,
    h2: &ConvexHull,
    p2: &Pose,
    sink: &mut ContactSink,
) {
    let a = WorldHull::new(h1, p1);
    let b = WorldHull::new(h2, p2);

    let mut min_depth = f32::INFINITY;
    let mut reference = None;
    if !face_axes_overlap(&a, &b, Owner::First, &mut min_depth, &mut reference)
        || !face_axes_overlap(&b, &a, Owner::Second, &mut min_depth, &mut reference)
        || !edge_axes_overlap(h1, &a, h2, &b)
    {
        return;
    }

    let Some(reference) = reference else {
        return;
    };
    let (hull, world, normal) = match reference.owner {
        Owner::First => (h1, &a, -reference.normal),
        Owner::Second => (h2, &b, reference.normal),
    };
    let Some(polygon) = hull.polygon(reference.face) else {
        return;
    };
    for &i in polygon {
        if !sink.push(world.vertices[i as usize], normal, min_depth) {
            break;
        }
    }
}

/// Ray against hull: the nearest surface crossing within the ray length.
///
/// A ray starting inside the hull reports where it leaves, with the normal pointing
/// inward.
pub(super) fn ray_convex(
    ray: &Ray,
    ray_pose: &Pose,
    hull: &ConvexHull,
    hull_pose: &Pose,
    flags: CollideFlags,
    sink: &mut ContactSink,
) {
    let origin = ray_pose.position;
    let dir = ray_pose.z_axis();
    let planes: Vec<Vec4> = hull
        .planes()
        .iter()
        .map(|p| world_plane(*p, hull_pose))
        .collect();

    let outside = planes
        .iter()
        .any(|p| p.truncate().dot(origin) - p.w >= 0.0);
    let sign = if outside { 1.0 } else { -1.0 };

    let mut best: Option<(Vec3, Vec3, f32)> = None;
    for (i, plane) in planes.iter().enumerate() {
        let normal = plane.truncate();
        // Distance to the plane and approach rate, both flipped when starting inside
        let alpha = sign * (normal.dot(origin) - plane.w);
        let beta = sign * normal.dot(dir);
        if beta >= -f32::EPSILON || alpha < 0.0 {
            continue;
        }

        let t = alpha / -beta;
        if t > ray.length || best.is_some_and(|(_, _, depth)| t >= depth) {
            continue;
        }

        let point = origin + dir * t;
        let on_surface = planes
            .iter()
            .enumerate()
            .all(|(j, q)| j == i || q.truncate().dot(point) - q.w <= SURFACE_EPSILON);
        if on_surface {
            best = Some((point, normal * sign, t));
            if flags.contacts_unimportant {
                break;
            }
        }
    }

    if let Some((point, normal, depth)) = best {
        sink.push(point, normal, depth);
    }
}
