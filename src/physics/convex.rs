//! Convex hull shape data: face planes, vertices, polygons and the derived edge set.

use glam::{Vec3, Vec4};

use super::error::{CollisionError, CollisionResult};

/// Convex polyhedron in local space.
///
/// `planes[i]` is face `i`: unit outward normal in `xyz`, offset in `w`, so a local point
/// `p` is inside the face's half-space when `normal · p <= w`. The polygon buffer holds one
/// polygon per plane in the same order, each written as a vertex count followed by that
/// many vertex indices.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexHull {
    planes: Vec<Vec4>,
    vertices: Vec<Vec3>,
    polygons: Vec<u32>,
    edges: Vec<(u32, u32)>,
}

impl ConvexHull {
    pub fn new(
        planes: Vec<Vec4>,
        vertices: Vec<Vec3>,
        polygons: Vec<u32>,
    ) -> CollisionResult<Self> {
        validate_polygons(&polygons, planes.len(), vertices.len())?;
        let edges = collect_edges(&polygons);
        Ok(Self {
            planes,
            vertices,
            polygons,
            edges,
        })
    }

    /// Box hull with the given half extents, centered on the origin.
    pub fn cuboid(half_extents: Vec3) -> Self {
        let h = half_extents;
        let vertices = vec![
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let planes = vec![
            Vec4::new(1.0, 0.0, 0.0, h.x),
            Vec4::new(-1.0, 0.0, 0.0, h.x),
            Vec4::new(0.0, 1.0, 0.0, h.y),
            Vec4::new(0.0, -1.0, 0.0, h.y),
            Vec4::new(0.0, 0.0, 1.0, h.z),
            Vec4::new(0.0, 0.0, -1.0, h.z),
        ];
        // Counter-clockwise seen from outside
        #[rustfmt::skip]
        let polygons = vec![
            4, 1, 2, 6, 5,
            4, 0, 4, 7, 3,
            4, 2, 3, 7, 6,
            4, 0, 1, 5, 4,
            4, 4, 5, 6, 7,
            4, 0, 3, 2, 1,
        ];
        let edges = collect_edges(&polygons);
        Self {
            planes,
            vertices,
            polygons,
            edges,
        }
    }

    #[inline]
    pub fn planes(&self) -> &[Vec4] {
        &self.planes
    }

    #[inline]
    pub fn vertices(&self) -> &[Vec3] {
        &self.vertices
    }

    /// Unique undirected edges as `(low, high)` vertex index pairs, sorted.
    #[inline]
    pub fn edges(&self) -> &[(u32, u32)] {
        &self.edges
    }

    /// Iterate the vertex index lists of each polygon, in plane order.
    pub fn polygons(&self) -> Polygons<'_> {
        Polygons {
            buffer: &self.polygons,
        }
    }

    /// Vertex indices of face `face`.
    pub fn polygon(&self, face: usize) -> Option<&[u32]> {
        self.polygons().nth(face)
    }

    /// Replace the whole hull description.
    pub fn set(
        &mut self,
        planes: Vec<Vec4>,
        vertices: Vec<Vec3>,
        polygons: Vec<u32>,
    ) -> CollisionResult<()> {
        *self = Self::new(planes, vertices, polygons)?;
        Ok(())
    }

    /// Reassign the polygon buffer; the edge set is rebuilt from it.
    pub fn set_polygons(&mut self, polygons: Vec<u32>) -> CollisionResult<()> {
        validate_polygons(&polygons, self.planes.len(), self.vertices.len())?;
        self.edges = collect_edges(&polygons);
        self.polygons = polygons;
        Ok(())
    }
}

/// Iterator over the polygons of a flattened polygon buffer.
#[derive(Debug, Clone)]
pub struct Polygons<'a> {
    buffer: &'a [u32],
}

impl<'a> Iterator for Polygons<'a> {
    type Item = &'a [u32];

    fn next(&mut self) -> Option<Self::Item> {
        let (&count, rest) = self.buffer.split_first()?;
        let count = (count as usize).min(rest.len());
        let (polygon, rest) = rest.split_at(count);
        self.buffer = rest;
        Some(polygon)
    }
}

fn validate_polygons(
    polygons: &[u32],
    plane_count: usize,
    vertex_count: usize,
) -> CollisionResult<()> {
    let mut rest = polygons;
    let mut faces = 0;
    while let Some((&count, tail)) = rest.split_first() {
        let count = count as usize;
        if count < 3 {
            return Err(CollisionError::InvalidPolygonBuffer(
                "polygon with fewer than 3 vertices",
            ));
        }
        if tail.len() < count {
            return Err(CollisionError::InvalidPolygonBuffer(
                "polygon runs past the end of the buffer",
            ));
        }
        let (indices, tail) = tail.split_at(count);
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(CollisionError::VertexIndexOutOfRange {
                index,
                count: vertex_count,
            });
        }
        faces += 1;
        rest = tail;
    }
    if faces != plane_count {
        return Err(CollisionError::InvalidPolygonBuffer(
            "polygon count differs from plane count",
        ));
    }
    Ok(())
}

fn collect_edges(polygons: &[u32]) -> Vec<(u32, u32)> {
    let mut edges = Vec::new();
    for polygon in (Polygons { buffer: polygons }) {
        let n = polygon.len();
        for j in 0..n {
            let a = polygon[j];
            let b = polygon[(j + 1) % n];
            edges.push((a.min(b), a.max(b)));
        }
    }
    edges.sort_unstable();
    edges.dedup();
    edges
}
