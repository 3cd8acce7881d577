//! Contact data structures produced by the narrowphase.

use glam::Vec3;

use super::geom::GeomId;

/// A single contact point between two geoms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactGeom {
    /// Contact position in world space.
    pub position: Vec3,
    /// Unit normal pointing from `g2` toward `g1`.
    pub normal: Vec3,
    /// Penetration depth along `normal`.
    pub depth: f32,
    pub g1: GeomId,
    pub g2: GeomId,
}

/// Caller limits for one narrowphase query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollideFlags {
    /// Upper bound on contacts produced. Zero produces none.
    pub max_contacts: usize,
    /// Any single contact is enough; colliders may stop at the first one found.
    pub contacts_unimportant: bool,
}

impl Default for CollideFlags {
    fn default() -> Self {
        Self {
            max_contacts: 4,
            contacts_unimportant: false,
        }
    }
}

impl CollideFlags {
    pub fn with_max_contacts(max_contacts: usize) -> Self {
        Self {
            max_contacts,
            ..Default::default()
        }
    }

    pub fn unimportant(mut self) -> Self {
        self.contacts_unimportant = true;
        self
    }
}

/// Bounded sink that colliders write into.
///
/// Wraps the caller's vector and stops accepting contacts once the limit is reached.
pub(crate) struct ContactSink<'a> {
    out: &'a mut Vec<ContactGeom>,
    start: usize,
    max: usize,
    g1: GeomId,
    g2: GeomId,
    flip: bool,
}

impl<'a> ContactSink<'a> {
    pub(crate) fn new(out: &'a mut Vec<ContactGeom>, max: usize, g1: GeomId, g2: GeomId) -> Self {
        let start = out.len();
        Self {
            out,
            start,
            max,
            g1,
            g2,
            flip: false,
        }
    }

    /// Collider arguments arrive in the opposite order of `g1`/`g2`; normals are negated on
    /// the way in so the stored convention stays `g2 -> g1`.
    pub(crate) fn flip(&mut self) {
        self.flip = !self.flip;
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.out.len() - self.start
    }

    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.len() >= self.max
    }

    /// Push a contact; returns `false` if the sink was already full.
    pub(crate) fn push(&mut self, position: Vec3, normal: Vec3, depth: f32) -> bool {
        if self.is_full() {
            return false;
        }
        let normal = if self.flip { -normal } else { normal };
        self.out.push(ContactGeom {
            position,
            normal,
            depth,
            g1: self.g1,
            g2: self.g2,
        });
        true
    }

    /// Drop everything pushed through this sink.
    pub(crate) fn discard(&mut self) {
        self.out.truncate(self.start);
    }
}
