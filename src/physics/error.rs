//! Error type shared by the collision world, spaces and shape constructors.

use thiserror::Error;

use super::geom::GeomId;
use super::SpaceId;

/// Contract violations reported by the collision core.
///
/// Numerical degeneracies never show up here: colliders recover from them locally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollisionError {
    #[error("geom {0:?} has been destroyed")]
    StaleGeom(GeomId),
    #[error("space {0:?} has been destroyed")]
    StaleSpace(SpaceId),
    #[error("geom {0:?} is already in a space")]
    GeomAlreadyInSpace(GeomId),
    #[error("geom {geom:?} is not in space {space:?}")]
    GeomNotInSpace { geom: GeomId, space: SpaceId },
    #[error("space {0:?} is locked by a collision pass in progress")]
    SpaceLocked(SpaceId),
    #[error("index {index} out of range for space with {count} geoms")]
    IndexOutOfRange { index: usize, count: usize },
    #[error("space {space:?} bookkeeping is corrupted: {reason}")]
    CorruptedSpace { space: SpaceId, reason: &'static str },
    #[error("geom {0:?} has no pose of its own")]
    NotPlaceable(GeomId),
    #[error("geom {0:?} stands for a space, not a shape")]
    NotAShape(GeomId),
    #[error("adding space {0:?} would make it its own ancestor")]
    SpaceCycle(SpaceId),
    #[error("polygon buffer malformed: {0}")]
    InvalidPolygonBuffer(&'static str),
    #[error("polygon references vertex {index} but hull has {count} vertices")]
    VertexIndexOutOfRange { index: u32, count: usize },
}

pub type CollisionResult<T> = Result<T, CollisionError>;
