//! Sweep-and-prune broadphase.
//!
//! A [`SapSpace`] keeps its member geoms in two lists: `dirty` geoms whose bounds must be
//! recomputed before the next pass, and `clean` geoms whose bounds are current. Every geom
//! stores which list holds it and at what index, so membership changes are O(1)
//! swap-removes. Candidate pairs come from [`box_pruning`]: a single-axis sweep over
//! radix-sorted box minima, followed by an interval test on the two remaining axes.

use tracing::trace;

use super::collider::Aabb;
use super::error::{CollisionError, CollisionResult};
use super::geom::{Geom, GeomFlags, GeomId, ListSlot};
use super::radix_sort::RadixSort;
use super::slots::Slots;
use super::SpaceId;

/// Sweep axis followed by the two axes tested for interval overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AxisOrder {
    Xyz,
    #[default]
    Xzy,
    Yxz,
    Yzx,
    Zxy,
    Zyx,
}

impl AxisOrder {
    /// Axis indices in sweep order.
    pub fn axes(self) -> [usize; 3] {
        match self {
            AxisOrder::Xyz => [0, 1, 2],
            AxisOrder::Xzy => [0, 2, 1],
            AxisOrder::Yxz => [1, 0, 2],
            AxisOrder::Yzx => [1, 2, 0],
            AxisOrder::Zxy => [2, 0, 1],
            AxisOrder::Zyx => [2, 1, 0],
        }
    }
}

/// Configuration for a single sweep-and-prune space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SapConfig {
    /// Axis order used by box pruning. Default: [`AxisOrder::Xzy`].
    pub axis_order: AxisOrder,
}

/// Per-pass working buffers. They only grow.
#[derive(Debug, Default)]
pub(crate) struct PassScratch {
    pub(crate) finite: Vec<GeomId>,
    pub(crate) infinite: Vec<GeomId>,
    pub(crate) boxes: Vec<Aabb>,
    pub(crate) positions: Vec<f32>,
    pub(crate) overlaps: Vec<(u32, u32)>,
    pub(crate) pairs: Vec<(GeomId, GeomId)>,
}

impl PassScratch {
    pub(crate) fn clear(&mut self) {
        self.finite.clear();
        self.infinite.clear();
        self.boxes.clear();
        self.positions.clear();
        self.overlaps.clear();
        self.pairs.clear();
    }
}

/// A sweep-and-prune space. Owned by a [`CollisionWorld`](super::CollisionWorld), which
/// exposes the operations on it.
#[derive(Debug)]
pub struct SapSpace {
    id: SpaceId,
    geom: GeomId,
    dirty: Vec<GeomId>,
    clean: Vec<GeomId>,
    count: usize,
    lock_count: u32,
    cleanup: bool,
    config: SapConfig,
    pub(crate) scratch: PassScratch,
}

impl SapSpace {
    pub(crate) fn new(id: SpaceId, geom: GeomId, config: SapConfig) -> Self {
        Self {
            id,
            geom,
            dirty: Vec::new(),
            clean: Vec::new(),
            count: 0,
            lock_count: 0,
            cleanup: true,
            config,
            scratch: PassScratch::default(),
        }
    }

    /// Handle of this space.
    pub fn id(&self) -> SpaceId {
        self.id
    }

    /// The geom standing for this space inside its parent.
    pub fn geom(&self) -> GeomId {
        self.geom
    }

    /// Number of member geoms.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Members whose bounds must be recomputed before the next pass.
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Members with up-to-date bounds.
    pub fn clean_len(&self) -> usize {
        self.clean.len()
    }

    /// Whether a pass over this space is running.
    pub fn is_locked(&self) -> bool {
        self.lock_count > 0
    }

    /// Whether destroying the space also destroys its members.
    pub fn cleanup(&self) -> bool {
        self.cleanup
    }

    pub(crate) fn set_cleanup(&mut self, cleanup: bool) {
        self.cleanup = cleanup;
    }

    /// Get the sweep configuration.
    pub fn config(&self) -> &SapConfig {
        &self.config
    }

    /// Member at `index`, counting dirty geoms first.
    pub fn entry(&self, index: usize) -> Option<GeomId> {
        if index < self.dirty.len() {
            self.dirty.get(index).copied()
        } else {
            self.clean.get(index - self.dirty.len()).copied()
        }
    }

    /// All members, dirty first.
    pub fn members(&self) -> impl Iterator<Item = GeomId> + '_ {
        self.dirty.iter().chain(self.clean.iter()).copied()
    }

    pub(crate) fn clean_members(&self) -> &[GeomId] {
        &self.clean
    }

    pub(crate) fn lock(&mut self) {
        self.lock_count += 1;
    }

    pub(crate) fn unlock(&mut self) {
        self.lock_count = self.lock_count.saturating_sub(1);
    }

    fn corrupted(&self, reason: &'static str) -> CollisionError {
        CollisionError::CorruptedSpace {
            space: self.id,
            reason,
        }
    }

    /// Register a new member in the dirty list.
    pub(crate) fn insert(&mut self, id: GeomId, geoms: &mut Slots<Geom>) -> CollisionResult<()> {
        let geom = geoms.get_mut(id.0).ok_or(CollisionError::StaleGeom(id))?;
        geom.slot = Some(ListSlot::Dirty(self.dirty.len()));
        geom.space = Some(self.id);
        geom.flags.insert(GeomFlags::DIRTY | GeomFlags::AABB_BAD);
        self.dirty.push(id);
        self.count += 1;
        Ok(())
    }

    /// Unregister a member, whichever list holds it.
    pub(crate) fn remove(&mut self, id: GeomId, geoms: &mut Slots<Geom>) -> CollisionResult<()> {
        let slot = geoms
            .get(id.0)
            .ok_or(CollisionError::StaleGeom(id))?
            .slot
            .ok_or_else(|| self.corrupted("member without a list slot"))?;
        self.detach(id, slot, geoms)?;
        self.count -= 1;
        if let Some(geom) = geoms.get_mut(id.0) {
            geom.slot = None;
            geom.space = None;
            geom.flags.insert(GeomFlags::DIRTY | GeomFlags::AABB_BAD);
        }
        Ok(())
    }

    /// Move a member to the dirty list. No-op when it is already there.
    pub(crate) fn mark_dirty(
        &mut self,
        id: GeomId,
        geoms: &mut Slots<Geom>,
    ) -> CollisionResult<()> {
        let slot = geoms
            .get(id.0)
            .ok_or(CollisionError::StaleGeom(id))?
            .slot
            .ok_or_else(|| self.corrupted("member without a list slot"))?;
        if let ListSlot::Clean(_) = slot {
            self.detach(id, slot, geoms)?;
            if let Some(geom) = geoms.get_mut(id.0) {
                geom.slot = Some(ListSlot::Dirty(self.dirty.len()));
            }
            self.dirty.push(id);
        }
        Ok(())
    }

    /// Take the dirty list out for a clean pass; hand it back with [`SapSpace::settle`].
    pub(crate) fn take_dirty(&mut self) -> Vec<GeomId> {
        std::mem::take(&mut self.dirty)
    }

    /// Put back a dirty list taken by [`SapSpace::take_dirty`] without cleaning it.
    pub(crate) fn restore_dirty(&mut self, dirty: Vec<GeomId>) {
        self.dirty = dirty;
    }

    /// Append every geom of `dirty` to the clean list, clearing its dirty bits.
    pub(crate) fn settle(&mut self, mut dirty: Vec<GeomId>, geoms: &mut Slots<Geom>) {
        for id in dirty.drain(..) {
            if let Some(geom) = geoms.get_mut(id.0) {
                geom.flags.remove(GeomFlags::DIRTY | GeomFlags::AABB_BAD);
                geom.slot = Some(ListSlot::Clean(self.clean.len()));
                self.clean.push(id);
            }
        }
        // Anything dirtied while the list was out stays dirty
        dirty.append(&mut self.dirty);
        self.dirty = dirty;
    }

    fn detach(
        &mut self,
        id: GeomId,
        slot: ListSlot,
        geoms: &mut Slots<Geom>,
    ) -> CollisionResult<()> {
        let (list, index) = match slot {
            ListSlot::Dirty(i) => (&mut self.dirty, i),
            ListSlot::Clean(i) => (&mut self.clean, i),
        };
        if list.get(index) != Some(&id) {
            return Err(CollisionError::CorruptedSpace {
                space: self.id,
                reason: "list slot does not point back at the geom",
            });
        }
        list.swap_remove(index);
        if let Some(&moved) = list.get(index) {
            if let Some(geom) = geoms.get_mut(moved.0) {
                geom.slot = Some(match slot {
                    ListSlot::Dirty(_) => ListSlot::Dirty(index),
                    ListSlot::Clean(_) => ListSlot::Clean(index),
                });
            }
        }
        Ok(())
    }
}

/// Report every pair of `boxes` that overlaps on all three axes, as index pairs.
///
/// Sorts box minima on the sweep axis and walks forward from each box while the next
/// minimum is still within its maximum, testing the two remaining axes with closed
/// intervals. `positions` and `overlaps` are caller scratch; `overlaps` is cleared first.
/// Boxes must be bounded on the sweep axis.
pub fn box_pruning(
    sorter: &mut RadixSort,
    positions: &mut Vec<f32>,
    boxes: &[Aabb],
    axis_order: AxisOrder,
    overlaps: &mut Vec<(u32, u32)>,
) {
    overlaps.clear();
    let n = boxes.len();
    if n == 0 {
        return;
    }
    let [axis0, axis1, axis2] = axis_order.axes();

    positions.clear();
    positions.extend(boxes.iter().map(|b| b.min_on(axis0)));
    // Sentinel, larger than every real minimum
    positions.push(f32::INFINITY);

    let sorted = sorter.sort(positions);

    for (k, &i) in sorted.iter().enumerate() {
        let i = i as usize;
        if i == n {
            break;
        }
        let a = &boxes[i];
        let max0 = a.max_on(axis0);
        for &j in &sorted[k + 1..] {
            let j = j as usize;
            if j == n || positions[j] > max0 {
                break;
            }
            let b = &boxes[j];
            if a.min_on(axis1) <= b.max_on(axis1)
                && b.min_on(axis1) <= a.max_on(axis1)
                && a.min_on(axis2) <= b.max_on(axis2)
                && b.min_on(axis2) <= a.max_on(axis2)
            {
                overlaps.push((i as u32, j as u32));
            }
        }
    }
    trace!(boxes = n, overlaps = overlaps.len(), "box pruning");
}
