//! Collision detection core: geometry registry, sweep-and-prune spaces and narrowphase
//! contact generation.
//!
//! # Architecture
//!
//! A [`CollisionWorld`] owns every geom and space. A collision pass over a space runs:
//!
//! 1. Clean dirty geoms (recompute AABBs, recursing into sub-spaces)
//! 2. Partition enabled geoms into finite and infinite sets on the sweep axis
//! 3. Box pruning over the finite set (radix sort + single-axis sweep)
//! 4. Pair filter (same body, category/collide bits, shape AABB test)
//! 5. User callback, which typically calls [`CollisionWorld::collide_geoms`]
//!
//! A space is locked while a pass over it runs. Structural changes to a locked space, or
//! to anything beneath a locked ancestor, fail with [`CollisionError::SpaceLocked`].

pub mod broadphase;
pub mod collider;
pub mod contact;
pub mod convex;
pub mod error;
pub mod geom;
mod narrowphase;
pub mod radix_sort;
pub(crate) mod slots;

use std::mem;

use glam::{Mat3, Quat, Vec3};
use tracing::{debug, trace, warn};

pub use self::broadphase::{box_pruning, AxisOrder, SapConfig, SapSpace};
pub use self::collider::{
    Aabb, Capsule, Cuboid, Plane, Pose, Ray, Shape, ShapeClass, ShapeClassId, Sphere,
};
pub use self::contact::{CollideFlags, ContactGeom};
pub use self::convex::ConvexHull;
pub use self::error::{CollisionError, CollisionResult};
pub use self::geom::{BodyId, Geom, GeomFlags, GeomId, GeomKind};
pub use self::radix_sort::{RadixSort, SortScratch};

use self::broadphase::PassScratch;
use self::geom::pair_passes_filter;
use self::slots::{SlotKey, Slots};

/// Handle to a space owned by a [`CollisionWorld`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(pub(crate) SlotKey);

/// Configuration for the collision world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollisionConfig {
    /// Axis order given to spaces created without their own [`SapConfig`].
    /// Default: [`AxisOrder::Xzy`].
    pub default_axis_order: AxisOrder,
}

/// Owner of all geoms, spaces and the shared sort scratch.
#[derive(Debug)]
pub struct CollisionWorld {
    config: CollisionConfig,
    geoms: Slots<Geom>,
    spaces: Slots<SapSpace>,
    sort: SortScratch,
}

impl Default for CollisionWorld {
    fn default() -> Self {
        Self::new(CollisionConfig::default())
    }
}

impl CollisionWorld {
    /// Create an empty collision world with the given configuration.
    pub fn new(config: CollisionConfig) -> Self {
        Self {
            config,
            geoms: Slots::new(),
            spaces: Slots::new(),
            sort: SortScratch::default(),
        }
    }

    /// Get the world configuration.
    pub fn config(&self) -> &CollisionConfig {
        &self.config
    }

    /// Look up a live geom.
    pub fn geom(&self, id: GeomId) -> CollisionResult<&Geom> {
        self.geoms.get(id.0).ok_or(CollisionError::StaleGeom(id))
    }

    /// Look up a live space.
    pub fn space(&self, id: SpaceId) -> CollisionResult<&SapSpace> {
        self.spaces.get(id.0).ok_or(CollisionError::StaleSpace(id))
    }

    fn geom_mut(&mut self, id: GeomId) -> CollisionResult<&mut Geom> {
        self.geoms.get_mut(id.0).ok_or(CollisionError::StaleGeom(id))
    }

    fn space_mut(&mut self, id: SpaceId) -> CollisionResult<&mut SapSpace> {
        self.spaces.get_mut(id.0).ok_or(CollisionError::StaleSpace(id))
    }

    /// Number of live geoms, space geoms included.
    pub fn geom_count(&self) -> usize {
        self.geoms.len()
    }

    /// The sort scratch shared by every space's passes.
    pub fn sort_scratch(&self) -> &SortScratch {
        &self.sort
    }

    // ---------------------------------------------------------------- spaces

    /// Create a space using the world's default axis order, optionally nested in `parent`.
    pub fn create_space(&mut self, parent: Option<SpaceId>) -> CollisionResult<SpaceId> {
        let config = SapConfig {
            axis_order: self.config.default_axis_order,
        };
        self.create_space_with_config(parent, config)
    }

    /// Create a space with an explicit sweep configuration.
    pub fn create_space_with_config(
        &mut self,
        parent: Option<SpaceId>,
        config: SapConfig,
    ) -> CollisionResult<SpaceId> {
        if let Some(parent) = parent {
            self.check_lock_chain(parent)?;
        }

        let geoms = &mut self.geoms;
        let key = self.spaces.insert_with_key(|key| {
            let space = SpaceId(key);
            let geom = GeomId(geoms.insert(Geom::new(GeomKind::Space(space))));
            SapSpace::new(space, geom, config)
        });
        let id = SpaceId(key);
        self.sort.acquire();
        debug!(space = ?id, axis_order = ?config.axis_order, "space created");

        if let Some(parent) = parent {
            let geom = self.space(id)?.geom();
            self.space_add(parent, geom)?;
        }
        Ok(id)
    }

    /// Destroy a space. Members are destroyed too when the space's cleanup mode is on,
    /// otherwise they are only removed and stay alive.
    pub fn destroy_space(&mut self, id: SpaceId) -> CollisionResult<()> {
        let space = self.space(id)?;
        if space.is_locked() {
            warn!(space = ?id, "cannot destroy a space during its own pass");
            return Err(CollisionError::SpaceLocked(id));
        }
        let own = space.geom();
        if let Some(parent) = self.geom(own)?.space() {
            self.space_remove(parent, own)?;
        }

        let space = self.space(id)?;
        let cleanup = space.cleanup();
        let members: Vec<GeomId> = space.members().collect();
        for member in members {
            if cleanup {
                self.destroy_geom(member)?;
            } else {
                self.space_remove(id, member)?;
            }
        }

        self.geoms.remove(own.0);
        self.spaces.remove(id.0);
        self.sort.release();
        debug!(space = ?id, cleanup, "space destroyed");
        Ok(())
    }

    /// Choose whether destroying the space also destroys its members.
    pub fn set_space_cleanup(&mut self, id: SpaceId, cleanup: bool) -> CollisionResult<()> {
        self.space_mut(id)?.set_cleanup(cleanup);
        Ok(())
    }

    /// Number of geoms directly in `space`.
    pub fn space_count(&self, space: SpaceId) -> CollisionResult<usize> {
        Ok(self.space(space)?.count())
    }

    /// Member `index` of `space`, dirty geoms first.
    pub fn space_geom(&self, space: SpaceId, index: usize) -> CollisionResult<GeomId> {
        let space = self.space(space)?;
        space.entry(index).ok_or(CollisionError::IndexOutOfRange {
            index,
            count: space.count(),
        })
    }

    /// Whether `geom` is a direct member of `space`.
    pub fn space_contains(&self, space: SpaceId, geom: GeomId) -> CollisionResult<bool> {
        self.space(space)?;
        Ok(self.geom(geom)?.space() == Some(space))
    }

    /// Insert `geom` into `space`. The space's own bounds become stale.
    pub fn space_add(&mut self, space: SpaceId, geom: GeomId) -> CollisionResult<()> {
        self.space(space)?;
        let g = self.geom(geom)?;
        if g.space().is_some() {
            return Err(CollisionError::GeomAlreadyInSpace(geom));
        }
        if let Some(sub) = g.as_space() {
            if self.is_within(space, sub)? {
                return Err(CollisionError::SpaceCycle(sub));
            }
        }
        self.check_lock_chain(space)?;

        let sap = self.spaces.get_mut(space.0).ok_or(CollisionError::StaleSpace(space))?;
        sap.insert(geom, &mut self.geoms)?;
        let own = sap.geom();
        trace!(space = ?space, geom = ?geom, "geom added to space");
        self.propagate_moved(own)
    }

    /// Take `geom` out of `space`. The geom stays alive.
    pub fn space_remove(&mut self, space: SpaceId, geom: GeomId) -> CollisionResult<()> {
        self.space(space)?;
        if self.geom(geom)?.space() != Some(space) {
            return Err(CollisionError::GeomNotInSpace { geom, space });
        }
        self.check_lock_chain(space)?;

        let sap = self.spaces.get_mut(space.0).ok_or(CollisionError::StaleSpace(space))?;
        sap.remove(geom, &mut self.geoms)?;
        let own = sap.geom();
        trace!(space = ?space, geom = ?geom, "geom removed from space");
        self.propagate_moved(own)
    }

    /// Move `geom` to the dirty list of `space` without touching the rest of the hierarchy.
    /// No-op when it is already dirty.
    pub fn space_dirty(&mut self, space: SpaceId, geom: GeomId) -> CollisionResult<()> {
        self.space(space)?;
        if self.geom(geom)?.space() != Some(space) {
            return Err(CollisionError::GeomNotInSpace { geom, space });
        }
        self.check_lock_chain(space)?;
        let sap = self.spaces.get_mut(space.0).ok_or(CollisionError::StaleSpace(space))?;
        sap.mark_dirty(geom, &mut self.geoms)?;
        self.geom_mut(geom)?
            .flags
            .insert(GeomFlags::DIRTY | GeomFlags::AABB_BAD);
        Ok(())
    }

    /// Whether `space` is `ancestor` or nested somewhere below it.
    fn is_within(&self, space: SpaceId, ancestor: SpaceId) -> CollisionResult<bool> {
        let mut current = Some(space);
        while let Some(id) = current {
            if id == ancestor {
                return Ok(true);
            }
            current = self.geom(self.space(id)?.geom())?.space();
        }
        Ok(false)
    }

    /// Fail if `space` or any space above it is running a pass.
    fn check_lock_chain(&self, space: SpaceId) -> CollisionResult<()> {
        let mut current = Some(space);
        while let Some(id) = current {
            let sap = self.space(id)?;
            if sap.is_locked() {
                warn!(space = ?id, "structural change rejected: space is locked");
                return Err(CollisionError::SpaceLocked(id));
            }
            current = self.geom(sap.geom())?.space();
        }
        Ok(())
    }

    // ----------------------------------------------------------------- geoms

    /// Create a geom for `shape`, optionally inserting it into `space`.
    pub fn create_geom(
        &mut self,
        shape: Shape,
        space: Option<SpaceId>,
    ) -> CollisionResult<GeomId> {
        if let Some(space) = space {
            self.check_lock_chain(space)?;
        }
        let class = shape.class();
        let id = GeomId(self.geoms.insert(Geom::new(GeomKind::Shape(shape))));
        debug!(geom = ?id, ?class, "geom created");
        if let Some(space) = space {
            self.space_add(space, id)?;
        }
        Ok(id)
    }

    /// Destroy a geom, removing it from its space first. Destroying a space geom destroys
    /// the space.
    pub fn destroy_geom(&mut self, id: GeomId) -> CollisionResult<()> {
        let geom = self.geom(id)?;
        if let Some(space) = geom.as_space() {
            return self.destroy_space(space);
        }
        if let Some(space) = geom.space() {
            self.space_remove(space, id)?;
        }
        self.geoms.remove(id.0);
        debug!(geom = ?id, "geom destroyed");
        Ok(())
    }

    /// Move a placeable geom. Its AABB and every enclosing space are marked stale.
    pub fn set_position(&mut self, id: GeomId, position: Vec3) -> CollisionResult<()> {
        self.check_placeable(id)?;
        self.geom_mut(id)?.pose.position = position;
        self.propagate_moved(id)
    }

    /// Rotate a placeable geom.
    pub fn set_rotation(&mut self, id: GeomId, rotation: Quat) -> CollisionResult<()> {
        self.check_placeable(id)?;
        self.geom_mut(id)?.pose.rotation = Mat3::from_quat(rotation);
        self.propagate_moved(id)
    }

    /// Set position and rotation at once.
    pub fn set_pose(&mut self, id: GeomId, pose: Pose) -> CollisionResult<()> {
        self.check_placeable(id)?;
        self.geom_mut(id)?.pose = pose;
        self.propagate_moved(id)
    }

    /// Replace the shape of a geom. Space geoms have no shape to replace.
    pub fn set_shape(&mut self, id: GeomId, shape: Shape) -> CollisionResult<()> {
        if self.geom(id)?.as_space().is_some() {
            return Err(CollisionError::NotAShape(id));
        }
        self.check_geom_unlocked(id)?;
        self.geom_mut(id)?.kind = GeomKind::Shape(shape);
        self.propagate_moved(id)
    }

    /// Flag `id` as moved: its AABB is stale and every enclosing space's bounds with it.
    pub fn mark_moved(&mut self, id: GeomId) -> CollisionResult<()> {
        self.check_geom_unlocked(id)?;
        self.propagate_moved(id)
    }

    /// Let the geom take part in collision passes again.
    pub fn enable(&mut self, id: GeomId) -> CollisionResult<()> {
        self.geom_mut(id)?.flags.insert(GeomFlags::ENABLED);
        Ok(())
    }

    /// Skip the geom in every pass. Its space membership is kept.
    pub fn disable(&mut self, id: GeomId) -> CollisionResult<()> {
        self.geom_mut(id)?.flags.remove(GeomFlags::ENABLED);
        Ok(())
    }

    /// Set the categories this geom belongs to.
    pub fn set_category_bits(&mut self, id: GeomId, bits: u64) -> CollisionResult<()> {
        self.check_parent_unlocked(id)?;
        self.geom_mut(id)?.category_bits = bits;
        Ok(())
    }

    /// Set the categories this geom collides with.
    pub fn set_collide_bits(&mut self, id: GeomId, bits: u64) -> CollisionResult<()> {
        self.check_parent_unlocked(id)?;
        self.geom_mut(id)?.collide_bits = bits;
        Ok(())
    }

    /// Attach the geom to a body; geoms on the same body never collide.
    pub fn set_body(&mut self, id: GeomId, body: Option<BodyId>) -> CollisionResult<()> {
        self.geom_mut(id)?.body = body;
        Ok(())
    }

    fn check_placeable(&self, id: GeomId) -> CollisionResult<()> {
        match self.geom(id)?.shape() {
            Some(shape) if shape.is_placeable() => self.check_geom_unlocked(id),
            _ => Err(CollisionError::NotPlaceable(id)),
        }
    }

    fn check_geom_unlocked(&self, id: GeomId) -> CollisionResult<()> {
        match self.geom(id)?.space() {
            Some(space) => self.check_lock_chain(space),
            None => Ok(()),
        }
    }

    fn check_parent_unlocked(&self, id: GeomId) -> CollisionResult<()> {
        if let Some(space) = self.geom(id)?.space() {
            if self.space(space)?.is_locked() {
                warn!(space = ?space, geom = ?id, "filter bits change rejected: space is locked");
                return Err(CollisionError::SpaceLocked(space));
            }
        }
        Ok(())
    }

    /// Dirty `id` and each space geom above it. Lock checks are the caller's job.
    fn propagate_moved(&mut self, id: GeomId) -> CollisionResult<()> {
        let mut current = id;
        loop {
            let geom = self.geom_mut(current)?;
            geom.flags.insert(GeomFlags::DIRTY | GeomFlags::AABB_BAD);
            let Some(space) = geom.space() else {
                return Ok(());
            };
            let sap = self.spaces.get_mut(space.0).ok_or(CollisionError::StaleSpace(space))?;
            sap.mark_dirty(current, &mut self.geoms)?;
            current = sap.geom();
        }
    }

    // ---------------------------------------------------------------- passes

    /// Recompute the bounds of every dirty geom in `space`, recursing into sub-spaces.
    pub fn clean_space(&mut self, id: SpaceId) -> CollisionResult<()> {
        self.space_mut(id)?.lock();
        let result = self.clean_locked(id);
        if let Some(space) = self.spaces.get_mut(id.0) {
            space.unlock();
        }
        result
    }

    fn clean_locked(&mut self, id: SpaceId) -> CollisionResult<()> {
        let dirty = self.space_mut(id)?.take_dirty();
        if let Err(err) = dirty.iter().try_for_each(|&g| self.refresh_aabb(g)) {
            if let Some(space) = self.spaces.get_mut(id.0) {
                space.restore_dirty(dirty);
            }
            return Err(err);
        }
        let space = self.spaces.get_mut(id.0).ok_or(CollisionError::StaleSpace(id))?;
        space.settle(dirty, &mut self.geoms);
        Ok(())
    }

    /// Recompute one geom's AABB. A sub-space is cleaned first and bounds the union of its
    /// members.
    fn refresh_aabb(&mut self, id: GeomId) -> CollisionResult<()> {
        let Some(sub) = self.geom(id)?.as_space() else {
            self.geom_mut(id)?.recompute_shape_aabb();
            return Ok(());
        };
        self.clean_space(sub)?;
        let aabb = self
            .space(sub)?
            .members()
            .try_fold(Aabb::EMPTY, |acc, m| {
                self.geom(m).map(|g| acc.union(g.aabb()))
            })?;
        self.geom_mut(id)?.aabb = aabb;
        Ok(())
    }

    /// Run a broadphase pass over `space`, calling `callback` for every candidate pair.
    ///
    /// The callback receives the world and may run narrowphase queries or passes over other
    /// spaces. Structural changes to `space` from inside the callback fail.
    pub fn collide<F>(&mut self, space: SpaceId, mut callback: F) -> CollisionResult<()>
    where
        F: FnMut(&mut CollisionWorld, GeomId, GeomId),
    {
        if self.space(space)?.is_locked() {
            warn!(space = ?space, "collide called on a space already in a pass");
            return Err(CollisionError::SpaceLocked(space));
        }
        self.space_mut(space)?.lock();
        let result = self.run_pass(space, &mut callback);
        if let Some(sap) = self.spaces.get_mut(space.0) {
            sap.unlock();
        }
        result
    }

    fn run_pass(
        &mut self,
        id: SpaceId,
        callback: &mut dyn FnMut(&mut CollisionWorld, GeomId, GeomId),
    ) -> CollisionResult<()> {
        self.clean_locked(id)?;

        let space = self.space_mut(id)?;
        if space.clean_len() != space.count() {
            return Err(CollisionError::CorruptedSpace {
                space: id,
                reason: "clean list does not hold every member after cleaning",
            });
        }
        let mut scratch = mem::take(&mut space.scratch);

        let result = self.gather_pairs(id, &mut scratch);
        if result.is_ok() {
            for &(a, b) in &scratch.pairs {
                let pass = match (self.geoms.get(a.0), self.geoms.get(b.0)) {
                    (Some(ga), Some(gb)) => {
                        ga.is_enabled() && gb.is_enabled() && pair_passes_filter(ga, gb)
                    }
                    _ => false,
                };
                if pass {
                    callback(self, a, b);
                }
            }
        }

        if let Some(space) = self.spaces.get_mut(id.0) {
            space.scratch = scratch;
        }
        result
    }

    /// Fill `scratch.pairs` with the candidate pairs of a clean space.
    fn gather_pairs(&mut self, id: SpaceId, scratch: &mut PassScratch) -> CollisionResult<()> {
        scratch.clear();
        let space = self.spaces.get(id.0).ok_or(CollisionError::StaleSpace(id))?;
        let axis_order = space.config().axis_order;
        let [axis0, _, _] = axis_order.axes();

        for &g in space.clean_members() {
            let geom = self.geoms.get(g.0).ok_or(CollisionError::StaleGeom(g))?;
            let aabb = geom.aabb();
            if !geom.is_enabled() || aabb.is_empty() {
                continue;
            }
            if aabb.max_on(axis0) == f32::INFINITY {
                scratch.infinite.push(g);
            } else {
                scratch.finite.push(g);
                scratch.boxes.push(*aabb);
            }
        }

        box_pruning(
            self.sort.sorter(),
            &mut scratch.positions,
            &scratch.boxes,
            axis_order,
            &mut scratch.overlaps,
        );

        let finite = &scratch.finite;
        let infinite = &scratch.infinite;
        let pairs = &mut scratch.pairs;
        pairs.extend(
            scratch
                .overlaps
                .iter()
                .map(|&(i, j)| (finite[i as usize], finite[j as usize])),
        );
        for (k, &a) in infinite.iter().enumerate() {
            for &b in &infinite[k + 1..] {
                pairs.push((a, b));
            }
        }
        for &a in infinite {
            for &b in finite {
                pairs.push((a, b));
            }
        }

        trace!(
            space = ?id,
            finite = finite.len(),
            infinite = infinite.len(),
            pairs = pairs.len(),
            "broadphase pass"
        );
        Ok(())
    }

    /// Test one geom against every clean member of `space`.
    ///
    /// `geom` need not belong to `space`; a space geom is tested by its overall bounds.
    /// The callback receives `(member, geom)`.
    pub fn collide2<F>(
        &mut self,
        space: SpaceId,
        geom: GeomId,
        mut callback: F,
    ) -> CollisionResult<()>
    where
        F: FnMut(&mut CollisionWorld, GeomId, GeomId),
    {
        self.geom(geom)?;
        self.space_mut(space)?.lock();
        let result = self.run_query(space, geom, &mut callback);
        if let Some(sap) = self.spaces.get_mut(space.0) {
            sap.unlock();
        }
        result
    }

    fn run_query(
        &mut self,
        id: SpaceId,
        query: GeomId,
        callback: &mut dyn FnMut(&mut CollisionWorld, GeomId, GeomId),
    ) -> CollisionResult<()> {
        self.clean_locked(id)?;
        self.refresh_aabb(query)?;
        if !self.geom(query)?.is_enabled() {
            return Ok(());
        }

        let candidates: Vec<GeomId> = self
            .space(id)?
            .clean_members()
            .iter()
            .copied()
            .filter(|&g| g != query)
            .collect();
        let mut hits = 0usize;
        for g in candidates {
            let pass = match (self.geoms.get(g.0), self.geoms.get(query.0)) {
                (Some(member), Some(q)) => {
                    member.is_enabled()
                        && member.aabb().overlaps(q.aabb())
                        && pair_passes_filter(member, q)
                }
                _ => false,
            };
            if pass {
                hits += 1;
                callback(self, g, query);
            }
        }
        trace!(space = ?id, geom = ?query, hits, "single geom query");
        Ok(())
    }

    /// Generate contacts between two geoms, appending at most `flags.max_contacts` to
    /// `out`. Returns the number appended.
    pub fn collide_geoms(
        &self,
        g1: GeomId,
        g2: GeomId,
        flags: CollideFlags,
        out: &mut Vec<ContactGeom>,
    ) -> CollisionResult<usize> {
        let a = self.geom(g1)?;
        let b = self.geom(g2)?;
        Ok(narrowphase::collide(a, g1, b, g2, flags, out))
    }
}
