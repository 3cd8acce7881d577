//! End-to-end tests: spaces, broadphase passes and narrowphase contacts through the public
//! `CollisionWorld` API.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::Once;

use approx::assert_relative_eq;
use proptest::prelude::*;
use rein_collide::glam::{Quat, Vec3};
use rein_collide::{
    Aabb, AxisOrder, CollideFlags, CollisionConfig, CollisionError, CollisionWorld, ContactGeom,
    ConvexHull, GeomId, Pose, SapConfig, Shape, ShapeClass, ShapeClassId, SpaceId,
};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .try_init();
    });
}

fn ordered(a: GeomId, b: GeomId) -> (GeomId, GeomId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn candidate_pairs(world: &mut CollisionWorld, space: SpaceId) -> BTreeSet<(GeomId, GeomId)> {
    let mut pairs = BTreeSet::new();
    world
        .collide(space, |_, a, b| {
            assert!(pairs.insert(ordered(a, b)), "pair reported twice");
        })
        .unwrap();
    pairs
}

fn all_contacts(world: &mut CollisionWorld, space: SpaceId) -> Vec<ContactGeom> {
    let mut contacts = Vec::new();
    world
        .collide(space, |w, a, b| {
            w.collide_geoms(a, b, CollideFlags::with_max_contacts(8), &mut contacts)
                .unwrap();
        })
        .unwrap();
    contacts
}

fn place(world: &mut CollisionWorld, space: SpaceId, shape: Shape, at: Vec3) -> GeomId {
    let id = world.create_geom(shape, Some(space)).unwrap();
    world.set_position(id, at).unwrap();
    id
}

#[test]
fn test_full_pipeline_ground_and_stack() {
    init_tracing();
    let mut world = CollisionWorld::default();
    let space = world.create_space(None).unwrap();

    let ground = world
        .create_geom(Shape::plane(Vec3::Z, 0.0), Some(space))
        .unwrap();
    let lower = place(
        &mut world,
        space,
        Shape::cuboid(Vec3::splat(0.5)),
        Vec3::new(0.0, 0.0, 0.45),
    );
    let upper = place(
        &mut world,
        space,
        Shape::Convex(ConvexHull::cuboid(Vec3::splat(0.5))),
        Vec3::new(0.0, 0.0, 1.35),
    );
    let ball = place(&mut world, space, Shape::sphere(0.5), Vec3::new(5.0, 0.0, 0.4));

    let contacts = all_contacts(&mut world, space);

    let between = |x: GeomId, y: GeomId| {
        contacts
            .iter()
            .filter(move |c| ordered(c.g1, c.g2) == ordered(x, y))
            .collect::<Vec<_>>()
    };

    let ground_lower = between(ground, lower);
    assert_eq!(ground_lower.len(), 4);
    for c in ground_lower {
        let up = if c.g1 == lower { Vec3::Z } else { -Vec3::Z };
        assert!((c.normal - up).length() < 1e-5);
        assert_relative_eq!(c.depth, 0.05, epsilon = 1e-5);
    }

    let stacked = between(lower, upper);
    assert_eq!(stacked.len(), 4);
    for c in stacked {
        // Moving g1 along the normal separates the pair
        let g1_is_upper = c.g1 == upper;
        assert_eq!(c.normal.z > 0.0, g1_is_upper);
        assert_relative_eq!(c.depth, 0.1, epsilon = 1e-5);
    }

    let ground_ball = between(ground, ball);
    assert_eq!(ground_ball.len(), 1);
    assert_relative_eq!(ground_ball[0].depth, 0.1, epsilon = 1e-5);

    assert!(between(lower, ball).is_empty());
    assert!(between(upper, ground).is_empty());
}

#[test]
fn test_infinite_geoms_pair_with_everything_they_may_touch() {
    init_tracing();
    let mut world = CollisionWorld::default();
    let space = world.create_space(None).unwrap();

    // A tilted plane has no finite bound on any axis
    let tilted = world
        .create_geom(Shape::plane(Vec3::new(1.0, 0.0, 1.0).normalize(), 0.0), Some(space))
        .unwrap();
    let floor = world
        .create_geom(Shape::plane(Vec3::Z, -10.0), Some(space))
        .unwrap();
    let below = place(&mut world, space, Shape::sphere(0.5), Vec3::new(-3.0, 0.0, -3.0));
    let above = place(&mut world, space, Shape::sphere(0.5), Vec3::new(3.0, 0.0, 3.0));

    let pairs = candidate_pairs(&mut world, space);
    assert!(pairs.contains(&ordered(tilted, floor)));
    assert!(pairs.contains(&ordered(tilted, below)));
    // The plane's own bounds test rejects boxes clear of its solid side
    assert!(!pairs.contains(&ordered(tilted, above)));
    assert!(!pairs.contains(&ordered(floor, above)));
    assert!(!pairs.contains(&ordered(below, above)));
}

#[test]
fn test_disabled_geoms_are_skipped_by_every_pass() {
    init_tracing();
    let mut world = CollisionWorld::default();
    let space = world.create_space(None).unwrap();
    let a = place(&mut world, space, Shape::sphere(1.0), Vec3::ZERO);
    let b = place(&mut world, space, Shape::sphere(1.0), Vec3::new(1.0, 0.0, 0.0));
    let plane = world
        .create_geom(Shape::plane(Vec3::Z, 0.0), Some(space))
        .unwrap();

    world.disable(plane).unwrap();
    assert_eq!(candidate_pairs(&mut world, space), BTreeSet::from([ordered(a, b)]));

    world.disable(a).unwrap();
    assert!(candidate_pairs(&mut world, space).is_empty());

    let mut hits = Vec::new();
    world.collide2(space, b, |_, g, q| hits.push((g, q))).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_nested_pass_on_another_space_from_callback() {
    init_tracing();
    let mut world = CollisionWorld::default();
    let outer = world.create_space(None).unwrap();
    let inner = world.create_space(Some(outer)).unwrap();
    let inner_geom = world.space(inner).unwrap().geom();

    let outer_ball = place(&mut world, outer, Shape::sphere(0.5), Vec3::new(0.0, 0.0, 0.0));
    let near = place(&mut world, inner, Shape::sphere(0.5), Vec3::new(0.6, 0.0, 0.0));
    let _far = place(&mut world, inner, Shape::sphere(0.5), Vec3::new(3.0, 0.0, 0.0));

    let mut leaf_pairs = Vec::new();
    world
        .collide(outer, |w, a, b| {
            // Expand the space geom into its members
            let (space_geom, other) = if a == inner_geom { (a, b) } else { (b, a) };
            assert_eq!(space_geom, inner_geom);
            let sub = w.geom(space_geom).unwrap().as_space().unwrap();
            w.collide2(sub, other, |_, member, query| leaf_pairs.push((member, query)))
                .unwrap();
            // The outer space is still locked
            assert_eq!(
                w.space_remove(outer, outer_ball),
                Err(CollisionError::SpaceLocked(outer))
            );
            // Members of the inner space sit under the locked outer space
            assert_eq!(
                w.set_position(near, Vec3::ZERO),
                Err(CollisionError::SpaceLocked(outer))
            );
        })
        .unwrap();

    assert_eq!(leaf_pairs, vec![(near, outer_ball)]);
    assert!(!world.space(outer).unwrap().is_locked());
    assert!(!world.space(inner).unwrap().is_locked());
}

#[test]
fn test_collide2_with_loose_query() {
    init_tracing();
    let mut world = CollisionWorld::default();
    let space = world.create_space(None).unwrap();
    let a = place(&mut world, space, Shape::sphere(0.5), Vec3::ZERO);
    let b = place(&mut world, space, Shape::sphere(0.5), Vec3::new(2.0, 0.0, 0.0));
    // Bounds touch the ray but the sphere itself passes beside it
    let _grazed = place(&mut world, space, Shape::sphere(0.5), Vec3::new(2.0, 0.45, 0.45));
    let _far = place(&mut world, space, Shape::sphere(0.5), Vec3::new(9.0, 0.0, 0.0));

    let ray = world.create_geom(Shape::ray(3.0), None).unwrap();
    let along_x = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
    world.set_rotation(ray, along_x).unwrap();
    world.set_position(ray, Vec3::new(-1.0, 0.0, 0.0)).unwrap();

    let mut hits = BTreeSet::new();
    let mut contacts = Vec::new();
    world
        .collide2(space, ray, |w, member, query| {
            assert_eq!(query, ray);
            hits.insert(member);
            w.collide_geoms(query, member, CollideFlags::default(), &mut contacts)
                .unwrap();
        })
        .unwrap();

    assert_eq!(hits, BTreeSet::from([a, b]));
    assert_eq!(contacts.len(), 2);
    for c in &contacts {
        assert_eq!(c.g1, ray);
        assert!((c.normal + Vec3::X).length() < 1e-5);
        let expected = if c.g2 == a { 0.5 } else { 2.5 };
        assert_relative_eq!(c.depth, expected, epsilon = 1e-5);
    }
}

#[test]
fn test_add_remove_symmetry() {
    init_tracing();
    let mut world = CollisionWorld::default();
    let space = world.create_space(None).unwrap();
    let geoms: Vec<GeomId> = (0..16)
        .map(|i| place(&mut world, space, Shape::sphere(0.5), Vec3::new(i as f32, 0.0, 0.0)))
        .collect();

    // Clean half of them so removals hit both lists
    world.clean_space(space).unwrap();
    for id in geoms.iter().step_by(2) {
        world.set_position(*id, Vec3::new(0.0, 5.0, 0.0)).unwrap();
    }
    assert_eq!(world.space(space).unwrap().dirty_len(), 8);

    for (i, id) in geoms.iter().enumerate() {
        if i % 3 == 0 {
            world.space_remove(space, *id).unwrap();
            assert!(!world.space_contains(space, *id).unwrap());
        }
    }
    let remaining = geoms.len() - geoms.len().div_ceil(3);
    let sap = world.space(space).unwrap();
    assert_eq!(sap.count(), remaining);
    assert_eq!(sap.dirty_len() + sap.clean_len(), remaining);

    let members: BTreeSet<GeomId> = sap.members().collect();
    for (i, id) in geoms.iter().enumerate() {
        assert_eq!(members.contains(id), i % 3 != 0);
        assert_eq!(world.space_contains(space, *id).unwrap(), i % 3 != 0);
    }

    for (i, id) in geoms.iter().enumerate() {
        if i % 3 == 0 {
            world.space_add(space, *id).unwrap();
        }
    }
    assert_eq!(world.space_count(space).unwrap(), geoms.len());
}

#[test]
fn test_dirty_clean_convergence() {
    init_tracing();
    let mut world = CollisionWorld::default();
    let space = world.create_space(None).unwrap();
    let ids: Vec<GeomId> = (0..10)
        .map(|i| place(&mut world, space, Shape::sphere(0.6), Vec3::new(i as f32, 0.0, 0.0)))
        .collect();

    let first = candidate_pairs(&mut world, space);
    assert_eq!(first.len(), 9);
    let sap = world.space(space).unwrap();
    assert_eq!(sap.dirty_len(), 0);
    assert_eq!(sap.clean_len(), 10);

    // Moving one geom dirties only that geom
    world.set_position(ids[0], Vec3::new(100.0, 0.0, 0.0)).unwrap();
    assert_eq!(world.space(space).unwrap().dirty_len(), 1);
    world.space_dirty(space, ids[0]).unwrap();
    assert_eq!(world.space(space).unwrap().dirty_len(), 1);

    let second = candidate_pairs(&mut world, space);
    assert_eq!(second.len(), 8);
    assert!(!second.contains(&ordered(ids[0], ids[1])));
    assert_eq!(world.space(space).unwrap().dirty_len(), 0);

    // A pass with nothing dirty gives the same answer
    assert_eq!(candidate_pairs(&mut world, space), second);
}

#[test]
fn test_axis_order_does_not_change_pairs() {
    init_tracing();
    let positions = [
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(0.9, 0.2, -0.3),
        Vec3::new(0.1, 1.1, 0.0),
        Vec3::new(-0.4, 0.3, 0.95),
        Vec3::new(4.0, 4.0, 4.0),
        Vec3::new(4.5, 3.8, 4.1),
    ];
    let orders = [
        AxisOrder::Xyz,
        AxisOrder::Xzy,
        AxisOrder::Yxz,
        AxisOrder::Yzx,
        AxisOrder::Zxy,
        AxisOrder::Zyx,
    ];

    let mut reference: Option<BTreeSet<(usize, usize)>> = None;
    for axis_order in orders {
        let mut world = CollisionWorld::new(CollisionConfig {
            default_axis_order: AxisOrder::Xyz,
        });
        let space = world
            .create_space_with_config(None, SapConfig { axis_order })
            .unwrap();
        let ids: Vec<GeomId> = positions
            .iter()
            .map(|p| place(&mut world, space, Shape::sphere(0.5), *p))
            .collect();
        let index = |g: GeomId| ids.iter().position(|id| *id == g).unwrap();
        let pairs: BTreeSet<(usize, usize)> = candidate_pairs(&mut world, space)
            .into_iter()
            .map(|(a, b)| {
                let (i, j) = (index(a), index(b));
                (i.min(j), i.max(j))
            })
            .collect();
        match &reference {
            Some(expected) => assert_eq!(&pairs, expected, "axis order {axis_order:?}"),
            None => reference = Some(pairs),
        }
    }
}

#[test]
fn test_destroyed_space_frees_sort_scratch() {
    init_tracing();
    let mut world = CollisionWorld::default();
    let space = world.create_space(None).unwrap();
    for i in 0..64 {
        place(&mut world, space, Shape::sphere(0.5), Vec3::new(i as f32, 0.0, 0.0));
    }
    candidate_pairs(&mut world, space);
    assert!(world.sort_scratch().capacity() >= 64);

    world.destroy_space(space).unwrap();
    assert_eq!(world.sort_scratch().users(), 0);
    assert_eq!(world.sort_scratch().capacity(), 0);
    assert_eq!(world.geom_count(), 0);
}

/// User shape class: a slab whose top face sits 0.5 above its pose, bounded loosely.
#[derive(Debug)]
struct Slab {
    drops: Rc<Cell<usize>>,
}

impl Slab {
    fn shape(drops: &Rc<Cell<usize>>) -> Shape {
        Shape::Custom(Box::new(Slab {
            drops: Rc::clone(drops),
        }))
    }
}

impl ShapeClass for Slab {
    fn compute_aabb(&self, pose: &Pose) -> Aabb {
        Aabb::from_center_half_extents(pose.position, Vec3::new(2.0, 2.0, 1.0))
    }

    fn aabb_test(&self, pose: &Pose, aabb: &Aabb) -> bool {
        aabb.min.z < pose.position.z + 0.5
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

#[test]
fn test_custom_shape_class_bounds_and_rejects() {
    init_tracing();
    let drops = Rc::new(Cell::new(0));
    let mut world = CollisionWorld::default();
    let space = world.create_space(None).unwrap();
    let slab = world.create_geom(Slab::shape(&drops), Some(space)).unwrap();
    let ball = place(&mut world, space, Shape::sphere(0.5), Vec3::new(0.0, 0.0, 0.6));

    assert_eq!(
        world.geom(slab).unwrap().shape().unwrap().class(),
        ShapeClassId::Custom
    );
    assert_eq!(
        candidate_pairs(&mut world, space),
        BTreeSet::from([ordered(slab, ball)])
    );
    let bounds = *world.geom(slab).unwrap().aabb();
    assert_eq!(bounds.min, Vec3::new(-2.0, -2.0, -1.0));
    assert_eq!(bounds.max, Vec3::new(2.0, 2.0, 1.0));

    // Boxes still overlap, but the slab proves the ball is above its top face
    world.set_position(ball, Vec3::new(0.0, 0.0, 1.2)).unwrap();
    assert!(candidate_pairs(&mut world, space).is_empty());
    assert!(world
        .geom(slab)
        .unwrap()
        .aabb()
        .overlaps(world.geom(ball).unwrap().aabb()));

    // No collider is registered for custom classes
    let mut out = Vec::new();
    assert_eq!(
        world
            .collide_geoms(slab, ball, CollideFlags::default(), &mut out)
            .unwrap(),
        0
    );
    assert!(out.is_empty());
    assert_eq!(drops.get(), 0);
}

#[test]
fn test_custom_shape_class_dropped_with_geom() {
    init_tracing();
    let drops = Rc::new(Cell::new(0));
    let mut world = CollisionWorld::default();
    let space = world.create_space(None).unwrap();

    let replaced = world.create_geom(Slab::shape(&drops), Some(space)).unwrap();
    world.set_shape(replaced, Shape::sphere(1.0)).unwrap();
    assert_eq!(drops.get(), 1);

    let single = world.create_geom(Slab::shape(&drops), Some(space)).unwrap();
    world.destroy_geom(single).unwrap();
    assert_eq!(drops.get(), 2);

    // Cleanup mode destroys members with the space
    let owned = world.create_space(None).unwrap();
    world.set_space_cleanup(owned, true).unwrap();
    for _ in 0..3 {
        world.create_geom(Slab::shape(&drops), Some(owned)).unwrap();
    }
    world.destroy_space(owned).unwrap();
    assert_eq!(drops.get(), 5);

    // Without cleanup the members outlive the space
    let borrowed = world.create_space(None).unwrap();
    world.set_space_cleanup(borrowed, false).unwrap();
    let survivor = world.create_geom(Slab::shape(&drops), Some(borrowed)).unwrap();
    world.destroy_space(borrowed).unwrap();
    assert_eq!(drops.get(), 5);
    assert!(world.geom(survivor).unwrap().space().is_none());

    drop(world);
    assert_eq!(drops.get(), 6);
}

proptest! {
    #[test]
    fn prop_collide_matches_brute_force(
        spheres in prop::collection::vec(
            ((-10.0f32..10.0, -10.0f32..10.0, -10.0f32..10.0), 0.1f32..2.0),
            0..40,
        )
    ) {
        let mut world = CollisionWorld::default();
        let space = world.create_space(None).unwrap();
        let ids: Vec<GeomId> = spheres
            .iter()
            .map(|&((x, y, z), r)| place(&mut world, space, Shape::sphere(r), Vec3::new(x, y, z)))
            .collect();

        let pairs = candidate_pairs(&mut world, space);

        let mut expected = BTreeSet::new();
        for i in 0..ids.len() {
            for j in i + 1..ids.len() {
                let a = world.geom(ids[i]).unwrap();
                let b = world.geom(ids[j]).unwrap();
                let shape_a = a.shape().unwrap();
                let shape_b = b.shape().unwrap();
                if a.aabb().overlaps(b.aabb())
                    && shape_a.aabb_test(a.pose(), b.aabb())
                    && shape_b.aabb_test(b.pose(), a.aabb())
                {
                    expected.insert(ordered(ids[i], ids[j]));
                }
            }
        }
        prop_assert_eq!(pairs, expected);
    }
}
