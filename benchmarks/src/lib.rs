//! Scene builders shared by the benchmarks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rein_collide::glam::{Quat, Vec3};
use rein_collide::{
    CollideFlags, CollisionWorld, ContactGeom, ConvexHull, GeomId, GeomKind, Shape, SpaceId,
};

/// Seeded generator so every run sees the same scene.
pub fn scene_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// `n` spheres of radius 0.5 scattered in a cube sized so each overlaps a few others.
pub fn setup_sphere_world(n: usize) -> (CollisionWorld, SpaceId) {
    scatter(n, (n as f32).cbrt() * 1.2, |_| Shape::sphere(0.5))
}

/// Spheres, boxes and hulls mixed, over a ground plane.
pub fn setup_mixed_world(n: usize) -> (CollisionWorld, SpaceId) {
    let (mut world, space) = scatter(n, (n as f32).cbrt() * 1.5, |i| match i % 3 {
        0 => Shape::sphere(0.5),
        1 => Shape::cuboid(Vec3::splat(0.4)),
        _ => Shape::Convex(ConvexHull::cuboid(Vec3::new(0.3, 0.5, 0.4))),
    });
    world
        .create_geom(Shape::plane(Vec3::Z, -1.0), Some(space))
        .expect("space is unlocked");
    (world, space)
}

/// Spheres far enough apart that almost nothing overlaps.
pub fn setup_sparse_world(n: usize) -> (CollisionWorld, SpaceId) {
    scatter(n, (n as f32).cbrt() * 10.0, |_| Shape::sphere(0.5))
}

fn scatter(
    n: usize,
    extent: f32,
    mut shape: impl FnMut(usize) -> Shape,
) -> (CollisionWorld, SpaceId) {
    let mut world = CollisionWorld::default();
    let space = world
        .create_space(None)
        .expect("fresh world accepts a space");
    let mut rng = scene_rng(0x5eed + n as u64);
    for i in 0..n {
        let id = world
            .create_geom(shape(i), Some(space))
            .expect("space is unlocked");
        let position = Vec3::new(
            rng.gen_range(-extent..extent),
            rng.gen_range(-extent..extent),
            rng.gen_range(-extent..extent),
        );
        let rotation = Quat::from_rotation_z(rng.gen_range(0.0..3.0));
        world.set_position(id, position).expect("geom is placeable");
        world.set_rotation(id, rotation).expect("geom is placeable");
    }
    (world, space)
}

/// Count candidate pairs of one broadphase pass.
pub fn count_pairs(world: &mut CollisionWorld, space: SpaceId) -> usize {
    let mut pairs = 0;
    world
        .collide(space, |_, _, _| pairs += 1)
        .expect("space is not in a pass");
    pairs
}

/// One full pass: broadphase plus narrowphase for every candidate pair.
pub fn run_contacts(world: &mut CollisionWorld, space: SpaceId, out: &mut Vec<ContactGeom>) {
    out.clear();
    world
        .collide(space, |w, a, b| {
            w.collide_geoms(a, b, CollideFlags::default(), out)
                .expect("pair handles are live");
        })
        .expect("space is not in a pass");
}

/// Nudge every member so the next pass has to recompute all bounds.
pub fn jitter(world: &mut CollisionWorld, space: SpaceId, rng: &mut StdRng) {
    let members: Vec<GeomId> = world
        .space(space)
        .expect("space is alive")
        .members()
        .collect();
    for id in members {
        let geom = world.geom(id).expect("member is alive");
        let GeomKind::Shape(shape) = geom.kind() else {
            continue;
        };
        if !shape.is_placeable() {
            continue;
        }
        let p = geom.pose().position;
        let step = Vec3::new(rng.gen_range(-0.01..0.01), rng.gen_range(-0.01..0.01), 0.0);
        world.set_position(id, p + step).expect("space is not in a pass");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenes_are_reproducible() {
        let (mut a, sa) = setup_sphere_world(50);
        let (mut b, sb) = setup_sphere_world(50);
        assert_eq!(a.geom_count(), b.geom_count());
        assert_eq!(count_pairs(&mut a, sa), count_pairs(&mut b, sb));
    }

    #[test]
    fn test_mixed_world_has_ground_and_contacts() {
        let (mut world, space) = setup_mixed_world(60);
        // 60 scattered geoms, the ground plane and the space's own geom
        assert_eq!(world.geom_count(), 62);
        assert_eq!(world.space_count(space).unwrap(), 61);

        // Part of the scatter lies below the ground
        assert!(count_pairs(&mut world, space) > 0);
        assert_eq!(world.space(space).unwrap().dirty_len(), 0);

        // The plane is not placeable, so only the scattered geoms move
        let mut rng = scene_rng(11);
        jitter(&mut world, space, &mut rng);
        assert_eq!(world.space(space).unwrap().dirty_len(), 60);

        let mut contacts = Vec::new();
        run_contacts(&mut world, space, &mut contacts);
        assert_eq!(world.space(space).unwrap().dirty_len(), 0);
    }
}
