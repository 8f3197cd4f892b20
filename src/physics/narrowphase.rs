//! Narrow phase: closed-form sphere/sphere and sphere/box tests for the
//! common cases, GJK + EPA for general convex pairs, and contact manifold
//! construction with warm-start matching against the previous step's
//! manifold for the same body pair.

use crate::math::{Quat, Vec3};
use crate::physics::body::Shape;

pub const GJK_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Copy, Default)]
pub struct Contact {
    pub point: Vec3,
    /// Points from body A toward body B.
    pub normal: Vec3,
    pub penetration: f32,
    /// Accumulated normal and (two-axis) friction impulses, carried across
    /// steps by `Manifold::warm_start_from`.
    pub normal_impulse: f32,
    pub tangent_impulse: [f32; 2],
}

pub const MAX_CONTACTS: usize = 4;

#[derive(Debug, Clone)]
pub struct Manifold {
    pub body_a: u32,
    pub body_b: u32,
    pub contacts: [Contact; MAX_CONTACTS],
    pub contact_count: usize,
}

impl Manifold {
    fn identity_key(&self) -> (u32, u32) {
        (self.body_a, self.body_b)
    }

    /// Carry accumulated impulses from a previous step's manifold for the
    /// same body pair into this one, matched by closest contact point so
    /// the solver starts warm instead of from zero every step.
    pub fn warm_start_from(&mut self, previous: &Manifold) {
        if self.identity_key() != previous.identity_key() {
            return;
        }
        for c in self.contacts[..self.contact_count].iter_mut() {
            let mut best_dist = f32::INFINITY;
            let mut best_idx = None;
            for (i, p) in previous.contacts[..previous.contact_count].iter().enumerate() {
                let d = c.point.sub(p.point).length_sq();
                if d < best_dist {
                    best_dist = d;
                    best_idx = Some(i);
                }
            }
            if let (Some(i), true) = (best_idx, best_dist < 0.01 * 0.01) {
                c.normal_impulse = previous.contacts[i].normal_impulse;
                c.tangent_impulse = previous.contacts[i].tangent_impulse;
            }
        }
    }
}

fn support_world(shape: &Shape, pos: Vec3, orient: Quat, dir: Vec3) -> Vec3 {
    let local_dir = orient.conjugate().rotate_vector(dir);
    let local_support = shape.support(local_dir);
    pos.add(orient.rotate_vector(local_support))
}

/// Support of the Minkowski difference `A - B` in world space.
fn support_diff(a: &Shape, pos_a: Vec3, orient_a: Quat, b: &Shape, pos_b: Vec3, orient_b: Quat, dir: Vec3) -> Vec3 {
    support_world(a, pos_a, orient_a, dir).sub(support_world(b, pos_b, orient_b, dir.neg()))
}

/// GJK intersection test for two convex shapes. Returns the final simplex
/// (2-4 points) if the origin is enclosed by the Minkowski difference,
/// `None` if the shapes are separated.
fn gjk(a: &Shape, pos_a: Vec3, orient_a: Quat, b: &Shape, pos_b: Vec3, orient_b: Quat, max_iterations: u32) -> Option<Vec<Vec3>> {
    let mut dir = pos_b.sub(pos_a);
    if dir.length_sq() < 1e-12 {
        dir = Vec3::UP;
    }
    let mut simplex = vec![support_diff(a, pos_a, orient_a, b, pos_b, orient_b, dir)];
    dir = simplex[0].neg();

    for _ in 0..max_iterations {
        let p = support_diff(a, pos_a, orient_a, b, pos_b, orient_b, dir);
        if p.dot(dir) < 0.0 {
            return None;
        }
        simplex.push(p);
        if let Some(new_dir) = handle_simplex(&mut simplex) {
            dir = new_dir;
        } else {
            return Some(simplex);
        }
    }
    None
}

/// Reduce `simplex` toward the origin, returning the next search direction,
/// or `None` once it encloses the origin (line -> triangle -> tetrahedron).
fn handle_simplex(simplex: &mut Vec<Vec3>) -> Option<Vec3> {
    match simplex.len() {
        2 => {
            let a = simplex[1];
            let b = simplex[0];
            let ab = b.sub(a);
            let ao = a.neg();
            Some(ab.cross(ao).cross(ab))
        }
        3 => {
            let c = simplex[0];
            let b = simplex[1];
            let a = simplex[2];
            let ab = b.sub(a);
            let ac = c.sub(a);
            let ao = a.neg();
            let abc = ab.cross(ac);
            if abc.cross(ac).dot(ao) > 0.0 {
                simplex.remove(1); // drop b, keep [c, a]
                Some(ac.cross(ao).cross(ac))
            } else if ab.cross(abc).dot(ao) > 0.0 {
                simplex.remove(0); // drop c, keep [b, a]
                Some(ab.cross(ao).cross(ab))
            } else if abc.dot(ao) > 0.0 {
                Some(abc)
            } else {
                simplex.swap(0, 1);
                Some(abc.neg())
            }
        }
        4 => {
            let a = simplex[3];
            let b = simplex[2];
            let c = simplex[1];
            let d = simplex[0];
            let ao = a.neg();
            let ab = b.sub(a);
            let ac = c.sub(a);
            let ad = d.sub(a);

            let abc = ab.cross(ac);
            let acd = ac.cross(ad);
            let adb = ad.cross(ab);

            if abc.dot(ao) > 0.0 {
                *simplex = vec![c, b, a];
                return handle_simplex(simplex);
            }
            if acd.dot(ao) > 0.0 {
                *simplex = vec![d, c, a];
                return handle_simplex(simplex);
            }
            if adb.dot(ao) > 0.0 {
                *simplex = vec![b, d, a];
                return handle_simplex(simplex);
            }
            None
        }
        _ => None,
    }
}

struct Face {
    indices: [usize; 3],
    normal: Vec3,
    distance: f32,
}

fn face_from(points: &[Vec3], indices: [usize; 3]) -> Face {
    let (a, b, c) = (points[indices[0]], points[indices[1]], points[indices[2]]);
    let mut normal = b.sub(a).cross(c.sub(a)).normalize();
    if normal.dot(a) < 0.0 {
        normal = normal.neg();
    }
    Face { indices, normal, distance: normal.dot(a) }
}

/// Expanding Polytope Algorithm: given a GJK simplex enclosing the origin,
/// find the Minkowski-difference boundary's penetration depth and normal.
fn epa(
    a: &Shape,
    pos_a: Vec3,
    orient_a: Quat,
    b: &Shape,
    pos_b: Vec3,
    orient_b: Quat,
    simplex: Vec<Vec3>,
    max_iterations: u32,
) -> (Vec3, f32) {
    let mut points = simplex;
    let mut faces = vec![
        face_from(&points, [0, 1, 2]),
        face_from(&points, [0, 2, 3]),
        face_from(&points, [0, 3, 1]),
        face_from(&points, [1, 3, 2]),
    ];

    for _ in 0..max_iterations {
        let mut closest = 0;
        for i in 1..faces.len() {
            if faces[i].distance < faces[closest].distance {
                closest = i;
            }
        }
        let normal = faces[closest].normal;
        let support = support_diff(a, pos_a, orient_a, b, pos_b, orient_b, normal);
        let d = support.dot(normal);

        if d - faces[closest].distance < GJK_EPSILON {
            return (normal, d.max(0.0));
        }

        points.push(support);
        let new_idx = points.len() - 1;

        // Remove faces visible from the new point and rebuild the
        // boundary with triangles fanning to the new support point.
        let mut edges: Vec<(usize, usize)> = Vec::new();
        faces.retain(|f| {
            if f.normal.dot(support.sub(points[f.indices[0]])) > 0.0 {
                add_unique_edge(&mut edges, f.indices[0], f.indices[1]);
                add_unique_edge(&mut edges, f.indices[1], f.indices[2]);
                add_unique_edge(&mut edges, f.indices[2], f.indices[0]);
                false
            } else {
                true
            }
        });
        for (e0, e1) in edges {
            faces.push(face_from(&points, [e0, e1, new_idx]));
        }
    }

    let mut closest = 0;
    for i in 1..faces.len() {
        if faces[i].distance < faces[closest].distance {
            closest = i;
        }
    }
    (faces[closest].normal, faces[closest].distance.max(0.0))
}

fn add_unique_edge(edges: &mut Vec<(usize, usize)>, a: usize, b: usize) {
    if let Some(pos) = edges.iter().position(|&(x, y)| x == b && y == a) {
        edges.remove(pos);
    } else {
        edges.push((a, b));
    }
}

/// Closed-form sphere/sphere test.
pub fn sphere_sphere(pos_a: Vec3, radius_a: f32, pos_b: Vec3, radius_b: f32) -> Option<Contact> {
    let delta = pos_b.sub(pos_a);
    let dist = delta.length();
    let overlap = radius_a + radius_b - dist;
    if overlap <= 0.0 {
        return None;
    }
    let normal = if dist > 1e-6 { delta.scale(1.0 / dist) } else { Vec3::UP };
    let point = pos_a.add(normal.scale(radius_a - overlap * 0.5));
    Some(Contact { point, normal, penetration: overlap, normal_impulse: 0.0, tangent_impulse: [0.0, 0.0] })
}

/// Closed-form sphere/box test. `box_half_extents` is in the box's local
/// frame; `box_orient` rotates local to world.
pub fn sphere_box(sphere_pos: Vec3, radius: f32, box_pos: Vec3, box_orient: Quat, box_half_extents: Vec3) -> Option<Contact> {
    let local = box_orient.conjugate().rotate_vector(sphere_pos.sub(box_pos));
    let clamped = Vec3::new(
        local.x.clamp(-box_half_extents.x, box_half_extents.x),
        local.y.clamp(-box_half_extents.y, box_half_extents.y),
        local.z.clamp(-box_half_extents.z, box_half_extents.z),
    );
    let local_delta = local.sub(clamped);
    let dist = local_delta.length();
    if dist >= radius {
        return None;
    }
    let local_normal = if dist > 1e-6 { local_delta.scale(1.0 / dist) } else { local.dominant_axis() };
    let normal = box_orient.rotate_vector(local_normal).normalize();
    let world_closest = box_pos.add(box_orient.rotate_vector(clamped));
    Some(Contact {
        point: world_closest,
        normal: normal.neg(), // points from sphere (A) toward box (B)
        penetration: radius - dist,
        normal_impulse: 0.0,
        tangent_impulse: [0.0, 0.0],
    })
}

/// General convex/convex test via GJK + EPA. Produces a single contact
/// point at the midpoint of the two shapes' support points along the
/// separating normal — sufficient for stable stacking under iterative
/// solving, though not a full multi-point manifold.
pub fn convex_convex(a: &Shape, pos_a: Vec3, orient_a: Quat, b: &Shape, pos_b: Vec3, orient_b: Quat, gjk_iterations: u32, epa_iterations: u32) -> Option<Contact> {
    let simplex = gjk(a, pos_a, orient_a, b, pos_b, orient_b, gjk_iterations)?;
    if simplex.len() < 4 {
        return None;
    }
    let (normal, penetration) = epa(a, pos_a, orient_a, b, pos_b, orient_b, simplex, epa_iterations);
    let witness_a = support_world(a, pos_a, orient_a, normal);
    let witness_b = support_world(b, pos_b, orient_b, normal.neg());
    let point = witness_a.add(witness_b).scale(0.5);
    Some(Contact { point, normal, penetration, normal_impulse: 0.0, tangent_impulse: [0.0, 0.0] })
}

/// Test a convex shape against an infinite plane by finding the shape's
/// deepest support point along the plane's inward normal. Used instead of
/// GJK/EPA since a plane's own support mapping (a single point at the
/// origin) carries no useful extent for the Minkowski difference.
fn plane_convex(plane_normal: Vec3, plane_offset: f32, other: &Shape, other_pos: Vec3, other_orient: Quat) -> Option<Contact> {
    let local_dir = other_orient.conjugate().rotate_vector(plane_normal.neg());
    let local_support = other.support(local_dir);
    let point = other_pos.add(other_orient.rotate_vector(local_support));
    let dist = plane_normal.dot(point) - plane_offset;
    if dist >= 0.0 {
        return None;
    }
    Some(Contact { point, normal: plane_normal.neg(), penetration: -dist, normal_impulse: 0.0, tangent_impulse: [0.0, 0.0] })
}

/// Dispatch a shape pair to its specialized test where one exists
/// (sphere/sphere, sphere/box, plane/anything), falling back to GJK + EPA
/// for general convex pairs.
pub fn generate_contact(
    a: &Shape,
    pos_a: Vec3,
    orient_a: Quat,
    b: &Shape,
    pos_b: Vec3,
    orient_b: Quat,
    gjk_iterations: u32,
    epa_iterations: u32,
) -> Option<Contact> {
    match (a, b) {
        (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => sphere_sphere(pos_a, *ra, pos_b, *rb),
        (Shape::Sphere { radius }, Shape::Box { half_extents }) => sphere_box(pos_a, *radius, pos_b, orient_b, *half_extents),
        (Shape::Box { half_extents }, Shape::Sphere { radius }) => {
            sphere_box(pos_b, *radius, pos_a, orient_a, *half_extents).map(|mut c| {
                c.normal = c.normal.neg();
                c
            })
        }
        (Shape::Plane { normal, offset }, _) => plane_convex(*normal, *offset, b, pos_b, orient_b),
        (_, Shape::Plane { normal, offset }) => {
            plane_convex(*normal, *offset, a, pos_a, orient_a).map(|mut c| {
                c.normal = c.normal.neg();
                c
            })
        }
        _ => convex_convex(a, pos_a, orient_a, b, pos_b, orient_b, gjk_iterations, epa_iterations),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_sphere_overlap_has_correct_penetration() {
        let c = sphere_sphere(Vec3::ZERO, 1.0, Vec3::new(1.5, 0.0, 0.0), 1.0).unwrap();
        assert!((c.penetration - 0.5).abs() < 1e-5);
        assert!((c.normal.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn sphere_sphere_separated_has_no_contact() {
        assert!(sphere_sphere(Vec3::ZERO, 1.0, Vec3::new(5.0, 0.0, 0.0), 1.0).is_none());
    }

    #[test]
    fn sphere_box_resting_on_top_has_upward_normal() {
        let c = sphere_box(Vec3::new(0.0, 1.4, 0.0), 0.5, Vec3::ZERO, Quat::IDENTITY, Vec3::new(1.0, 1.0, 1.0)).unwrap();
        assert!(c.normal.y < 0.0); // points from sphere down into the box
        assert!(c.penetration > 0.0 && c.penetration < 0.2);
    }

    #[test]
    fn convex_convex_overlapping_spheres_via_gjk_epa() {
        let a = Shape::Sphere { radius: 1.0 };
        let b = Shape::Sphere { radius: 1.0 };
        let contact = convex_convex(&a, Vec3::ZERO, Quat::IDENTITY, &b, Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY, 32, 32);
        assert!(contact.is_some());
        let c = contact.unwrap();
        assert!(c.penetration > 0.0);
    }

    #[test]
    fn convex_convex_separated_spheres_find_no_contact() {
        let a = Shape::Sphere { radius: 1.0 };
        let b = Shape::Sphere { radius: 1.0 };
        let contact = convex_convex(&a, Vec3::ZERO, Quat::IDENTITY, &b, Vec3::new(10.0, 0.0, 0.0), Quat::IDENTITY, 32, 32);
        assert!(contact.is_none());
    }

    #[test]
    fn generate_contact_dispatches_sphere_box_regardless_of_argument_order() {
        let sphere = Shape::Sphere { radius: 0.5 };
        let cube = Shape::Box { half_extents: Vec3::new(1.0, 1.0, 1.0) };
        let direct = generate_contact(&sphere, Vec3::new(0.0, 1.4, 0.0), Quat::IDENTITY, &cube, Vec3::ZERO, Quat::IDENTITY, 32, 32).unwrap();
        let swapped = generate_contact(&cube, Vec3::ZERO, Quat::IDENTITY, &sphere, Vec3::new(0.0, 1.4, 0.0), Quat::IDENTITY, 32, 32).unwrap();
        assert!((direct.penetration - swapped.penetration).abs() < 1e-5);
        assert!((direct.normal.y + swapped.normal.y).abs() < 1e-5); // opposite orientation, same axis
    }

    #[test]
    fn generate_contact_against_plane_has_upward_normal_for_resting_sphere() {
        let plane = Shape::Plane { normal: Vec3::UP, offset: 0.0 };
        let sphere = Shape::Sphere { radius: 1.0 };
        let c = generate_contact(&plane, Vec3::ZERO, Quat::IDENTITY, &sphere, Vec3::new(0.0, 0.9, 0.0), Quat::IDENTITY, 32, 32).unwrap();
        assert!(c.normal.y > 0.0);
        assert!(c.penetration > 0.0);
    }

    #[test]
    fn warm_start_carries_impulse_for_matching_contact_point() {
        let mut prev = Manifold {
            body_a: 0,
            body_b: 1,
            contacts: Default::default(),
            contact_count: 1,
        };
        prev.contacts[0] = Contact { point: Vec3::new(0.0, 0.0, 0.0), normal: Vec3::UP, penetration: 0.1, normal_impulse: 2.5, tangent_impulse: [0.1, -0.2] };

        let mut next = Manifold { body_a: 0, body_b: 1, contacts: Default::default(), contact_count: 1 };
        next.contacts[0] = Contact { point: Vec3::new(0.001, 0.0, 0.0), normal: Vec3::UP, penetration: 0.09, normal_impulse: 0.0, tangent_impulse: [0.0, 0.0] };

        next.warm_start_from(&prev);
        assert!((next.contacts[0].normal_impulse - 2.5).abs() < 1e-6);
    }
}
