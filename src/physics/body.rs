//! Rigid body storage: shapes, materials, mass-property derivation, and
//! the body Structure-of-Arrays `BodySet` that every other physics module
//! indexes into by handle.

use crate::math::{Quat, Vec3};

pub const FLAG_STATIC: u32 = 1 << 0;
pub const FLAG_AWAKE: u32 = 1 << 1;
pub const FLAG_KINEMATIC: u32 = 1 << 2;

/// A body's motion category: `Dynamic` is integrated by forces and gravity
/// and pushed around by the solver; `Static` never moves; `Kinematic` has
/// infinite mass like `Static` but is externally animated (driven by
/// `World::set_transform`/`set_velocity`, e.g. a moving platform) and its
/// position is still advanced from its velocity every fixed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    Dynamic,
    Static,
    Kinematic,
}

#[derive(Debug, Clone)]
pub enum Shape {
    Sphere { radius: f32 },
    Box { half_extents: Vec3 },
    Capsule { radius: f32, half_height: f32 },
    ConvexHull { vertices: Vec<Vec3> },
    Plane { normal: Vec3, offset: f32 },
}

impl Shape {
    /// Support mapping: the hull point farthest in direction `dir`, used
    /// by GJK/EPA. Sphere/box/capsule have closed-form supports; a convex
    /// hull falls back to a brute-force max over its vertices.
    pub fn support(&self, dir: Vec3) -> Vec3 {
        let d = dir.normalize();
        match self {
            Shape::Sphere { radius } => d.scale(*radius),
            Shape::Box { half_extents } => Vec3::new(
                if d.x >= 0.0 { half_extents.x } else { -half_extents.x },
                if d.y >= 0.0 { half_extents.y } else { -half_extents.y },
                if d.z >= 0.0 { half_extents.z } else { -half_extents.z },
            ),
            Shape::Capsule { radius, half_height } => {
                let axis_point = if d.y >= 0.0 { Vec3::new(0.0, *half_height, 0.0) } else { Vec3::new(0.0, -half_height, 0.0) };
                axis_point.add(d.scale(*radius))
            }
            Shape::ConvexHull { vertices } => {
                let mut best = vertices.first().copied().unwrap_or(Vec3::ZERO);
                let mut best_dot = best.dot(d);
                for &v in vertices.iter().skip(1) {
                    let dp = v.dot(d);
                    if dp > best_dot {
                        best_dot = dp;
                        best = v;
                    }
                }
                best
            }
            Shape::Plane { .. } => Vec3::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Material {
    pub density: f32,
    pub restitution: f32,
    pub friction: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
}

impl Default for Material {
    fn default() -> Self {
        Material { density: 1.0, restitution: 0.2, friction: 0.5, linear_damping: 0.01, angular_damping: 0.05 }
    }
}

/// Mass, inverse mass, and diagonal inverse inertia derived from a shape
/// and material. Static/plane bodies get zero mass and infinite inertia
/// (`inv_mass = inv_inertia = 0`), which the solver reads as immovable.
#[derive(Debug, Clone, Copy)]
pub struct MassProperties {
    pub mass: f32,
    pub inv_mass: f32,
    pub inv_inertia_diag: Vec3,
}

pub fn derive_mass_properties(shape: &Shape, material: Material) -> MassProperties {
    match *shape {
        Shape::Plane { .. } => MassProperties { mass: 0.0, inv_mass: 0.0, inv_inertia_diag: Vec3::ZERO },
        Shape::Sphere { radius } => {
            let r = radius.max(1e-6);
            let volume = (4.0 / 3.0) * core::f32::consts::PI * r * r * r;
            let mass = volume * material.density;
            let i = 0.4 * mass * r * r;
            inertia_to_properties(mass, Vec3::splat(i))
        }
        Shape::Box { half_extents } => {
            let (hx, hy, hz) = (half_extents.x.max(1e-6), half_extents.y.max(1e-6), half_extents.z.max(1e-6));
            let volume = 8.0 * hx * hy * hz;
            let mass = volume * material.density;
            let (wx, wy, wz) = (2.0 * hx, 2.0 * hy, 2.0 * hz);
            let i = Vec3::new(
                (mass / 12.0) * (wy * wy + wz * wz),
                (mass / 12.0) * (wx * wx + wz * wz),
                (mass / 12.0) * (wx * wx + wy * wy),
            );
            inertia_to_properties(mass, i)
        }
        Shape::Capsule { radius, half_height } => {
            let r = radius.max(1e-6);
            let h = half_height.max(0.0);
            let cyl_volume = core::f32::consts::PI * r * r * (2.0 * h);
            let sphere_volume = (4.0 / 3.0) * core::f32::consts::PI * r * r * r;
            let mass = (cyl_volume + sphere_volume) * material.density;
            // Approximate as a cylinder for inertia; capsule end-cap
            // correction is a documented simplification, not load-bearing
            // for determinism.
            let ix_iz = (mass / 12.0) * (3.0 * r * r + (2.0 * h) * (2.0 * h));
            let iy = 0.5 * mass * r * r;
            inertia_to_properties(mass, Vec3::new(ix_iz, iy, ix_iz))
        }
        Shape::ConvexHull { ref vertices } => {
            let he = hull_half_extent(vertices);
            let volume = 8.0 * he.x.max(1e-6) * he.y.max(1e-6) * he.z.max(1e-6);
            let mass = volume * material.density;
            // Bounding-box inertia approximation; a precise convex-hull
            // inertia tensor is a documented simplification left for a
            // future pass.
            let (wx, wy, wz) = (2.0 * he.x, 2.0 * he.y, 2.0 * he.z);
            let i = Vec3::new(
                (mass / 12.0) * (wy * wy + wz * wz),
                (mass / 12.0) * (wx * wx + wz * wz),
                (mass / 12.0) * (wx * wx + wy * wy),
            );
            inertia_to_properties(mass, i)
        }
    }
}

/// Mass properties honoring `body_type`: `Dynamic` derives from the shape,
/// `Static`/`Kinematic` always get zero mass and infinite inertia regardless
/// of shape, since both are immovable by the solver's impulses.
pub fn mass_properties_for(shape: &Shape, material: Material, body_type: BodyType) -> MassProperties {
    match body_type {
        BodyType::Dynamic => derive_mass_properties(shape, material),
        BodyType::Static | BodyType::Kinematic => MassProperties { mass: 0.0, inv_mass: 0.0, inv_inertia_diag: Vec3::ZERO },
    }
}

fn hull_half_extent(vertices: &[Vec3]) -> Vec3 {
    let mut lo = Vec3::splat(f32::INFINITY);
    let mut hi = Vec3::splat(f32::NEG_INFINITY);
    for &v in vertices {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if vertices.is_empty() {
        return Vec3::ZERO;
    }
    hi.sub(lo).scale(0.5)
}

fn inertia_to_properties(mass: f32, inertia_diag: Vec3) -> MassProperties {
    if mass <= 1e-9 {
        return MassProperties { mass: 0.0, inv_mass: 0.0, inv_inertia_diag: Vec3::ZERO };
    }
    let inv = |v: f32| if v > 1e-9 { 1.0 / v } else { 0.0 };
    MassProperties {
        mass,
        inv_mass: 1.0 / mass,
        inv_inertia_diag: Vec3::new(inv(inertia_diag.x), inv(inertia_diag.y), inv(inertia_diag.z)),
    }
}

pub fn shape_local_aabb_half_extent(shape: &Shape) -> Vec3 {
    match *shape {
        Shape::Sphere { radius } => Vec3::splat(radius),
        Shape::Box { half_extents } => half_extents,
        Shape::Capsule { radius, half_height } => Vec3::new(radius, half_height + radius, radius),
        Shape::Plane { .. } => Vec3::splat(1e6),
        Shape::ConvexHull { ref vertices } => hull_half_extent(vertices),
    }
}

/// Body Structure-of-Arrays: one index per body across every field, so a
/// physics pass touching only (say) positions and velocities streams
/// through contiguous memory instead of bouncing across a `Vec<Body>` of
/// interleaved fields.
pub struct BodySet {
    pub position: Vec<Vec3>,
    pub orientation: Vec<Quat>,
    pub linear_velocity: Vec<Vec3>,
    pub angular_velocity: Vec<Vec3>,
    pub force_accum: Vec<Vec3>,
    pub torque_accum: Vec<Vec3>,
    pub shape: Vec<Shape>,
    pub material: Vec<Material>,
    pub mass_properties: Vec<MassProperties>,
    pub aabb_half_extent: Vec<Vec3>,
    pub flags: Vec<u32>,
    pub sleep_timer: Vec<f32>,
    free_list: Vec<u32>,
    live: Vec<bool>,
}

impl BodySet {
    pub fn new(capacity: usize) -> Self {
        BodySet {
            position: Vec::with_capacity(capacity),
            orientation: Vec::with_capacity(capacity),
            linear_velocity: Vec::with_capacity(capacity),
            angular_velocity: Vec::with_capacity(capacity),
            force_accum: Vec::with_capacity(capacity),
            torque_accum: Vec::with_capacity(capacity),
            shape: Vec::with_capacity(capacity),
            material: Vec::with_capacity(capacity),
            mass_properties: Vec::with_capacity(capacity),
            aabb_half_extent: Vec::with_capacity(capacity),
            flags: Vec::with_capacity(capacity),
            sleep_timer: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            live: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a new body, reusing a freed index if one exists. Returns the
    /// body's handle (its index into every SoA field).
    pub fn insert(&mut self, position: Vec3, orientation: Quat, shape: Shape, material: Material, body_type: BodyType) -> u32 {
        let mass_properties = mass_properties_for(&shape, material, body_type);
        let aabb_half_extent = shape_local_aabb_half_extent(&shape);
        let flags = match body_type {
            BodyType::Dynamic => FLAG_AWAKE,
            BodyType::Static => FLAG_STATIC,
            BodyType::Kinematic => FLAG_AWAKE | FLAG_KINEMATIC,
        };

        if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.position[i] = position;
            self.orientation[i] = orientation;
            self.linear_velocity[i] = Vec3::ZERO;
            self.angular_velocity[i] = Vec3::ZERO;
            self.force_accum[i] = Vec3::ZERO;
            self.torque_accum[i] = Vec3::ZERO;
            self.shape[i] = shape;
            self.material[i] = material;
            self.mass_properties[i] = mass_properties;
            self.aabb_half_extent[i] = aabb_half_extent;
            self.flags[i] = flags;
            self.sleep_timer[i] = 0.0;
            self.live[i] = true;
            idx
        } else {
            self.position.push(position);
            self.orientation.push(orientation);
            self.linear_velocity.push(Vec3::ZERO);
            self.angular_velocity.push(Vec3::ZERO);
            self.force_accum.push(Vec3::ZERO);
            self.torque_accum.push(Vec3::ZERO);
            self.shape.push(shape);
            self.material.push(material);
            self.mass_properties.push(mass_properties);
            self.aabb_half_extent.push(aabb_half_extent);
            self.flags.push(flags);
            self.sleep_timer.push(0.0);
            self.live.push(true);
            (self.position.len() - 1) as u32
        }
    }

    pub fn remove(&mut self, handle: u32) {
        let i = handle as usize;
        crate::invariant!(i < self.live.len() && self.live[i], "remove of a body handle that isn't live");
        self.live[i] = false;
        self.free_list.push(handle);
    }

    pub fn is_live(&self, handle: u32) -> bool {
        (handle as usize) < self.live.len() && self.live[handle as usize]
    }

    /// World-space AABB: rotates the local half-extent by the body's
    /// current orientation and sums the absolute rotated components per
    /// axis, so the box always encloses the shape regardless of rotation.
    pub fn world_aabb(&self, handle: u32) -> (Vec3, Vec3) {
        let i = handle as usize;
        let p = self.position[i];
        let he = self.aabb_half_extent[i];
        let orient = self.orientation[i];
        let rx = orient.rotate_vector(Vec3::new(he.x, 0.0, 0.0)).abs();
        let ry = orient.rotate_vector(Vec3::new(0.0, he.y, 0.0)).abs();
        let rz = orient.rotate_vector(Vec3::new(0.0, 0.0, he.z)).abs();
        let extent = rx.add(ry).add(rz);
        (p.sub(extent), p.add(extent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_mass_properties_match_closed_form() {
        let mp = derive_mass_properties(&Shape::Sphere { radius: 1.0 }, Material { density: 1.0, ..Material::default() });
        let expected_mass = (4.0 / 3.0) * core::f32::consts::PI;
        assert!((mp.mass - expected_mass).abs() < 1e-4);
        assert!(mp.inv_mass > 0.0);
    }

    #[test]
    fn static_shape_has_zero_mass_and_infinite_inertia() {
        let mp = derive_mass_properties(&Shape::Plane { normal: Vec3::UP, offset: 0.0 }, Material::default());
        assert_eq!(mp.mass, 0.0);
        assert_eq!(mp.inv_mass, 0.0);
        assert_eq!(mp.inv_inertia_diag, Vec3::ZERO);
    }

    #[test]
    fn body_set_reuses_freed_indices() {
        let mut bodies = BodySet::new(4);
        let a = bodies.insert(Vec3::ZERO, Quat::IDENTITY, Shape::Sphere { radius: 1.0 }, Material::default(), BodyType::Dynamic);
        let b = bodies.insert(Vec3::ZERO, Quat::IDENTITY, Shape::Sphere { radius: 1.0 }, Material::default(), BodyType::Dynamic);
        bodies.remove(a);
        let c = bodies.insert(Vec3::ZERO, Quat::IDENTITY, Shape::Sphere { radius: 1.0 }, Material::default(), BodyType::Dynamic);
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert!(bodies.is_live(c));
        assert!(!bodies.is_live(a) || a == c);
    }

    #[test]
    fn world_aabb_centers_on_position() {
        let mut bodies = BodySet::new(1);
        let h = bodies.insert(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY, Shape::Box { half_extents: Vec3::new(0.5, 0.5, 0.5) }, Material::default(), BodyType::Dynamic);
        let (lo, hi) = bodies.world_aabb(h);
        assert!((lo.x - 0.5).abs() < 1e-6);
        assert!((hi.x - 1.5).abs() < 1e-6);
    }
}
