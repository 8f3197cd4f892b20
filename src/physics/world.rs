//! `World`: the single entry point that ties bodies, the broad-phase grid,
//! narrow phase, solver, and integrator together into one fixed-step loop,
//! plus the body-lifecycle and query surface external callers drive.

use crate::config::WorldConfig;
use crate::debug::{PhaseTimer, Profiler};
use crate::fault::Saturation;
use crate::math::{Quat, Vec3};
use crate::physics::body::{BodySet, BodyType, Material, Shape, FLAG_AWAKE, FLAG_KINEMATIC, FLAG_STATIC};
use crate::physics::broadphase::SpatialHashGrid;
use crate::physics::integrator::{self, FixedStepAccumulator};
use crate::physics::narrowphase::{self, Contact, Manifold};
use crate::physics::solver::{self, BallSocketJoint, DistanceJoint, HingeJoint, Joint};

pub struct World {
    pub bodies: BodySet,
    grid: SpatialHashGrid,
    config: WorldConfig,
    gravity: Vec3,
    accumulator: FixedStepAccumulator,
    pub profiler: Profiler,
    pairs: Vec<(u32, u32)>,
    manifolds: Vec<Manifold>,
    previous_manifolds: Vec<Manifold>,
    joints: Vec<Joint>,
    stepping: bool,
}

fn body_type_of(flags: u32) -> BodyType {
    if flags & FLAG_STATIC != 0 {
        BodyType::Static
    } else if flags & FLAG_KINEMATIC != 0 {
        BodyType::Kinematic
    } else {
        BodyType::Dynamic
    }
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        World {
            bodies: BodySet::new(config.max_bodies),
            grid: SpatialHashGrid::new(config.cell_size, config.grid_buckets, config.max_bodies_per_cell),
            gravity: config.gravity,
            accumulator: FixedStepAccumulator::new(config.fixed_dt * 8.0),
            profiler: Profiler::new(),
            pairs: Vec::with_capacity(config.max_pairs.min(4096)),
            manifolds: Vec::new(),
            previous_manifolds: Vec::new(),
            joints: Vec::new(),
            stepping: false,
            config,
        }
    }

    /// Drop every body and joint and reset the accumulator and profiler,
    /// keeping the same configuration and allocated capacity.
    pub fn reset(&mut self) {
        self.bodies = BodySet::new(self.config.max_bodies);
        self.accumulator = FixedStepAccumulator::new(self.config.fixed_dt * 8.0);
        self.manifolds.clear();
        self.previous_manifolds.clear();
        self.joints.clear();
        self.profiler = Profiler::new();
    }

    pub fn set_gravity(&mut self, g: Vec3) {
        self.gravity = g;
    }

    pub fn create_body(&mut self, position: Vec3, orientation: Quat, shape: Shape, material: Material, body_type: BodyType) -> u32 {
        self.bodies.insert(position, orientation, shape, material, body_type)
    }

    pub fn destroy_body(&mut self, handle: u32) {
        self.bodies.remove(handle);
    }

    pub fn set_shape(&mut self, handle: u32, shape: Shape) {
        let i = handle as usize;
        let material = self.bodies.material[i];
        let body_type = body_type_of(self.bodies.flags[i]);
        self.bodies.mass_properties[i] = crate::physics::body::mass_properties_for(&shape, material, body_type);
        self.bodies.aabb_half_extent[i] = crate::physics::body::shape_local_aabb_half_extent(&shape);
        self.bodies.shape[i] = shape;
    }

    pub fn set_material(&mut self, handle: u32, material: Material) {
        let i = handle as usize;
        let body_type = body_type_of(self.bodies.flags[i]);
        self.bodies.material[i] = material;
        self.bodies.mass_properties[i] = crate::physics::body::mass_properties_for(&self.bodies.shape[i], material, body_type);
    }

    /// Create a distance joint pinning two anchor points a fixed
    /// `rest_length` apart. `None` (and a recorded `Saturation::Joints`) once
    /// `config.max_joints` is reached; there is no `destroy_joint`, so this
    /// is a lifetime cap on joint creation, not a live-count cap.
    pub fn create_distance_joint(&mut self, body_a: u32, body_b: u32, anchor_a_local: Vec3, anchor_b_local: Vec3, rest_length: f32, bias_factor: f32) -> Option<u32> {
        if self.joints.len() >= self.config.max_joints {
            crate::log_warn!("{}", Saturation::Joints.as_str());
            return None;
        }
        self.joints.push(Joint::Distance(DistanceJoint { body_a, body_b, anchor_a_local, anchor_b_local, rest_length, bias_factor }));
        Some((self.joints.len() - 1) as u32)
    }

    /// Create a ball-socket joint pinning two anchor points together.
    pub fn create_ball_socket_joint(&mut self, body_a: u32, body_b: u32, anchor_a_local: Vec3, anchor_b_local: Vec3, bias_factor: f32) -> Option<u32> {
        if self.joints.len() >= self.config.max_joints {
            crate::log_warn!("{}", Saturation::Joints.as_str());
            return None;
        }
        self.joints.push(Joint::BallSocket(BallSocketJoint { body_a, body_b, anchor_a_local, anchor_b_local, bias_factor }));
        Some((self.joints.len() - 1) as u32)
    }

    /// Create a hinge joint (positional pin plus a free swing axis; the
    /// swing axis is not yet constrained, see `HingeJoint`'s own doc).
    pub fn create_hinge_joint(&mut self, body_a: u32, body_b: u32, anchor_a_local: Vec3, anchor_b_local: Vec3, axis_a_local: Vec3, bias_factor: f32) -> Option<u32> {
        if self.joints.len() >= self.config.max_joints {
            crate::log_warn!("{}", Saturation::Joints.as_str());
            return None;
        }
        self.joints.push(Joint::Hinge(HingeJoint { body_a, body_b, anchor_a_local, anchor_b_local, axis_a_local, bias_factor }));
        Some((self.joints.len() - 1) as u32)
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn set_transform(&mut self, handle: u32, position: Vec3, orientation: Quat) {
        let i = handle as usize;
        self.bodies.position[i] = position;
        self.bodies.orientation[i] = orientation;
    }

    pub fn set_velocity(&mut self, handle: u32, linear: Vec3, angular: Vec3) {
        let i = handle as usize;
        self.bodies.linear_velocity[i] = linear;
        self.bodies.angular_velocity[i] = angular;
    }

    /// Accumulate `force` at `point` into the body's force/torque
    /// accumulators and wake it. Static and kinematic bodies ignore the
    /// call: neither is integrated from forces.
    pub fn apply_force(&mut self, handle: u32, force: Vec3, point: Vec3) {
        let i = handle as usize;
        if self.bodies.flags[i] & (FLAG_STATIC | FLAG_KINEMATIC) != 0 {
            return;
        }
        self.bodies.force_accum[i] = self.bodies.force_accum[i].add(force);
        let r = point.sub(self.bodies.position[i]);
        self.bodies.torque_accum[i] = self.bodies.torque_accum[i].add(r.cross(force));
        integrator::wake_body(&mut self.bodies, handle);
    }

    /// Apply an instantaneous impulse at `point`, mutating velocities
    /// directly, and wake the body. Static bodies ignore the call.
    pub fn apply_impulse(&mut self, handle: u32, impulse: Vec3, point: Vec3) {
        let i = handle as usize;
        let mp = self.bodies.mass_properties[i];
        if mp.inv_mass <= 0.0 {
            return;
        }
        self.bodies.linear_velocity[i] = self.bodies.linear_velocity[i].add(impulse.scale(mp.inv_mass));
        let r = point.sub(self.bodies.position[i]);
        let delta_angular = r.cross(impulse).mul_elem(mp.inv_inertia_diag);
        self.bodies.angular_velocity[i] = self.bodies.angular_velocity[i].add(delta_angular);
        integrator::wake_body(&mut self.bodies, handle);
    }

    pub fn is_static(&self, handle: u32) -> bool {
        self.bodies.flags[handle as usize] & FLAG_STATIC != 0
    }

    pub fn is_kinematic(&self, handle: u32) -> bool {
        self.bodies.flags[handle as usize] & FLAG_KINEMATIC != 0
    }

    pub fn is_sleeping(&self, handle: u32) -> bool {
        self.bodies.is_live(handle) && self.bodies.flags[handle as usize] & FLAG_AWAKE == 0
    }

    /// Advance the simulation by `dt_real`, running as many fixed steps of
    /// `config.fixed_dt` as the accumulator has banked. Re-entrant calls
    /// (from within a callback triggered by this same call) are a fatal
    /// invariant violation.
    pub fn step_simulation(&mut self, dt_real: f32) {
        crate::invariant!(!self.stepping, "re-entrant step_simulation");
        self.stepping = true;
        self.accumulator.accumulate(dt_real);
        while self.accumulator.consume_step(self.config.fixed_dt) {
            self.fixed_step();
        }
        self.stepping = false;
    }

    fn fixed_step(&mut self) {
        self.profiler.begin_step();
        crate::log::advance_step();

        let broad_timer = PhaseTimer::start();
        self.grid.rebuild(&self.bodies);

        let dropped = self.grid.enumerate_pairs(&self.bodies, self.config.max_pairs, &mut self.pairs);
        self.profiler.step_broad_phase_pairs = self.pairs.len() as u32;
        self.profiler.step_pairs_dropped = dropped;
        self.profiler.step_cell_overflows = self.grid.cell_overflow_count;
        if dropped > 0 {
            crate::log_warn!("{}: {} pairs dropped", Saturation::BroadPhasePairs.as_str(), dropped);
        }
        self.profiler.step_broad_phase_nanos = broad_timer.elapsed_nanos();

        let narrow_timer = PhaseTimer::start();
        std::mem::swap(&mut self.manifolds, &mut self.previous_manifolds);
        self.manifolds.clear();
        for &(a, b) in &self.pairs {
            if self.manifolds.len() >= self.config.max_manifolds {
                crate::log_warn!("{}", Saturation::Manifolds.as_str());
                break;
            }
            if let Some(contact) = self.contact_for_pair(a, b) {
                let mut m = Manifold { body_a: a, body_b: b, contacts: Default::default(), contact_count: 1 };
                m.contacts[0] = contact;
                if let Some(prev) = self.previous_manifolds.iter().find(|p| p.body_a == a && p.body_b == b) {
                    m.warm_start_from(prev);
                }
                self.manifolds.push(m);
            }
        }
        self.profiler.step_manifolds = self.manifolds.len() as u32;
        self.profiler.step_narrow_phase_nanos = narrow_timer.elapsed_nanos();

        let integration_timer = PhaseTimer::start();
        integrator::integrate_bodies(&mut self.bodies, self.gravity, self.config.fixed_dt, &self.config);
        self.profiler.step_integration_nanos = integration_timer.elapsed_nanos();

        let solver_timer = PhaseTimer::start();
        solver::solve_constraints(&mut self.bodies, &mut self.manifolds, &self.joints, self.config.fixed_dt, &self.config);
        self.profiler.step_solver_nanos = solver_timer.elapsed_nanos();

        let mut active = 0u32;
        let mut sleeping = 0u32;
        for h in 0..self.bodies.len() as u32 {
            if !self.bodies.is_live(h) {
                continue;
            }
            if self.bodies.flags[h as usize] & FLAG_AWAKE != 0 {
                active += 1;
            } else {
                sleeping += 1;
            }
        }
        self.profiler.step_active_bodies = active;
        self.profiler.step_sleeping_bodies = sleeping;
        self.profiler.end_step();
    }

    fn contact_for_pair(&self, a: u32, b: u32) -> Option<Contact> {
        let (ia, ib) = (a as usize, b as usize);
        narrowphase::generate_contact(
            &self.bodies.shape[ia],
            self.bodies.position[ia],
            self.bodies.orientation[ia],
            &self.bodies.shape[ib],
            self.bodies.position[ib],
            self.bodies.orientation[ib],
            self.config.gjk_max_iterations,
            self.config.epa_max_iterations,
        )
    }

    /// Ray cast against every live body's world AABB via the slab test,
    /// refined to an exact hit for sphere shapes. Returns the closest hit.
    pub fn raycast(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<(u32, Vec3, Vec3)> {
        let dir = dir.normalize();
        let mut candidates = Vec::new();
        self.grid.query_ray_candidates(&self.bodies, origin, dir, max_distance, &mut candidates);

        let mut best: Option<(u32, Vec3, Vec3, f32)> = None;
        for handle in candidates {
            if !self.bodies.is_live(handle) {
                continue;
            }
            let i = handle as usize;
            let hit = match self.bodies.shape[i] {
                Shape::Sphere { radius } => ray_sphere(origin, dir, self.bodies.position[i], radius),
                _ => {
                    let (lo, hi) = self.bodies.world_aabb(handle);
                    ray_aabb(origin, dir, lo, hi)
                }
            };
            if let Some((t, point, normal)) = hit {
                if t <= max_distance && best.map_or(true, |(_, _, _, bt)| t < bt) {
                    best = Some((handle, point, normal, t));
                }
            }
        }
        best.map(|(h, p, n, _)| (h, p, n))
    }

    pub fn overlap_sphere(&self, center: Vec3, radius: f32, out: &mut Vec<u32>, max: usize) -> usize {
        out.clear();
        let lo = center.sub(Vec3::splat(radius));
        let hi = center.add(Vec3::splat(radius));
        let mut candidates = Vec::new();
        self.grid.query_aabb(&self.bodies, lo, hi, &mut candidates);
        for handle in candidates {
            if out.len() >= max {
                break;
            }
            let (blo, bhi) = self.bodies.world_aabb(handle);
            let closest = center.max(blo).min(bhi);
            if closest.sub(center).length() <= radius {
                out.push(handle);
            }
        }
        out.len()
    }

    /// Bodies whose world AABB overlaps an oriented query box. The broad
    /// phase is first queried with a conservative sphere-bounded AABB
    /// (the query box's bounding-sphere radius), then each candidate is
    /// narrowed exactly via separating-axis test against the query box's
    /// own rotated face axes, not just its loose bounding AABB.
    pub fn overlap_box(&self, center: Vec3, half_extents: Vec3, orientation: Quat, out: &mut Vec<u32>, max: usize) -> usize {
        out.clear();
        let bounding_radius = half_extents.length();
        let lo = center.sub(Vec3::splat(bounding_radius));
        let hi = center.add(Vec3::splat(bounding_radius));
        let mut candidates = Vec::new();
        self.grid.query_aabb(&self.bodies, lo, hi, &mut candidates);
        for handle in candidates {
            if out.len() >= max {
                break;
            }
            let (blo, bhi) = self.bodies.world_aabb(handle);
            if obb_vs_aabb_overlap(center, half_extents, orientation, blo, bhi) {
                out.push(handle);
            }
        }
        out.len()
    }
}

/// Separating Axis Theorem test between an oriented box (`center`,
/// `half_extents`, `orientation`) and an axis-aligned box (`aabb_lo`,
/// `aabb_hi`): the 3 AABB face normals, the 3 OBB face normals (the
/// rotated local axes), and their 9 pairwise cross products. No axis
/// separates the two iff they overlap.
fn obb_vs_aabb_overlap(center: Vec3, half_extents: Vec3, orientation: Quat, aabb_lo: Vec3, aabb_hi: Vec3) -> bool {
    let aabb_center = aabb_lo.add(aabb_hi).scale(0.5);
    let aabb_half = aabb_hi.sub(aabb_lo).scale(0.5);
    let t = center.sub(aabb_center);

    let obb_axes = [
        orientation.rotate_vector(Vec3::new(1.0, 0.0, 0.0)),
        orientation.rotate_vector(Vec3::new(0.0, 1.0, 0.0)),
        orientation.rotate_vector(Vec3::new(0.0, 0.0, 1.0)),
    ];
    let aabb_axes = [Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 1.0)];
    let obb_extents = [half_extents.x, half_extents.y, half_extents.z];
    let aabb_extents = [aabb_half.x, aabb_half.y, aabb_half.z];

    let separated_along = |axis: Vec3| -> bool {
        let len = axis.length();
        if len < 1e-8 {
            return false;
        }
        let axis = axis.scale(1.0 / len);
        let dist = t.dot(axis).abs();
        let mut obb_radius = 0.0f32;
        for (i, &a) in obb_axes.iter().enumerate() {
            obb_radius += obb_extents[i] * a.dot(axis).abs();
        }
        let mut aabb_radius = 0.0f32;
        for (i, &a) in aabb_axes.iter().enumerate() {
            aabb_radius += aabb_extents[i] * a.dot(axis).abs();
        }
        dist > obb_radius + aabb_radius
    };

    for &axis in &aabb_axes {
        if separated_along(axis) {
            return false;
        }
    }
    for &axis in &obb_axes {
        if separated_along(axis) {
            return false;
        }
    }
    for &a in &aabb_axes {
        for &b in &obb_axes {
            if separated_along(a.cross(b)) {
                return false;
            }
        }
    }
    true
}

fn ray_sphere(origin: Vec3, dir: Vec3, center: Vec3, radius: f32) -> Option<(f32, Vec3, Vec3)> {
    let oc = origin.sub(center);
    let b = oc.dot(dir);
    let c = oc.dot(oc) - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let t = -b - disc.sqrt();
    if t < 0.0 {
        return None;
    }
    let point = origin.add(dir.scale(t));
    let normal = point.sub(center).normalize();
    Some((t, point, normal))
}

fn ray_aabb(origin: Vec3, dir: Vec3, lo: Vec3, hi: Vec3) -> Option<(f32, Vec3, Vec3)> {
    let mut t_min = 0.0f32;
    let mut t_max = f32::INFINITY;
    let mut normal = Vec3::ZERO;

    let axes = [
        (origin.x, dir.x, lo.x, hi.x, Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)),
        (origin.y, dir.y, lo.y, hi.y, Vec3::new(0.0, -1.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
        (origin.z, dir.z, lo.z, hi.z, Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 0.0, 1.0)),
    ];

    for (o, d, l, h, neg_n, pos_n) in axes {
        if d.abs() < 1e-9 {
            if o < l || o > h {
                return None;
            }
            continue;
        }
        let inv_d = 1.0 / d;
        let mut t0 = (l - o) * inv_d;
        let mut t1 = (h - o) * inv_d;
        let mut axis_normal_near = neg_n;
        if t0 > t1 {
            core::mem::swap(&mut t0, &mut t1);
            axis_normal_near = pos_n;
        }
        if t0 > t_min {
            t_min = t0;
            normal = axis_normal_near;
        }
        t_max = t_max.min(t1);
        if t_min > t_max {
            return None;
        }
    }

    let point = origin.add(dir.scale(t_min));
    Some((t_min, point, normal))
}
