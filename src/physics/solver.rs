//! Sequential-impulse constraint solver: contacts (Baumgarte-stabilized
//! normal impulses, restitution bias, Coulomb friction cone) and simple
//! joints, all resolved in Gauss-Seidel sweeps over the same accumulated
//! impulse each iteration.

use crate::config::WorldConfig;
use crate::math::Vec3;
use crate::physics::body::BodySet;
use crate::physics::narrowphase::Manifold;

/// Two vectors orthogonal to `n` and to each other, for the friction cone.
fn tangent_basis(n: Vec3) -> (Vec3, Vec3) {
    let helper = if n.x.abs() < 0.9 { Vec3::new(1.0, 0.0, 0.0) } else { Vec3::new(0.0, 1.0, 0.0) };
    let t1 = helper.cross(n).normalize();
    let t2 = n.cross(t1);
    (t1, t2)
}

fn point_velocity(bodies: &BodySet, handle: u32, point: Vec3) -> Vec3 {
    let i = handle as usize;
    let r = point.sub(bodies.position[i]);
    bodies.linear_velocity[i].add(bodies.angular_velocity[i].cross(r))
}

/// `inv_mass + dot(r x axis, inv_inertia * (r x axis))` for the given body,
/// the denominator of an impulse solved along `axis` applied at `point`.
fn effective_mass_term(bodies: &BodySet, handle: u32, point: Vec3, axis: Vec3) -> f32 {
    let i = handle as usize;
    let inv_mass = bodies.mass_properties[i].inv_mass;
    let r = point.sub(bodies.position[i]);
    let rxn = r.cross(axis);
    let inv_i = bodies.mass_properties[i].inv_inertia_diag;
    let angular = rxn.mul_elem(inv_i).dot(rxn);
    inv_mass + angular
}

fn apply_impulse(bodies: &mut BodySet, handle: u32, point: Vec3, impulse: Vec3) {
    let i = handle as usize;
    let inv_mass = bodies.mass_properties[i].inv_mass;
    if inv_mass <= 0.0 {
        return;
    }
    bodies.linear_velocity[i] = bodies.linear_velocity[i].add(impulse.scale(inv_mass));
    let r = point.sub(bodies.position[i]);
    let inv_i = bodies.mass_properties[i].inv_inertia_diag;
    let delta_angular = r.cross(impulse).mul_elem(inv_i);
    bodies.angular_velocity[i] = bodies.angular_velocity[i].add(delta_angular);
}

/// One Gauss-Seidel sweep over every manifold's contacts, mutating body
/// velocities in place. Manifolds must already carry warm-started
/// `normal_impulse`/`tangent_impulse` values.
fn solve_contacts_pass(bodies: &mut BodySet, manifolds: &mut [Manifold], dt: f32, config: &WorldConfig) {
    for m in manifolds.iter_mut() {
        let (a, b) = (m.body_a, m.body_b);
        for c in m.contacts[..m.contact_count].iter_mut() {
            let n = c.normal;
            let k_normal = effective_mass_term(bodies, a, c.point, n) + effective_mass_term(bodies, b, c.point, n);
            if k_normal <= 1e-9 {
                continue;
            }

            let rel_vel = point_velocity(bodies, b, c.point).sub(point_velocity(bodies, a, c.point));
            let vn = rel_vel.dot(n);

            let penetration_excess = (c.penetration - config.slop).max(0.0);
            let bias = config.baumgarte_beta / dt.max(1e-6) * penetration_excess;

            let restitution = if -vn > config.restitution_velocity_threshold {
                let material_a = bodies.material[a as usize];
                let material_b = bodies.material[b as usize];
                let combined_restitution = 0.5 * (material_a.restitution + material_b.restitution);
                combined_restitution * (-vn)
            } else {
                0.0
            };

            let target = bias + restitution;
            let mut delta = -(vn - target) / k_normal;
            let new_impulse = (c.normal_impulse + delta).max(0.0);
            delta = new_impulse - c.normal_impulse;
            c.normal_impulse = new_impulse;

            let impulse_vec = n.scale(delta);
            apply_impulse(bodies, a, c.point, impulse_vec.neg());
            apply_impulse(bodies, b, c.point, impulse_vec);

            let (t1, t2) = tangent_basis(n);
            let combined_friction = (bodies.material[a as usize].friction.max(0.0) * bodies.material[b as usize].friction.max(0.0)).sqrt();
            let max_friction = combined_friction * c.normal_impulse;

            for (axis, idx) in [(t1, 0usize), (t2, 1usize)] {
                let k_t = effective_mass_term(bodies, a, c.point, axis) + effective_mass_term(bodies, b, c.point, axis);
                if k_t <= 1e-9 {
                    continue;
                }
                let rel_vel_t = point_velocity(bodies, b, c.point).sub(point_velocity(bodies, a, c.point));
                let vt = rel_vel_t.dot(axis);
                let mut dt_impulse = -vt / k_t;
                let new_t = (c.tangent_impulse[idx] + dt_impulse).clamp(-max_friction, max_friction);
                dt_impulse = new_t - c.tangent_impulse[idx];
                c.tangent_impulse[idx] = new_t;

                let impulse_t = axis.scale(dt_impulse);
                apply_impulse(bodies, a, c.point, impulse_t.neg());
                apply_impulse(bodies, b, c.point, impulse_t);
            }
        }
    }
}

/// Solve every manifold's contacts for `config.solver_iterations`
/// Gauss-Seidel sweeps. Equivalent to `solve_constraints` with an empty
/// joint list.
pub fn solve_contacts(bodies: &mut BodySet, manifolds: &mut [Manifold], dt: f32, config: &WorldConfig) {
    for _ in 0..config.solver_iterations {
        solve_contacts_pass(bodies, manifolds, dt, config);
    }
}

/// Solve contacts and joints together in the same iterative Gauss-Seidel
/// pass: each of `config.solver_iterations` sweeps resolves every
/// manifold's contacts, then every joint, against the velocities the
/// previous sub-step in the same sweep just produced.
pub fn solve_constraints(bodies: &mut BodySet, manifolds: &mut [Manifold], joints: &[Joint], dt: f32, config: &WorldConfig) {
    for _ in 0..config.solver_iterations {
        solve_contacts_pass(bodies, manifolds, dt, config);
        for joint in joints {
            joint.solve(bodies, dt);
        }
    }
}

/// Distance constraint: keeps `body_a`'s and `body_b`'s anchor points a
/// fixed `rest_length` apart. Iterated in the same Gauss-Seidel pass as
/// contacts.
pub struct DistanceJoint {
    pub body_a: u32,
    pub body_b: u32,
    pub anchor_a_local: Vec3,
    pub anchor_b_local: Vec3,
    pub rest_length: f32,
    pub bias_factor: f32,
}

/// Ball-socket joint: `body_a`'s and `body_b`'s anchor points are pinned
/// together (equivalent to a zero-rest-length `DistanceJoint` solved on
/// all three axes at once, rather than a single scalar constraint).
pub struct BallSocketJoint {
    pub body_a: u32,
    pub body_b: u32,
    pub anchor_a_local: Vec3,
    pub anchor_b_local: Vec3,
    pub bias_factor: f32,
}

/// Hinge joint scaffold: a ball-socket pin plus a free swing axis. Angular
/// limit/motor constraints are not yet implemented; only the positional
/// pin is solved.
pub struct HingeJoint {
    pub body_a: u32,
    pub body_b: u32,
    pub anchor_a_local: Vec3,
    pub anchor_b_local: Vec3,
    pub axis_a_local: Vec3,
    pub bias_factor: f32,
}

/// One of the three joint kinds, dispatched together with contacts in
/// `solve_constraints`'s Gauss-Seidel sweep.
pub enum Joint {
    Distance(DistanceJoint),
    BallSocket(BallSocketJoint),
    Hinge(HingeJoint),
}

impl Joint {
    pub fn solve(&self, bodies: &mut BodySet, dt: f32) {
        match self {
            Joint::Distance(j) => j.solve(bodies, dt),
            Joint::BallSocket(j) => j.solve(bodies, dt),
            Joint::Hinge(j) => j.solve(bodies, dt),
        }
    }
}

fn world_anchor(bodies: &BodySet, handle: u32, local: Vec3) -> Vec3 {
    let i = handle as usize;
    bodies.position[i].add(bodies.orientation[i].rotate_vector(local))
}

fn solve_point_constraint(bodies: &mut BodySet, a: u32, b: u32, anchor_a: Vec3, anchor_b: Vec3, bias_factor: f32, dt: f32) {
    let delta = anchor_b.sub(anchor_a);
    let axes = [Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, 1.0)];
    for axis in axes {
        let k = effective_mass_term(bodies, a, anchor_a, axis) + effective_mass_term(bodies, b, anchor_b, axis);
        if k <= 1e-9 {
            continue;
        }
        let rel_vel = point_velocity(bodies, b, anchor_b).sub(point_velocity(bodies, a, anchor_a));
        let bias = (bias_factor / dt.max(1e-6)) * delta.dot(axis);
        let lambda = -(rel_vel.dot(axis) + bias) / k;
        let impulse = axis.scale(lambda);
        apply_impulse(bodies, a, anchor_a, impulse.neg());
        apply_impulse(bodies, b, anchor_b, impulse);
    }
}

impl DistanceJoint {
    pub fn solve(&self, bodies: &mut BodySet, dt: f32) {
        let anchor_a = world_anchor(bodies, self.body_a, self.anchor_a_local);
        let anchor_b = world_anchor(bodies, self.body_b, self.anchor_b_local);
        let delta = anchor_b.sub(anchor_a);
        let dist = delta.length();
        let n = if dist > 1e-6 { delta.scale(1.0 / dist) } else { Vec3::UP };

        let k = effective_mass_term(bodies, self.body_a, anchor_a, n) + effective_mass_term(bodies, self.body_b, anchor_b, n);
        if k <= 1e-9 {
            return;
        }
        let rel_vel = point_velocity(bodies, self.body_b, anchor_b).sub(point_velocity(bodies, self.body_a, anchor_a));
        let c = dist - self.rest_length;
        let bias = (self.bias_factor / dt.max(1e-6)) * c;
        let lambda = -(rel_vel.dot(n) + bias) / k;
        let impulse = n.scale(lambda);
        apply_impulse(bodies, self.body_a, anchor_a, impulse.neg());
        apply_impulse(bodies, self.body_b, anchor_b, impulse);
    }
}

impl BallSocketJoint {
    pub fn solve(&self, bodies: &mut BodySet, dt: f32) {
        let anchor_a = world_anchor(bodies, self.body_a, self.anchor_a_local);
        let anchor_b = world_anchor(bodies, self.body_b, self.anchor_b_local);
        solve_point_constraint(bodies, self.body_a, self.body_b, anchor_a, anchor_b, self.bias_factor, dt);
    }
}

impl HingeJoint {
    pub fn solve(&self, bodies: &mut BodySet, dt: f32) {
        let anchor_a = world_anchor(bodies, self.body_a, self.anchor_a_local);
        let anchor_b = world_anchor(bodies, self.body_b, self.anchor_b_local);
        solve_point_constraint(bodies, self.body_a, self.body_b, anchor_a, anchor_b, self.bias_factor, dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Quat;
    use crate::physics::body::{BodyType, Material, Shape};
    use crate::physics::narrowphase::Contact;

    fn two_body_manifold(bodies: &mut BodySet, penetration: f32) -> Manifold {
        let a = bodies.insert(Vec3::new(0.0, 0.0, 0.0), Quat::IDENTITY, Shape::Sphere { radius: 1.0 }, Material::default(), BodyType::Static);
        let b = bodies.insert(Vec3::new(0.0, 1.9, 0.0), Quat::IDENTITY, Shape::Sphere { radius: 1.0 }, Material::default(), BodyType::Dynamic);
        let mut m = Manifold { body_a: a, body_b: b, contacts: Default::default(), contact_count: 1 };
        m.contacts[0] = Contact {
            point: Vec3::new(0.0, 0.95, 0.0),
            normal: Vec3::UP,
            penetration,
            normal_impulse: 0.0,
            tangent_impulse: [0.0, 0.0],
        };
        m
    }

    #[test]
    fn resting_contact_stops_downward_penetration_velocity() {
        let mut bodies = BodySet::new(2);
        let mut m = two_body_manifold(&mut bodies, 0.1);
        bodies.linear_velocity[m.body_b as usize] = Vec3::new(0.0, -2.0, 0.0);
        let config = WorldConfig::default();
        solve_contacts(&mut bodies, core::slice::from_mut(&mut m), config.fixed_dt, &config);
        assert!(bodies.linear_velocity[m.body_b as usize].y > -2.0);
    }

    #[test]
    fn static_body_is_unaffected_by_impulses() {
        let mut bodies = BodySet::new(2);
        let mut m = two_body_manifold(&mut bodies, 0.1);
        bodies.linear_velocity[m.body_b as usize] = Vec3::new(0.0, -2.0, 0.0);
        let config = WorldConfig::default();
        solve_contacts(&mut bodies, core::slice::from_mut(&mut m), config.fixed_dt, &config);
        assert_eq!(bodies.linear_velocity[m.body_a as usize], Vec3::ZERO);
    }

    #[test]
    fn distance_joint_pulls_bodies_toward_rest_length() {
        let mut bodies = BodySet::new(2);
        let a = bodies.insert(Vec3::ZERO, Quat::IDENTITY, Shape::Sphere { radius: 0.5 }, Material::default(), BodyType::Static);
        let b = bodies.insert(Vec3::new(3.0, 0.0, 0.0), Quat::IDENTITY, Shape::Sphere { radius: 0.5 }, Material::default(), BodyType::Dynamic);
        let joint = DistanceJoint { body_a: a, body_b: b, anchor_a_local: Vec3::ZERO, anchor_b_local: Vec3::ZERO, rest_length: 1.0, bias_factor: 0.2 };
        for _ in 0..20 {
            joint.solve(&mut bodies, 1.0 / 60.0);
        }
        assert!(bodies.linear_velocity[b as usize].x < 0.0);
    }

    #[test]
    fn solve_constraints_solves_joints_alongside_contacts() {
        let mut bodies = BodySet::new(2);
        let mut m = two_body_manifold(&mut bodies, 0.1);
        bodies.linear_velocity[m.body_b as usize] = Vec3::new(0.0, -2.0, 0.0);
        let a = bodies.insert(Vec3::ZERO, Quat::IDENTITY, Shape::Sphere { radius: 0.5 }, Material::default(), BodyType::Static);
        let b = bodies.insert(Vec3::new(3.0, 0.0, 0.0), Quat::IDENTITY, Shape::Sphere { radius: 0.5 }, Material::default(), BodyType::Dynamic);
        let joints = [Joint::Distance(DistanceJoint { body_a: a, body_b: b, anchor_a_local: Vec3::ZERO, anchor_b_local: Vec3::ZERO, rest_length: 1.0, bias_factor: 0.2 })];

        let config = WorldConfig::default();
        for _ in 0..20 {
            solve_constraints(&mut bodies, core::slice::from_mut(&mut m), &joints, config.fixed_dt, &config);
        }

        assert!(bodies.linear_velocity[m.body_b as usize].y > -2.0, "contacts should still be solved");
        assert!(bodies.linear_velocity[b as usize].x < 0.0, "joints should also be solved in the same pass");
    }
}
