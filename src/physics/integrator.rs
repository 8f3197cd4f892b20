//! Fixed-step accumulator, semi-implicit Euler integration, and the sleep
//! state machine. No wall-clock reads: the accumulator advances only by
//! the `dt_real` the caller hands it.

use crate::config::WorldConfig;
use crate::math::{self, Vec3};
use crate::physics::body::{BodySet, FLAG_AWAKE, FLAG_KINEMATIC, FLAG_STATIC};

/// Accumulates variable-rate `dt_real` and releases zero or more fixed
/// steps of `fixed_dt`, so the simulation always advances in uniform,
/// deterministic increments regardless of how often the caller polls it.
pub struct FixedStepAccumulator {
    accumulator: f32,
    /// Hard ceiling on accumulated time, so a long pause (debugger, a
    /// stalled frame) doesn't demand an unbounded burst of catch-up steps.
    max_accumulated: f32,
}

impl FixedStepAccumulator {
    pub fn new(max_accumulated: f32) -> Self {
        FixedStepAccumulator { accumulator: 0.0, max_accumulated }
    }

    pub fn accumulate(&mut self, dt_real: f32) {
        self.accumulator = (self.accumulator + dt_real.max(0.0)).min(self.max_accumulated);
    }

    /// Consume one `fixed_dt` slice if available.
    pub fn consume_step(&mut self, fixed_dt: f32) -> bool {
        if self.accumulator >= fixed_dt {
            self.accumulator -= fixed_dt;
            true
        } else {
            false
        }
    }

    pub fn pending(&self) -> f32 {
        self.accumulator
    }
}

/// Apply accumulated forces/torques and gravity with semi-implicit Euler
/// (velocity updates first, positions from the updated velocity), damp,
/// integrate orientation, then clear the force/torque accumulators and run
/// the sleep state machine. Static bodies are skipped entirely; kinematic
/// bodies advance position/orientation from their externally-set velocity
/// but take no gravity, forces, damping, or sleep; asleep dynamic bodies
/// are skipped.
pub fn integrate_bodies(bodies: &mut BodySet, gravity: Vec3, dt: f32, config: &WorldConfig) {
    for i in 0..bodies.len() {
        if !bodies_is_live_index(bodies, i) {
            continue;
        }
        let flags = bodies.flags[i];
        if flags & FLAG_STATIC != 0 {
            continue;
        }
        if flags & FLAG_KINEMATIC != 0 {
            let v = bodies.linear_velocity[i];
            bodies.position[i] = bodies.position[i].add(v.scale(dt));
            let w = bodies.angular_velocity[i];
            bodies.orientation[i] = bodies.orientation[i].integrate(w, dt);
            continue;
        }
        if flags & FLAG_AWAKE == 0 {
            continue;
        }

        let mp = bodies.mass_properties[i];
        let linear_accel = bodies.force_accum[i].scale(mp.inv_mass).add(gravity);
        let mut v = bodies.linear_velocity[i].add(linear_accel.scale(dt));
        v = v.scale(1.0 / (1.0 + bodies.material[i].linear_damping * dt));
        bodies.linear_velocity[i] = v;
        bodies.position[i] = bodies.position[i].add(v.scale(dt));

        let angular_accel = bodies.torque_accum[i].mul_elem(mp.inv_inertia_diag);
        let mut w = bodies.angular_velocity[i].add(angular_accel.scale(dt));
        w = w.scale(1.0 / (1.0 + bodies.material[i].angular_damping * dt));
        bodies.angular_velocity[i] = w;
        bodies.orientation[i] = bodies.orientation[i].integrate(w, dt);

        bodies.force_accum[i] = Vec3::ZERO;
        bodies.torque_accum[i] = Vec3::ZERO;

        update_sleep_state(bodies, i, dt, config);
    }
}

fn bodies_is_live_index(bodies: &BodySet, i: usize) -> bool {
    bodies.is_live(i as u32)
}

fn update_sleep_state(bodies: &mut BodySet, i: usize, dt: f32, config: &WorldConfig) {
    let below_threshold = bodies.linear_velocity[i].length() < config.sleep_linear_threshold
        && bodies.angular_velocity[i].length() < config.sleep_angular_threshold;

    if below_threshold {
        bodies.sleep_timer[i] = math::approach(bodies.sleep_timer[i], config.sleep_time, dt, 0.0);
        if bodies.sleep_timer[i] >= config.sleep_time {
            bodies.flags[i] &= !FLAG_AWAKE;
            bodies.linear_velocity[i] = Vec3::ZERO;
            bodies.angular_velocity[i] = Vec3::ZERO;
        }
    } else {
        bodies.sleep_timer[i] = 0.0;
    }
}

/// Force a body awake and reset its sleep timer. Called by the solver or
/// by external forces touching a sleeping body.
pub fn wake_body(bodies: &mut BodySet, handle: u32) {
    let i = handle as usize;
    bodies.flags[i] |= FLAG_AWAKE;
    bodies.sleep_timer[i] = 0.0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Quat;
    use crate::physics::body::{BodyType, Material, Shape};

    #[test]
    fn gravity_accelerates_dynamic_body_downward() {
        let mut bodies = BodySet::new(1);
        bodies.insert(Vec3::ZERO, Quat::IDENTITY, Shape::Sphere { radius: 1.0 }, Material { linear_damping: 0.0, ..Material::default() }, BodyType::Dynamic);
        let config = WorldConfig::default();
        integrate_bodies(&mut bodies, config.gravity, config.fixed_dt, &config);
        assert!(bodies.linear_velocity[0].y < 0.0);
    }

    #[test]
    fn static_body_never_moves() {
        let mut bodies = BodySet::new(1);
        bodies.insert(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY, Shape::Sphere { radius: 1.0 }, Material::default(), BodyType::Static);
        let config = WorldConfig::default();
        integrate_bodies(&mut bodies, config.gravity, config.fixed_dt, &config);
        assert_eq!(bodies.position[0], Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(bodies.linear_velocity[0], Vec3::ZERO);
    }

    #[test]
    fn body_under_thresholds_falls_asleep_after_sleep_time() {
        let mut bodies = BodySet::new(1);
        bodies.insert(Vec3::ZERO, Quat::IDENTITY, Shape::Sphere { radius: 1.0 }, Material::default(), BodyType::Dynamic);
        let mut config = WorldConfig::default();
        config.gravity = Vec3::ZERO;
        config.sleep_time = 0.1;
        for _ in 0..20 {
            integrate_bodies(&mut bodies, config.gravity, config.fixed_dt, &config);
        }
        assert_eq!(bodies.flags[0] & FLAG_AWAKE, 0);
    }

    #[test]
    fn kinematic_body_advances_by_velocity_and_ignores_gravity() {
        let mut bodies = BodySet::new(1);
        let h = bodies.insert(Vec3::ZERO, Quat::IDENTITY, Shape::Sphere { radius: 1.0 }, Material::default(), BodyType::Kinematic);
        bodies.linear_velocity[h as usize] = Vec3::new(0.0, 1.0, 0.0);
        let config = WorldConfig::default();
        for _ in 0..60 {
            integrate_bodies(&mut bodies, config.gravity, config.fixed_dt, &config);
        }
        let y = bodies.position[h as usize].y;
        assert!((y - 1.0).abs() < 1e-3, "kinematic body should advance by v*dt each step: y={y}");
        assert_eq!(bodies.linear_velocity[h as usize], Vec3::new(0.0, 1.0, 0.0), "gravity must not perturb a kinematic body's velocity");
    }

    #[test]
    fn accumulator_releases_exactly_the_available_fixed_steps() {
        let mut acc = FixedStepAccumulator::new(1.0);
        acc.accumulate(1.0 / 30.0);
        let mut steps = 0;
        while acc.consume_step(1.0 / 60.0) {
            steps += 1;
        }
        assert_eq!(steps, 2);
    }

    #[test]
    fn accumulator_clamps_runaway_pauses() {
        let mut acc = FixedStepAccumulator::new(0.5);
        acc.accumulate(10.0);
        assert!(acc.pending() <= 0.5 + 1e-6);
    }
}
