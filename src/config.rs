//! Configuration structs: small parameter structs rather than a
//! config-file crate. Every `create_*`/`init_*` entry point takes one of
//! these (or `Default::default()`).

use crate::math::Vec3;

/// World-level tunables: timestep, solver, broad-phase, and narrow-phase
/// limits.
#[derive(Debug, Clone, Copy)]
pub struct WorldConfig {
    pub gravity: Vec3,
    /// Fixed timestep, seconds. Default 1/60.
    pub fixed_dt: f32,
    /// Sequential-impulse solver iteration count.
    pub solver_iterations: u32,
    /// Baumgarte stabilization factor.
    pub baumgarte_beta: f32,
    /// Allowed penetration slop, meters.
    pub slop: f32,
    /// Minimum inbound relative speed to apply a restitution bias.
    pub restitution_velocity_threshold: f32,
    /// Linear speed below which a body is a sleep candidate.
    pub sleep_linear_threshold: f32,
    /// Angular speed below which a body is a sleep candidate.
    pub sleep_angular_threshold: f32,
    /// Seconds below both thresholds before a body actually sleeps.
    pub sleep_time: f32,
    /// Spatial hash grid cell size, meters.
    pub cell_size: f32,
    /// Spatial hash table size; must be a power of two.
    pub grid_buckets: u32,
    /// Max bodies per cell bucket list.
    pub max_bodies_per_cell: usize,
    /// Max bodies in the world.
    pub max_bodies: usize,
    /// Max broad-phase pairs enumerated per step.
    pub max_pairs: usize,
    /// Max contact manifolds per step.
    pub max_manifolds: usize,
    /// Max joints a world can hold. There is no `destroy_joint`, so this
    /// is also the lifetime cap on joint creation.
    pub max_joints: usize,
    /// Max GJK iterations before declaring no-overlap.
    pub gjk_max_iterations: u32,
    /// Max EPA iterations before returning the best-so-far face.
    pub epa_max_iterations: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            fixed_dt: 1.0 / 60.0,
            solver_iterations: 10,
            baumgarte_beta: 0.2,
            slop: 0.01,
            restitution_velocity_threshold: 1.0,
            sleep_linear_threshold: 0.05,
            sleep_angular_threshold: 0.05,
            sleep_time: 1.0,
            cell_size: 2.0,
            grid_buckets: 4096,
            max_bodies_per_cell: 64,
            max_bodies: 10_000,
            max_pairs: 65_536,
            max_manifolds: 16_384,
            max_joints: 4_096,
            gjk_max_iterations: 32,
            epa_max_iterations: 32,
        }
    }
}

/// Dense-network tunables.
#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    pub learning_rate: f32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig { learning_rate: 0.01 }
    }
}

/// LSTM pool tunables.
#[derive(Debug, Clone, Copy)]
pub struct LstmConfig {
    pub input_size: usize,
    pub hidden_size: usize,
    pub max_agents: usize,
}

/// EWC tunables.
#[derive(Debug, Clone, Copy)]
pub struct EwcConfig {
    pub parameter_count: usize,
    pub max_tasks: usize,
    pub max_fisher_entries: usize,
    pub fisher_sparsity_threshold: f32,
    pub lambda_min: f32,
    pub lambda_max: f32,
    pub lambda_initial: f32,
    /// Multiplicative adjustment factor for `update_lambda`.
    pub lambda_adjust_factor: f32,
    /// Margin beyond which a validation-loss change triggers adjustment.
    pub lambda_margin: f32,
}

impl Default for EwcConfig {
    fn default() -> Self {
        EwcConfig {
            parameter_count: 0,
            max_tasks: 16,
            max_fisher_entries: 1 << 20,
            fisher_sparsity_threshold: 1e-6,
            lambda_min: 0.1,
            lambda_max: 100.0,
            lambda_initial: 1.0,
            lambda_adjust_factor: 1.1,
            lambda_margin: 1e-4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_config_defaults_are_sane() {
        let c = WorldConfig::default();
        assert!((c.fixed_dt - 1.0 / 60.0).abs() < 1e-9);
        assert_eq!(c.solver_iterations, 10);
        assert!((c.baumgarte_beta - 0.2).abs() < 1e-9);
        assert!((c.slop - 0.01).abs() < 1e-9);
        assert!(c.grid_buckets.is_power_of_two());
    }

    #[test]
    fn ewc_lambda_bounds_are_ordered() {
        let c = EwcConfig::default();
        assert!(c.lambda_min < c.lambda_max);
        assert!(c.lambda_initial >= c.lambda_min && c.lambda_initial <= c.lambda_max);
    }
}
