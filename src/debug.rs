//! Read-only introspection: per-step and cumulative profiling counters,
//! and a `DebugView` that bundles borrowed references to a world's bodies,
//! manifolds, and saturation counts for a host's debug overlay. Nothing
//! here mutates simulation state.

use crate::neural::{EwcState, LstmStatePool, Network};
use crate::physics::body::BodySet;
use crate::physics::narrowphase::Manifold;
use std::time::Instant;

/// Profiling counters. `step_*` fields are reset at the start of every
/// fixed step (`begin_step`); `cumulative_*` fields only grow, for the
/// lifetime of the owning world.
#[derive(Debug, Clone, Copy, Default)]
pub struct Profiler {
    pub step_active_bodies: u32,
    pub step_sleeping_bodies: u32,
    pub step_broad_phase_pairs: u32,
    pub step_manifolds: u32,
    pub step_pairs_dropped: u64,
    pub step_cell_overflows: u64,
    pub step_fisher_entries_dropped: u64,
    pub step_broad_phase_nanos: u64,
    pub step_narrow_phase_nanos: u64,
    pub step_solver_nanos: u64,
    pub step_integration_nanos: u64,

    pub cumulative_steps: u64,
    pub cumulative_pairs_dropped: u64,
    pub cumulative_cell_overflows: u64,
    pub cumulative_fisher_entries_dropped: u64,
}

impl Profiler {
    pub fn new() -> Self {
        Profiler::default()
    }

    /// Zero the per-step counters. Called once at the start of every fixed
    /// step, before broad phase runs.
    pub fn begin_step(&mut self) {
        self.step_active_bodies = 0;
        self.step_sleeping_bodies = 0;
        self.step_broad_phase_pairs = 0;
        self.step_manifolds = 0;
        self.step_pairs_dropped = 0;
        self.step_cell_overflows = 0;
        self.step_fisher_entries_dropped = 0;
        self.step_broad_phase_nanos = 0;
        self.step_narrow_phase_nanos = 0;
        self.step_solver_nanos = 0;
        self.step_integration_nanos = 0;
    }

    /// Fold this step's drop counters into the cumulative totals and
    /// advance the step count. Called once at the end of every fixed step.
    pub fn end_step(&mut self) {
        self.cumulative_steps += 1;
        self.cumulative_pairs_dropped += self.step_pairs_dropped;
        self.cumulative_cell_overflows += self.step_cell_overflows;
        self.cumulative_fisher_entries_dropped += self.step_fisher_entries_dropped;
    }
}

/// Wall-clock stopwatch for one profiling phase within a fixed step. Never
/// read by the simulation itself, so it has no bearing on determinism —
/// only `Profiler`'s `step_*_nanos` fields, which a host may log or graph.
pub struct PhaseTimer {
    start: Instant,
}

impl PhaseTimer {
    pub fn start() -> Self {
        PhaseTimer { start: Instant::now() }
    }

    pub fn elapsed_nanos(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}

/// Borrowed read-only snapshot of a world's bodies and manifolds, for a
/// host debug overlay. Never constructed by the world itself; callers
/// build one on demand from whatever they're holding.
pub struct DebugView<'a> {
    pub bodies: &'a BodySet,
    pub manifolds: &'a [Manifold],
    pub profiler: &'a Profiler,
}

impl<'a> DebugView<'a> {
    pub fn new(bodies: &'a BodySet, manifolds: &'a [Manifold], profiler: &'a Profiler) -> Self {
        DebugView { bodies, manifolds, profiler }
    }

    pub fn active_body_count(&self) -> usize {
        (0..self.bodies.len() as u32).filter(|&h| self.bodies.is_live(h)).count()
    }

    pub fn manifold_count(&self) -> usize {
        self.manifolds.len()
    }

    pub fn total_contact_count(&self) -> usize {
        self.manifolds.iter().map(|m| m.contact_count).sum()
    }
}

/// Borrowed read-only view onto a `Network`'s layer activations from its
/// last `forward` call. Host-constructed, same idiom as `DebugView`.
pub struct NetworkView<'a> {
    network: &'a Network,
}

impl<'a> NetworkView<'a> {
    pub fn new(network: &'a Network) -> Self {
        NetworkView { network }
    }

    pub fn layer_count(&self) -> usize {
        self.network.layers.len()
    }

    /// Activated outputs of `layer` from the last `forward` call.
    pub fn layer_activations(&self, layer: usize) -> &'a [f32] {
        self.network.layer_output(layer)
    }
}

/// Borrowed read-only view onto one agent's pooled LSTM recurrent state.
pub struct LstmView<'a> {
    pool: &'a LstmStatePool,
    slot: usize,
}

impl<'a> LstmView<'a> {
    pub fn new(pool: &'a LstmStatePool, slot: usize) -> Self {
        LstmView { pool, slot }
    }

    pub fn hidden_state(&self) -> &'a [f32] {
        self.pool.hidden_state(self.slot)
    }

    pub fn cell_state(&self) -> &'a [f32] {
        self.pool.cell_state(self.slot)
    }
}

/// Borrowed read-only view onto a completed EWC task's sparse Fisher
/// matrix.
pub struct EwcView<'a> {
    ewc: &'a EwcState,
    slot: usize,
}

impl<'a> EwcView<'a> {
    pub fn new(ewc: &'a EwcState, slot: usize) -> Self {
        EwcView { ewc, slot }
    }

    /// `(parameter_index, value)` pairs of the task's sparse diagonal
    /// Fisher matrix.
    pub fn fisher_entries(&self) -> &'a [(u32, f32)] {
        self.ewc.task_fisher(self.slot)
    }

    pub fn theta_star(&self) -> &'a [f32] {
        self.ewc.task_theta_star(self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EwcConfig;
    use crate::math::{Quat, Vec3};
    use crate::physics::body::{BodyType, Material, Shape};
    use crate::rng::Xorshift64;

    #[test]
    fn begin_step_resets_only_step_counters() {
        let mut p = Profiler::new();
        p.step_broad_phase_pairs = 10;
        p.cumulative_pairs_dropped = 5;
        p.begin_step();
        assert_eq!(p.step_broad_phase_pairs, 0);
        assert_eq!(p.cumulative_pairs_dropped, 5);
    }

    #[test]
    fn end_step_accumulates_drops_and_advances_step_count() {
        let mut p = Profiler::new();
        p.begin_step();
        p.step_pairs_dropped = 3;
        p.step_cell_overflows = 1;
        p.end_step();
        assert_eq!(p.cumulative_steps, 1);
        assert_eq!(p.cumulative_pairs_dropped, 3);
        assert_eq!(p.cumulative_cell_overflows, 1);
    }

    #[test]
    fn debug_view_counts_live_bodies_and_contacts() {
        let mut bodies = BodySet::new(2);
        bodies.insert(Vec3::ZERO, Quat::IDENTITY, Shape::Sphere { radius: 1.0 }, Material::default(), BodyType::Dynamic);
        let profiler = Profiler::new();
        let manifolds: Vec<Manifold> = Vec::new();
        let view = DebugView::new(&bodies, &manifolds, &profiler);
        assert_eq!(view.active_body_count(), 1);
        assert_eq!(view.manifold_count(), 0);
        assert_eq!(view.total_contact_count(), 0);
    }

    #[test]
    fn phase_timer_reports_nonzero_elapsed_after_work() {
        let timer = PhaseTimer::start();
        let mut acc = 0u64;
        for i in 0..100_000u64 {
            acc = acc.wrapping_add(i);
        }
        core::hint::black_box(acc);
        assert!(timer.elapsed_nanos() > 0);
    }

    #[test]
    fn network_view_exposes_last_forward_activations() {
        let mut rng = Xorshift64::new(1);
        let mut net = Network::init_network(3, 4, 4, 2, false, 0.01, &mut rng);
        let mut out = vec![0.0; 2];
        net.forward(&[0.1, 0.2, 0.3], &mut out);

        let view = NetworkView::new(&net);
        assert_eq!(view.layer_count(), 3);
        assert_eq!(view.layer_activations(2), out.as_slice());
    }

    #[test]
    fn lstm_view_exposes_pooled_hidden_and_cell_state() {
        let mut pool = LstmStatePool::new(4, 1);
        let slot = pool.allocate().unwrap();
        let view = LstmView::new(&pool, slot);
        assert_eq!(view.hidden_state().len(), 4);
        assert_eq!(view.cell_state().len(), 4);
        assert!(view.hidden_state().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn ewc_view_exposes_completed_task_fisher_entries() {
        let config = EwcConfig { parameter_count: 2, max_tasks: 1, ..EwcConfig::default() };
        let mut ewc = EwcState::new(config);
        let slot = ewc.start_task("a").unwrap();
        ewc.accumulate_fisher_sample(slot, &[1.0, 0.0]);
        ewc.complete_task(slot, &[0.5, 0.5]);

        let view = EwcView::new(&ewc, slot);
        assert_eq!(view.fisher_entries().len(), 1);
        assert_eq!(view.theta_star(), &[0.5, 0.5]);
    }
}
