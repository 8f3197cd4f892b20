//! LSTM core with a single shared, read-only cell and a pool of per-agent
//! recurrent state (`c`, `h`). Many agents run through the same weights;
//! only their hidden/cell vectors differ, so the pool holds exactly that
//! and nothing else — no agent owns a copy of the weights.

use super::linalg;
use super::simd;
use crate::config::LstmConfig;
use crate::rng::Xorshift64;

/// Gate order within the fused `4 * hidden_size` buffers: input, forget,
/// cell-candidate, output.
const GATE_COUNT: usize = 4;

pub struct LstmCell {
    pub input_size: usize,
    pub hidden_size: usize,
    /// `[4*hidden, input]` row-major.
    pub w_ih: Vec<f32>,
    /// `[4*hidden, hidden]` row-major.
    pub w_hh: Vec<f32>,
    pub bias: Vec<f32>,
}

impl LstmCell {
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut Xorshift64) -> Self {
        let scale = 1.0 / (input_size.max(hidden_size) as f32).sqrt();
        let mut w_ih = vec![0.0f32; GATE_COUNT * hidden_size * input_size];
        let mut w_hh = vec![0.0f32; GATE_COUNT * hidden_size * hidden_size];
        rng.fill_scaled(&mut w_ih, scale);
        rng.fill_scaled(&mut w_hh, scale);
        // Forget-gate bias initialized to 1.0, standard practice for LSTMs
        // so early training doesn't forget everything by default.
        let mut bias = vec![0.0f32; GATE_COUNT * hidden_size];
        for b in bias[hidden_size..2 * hidden_size].iter_mut() {
            *b = 1.0;
        }
        LstmCell { input_size, hidden_size, w_ih, w_hh, bias }
    }

    pub fn from_config(config: &LstmConfig, rng: &mut Xorshift64) -> Self {
        LstmCell::new(config.input_size, config.hidden_size, rng)
    }

    /// Fused-gate forward step for one agent: reads `(c_prev, h_prev)`,
    /// writes `(c_next, h_next)`. `gates_scratch` must hold at least
    /// `4 * hidden_size` elements.
    pub fn step(&self, input: &[f32], c_prev: &[f32], h_prev: &[f32], c_next: &mut [f32], h_next: &mut [f32], gates_scratch: &mut [f32]) {
        let h = self.hidden_size;
        let gates = &mut gates_scratch[..GATE_COUNT * h];
        simd::matvec(gates, &self.w_ih, input, self.input_size, GATE_COUNT * h);

        let mut from_h = vec![0.0f32; GATE_COUNT * h];
        simd::matvec(&mut from_h, &self.w_hh, h_prev, h, GATE_COUNT * h);
        simd::vec_add_inplace(gates, &from_h);
        simd::vec_add_inplace(gates, &self.bias);

        for idx in 0..h {
            let i_gate = linalg::sigmoid(gates[idx]);
            let f_gate = linalg::sigmoid(gates[h + idx]);
            let g_gate = linalg::tanh_act(gates[2 * h + idx]);
            let o_gate = linalg::sigmoid(gates[3 * h + idx]);
            let c = f_gate * c_prev[idx] + i_gate * g_gate;
            c_next[idx] = c;
            h_next[idx] = o_gate * linalg::tanh_act(c);
        }
    }
}

/// Pooled per-agent recurrent state, Structure-of-Arrays over `capacity`
/// slots of `hidden_size` each.
pub struct LstmStatePool {
    pub hidden_size: usize,
    capacity: usize,
    c: Vec<f32>,
    h: Vec<f32>,
    free_stack: Vec<u32>,
    occupied: Vec<bool>,
}

impl LstmStatePool {
    pub fn new(hidden_size: usize, capacity: usize) -> Self {
        LstmStatePool {
            hidden_size,
            capacity,
            c: vec![0.0; hidden_size * capacity],
            h: vec![0.0; hidden_size * capacity],
            free_stack: (0..capacity as u32).rev().collect(),
            occupied: vec![false; capacity],
        }
    }

    pub fn from_config(config: &LstmConfig) -> Self {
        LstmStatePool::new(config.hidden_size, config.max_agents)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.free_stack.len()
    }

    /// Claim a slot for a new agent, zero-initialized. `None` once the
    /// pool is exhausted.
    pub fn allocate(&mut self) -> Option<usize> {
        let slot = self.free_stack.pop()? as usize;
        self.occupied[slot] = true;
        let h = self.hidden_size;
        for v in self.c[slot * h..(slot + 1) * h].iter_mut() {
            *v = 0.0;
        }
        for v in self.h[slot * h..(slot + 1) * h].iter_mut() {
            *v = 0.0;
        }
        Some(slot)
    }

    /// Return a slot to the pool without zeroing it (an allocate that
    /// reuses it will zero it then).
    pub fn release(&mut self, slot: usize) {
        crate::invariant!(slot < self.capacity && self.occupied[slot], "release of a slot not currently allocated");
        self.occupied[slot] = false;
        self.free_stack.push(slot as u32);
    }

    /// Zero an allocated agent's recurrent state without releasing the
    /// slot (e.g. on episode boundary).
    pub fn reset_slot(&mut self, slot: usize) {
        crate::invariant!(slot < self.capacity && self.occupied[slot], "reset of a slot not currently allocated");
        let h = self.hidden_size;
        for v in self.c[slot * h..(slot + 1) * h].iter_mut() {
            *v = 0.0;
        }
        for v in self.h[slot * h..(slot + 1) * h].iter_mut() {
            *v = 0.0;
        }
    }

    pub fn cell_state(&self, slot: usize) -> &[f32] {
        let h = self.hidden_size;
        &self.c[slot * h..(slot + 1) * h]
    }

    pub fn hidden_state(&self, slot: usize) -> &[f32] {
        let h = self.hidden_size;
        &self.h[slot * h..(slot + 1) * h]
    }

    /// Run one fused-gate step for `slot`, reading and writing its pooled
    /// state in place.
    pub fn step(&mut self, cell: &LstmCell, slot: usize, input: &[f32], gates_scratch: &mut [f32]) {
        let h = self.hidden_size;
        let c_prev = self.c[slot * h..(slot + 1) * h].to_vec();
        let h_prev = self.h[slot * h..(slot + 1) * h].to_vec();
        let (c_next, h_next) = (&mut self.c[slot * h..(slot + 1) * h], &mut self.h[slot * h..(slot + 1) * h]);
        cell.step(input, &c_prev, &h_prev, c_next, h_next, gates_scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_gives_zeroed_state_and_respects_capacity() {
        let mut pool = LstmStatePool::new(4, 2);
        let a = pool.allocate().unwrap();
        assert!(pool.cell_state(a).iter().all(|&v| v == 0.0));
        let _b = pool.allocate().unwrap();
        assert!(pool.allocate().is_none());
    }

    #[test]
    fn release_then_allocate_reuses_slot_zeroed() {
        let mut pool = LstmStatePool::new(3, 1);
        let a = pool.allocate().unwrap();
        pool.h_mut_for_test(a, 1.5);
        pool.release(a);
        let b = pool.allocate().unwrap();
        assert_eq!(a, b);
        assert!(pool.hidden_state(b).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn step_produces_bounded_outputs() {
        let mut rng = Xorshift64::new(7);
        let cell = LstmCell::new(3, 4, &mut rng);
        let mut pool = LstmStatePool::new(4, 1);
        let slot = pool.allocate().unwrap();
        let input = [0.5, -0.3, 0.9];
        let mut scratch = vec![0.0; GATE_COUNT * 4];
        pool.step(&cell, slot, &input, &mut scratch);
        for &v in pool.hidden_state(slot) {
            assert!(v.abs() <= 1.0 + 1e-5);
        }
    }

    impl LstmStatePool {
        fn h_mut_for_test(&mut self, slot: usize, v: f32) {
            let h = self.hidden_size;
            self.h[slot * h] = v;
        }
    }

    #[test]
    fn from_config_sizes_cell_and_pool_consistently() {
        let config = LstmConfig { input_size: 5, hidden_size: 8, max_agents: 3 };
        let mut rng = Xorshift64::new(1);
        let cell = LstmCell::from_config(&config, &mut rng);
        let mut pool = LstmStatePool::from_config(&config);
        assert_eq!(cell.hidden_size, config.hidden_size);
        assert_eq!(pool.capacity(), config.max_agents);
        let slot = pool.allocate().unwrap();
        assert_eq!(pool.hidden_state(slot).len(), config.hidden_size);
    }

    #[test]
    fn repeated_input_settles_then_reset_zeros_hidden_state() {
        let mut rng = Xorshift64::new(99);
        let cell = LstmCell::new(3, 4, &mut rng);
        let mut pool = LstmStatePool::new(4, 1);
        let slot = pool.allocate().unwrap();
        let input = [0.4, 0.1, -0.6];
        let mut scratch = vec![0.0; GATE_COUNT * 4];

        let mut prev_h = pool.hidden_state(slot).to_vec();
        let mut deltas = Vec::new();
        for _ in 0..5 {
            pool.step(&cell, slot, &input, &mut scratch);
            let h = pool.hidden_state(slot);
            let delta: f32 = h.iter().zip(prev_h.iter()).map(|(a, b)| (a - b) * (a - b)).sum::<f32>().sqrt();
            deltas.push(delta);
            prev_h = h.to_vec();
        }

        for w in deltas[1..].windows(2) {
            assert!(w[1] <= w[0] + 1e-3, "hidden-state delta should not grow under a repeated input: {deltas:?}");
        }

        pool.reset_slot(slot);
        assert!(pool.hidden_state(slot).iter().all(|&v| v == 0.0));
        assert!(pool.cell_state(slot).iter().all(|&v| v == 0.0));
    }
}
