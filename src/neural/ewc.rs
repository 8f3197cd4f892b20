//! Elastic Weight Consolidation: a per-task lifecycle state machine, a
//! sparse diagonal Fisher information matrix per completed task, and an
//! adaptive penalty strength that keeps new learning from overwriting
//! what earlier tasks needed.
//!
//! Lifecycle per task slot: `Unused -> Active -> Completed`, and a
//! completed task may later be reopened as `ActiveRetained` (training
//! resumes but the task's anchor weights and Fisher matrix are kept, so
//! its own penalty continues to apply against itself as it did before
//! being retired) before returning to `Completed` again.

use super::network::{Network, Target};
use crate::config::EwcConfig;
use crate::fault::Saturation;

/// One labeled/targeted example to accumulate into a task's Fisher
/// estimate via `EwcState::compute_fisher`.
pub struct FisherSample<'a> {
    pub input: &'a [f32],
    pub target: Target<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Unused,
    Active,
    Completed,
    ActiveRetained,
}

pub struct TaskRecord {
    pub name: String,
    pub state: TaskState,
    pub lambda: f32,
    /// Per-task importance weight `alpha`, independent of the shared
    /// adaptive `lambda`; defaults to 1.0, settable via `set_importance`.
    pub importance: f32,
    prev_val_loss: Option<f32>,
    /// Squared-gradient accumulator while `Active`/`ActiveRetained`;
    /// condensed into `fisher` on `complete_task`.
    fisher_accum: Vec<f32>,
    samples_accumulated: u32,
    /// Sparse diagonal Fisher entries: `(parameter_index, value)`, kept
    /// only once the task has completed at least one full pass.
    pub fisher: Vec<(u32, f32)>,
    pub theta_star: Vec<f32>,
}

pub struct EwcState {
    config: EwcConfig,
    tasks: Vec<TaskRecord>,
    pub fisher_entries_dropped: u64,
}

impl EwcState {
    pub fn new(config: EwcConfig) -> Self {
        let tasks = (0..config.max_tasks)
            .map(|_| TaskRecord {
                name: String::new(),
                state: TaskState::Unused,
                lambda: config.lambda_initial,
                importance: 1.0,
                prev_val_loss: None,
                fisher_accum: Vec::new(),
                samples_accumulated: 0,
                fisher: Vec::new(),
                theta_star: Vec::new(),
            })
            .collect();
        EwcState { config, tasks, fisher_entries_dropped: 0 }
    }

    pub fn task_state(&self, slot: usize) -> TaskState {
        self.tasks[slot].state
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn parameter_count(&self) -> usize {
        self.config.parameter_count
    }

    pub fn task_name(&self, slot: usize) -> &str {
        &self.tasks[slot].name
    }

    pub fn task_importance(&self, slot: usize) -> f32 {
        self.tasks[slot].importance
    }

    pub fn task_fisher(&self, slot: usize) -> &[(u32, f32)] {
        &self.tasks[slot].fisher
    }

    pub fn task_theta_star(&self, slot: usize) -> &[f32] {
        &self.tasks[slot].theta_star
    }

    /// Claim an `Unused` slot and install it directly as `Completed` with
    /// the given snapshot, bypassing the normal `start_task`/
    /// `accumulate_fisher_sample`/`complete_task` lifecycle. Used only when
    /// restoring a previously saved task.
    pub fn restore_completed_task(&mut self, name: &str, importance: f32, fisher: Vec<(u32, f32)>, theta_star: Vec<f32>) -> Result<usize, Saturation> {
        let slot = self.tasks.iter().position(|t| t.state == TaskState::Unused).ok_or(Saturation::EwcTasks)?;
        let rec = &mut self.tasks[slot];
        rec.name = name.to_string();
        rec.state = TaskState::Completed;
        rec.lambda = self.config.lambda_initial;
        rec.importance = importance;
        rec.prev_val_loss = None;
        rec.fisher_accum = Vec::new();
        rec.samples_accumulated = 0;
        rec.fisher = fisher;
        rec.theta_star = theta_star;
        Ok(slot)
    }

    /// Claim an `Unused` slot for a new task. Returns `None` (and records
    /// `Saturation::EwcTasks`) if every slot is occupied.
    pub fn start_task(&mut self, name: &str) -> Option<usize> {
        let slot = self.tasks.iter().position(|t| t.state == TaskState::Unused)?;
        let rec = &mut self.tasks[slot];
        rec.name = name.to_string();
        rec.state = TaskState::Active;
        rec.lambda = self.config.lambda_initial;
        rec.importance = 1.0;
        rec.prev_val_loss = None;
        rec.fisher_accum = vec![0.0; self.config.parameter_count];
        rec.samples_accumulated = 0;
        Some(slot)
    }

    pub fn start_task_or_record(&mut self, name: &str) -> Result<usize, Saturation> {
        self.start_task(name).ok_or(Saturation::EwcTasks)
    }

    /// Set task `slot`'s importance weight `alpha`, independent of its
    /// adaptive `lambda`. Valid at any point after the slot is claimed.
    pub fn set_importance(&mut self, slot: usize, alpha: f32) {
        self.tasks[slot].importance = alpha;
    }

    /// Accumulate one sample's squared gradient into the running Fisher
    /// estimate for `slot`. Must be `Active` or `ActiveRetained`.
    pub fn accumulate_fisher_sample(&mut self, slot: usize, grad: &[f32]) {
        let rec = &mut self.tasks[slot];
        crate::invariant!(
            rec.state == TaskState::Active || rec.state == TaskState::ActiveRetained,
            "accumulate_fisher_sample on a task slot that isn't active"
        );
        for (acc, g) in rec.fisher_accum.iter_mut().zip(grad.iter()) {
            *acc += g * g;
        }
        rec.samples_accumulated += 1;
    }

    /// Run `network` forward over every sample and accumulate each
    /// sample's squared gradient into `slot`'s running Fisher estimate, via
    /// `Network::gradients_flat` so the network's weights are never
    /// perturbed by the estimation itself. `slot` must be `Active` or
    /// `ActiveRetained`.
    pub fn compute_fisher(&mut self, slot: usize, network: &mut Network, samples: &[FisherSample]) {
        let mut output = vec![0.0; network.output_size()];
        let mut grad = vec![0.0; network.parameter_count()];
        for sample in samples {
            network.forward(sample.input, &mut output);
            network.gradients_flat(&sample.target, &mut grad);
            self.accumulate_fisher_sample(slot, &grad);
        }
    }

    /// Apply one gradient-descent step against `network`'s flattened
    /// parameters using only the combined EWC penalty gradient over every
    /// completed/retained task (no task-specific training loss gradient is
    /// involved here; callers that also train on new data add this
    /// penalty's gradient to their own before stepping, or call this
    /// separately as a pure regularization pass). Returns the penalty value.
    pub fn update_parameters_with_ewc(&self, network: &mut Network, learning_rate: f32) -> f32 {
        let mut theta = network.flatten_parameters();
        let mut grad = vec![0.0; theta.len()];
        let penalty = self.penalty_and_gradient(&theta, &mut grad);
        for (t, g) in theta.iter_mut().zip(grad.iter()) {
            *t -= learning_rate * g;
        }
        network.unflatten_parameters(&theta);
        penalty
    }

    /// Reconfigure the adaptive lambda bounds and clamp every existing
    /// task's current lambda into the new range.
    pub fn set_lambda_range(&mut self, lambda_min: f32, lambda_max: f32) {
        self.config.lambda_min = lambda_min;
        self.config.lambda_max = lambda_max;
        for rec in self.tasks.iter_mut() {
            rec.lambda = rec.lambda.clamp(lambda_min, lambda_max);
        }
    }

    /// Finalize a task: average the accumulated squared gradients into a
    /// sparse diagonal Fisher matrix (entries below
    /// `fisher_sparsity_threshold` are dropped), snapshot `theta` as the
    /// anchor `theta*`, and move the slot to `Completed`.
    pub fn complete_task(&mut self, slot: usize, theta: &[f32]) {
        let max_entries = self.config.max_fisher_entries;
        let threshold = self.config.fisher_sparsity_threshold;
        let rec = &mut self.tasks[slot];
        crate::invariant!(
            rec.state == TaskState::Active || rec.state == TaskState::ActiveRetained,
            "complete_task on a task slot that isn't active"
        );
        let n = rec.samples_accumulated.max(1) as f32;
        let mut entries: Vec<(u32, f32)> = rec
            .fisher_accum
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| {
                let avg = v / n;
                if avg.abs() >= threshold {
                    Some((i as u32, avg))
                } else {
                    None
                }
            })
            .collect();

        let mut dropped = 0u64;
        if entries.len() > max_entries {
            entries.sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap_or(core::cmp::Ordering::Equal));
            dropped = (entries.len() - max_entries) as u64;
            entries.truncate(max_entries);
        }

        rec.fisher = entries;
        rec.theta_star = theta.to_vec();
        rec.fisher_accum = Vec::new();
        rec.state = TaskState::Completed;
        drop(rec);
        self.fisher_entries_dropped += dropped;
    }

    /// Drop `slot`'s Fisher entries whose value is below `threshold`,
    /// preserving the remaining entries' index order.
    pub fn compress(&mut self, slot: usize, threshold: f32) {
        let rec = &mut self.tasks[slot];
        let before = rec.fisher.len();
        rec.fisher.retain(|&(_, v)| v.abs() >= threshold);
        self.fisher_entries_dropped += (before - rec.fisher.len()) as u64;
    }

    /// Reopen a `Completed` task for further training while retaining its
    /// Fisher matrix and anchor weights.
    pub fn reactivate_task(&mut self, slot: usize) {
        let rec = &mut self.tasks[slot];
        crate::invariant!(rec.state == TaskState::Completed, "reactivate_task requires a completed task");
        rec.state = TaskState::ActiveRetained;
        rec.fisher_accum = vec![0.0; self.config.parameter_count];
        rec.samples_accumulated = 0;
    }

    /// Sum of EWC penalties over every `Completed`/`ActiveRetained` task,
    /// `alpha * lambda * F_i * (theta_i - theta*_i)^2`, and the
    /// corresponding gradient `2 * alpha * lambda * F_i * (theta_i -
    /// theta*_i)` accumulated into `grad_out` (which the caller adds to its
    /// own loss gradient before applying an optimizer step).
    pub fn penalty_and_gradient(&self, theta: &[f32], grad_out: &mut [f32]) -> f32 {
        let mut penalty = 0.0f32;
        for rec in &self.tasks {
            if rec.state != TaskState::Completed && rec.state != TaskState::ActiveRetained {
                continue;
            }
            let weight = rec.importance * rec.lambda;
            for &(idx, f) in &rec.fisher {
                let i = idx as usize;
                let diff = theta[i] - rec.theta_star[i];
                penalty += weight * f * diff * diff;
                grad_out[i] += 2.0 * weight * f * diff;
            }
        }
        penalty
    }

    /// Adaptive lambda update: if validation loss on `slot`'s task rose by
    /// more than `lambda_margin` since the last call, the task is being
    /// forgotten, so strengthen its penalty; if it fell, relax it.
    /// Clamped to `[lambda_min, lambda_max]`; calling twice in a row with
    /// the same `new_val_loss` is a no-op the second time, since the
    /// stored previous loss then equals the new one.
    pub fn update_lambda(&mut self, slot: usize, new_val_loss: f32) {
        let rec = &mut self.tasks[slot];
        if let Some(prev) = rec.prev_val_loss {
            if new_val_loss > prev + self.config.lambda_margin {
                rec.lambda = (rec.lambda * self.config.lambda_adjust_factor).min(self.config.lambda_max);
            } else if new_val_loss < prev - self.config.lambda_margin {
                rec.lambda = (rec.lambda / self.config.lambda_adjust_factor).max(self.config.lambda_min);
            }
        }
        rec.prev_val_loss = Some(new_val_loss);
    }
}
