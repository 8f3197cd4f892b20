//! EWC save/load: a minimal little-endian binary record for a state's
//! completed tasks — version byte, task count, then per task the name,
//! importance, parameter count, sparse Fisher entries, and the theta*
//! snapshot. Adaptive lambda and in-progress (`Active`) tasks are not
//! persisted; a reload starts each restored task's lambda back at
//! `EwcConfig::lambda_initial`.

use crate::neural::ewc::EwcState;

pub const FORMAT_VERSION: u8 = 1;

#[derive(Debug)]
pub enum PersistError {
    UnsupportedVersion(u8),
    ParameterCountMismatch { expected: u32, found: u32 },
    Truncated,
    InvalidUtf8,
    TaskTableFull,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8, PersistError> {
        let b = *self.bytes.get(self.pos).ok_or(PersistError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn u32(&mut self) -> Result<u32, PersistError> {
        let end = self.pos + 4;
        let slice = self.bytes.get(self.pos..end).ok_or(PersistError::Truncated)?;
        self.pos = end;
        Ok(u32::from_le_bytes(slice.try_into().unwrap()))
    }

    fn f32(&mut self) -> Result<f32, PersistError> {
        let end = self.pos + 4;
        let slice = self.bytes.get(self.pos..end).ok_or(PersistError::Truncated)?;
        self.pos = end;
        Ok(f32::from_le_bytes(slice.try_into().unwrap()))
    }

    fn bytes_exact(&mut self, n: usize) -> Result<&'a [u8], PersistError> {
        let end = self.pos + n;
        let slice = self.bytes.get(self.pos..end).ok_or(PersistError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }
}

/// Serialize every `Completed`/`ActiveRetained` task in `state` into a
/// fresh byte vector.
pub fn save(state: &EwcState) -> Vec<u8> {
    use crate::neural::ewc::TaskState;

    let persisted: Vec<usize> = (0..state.task_count())
        .filter(|&s| matches!(state.task_state(s), TaskState::Completed | TaskState::ActiveRetained))
        .collect();

    let mut out = Vec::new();
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&(persisted.len() as u32).to_le_bytes());

    for slot in persisted {
        let name = state.task_name(slot);
        let name_bytes = name.as_bytes();
        out.extend_from_slice(&(name_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(name_bytes);
        out.extend_from_slice(&state.task_importance(slot).to_le_bytes());
        out.extend_from_slice(&(state.parameter_count() as u32).to_le_bytes());

        let fisher = state.task_fisher(slot);
        out.extend_from_slice(&(fisher.len() as u32).to_le_bytes());
        for &(idx, value) in fisher {
            out.extend_from_slice(&idx.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
        }

        let theta_star = state.task_theta_star(slot);
        for &v in theta_star {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    out
}

/// Restore tasks from `bytes` into `state`, appending them as `Completed`
/// into unused slots. Rejects an unsupported version or a per-task
/// parameter count that doesn't match `state`'s configured count, leaving
/// `state` untouched on error (buffered into a staging vec before commit).
pub fn load(state: &mut EwcState, bytes: &[u8]) -> Result<usize, PersistError> {
    let mut r = Reader::new(bytes);
    let version = r.u8()?;
    if version != FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion(version));
    }

    let task_count = r.u32()? as usize;
    let expected_params = state.parameter_count() as u32;

    struct Staged {
        name: String,
        importance: f32,
        fisher: Vec<(u32, f32)>,
        theta_star: Vec<f32>,
    }
    let mut staged = Vec::with_capacity(task_count);

    for _ in 0..task_count {
        let name_len = r.u32()? as usize;
        let name = core::str::from_utf8(r.bytes_exact(name_len)?).map_err(|_| PersistError::InvalidUtf8)?.to_string();
        let importance = r.f32()?;
        let param_count = r.u32()?;
        if param_count != expected_params {
            return Err(PersistError::ParameterCountMismatch { expected: expected_params, found: param_count });
        }
        let fisher_count = r.u32()? as usize;
        let mut fisher = Vec::with_capacity(fisher_count);
        for _ in 0..fisher_count {
            let idx = r.u32()?;
            let value = r.f32()?;
            fisher.push((idx, value));
        }
        let mut theta_star = Vec::with_capacity(param_count as usize);
        for _ in 0..param_count {
            theta_star.push(r.f32()?);
        }
        staged.push(Staged { name, importance, fisher, theta_star });
    }

    let restored = staged.len();
    for s in staged {
        state
            .restore_completed_task(&s.name, s.importance, s.fisher, s.theta_star)
            .map_err(|_| PersistError::TaskTableFull)?;
    }
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EwcConfig;
    use crate::neural::ewc::TaskState;

    fn make_state() -> EwcState {
        let config = EwcConfig { parameter_count: 4, max_tasks: 4, ..EwcConfig::default() };
        EwcState::new(config)
    }

    #[test]
    fn save_then_load_round_trips_a_completed_task() {
        let mut state = make_state();
        let slot = state.start_task("alpha").unwrap();
        state.accumulate_fisher_sample(slot, &[1.0, 0.0, 2.0, 0.0]);
        state.complete_task(slot, &[0.1, 0.2, 0.3, 0.4]);
        state.set_importance(slot, 3.0);

        let bytes = save(&state);

        let mut restored = make_state();
        let count = load(&mut restored, &bytes).unwrap();
        assert_eq!(count, 1);
        assert_eq!(restored.task_state(0), TaskState::Completed);
        assert_eq!(restored.task_name(0), "alpha");
        assert!((restored.task_importance(0) - 3.0).abs() < 1e-6);
        assert_eq!(restored.task_theta_star(0), &[0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn load_rejects_unsupported_version() {
        let mut state = make_state();
        let bytes = vec![99, 0, 0, 0, 0];
        assert!(matches!(load(&mut state, &bytes), Err(PersistError::UnsupportedVersion(99))));
    }

    #[test]
    fn load_rejects_parameter_count_mismatch() {
        let mut producer = EwcState::new(EwcConfig { parameter_count: 2, max_tasks: 2, ..EwcConfig::default() });
        let slot = producer.start_task("a").unwrap();
        producer.accumulate_fisher_sample(slot, &[1.0, 1.0]);
        producer.complete_task(slot, &[0.0, 0.0]);
        let bytes = save(&producer);

        let mut consumer = make_state(); // parameter_count = 4, mismatched
        assert!(matches!(load(&mut consumer, &bytes), Err(PersistError::ParameterCountMismatch { .. })));
    }

    #[test]
    fn load_truncated_buffer_errors_instead_of_panicking() {
        let mut state = make_state();
        let bytes = vec![FORMAT_VERSION, 1, 0];
        assert!(matches!(load(&mut state, &bytes), Err(PersistError::Truncated)));
    }
}
