//! Failure taxonomy: invariant violations abort, capacity saturation is
//! recorded and the excess silently dropped, degenerate numerics fall back
//! to a deterministic default, query misses are plain `false`/`None`
//! returns. This module only formalizes the first two; the others are
//! handled inline at point of use throughout the crate.

/// A capacity-saturation event: some fixed-size array was full this step.
/// Recorded into `Profiler` rather than propagated as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saturation {
    BroadPhasePairs,
    Manifolds,
    CellBodyList,
    EwcTasks,
    FisherEntries,
    Joints,
}

impl Saturation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Saturation::BroadPhasePairs => "broad-phase pair array full",
            Saturation::Manifolds => "manifold array full",
            Saturation::CellBodyList => "cell body list full",
            Saturation::EwcTasks => "EWC task table full",
            Saturation::FisherEntries => "Fisher entry table full",
            Saturation::Joints => "joint array full",
        }
    }
}

/// Abort with a logged message when `cond` is false. Used exclusively for
/// programming errors that have no recovery path: arena overflow, pool
/// double-free, non-LIFO scope close, re-entrant `step_simulation`,
/// `complete_task` on an unused slot, mass-property derivation on a
/// degenerate shape.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $($arg:tt)*) => {
        if !$cond {
            $crate::log_error!($($arg)*);
            panic!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturation_messages_are_distinct() {
        let all = [
            Saturation::BroadPhasePairs,
            Saturation::Manifolds,
            Saturation::CellBodyList,
            Saturation::EwcTasks,
            Saturation::FisherEntries,
            Saturation::Joints,
        ];
        for (i, a) in all.iter().enumerate() {
            for (j, b) in all.iter().enumerate() {
                if i != j {
                    assert_ne!(a.as_str(), b.as_str());
                }
            }
        }
    }

    #[test]
    #[should_panic]
    fn invariant_aborts_on_false() {
        invariant!(1 == 2, "impossible");
    }

    #[test]
    fn invariant_passes_on_true() {
        invariant!(1 == 1, "fine");
    }
}
