//! Neural inference and continual-learning core: dense feed-forward
//! networks, a shared-weight LSTM with pooled per-agent recurrent state,
//! and Elastic Weight Consolidation to keep later tasks from overwriting
//! earlier ones.

pub mod ewc;
pub mod linalg;
pub mod lstm;
pub mod network;
pub mod simd;

pub use ewc::{EwcState, FisherSample, TaskState};
pub use lstm::{LstmCell, LstmStatePool};
pub use network::{Activation, DenseGrads, DenseLayer, Network, Target};
