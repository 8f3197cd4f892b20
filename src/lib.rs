//! Deterministic fixed-step rigid-body physics and a neural-inference /
//! continual-learning core, built on a shared arena-allocation discipline.
//! Single-threaded per world/network: see `physics::World` and
//! `neural::{DenseLayer, LstmCell, LstmStatePool, EwcState}`.

pub mod arena;
pub mod config;
pub mod debug;
pub mod fault;
pub mod log;
pub mod math;
pub mod neural;
pub mod persist;
pub mod physics;
pub mod rng;

pub use arena::{Arena, Pool};
pub use config::{EwcConfig, LstmConfig, NetworkConfig, WorldConfig};
pub use physics::World;
pub use rng::Xorshift64;
