//! Rigid-body physics: bodies and shapes, spatial-hash broad phase, narrow
//! phase (closed-form + GJK/EPA), sequential-impulse solver, and the
//! fixed-step integrator with sleep. `world` composes all of these into
//! the single entry point external callers drive.

pub mod body;
pub mod broadphase;
pub mod integrator;
pub mod narrowphase;
pub mod solver;
pub mod world;

pub use body::{BodySet, Material, Shape};
pub use broadphase::SpatialHashGrid;
pub use narrowphase::{Contact, Manifold};
pub use world::World;
