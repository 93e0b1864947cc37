//! # tensegrity-kit
//!
//! An engine-agnostic build and control core for simulated tensegrity robots.
//!
//! It decouples the *description* of a structure (a [`StructureGraph`] of nodes,
//! tagged pairs and nested sub-structures) from its *instantiation* in a
//! physics engine. A [`BuildSpec`] says which [`Builder`] turns each tag into a
//! strut, box or cable; the [`StructureCompiler`] resolves shared nodes into
//! shared attachment points and emits a runtime [`Model`] registered with any
//! [`PhysicsWorld`].
//!
//! During simulation, [`Controller`]s attached to the model compute commanded
//! actuator tensions each step, typically a [`Cpg`] travelling wave fed through
//! an [`ImpedanceController`] as in [`SineWaveController`].

pub mod blueprint;
pub mod builder;
pub mod compiler;
pub mod config;
pub mod control;
pub mod error;
pub mod model;
pub mod simulation;
pub mod structure;
pub mod tags;
pub mod world;

pub use blueprint::*;
pub use builder::*;
pub use compiler::*;
pub use config::*;
pub use control::*;
pub use error::*;
pub use model::*;
pub use simulation::*;
pub use structure::*;
pub use tags::*;
pub use world::*;
