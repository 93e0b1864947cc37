//! The seam between this crate and a physics engine.
//!
//! The engine implements [`PhysicsWorld`]; the compiler registers bodies and
//! constraints through it, and the [`Simulation`](crate::Simulation) driver
//! steps it and exchanges actuator readings and commands with it.
//!
//! [`StaticWorld`] is a bookkeeping implementation with no dynamics: bodies stay
//! where they were created and connectors report their geometric length.

use crate::blueprint::{BodyShape, ConnectorConfig};
use crate::error::{PreconditionFault, Result};
use glam::{DAffine3, DVec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque handle to a rigid body registered with a world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BodyHandle(pub u64);

/// Opaque handle to a constraint (connector) registered with a world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstraintHandle(pub u64);

/// Instantaneous readings of a connector, as measured by the engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorState {
    /// Current endpoint-to-endpoint length (m).
    pub length: f64,
    /// Rate of change of length (m/s), positive when lengthening.
    pub velocity: f64,
    /// Tension currently transmitted (N).
    pub tension: f64,
}

/// A physics engine as seen by the build pipeline and the driver.
pub trait PhysicsWorld {
    /// Registers a rigid body. `transform` places the body frame in world space.
    fn create_rigid_body(&mut self, shape: &BodyShape, mass: f64, transform: DAffine3)
    -> BodyHandle;

    /// Registers a connector between two bodies. Pivots are in each body's local frame.
    fn create_constraint(
        &mut self,
        body_a: BodyHandle,
        body_b: BodyHandle,
        pivot_a: DVec3,
        pivot_b: DVec3,
        config: &ConnectorConfig,
    ) -> ConstraintHandle;

    /// Advances the world by `dt` seconds.
    fn step(&mut self, dt: f64) -> Result<()>;

    fn remove_rigid_body(&mut self, body: BodyHandle);

    fn remove_constraint(&mut self, constraint: ConstraintHandle);

    /// Current readings for a connector, or `None` if the handle is unknown.
    fn connector_state(&self, constraint: ConstraintHandle) -> Option<ConnectorState>;

    /// Tension the engine should realise on its next step.
    fn set_commanded_tension(&mut self, constraint: ConstraintHandle, tension: f64);
}

#[derive(Clone, Debug)]
struct StaticBody {
    shape: BodyShape,
    mass: f64,
    transform: DAffine3,
}

#[derive(Clone, Debug)]
struct StaticConstraint {
    bodies: (BodyHandle, BodyHandle),
    pivots: (DVec3, DVec3),
    config: ConnectorConfig,
    commanded: Option<f64>,
    state: ConnectorState,
}

/// A world without dynamics.
///
/// Records everything registered with it, keeps bodies fixed in place and, on
/// each step, reports connector length from pivot geometry and realises the
/// commanded tension (clamped to the connector's bounds) or the spring's
/// passive tension when nothing was commanded.
#[derive(Clone, Debug, Default)]
pub struct StaticWorld {
    next_id: u64,
    bodies: HashMap<BodyHandle, StaticBody>,
    constraints: HashMap<ConstraintHandle, StaticConstraint>,
    elapsed: f64,
    steps: u64,
}

impl StaticWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn body_mass(&self, body: BodyHandle) -> Option<f64> {
        self.bodies.get(&body).map(|b| b.mass)
    }

    pub fn body_shape(&self, body: BodyHandle) -> Option<&BodyShape> {
        self.bodies.get(&body).map(|b| &b.shape)
    }

    pub fn body_transform(&self, body: BodyHandle) -> Option<DAffine3> {
        self.bodies.get(&body).map(|b| b.transform)
    }

    /// Bodies joined by a constraint.
    pub fn constraint_bodies(&self, constraint: ConstraintHandle) -> Option<(BodyHandle, BodyHandle)> {
        self.constraints.get(&constraint).map(|c| c.bodies)
    }

    /// Last tension commanded on a constraint.
    pub fn commanded_tension(&self, constraint: ConstraintHandle) -> Option<f64> {
        self.constraints.get(&constraint).and_then(|c| c.commanded)
    }

    /// Moves a body, as an engine would between steps. Connector readings
    /// follow on the next [`step`](PhysicsWorld::step).
    pub fn set_body_transform(&mut self, body: BodyHandle, transform: DAffine3) {
        if let Some(b) = self.bodies.get_mut(&body) {
            b.transform = transform;
        }
    }

    fn pivot_world(&self, body: BodyHandle, pivot: DVec3) -> DVec3 {
        self.bodies
            .get(&body)
            .map_or(pivot, |b| b.transform.transform_point3(pivot))
    }

    fn measure(&self, constraint: &StaticConstraint) -> f64 {
        let a = self.pivot_world(constraint.bodies.0, constraint.pivots.0);
        let b = self.pivot_world(constraint.bodies.1, constraint.pivots.1);
        a.distance(b)
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl PhysicsWorld for StaticWorld {
    fn create_rigid_body(
        &mut self,
        shape: &BodyShape,
        mass: f64,
        transform: DAffine3,
    ) -> BodyHandle {
        let handle = BodyHandle(self.next_handle());
        self.bodies.insert(
            handle,
            StaticBody {
                shape: shape.clone(),
                mass,
                transform,
            },
        );
        handle
    }

    fn create_constraint(
        &mut self,
        body_a: BodyHandle,
        body_b: BodyHandle,
        pivot_a: DVec3,
        pivot_b: DVec3,
        config: &ConnectorConfig,
    ) -> ConstraintHandle {
        let handle = ConstraintHandle(self.next_handle());
        let mut constraint = StaticConstraint {
            bodies: (body_a, body_b),
            pivots: (pivot_a, pivot_b),
            config: *config,
            commanded: None,
            state: ConnectorState::default(),
        };
        constraint.state.length = self.measure(&constraint);
        constraint.state.tension = config.actuator().pretension;
        self.constraints.insert(handle, constraint);
        handle
    }

    fn step(&mut self, dt: f64) -> Result<()> {
        PreconditionFault::check_dt(dt)?;
        let lengths: Vec<(ConstraintHandle, f64)> = self
            .constraints
            .iter()
            .map(|(handle, c)| (*handle, self.measure(c)))
            .collect();
        for (handle, length) in lengths {
            if let Some(c) = self.constraints.get_mut(&handle) {
                let actuator = c.config.actuator();
                let tension = c.commanded.unwrap_or(actuator.pretension);
                c.state = ConnectorState {
                    length,
                    velocity: (length - c.state.length) / dt,
                    tension: tension.clamp(actuator.min_tension, actuator.max_tension),
                };
            }
        }
        self.elapsed += dt;
        self.steps += 1;
        Ok(())
    }

    fn remove_rigid_body(&mut self, body: BodyHandle) {
        self.bodies.remove(&body);
    }

    fn remove_constraint(&mut self, constraint: ConstraintHandle) {
        self.constraints.remove(&constraint);
    }

    fn connector_state(&self, constraint: ConstraintHandle) -> Option<ConnectorState> {
        self.constraints.get(&constraint).map(|c| c.state)
    }

    fn set_commanded_tension(&mut self, constraint: ConstraintHandle, tension: f64) {
        if let Some(c) = self.constraints.get_mut(&constraint) {
            c.commanded = Some(tension);
        }
    }
}
