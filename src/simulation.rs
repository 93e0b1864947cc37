//! Single-threaded driver alternating world steps and controller updates.

use crate::config::SimulationConfig;
use crate::error::{PreconditionFault, Result};
use crate::model::{Model, ModelVisitor};
use crate::world::PhysicsWorld;
use tracing::{debug, info};

/// Owns a world and the model built into it, and steps them in lock-step.
///
/// One [`step`](Self::step) is:
/// 1. hand the model's commanded tensions to the world,
/// 2. step the world,
/// 3. sync connector readings back into the model,
/// 4. step the model, which notifies its controllers.
///
/// Controllers are owned by the caller and attached to [`model_mut`](Self::model_mut).
pub struct Simulation<W: PhysicsWorld> {
    world: W,
    model: Model,
    config: SimulationConfig,
    elapsed: f64,
    steps: u64,
    since_render: f64,
}

impl<W: PhysicsWorld> Simulation<W> {
    pub fn new(world: W, model: Model, config: SimulationConfig) -> Self {
        Self {
            world,
            model,
            config,
            elapsed: 0.0,
            steps: 0,
            since_render: 0.0,
        }
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Simulated seconds since construction.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Advances by one fixed step.
    pub fn step(&mut self) -> Result<()> {
        let dt = self.config.step_size;
        PreconditionFault::check_dt(dt)?;
        self.model.push_commands(&mut self.world);
        self.world.step(dt)?;
        self.model.sync_from(&self.world);
        self.model.step(dt)?;
        self.elapsed += dt;
        self.steps += 1;
        Ok(())
    }

    /// Runs `steps` steps, showing the model to `visitor` every
    /// `render_rate` simulated seconds.
    pub fn run<V: ModelVisitor + ?Sized>(&mut self, steps: u64, visitor: &mut V) -> Result<()> {
        debug!(steps, step_size = self.config.step_size, "running simulation");
        for _ in 0..steps {
            self.step()?;
            self.since_render += self.config.step_size;
            if self.since_render >= self.config.render_rate {
                self.model.accept(visitor);
                self.since_render -= self.config.render_rate;
            }
        }
        Ok(())
    }

    /// Tears the model down and detaches it from the world.
    pub fn teardown(&mut self) {
        self.model.teardown(&mut self.world);
        info!(steps = self.steps, elapsed = self.elapsed, "simulation finished");
    }

    /// Tears down and hands back the world and the emptied model.
    pub fn into_parts(mut self) -> (W, Model) {
        self.teardown();
        (self.world, self.model)
    }
}
