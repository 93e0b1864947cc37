//! Per-step control: observers, the impedance law and the CPG oscillator.

pub mod cpg;
pub mod impedance;
pub mod sine_wave;

pub use cpg::*;
pub use impedance::*;
pub use sine_wave::*;

use crate::error::Result;
use crate::model::Model;

/// An observer invoked once per simulation step.
///
/// Controllers may only write commanded tensions onto actuators they found
/// through the model's tag queries. They must not create, destroy or
/// restructure runtime objects, and must not step the model themselves.
pub trait Controller {
    /// Called once when the controller is attached to `model`.
    fn on_attach(&mut self, _model: &Model) -> Result<()> {
        Ok(())
    }

    /// Called after the model's children have stepped.
    fn on_step(&mut self, model: &mut Model, dt: f64) -> Result<()>;

    /// Called before the model releases its runtime objects.
    fn on_teardown(&mut self, _model: &Model) {}
}
