//! Travelling-wave gait controller built from a [`Cpg`] and impedance laws.

use super::{Controller, Cpg, ImpedanceController};
use crate::error::{PreconditionFault, Result};
use crate::model::{ActuatorMap, Model};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// How the CPG output is fed to the wave-stage impedance law.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum CpgSetpoint {
    /// The CPG target is the length set-point; velocity set-point is zero.
    #[default]
    Length,
    /// The CPG target is the velocity set-point around a fixed length.
    Velocity { length: f64 },
}

/// Actuators driven by the oscillator, addressed by tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaveGroup {
    pub tag: String,
    /// Index into the CPG's phase table.
    pub phase: usize,
}

/// Actuators held at a fixed length before the wave stage runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HoldGroup {
    pub tag: String,
    pub length: f64,
}

/// Controller lifecycle. Attached is left only through model teardown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ControllerState {
    #[default]
    Unattached,
    Attached,
}

/// Drives tagged actuator groups with a sine wave travelling along the body.
///
/// Each step it adds `dt` to its elapsed time, holds the hold groups at their
/// lengths with the hold law, then drives every wave group member `i` of `n`
/// towards `cpg.target(elapsed, phase, i, n)` with the wave law. Results are
/// written as commanded tensions; the world realises them on its next step.
#[derive(Clone, Debug)]
pub struct SineWaveController {
    cpg: Cpg,
    wave_law: ImpedanceController,
    setpoint: CpgSetpoint,
    waves: Vec<WaveGroup>,
    hold_law: Option<ImpedanceController>,
    holds: Vec<HoldGroup>,
    wave_map: ActuatorMap,
    hold_map: ActuatorMap,
    elapsed: f64,
    state: ControllerState,
}

impl SineWaveController {
    pub fn new(cpg: Cpg, wave_law: ImpedanceController) -> Self {
        Self {
            cpg,
            wave_law,
            setpoint: CpgSetpoint::default(),
            waves: Vec::new(),
            hold_law: None,
            holds: Vec::new(),
            wave_map: ActuatorMap::new(),
            hold_map: ActuatorMap::new(),
            elapsed: 0.0,
            state: ControllerState::Unattached,
        }
    }

    pub fn with_setpoint(mut self, setpoint: CpgSetpoint) -> Self {
        self.setpoint = setpoint;
        self
    }

    /// Adds a group driven by the oscillator with phase table entry `phase`.
    pub fn with_wave_group(mut self, tag: impl Into<String>, phase: usize) -> Self {
        self.waves.push(WaveGroup {
            tag: tag.into(),
            phase,
        });
        self
    }

    /// Sets the law used for hold groups.
    pub fn with_hold_law(mut self, law: ImpedanceController) -> Self {
        self.hold_law = Some(law);
        self
    }

    /// Adds a group held at `length`. Ignored unless a hold law is set.
    pub fn with_hold_group(mut self, tag: impl Into<String>, length: f64) -> Self {
        self.holds.push(HoldGroup {
            tag: tag.into(),
            length,
        });
        self
    }

    pub fn cpg(&self) -> &Cpg {
        &self.cpg
    }

    /// Simulated time accumulated since attach or the last reset.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Actuators mapped for the wave stage, by group tag.
    pub fn wave_map(&self) -> &ActuatorMap {
        &self.wave_map
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }

    fn apply_holds(&self, model: &mut Model, dt: f64) -> Result<()> {
        let Some(law) = &self.hold_law else {
            return Ok(());
        };
        for group in &self.holds {
            for &id in self.hold_map.actuators(&group.tag)? {
                let actuator = model
                    .actuator_mut(id)
                    .ok_or(PreconditionFault::MissingActuator(id.0))?;
                let tension = law.control_length(&*actuator, dt, group.length)?;
                actuator.set_commanded_tension(tension);
            }
        }
        Ok(())
    }

    fn apply_waves(&self, model: &mut Model, dt: f64) -> Result<()> {
        for group in &self.waves {
            let ids = self.wave_map.actuators(&group.tag)?;
            for (i, &id) in ids.iter().enumerate() {
                let target = self.cpg.target(self.elapsed, group.phase, i, ids.len())?;
                let actuator = model
                    .actuator_mut(id)
                    .ok_or(PreconditionFault::MissingActuator(id.0))?;
                let tension = match self.setpoint {
                    CpgSetpoint::Length => self.wave_law.control(&*actuator, dt, target, 0.0)?,
                    CpgSetpoint::Velocity { length } => {
                        self.wave_law.control(&*actuator, dt, length, target)?
                    }
                };
                actuator.set_commanded_tension(tension);
                trace!(group = %group.tag, actuator = %id, target, tension, "wave command");
            }
        }
        Ok(())
    }
}

impl Controller for SineWaveController {
    fn on_attach(&mut self, model: &Model) -> Result<()> {
        for group in &self.waves {
            if group.phase >= self.cpg.config().phase_offsets.len() {
                return Err(PreconditionFault::UnknownPhase {
                    index: group.phase,
                    len: self.cpg.config().phase_offsets.len(),
                }
                .into());
            }
        }
        let mut wave_map = ActuatorMap::new();
        for group in &self.waves {
            let count = wave_map.map_tag(model, group.tag.as_str(), &group.tag);
            debug!(group = %group.tag, count, "mapped wave group");
        }
        let mut hold_map = ActuatorMap::new();
        for group in &self.holds {
            hold_map.map_tag(model, group.tag.as_str(), &group.tag);
        }
        self.wave_map = wave_map;
        self.hold_map = hold_map;
        self.state = ControllerState::Attached;
        Ok(())
    }

    fn on_step(&mut self, model: &mut Model, dt: f64) -> Result<()> {
        PreconditionFault::check_dt(dt)?;
        if self.state != ControllerState::Attached {
            return Ok(());
        }
        self.elapsed += dt;
        self.apply_holds(model, dt)?;
        self.apply_waves(model, dt)
    }

    fn on_teardown(&mut self, _model: &Model) {
        self.wave_map = ActuatorMap::new();
        self.hold_map = ActuatorMap::new();
        self.elapsed = 0.0;
        self.state = ControllerState::Unattached;
    }
}
