//! Immutable configuration values for builders, the compiler and the driver.
//!
//! Every config validates its fields in `new` (or [`validate`](RodConfig::validate)
//! for values built with struct literals), so that a bad stiffness or radius is
//! reported before any graph is traversed.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};

fn positive(field: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if !value.is_finite() {
        return Err(ConfigurationError::NotFinite { field });
    }
    if value <= 0.0 {
        return Err(ConfigurationError::non_positive(field, value));
    }
    Ok(())
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if !value.is_finite() {
        return Err(ConfigurationError::NotFinite { field });
    }
    if value < 0.0 {
        return Err(ConfigurationError::negative(field, value));
    }
    Ok(())
}

/// Geometry and mass for a cylindrical strut.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RodConfig {
    /// Strut radius (m).
    pub radius: f64,
    /// Density (kg/m^3) used to derive mass.
    pub density: f64,
}

impl Default for RodConfig {
    fn default() -> Self {
        Self {
            radius: 0.5,
            density: 1.0,
        }
    }
}

impl RodConfig {
    pub fn new(radius: f64, density: f64) -> Result<Self, ConfigurationError> {
        let config = Self { radius, density };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        positive("radius", self.radius)?;
        positive("density", self.density)
    }
}

/// Geometry and mass for a box-shaped link. The box grows along the pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxConfig {
    /// Full extent across the pair, local X (m).
    pub width: f64,
    /// Full extent across the pair, local Z (m).
    pub height: f64,
    /// Density (kg/m^3).
    pub density: f64,
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self {
            width: 1.0,
            height: 1.0,
            density: 1.0,
        }
    }
}

impl BoxConfig {
    pub fn new(width: f64, height: f64, density: f64) -> Result<Self, ConfigurationError> {
        let config = Self {
            width,
            height,
            density,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        positive("width", self.width)?;
        positive("height", self.height)?;
        positive("density", self.density)
    }
}

/// Spring-cable actuator parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActuatorConfig {
    /// Spring stiffness (N/m).
    pub stiffness: f64,
    /// Damping coefficient (N·s/m).
    pub damping: f64,
    /// Tension applied at rest length (N).
    pub pretension: f64,
    /// Lowest commandable tension (N). Cables cannot push, so usually 0.
    pub min_tension: f64,
    /// Highest commandable tension (N).
    pub max_tension: f64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            stiffness: 1000.0,
            damping: 10.0,
            pretension: 0.0,
            min_tension: 0.0,
            max_tension: 7000.0,
        }
    }
}

impl ActuatorConfig {
    pub fn new(
        stiffness: f64,
        damping: f64,
        pretension: f64,
        max_tension: f64,
    ) -> Result<Self, ConfigurationError> {
        let config = Self {
            stiffness,
            damping,
            pretension,
            min_tension: 0.0,
            max_tension,
        };
        config.validate()?;
        Ok(config)
    }

    /// Replaces the tension bounds (builder pattern).
    pub fn with_tension_bounds(
        mut self,
        min_tension: f64,
        max_tension: f64,
    ) -> Result<Self, ConfigurationError> {
        self.min_tension = min_tension;
        self.max_tension = max_tension;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        positive("stiffness", self.stiffness)?;
        non_negative("damping", self.damping)?;
        non_negative("pretension", self.pretension)?;
        if !self.min_tension.is_finite() {
            return Err(ConfigurationError::NotFinite {
                field: "min_tension",
            });
        }
        positive("max_tension", self.max_tension)?;
        if self.min_tension > self.max_tension {
            return Err(ConfigurationError::InvertedRange {
                field: "tension",
                min: self.min_tension,
                max: self.max_tension,
            });
        }
        Ok(())
    }
}

/// Motorised (kinematic) actuator parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KinematicActuatorConfig {
    /// Spring-cable parameters shared with the basic actuator.
    pub actuator: ActuatorConfig,
    /// Spool radius (m).
    pub motor_radius: f64,
    /// Maximum cable reel speed (m/s).
    pub max_speed: f64,
}

impl Default for KinematicActuatorConfig {
    fn default() -> Self {
        Self {
            actuator: ActuatorConfig::default(),
            motor_radius: 1.0,
            max_speed: 10.0,
        }
    }
}

impl KinematicActuatorConfig {
    pub fn new(
        actuator: ActuatorConfig,
        motor_radius: f64,
        max_speed: f64,
    ) -> Result<Self, ConfigurationError> {
        let config = Self {
            actuator,
            motor_radius,
            max_speed,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.actuator.validate()?;
        positive("motor_radius", self.motor_radius)?;
        positive("max_speed", self.max_speed)
    }
}

/// Settings for [`StructureCompiler`](crate::StructureCompiler).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Two flattened node positions closer than this are the same point (m).
    pub node_tolerance: f64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            node_tolerance: 1e-6,
        }
    }
}

impl CompilerConfig {
    pub fn new(node_tolerance: f64) -> Result<Self, ConfigurationError> {
        let config = Self { node_tolerance };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        positive("node_tolerance", self.node_tolerance)
    }
}

/// Settings for [`Simulation`](crate::Simulation).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Fixed step passed to the world and the model (s).
    pub step_size: f64,
    /// Simulated seconds between visitor passes.
    pub render_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_size: 1.0 / 1000.0,
            render_rate: 1.0 / 60.0,
        }
    }
}

impl SimulationConfig {
    pub fn new(step_size: f64, render_rate: f64) -> Result<Self, ConfigurationError> {
        positive("step_size", step_size)?;
        positive("render_rate", render_rate)?;
        Ok(Self {
            step_size,
            render_rate,
        })
    }
}

pub(crate) fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigurationError> {
    positive(field, value)
}

pub(crate) fn check_finite(field: &'static str, value: f64) -> Result<(), ConfigurationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigurationError::NotFinite { field })
    }
}
