//! Central pattern generator producing travelling-wave set-points.

use crate::config::{check_finite, check_positive};
use crate::error::{ConfigurationError, PreconditionFault, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Oscillator parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CpgConfig {
    /// Angular frequency (rad/s) multiplying elapsed time.
    pub frequency: f64,
    /// Peak deviation from `offset`.
    pub amplitude: f64,
    /// Centre of oscillation.
    pub offset: f64,
    /// Number of full waves spanning the members of a group.
    pub body_waves: f64,
    /// Phase offset (rad) per group index.
    pub phase_offsets: Vec<f64>,
}

impl Default for CpgConfig {
    fn default() -> Self {
        Self {
            frequency: 2.51,
            amplitude: 20.0,
            offset: 0.0,
            body_waves: 1.0,
            phase_offsets: vec![PI / 2.0, 0.0, 0.0],
        }
    }
}

impl CpgConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        check_positive("frequency", self.frequency)?;
        check_finite("amplitude", self.amplitude)?;
        if self.amplitude < 0.0 {
            return Err(ConfigurationError::negative("amplitude", self.amplitude));
        }
        check_finite("offset", self.offset)?;
        check_finite("body_waves", self.body_waves)?;
        for phase in &self.phase_offsets {
            check_finite("phase_offsets", *phase)?;
        }
        Ok(())
    }
}

/// Sine oscillator shared by every group of a controller.
///
/// For member `i` of `n` in the group with phase index `g`:
///
/// ```text
/// cycle(t)  = sin(t * frequency + 2 * body_waves * π * i / n + phase_offsets[g])
/// target(t) = offset + amplitude * cycle(t)
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cpg {
    config: CpgConfig,
}

impl Cpg {
    pub fn new(config: CpgConfig) -> std::result::Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CpgConfig {
        &self.config
    }

    /// Time for one full oscillation, `2π / frequency`.
    pub fn period(&self) -> f64 {
        2.0 * PI / self.config.frequency
    }

    fn phase(&self, group: usize) -> Result<f64> {
        self.config
            .phase_offsets
            .get(group)
            .copied()
            .ok_or_else(|| {
                PreconditionFault::UnknownPhase {
                    index: group,
                    len: self.config.phase_offsets.len(),
                }
                .into()
            })
    }

    /// Unit oscillation in `[-1, 1]`.
    pub fn cycle(&self, t: f64, group: usize, index: usize, members: usize) -> Result<f64> {
        let members = members.max(1) as f64;
        let wave = 2.0 * self.config.body_waves * PI * index as f64 / members;
        Ok((t * self.config.frequency + wave + self.phase(group)?).sin())
    }

    /// Set-point in `[offset - amplitude, offset + amplitude]`.
    pub fn target(&self, t: f64, group: usize, index: usize, members: usize) -> Result<f64> {
        Ok(self.config.offset + self.config.amplitude * self.cycle(t, group, index, members)?)
    }
}
