//! Linear impedance law mapping a length/velocity set-point to a tension.

use crate::config::check_finite;
use crate::error::{ConfigurationError, PreconditionFault, Result};
use crate::model::Actuator;
use serde::{Deserialize, Serialize};

/// What the impedance law needs to read from an actuator.
pub trait ActuatorReadings {
    fn actual_length(&self) -> f64;
    fn actual_velocity(&self) -> f64;
    fn actual_tension(&self) -> f64;
    /// `(min, max)` commandable tension.
    fn tension_bounds(&self) -> (f64, f64);
}

impl ActuatorReadings for Actuator {
    fn actual_length(&self) -> f64 {
        Actuator::actual_length(self)
    }

    fn actual_velocity(&self) -> f64 {
        Actuator::actual_velocity(self)
    }

    fn actual_tension(&self) -> f64 {
        Actuator::actual_tension(self)
    }

    fn tension_bounds(&self) -> (f64, f64) {
        Actuator::tension_bounds(self)
    }
}

/// Position, velocity and tension gains, fixed at construction.
///
/// ```text
/// tension = kp * (length - target_length)
///         + kd * (velocity - target_velocity)
///         + kt * actual_tension
/// ```
///
/// The result is clamped to the actuator's tension bounds. There is no
/// integral term, so the output depends only on the current readings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImpedanceController {
    kp: f64,
    kd: f64,
    kt: f64,
}

impl ImpedanceController {
    pub fn new(kp: f64, kd: f64, kt: f64) -> std::result::Result<Self, ConfigurationError> {
        check_finite("kp", kp)?;
        check_finite("kd", kd)?;
        check_finite("kt", kt)?;
        Ok(Self { kp, kd, kt })
    }

    /// Position gain.
    pub fn kp(&self) -> f64 {
        self.kp
    }

    /// Velocity gain.
    pub fn kd(&self) -> f64 {
        self.kd
    }

    /// Tension feedback gain.
    pub fn kt(&self) -> f64 {
        self.kt
    }

    /// Commanded tension for `actuator` given a length and velocity set-point.
    ///
    /// `dt` must be positive; it does not otherwise affect the result.
    pub fn control<A: ActuatorReadings + ?Sized>(
        &self,
        actuator: &A,
        dt: f64,
        target_length: f64,
        target_velocity: f64,
    ) -> Result<f64> {
        PreconditionFault::check_dt(dt)?;
        let tension = self.kp * (actuator.actual_length() - target_length)
            + self.kd * (actuator.actual_velocity() - target_velocity)
            + self.kt * actuator.actual_tension();
        let (min, max) = actuator.tension_bounds();
        Ok(tension.clamp(min, max))
    }

    /// [`control`](Self::control) with a zero velocity set-point.
    pub fn control_length<A: ActuatorReadings + ?Sized>(
        &self,
        actuator: &A,
        dt: f64,
        target_length: f64,
    ) -> Result<f64> {
        self.control(actuator, dt, target_length, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Probe {
        length: f64,
        velocity: f64,
        tension: f64,
        bounds: (f64, f64),
    }

    impl ActuatorReadings for Probe {
        fn actual_length(&self) -> f64 {
            self.length
        }
        fn actual_velocity(&self) -> f64 {
            self.velocity
        }
        fn actual_tension(&self) -> f64 {
            self.tension
        }
        fn tension_bounds(&self) -> (f64, f64) {
            self.bounds
        }
    }

    fn probe(length: f64) -> Probe {
        Probe {
            length,
            velocity: 0.3,
            tension: 12.0,
            bounds: (f64::MIN, f64::MAX),
        }
    }

    #[test]
    fn pure_position_gain_is_linear_and_ignores_dt() {
        let law = ImpedanceController::new(250.0, 0.0, 0.0).unwrap();
        let actuator = probe(11.5);
        let coarse = law.control_length(&actuator, 0.1, 10.0).unwrap();
        let fine = law.control_length(&actuator, 1e-5, 10.0).unwrap();
        assert_eq!(coarse, 250.0 * (11.5 - 10.0));
        assert_eq!(coarse, fine);
    }

    #[test]
    fn all_three_terms_contribute() {
        let law = ImpedanceController::new(2.0, 3.0, 0.5).unwrap();
        let tension = law.control(&probe(5.0), 0.01, 4.0, 0.1).unwrap();
        let expected = 2.0 * 1.0 + 3.0 * (0.3 - 0.1) + 0.5 * 12.0;
        assert!((tension - expected).abs() < 1e-12);
    }

    #[test]
    fn output_is_clamped_to_actuator_bounds() {
        let law = ImpedanceController::new(1000.0, 0.0, 0.0).unwrap();
        let mut actuator = probe(10.0);
        actuator.bounds = (0.0, 500.0);
        assert_eq!(law.control_length(&actuator, 0.01, 0.0).unwrap(), 500.0);
        assert_eq!(law.control_length(&actuator, 0.01, 20.0).unwrap(), 0.0);
    }

    #[test]
    fn non_positive_dt_is_rejected() {
        let law = ImpedanceController::new(1.0, 1.0, 1.0).unwrap();
        for dt in [0.0, -0.01] {
            assert!(matches!(
                law.control_length(&probe(1.0), dt, 1.0),
                Err(Error::Precondition(PreconditionFault::NonPositiveTimeStep { .. }))
            ));
        }
    }

    #[test]
    fn non_finite_gain_is_a_configuration_error() {
        assert_eq!(
            ImpedanceController::new(f64::NAN, 0.0, 0.0),
            Err(ConfigurationError::NotFinite { field: "kp" })
        );
    }
}
