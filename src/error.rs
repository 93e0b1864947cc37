//! Error types for structure compilation and control.
//!
//! Every failure in this crate is fatal to the operation that raised it. The
//! four categories mirror the points at which things can go wrong: invalid
//! configuration values, malformed graphs, tags that no builder claims, and
//! violated runtime preconditions.

use glam::DVec3;
use thiserror::Error;

/// Top-level error for the crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value was rejected at construction time.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A structure graph was malformed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A pair could not be matched to a builder.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A runtime precondition was violated while stepping or controlling.
    #[error(transparent)]
    Precondition(#[from] PreconditionFault),
}

/// Invalid configuration values, detected before any graph is built.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A field that must be strictly positive was not.
    #[error("Configuration field '{field}' must be positive, got {value}")]
    NonPositive {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// A field that must be non-negative was negative.
    #[error("Configuration field '{field}' must be non-negative, got {value}")]
    Negative {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// A lower bound exceeded its upper bound.
    #[error("Configuration range '{field}' is inverted: min {min} > max {max}")]
    InvertedRange {
        /// Name of the offending range.
        field: &'static str,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },

    /// A value was NaN or infinite.
    #[error("Configuration field '{field}' must be finite")]
    NotFinite {
        /// Name of the offending field.
        field: &'static str,
    },
}

/// Structural problems with a [`StructureGraph`](crate::StructureGraph).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    /// A node handle does not exist in the graph it was used with.
    #[error("Node index {index} out of bounds (graph has {len} nodes)")]
    InvalidNode {
        /// The invalid index.
        index: usize,
        /// Number of nodes in the graph.
        len: usize,
    },

    /// Both endpoints of a pair are the same point.
    #[error("Degenerate pair tagged [{tags}]: both endpoints at {position}")]
    DegeneratePair {
        /// Tags of the offending pair.
        tags: String,
        /// The shared position.
        position: DVec3,
    },

    /// A connector endpoint does not coincide with any rigid attachment point.
    #[error("Connector tagged [{tags}] has no rigid attachment point at {position}")]
    UnanchoredConnector {
        /// Tags of the offending connector.
        tags: String,
        /// The unattached endpoint.
        position: DVec3,
    },
}

/// Failures while mapping tags to builders.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolutionError {
    /// None of the pair's tags has a registered builder.
    #[error("No builder registered for any of the tags [{tags}]")]
    UnresolvedTag {
        /// The tags that were tried, in order.
        tags: String,
    },
}

/// Runtime preconditions violated during stepping or control.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PreconditionFault {
    /// A time step was zero, negative or not finite.
    #[error("Time step must be positive, got {dt}")]
    NonPositiveTimeStep {
        /// The rejected step.
        dt: f64,
    },

    /// A model was stepped before `setup` or after `teardown`.
    #[error("Model is not set up")]
    NotSetUp,

    /// A controller tried to step the model it is observing.
    #[error("Re-entrant model step from inside a controller")]
    ReentrantStep,

    /// An actuator group name was never mapped.
    #[error("Actuator group '{0}' not found in actuator map")]
    UnknownGroup(String),

    /// An actuator id no longer refers to a live actuator.
    #[error("Actuator {0} not found in model")]
    MissingActuator(u32),

    /// A CPG phase index is outside the configured phase table.
    #[error("Phase index {index} out of bounds (phase table has {len} entries)")]
    UnknownPhase {
        /// The invalid index.
        index: usize,
        /// Number of configured phase offsets.
        len: usize,
    },
}

impl ConfigurationError {
    /// Create a non-positive field error.
    pub fn non_positive(field: &'static str, value: f64) -> Self {
        Self::NonPositive { field, value }
    }

    /// Create a negative field error.
    pub fn negative(field: &'static str, value: f64) -> Self {
        Self::Negative { field, value }
    }
}

impl PreconditionFault {
    /// Check that `dt` is a usable time step.
    pub fn check_dt(dt: f64) -> std::result::Result<(), Self> {
        if dt > 0.0 && dt.is_finite() {
            Ok(())
        } else {
            Err(Self::NonPositiveTimeStep { dt })
        }
    }
}

/// Result type for crate operations.
pub type Result<T> = std::result::Result<T, Error>;
