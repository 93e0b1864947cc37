//! Tag-selected builders and the registry that maps tags to them.

use crate::blueprint::{BuildInfo, ConnectorConfig, ConnectorInfo, RigidInfo, ShapePrimitive};
use crate::config::{ActuatorConfig, BoxConfig, KinematicActuatorConfig, RodConfig};
use crate::error::{ConfigurationError, ResolutionError, Result};
use crate::tags::Tags;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A factory turning a tagged pair into an element description.
///
/// Each variant carries its own immutable config by value, so two build specs
/// never alias stiffness or density settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Builder {
    /// Cylindrical strut spanning the pair.
    Rod(RodConfig),
    /// Box-shaped link spanning the pair.
    Box(BoxConfig),
    /// Spring-cable actuator between the pair's endpoints.
    Connector(ActuatorConfig),
    /// Motor-driven cable actuator between the pair's endpoints.
    KinematicConnector(KinematicActuatorConfig),
}

impl Builder {
    pub fn rod(config: RodConfig) -> std::result::Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self::Rod(config))
    }

    pub fn cuboid(config: BoxConfig) -> std::result::Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self::Box(config))
    }

    pub fn connector(config: ActuatorConfig) -> std::result::Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self::Connector(config))
    }

    pub fn kinematic_connector(
        config: KinematicActuatorConfig,
    ) -> std::result::Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self::KinematicConnector(config))
    }

    /// Re-checks the carried config. Variants built directly skip the
    /// constructors, so the compiler calls this before using a builder.
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        match self {
            Self::Rod(config) => config.validate(),
            Self::Box(config) => config.validate(),
            Self::Connector(config) => config.validate(),
            Self::KinematicConnector(config) => config.validate(),
        }
    }

    /// True for builders that produce rigid links.
    pub fn is_rigid(&self) -> bool {
        matches!(self, Self::Rod(_) | Self::Box(_))
    }

    /// Describes the element spanning `from` → `to` (world coordinates).
    pub fn create_info(&self, tags: &Tags, from: DVec3, to: DVec3) -> BuildInfo {
        let length = from.distance(to);
        match self {
            Self::Rod(config) => {
                let shape = ShapePrimitive::Cylinder {
                    radius: config.radius,
                    height: length,
                };
                BuildInfo::Rigid(RigidInfo::spanning(
                    tags.clone(),
                    shape,
                    config.density,
                    from,
                    to,
                ))
            }
            Self::Box(config) => {
                let shape = ShapePrimitive::Box(DVec3::new(
                    config.width / 2.0,
                    length / 2.0,
                    config.height / 2.0,
                ));
                BuildInfo::Rigid(RigidInfo::spanning(
                    tags.clone(),
                    shape,
                    config.density,
                    from,
                    to,
                ))
            }
            Self::Connector(config) => BuildInfo::Connector(ConnectorInfo {
                tags: tags.clone(),
                config: ConnectorConfig::Basic(*config),
                ends: [from, to],
            }),
            Self::KinematicConnector(config) => BuildInfo::Connector(ConnectorInfo {
                tags: tags.clone(),
                config: ConnectorConfig::Kinematic(*config),
                ends: [from, to],
            }),
        }
    }
}

/// Registry mapping tags to builders.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BuildSpec {
    builders: HashMap<String, Builder>,
}

impl BuildSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `builder` under `tag`, replacing any earlier registration.
    pub fn add_builder(&mut self, tag: impl Into<String>, builder: Builder) {
        let tag = tag.into();
        if let Some(previous) = self.builders.insert(tag.clone(), builder) {
            debug!(%tag, ?previous, ?builder, "replaced builder registration");
        }
    }

    /// Chained form of [`add_builder`](Self::add_builder).
    pub fn with_builder(mut self, tag: impl Into<String>, builder: Builder) -> Self {
        self.add_builder(tag, builder);
        self
    }

    /// The builder for the first of `tags` (in insertion order) that has one.
    pub fn resolve(&self, tags: &Tags) -> Result<&Builder> {
        tags.iter()
            .find_map(|tag| self.builders.get(tag))
            .ok_or_else(|| {
                ResolutionError::UnresolvedTag {
                    tags: tags.to_string(),
                }
                .into()
            })
    }

    /// Validates every registered builder, in tag order.
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        let mut tags: Vec<&String> = self.builders.keys().collect();
        tags.sort();
        for tag in tags {
            self.builders[tag].validate()?;
        }
        Ok(())
    }

    pub fn get(&self, tag: &str) -> Option<&Builder> {
        self.builders.get(tag)
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}
