//! Intermediate, engine-agnostic descriptions produced by builders.
//!
//! A builder turns a tagged pair into either a [`RigidInfo`] or a
//! [`ConnectorInfo`]. The compiler then binds their endpoints to shared
//! [`AttachmentPoint`]s, groups rigids into compound bodies and hands the
//! result to a [`PhysicsWorld`](crate::PhysicsWorld).

use crate::config::{ActuatorConfig, KinematicActuatorConfig};
use crate::tags::{Tagged, Tags};
use crate::world::BodyHandle;
use bevy_heavy::ComputeMassProperties3d;
use bevy_math::primitives::{Cuboid, Cylinder};
use glam::{DAffine3, DQuat, DVec3, Vec3};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;

/// Supported geometric primitives for rigid links.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ShapePrimitive {
    /// A box defined by half-extents (x, y, z). Grows along Y.
    Box(DVec3),
    /// A cylinder defined by radius and height (aligned along Y axis).
    Cylinder { radius: f64, height: f64 },
}

/// A type-erased wrapper so we can call [`ComputeMassProperties3d`] on any variant.
#[derive(Clone, Copy, Debug)]
pub enum BevyPrimitive {
    Cuboid(Cuboid),
    Cylinder(Cylinder),
}

impl ComputeMassProperties3d for BevyPrimitive {
    fn mass(&self, density: f32) -> f32 {
        match self {
            Self::Cuboid(s) => s.mass(density),
            Self::Cylinder(s) => s.mass(density),
        }
    }

    fn unit_principal_angular_inertia(&self) -> Vec3 {
        match self {
            Self::Cuboid(s) => s.unit_principal_angular_inertia(),
            Self::Cylinder(s) => s.unit_principal_angular_inertia(),
        }
    }

    fn center_of_mass(&self) -> Vec3 {
        match self {
            Self::Cuboid(s) => s.center_of_mass(),
            Self::Cylinder(s) => s.center_of_mass(),
        }
    }
}

impl ShapePrimitive {
    /// Convert to the corresponding `bevy_math` primitive for mass-property computation.
    pub fn to_bevy_primitive(self) -> BevyPrimitive {
        match self {
            Self::Box(half_extents) => BevyPrimitive::Cuboid(Cuboid {
                half_size: half_extents.as_vec3(),
            }),
            Self::Cylinder { radius, height } => {
                BevyPrimitive::Cylinder(Cylinder::new(radius as f32, height as f32))
            }
        }
    }

    /// Mass in kg for the given density (kg/m^3), via `bevy_heavy`.
    pub fn mass(self, density: f64) -> f64 {
        self.to_bevy_primitive().mass(density as f32) as f64
    }

    /// Principal moments of inertia for a body of `mass` kg.
    pub fn principal_inertia(self, mass: f64) -> DVec3 {
        self.to_bevy_primitive()
            .unit_principal_angular_inertia()
            .as_dvec3()
            * mass
    }
}

/// One part of a compound body, posed relative to the body frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompoundPart {
    pub shape: ShapePrimitive,
    pub local: DAffine3,
}

/// The collision shape handed to the physics world.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BodyShape {
    /// A single primitive centred on the body frame.
    Primitive(ShapePrimitive),
    /// Several primitives rigidly fused, as for struts meeting at a node.
    Compound(Vec<CompoundPart>),
}

/// Description of one rigid link produced by a rigid builder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RigidInfo {
    pub tags: Tags,
    pub shape: ShapePrimitive,
    /// Mass in kg, computed from shape volume and density via `bevy_heavy`.
    pub mass: f64,
    /// Density in kg/m³ used to derive mass properties.
    pub density: f64,
    /// World-space centre of the link.
    pub position: DVec3,
    /// World-space orientation; the shape's Y axis points from `ends[0]` to `ends[1]`.
    pub rotation: DQuat,
    /// World-space endpoints of the originating pair.
    pub ends: [DVec3; 2],
}

impl RigidInfo {
    /// Places `shape` so that its Y axis spans `from` → `to`.
    pub fn spanning(
        tags: Tags,
        shape: ShapePrimitive,
        density: f64,
        from: DVec3,
        to: DVec3,
    ) -> Self {
        let axis = (to - from).normalize_or_zero();
        Self {
            tags,
            shape,
            mass: shape.mass(density),
            density,
            position: (from + to) * 0.5,
            rotation: DQuat::from_rotation_arc(DVec3::Y, axis),
            ends: [from, to],
        }
    }

    pub fn world_transform(&self) -> DAffine3 {
        DAffine3::from_rotation_translation(self.rotation, self.position)
    }

    pub fn length(&self) -> f64 {
        self.ends[0].distance(self.ends[1])
    }
}

impl Tagged for RigidInfo {
    fn tags(&self) -> &Tags {
        &self.tags
    }
}

/// The flavour of force element a connector builder produces.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConnectorConfig {
    /// Passive-plus-commanded spring cable.
    Basic(ActuatorConfig),
    /// Motor-driven cable with speed limits.
    Kinematic(KinematicActuatorConfig),
}

impl ConnectorConfig {
    /// The spring-cable parameters common to every flavour.
    pub fn actuator(&self) -> &ActuatorConfig {
        match self {
            Self::Basic(config) => config,
            Self::Kinematic(config) => &config.actuator,
        }
    }
}

/// Description of one connector produced by a connector builder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectorInfo {
    pub tags: Tags,
    pub config: ConnectorConfig,
    /// World-space endpoints of the originating pair.
    pub ends: [DVec3; 2],
}

impl ConnectorInfo {
    pub fn rest_length(&self) -> f64 {
        self.ends[0].distance(self.ends[1])
    }
}

impl Tagged for ConnectorInfo {
    fn tags(&self) -> &Tags {
        &self.tags
    }
}

/// What a builder made of a pair.
#[derive(Clone, Debug)]
pub enum BuildInfo {
    Rigid(RigidInfo),
    Connector(ConnectorInfo),
}

/// A shared location where rigid links and connectors meet.
///
/// Exactly one instance exists per distinct flattened node position touched by
/// a rigid pair. Every rigid link and connector ending there holds the same
/// `Rc<AttachmentPoint>`, so identity can be checked with [`Rc::ptr_eq`](std::rc::Rc::ptr_eq).
#[derive(Debug)]
pub struct AttachmentPoint {
    id: usize,
    position: DVec3,
    body: OnceCell<BodyHandle>,
}

impl AttachmentPoint {
    pub(crate) fn new(id: usize, position: DVec3) -> Self {
        Self {
            id,
            position,
            body: OnceCell::new(),
        }
    }

    /// Index of this point in creation order.
    pub fn id(&self) -> usize {
        self.id
    }

    /// World-space position at build time.
    pub fn position(&self) -> DVec3 {
        self.position
    }

    /// The physical body this point is welded to, once instantiated.
    pub fn body(&self) -> Option<BodyHandle> {
        self.body.get().copied()
    }

    pub(crate) fn bind(&self, body: BodyHandle) {
        // A point belongs to exactly one compound, so the first bind wins.
        let _ = self.body.set(body);
    }
}
