//! Compiler that turns a [`StructureGraph`] into a runtime [`Model`].
//!
//! The entry point is [`StructureCompiler`]. Give it a graph and a
//! [`BuildSpec`], then call [`StructureCompiler::build_into`] with a target
//! model and a [`PhysicsWorld`].
//!
//! # Pipeline
//!
//! 1. **Resolve** every pair over the whole tree: look its tags up in the
//!    build spec and let the builder describe it. The compiler config and
//!    every registered builder are validated before the first pair.
//! 2. **Rigid pass**: every rigid description claims its two attachment
//!    points. The first reference to a location creates the point; every later
//!    reference within tolerance reuses the same `Rc`.
//! 3. **Connector pass**: connector ends bind to existing points only.
//! 4. **Compounds**: rigids that share a point are fused into one body.
//! 5. **Instantiate** bodies and constraints in the world and mirror the graph
//!    hierarchy into the model.
//!
//! Steps 1–4 have no side effects, and step 5 cannot fail, so an error leaves
//! both the model and the world exactly as they were.

use crate::blueprint::{
    AttachmentPoint, BodyShape, BuildInfo, CompoundPart, ConnectorInfo, RigidInfo,
};
use crate::builder::BuildSpec;
use crate::config::CompilerConfig;
use crate::error::{GraphError, Result};
use crate::model::{Actuator, ActuatorId, Model, RigidBody};
use crate::structure::{NodeId, StructureGraph};
use crate::tags::{Tagged, Tags};
use crate::world::{BodyHandle, ConnectorState, PhysicsWorld};
use glam::{DAffine3, DVec3};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, info};

/// One level of the resolved hierarchy. Indices point into the blueprint's
/// flat rigid and connector lists.
#[derive(Clone, Debug, Default)]
pub struct BlueprintLevel {
    pub tags: Tags,
    pub rigids: Vec<usize>,
    pub connectors: Vec<usize>,
    pub children: Vec<BlueprintLevel>,
}

/// A rigid description bound to its attachment points.
#[derive(Clone, Debug)]
pub struct PlannedRigid {
    pub info: RigidInfo,
    pub ends: [Rc<AttachmentPoint>; 2],
    /// Index into [`StructureBlueprint::compounds`].
    pub compound: usize,
}

/// A connector description bound to existing attachment points.
#[derive(Clone, Debug)]
pub struct PlannedConnector {
    pub info: ConnectorInfo,
    pub ends: [Rc<AttachmentPoint>; 2],
}

/// A physical body made of one or more rigid descriptions.
#[derive(Clone, Debug)]
pub struct Compound {
    /// Indices into [`StructureBlueprint::rigids`].
    pub members: Vec<usize>,
    pub shape: BodyShape,
    pub mass: f64,
    /// World pose of the body frame.
    pub transform: DAffine3,
}

/// The fully resolved, not yet instantiated result of compilation.
#[derive(Clone, Debug, Default)]
pub struct StructureBlueprint {
    pub root: BlueprintLevel,
    pub rigids: Vec<PlannedRigid>,
    pub connectors: Vec<PlannedConnector>,
    pub points: Vec<Rc<AttachmentPoint>>,
    pub compounds: Vec<Compound>,
}

/// Interns flattened positions into shared attachment points.
struct AttachmentRegistry {
    points: Vec<Rc<AttachmentPoint>>,
    tolerance_sq: f64,
}

impl AttachmentRegistry {
    fn new(tolerance: f64) -> Self {
        Self {
            points: Vec::new(),
            tolerance_sq: tolerance * tolerance,
        }
    }

    fn lookup(&self, position: DVec3) -> Option<Rc<AttachmentPoint>> {
        self.points
            .iter()
            .find(|p| p.position().distance_squared(position) <= self.tolerance_sq)
            .cloned()
    }

    fn intern(&mut self, position: DVec3) -> Rc<AttachmentPoint> {
        if let Some(point) = self.lookup(position) {
            return point;
        }
        let point = Rc::new(AttachmentPoint::new(self.points.len(), position));
        self.points.push(Rc::clone(&point));
        point
    }
}

/// Disjoint sets over rigid indices.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb.max(ra)] = ra.min(rb);
        }
    }
}

/// Compiles a structure graph against a build spec.
pub struct StructureCompiler {
    graph: StructureGraph,
    spec: BuildSpec,
    config: CompilerConfig,
}

impl StructureCompiler {
    /// Takes ownership of the graph and the spec for this compilation.
    pub fn new(graph: StructureGraph, spec: BuildSpec) -> Self {
        Self {
            graph,
            spec,
            config: CompilerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn graph(&self) -> &StructureGraph {
        &self.graph
    }

    pub fn spec(&self) -> &BuildSpec {
        &self.spec
    }

    /// Resolves the whole graph without touching any world or model.
    ///
    /// The compiler config and every registered builder are validated first,
    /// before any pair is visited.
    pub fn blueprint(&self) -> Result<StructureBlueprint> {
        self.config.validate()?;
        self.spec.validate()?;
        let mut rigid_infos = Vec::new();
        let mut connector_infos = Vec::new();
        let root = self.resolve_level(&self.graph, &mut rigid_infos, &mut connector_infos)?;
        debug!(
            rigids = rigid_infos.len(),
            connectors = connector_infos.len(),
            "resolved structure tags"
        );

        let mut registry = AttachmentRegistry::new(self.config.node_tolerance);
        let rigid_ends: Vec<[Rc<AttachmentPoint>; 2]> = rigid_infos
            .iter()
            .map(|info| [registry.intern(info.ends[0]), registry.intern(info.ends[1])])
            .collect();

        let mut connectors = Vec::with_capacity(connector_infos.len());
        for info in connector_infos {
            let ends = [
                Self::anchor(&registry, &info, info.ends[0])?,
                Self::anchor(&registry, &info, info.ends[1])?,
            ];
            connectors.push(PlannedConnector { info, ends });
        }

        let (compounds, membership) =
            Self::group_compounds(&rigid_infos, &rigid_ends, registry.points.len());
        debug!(
            points = registry.points.len(),
            bodies = compounds.len(),
            "bound attachment points"
        );

        let rigids = rigid_infos
            .into_iter()
            .zip(rigid_ends)
            .zip(membership)
            .map(|((info, ends), compound)| PlannedRigid {
                info,
                ends,
                compound,
            })
            .collect();

        Ok(StructureBlueprint {
            root,
            rigids,
            connectors,
            points: registry.points,
            compounds,
        })
    }

    /// Compiles the graph into `model` and registers it with `world`.
    ///
    /// On error neither `model` nor `world` has been modified.
    pub fn build_into<W: PhysicsWorld + ?Sized>(
        &self,
        model: &mut Model,
        world: &mut W,
    ) -> Result<()> {
        let blueprint = self.blueprint()?;
        blueprint.instantiate(model, world);
        Ok(())
    }

    fn resolve_level(
        &self,
        graph: &StructureGraph,
        rigids: &mut Vec<RigidInfo>,
        connectors: &mut Vec<ConnectorInfo>,
    ) -> Result<BlueprintLevel> {
        let mut level = BlueprintLevel {
            tags: graph.tags().clone(),
            ..Default::default()
        };
        for pair in graph.pairs() {
            let from = Self::endpoint(graph, pair.from)?;
            let to = Self::endpoint(graph, pair.to)?;
            if from.distance(to) <= self.config.node_tolerance {
                return Err(GraphError::DegeneratePair {
                    tags: pair.tags.to_string(),
                    position: from,
                }
                .into());
            }
            let builder = self.spec.resolve(&pair.tags)?;
            match builder.create_info(&pair.tags, from, to) {
                BuildInfo::Rigid(info) => {
                    level.rigids.push(rigids.len());
                    rigids.push(info);
                }
                BuildInfo::Connector(info) => {
                    level.connectors.push(connectors.len());
                    connectors.push(info);
                }
            }
        }
        for child in graph.children() {
            level
                .children
                .push(self.resolve_level(child, rigids, connectors)?);
        }
        Ok(level)
    }

    fn endpoint(graph: &StructureGraph, id: NodeId) -> Result<DVec3> {
        graph.node(id).ok_or_else(|| {
            GraphError::InvalidNode {
                index: id.0,
                len: graph.nodes().len(),
            }
            .into()
        })
    }

    fn anchor(
        registry: &AttachmentRegistry,
        info: &ConnectorInfo,
        position: DVec3,
    ) -> Result<Rc<AttachmentPoint>> {
        registry.lookup(position).ok_or_else(|| {
            GraphError::UnanchoredConnector {
                tags: info.tags().to_string(),
                position,
            }
            .into()
        })
    }

    /// Groups rigids sharing any attachment point. Returns the compounds and,
    /// for every rigid, the index of its compound.
    fn group_compounds(
        infos: &[RigidInfo],
        ends: &[[Rc<AttachmentPoint>; 2]],
        point_count: usize,
    ) -> (Vec<Compound>, Vec<usize>) {
        let mut sets = UnionFind::new(infos.len());
        let mut first_user: Vec<Option<usize>> = vec![None; point_count];
        for (i, pair) in ends.iter().enumerate() {
            for point in pair {
                match first_user[point.id()] {
                    Some(j) => sets.union(i, j),
                    None => first_user[point.id()] = Some(i),
                }
            }
        }

        let mut root_to_compound: HashMap<usize, usize> = HashMap::new();
        let mut members: Vec<Vec<usize>> = Vec::new();
        let mut membership = Vec::with_capacity(infos.len());
        for i in 0..infos.len() {
            let root = sets.find(i);
            let compound = *root_to_compound.entry(root).or_insert_with(|| {
                members.push(Vec::new());
                members.len() - 1
            });
            members[compound].push(i);
            membership.push(compound);
        }

        let compounds = members
            .into_iter()
            .map(|members| Self::fuse(infos, members))
            .collect();
        (compounds, membership)
    }

    fn fuse(infos: &[RigidInfo], members: Vec<usize>) -> Compound {
        if let [only] = members[..] {
            let info = &infos[only];
            return Compound {
                members,
                shape: BodyShape::Primitive(info.shape),
                mass: info.mass,
                transform: info.world_transform(),
            };
        }
        let mass: f64 = members.iter().map(|&i| infos[i].mass).sum();
        let centre = if mass > 0.0 {
            members
                .iter()
                .map(|&i| infos[i].position * infos[i].mass)
                .sum::<DVec3>()
                / mass
        } else {
            members.iter().map(|&i| infos[i].position).sum::<DVec3>() / members.len() as f64
        };
        let to_local = DAffine3::from_translation(-centre);
        let parts = members
            .iter()
            .map(|&i| CompoundPart {
                shape: infos[i].shape,
                local: to_local * infos[i].world_transform(),
            })
            .collect();
        Compound {
            members,
            shape: BodyShape::Compound(parts),
            mass,
            transform: DAffine3::from_translation(centre),
        }
    }
}

impl StructureBlueprint {
    /// Registers every body and constraint with `world` and fills `model`.
    pub fn instantiate<W: PhysicsWorld + ?Sized>(self, model: &mut Model, world: &mut W) {
        let handles: Vec<BodyHandle> = self
            .compounds
            .iter()
            .map(|c| world.create_rigid_body(&c.shape, c.mass, c.transform))
            .collect();
        for rigid in &self.rigids {
            for end in &rigid.ends {
                end.bind(handles[rigid.compound]);
            }
        }

        let mut next_id = model
            .all_actuators()
            .iter()
            .map(|a| a.id().0 + 1)
            .max()
            .unwrap_or(0);

        let point_compounds = self.point_compounds();
        let mut state = Instantiation {
            blueprint: &self,
            handles: &handles,
            point_compounds: &point_compounds,
            next_id: &mut next_id,
        };
        model.add_tags(&self.root.tags);
        state.fill(model, &self.root, world);
        model.setup();
        info!(
            rigids = self.rigids.len(),
            actuators = self.connectors.len(),
            bodies = handles.len(),
            "structure built"
        );
    }

    /// Compound index of every attachment point, by point id.
    fn point_compounds(&self) -> Vec<usize> {
        let mut compounds = vec![0; self.points.len()];
        for rigid in &self.rigids {
            for end in &rigid.ends {
                compounds[end.id()] = rigid.compound;
            }
        }
        compounds
    }
}

struct Instantiation<'a> {
    blueprint: &'a StructureBlueprint,
    handles: &'a [BodyHandle],
    point_compounds: &'a [usize],
    next_id: &'a mut u32,
}

impl Instantiation<'_> {
    fn body_of(&self, point: &AttachmentPoint) -> (BodyHandle, DAffine3) {
        let compound = self.point_compounds[point.id()];
        (
            self.handles[compound],
            self.blueprint.compounds[compound].transform,
        )
    }

    fn fill<W: PhysicsWorld + ?Sized>(
        &mut self,
        model: &mut Model,
        level: &BlueprintLevel,
        world: &mut W,
    ) {
        for &i in &level.rigids {
            let planned = &self.blueprint.rigids[i];
            model.push_rigid(RigidBody {
                tags: planned.info.tags.clone(),
                shape: planned.info.shape,
                mass: planned.info.mass,
                transform: planned.info.world_transform(),
                ends: planned.ends.clone(),
                body: self.handles[planned.compound],
            });
        }
        for &i in &level.connectors {
            let planned = &self.blueprint.connectors[i];
            let (body_a, frame_a) = self.body_of(&planned.ends[0]);
            let (body_b, frame_b) = self.body_of(&planned.ends[1]);
            let pivot_a = frame_a.inverse().transform_point3(planned.ends[0].position());
            let pivot_b = frame_b.inverse().transform_point3(planned.ends[1].position());
            let constraint =
                world.create_constraint(body_a, body_b, pivot_a, pivot_b, &planned.info.config);
            let rest_length = planned.info.rest_length();
            let id = ActuatorId(*self.next_id);
            *self.next_id += 1;
            model.push_actuator(Actuator {
                id,
                tags: planned.info.tags.clone(),
                config: planned.info.config,
                ends: planned.ends.clone(),
                constraint,
                rest_length,
                state: world.connector_state(constraint).unwrap_or(ConnectorState {
                    length: rest_length,
                    velocity: 0.0,
                    tension: planned.info.config.actuator().pretension,
                }),
                commanded: None,
            });
        }
        for child_level in &level.children {
            let mut child = Model::with_tags(child_level.tags.clone());
            self.fill(&mut child, child_level, world);
            model.push_child(child);
        }
    }
}
