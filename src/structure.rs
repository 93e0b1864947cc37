//! Declarative structure graphs: nodes, tagged pairs and nested children.

use crate::config::check_finite;
use crate::error::{ConfigurationError, GraphError, Result};
use crate::tags::{Tagged, Tags};
use glam::{DAffine3, DVec3};
use serde::{Deserialize, Serialize};

/// Handle to a node, valid only for the graph that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// A tagged edge between two nodes of the same graph.
///
/// The concrete element it becomes (strut, box, cable) is decided later by
/// looking its tags up in a [`BuildSpec`](crate::BuildSpec).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub from: NodeId,
    pub to: NodeId,
    pub tags: Tags,
}

impl Tagged for Pair {
    fn tags(&self) -> &Tags {
        &self.tags
    }
}

/// A hierarchical description of a structure prior to instantiation.
///
/// Transforms are applied eagerly: [`move_by`](Self::move_by) and
/// [`add_rotation`](Self::add_rotation) update this graph's nodes and every
/// descendant's nodes immediately, in call order, and fold the same operation
/// into [`transform`](Self::transform). Children added later are not affected
/// by transforms applied before they were added.
///
/// Cross-child wiring is done by reading a child's flattened node positions
/// and adding them as nodes of the parent; the compiler unifies coincident
/// positions.
///
/// ```
/// use tensegrity_kit::StructureGraph;
///
/// let mut segment = StructureGraph::new();
/// let a = segment.add_node(0.0, 0.0, 0.0);
/// let b = segment.add_node(0.0, 2.0, 0.0);
/// segment.add_pair(a, b, "rod").unwrap();
///
/// let mut spine = StructureGraph::new();
/// spine.add_child(segment);
/// spine.move_by(glam::DVec3::new(0.0, 5.0, 0.0));
/// assert_eq!(spine.children()[0].nodes()[1], glam::DVec3::new(0.0, 7.0, 0.0));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StructureGraph {
    nodes: Vec<DVec3>,
    pairs: Vec<Pair>,
    children: Vec<StructureGraph>,
    tags: Tags,
    transform: DAffine3,
}

impl Default for StructureGraph {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            pairs: Vec::new(),
            children: Vec::new(),
            tags: Tags::new(),
            transform: DAffine3::IDENTITY,
        }
    }
}

impl StructureGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty graph carrying `tags`.
    pub fn with_tags(tags: impl Into<Tags>) -> Self {
        Self {
            tags: tags.into(),
            ..Self::default()
        }
    }

    pub fn add_node(&mut self, x: f64, y: f64, z: f64) -> NodeId {
        self.add_node_at(DVec3::new(x, y, z))
    }

    pub fn add_node_at(&mut self, position: DVec3) -> NodeId {
        self.nodes.push(position);
        NodeId(self.nodes.len() - 1)
    }

    /// Joins two nodes of this graph with a tagged pair.
    ///
    /// Fails with [`GraphError::InvalidNode`] if either handle is out of range
    /// and [`GraphError::DegeneratePair`] if both handles are the same node.
    pub fn add_pair(&mut self, from: NodeId, to: NodeId, tags: impl Into<Tags>) -> Result<()> {
        let tags = tags.into();
        for id in [from, to] {
            if id.0 >= self.nodes.len() {
                return Err(GraphError::InvalidNode {
                    index: id.0,
                    len: self.nodes.len(),
                }
                .into());
            }
        }
        if from == to {
            return Err(GraphError::DegeneratePair {
                tags: tags.to_string(),
                position: self.nodes[from.0],
            }
            .into());
        }
        self.pairs.push(Pair { from, to, tags });
        Ok(())
    }

    /// Takes ownership of `child` as the next sub-structure.
    pub fn add_child(&mut self, child: StructureGraph) {
        self.children.push(child);
    }

    /// Tags this (sub)structure. The compiled child model carries these tags.
    pub fn add_tags(&mut self, tags: impl Into<Tags>) {
        self.tags.extend_from(&tags.into());
    }

    /// Translates this graph and all descendants by `offset`.
    pub fn move_by(&mut self, offset: DVec3) {
        self.apply(&DAffine3::from_translation(offset));
    }

    /// Rotates this graph and all descendants by `angle` radians about `axis`
    /// passing through `pivot`.
    pub fn add_rotation(&mut self, pivot: DVec3, axis: DVec3, angle: f64) -> Result<()> {
        check_finite("angle", angle)?;
        let axis = axis.try_normalize().ok_or(ConfigurationError::NonPositive {
            field: "rotation axis length",
            value: axis.length(),
        })?;
        let rotation = DAffine3::from_translation(pivot)
            * DAffine3::from_axis_angle(axis, angle)
            * DAffine3::from_translation(-pivot);
        self.apply(&rotation);
        Ok(())
    }

    /// Applies an arbitrary affine transform to this graph and all descendants.
    pub fn apply(&mut self, transform: &DAffine3) {
        for node in &mut self.nodes {
            *node = transform.transform_point3(*node);
        }
        for child in &mut self.children {
            child.apply(transform);
        }
        self.transform = *transform * self.transform;
    }

    /// Flattened node positions, indexed by [`NodeId`].
    pub fn nodes(&self) -> &[DVec3] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<DVec3> {
        self.nodes.get(id.0).copied()
    }

    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    pub fn children(&self) -> &[StructureGraph] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [StructureGraph] {
        &mut self.children
    }

    /// Every transform applied to this graph so far, composed in call order.
    pub fn transform(&self) -> DAffine3 {
        self.transform
    }

    /// Number of pairs in this graph and all descendants.
    pub fn total_pairs(&self) -> usize {
        self.pairs.len() + self.children.iter().map(Self::total_pairs).sum::<usize>()
    }

    /// Number of nodes in this graph and all descendants.
    pub fn total_nodes(&self) -> usize {
        self.nodes.len() + self.children.iter().map(Self::total_nodes).sum::<usize>()
    }
}

impl Tagged for StructureGraph {
    fn tags(&self) -> &Tags {
        &self.tags
    }
}
