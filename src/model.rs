//! Runtime model tree produced by the compiler.
//!
//! A [`Model`] mirrors the hierarchy of the [`StructureGraph`](crate::StructureGraph)
//! it was built from. Each level owns its rigid links, its actuators and its
//! child models. Controllers are observed through weak references only.

use crate::blueprint::{AttachmentPoint, ConnectorConfig, ShapePrimitive};
use crate::control::Controller;
use crate::error::{PreconditionFault, Result};
use crate::tags::{Tagged, Tags};
use crate::world::{BodyHandle, ConnectorState, ConstraintHandle, PhysicsWorld};
use glam::{DAffine3, DVec3};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, info, trace};

/// Stable identifier of an actuator within one compiled model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActuatorId(pub u32);

impl fmt::Display for ActuatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A rigid link owned by a model.
#[derive(Debug)]
pub struct RigidBody {
    pub(crate) tags: Tags,
    pub(crate) shape: ShapePrimitive,
    pub(crate) mass: f64,
    pub(crate) transform: DAffine3,
    pub(crate) ends: [Rc<AttachmentPoint>; 2],
    pub(crate) body: BodyHandle,
}

impl RigidBody {
    pub fn shape(&self) -> ShapePrimitive {
        self.shape
    }

    /// Mass of this link alone (kg).
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// World pose of the link at build time.
    pub fn transform(&self) -> DAffine3 {
        self.transform
    }

    /// The shared attachment points at either end.
    pub fn attachments(&self) -> &[Rc<AttachmentPoint>; 2] {
        &self.ends
    }

    /// The physical (possibly compound) body this link is part of.
    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub fn length(&self) -> f64 {
        self.ends[0].position().distance(self.ends[1].position())
    }
}

impl Tagged for RigidBody {
    fn tags(&self) -> &Tags {
        &self.tags
    }
}

/// A tension-commandable connector owned by a model.
#[derive(Debug)]
pub struct Actuator {
    pub(crate) id: ActuatorId,
    pub(crate) tags: Tags,
    pub(crate) config: ConnectorConfig,
    pub(crate) ends: [Rc<AttachmentPoint>; 2],
    pub(crate) constraint: ConstraintHandle,
    pub(crate) rest_length: f64,
    pub(crate) state: ConnectorState,
    pub(crate) commanded: Option<f64>,
}

impl Actuator {
    pub fn id(&self) -> ActuatorId {
        self.id
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// The attachment points this actuator pulls between.
    pub fn attachments(&self) -> &[Rc<AttachmentPoint>; 2] {
        &self.ends
    }

    pub fn constraint(&self) -> ConstraintHandle {
        self.constraint
    }

    /// Endpoint distance at build time (m).
    pub fn rest_length(&self) -> f64 {
        self.rest_length
    }

    /// Latest readings synced from the physics world.
    pub fn state(&self) -> ConnectorState {
        self.state
    }

    pub fn actual_length(&self) -> f64 {
        self.state.length
    }

    pub fn actual_velocity(&self) -> f64 {
        self.state.velocity
    }

    pub fn actual_tension(&self) -> f64 {
        self.state.tension
    }

    /// `(min, max)` commandable tension.
    pub fn tension_bounds(&self) -> (f64, f64) {
        let config = self.config.actuator();
        (config.min_tension, config.max_tension)
    }

    /// Tension most recently commanded by a controller, if any.
    pub fn commanded_tension(&self) -> Option<f64> {
        self.commanded
    }

    /// Commands the tension the world should realise on its next step.
    /// The value is clamped to [`tension_bounds`](Self::tension_bounds).
    pub fn set_commanded_tension(&mut self, tension: f64) {
        let (min, max) = self.tension_bounds();
        self.commanded = Some(tension.clamp(min, max));
    }

    pub(crate) fn sync(&mut self, state: ConnectorState) {
        self.state = state;
    }
}

impl Tagged for Actuator {
    fn tags(&self) -> &Tags {
        &self.tags
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
enum Lifecycle {
    #[default]
    Pending,
    Live,
    TornDown,
}

/// Read-only traversal hook for renderers and loggers.
pub trait ModelVisitor {
    fn visit_model(&mut self, _model: &Model) {}
    fn visit_rigid(&mut self, _rigid: &RigidBody) {}
    fn visit_actuator(&mut self, _actuator: &Actuator) {}
}

/// Counts what a model tree contains.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelSummary {
    pub models: usize,
    pub rigids: usize,
    pub actuators: usize,
    pub bodies: BTreeSet<BodyHandle>,
    pub mass: f64,
}

impl ModelVisitor for ModelSummary {
    fn visit_model(&mut self, _model: &Model) {
        self.models += 1;
    }

    fn visit_rigid(&mut self, rigid: &RigidBody) {
        self.rigids += 1;
        self.mass += rigid.mass;
        self.bodies.insert(rigid.body);
    }

    fn visit_actuator(&mut self, _actuator: &Actuator) {
        self.actuators += 1;
    }
}

/// Types that can be looked up in a model tree by tag.
pub trait Queryable: Sized {
    /// Appends every match under `model` to `out`, in pre-order.
    fn query<'a>(model: &'a Model, tag: &str, out: &mut Vec<&'a Self>);
}

/// Types that can be looked up mutably.
pub trait QueryableMut: Queryable {
    fn query_mut<'a>(model: &'a mut Model, tag: &str, out: &mut Vec<&'a mut Self>);
}

impl Queryable for RigidBody {
    fn query<'a>(model: &'a Model, tag: &str, out: &mut Vec<&'a Self>) {
        out.extend(model.rigids.iter().filter(|r| r.has_tag(tag)));
        for child in &model.children {
            Self::query(child, tag, out);
        }
    }
}

impl QueryableMut for RigidBody {
    fn query_mut<'a>(model: &'a mut Model, tag: &str, out: &mut Vec<&'a mut Self>) {
        out.extend(model.rigids.iter_mut().filter(|r| r.has_tag(tag)));
        for child in model.children.iter_mut() {
            Self::query_mut(child, tag, out);
        }
    }
}

impl Queryable for Actuator {
    fn query<'a>(model: &'a Model, tag: &str, out: &mut Vec<&'a Self>) {
        out.extend(model.actuators.iter().filter(|a| a.has_tag(tag)));
        for child in &model.children {
            Self::query(child, tag, out);
        }
    }
}

impl QueryableMut for Actuator {
    fn query_mut<'a>(model: &'a mut Model, tag: &str, out: &mut Vec<&'a mut Self>) {
        out.extend(model.actuators.iter_mut().filter(|a| a.has_tag(tag)));
        for child in model.children.iter_mut() {
            Self::query_mut(child, tag, out);
        }
    }
}

/// Sub-models are searched among descendants only, never the model itself.
impl Queryable for Model {
    fn query<'a>(model: &'a Model, tag: &str, out: &mut Vec<&'a Self>) {
        for child in &model.children {
            if child.has_tag(tag) {
                out.push(child);
            }
            Self::query(child, tag, out);
        }
    }
}

/// A compiled, steppable tree of rigid links and actuators.
#[derive(Default)]
pub struct Model {
    tags: Tags,
    rigids: Vec<RigidBody>,
    actuators: Vec<Actuator>,
    children: Vec<Model>,
    controllers: Vec<Weak<RefCell<dyn Controller>>>,
    lifecycle: Lifecycle,
    stepping: bool,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(tags: impl Into<Tags>) -> Self {
        Self {
            tags: tags.into(),
            ..Self::default()
        }
    }

    pub(crate) fn push_rigid(&mut self, rigid: RigidBody) {
        self.rigids.push(rigid);
    }

    pub(crate) fn push_actuator(&mut self, actuator: Actuator) {
        self.actuators.push(actuator);
    }

    pub(crate) fn push_child(&mut self, child: Model) {
        self.children.push(child);
    }

    pub(crate) fn add_tags(&mut self, tags: &Tags) {
        self.tags.extend_from(tags);
    }

    /// Every `T` under this model carrying `tag`, in pre-order. Never fails.
    pub fn find<T: Queryable>(&self, tag: &str) -> Vec<&T> {
        let mut out = Vec::new();
        T::query(self, tag, &mut out);
        out
    }

    /// Mutable form of [`find`](Self::find).
    pub fn find_mut<T: QueryableMut>(&mut self, tag: &str) -> Vec<&mut T> {
        let mut out = Vec::new();
        T::query_mut(self, tag, &mut out);
        out
    }

    /// Rigid links owned directly by this level.
    pub fn rigids(&self) -> &[RigidBody] {
        &self.rigids
    }

    /// Actuators owned directly by this level.
    pub fn actuators(&self) -> &[Actuator] {
        &self.actuators
    }

    pub fn children(&self) -> &[Model] {
        &self.children
    }

    /// A direct child, for attaching controllers to a sub-structure.
    pub fn child_mut(&mut self, index: usize) -> Option<&mut Model> {
        self.children.get_mut(index)
    }

    pub fn actuator(&self, id: ActuatorId) -> Option<&Actuator> {
        self.actuators
            .iter()
            .find(|a| a.id == id)
            .or_else(|| self.children.iter().find_map(|c| c.actuator(id)))
    }

    pub fn actuator_mut(&mut self, id: ActuatorId) -> Option<&mut Actuator> {
        if let Some(pos) = self.actuators.iter().position(|a| a.id == id) {
            return self.actuators.get_mut(pos);
        }
        self.children.iter_mut().find_map(|c| c.actuator_mut(id))
    }

    /// Every actuator in the tree, in pre-order.
    pub fn all_actuators(&self) -> Vec<&Actuator> {
        let mut out: Vec<&Actuator> = self.actuators.iter().collect();
        for child in &self.children {
            out.extend(child.all_actuators());
        }
        out
    }

    /// Every rigid link in the tree, in pre-order.
    pub fn all_rigids(&self) -> Vec<&RigidBody> {
        let mut out: Vec<&RigidBody> = self.rigids.iter().collect();
        for child in &self.children {
            out.extend(child.all_rigids());
        }
        out
    }

    fn for_each_actuator_mut(&mut self, f: &mut impl FnMut(&mut Actuator)) {
        for actuator in &mut self.actuators {
            f(actuator);
        }
        for child in &mut self.children {
            child.for_each_actuator_mut(f);
        }
    }

    /// Marks this model and its descendants ready to step. Idempotent.
    ///
    /// Always walks the whole tree, so children added to a live model by a
    /// later build come up too.
    pub fn setup(&mut self) {
        self.lifecycle = Lifecycle::Live;
        for child in &mut self.children {
            child.setup();
        }
    }

    pub fn is_live(&self) -> bool {
        self.lifecycle == Lifecycle::Live
    }

    /// Registers an observer. The model keeps only a weak reference, so
    /// dropping the controller elsewhere detaches it.
    pub fn attach<C: Controller + 'static>(&mut self, controller: &Rc<RefCell<C>>) -> Result<()> {
        controller
            .try_borrow_mut()
            .map_err(|_| PreconditionFault::ReentrantStep)?
            .on_attach(self)?;
        let shared: Rc<RefCell<dyn Controller>> = controller.clone();
        self.controllers.push(Rc::downgrade(&shared));
        debug!(controllers = self.controllers.len(), "attached controller");
        Ok(())
    }

    /// Number of controllers still alive.
    pub fn controller_count(&self) -> usize {
        self.controllers.iter().filter(|c| c.strong_count() > 0).count()
    }

    /// Steps child models, then notifies this model's controllers in attachment order.
    ///
    /// The whole subtree is marked as stepping until this call returns, so a
    /// controller cannot step this model or any descendant again.
    pub fn step(&mut self, dt: f64) -> Result<()> {
        PreconditionFault::check_dt(dt)?;
        if self.stepping {
            return Err(PreconditionFault::ReentrantStep.into());
        }
        if self.lifecycle != Lifecycle::Live {
            return Err(PreconditionFault::NotSetUp.into());
        }
        self.set_stepping(true);
        let result = self.step_level(dt);
        self.set_stepping(false);
        result
    }

    fn set_stepping(&mut self, stepping: bool) {
        self.stepping = stepping;
        for child in &mut self.children {
            child.set_stepping(stepping);
        }
    }

    fn step_level(&mut self, dt: f64) -> Result<()> {
        for child in &mut self.children {
            if child.lifecycle != Lifecycle::Live {
                return Err(PreconditionFault::NotSetUp.into());
            }
            child.step_level(dt)?;
        }
        let observers = self.controllers.clone();
        for observer in observers {
            let Some(controller) = observer.upgrade() else {
                trace!("skipping dropped controller");
                continue;
            };
            let mut controller = controller
                .try_borrow_mut()
                .map_err(|_| PreconditionFault::ReentrantStep)?;
            controller.on_step(self, dt)?;
        }
        self.controllers.retain(|c| c.strong_count() > 0);
        Ok(())
    }

    /// Pulls connector readings from the world into every actuator.
    pub fn sync_from<W: PhysicsWorld + ?Sized>(&mut self, world: &W) {
        self.for_each_actuator_mut(&mut |actuator| {
            if let Some(state) = world.connector_state(actuator.constraint) {
                actuator.sync(state);
            }
        });
    }

    /// Hands every commanded tension to the world for its next step.
    pub fn push_commands<W: PhysicsWorld + ?Sized>(&self, world: &mut W) {
        for actuator in self.all_actuators() {
            if let Some(tension) = actuator.commanded {
                world.set_commanded_tension(actuator.constraint, tension);
            }
        }
    }

    /// Notifies controllers, then removes constraints and bodies from the
    /// world and releases everything this tree owns. Idempotent.
    pub fn teardown<W: PhysicsWorld + ?Sized>(&mut self, world: &mut W) {
        if self.lifecycle == Lifecycle::TornDown {
            return;
        }
        self.notify_teardown();

        let mut constraints = Vec::new();
        let mut bodies = BTreeSet::new();
        self.collect_handles(&mut constraints, &mut bodies);
        for constraint in &constraints {
            world.remove_constraint(*constraint);
        }
        for body in &bodies {
            world.remove_rigid_body(*body);
        }
        self.release();
        info!(
            constraints = constraints.len(),
            bodies = bodies.len(),
            "model torn down"
        );
    }

    fn notify_teardown(&mut self) {
        for observer in &self.controllers {
            if let Some(controller) = observer.upgrade()
                && let Ok(mut controller) = controller.try_borrow_mut()
            {
                controller.on_teardown(self);
            }
        }
        for child in &mut self.children {
            child.notify_teardown();
        }
    }

    fn collect_handles(
        &self,
        constraints: &mut Vec<ConstraintHandle>,
        bodies: &mut BTreeSet<BodyHandle>,
    ) {
        constraints.extend(self.actuators.iter().map(|a| a.constraint));
        bodies.extend(self.rigids.iter().map(|r| r.body));
        for child in &self.children {
            child.collect_handles(constraints, bodies);
        }
    }

    fn release(&mut self) {
        self.rigids.clear();
        self.actuators.clear();
        self.children.clear();
        self.controllers.clear();
        self.lifecycle = Lifecycle::TornDown;
    }

    /// Walks the tree in pre-order without modifying it.
    pub fn accept<V: ModelVisitor + ?Sized>(&self, visitor: &mut V) {
        visitor.visit_model(self);
        for rigid in &self.rigids {
            visitor.visit_rigid(rigid);
        }
        for actuator in &self.actuators {
            visitor.visit_actuator(actuator);
        }
        for child in &self.children {
            child.accept(visitor);
        }
    }

    pub fn summary(&self) -> ModelSummary {
        let mut summary = ModelSummary::default();
        self.accept(&mut summary);
        summary
    }

    /// Attachment points referenced anywhere in the tree, keyed by id.
    pub fn attachment_points(&self) -> HashMap<usize, DVec3> {
        let mut points = HashMap::new();
        for rigid in self.all_rigids() {
            for end in &rigid.ends {
                points.insert(end.id(), end.position());
            }
        }
        points
    }

    fn fmt_level(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        writeln!(f, "{indent}Model [{}]", self.tags)?;
        for rigid in &self.rigids {
            writeln!(
                f,
                "{indent}  Rigid [{}] body {} mass {:.3}",
                rigid.tags, rigid.body.0, rigid.mass
            )?;
        }
        for actuator in &self.actuators {
            writeln!(
                f,
                "{indent}  Actuator {} [{}] rest {:.3}",
                actuator.id, actuator.tags, actuator.rest_length
            )?;
        }
        for child in &self.children {
            child.fmt_level(f, depth + 1)?;
        }
        Ok(())
    }
}

impl Tagged for Model {
    fn tags(&self) -> &Tags {
        &self.tags
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_level(f, 0)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("tags", &self.tags)
            .field("rigids", &self.rigids)
            .field("actuators", &self.actuators)
            .field("children", &self.children)
            .field("controllers", &self.controller_count())
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

/// Logical group name → ordered actuators, built once after compilation.
///
/// Holds ids, not references: lookups go back through the model each step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorMap {
    groups: HashMap<String, Vec<ActuatorId>>,
}

impl ActuatorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `group` to every actuator carrying `tag`, in model order.
    /// Returns the number of actuators mapped.
    pub fn map_tag(&mut self, model: &Model, group: impl Into<String>, tag: &str) -> usize {
        let ids: Vec<ActuatorId> = model.find::<Actuator>(tag).iter().map(|a| a.id).collect();
        let count = ids.len();
        self.groups.insert(group.into(), ids);
        count
    }

    /// The actuators of `group`, or an [`UnknownGroup`](PreconditionFault::UnknownGroup) fault.
    pub fn actuators(&self, group: &str) -> Result<&[ActuatorId]> {
        self.groups
            .get(group)
            .map(Vec::as_slice)
            .ok_or_else(|| PreconditionFault::UnknownGroup(group.to_string()).into())
    }

    pub fn contains(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
