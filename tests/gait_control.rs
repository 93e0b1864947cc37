// tests/gait_control.rs
use approx::assert_abs_diff_eq;
use std::cell::RefCell;
use std::f64::consts::{FRAC_PI_2, PI};
use std::rc::Rc;
use tensegrity_kit::{
    Actuator, ActuatorConfig, ActuatorMap, BuildSpec, Builder, Controller, ControllerState, Cpg,
    CpgConfig, CpgSetpoint, Error, ImpedanceController, Model, ModelVisitor, PreconditionFault,
    RodConfig, Simulation, SimulationConfig, SineWaveController, StaticWorld, StructureCompiler,
    StructureGraph,
};

fn setup() -> BuildSpec {
    BuildSpec::new()
        .with_builder("rod", Builder::rod(RodConfig::new(0.5, 1.0).unwrap()).unwrap())
        .with_builder(
            "muscle",
            Builder::connector(ActuatorConfig::new(1000.0, 10.0, 0.0, 7000.0).unwrap()).unwrap(),
        )
}

/// Four upright rods 10 apart. Neighbouring tops are joined by "wave"
/// muscles, neighbouring bottoms by "hold" muscles.
fn ladder() -> StructureGraph {
    let mut s = StructureGraph::new();
    let mut tops = Vec::new();
    let mut bottoms = Vec::new();
    for i in 0..4 {
        let x = 10.0 * i as f64;
        let top = s.add_node(x, 5.0, 0.0);
        let bottom = s.add_node(x, 0.0, 0.0);
        s.add_pair(top, bottom, "rod").unwrap();
        tops.push(top);
        bottoms.push(bottom);
    }
    for i in 0..3 {
        s.add_pair(tops[i], tops[i + 1], ["muscle", "wave"]).unwrap();
        s.add_pair(bottoms[i], bottoms[i + 1], ["muscle", "hold"]).unwrap();
    }
    s
}

fn build(graph: StructureGraph) -> (Model, StaticWorld) {
    let mut world = StaticWorld::new();
    let mut model = Model::new();
    StructureCompiler::new(graph, setup())
        .build_into(&mut model, &mut world)
        .unwrap();
    (model, world)
}

fn cpg(amplitude: f64, offset: f64, phase_offsets: Vec<f64>) -> Cpg {
    Cpg::new(CpgConfig {
        frequency: 2.0,
        amplitude,
        offset,
        body_waves: 1.0,
        phase_offsets,
    })
    .unwrap()
}

struct Recorder {
    name: &'static str,
    log: Rc<RefCell<Vec<&'static str>>>,
}

impl Controller for Recorder {
    fn on_step(&mut self, _model: &mut Model, _dt: f64) -> tensegrity_kit::Result<()> {
        self.log.borrow_mut().push(self.name);
        Ok(())
    }
}

struct Reentrant;

impl Controller for Reentrant {
    fn on_step(&mut self, model: &mut Model, dt: f64) -> tensegrity_kit::Result<()> {
        model.step(dt)
    }
}

#[test]
fn test_cpg_period_and_bounds() {
    let cpg = cpg(3.0, 1.5, vec![0.0]);
    assert_abs_diff_eq!(cpg.period(), PI, epsilon = 1e-12);

    for k in 0..50 {
        let t = 0.137 * k as f64;
        let now = cpg.target(t, 0, 0, 1).unwrap();
        let later = cpg.target(t + cpg.period(), 0, 0, 1).unwrap();
        assert_abs_diff_eq!(now, later, epsilon = 1e-9);
        assert!((1.5 - 3.0..=1.5 + 3.0).contains(&now));
    }
}

#[test]
fn test_cpg_members_spread_one_body_wave() {
    let cpg = cpg(1.0, 0.0, vec![FRAC_PI_2]);
    // Member i of 4 is shifted by a quarter wave per index.
    assert_abs_diff_eq!(cpg.cycle(0.0, 0, 0, 4).unwrap(), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(cpg.cycle(0.0, 0, 1, 4).unwrap(), 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(cpg.cycle(0.0, 0, 2, 4).unwrap(), -1.0, epsilon = 1e-12);
    // An empty group behaves like a group of one.
    assert_abs_diff_eq!(cpg.cycle(0.0, 0, 0, 0).unwrap(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_cpg_rejects_bad_config_and_phase() {
    let config = CpgConfig {
        frequency: 0.0,
        ..CpgConfig::default()
    };
    assert!(Cpg::new(config).is_err());

    let cpg = cpg(1.0, 0.0, vec![0.0]);
    assert!(matches!(
        cpg.target(0.0, 3, 0, 1),
        Err(Error::Precondition(PreconditionFault::UnknownPhase { index: 3, len: 1 }))
    ));
}

#[test]
fn test_impedance_is_linear_on_a_compiled_actuator() {
    let (model, _world) = build(ladder());
    let actuator = model.find::<Actuator>("wave")[0];
    assert_abs_diff_eq!(actuator.actual_length(), 10.0, epsilon = 1e-9);

    let law = ImpedanceController::new(50.0, 0.0, 0.0).unwrap();
    let tension = law.control_length(actuator, 0.01, 7.0).unwrap();
    assert_abs_diff_eq!(tension, 150.0, epsilon = 1e-9);
    // dt only has to be positive.
    let tension = law.control_length(actuator, 0.5, 7.0).unwrap();
    assert_abs_diff_eq!(tension, 150.0, epsilon = 1e-9);

    // A slack demand clamps to the minimum tension.
    assert_eq!(law.control_length(actuator, 0.01, 12.0).unwrap(), 0.0);
    assert!(law.control_length(actuator, 0.0, 7.0).is_err());
}

#[test]
fn test_step_preconditions() {
    let mut fresh = Model::new();
    assert!(matches!(
        fresh.step(0.1),
        Err(Error::Precondition(PreconditionFault::NotSetUp))
    ));

    let (mut model, mut world) = build(ladder());
    assert!(model.is_live());
    assert!(matches!(
        model.step(0.0),
        Err(Error::Precondition(PreconditionFault::NonPositiveTimeStep { .. }))
    ));
    assert!(model.step(-1.0).is_err());
    assert!(model.step(f64::NAN).is_err());
    model.step(0.01).unwrap();

    model.teardown(&mut world);
    assert!(matches!(
        model.step(0.01),
        Err(Error::Precondition(PreconditionFault::NotSetUp))
    ));
}

#[test]
fn test_reentrant_step_is_rejected() {
    let (mut model, _world) = build(ladder());
    let controller = Rc::new(RefCell::new(Reentrant));
    model.attach(&controller).unwrap();

    assert!(matches!(
        model.step(0.01),
        Err(Error::Precondition(PreconditionFault::ReentrantStep))
    ));
    // The guard is released between steps, so the fault repeats rather than sticking.
    assert!(matches!(
        model.step(0.01),
        Err(Error::Precondition(PreconditionFault::ReentrantStep))
    ));
    drop(controller);
    model.step(0.01).unwrap();
}

/// Steps the first sub-model from a controller attached to its parent.
struct StepsChild;

impl Controller for StepsChild {
    fn on_step(&mut self, model: &mut Model, dt: f64) -> tensegrity_kit::Result<()> {
        match model.child_mut(0) {
            Some(child) => child.step(dt),
            None => Ok(()),
        }
    }
}

fn segmented() -> StructureGraph {
    let mut segment = StructureGraph::with_tags("segment");
    let a = segment.add_node(0.0, 0.0, 0.0);
    let b = segment.add_node(0.0, 5.0, 0.0);
    segment.add_pair(a, b, "rod").unwrap();
    let mut root = StructureGraph::new();
    root.add_child(segment);
    root
}

#[test]
fn test_descendant_cannot_be_stepped_from_a_controller() {
    let (mut model, _world) = build(segmented());
    let log = Rc::new(RefCell::new(Vec::new()));
    let child = Rc::new(RefCell::new(Recorder {
        name: "child",
        log: log.clone(),
    }));
    model.child_mut(0).unwrap().attach(&child).unwrap();
    let sneaky = Rc::new(RefCell::new(StepsChild));
    model.attach(&sneaky).unwrap();

    assert!(matches!(
        model.step(0.01),
        Err(Error::Precondition(PreconditionFault::ReentrantStep))
    ));
    // The child was stepped once, by its parent.
    assert_eq!(*log.borrow(), vec!["child"]);

    // Outside a parent step the child can be stepped on its own.
    drop(sneaky);
    model.child_mut(0).unwrap().step(0.01).unwrap();
    model.step(0.01).unwrap();
    assert_eq!(*log.borrow(), vec!["child", "child", "child"]);
}

#[test]
fn test_second_build_into_a_live_model_is_steppable() {
    let mut world = StaticWorld::new();
    let mut model = Model::new();
    StructureCompiler::new(segmented(), setup())
        .build_into(&mut model, &mut world)
        .unwrap();
    model.step(0.01).unwrap();

    StructureCompiler::new(segmented(), setup())
        .build_into(&mut model, &mut world)
        .unwrap();
    assert_eq!(model.children().len(), 2);
    assert!(model.children().iter().all(Model::is_live));
    model.step(0.01).unwrap();
}

#[test]
fn test_children_step_before_controllers_in_attach_order() {
    let (mut model, _world) = build(segmented());

    let log = Rc::new(RefCell::new(Vec::new()));
    let recorder = |name| {
        Rc::new(RefCell::new(Recorder {
            name,
            log: log.clone(),
        }))
    };
    let first = recorder("first");
    let second = recorder("second");
    let child = recorder("child");
    model.attach(&first).unwrap();
    model.attach(&second).unwrap();
    model.child_mut(0).unwrap().attach(&child).unwrap();

    model.step(0.01).unwrap();
    assert_eq!(*log.borrow(), vec!["child", "first", "second"]);
}

#[test]
fn test_dropped_controller_is_skipped() {
    let (mut model, _world) = build(ladder());
    let log = Rc::new(RefCell::new(Vec::new()));
    let kept = Rc::new(RefCell::new(Recorder {
        name: "kept",
        log: log.clone(),
    }));
    let dropped = Rc::new(RefCell::new(Recorder {
        name: "dropped",
        log: log.clone(),
    }));
    model.attach(&dropped).unwrap();
    model.attach(&kept).unwrap();
    assert_eq!(model.controller_count(), 2);

    drop(dropped);
    model.step(0.01).unwrap();
    assert_eq!(*log.borrow(), vec!["kept"]);
    assert_eq!(model.controller_count(), 1);
}

#[test]
fn test_actuator_map_groups() {
    let (model, _world) = build(ladder());
    let mut map = ActuatorMap::new();
    assert_eq!(map.map_tag(&model, "top", "wave"), 3);
    assert_eq!(map.map_tag(&model, "none", "missing"), 0);

    let ids: Vec<_> = model.find::<Actuator>("wave").iter().map(|a| a.id()).collect();
    assert_eq!(map.actuators("top").unwrap(), ids.as_slice());
    assert!(map.actuators("none").unwrap().is_empty());
    assert!(matches!(
        map.actuators("legs"),
        Err(Error::Precondition(PreconditionFault::UnknownGroup(group))) if group == "legs"
    ));
}

#[test]
fn test_unknown_phase_fails_attach() {
    let (mut model, _world) = build(ladder());
    let law = ImpedanceController::new(100.0, 0.0, 0.0).unwrap();
    let controller = Rc::new(RefCell::new(
        SineWaveController::new(cpg(1.0, 5.0, vec![0.0, FRAC_PI_2]), law)
            .with_wave_group("wave", 5),
    ));
    assert!(matches!(
        model.attach(&controller),
        Err(Error::Precondition(PreconditionFault::UnknownPhase { index: 5, len: 2 }))
    ));
    assert_eq!(model.controller_count(), 0);
    assert_eq!(controller.borrow().state(), ControllerState::Unattached);
}

#[test]
fn test_sine_wave_gait_commands_tensions() {
    let (model, world) = build(ladder());
    let mut sim = Simulation::new(world, model, SimulationConfig::default());
    let dt = sim.config().step_size;

    let wave_law = ImpedanceController::new(100.0, 0.0, 0.0).unwrap();
    let hold_law = ImpedanceController::new(300.0, 0.0, 0.0).unwrap();
    let controller = Rc::new(RefCell::new(
        SineWaveController::new(cpg(1.0, 5.0, vec![0.0, FRAC_PI_2]), wave_law)
            .with_wave_group("wave", 1)
            .with_hold_law(hold_law)
            .with_hold_group("hold", 9.0),
    ));
    sim.model_mut().attach(&controller).unwrap();
    assert_eq!(controller.borrow().state(), ControllerState::Attached);

    sim.step().unwrap();
    assert_abs_diff_eq!(controller.borrow().elapsed(), dt, epsilon = 1e-15);

    let mut first = Vec::new();
    for (i, actuator) in sim.model().find::<Actuator>("wave").into_iter().enumerate() {
        let target = 5.0 + (dt * 2.0 + 2.0 * PI * i as f64 / 3.0 + FRAC_PI_2).sin();
        let expected = 100.0 * (10.0 - target);
        let commanded = actuator.commanded_tension().unwrap();
        assert_abs_diff_eq!(commanded, expected, epsilon = 1e-9);
        first.push((actuator.constraint(), commanded));
    }
    for actuator in sim.model().find::<Actuator>("hold") {
        assert_abs_diff_eq!(actuator.commanded_tension().unwrap(), 300.0, epsilon = 1e-9);
    }

    // The next world step realises the previous commands.
    sim.step().unwrap();
    assert_eq!(sim.steps(), 2);
    assert_abs_diff_eq!(controller.borrow().elapsed(), 2.0 * dt, epsilon = 1e-15);
    for (constraint, commanded) in first {
        assert_eq!(sim.world().commanded_tension(constraint), Some(commanded));
    }
    for actuator in sim.model().find::<Actuator>("wave") {
        assert!(actuator.actual_tension() > 0.0);
    }

    sim.teardown();
    let controller = controller.borrow();
    assert_eq!(controller.state(), ControllerState::Unattached);
    assert_eq!(controller.elapsed(), 0.0);
    assert!(controller.wave_map().is_empty());
    assert_eq!(sim.world().constraint_count(), 0);
    assert_eq!(sim.world().body_count(), 0);
}

#[test]
fn test_velocity_setpoint_mode() {
    let (mut model, mut world) = build(ladder());
    let law = ImpedanceController::new(100.0, 2.0, 0.0).unwrap();
    let controller = Rc::new(RefCell::new(
        SineWaveController::new(cpg(20.0, 0.0, vec![0.0]), law)
            .with_setpoint(CpgSetpoint::Velocity { length: 8.0 })
            .with_wave_group("wave", 0),
    ));
    model.attach(&controller).unwrap();
    model.step(0.01).unwrap();

    let cpg = controller.borrow().cpg().clone();
    for (i, actuator) in model.find::<Actuator>("wave").into_iter().enumerate() {
        let target = cpg.target(0.01, 0, i, 3).unwrap();
        let expected = 100.0 * (10.0 - 8.0) + 2.0 * (0.0 - target);
        assert_abs_diff_eq!(actuator.commanded_tension().unwrap(), expected, epsilon = 1e-9);
    }
    model.teardown(&mut world);
}

#[test]
fn test_commands_are_clamped_to_tension_bounds() {
    let (mut model, _world) = build(ladder());
    let actuator = model.find_mut::<Actuator>("wave").into_iter().next().unwrap();
    actuator.set_commanded_tension(1.0e6);
    assert_eq!(actuator.commanded_tension(), Some(7000.0));
    actuator.set_commanded_tension(-5.0);
    assert_eq!(actuator.commanded_tension(), Some(0.0));
}

#[derive(Default)]
struct Frames(usize);

impl ModelVisitor for Frames {
    fn visit_model(&mut self, _model: &Model) {
        self.0 += 1;
    }
}

#[test]
fn test_run_renders_at_render_rate() {
    let (model, world) = build(ladder());
    let config = SimulationConfig::new(0.25, 0.375).unwrap();
    let mut sim = Simulation::new(world, model, config);

    let mut frames = Frames::default();
    sim.run(12, &mut frames).unwrap();
    assert_eq!(sim.steps(), 12);
    assert_abs_diff_eq!(sim.elapsed(), 3.0, epsilon = 1e-12);
    // 3 s of simulated time at one frame per 0.375 s. Leftover time carries
    // into the next frame instead of being dropped.
    assert_eq!(frames.0, 8);
    assert_eq!(sim.world().steps(), 12);
}
