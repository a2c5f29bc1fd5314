use belay_core::extruder::TRAD_RACK_SYNCED_EVENT;
use belay_core::mocks::{MockAnalog, MockExtruder, MockRegistry, MockStepper};
use belay_core::{
    Action, AnalogCfg, BelayBuilder, BelayError, BelaySystem, Command, DirectionMonitor,
    ExtruderCfg, MultiplierBounds, Multipliers, Reply, SensorCfg,
};
use belay_traits::ManualClock;

struct Rig {
    system: BelaySystem,
    registry: MockRegistry,
    analog: MockAnalog,
}

/// A switch belay "s" on a stepper, an analog belay "a" on a second
/// stepper and a trad rack belay "tr".
fn rig() -> Rig {
    let registry = MockRegistry::default()
        .with_driver(true)
        .with_stepper("one", MockStepper::new(10.0))
        .with_stepper("two", MockStepper::new(10.0))
        .with_stepper("three", MockStepper::new(5.0));
    let monitor = DirectionMonitor::default();
    let mut system = BelaySystem::new(monitor.clone());
    let analog = MockAnalog::new(0.5);

    system.add(
        BelayBuilder::new("s")
            .with_sensor(SensorCfg::DualSwitch {
                multipliers: Multipliers::default(),
            })
            .with_extruder(ExtruderCfg::ExtruderStepper { name: "one".into() }, &registry)
            .with_clock(Box::new(ManualClock::new()))
            .with_monitor(monitor.clone())
            .build()
            .unwrap(),
    );
    system.add(
        BelayBuilder::new("a")
            .with_sensor(SensorCfg::Analog(AnalogCfg::default()))
            .with_extruder(ExtruderCfg::ExtruderStepper { name: "two".into() }, &registry)
            .with_analog_input(Box::new(analog.clone()))
            .with_primary_extruder(Box::new(MockExtruder::default()))
            .with_clock(Box::new(ManualClock::new()))
            .with_monitor(monitor.clone())
            .build()
            .unwrap(),
    );
    system.add(
        BelayBuilder::new("tr")
            .with_sensor(SensorCfg::SingleSwitch {
                multipliers: Multipliers::default(),
            })
            .with_extruder(ExtruderCfg::TradRack, &registry)
            .with_clock(Box::new(ManualClock::new()))
            .with_monitor(monitor)
            .build()
            .unwrap(),
    );
    Rig {
        system,
        registry,
        analog,
    }
}

fn run(rig: &mut Rig, target: Option<&str>, cmd: Command) -> eyre::Result<Reply> {
    rig.system.execute(target, &cmd, &rig.registry)
}

#[test]
fn ready_enables_steppers_only() {
    let r = rig();
    r.system.handle_ready().unwrap();
    let enabled: Vec<bool> = r.system.status().iter().map(|s| s.enabled).collect();
    assert_eq!(enabled, vec![true, true, false]);

    r.system.handle_event(TRAD_RACK_SYNCED_EVENT).unwrap();
    assert!(r.system.status()[2].enabled);
}

#[test]
fn query_reports_state_and_position() {
    let mut r = rig();
    let reply = run(&mut r, Some("s"), Command::Query).unwrap();
    assert_eq!(
        reply,
        Reply::Query {
            summary: "belay s: neutral".into(),
            position: 0.0,
        }
    );
    // no target selects the first belay
    let reply = run(&mut r, None, Command::Query).unwrap();
    assert!(reply.to_string().starts_with("belay s: neutral"));

    let err = run(&mut r, Some("x"), Command::Query).unwrap_err();
    assert_eq!(
        err.downcast_ref::<BelayError>(),
        Some(&BelayError::UnknownBelay("x".into()))
    );
}

#[test]
fn disable_with_override_then_enable() {
    let mut r = rig();
    r.system.handle_ready().unwrap();
    run(&mut r, Some("s"), Command::Disable { lock: true }).unwrap();
    r.system.handle_ready().unwrap();
    assert!(!r.system.status()[0].enabled);
    assert!(r.system.status()[0].user_disable);

    run(&mut r, Some("s"), Command::ClearOverride).unwrap();
    assert!(!r.system.status()[0].enabled);
    run(&mut r, Some("s"), Command::Enable).unwrap();
    assert!(r.system.status()[0].enabled);
}

#[test]
fn set_multiplier_is_validated() {
    let mut r = rig();
    let err = run(
        &mut r,
        Some("s"),
        Command::SetMultiplier(MultiplierBounds {
            mid: Some(2.0),
            ..Default::default()
        }),
    )
    .unwrap_err();
    assert!(err.to_string().contains("multiplier.mid"));

    let reply = run(
        &mut r,
        Some("s"),
        Command::SetMultiplier(MultiplierBounds {
            high: Some(1.2),
            ..Default::default()
        }),
    )
    .unwrap();
    assert!(reply.to_string().contains("multiplier_high = 1.2"));

    let err = run(
        &mut r,
        Some("a"),
        Command::SetMultiplier(MultiplierBounds::default()),
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BelayError>(),
        Some(BelayError::Unsupported { .. })
    ));
}

#[test]
fn setpoint_accepts_both_units() {
    let mut r = rig();
    let reply = run(
        &mut r,
        Some("a"),
        Command::SetSetpoint {
            value: 0.5,
            dimensionless: true,
        },
    )
    .unwrap();
    assert_eq!(reply, Reply::Message("belay a: setpoint = 2.500 mm".into()));
    let err = run(
        &mut r,
        Some("a"),
        Command::SetSetpoint {
            value: 7.0,
            dimensionless: false,
        },
    )
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BelayError>(),
        Some(BelayError::InvalidArgument { .. })
    ));
}

#[test]
fn calibrate_and_continue() {
    let mut r = rig();
    let err = run(&mut r, None, Command::Continue).unwrap_err();
    assert_eq!(
        err.downcast_ref::<BelayError>(),
        Some(&BelayError::NoPendingSequence)
    );

    let err = run(&mut r, Some("s"), Command::Calibrate).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BelayError>(),
        Some(BelayError::Unsupported { .. })
    ));

    run(&mut r, Some("a"), Command::Calibrate).unwrap();
    r.analog.set(0.1);
    run(&mut r, None, Command::Continue).unwrap();
    r.analog.set(0.9);
    let done = run(&mut r, None, Command::Continue).unwrap();
    assert!(done.to_string().starts_with("calibration complete"));
    assert!(r.system.sequencer().pending().is_none());

    // 0.5 is now the centre of the new range
    let reply = run(&mut r, Some("a"), Command::Query).unwrap();
    match reply {
        Reply::Query { position, .. } => assert!(position.abs() < 1e-9),
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn new_calibration_replaces_pending_one() {
    let mut r = rig();
    run(&mut r, Some("a"), Command::Calibrate).unwrap();
    r.analog.set(0.3);
    run(&mut r, None, Command::Continue).unwrap();
    run(&mut r, Some("a"), Command::Calibrate).unwrap();
    // back at the first step: this continue captures the expanded reading
    r.analog.set(0.2);
    let reply = run(&mut r, None, Command::Continue).unwrap();
    assert!(reply.to_string().contains("expanded reading 0.200000"));
}

#[test]
fn set_stepper_through_system() {
    let mut r = rig();
    r.system.handle_ready().unwrap();
    run(
        &mut r,
        Some("s"),
        Command::SetStepper {
            name: "three".into(),
        },
    )
    .unwrap();
    let belay = r.system.belay(Some("s")).unwrap().borrow();
    assert_eq!(belay.extruder().stepper_name(), Some("three"));
    assert!(belay.is_enabled());
}

#[test]
fn events_are_actions_too() {
    let mut r = rig();
    let out = r
        .system
        .perform(
            None,
            &Action::Event(TRAD_RACK_SYNCED_EVENT.into()),
            &r.registry,
        )
        .unwrap();
    assert!(out.is_none());
    assert!(r.system.status()[2].enabled);
}
