use belay_core::mocks::{MockRegistry, MockStepper};
use belay_core::{
    AnalogCfg, BelayBuilder, BuildError, DirectionMonitor, ExtruderCfg, Multipliers, PidCfg,
    SensorCfg,
};
use rstest::rstest;

fn registry() -> MockRegistry {
    MockRegistry::default().with_stepper("aux", MockStepper::new(20.0))
}

fn expect_build_error(err: &eyre::Report) -> &BuildError {
    err.downcast_ref::<BuildError>()
        .unwrap_or_else(|| panic!("expected BuildError, got: {err}"))
}

#[rstest]
fn missing_sensor_yields_typed_build_error() {
    let err = BelayBuilder::new("b")
        .with_extruder(ExtruderCfg::ExtruderStepper { name: "aux".into() }, &registry())
        .with_monitor(DirectionMonitor::default())
        .try_build()
        .expect_err("should fail with MissingSensor");
    assert_eq!(expect_build_error(&err), &BuildError::MissingSensor);
}

#[rstest]
fn missing_extruder_yields_typed_build_error() {
    let err = BelayBuilder::new("b")
        .with_sensor(SensorCfg::SingleSwitch {
            multipliers: Multipliers::default(),
        })
        .with_monitor(DirectionMonitor::default())
        .try_build()
        .expect_err("should fail with MissingExtruder");
    assert_eq!(expect_build_error(&err), &BuildError::MissingExtruder);
}

#[rstest]
fn missing_monitor_yields_typed_build_error() {
    let err = BelayBuilder::new("b")
        .with_sensor(SensorCfg::SingleSwitch {
            multipliers: Multipliers::default(),
        })
        .with_extruder(ExtruderCfg::ExtruderStepper { name: "aux".into() }, &registry())
        .try_build()
        .expect_err("should fail with MissingMonitor");
    assert_eq!(expect_build_error(&err), &BuildError::MissingMonitor);
}

#[rstest]
fn unknown_stepper_is_reported_at_build() {
    let err = BelayBuilder::new("b")
        .with_sensor(SensorCfg::SingleSwitch {
            multipliers: Multipliers::default(),
        })
        .with_extruder(ExtruderCfg::ExtruderStepper { name: "gone".into() }, &registry())
        .build_belay()
        .expect_err("unknown stepper");
    assert_eq!(
        expect_build_error(&err),
        &BuildError::UnknownExtruder("gone".into())
    );
}

#[rstest]
fn analog_sensor_needs_its_inputs() {
    let err = BelayBuilder::new("b")
        .with_sensor(SensorCfg::Analog(AnalogCfg::default()))
        .with_extruder(ExtruderCfg::ExtruderStepper { name: "aux".into() }, &registry())
        .build_belay()
        .expect_err("no analog input");
    assert_eq!(expect_build_error(&err), &BuildError::MissingAnalogInput);
}

#[rstest]
#[case(Multipliers { high: 0.99, low: 0.95, mid: 1.0 }, "multiplier.high")]
#[case(Multipliers { high: 1.05, low: 1.01, mid: 1.0 }, "multiplier.low")]
#[case(Multipliers { high: 1.05, low: 0.0, mid: 1.0 }, "multiplier.low")]
#[case(Multipliers { high: 1.05, low: 0.95, mid: 1.1 }, "multiplier.mid")]
fn invalid_multipliers_name_the_field(#[case] m: Multipliers, #[case] field: &str) {
    let err = BelayBuilder::new("b")
        .with_sensor(SensorCfg::DualSwitch { multipliers: m })
        .with_extruder(ExtruderCfg::ExtruderStepper { name: "aux".into() }, &registry())
        .build_belay()
        .expect_err("invalid multipliers");
    match expect_build_error(&err) {
        BuildError::InvalidConfig { field: f, .. } => assert_eq!(*f, field),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}

#[rstest]
#[case(PidCfg { tt: Some(100.0), ..PidCfg::default() }, "pid.tt")]
#[case(PidCfg { limit: 1.0, ..PidCfg::default() }, "pid.limit")]
#[case(PidCfg { kp: 0.0, ..PidCfg::default() }, "pid.kp")]
#[case(PidCfg { setpoint: 6.0, ..PidCfg::default() }, "pid.setpoint")]
fn invalid_pid_settings_name_the_field(#[case] pid: PidCfg, #[case] field: &str) {
    use belay_core::mocks::{MockAnalog, MockExtruder};
    let err = BelayBuilder::new("b")
        .with_sensor(SensorCfg::Analog(AnalogCfg {
            pid,
            ..AnalogCfg::default()
        }))
        .with_extruder(ExtruderCfg::ExtruderStepper { name: "aux".into() }, &registry())
        .with_analog_input(Box::new(MockAnalog::new(0.5)))
        .with_primary_extruder(Box::new(MockExtruder::default()))
        .build_belay()
        .expect_err("invalid pid");
    match expect_build_error(&err) {
        BuildError::InvalidConfig { field: f, .. } => assert_eq!(*f, field),
        other => panic!("expected InvalidConfig, got {other:?}"),
    }
}
