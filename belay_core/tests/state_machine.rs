use belay_core::extruder::{TRAD_RACK_SYNCED_EVENT, TRAD_RACK_UNSYNCING_EVENT};
use belay_core::mocks::{MockFilamentDriver, MockRegistry, MockStepper};
use belay_core::{Belay, BelayBuilder, BelayError, BuildError, ExtruderCfg, Multipliers, SensorCfg};
use belay_traits::{ManualClock, Stepper};
use proptest::prelude::*;
use rstest::rstest;

const M: Multipliers = Multipliers {
    high: 1.05,
    low: 0.95,
    mid: 1.0,
};

fn trad_rack_belay(sensor: SensorCfg) -> (Belay, MockFilamentDriver) {
    let registry = MockRegistry::default().with_driver(false);
    let driver = registry.driver().expect("driver registered");
    let belay = BelayBuilder::new("tr")
        .with_sensor(sensor)
        .with_extruder(ExtruderCfg::TradRack, &registry)
        .with_clock(Box::new(ManualClock::new()))
        .build_belay()
        .expect("belay builds");
    (belay, driver)
}

fn stepper_belay(registry: &MockRegistry) -> Belay {
    BelayBuilder::new("es")
        .with_sensor(SensorCfg::DualSwitch { multipliers: M })
        .with_extruder(ExtruderCfg::ExtruderStepper { name: "a".into() }, registry)
        .with_clock(Box::new(ManualClock::new()))
        .build_belay()
        .expect("belay builds")
}

#[test]
fn single_switch_scenario_through_belay() {
    let (mut b, driver) = trad_rack_belay(SensorCfg::SingleSwitch { multipliers: M });
    driver.set_synced(true);
    b.handle_event(TRAD_RACK_SYNCED_EVENT).unwrap();
    assert!(b.is_enabled());

    b.handle_switch(0, 1.0, true).unwrap();
    assert_eq!(b.multiplier(), 1.05);
    b.handle_switch(0, 2.0, false).unwrap();
    assert_eq!(b.multiplier(), 0.95);
    b.handle_direction(false).unwrap();
    assert_eq!(b.multiplier(), 1.05);
    assert_eq!(driver.applied(), vec![0.95, 1.05, 0.95, 1.05]);
}

#[test]
fn dual_switch_scenario_through_belay() {
    let (mut b, driver) = trad_rack_belay(SensorCfg::DualSwitch { multipliers: M });
    driver.set_synced(true);
    b.handle_event(TRAD_RACK_SYNCED_EVENT).unwrap();
    // both released
    assert_eq!(b.multiplier(), 1.0);
    b.handle_switch(0, 0.5, true).unwrap();
    assert_eq!(b.multiplier(), 1.05);
    assert_eq!(b.status().state, "compressed");
}

#[test]
fn trad_rack_follows_sync_events() {
    let (mut b, driver) = trad_rack_belay(SensorCfg::SingleSwitch { multipliers: M });
    b.handle_ready().unwrap();
    assert!(!b.is_enabled(), "trad rack waits for its sync event");

    b.handle_event(TRAD_RACK_SYNCED_EVENT).unwrap();
    assert!(!b.is_enabled(), "driver not synced yet");

    driver.set_synced(true);
    b.handle_event(TRAD_RACK_SYNCED_EVENT).unwrap();
    assert!(b.is_enabled());

    b.handle_event("some_other:event").unwrap();
    assert!(b.is_enabled());

    b.handle_event(TRAD_RACK_UNSYNCING_EVENT).unwrap();
    assert!(!b.is_enabled());
    assert_eq!(driver.applied().last().copied(), Some(1.0));
}

#[test]
fn operator_errors_name_the_belay() {
    let (mut b, driver) = trad_rack_belay(SensorCfg::SingleSwitch { multipliers: M });
    let err = b.cmd_enable().unwrap_err();
    assert_eq!(
        err.downcast_ref::<BelayError>(),
        Some(&BelayError::EnableRefused("tr".into()))
    );
    assert_eq!(err.to_string(), "Conditions not met to enable belay tr");

    driver.set_synced(true);
    b.cmd_enable().unwrap();
    driver.set_synced(false);
    let err = b.cmd_disable(false).unwrap_err();
    assert_eq!(
        err.downcast_ref::<BelayError>(),
        Some(&BelayError::DisableRefused("tr".into()))
    );
    assert!(b.is_enabled());
}

#[test]
fn override_lock_survives_sync_events() {
    let (mut b, driver) = trad_rack_belay(SensorCfg::SingleSwitch { multipliers: M });
    driver.set_synced(true);
    b.cmd_enable().unwrap();
    b.cmd_disable(true).unwrap();
    assert!(b.user_disable());

    b.handle_event(TRAD_RACK_SYNCED_EVENT).unwrap();
    assert!(!b.is_enabled());

    b.clear_override();
    assert!(!b.user_disable());
    assert!(!b.is_enabled(), "clearing the lock does not enable");
    b.handle_event(TRAD_RACK_SYNCED_EVENT).unwrap();
    assert!(b.is_enabled());
}

#[test]
fn stepper_rebind_moves_the_correction() {
    let first = MockStepper::new(22.0);
    let second = MockStepper::new(8.0);
    let registry = MockRegistry::default()
        .with_stepper("a", first.clone())
        .with_stepper("b", second.clone());
    let mut b = stepper_belay(&registry);
    b.handle_ready().unwrap();
    b.handle_switch(0, 0.0, true).unwrap();
    assert!((first.history().last().unwrap() - 22.0 / 1.05).abs() < 1e-12);

    b.set_stepper("b", &registry).unwrap();
    assert!(b.is_enabled());
    assert_eq!(first.history().last().copied(), Some(22.0));
    // re-enable applies the current sensor multiplier to the new stepper
    assert!((second.history()[0] - 8.0 / 1.05).abs() < 1e-12);
    assert_eq!(b.extruder().stepper_name(), Some("b"));
}

#[test]
fn unknown_stepper_leaves_binding_untouched() {
    let first = MockStepper::new(22.0);
    let registry = MockRegistry::default().with_stepper("a", first.clone());
    let mut b = stepper_belay(&registry);
    b.handle_ready().unwrap();
    let err = b.set_stepper("nope", &registry).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BelayError>(),
        Some(BelayError::InvalidArgument { .. })
    ));
    assert!(b.is_enabled());
    assert_eq!(b.extruder().stepper_name(), Some("a"));
}

#[test]
fn invalid_stepper_keeps_belay_enabled_on_old_binding() {
    let first = MockStepper::new(22.0);
    let registry = MockRegistry::default()
        .with_stepper("a", first.clone())
        .with_stepper("bad", MockStepper::new(0.0));
    let mut b = stepper_belay(&registry);
    b.handle_ready().unwrap();
    b.handle_switch(0, 0.0, true).unwrap();
    let applied = first.history().len();

    let err = b.set_stepper("bad", &registry).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig { .. })
    ));
    assert!(b.is_enabled());
    assert_eq!(b.extruder().stepper_name(), Some("a"));
    // the correction on the old stepper was never reset
    assert_eq!(first.history().len(), applied);
    assert!((first.rotation_distance() - 22.0 / 1.05).abs() < 1e-12);
}

#[test]
fn trad_rack_rejects_stepper_selection() {
    let (mut b, _) = trad_rack_belay(SensorCfg::SingleSwitch { multipliers: M });
    let err = b
        .set_stepper("a", &MockRegistry::default())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BelayError>(),
        Some(BelayError::Unsupported { .. })
    ));
}

#[rstest]
#[case(TRAD_RACK_SYNCED_EVENT, true, true)]
#[case(TRAD_RACK_SYNCED_EVENT, false, false)]
#[case(TRAD_RACK_UNSYNCING_EVENT, true, false)]
#[case("extruder:activate", true, false)]
fn host_events_from_disabled(#[case] event: &str, #[case] synced: bool, #[case] enabled: bool) {
    let (mut b, driver) = trad_rack_belay(SensorCfg::SingleSwitch { multipliers: M });
    driver.set_synced(synced);
    b.handle_event(event).unwrap();
    assert_eq!(b.is_enabled(), enabled);
}

#[derive(Debug, Clone)]
enum Op {
    Switch(usize, bool),
    Direction(bool),
    Apply(f64),
    Sync(bool),
    SyncedEvent,
    UnsyncingEvent,
    Enable,
    Disable(bool),
    ClearOverride,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..2, any::<bool>()).prop_map(|(i, s)| Op::Switch(i, s)),
        any::<bool>().prop_map(Op::Direction),
        (0.5f64..1.5).prop_map(Op::Apply),
        any::<bool>().prop_map(Op::Sync),
        Just(Op::SyncedEvent),
        Just(Op::UnsyncingEvent),
        Just(Op::Enable),
        any::<bool>().prop_map(Op::Disable),
        Just(Op::ClearOverride),
    ]
}

proptest! {
    #[test]
    fn disabled_belay_never_touches_the_actuator(ops in prop::collection::vec(op(), 1..80)) {
        let (mut b, driver) = trad_rack_belay(SensorCfg::DualSwitch { multipliers: M });
        for op in ops {
            let was_enabled = b.is_enabled();
            let before = driver.applied().len();
            let _ = match op {
                Op::Switch(i, s) => b.handle_switch(i, 0.0, s),
                Op::Direction(d) => b.handle_direction(d),
                Op::Apply(m) => b.set_multiplier(m, true),
                Op::Sync(s) => {
                    driver.set_synced(s);
                    Ok(())
                }
                Op::SyncedEvent => b.handle_event(TRAD_RACK_SYNCED_EVENT),
                Op::UnsyncingEvent => b.handle_event(TRAD_RACK_UNSYNCING_EVENT),
                Op::Enable => b.cmd_enable(),
                Op::Disable(lock) => b.cmd_disable(lock),
                Op::ClearOverride => {
                    b.clear_override();
                    Ok(())
                }
            };
            if !was_enabled && !b.is_enabled() {
                prop_assert_eq!(driver.applied().len(), before);
            }
            if b.user_disable() {
                prop_assert!(!b.is_enabled() || was_enabled);
            }
        }
    }
}
