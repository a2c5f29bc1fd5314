//! Secondary extruder actuators.
//!
//! Two kinds are supported: a filament driver that takes the multiplier
//! directly and only participates while it reports itself synced, and an
//! extruder stepper whose rotation distance is scaled inversely.

use belay_traits::{ActuatorRegistry, FilamentDriver, Stepper};

use crate::config::ExtruderCfg;
use crate::error::{BelayError, BuildError, Result};
use crate::hw_error::map_hw_error;

/// Host event that requests an enable attempt for the filament driver kind.
pub const TRAD_RACK_SYNCED_EVENT: &str = "trad_rack:synced_to_extruder";
/// Host event that requests a disable attempt for the filament driver kind.
pub const TRAD_RACK_UNSYNCING_EVENT: &str = "trad_rack:unsyncing_from_extruder";

pub struct TradRackActuator {
    driver: Box<dyn FilamentDriver>,
}

pub struct ExtruderStepperActuator {
    name: String,
    stepper: Box<dyn Stepper>,
    base_rotation_distance: f64,
}

impl ExtruderStepperActuator {
    fn bind(name: &str, stepper: Box<dyn Stepper>) -> Result<Self> {
        let base_rotation_distance = stepper.rotation_distance();
        if !(base_rotation_distance.is_finite() && base_rotation_distance > 0.0) {
            return Err(BuildError::invalid(
                "extruder_stepper_name",
                "stepper reports a non-positive rotation distance",
            ));
        }
        Ok(Self {
            name: name.to_string(),
            stepper,
            base_rotation_distance,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_rotation_distance(&self) -> f64 {
        self.base_rotation_distance
    }
}

/// The drive a belay applies its multiplier to.
pub enum SecondaryExtruder {
    TradRack(TradRackActuator),
    ExtruderStepper(ExtruderStepperActuator),
}

impl core::fmt::Debug for SecondaryExtruder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TradRack(_) => f.write_str("SecondaryExtruder::TradRack"),
            Self::ExtruderStepper(s) => f
                .debug_struct("SecondaryExtruder::ExtruderStepper")
                .field("name", &s.name)
                .field("base_rotation_distance", &s.base_rotation_distance)
                .finish(),
        }
    }
}

impl SecondaryExtruder {
    /// Resolve the configured actuator through the host registry.
    pub fn connect(cfg: &ExtruderCfg, registry: &dyn ActuatorRegistry) -> Result<Self> {
        match cfg {
            ExtruderCfg::TradRack => {
                let driver = registry
                    .filament_driver()
                    .ok_or_else(|| eyre::Report::new(BuildError::UnknownExtruder("trad_rack".into())))?;
                Ok(Self::TradRack(TradRackActuator { driver }))
            }
            ExtruderCfg::ExtruderStepper { name } => {
                let stepper = registry
                    .stepper(name)
                    .ok_or_else(|| eyre::Report::new(BuildError::UnknownExtruder(name.clone())))?;
                Ok(Self::ExtruderStepper(ExtruderStepperActuator::bind(name, stepper)?))
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::TradRack(_) => "trad_rack",
            Self::ExtruderStepper(_) => "extruder_stepper",
        }
    }

    /// Apply a multiplier to the physical drive.
    pub fn apply(&mut self, multiplier: f64) -> Result<()> {
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(eyre::Report::new(BelayError::InvalidArgument {
                field: "multiplier",
                reason: format!("{multiplier} must be a positive number"),
            }));
        }
        let res = match self {
            Self::TradRack(a) => a.driver.set_multiplier(multiplier),
            Self::ExtruderStepper(a) => a
                .stepper
                .set_rotation_distance(a.base_rotation_distance / multiplier),
        };
        res.map_err(|e| eyre::Report::new(map_hw_error(&*e)))
    }

    /// Host event names that trigger enable and disable attempts.
    pub fn enable_event(&self) -> Option<&'static str> {
        match self {
            Self::TradRack(_) => Some(TRAD_RACK_SYNCED_EVENT),
            Self::ExtruderStepper(_) => None,
        }
    }

    pub fn disable_event(&self) -> Option<&'static str> {
        match self {
            Self::TradRack(_) => Some(TRAD_RACK_UNSYNCING_EVENT),
            Self::ExtruderStepper(_) => None,
        }
    }

    pub fn enable_conditions_met(&self) -> bool {
        match self {
            Self::TradRack(a) => a.driver.is_synced(),
            Self::ExtruderStepper(_) => true,
        }
    }

    /// The unsyncing event fires while the driver still reports synced.
    pub fn disable_conditions_met(&self) -> bool {
        match self {
            Self::TradRack(a) => a.driver.is_synced(),
            Self::ExtruderStepper(_) => true,
        }
    }

    /// Whether the belay should enable itself once the host is ready.
    pub fn enables_at_ready(&self) -> bool {
        matches!(self, Self::ExtruderStepper(_))
    }

    pub fn stepper_name(&self) -> Option<&str> {
        match self {
            Self::ExtruderStepper(a) => Some(a.name()),
            Self::TradRack(_) => None,
        }
    }

    /// Validate `stepper` as a replacement binding without touching the
    /// current one.
    pub(crate) fn prepare_rebind(
        &self,
        name: &str,
        stepper: Box<dyn Stepper>,
    ) -> Result<ExtruderStepperActuator> {
        match self {
            Self::ExtruderStepper(_) => ExtruderStepperActuator::bind(name, stepper),
            Self::TradRack(_) => Err(eyre::Report::new(BelayError::Unsupported {
                belay: String::new(),
                what: "stepper selection is only available for extruder_stepper",
            })),
        }
    }

    /// Swap in a prepared stepper binding. The caller is responsible for
    /// disabling first so no multiplier lingers on the old stepper.
    pub(crate) fn rebind(&mut self, actuator: ExtruderStepperActuator) {
        *self = Self::ExtruderStepper(actuator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockRegistry, MockStepper};

    #[test]
    fn stepper_applies_inverse_rotation_distance() {
        let stepper = MockStepper::new(20.0);
        let registry = MockRegistry::default().with_stepper("aux", stepper.clone());
        let mut ext = SecondaryExtruder::connect(
            &ExtruderCfg::ExtruderStepper { name: "aux".into() },
            &registry,
        )
        .unwrap();
        ext.apply(1.25).unwrap();
        assert!((stepper.rotation_distance() - 16.0).abs() < 1e-12);
        ext.apply(1.0).unwrap();
        assert_eq!(stepper.rotation_distance(), 20.0);
        assert!(ext.apply(0.0).is_err());
        assert_eq!(stepper.rotation_distance(), 20.0);
    }

    #[test]
    fn unknown_stepper_is_a_build_error() {
        let err = SecondaryExtruder::connect(
            &ExtruderCfg::ExtruderStepper {
                name: "missing".into(),
            },
            &MockRegistry::default(),
        )
        .unwrap_err();
        assert_eq!(
            err.downcast_ref::<BuildError>(),
            Some(&BuildError::UnknownExtruder("missing".into()))
        );
    }

    #[test]
    fn trad_rack_gates_on_sync() {
        let registry = MockRegistry::default().with_driver(false);
        let driver = registry.driver().unwrap();
        let ext = SecondaryExtruder::connect(&ExtruderCfg::TradRack, &registry).unwrap();
        assert!(!ext.enable_conditions_met());
        driver.set_synced(true);
        assert!(ext.enable_conditions_met());
        assert!(ext.disable_conditions_met());
        assert!(!ext.enables_at_ready());
        assert_eq!(ext.enable_event(), Some(TRAD_RACK_SYNCED_EVENT));
    }

    #[test]
    fn prepared_rebind_rejects_bad_stepper_without_swapping() {
        let registry = MockRegistry::default().with_stepper("aux", MockStepper::new(20.0));
        let mut ext = SecondaryExtruder::connect(
            &ExtruderCfg::ExtruderStepper { name: "aux".into() },
            &registry,
        )
        .unwrap();
        assert!(ext.prepare_rebind("bad", Box::new(MockStepper::new(0.0))).is_err());
        assert!(ext.prepare_rebind("nan", Box::new(MockStepper::new(f64::NAN))).is_err());
        assert_eq!(ext.stepper_name(), Some("aux"));

        let next = ext.prepare_rebind("other", Box::new(MockStepper::new(8.0))).unwrap();
        assert_eq!(next.base_rotation_distance(), 8.0);
        ext.rebind(next);
        assert_eq!(ext.stepper_name(), Some("other"));
    }
}
