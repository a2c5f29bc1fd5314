//! Linear raw-reading to slider-position conversion.

use crate::config::PositionCalibration;
use crate::error::{BuildError, Result};

/// Maps raw analog readings onto `[-half_travel, +half_travel]`.
///
/// position = -half_travel + 2 * half_travel * (raw - expanded) / (compressed - expanded)
#[derive(Debug, Clone)]
pub struct PositionSensor {
    half_travel: f64,
    calibration: PositionCalibration,
}

impl PositionSensor {
    pub fn new(half_travel: f64, calibration: PositionCalibration) -> Result<Self> {
        if !(half_travel.is_finite() && half_travel > 0.0) {
            return Err(BuildError::invalid("sensor.half_travel", "must be > 0"));
        }
        validate_calibration(&calibration)?;
        Ok(Self {
            half_travel,
            calibration,
        })
    }

    /// Convert a raw reading to a position, clamped to the slider travel.
    pub fn position(&self, raw: f64) -> f64 {
        let PositionCalibration {
            expanded_reading,
            compressed_reading,
        } = self.calibration;
        let frac = (raw - expanded_reading) / (compressed_reading - expanded_reading);
        let pos = -self.half_travel + 2.0 * self.half_travel * frac;
        if pos.is_nan() {
            return 0.0;
        }
        pos.clamp(-self.half_travel, self.half_travel)
    }

    pub fn half_travel(&self) -> f64 {
        self.half_travel
    }

    pub fn calibration(&self) -> PositionCalibration {
        self.calibration
    }

    /// Replace both calibration endpoints at once.
    pub fn set_calibration(&mut self, calibration: PositionCalibration) -> Result<()> {
        validate_calibration(&calibration)?;
        self.calibration = calibration;
        Ok(())
    }
}

fn validate_calibration(c: &PositionCalibration) -> Result<()> {
    if !c.expanded_reading.is_finite() || !c.compressed_reading.is_finite() {
        return Err(BuildError::invalid(
            "sensor.calibration",
            "readings must be finite",
        ));
    }
    if c.expanded_reading == c.compressed_reading {
        return Err(BuildError::invalid(
            "sensor.calibration",
            "expanded and compressed readings must differ",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn sensor(expanded: f64, compressed: f64) -> PositionSensor {
        PositionSensor::new(
            4.0,
            PositionCalibration {
                expanded_reading: expanded,
                compressed_reading: compressed,
            },
        )
        .expect("valid sensor")
    }

    #[rstest]
    #[case(0.2, -4.0)]
    #[case(0.5, 0.0)]
    #[case(0.8, 4.0)]
    #[case(0.65, 2.0)]
    #[case(0.0, -4.0)]
    #[case(1.0, 4.0)]
    fn maps_and_clamps(#[case] raw: f64, #[case] expected: f64) {
        let s = sensor(0.2, 0.8);
        assert!((s.position(raw) - expected).abs() < 1e-9);
    }

    #[test]
    fn inverted_wiring_maps_the_same_endpoints() {
        let s = sensor(0.9, 0.1);
        assert!((s.position(0.9) + 4.0).abs() < 1e-9);
        assert!((s.position(0.1) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_degenerate_calibration() {
        let mut s = sensor(0.2, 0.8);
        let bad = PositionCalibration {
            expanded_reading: 0.5,
            compressed_reading: 0.5,
        };
        assert!(s.set_calibration(bad).is_err());
        assert_eq!(s.calibration().expanded_reading, 0.2);
    }
}
