//! PID controller driven by extrusion distance instead of wall-clock time.
//!
//! The integration variable is the cumulative primary-extruder distance, so
//! control action scales with material throughput and stays idle while the
//! printer is not extruding. The integral uses the trapezoidal rule and is
//! kept from winding up with back-calculation through the tracking time
//! constant `Tt`.

use crate::config::PidCfg;
use crate::error::{BuildError, Result};

#[derive(Debug, Clone)]
pub struct PidController {
    kp: f64,
    ki: f64,
    kd: f64,
    tt: f64,
    limit: f64,
    setpoint: f64,

    last_position: f64,
    last_distance: f64,
    last_error: f64,
    last_output: f64,
    integral: f64,
}

impl PidController {
    /// Validate gains and build a controller seeded at the setpoint.
    ///
    /// Derived constants: `Ti = Kp/Ki` (infinite without integral action) and
    /// `Td = Kd/Kp`. A configured `Tt` must satisfy `Td <= Tt <= Ti`; when
    /// absent it defaults to `sqrt(Ti*Td)`, or `Ti` for a PI controller.
    pub fn new(cfg: &PidCfg) -> Result<Self> {
        if !(cfg.kp.is_finite() && cfg.kp > 0.0) {
            return Err(BuildError::invalid("pid.kp", "must be > 0"));
        }
        if !(cfg.ki.is_finite() && cfg.ki >= 0.0) {
            return Err(BuildError::invalid("pid.ki", "must be >= 0"));
        }
        if !(cfg.kd.is_finite() && cfg.kd >= 0.0) {
            return Err(BuildError::invalid("pid.kd", "must be >= 0"));
        }
        if !(cfg.limit.is_finite() && cfg.limit > 0.0) {
            return Err(BuildError::invalid("pid.limit", "must be > 0"));
        }
        if !cfg.setpoint.is_finite() {
            return Err(BuildError::invalid("pid.setpoint", "must be finite"));
        }
        let ti = ti(cfg.kp, cfg.ki);
        let td = cfg.kd / cfg.kp;
        let tt = match cfg.tt {
            Some(tt) => {
                if tt.is_nan() || tt < td || tt > ti {
                    return Err(BuildError::invalid("pid.tt", "must satisfy Td <= Tt <= Ti"));
                }
                tt
            }
            None if td > 0.0 => (ti * td).sqrt(),
            None => ti,
        };
        Ok(Self {
            kp: cfg.kp,
            ki: cfg.ki,
            kd: cfg.kd,
            tt,
            limit: cfg.limit,
            setpoint: cfg.setpoint,
            last_position: cfg.setpoint,
            last_distance: 0.0,
            last_error: 0.0,
            last_output: 0.0,
            integral: 0.0,
        })
    }

    /// Run one controller update and return the clamped output.
    ///
    /// A zero distance delta suppresses the derivative term and leaves the
    /// integral untouched. Non-finite inputs are ignored and the previous
    /// output is returned.
    pub fn update(&mut self, position: f64, distance: f64) -> f64 {
        if !position.is_finite() || !distance.is_finite() {
            tracing::trace!(position, distance, "pid: ignoring non-finite input");
            return self.last_output;
        }
        let error = self.setpoint - position;
        let delta = (distance - self.last_distance).abs();

        let proportional = self.kp * error;
        self.integral += self.ki * (self.last_error + error) * 0.5 * delta;
        let derivative = if delta > 0.0 {
            -self.kd * (position - self.last_position) / delta
        } else {
            0.0
        };

        let raw = proportional + self.integral + derivative;
        let clamped = if raw.is_nan() {
            self.last_output
        } else {
            raw.clamp(-self.limit, self.limit)
        };
        if delta > 0.0 && raw.is_finite() {
            self.integral += (clamped - raw) * delta / self.tt.max(delta);
        }

        self.last_position = position;
        self.last_distance = distance;
        self.last_error = error;
        self.last_output = clamped;
        clamped
    }

    /// Reseed from the current measurements for a bumpless (re)start.
    pub fn reset(&mut self, position: f64, distance: f64) {
        self.last_position = position;
        self.last_distance = distance;
        self.last_error = self.setpoint - position;
        self.last_output = 0.0;
        self.integral = 0.0;
    }

    /// Move the target without touching the integral.
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn last_output(&self) -> f64 {
        self.last_output
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn ti(&self) -> f64 {
        ti(self.kp, self.ki)
    }

    pub fn td(&self) -> f64 {
        self.kd / self.kp
    }

    pub fn tt(&self) -> f64 {
        self.tt
    }
}

#[inline]
fn ti(kp: f64, ki: f64) -> f64 {
    if ki > 0.0 { kp / ki } else { f64::INFINITY }
}
