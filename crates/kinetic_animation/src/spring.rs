//! Spring physics and duration integration
//!
//! [`SpringConfig`] describes how one key moves; [`Motion`] is the per-scalar
//! integrator state advanced by the scheduler. Physical springs are integrated
//! with semi-implicit Euler in fixed sub-steps (1ms by default) so high
//! tensions and low frame rates stay stable.

use serde::{Deserialize, Serialize};

use crate::easing::Easing;
use crate::error::{AnimationError, Result};
use crate::scheduler::SchedulerConfig;

/// Smallest damping ratio used during integration
///
/// An undamped spring would oscillate forever; this floor lets every valid
/// config eventually come to rest.
pub const MIN_DAMPING_RATIO: f64 = 0.05;

/// Velocity (units/s) under which a decay animation is considered stopped
pub const DECAY_REST_VELOCITY: f64 = 5.0;

/// Default deceleration for [`SpringConfig::decay`]
pub const DEFAULT_DECELERATION: f64 = 0.998;

/// Upper bound on integration sub-steps per frame
const MAX_SUBSTEPS: usize = 10_000;

/// How a value travels from its start to its target
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MotionModel {
    /// Damped harmonic oscillator
    Spring {
        mass: f64,
        tension: f64,
        friction: f64,
    },
    /// Fixed duration with an easing curve
    Duration { duration_ms: f64, easing: Easing },
    /// Exponential slow-down from the initial velocity; the target is ignored
    Decay { deceleration: f64 },
}

/// Configuration for one animated key
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpringConfig {
    pub model: MotionModel,
    /// Stop at the target instead of overshooting
    #[serde(default)]
    pub clamp: bool,
    /// Rest displacement threshold; derived from the travel distance when unset
    #[serde(default)]
    pub precision: Option<f64>,
    /// Rest velocity threshold (units/s); defaults to the precision
    #[serde(default)]
    pub rest_velocity: Option<f64>,
    /// Initial velocity (units/s) applied when starting from rest
    #[serde(default)]
    pub velocity: f64,
}

impl SpringConfig {
    /// Create a physical spring configuration
    pub fn new(tension: f64, friction: f64, mass: f64) -> Self {
        Self::from_model(MotionModel::Spring {
            mass,
            tension,
            friction,
        })
    }

    fn from_model(model: MotionModel) -> Self {
        Self {
            model,
            clamp: false,
            precision: None,
            rest_velocity: None,
            velocity: 0.0,
        }
    }

    /// Spring described by its response period (seconds) and damping ratio
    ///
    /// A damping ratio of 1.0 is critically damped; lower values bounce.
    pub fn from_frequency(frequency: f64, damping_ratio: f64) -> Self {
        let mass = 1.0;
        let tension = (2.0 * std::f64::consts::PI / frequency).powi(2) * mass;
        let friction = 4.0 * std::f64::consts::PI * damping_ratio * mass / frequency;
        Self::new(tension, friction, mass)
    }

    /// Duration-based animation with an easing curve
    pub fn duration(duration_ms: f64, easing: Easing) -> Self {
        Self::from_model(MotionModel::Duration {
            duration_ms,
            easing,
        })
    }

    /// Velocity-driven decay
    pub fn decay(velocity: f64) -> Self {
        Self::from_model(MotionModel::Decay {
            deceleration: DEFAULT_DECELERATION,
        })
        .with_velocity(velocity)
    }

    /// The default physical spring (tension 170, friction 26)
    pub fn standard() -> Self {
        Self::new(170.0, 26.0, 1.0)
    }

    /// A gentle, slow spring (good for page transitions)
    pub fn gentle() -> Self {
        Self::new(120.0, 14.0, 1.0)
    }

    /// A wobbly spring with overshoot (good for playful UI)
    pub fn wobbly() -> Self {
        Self::new(180.0, 12.0, 1.0)
    }

    /// A stiff, snappy spring (good for buttons)
    pub fn stiff() -> Self {
        Self::new(210.0, 20.0, 1.0)
    }

    /// Slow with no overshoot
    pub fn slow() -> Self {
        Self::new(280.0, 60.0, 1.0)
    }

    /// Very slow, heavily damped
    pub fn molasses() -> Self {
        Self::new(280.0, 120.0, 1.0)
    }

    pub fn with_clamp(mut self, clamp: bool) -> Self {
        self.clamp = clamp;
        self
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_rest_velocity(mut self, rest_velocity: f64) -> Self {
        self.rest_velocity = Some(rest_velocity);
        self
    }

    pub fn with_velocity(mut self, velocity: f64) -> Self {
        self.velocity = velocity;
        self
    }

    /// Override the mass of a physical spring; other models are unchanged
    pub fn with_mass(mut self, new_mass: f64) -> Self {
        if let MotionModel::Spring { ref mut mass, .. } = self.model {
            *mass = new_mass;
        }
        self
    }

    /// Override the deceleration of a decay model
    pub fn with_deceleration(mut self, value: f64) -> Self {
        if let MotionModel::Decay {
            ref mut deceleration,
        } = self.model
        {
            *deceleration = value;
        }
        self
    }

    /// Calculate critical damping for a physical spring
    pub fn critical_damping(&self) -> Option<f64> {
        match self.model {
            MotionModel::Spring { mass, tension, .. } => Some(2.0 * (tension * mass).sqrt()),
            _ => None,
        }
    }

    /// Check if the spring is underdamped (will oscillate)
    pub fn is_underdamped(&self) -> bool {
        match (self.model, self.critical_damping()) {
            (MotionModel::Spring { friction, .. }, Some(critical)) => friction < critical,
            _ => false,
        }
    }

    /// Reject configs that would produce NaN trajectories
    pub fn validate(&self) -> Result<()> {
        match self.model {
            MotionModel::Spring {
                mass,
                tension,
                friction,
            } => {
                if !(mass.is_finite() && mass > 0.0) {
                    return Err(invalid(format!("mass must be positive, got {mass}")));
                }
                if !(tension.is_finite() && tension > 0.0) {
                    return Err(invalid(format!("tension must be positive, got {tension}")));
                }
                if !(friction.is_finite() && friction >= 0.0) {
                    return Err(invalid(format!(
                        "friction must be non-negative, got {friction}"
                    )));
                }
            }
            MotionModel::Duration { duration_ms, .. } => {
                if !(duration_ms.is_finite() && duration_ms >= 0.0) {
                    return Err(invalid(format!(
                        "duration must be non-negative, got {duration_ms}"
                    )));
                }
            }
            MotionModel::Decay { deceleration } => {
                if !(deceleration > 0.0 && deceleration < 1.0) {
                    return Err(invalid(format!(
                        "deceleration must be in (0, 1), got {deceleration}"
                    )));
                }
            }
        }

        if let Some(precision) = self.precision {
            if !(precision.is_finite() && precision > 0.0) {
                return Err(invalid(format!("precision must be positive, got {precision}")));
            }
        }
        if let Some(rest) = self.rest_velocity {
            if !(rest.is_finite() && rest > 0.0) {
                return Err(invalid(format!("rest velocity must be positive, got {rest}")));
            }
        }
        if !self.velocity.is_finite() {
            return Err(invalid("velocity must be finite".to_string()));
        }
        Ok(())
    }
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self::standard()
    }
}

fn invalid(message: String) -> AnimationError {
    AnimationError::InvalidConfig(message)
}

/// Result of advancing a [`Motion`] by one frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Running,
    Done,
    /// The integrator produced a non-finite value
    Diverged,
}

/// Integrator state for one scalar component
#[derive(Clone, Debug, PartialEq)]
pub struct Motion {
    pub from: f64,
    pub to: f64,
    pub position: f64,
    pub last_position: f64,
    /// Units per second
    pub velocity: f64,
    /// Velocity at the start of the current leg (decay model)
    pub launch_velocity: f64,
    pub elapsed_ms: f64,
    pub done: bool,
}

impl Motion {
    /// A motion resting at `value`
    pub fn at_rest(value: f64) -> Self {
        Self {
            from: value,
            to: value,
            position: value,
            last_position: value,
            velocity: 0.0,
            launch_velocity: 0.0,
            elapsed_ms: 0.0,
            done: true,
        }
    }

    /// Head for a new target from the current position, keeping velocity
    pub fn retarget(&mut self, to: f64) {
        self.from = self.position;
        self.to = to;
        self.launch_velocity = self.velocity;
        self.elapsed_ms = 0.0;
        self.done = false;
    }

    /// Re-seed at `from` with the given initial velocity
    pub fn reset(&mut self, from: f64, to: f64, velocity: f64) {
        self.from = from;
        self.to = to;
        self.position = from;
        self.last_position = from;
        self.velocity = velocity;
        self.launch_velocity = velocity;
        self.elapsed_ms = 0.0;
        self.done = false;
    }

    /// Jump to `to` and stop
    pub fn snap(&mut self, to: f64) {
        self.last_position = self.position;
        self.position = to;
        self.to = to;
        self.velocity = 0.0;
        self.done = true;
    }

    /// Freeze at the current position
    pub fn halt(&mut self) {
        self.velocity = 0.0;
        self.done = true;
    }

    /// Whether the motion is already resting at `to`
    pub fn is_resting_at(&self, to: f64, precision: f64) -> bool {
        self.velocity == 0.0 && (self.position - to).abs() <= precision
    }

    /// Rest displacement threshold for this leg
    pub fn precision(&self, config: &SpringConfig, settings: &SchedulerConfig) -> f64 {
        config.precision.unwrap_or_else(|| {
            let distance = (self.to - self.from).abs();
            if distance == 0.0 {
                settings.default_precision
            } else {
                (distance * settings.relative_precision).clamp(1e-6, 1.0)
            }
        })
    }

    /// Advance by `dt_ms` milliseconds
    pub fn advance(
        &mut self,
        config: &SpringConfig,
        dt_ms: f64,
        settings: &SchedulerConfig,
    ) -> StepOutcome {
        if self.done {
            return StepOutcome::Done;
        }
        self.last_position = self.position;

        let outcome = match config.model {
            MotionModel::Spring {
                mass,
                tension,
                friction,
            } => self.advance_spring(config, mass, tension, friction, dt_ms, settings),
            MotionModel::Duration {
                duration_ms,
                easing,
            } => self.advance_duration(duration_ms, easing, dt_ms),
            MotionModel::Decay { deceleration } => {
                self.advance_decay(config, deceleration, dt_ms)
            }
        };

        if !(self.position.is_finite() && self.velocity.is_finite()) {
            return StepOutcome::Diverged;
        }
        if outcome == StepOutcome::Done {
            self.done = true;
        }
        outcome
    }

    fn advance_spring(
        &mut self,
        config: &SpringConfig,
        mass: f64,
        tension: f64,
        friction: f64,
        dt_ms: f64,
        settings: &SchedulerConfig,
    ) -> StepOutcome {
        let precision = self.precision(config, settings);
        let rest_velocity = config.rest_velocity.unwrap_or(precision);
        self.elapsed_ms += dt_ms;

        if self.is_settled(precision, rest_velocity) {
            self.snap(self.to);
            return StepOutcome::Done;
        }
        if dt_ms <= 0.0 {
            return StepOutcome::Running;
        }

        let friction = friction.max(MIN_DAMPING_RATIO * 2.0 * (tension * mass).sqrt());
        let steps = ((dt_ms / settings.substep_ms).ceil() as usize).clamp(1, MAX_SUBSTEPS);
        let h = dt_ms / steps as f64 / 1000.0;

        // Semi-implicit Euler is only stable while ω·h and c·h/m stay small;
        // very stiff springs take a backward Euler step instead.
        let omega = (tension / mass).sqrt();
        let stiff = omega * h >= 1.0 || friction * h / mass >= 1.0;

        for _ in 0..steps {
            let prev = self.position;
            if stiff {
                let denom = 1.0 + h * friction / mass + h * h * tension / mass;
                self.velocity =
                    (self.velocity + h * tension / mass * (self.to - self.position)) / denom;
            } else {
                let acceleration =
                    (tension * (self.to - self.position) - friction * self.velocity) / mass;
                self.velocity += acceleration * h;
            }
            self.position += self.velocity * h;

            if !self.position.is_finite() {
                return StepOutcome::Diverged;
            }

            if config.clamp {
                let crossed = (prev - self.to) * (self.position - self.to) < 0.0;
                if crossed || (self.position == self.to && prev != self.to) {
                    self.snap(self.to);
                    return StepOutcome::Done;
                }
            }

            if self.is_settled(precision, rest_velocity) {
                self.snap(self.to);
                return StepOutcome::Done;
            }
        }

        StepOutcome::Running
    }

    fn is_settled(&self, precision: f64, rest_velocity: f64) -> bool {
        (self.to - self.position).abs() <= precision && self.velocity.abs() <= rest_velocity
    }

    fn advance_duration(&mut self, duration_ms: f64, easing: Easing, dt_ms: f64) -> StepOutcome {
        self.elapsed_ms += dt_ms;
        let t = if duration_ms <= 0.0 {
            1.0
        } else {
            (self.elapsed_ms / duration_ms).clamp(0.0, 1.0)
        };

        if t >= 1.0 {
            self.snap(self.to);
            return StepOutcome::Done;
        }

        let prev = self.position;
        self.position = self.from + (self.to - self.from) * easing.apply(t);
        self.velocity = if dt_ms > 0.0 {
            (self.position - prev) / (dt_ms / 1000.0)
        } else {
            0.0
        };
        StepOutcome::Running
    }

    fn advance_decay(
        &mut self,
        config: &SpringConfig,
        deceleration: f64,
        dt_ms: f64,
    ) -> StepOutcome {
        self.elapsed_ms += dt_ms;
        let k = 1.0 - deceleration;
        let v0 = self.launch_velocity / 1000.0;
        let e = (-k * self.elapsed_ms).exp();

        self.position = self.from + v0 / k * (1.0 - e);
        self.velocity = self.launch_velocity * e;

        let rest = config.rest_velocity.unwrap_or(DECAY_REST_VELOCITY);
        if self.velocity.abs() <= rest {
            self.snap(self.position);
            return StepOutcome::Done;
        }
        StepOutcome::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(config: &SpringConfig, motion: &mut Motion, dt_ms: f64, max_frames: usize) -> usize {
        let settings = SchedulerConfig::default();
        for frame in 1..=max_frames {
            match motion.advance(config, dt_ms, &settings) {
                StepOutcome::Done => return frame,
                StepOutcome::Running => {}
                StepOutcome::Diverged => panic!("diverged at frame {frame}"),
            }
        }
        panic!("did not settle within {max_frames} frames");
    }

    #[test]
    fn test_spring_settles_to_target() {
        let config = SpringConfig::standard();
        let mut motion = Motion::at_rest(0.0);
        motion.retarget(100.0);

        run(&config, &mut motion, 16.0, 600);
        assert_eq!(motion.position, 100.0);
        assert_eq!(motion.velocity, 0.0);
    }

    #[test]
    fn test_converges_across_configs() {
        let configs = [
            SpringConfig::new(1.0, 0.0, 1.0),
            SpringConfig::new(5000.0, 1.0, 0.5),
            SpringConfig::new(1e7, 10.0, 0.01),
            SpringConfig::new(50.0, 500.0, 3.0),
            SpringConfig::wobbly(),
            SpringConfig::molasses(),
        ];
        for config in configs {
            for (start, target) in [(0.0, 1.0), (-250.0, 250.0), (3.0, 3.0), (1e4, -1e4)] {
                let mut motion = Motion::at_rest(start);
                motion.retarget(target);
                let settings = SchedulerConfig::default();
                let precision = motion.precision(&config, &settings);
                run(&config, &mut motion, 16.0, 200_000);
                assert!((motion.position - target).abs() <= precision, "{config:?}");
            }
        }
    }

    #[test]
    fn test_clamp_never_overshoots() {
        let config = SpringConfig::new(500.0, 10.0, 1.0).with_clamp(true);
        let settings = SchedulerConfig::default();
        let mut motion = Motion::at_rest(0.0);
        motion.retarget(100.0);

        for _ in 0..1000 {
            let outcome = motion.advance(&config, 16.0, &settings);
            assert!(motion.position <= 100.0);
            if outcome == StepOutcome::Done {
                break;
            }
        }
        assert!(motion.done);
        assert_eq!(motion.position, 100.0);
    }

    #[test]
    fn test_unclamped_overshoots() {
        let config = SpringConfig::new(500.0, 10.0, 1.0);
        let settings = SchedulerConfig::default();
        let mut motion = Motion::at_rest(0.0);
        motion.retarget(100.0);

        let mut peak: f64 = 0.0;
        for _ in 0..200 {
            motion.advance(&config, 16.0, &settings);
            peak = peak.max(motion.position);
        }
        assert!(peak > 100.0);
    }

    #[test]
    fn test_retarget_keeps_velocity() {
        let config = SpringConfig::wobbly();
        let settings = SchedulerConfig::default();
        let mut motion = Motion::at_rest(0.0);
        motion.retarget(100.0);
        for _ in 0..10 {
            motion.advance(&config, 16.0, &settings);
        }

        let velocity = motion.velocity;
        assert!(velocity > 0.0);
        motion.retarget(50.0);
        assert_eq!(motion.velocity, velocity);
        assert!(!motion.done);
    }

    #[test]
    fn test_duration_model() {
        let config = SpringConfig::duration(100.0, Easing::Linear);
        let settings = SchedulerConfig::default();
        let mut motion = Motion::at_rest(0.0);
        motion.retarget(10.0);

        assert_eq!(motion.advance(&config, 50.0, &settings), StepOutcome::Running);
        assert!((motion.position - 5.0).abs() < 1e-9);
        assert_eq!(motion.advance(&config, 50.0, &settings), StepOutcome::Done);
        assert_eq!(motion.position, 10.0);
    }

    #[test]
    fn test_zero_duration_finishes_immediately() {
        let config = SpringConfig::duration(0.0, Easing::EaseInOut);
        let mut motion = Motion::at_rest(1.0);
        motion.retarget(2.0);
        assert_eq!(
            motion.advance(&config, 0.0, &SchedulerConfig::default()),
            StepOutcome::Done
        );
        assert_eq!(motion.position, 2.0);
    }

    #[test]
    fn test_decay_slows_down() {
        let config = SpringConfig::decay(1000.0);
        let mut motion = Motion::at_rest(0.0);
        motion.reset(0.0, 0.0, config.velocity);

        run(&config, &mut motion, 16.0, 10_000);
        // v0 / (1 - d) in units per ms
        let limit = 1.0 / (1.0 - DEFAULT_DECELERATION);
        assert!(motion.position > 0.9 * limit && motion.position <= limit);
        assert_eq!(motion.to, motion.position);
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        assert!(SpringConfig::new(170.0, 26.0, -1.0).validate().is_err());
        assert!(SpringConfig::new(0.0, 26.0, 1.0).validate().is_err());
        assert!(SpringConfig::new(170.0, -1.0, 1.0).validate().is_err());
        assert!(SpringConfig::new(f64::NAN, 26.0, 1.0).validate().is_err());
        assert!(SpringConfig::duration(-5.0, Easing::Linear).validate().is_err());
        assert!(SpringConfig::decay(10.0).with_deceleration(1.0).validate().is_err());
        assert!(SpringConfig::standard().with_precision(0.0).validate().is_err());
        assert!(SpringConfig::new(170.0, 0.0, 1.0).validate().is_ok());
    }

    #[test]
    fn test_frequency_parameterisation() {
        let config = SpringConfig::from_frequency(0.5, 1.2);
        assert!(!config.is_underdamped());
        if let MotionModel::Spring { tension, .. } = config.model {
            assert!((tension - 157.9137).abs() < 1e-3);
        }
        let bouncy = SpringConfig::from_frequency(0.5, 0.3);
        assert!(bouncy.is_underdamped());
    }

    #[test]
    fn test_presets() {
        assert!(SpringConfig::wobbly().is_underdamped());
        assert!(SpringConfig::gentle().is_underdamped());
        assert!(!SpringConfig::molasses().is_underdamped());
    }

    #[test]
    fn test_config_serde() {
        let json = r#"{
            "model": {"type": "duration", "duration_ms": 250.0, "easing": "ease_out"},
            "clamp": true
        }"#;
        let config: SpringConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config,
            SpringConfig::duration(250.0, Easing::EaseOut).with_clamp(true)
        );
    }
}
