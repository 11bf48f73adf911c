//! Spring values
//!
//! A spring value is one controller key: a root node in the graph, one
//! [`Motion`] per numeric component, and the queue of steps waiting to run on
//! it. Numbers and vectors animate their leaves directly. Strings animate a
//! hidden 0→1 progress leaf feeding a string interpolator.
//!
//! State machine: `Idle → (Delayed →) Animating → Idle`. Settling resolves
//! the current step with `finished: true`; stopping freezes the value and
//! resolves with `finished: false`.

use std::collections::VecDeque;
use std::rc::Rc;

use futures::channel::oneshot;
use kinetic_core::{Value, ValueKind};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::controller::{AnimationResult, KeyChangeCallback, RestCallback, StartCallback};
use crate::error::{AnimationError, Result};
use crate::host::Host;
use crate::interpolation::{normalize_colors, InterpolatorConfig};
use crate::node::{CombineFn, Listener, NodeGraph, NodeId, NodeKind};
use crate::scheduler::{ControllerId, Effect, Op, SchedulerState, SpringId};
use crate::spring::{Motion, MotionModel, SpringConfig, StepOutcome};

/// Repeat policy for a step
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopPolicy {
    /// Total runs; `None` loops until stopped
    pub iterations: Option<u32>,
    /// Swap start and target on every run
    pub reverse: bool,
}

impl LoopPolicy {
    pub fn forever() -> Self {
        Self {
            iterations: None,
            reverse: false,
        }
    }

    pub fn times(iterations: u32) -> Self {
        Self {
            iterations: Some(iterations),
            reverse: false,
        }
    }

    /// Ping-pong between start and target
    pub fn reversing(mut self) -> Self {
        self.reverse = true;
        self
    }
}

pub(crate) enum Shape {
    Number(NodeId),
    Vector(SmallVec<[NodeId; 4]>),
    Text { progress: NodeId },
}

impl Shape {
    fn kind(&self) -> ValueKind {
        match self {
            Shape::Number(_) => ValueKind::Number,
            Shape::Vector(_) => ValueKind::List,
            Shape::Text { .. } => ValueKind::Text,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Phase {
    Idle,
    Delayed { remaining_ms: f64 },
    Animating,
}

#[derive(Clone, Default)]
pub(crate) struct StepCallbacks {
    pub on_start: Option<StartCallback>,
    pub on_change: Option<KeyChangeCallback>,
    pub on_rest: Option<RestCallback>,
}

/// One key's share of an update
pub(crate) struct KeyStep {
    pub from: Option<Value>,
    pub to: Option<Value>,
    pub config: SpringConfig,
    pub delay_ms: f64,
    pub immediate: bool,
    pub reset: bool,
    pub reverse: bool,
    pub looping: Option<LoopPolicy>,
    pub callbacks: StepCallbacks,
    pub done: Option<oneshot::Sender<AnimationResult>>,
}

struct LoopState {
    policy: LoopPolicy,
    runs: u32,
    origin: Value,
    target: Value,
}

pub(crate) struct SpringValue {
    pub key: String,
    pub controller: ControllerId,
    pub root: NodeId,
    pub shape: Shape,
    pub motions: SmallVec<[Motion; 4]>,
    pub config: SpringConfig,
    pub phase: Phase,
    pub paused: bool,
    pub step: Option<KeyStep>,
    pub queue: VecDeque<KeyStep>,
    loop_state: Option<LoopState>,
}

impl SpringValue {
    pub fn wants_frames(&self) -> bool {
        !self.paused && self.phase != Phase::Idle
    }

    pub fn is_animating(&self) -> bool {
        self.phase != Phase::Idle
    }
}

/// Check that `value` can drive a spring of the given shape
pub(crate) fn check_value(
    key: &str,
    expected: Option<ValueKind>,
    value: &Value,
    width: Option<usize>,
) -> Result<()> {
    match value {
        Value::Map(_) => {
            return Err(AnimationError::UnsupportedValue(format!(
                "'{key}' is a map; animate its fields as separate keys"
            )))
        }
        Value::List(items) => {
            if items.is_empty() || value.numbers().is_none() {
                return Err(AnimationError::UnsupportedValue(format!(
                    "'{key}' must be a non-empty list of numbers"
                )));
            }
        }
        Value::Number(n) if !n.is_finite() => {
            return Err(AnimationError::UnsupportedValue(format!(
                "'{key}' is not finite"
            )))
        }
        _ => {}
    }

    if let Some(expected) = expected {
        if value.kind() != expected {
            return Err(AnimationError::ValueMismatch {
                key: key.to_string(),
                expected,
                found: value.kind(),
            });
        }
    }
    if let (Some(width), Some(items)) = (width, value.as_list()) {
        if items.len() != width {
            return Err(AnimationError::UnsupportedValue(format!(
                "'{key}' has {} components, expected {width}",
                items.len()
            )));
        }
    }
    Ok(())
}

fn numbers(value: &Value) -> SmallVec<[f64; 4]> {
    match value {
        Value::Number(n) => smallvec::smallvec![*n],
        Value::List(items) => items.iter().filter_map(Value::as_number).collect(),
        _ => SmallVec::new(),
    }
}

fn write_leaves(graph: &mut NodeGraph, shape: &Shape, motions: &[Motion]) {
    match shape {
        Shape::Number(leaf) | Shape::Text { progress: leaf } => {
            if let Some(motion) = motions.first() {
                graph.set_leaf(*leaf, motion.position);
            }
        }
        Shape::Vector(leaves) => {
            for (leaf, motion) in leaves.iter().zip(motions) {
                graph.set_leaf(*leaf, motion.position);
            }
        }
    }
}

fn constant_text(text: Value) -> CombineFn {
    Rc::new(move |_: &[Value]| text.clone())
}

/// Point a text spring's root at an interpolator between two strings
fn seed_text(graph: &mut NodeGraph, host: &Rc<dyn Host>, root: NodeId, from: &Value, to: &Value) {
    let outputs = vec![from.to_string(), to.to_string()];
    match host.create_string_interpolator(InterpolatorConfig::new(vec![0.0, 1.0], outputs)) {
        Ok(interpolator) => graph.set_function(
            root,
            Rc::new(move |inputs: &[Value]| {
                interpolator.interpolate(inputs.first().and_then(Value::as_number).unwrap_or(0.0))
            }),
        ),
        Err(err) => {
            tracing::warn!("cannot interpolate '{}' to '{}': {}", from, to, err);
            graph.set_function(root, constant_text(to.clone()));
        }
    }
}

fn same_text(a: &Value, b: &Value) -> bool {
    match (a.as_text(), b.as_text()) {
        (Some(a), Some(b)) => {
            a == b || matches!((normalize_colors(a), normalize_colors(b)), (Ok(x), Ok(y)) if x == y)
        }
        _ => false,
    }
}

fn resolve(
    step: KeyStep,
    result: AnimationResult,
    controller_rest: &[RestCallback],
    effects: &mut Vec<Effect>,
) {
    let mut callbacks: Vec<RestCallback> = step.callbacks.on_rest.into_iter().collect();
    callbacks.extend(controller_rest.iter().cloned());
    let done = step.done;
    effects.push(Box::new(move || {
        for callback in &callbacks {
            callback(&result);
        }
        if let Some(done) = done {
            let _ = done.send(result);
        }
    }));
}

impl SchedulerState {
    /// Create the spring value for a new controller key
    pub(crate) fn create_spring(
        &mut self,
        controller: ControllerId,
        key: &str,
        initial: &Value,
        config: SpringConfig,
    ) -> Result<SpringId> {
        check_value(key, None, initial, None)?;
        let Some(object) = self.controllers.get(controller).map(|c| c.root) else {
            return Err(AnimationError::ControllerDestroyed);
        };

        let graph = &mut self.graph;
        let (root, shape, motions): (NodeId, Shape, SmallVec<[Motion; 4]>) = match initial {
            Value::Number(n) => {
                let leaf = graph.leaf(*n);
                (leaf, Shape::Number(leaf), smallvec::smallvec![Motion::at_rest(*n)])
            }
            Value::Text(_) => {
                let progress = graph.leaf(0.0);
                let root = graph.insert(NodeKind::Interpolation {
                    parents: smallvec::smallvec![progress],
                    func: constant_text(initial.clone()),
                });
                (root, Shape::Text { progress }, smallvec::smallvec![Motion::at_rest(0.0)])
            }
            _ => {
                let values = numbers(initial);
                let leaves: SmallVec<[NodeId; 4]> = values.iter().map(|n| graph.leaf(*n)).collect();
                let root = graph.insert(NodeKind::Array(leaves.clone()));
                let motions = values.iter().map(|n| Motion::at_rest(*n)).collect();
                (root, Shape::Vector(leaves), motions)
            }
        };

        let id = self.springs.insert(SpringValue {
            key: key.to_string(),
            controller,
            root,
            shape,
            motions,
            config,
            phase: Phase::Idle,
            paused: false,
            step: None,
            queue: VecDeque::new(),
            loop_state: None,
        });
        self.graph.add_listener(root, Listener::Spring(id));
        self.graph.object_insert(object, key, root);
        if let Some(controller) = self.controllers.get_mut(controller) {
            controller.springs.insert(key.to_string(), id);
        }
        Ok(id)
    }

    /// Validate a value against an existing spring
    pub(crate) fn check_spring_value(&self, id: SpringId, value: &Value) -> Result<()> {
        match self.springs.get(id) {
            Some(spring) => check_value(
                &spring.key,
                Some(spring.shape.kind()),
                value,
                matches!(spring.shape, Shape::Vector(_)).then_some(spring.motions.len()),
            ),
            None => Ok(()),
        }
    }

    pub(crate) fn spring_value(&self, id: SpringId) -> Option<Value> {
        self.springs.get(id).map(|spring| self.graph.value(spring.root))
    }

    fn controller_rest(&self, controller: ControllerId) -> Vec<RestCallback> {
        self.controllers
            .get(controller)
            .map(|c| c.on_rest.clone())
            .unwrap_or_default()
    }

    fn result(&self, id: SpringId, finished: bool, cancelled: bool) -> Option<AnimationResult> {
        let spring = self.springs.get(id)?;
        Some(AnimationResult {
            key: spring.key.clone(),
            value: self.graph.value(spring.root),
            finished,
            cancelled,
        })
    }

    /// Make `step` the current step of a spring
    pub(crate) fn begin_step(
        &mut self,
        id: SpringId,
        mut step: KeyStep,
        effects: &mut Vec<Effect>,
    ) {
        let Some(spring) = self.springs.get_mut(id) else {
            return;
        };
        if step.from.is_some() && !spring.is_animating() {
            step.reset = true;
        }
        spring.loop_state = None;

        let delay = step.delay_ms;
        spring.step = Some(step);
        if delay > 0.0 {
            spring.phase = Phase::Delayed {
                remaining_ms: delay,
            };
            self.pending.push(Op::Start(id));
            return;
        }

        if !self.commence(id, effects) {
            self.finish_step(id, true, effects);
        }
    }

    /// Seed motions for the current step and register with the scheduler
    ///
    /// Returns false when there is nothing to animate.
    fn commence(&mut self, id: SpringId, effects: &mut Vec<Effect>) -> bool {
        let precision = self.config.default_precision;
        let host = self.host.clone();
        let Some(current) = self.spring_value(id) else {
            return false;
        };

        let Self {
            springs,
            graph,
            pending,
            ..
        } = self;
        let Some(spring) = springs.get_mut(id) else {
            return false;
        };
        let Some(step) = spring.step.as_ref() else {
            return false;
        };

        let (from, to) = if step.reverse {
            (step.to.clone(), step.from.clone())
        } else {
            (step.from.clone(), step.to.clone())
        };
        let reset = step.reset;
        let immediate = step.immediate;
        let looping = step.looping;
        let on_start = step.callbacks.on_start.clone();
        let config = step.config;

        let origin = if reset {
            from.unwrap_or_else(|| current.clone())
        } else {
            current.clone()
        };
        let target = to.unwrap_or_else(|| current.clone());
        let at_rest = spring.motions.iter().all(|m| m.done);
        spring.config = config;

        match spring.shape {
            Shape::Text { .. } => {
                if !reset && at_rest && same_text(&current, &target) {
                    return false;
                }
                seed_text(graph, &host, spring.root, &origin, &target);
                let motion = &mut spring.motions[0];
                motion.reset(0.0, 1.0, 0.0);
                if immediate {
                    motion.snap(1.0);
                }
            }
            Shape::Number(_) | Shape::Vector(_) => {
                let start = numbers(&origin);
                let end = numbers(&target);
                if end.len() != spring.motions.len() {
                    return false;
                }

                if immediate {
                    for (motion, to) in spring.motions.iter_mut().zip(&end) {
                        motion.reset(motion.position, *to, 0.0);
                        motion.snap(*to);
                    }
                } else if let MotionModel::Decay { .. } = config.model {
                    for (motion, start) in spring.motions.iter_mut().zip(&start) {
                        let velocity = if motion.done { config.velocity } else { motion.velocity };
                        let from = if reset { *start } else { motion.position };
                        motion.reset(from, from, velocity);
                    }
                } else if reset {
                    for ((motion, start), to) in spring.motions.iter_mut().zip(&start).zip(&end) {
                        motion.reset(*start, *to, config.velocity);
                    }
                } else {
                    let precision = config.precision.unwrap_or(precision);
                    let resting = spring
                        .motions
                        .iter()
                        .zip(&end)
                        .all(|(motion, to)| motion.done && motion.is_resting_at(*to, precision));
                    if resting {
                        return false;
                    }
                    for (motion, to) in spring.motions.iter_mut().zip(&end) {
                        if motion.done {
                            motion.reset(motion.position, *to, config.velocity);
                        } else {
                            motion.retarget(*to);
                        }
                    }
                }
            }
        }

        if let Some(policy) = looping {
            spring.loop_state = Some(LoopState {
                policy,
                runs: 0,
                origin,
                target,
            });
        }

        write_leaves(graph, &spring.shape, &spring.motions);
        spring.phase = Phase::Animating;
        pending.push(Op::Start(id));

        if let Some(on_start) = on_start {
            let key = spring.key.clone();
            effects.push(Box::new(move || on_start(&key)));
        }
        true
    }

    /// Advance one spring by `dt_ms`; `None` when it should leave the active set
    pub(crate) fn advance_spring(
        &mut self,
        id: SpringId,
        dt_ms: f64,
        effects: &mut Vec<Effect>,
    ) -> Option<StepOutcome> {
        let settings = self.config;
        let spring = self.springs.get_mut(id)?;
        if !spring.wants_frames() {
            return None;
        }

        let mut dt_ms = dt_ms;
        if let Phase::Delayed { remaining_ms } = spring.phase {
            let left = remaining_ms - dt_ms;
            if left > 0.0 {
                spring.phase = Phase::Delayed { remaining_ms: left };
                return Some(StepOutcome::Running);
            }
            dt_ms = -left;
            if !self.commence(id, effects) {
                return Some(StepOutcome::Done);
            }
        }

        let Self {
            springs,
            graph,
            controllers,
            ..
        } = self;
        let spring = springs.get_mut(id)?;
        let config = spring.config;

        let mut done = true;
        for motion in spring.motions.iter_mut() {
            match motion.advance(&config, dt_ms, &settings) {
                StepOutcome::Running => done = false,
                StepOutcome::Done => {}
                StepOutcome::Diverged => return Some(StepOutcome::Diverged),
            }
        }
        write_leaves(graph, &spring.shape, &spring.motions);

        let changed = spring
            .motions
            .iter()
            .any(|m| m.position != m.last_position);
        if changed {
            let mut listeners: Vec<KeyChangeCallback> = spring
                .step
                .as_ref()
                .and_then(|step| step.callbacks.on_change.clone())
                .into_iter()
                .collect();
            if let Some(controller) = controllers.get(spring.controller) {
                listeners.extend(controller.on_change.iter().cloned());
            }
            if !listeners.is_empty() {
                let key = spring.key.clone();
                let value = graph.value(spring.root);
                effects.push(Box::new(move || {
                    for listener in &listeners {
                        listener(&key, &value);
                    }
                }));
            }
            // Report each change once
            for motion in spring.motions.iter_mut() {
                motion.last_position = motion.position;
            }
        }

        Some(if done {
            StepOutcome::Done
        } else {
            StepOutcome::Running
        })
    }

    /// Handle a spring that came to rest: loop again or finish the step
    pub(crate) fn settle(&mut self, id: SpringId, effects: &mut Vec<Effect>) {
        let host = self.host.clone();
        let Self {
            springs,
            graph,
            pending,
            ..
        } = self;
        let Some(spring) = springs.get_mut(id) else {
            return;
        };

        if let Some(state) = spring.loop_state.as_mut() {
            state.runs += 1;
            let more = state.policy.iterations.map_or(true, |n| state.runs < n);
            if more && state.origin != state.target {
                if state.policy.reverse {
                    std::mem::swap(&mut state.origin, &mut state.target);
                }
                let velocity = spring.config.velocity;
                match spring.shape {
                    Shape::Text { .. } => {
                        seed_text(graph, &host, spring.root, &state.origin, &state.target);
                        spring.motions[0].reset(0.0, 1.0, 0.0);
                    }
                    Shape::Number(_) | Shape::Vector(_) => {
                        let start = numbers(&state.origin);
                        let end = numbers(&state.target);
                        let targets = start.iter().zip(&end);
                        for (motion, (start, to)) in spring.motions.iter_mut().zip(targets) {
                            motion.reset(*start, *to, velocity);
                        }
                    }
                }
                write_leaves(graph, &spring.shape, &spring.motions);
                pending.push(Op::Start(id));
                tracing::trace!("spring {:?} looping (run {})", id, state.runs);
                return;
            }
        }

        self.finish_step(id, true, effects);
    }

    /// Resolve the current step and start the next queued one
    fn finish_step(&mut self, id: SpringId, finished: bool, effects: &mut Vec<Effect>) {
        let Some(result) = self.result(id, finished, false) else {
            return;
        };
        let rest = self.controller_rest(result_controller(self, id));
        let Some(spring) = self.springs.get_mut(id) else {
            return;
        };
        spring.phase = Phase::Idle;
        spring.loop_state = None;
        let step = spring.step.take();
        let next = spring.queue.pop_front();

        if let Some(step) = step {
            resolve(step, result, &rest, effects);
        }
        if let Some(next) = next {
            self.begin_step(id, next, effects);
        }
    }

    /// Drop the current and queued steps without touching the motion
    ///
    /// The current step resolves unfinished; queued ones resolve cancelled.
    pub(crate) fn supersede(&mut self, id: SpringId, effects: &mut Vec<Effect>) {
        self.cancel_steps(id, false, effects);
    }

    /// Freeze a spring at its current value and cancel its steps
    pub(crate) fn stop_spring(&mut self, id: SpringId, effects: &mut Vec<Effect>) {
        let Some(spring) = self.springs.get_mut(id) else {
            return;
        };
        spring.phase = Phase::Idle;
        for motion in spring.motions.iter_mut() {
            motion.halt();
        }
        self.queue_stop(id);
        self.cancel_steps(id, true, effects);
    }

    fn cancel_steps(&mut self, id: SpringId, cancel_current: bool, effects: &mut Vec<Effect>) {
        let Some(current) = self.result(id, false, cancel_current) else {
            return;
        };
        let cancelled = AnimationResult {
            cancelled: true,
            ..current.clone()
        };
        let rest = self.controller_rest(result_controller(self, id));
        let Some(spring) = self.springs.get_mut(id) else {
            return;
        };
        spring.loop_state = None;
        if let Some(step) = spring.step.take() {
            resolve(step, current, &rest, effects);
        }
        for step in spring.queue.drain(..) {
            resolve(step, cancelled.clone(), &rest, effects);
        }
    }

    pub(crate) fn pause_spring(&mut self, id: SpringId) {
        if let Some(spring) = self.springs.get_mut(id) {
            spring.paused = true;
            self.queue_stop(id);
        }
    }

    pub(crate) fn resume_spring(&mut self, id: SpringId) {
        if let Some(spring) = self.springs.get_mut(id) {
            spring.paused = false;
            if spring.phase != Phase::Idle {
                self.pending.push(Op::Start(id));
            }
        }
    }

    /// Jump to `value` without animating
    pub(crate) fn set_spring(&mut self, id: SpringId, value: &Value, effects: &mut Vec<Effect>) {
        self.stop_spring(id, effects);
        let Self { springs, graph, .. } = self;
        let Some(spring) = springs.get_mut(id) else {
            return;
        };
        match spring.shape {
            Shape::Text { .. } => {
                graph.set_function(spring.root, constant_text(value.clone()));
            }
            Shape::Number(_) | Shape::Vector(_) => {
                for (motion, to) in spring.motions.iter_mut().zip(numbers(value)) {
                    *motion = Motion::at_rest(to);
                }
                write_leaves(graph, &spring.shape, &spring.motions);
            }
        }
    }

    /// Remove a spring and its nodes
    pub(crate) fn remove_spring(&mut self, id: SpringId, effects: &mut Vec<Effect>) {
        self.stop_spring(id, effects);
        self.active.shift_remove(&id);
        if let Some(spring) = self.springs.remove(id) {
            if let Some(object) = self.controllers.get(spring.controller).map(|c| c.root) {
                self.graph.object_remove(object, &spring.key);
            }
            self.graph.remove_listener(spring.root, Listener::Spring(id));
            self.graph.release(spring.root);
        }
    }
}

fn result_controller(state: &SchedulerState, id: SpringId) -> ControllerId {
    state
        .springs
        .get(id)
        .map(|spring| spring.controller)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert!(check_value("x", None, &Value::from(1.0), None).is_ok());
        assert!(matches!(
            check_value("x", Some(ValueKind::Number), &Value::from("10px"), None),
            Err(AnimationError::ValueMismatch { .. })
        ));
        assert!(matches!(
            check_value("x", None, &Value::Map(Default::default()), None),
            Err(AnimationError::UnsupportedValue(_))
        ));
        let triple = Value::from(vec![1.0, 2.0, 3.0]);
        assert!(check_value("xy", Some(ValueKind::List), &triple, Some(2)).is_err());
        assert!(check_value("n", None, &Value::from(f64::NAN), None).is_err());
    }

    #[test]
    fn test_same_text_normalizes_colors() {
        assert!(same_text(&Value::from("red"), &Value::from("#ff0000")));
        assert!(!same_text(&Value::from("red"), &Value::from("blue")));
    }

    #[test]
    fn test_loop_policy_builders() {
        let policy = LoopPolicy::times(3).reversing();
        assert_eq!(policy.iterations, Some(3));
        assert!(policy.reverse);
        assert_eq!(LoopPolicy::forever().iterations, None);
    }
}
