//! Controllers
//!
//! A controller owns a named set of spring values and applies declarative
//! updates to them. Each key animates independently; patches for the same key
//! queued in one flush run back to back, each one settling (or being
//! superseded) before the next begins.
//!
//! ```ignore
//! let controller = Controller::new(&scheduler.handle(), [("opacity", 0.0), ("x", -20.0)])?;
//! let done = controller.animate(
//!     UpdateProps::new()
//!         .to("opacity", 1.0)
//!         .to("x", 0.0)
//!         .config(SpringConfig::gentle()),
//! )?;
//! ```

use std::cell::RefCell;
use std::future::Future;
use std::ops::Deref;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::{join_all, LocalBoxFuture};
use futures::FutureExt;
use indexmap::{IndexMap, IndexSet};
use kinetic_core::{PropertyMap, Value};
use serde::{Deserialize, Serialize};

use crate::error::{AnimationError, Result};
use crate::host::TargetId;
use crate::interpolation::InterpolatorConfig;
use crate::node::{AnimatedNode, BindingId, NodeId, NodeKind};
use crate::scheduler::{ControllerId, Effect, SchedulerHandle, SchedulerState, SpringId};
use crate::script::{script_task, CancelToken, ScriptContext};
use crate::spring::SpringConfig;
use crate::spring_value::{check_value, KeyStep, LoopPolicy, StepCallbacks};

/// Called when a key starts moving
pub type StartCallback = Rc<dyn Fn(&str)>;

/// Called with a key and its value after every frame it changed
pub type KeyChangeCallback = Rc<dyn Fn(&str, &Value)>;

/// Called when a key's step resolves
pub type RestCallback = Rc<dyn Fn(&AnimationResult)>;

/// Outcome of one key's step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationResult {
    pub key: String,
    pub value: Value,
    /// The key reached its target
    pub finished: bool,
    /// The step was stopped, or dropped before it began
    pub cancelled: bool,
}

/// Resolves once every key touched by a flush has resolved
pub type Completion = LocalBoxFuture<'static, Vec<AnimationResult>>;

pub(crate) type ScriptFn = Box<dyn FnOnce(ScriptContext) -> LocalBoxFuture<'static, Result<()>>>;

/// A declarative patch for a controller
#[derive(Default)]
pub struct UpdateProps {
    pub(crate) to: IndexMap<String, Value>,
    pub(crate) from: IndexMap<String, Value>,
    pub(crate) config: Option<SpringConfig>,
    pub(crate) config_for: IndexMap<String, SpringConfig>,
    pub(crate) delay_ms: f64,
    pub(crate) immediate: bool,
    pub(crate) immediate_for: IndexSet<String>,
    pub(crate) reset: bool,
    pub(crate) reverse: bool,
    pub(crate) looping: Option<LoopPolicy>,
    pub(crate) callbacks: StepCallbacks,
    pub(crate) script: Option<ScriptFn>,
}

impl UpdateProps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target value for `key`
    pub fn to(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.to.insert(key.into(), value.into());
        self
    }

    /// Start value for `key`; applied when the key is idle or `reset` is set
    pub fn from(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.from.insert(key.into(), value.into());
        self
    }

    pub fn config(mut self, config: SpringConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Config for one key, overriding [`config`](Self::config)
    pub fn config_for(mut self, key: impl Into<String>, config: SpringConfig) -> Self {
        self.config_for.insert(key.into(), config);
        self
    }

    pub fn delay(mut self, delay_ms: f64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Jump every key to its target without animating
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn immediate_for(mut self, key: impl Into<String>) -> Self {
        self.immediate_for.insert(key.into());
        self
    }

    /// Restart from `from` (or the current value) with the seed velocity
    pub fn reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Swap `from` and `to`
    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn looping(mut self, policy: LoopPolicy) -> Self {
        self.looping = Some(policy);
        self
    }

    pub fn on_start(mut self, callback: impl Fn(&str) + 'static) -> Self {
        self.callbacks.on_start = Some(Rc::new(callback));
        self
    }

    pub fn on_change(mut self, callback: impl Fn(&str, &Value) + 'static) -> Self {
        self.callbacks.on_change = Some(Rc::new(callback));
        self
    }

    pub fn on_rest(mut self, callback: impl Fn(&AnimationResult) + 'static) -> Self {
        self.callbacks.on_rest = Some(Rc::new(callback));
        self
    }

    /// Drive the controller from an async script
    ///
    /// The script runs on the scheduler's executor and issues targets through
    /// [`ScriptContext::next`]. Stopping the controller cancels it at its next
    /// `await`.
    ///
    /// ```ignore
    /// controller.animate(UpdateProps::new().script(|ctx| async move {
    ///     ctx.next(UpdateProps::new().to("x", 100.0)).await?;
    ///     ctx.next(UpdateProps::new().to("x", 0.0)).await?;
    ///     Ok(())
    /// }))?;
    /// ```
    pub fn script<F, Fut>(mut self, script: F) -> Self
    where
        F: FnOnce(ScriptContext) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        self.script = Some(Box::new(move |ctx| script(ctx).boxed_local()));
        self
    }

    fn keys(&self) -> IndexSet<String> {
        self.from.keys().chain(self.to.keys()).cloned().collect()
    }
}

impl std::fmt::Debug for UpdateProps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateProps")
            .field("to", &self.to)
            .field("from", &self.from)
            .field("config", &self.config)
            .field("delay_ms", &self.delay_ms)
            .field("immediate", &self.immediate)
            .field("reset", &self.reset)
            .field("reverse", &self.reverse)
            .field("looping", &self.looping)
            .field("script", &self.script.is_some())
            .finish()
    }
}

/// Controller defaults
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Config for updates that do not carry their own
    pub config: SpringConfig,
    /// Jump every update to its target
    pub immediate: bool,
}

pub(crate) struct ControllerState {
    pub springs: IndexMap<String, SpringId>,
    /// Object node holding every key
    pub root: NodeId,
    pub queue: Vec<UpdateProps>,
    pub config: ControllerConfig,
    pub on_rest: Vec<RestCallback>,
    pub on_change: Vec<KeyChangeCallback>,
    pub scripts: Vec<CancelToken>,
}

impl SchedulerState {
    fn create_controller(
        &mut self,
        initial: PropertyMap,
        config: ControllerConfig,
    ) -> Result<ControllerId> {
        config.config.validate()?;
        for (key, value) in &initial {
            check_value(key, None, value, None)?;
        }

        let root = self.graph.insert(NodeKind::Object(IndexMap::new()));
        let id = self.controllers.insert(ControllerState {
            springs: IndexMap::new(),
            root,
            queue: Vec::new(),
            config,
            on_rest: Vec::new(),
            on_change: Vec::new(),
            scripts: Vec::new(),
        });
        for (key, value) in &initial {
            self.create_spring(id, key, value, config.config)?;
        }
        tracing::debug!("controller {:?} created with {} keys", id, initial.len());
        Ok(id)
    }

    fn controller(&self, id: ControllerId) -> Result<&ControllerState> {
        self.controllers
            .get(id)
            .ok_or(AnimationError::ControllerDestroyed)
    }

    fn controller_spring(&self, id: ControllerId, key: &str) -> Option<SpringId> {
        self.controllers.get(id)?.springs.get(key).copied()
    }

    fn controller_values(&self, id: ControllerId) -> Option<PropertyMap> {
        let controller = self.controllers.get(id)?;
        Some(
            controller
                .springs
                .iter()
                .filter_map(|(key, spring)| Some((key.clone(), self.spring_value(*spring)?)))
                .collect(),
        )
    }

    /// Reject a patch before anything is mutated
    fn validate_update(&self, id: ControllerId, props: &UpdateProps) -> Result<()> {
        let controller = self.controller(id)?;
        if let Some(config) = &props.config {
            config.validate()?;
        }
        for config in props.config_for.values() {
            config.validate()?;
        }
        if !(props.delay_ms.is_finite() && props.delay_ms >= 0.0) {
            return Err(AnimationError::InvalidConfig(format!(
                "delay must be a non-negative number of milliseconds, got {}",
                props.delay_ms
            )));
        }

        for key in props.keys() {
            let from = props.from.get(&key);
            let to = props.to.get(&key);
            let spring = controller.springs.get(&key).copied();

            match spring {
                Some(spring) => {
                    for value in from.iter().chain(to.iter()) {
                        self.check_spring_value(spring, value)?;
                    }
                }
                None => {
                    for value in from.iter().chain(to.iter()) {
                        check_value(&key, None, value, None)?;
                    }
                    if let (Some(from), Some(to)) = (from, to) {
                        let width = from.as_list().map(<[Value]>::len);
                        check_value(&key, Some(from.kind()), to, width)?;
                    }
                }
            }

            // Strings must share one template to be interpolated
            let current = spring.and_then(|spring| self.spring_value(spring));
            let texts: Vec<String> = current
                .iter()
                .chain(from)
                .chain(to)
                .filter_map(|value| value.as_text().map(String::from))
                .collect();
            if texts.len() >= 2 {
                let range = (0..texts.len()).map(|i| i as f64).collect();
                self.host
                    .create_string_interpolator(InterpolatorConfig::new(range, texts))?;
            }
        }
        Ok(())
    }

    /// Start every queued patch; `extra_delay_ms` is added to each one's delay
    fn flush(
        &mut self,
        handle: &ControllerHandle,
        extra_delay_ms: f64,
        effects: &mut Vec<Effect>,
    ) -> Result<Completion> {
        let id = handle.id;
        let queue = match self.controllers.get_mut(id) {
            Some(controller) => std::mem::take(&mut controller.queue),
            None => return Err(AnimationError::ControllerDestroyed),
        };

        let mut pending: Vec<Completion> = Vec::new();
        let mut started: IndexSet<String> = IndexSet::new();
        for props in queue {
            if let Err(err) = self.validate_update(id, &props) {
                tracing::warn!("dropping queued update for controller {:?}: {}", id, err);
                continue;
            }
            self.apply_update(handle, props, extra_delay_ms, &mut started, &mut pending, effects)?;
        }

        Ok(async move {
            join_all(pending)
                .await
                .into_iter()
                .flatten()
                .collect()
        }
        .boxed_local())
    }

    fn apply_update(
        &mut self,
        handle: &ControllerHandle,
        props: UpdateProps,
        extra_delay_ms: f64,
        started: &mut IndexSet<String>,
        pending: &mut Vec<Completion>,
        effects: &mut Vec<Effect>,
    ) -> Result<()> {
        let id = handle.id;
        let defaults = self.controller(id)?.config;
        let keys = props.keys();
        let UpdateProps {
            to,
            from,
            config,
            config_for,
            delay_ms,
            immediate,
            immediate_for,
            reset,
            reverse,
            looping,
            callbacks,
            script,
        } = props;

        for key in keys {
            let spring = match self.controller_spring(id, &key) {
                Some(spring) => spring,
                None => {
                    let Some(initial) = from.get(&key).or_else(|| to.get(&key)) else {
                        continue;
                    };
                    let config = config_for
                        .get(&key)
                        .copied()
                        .or(config)
                        .unwrap_or(defaults.config);
                    self.create_spring(id, &key, initial, config)?
                }
            };

            let (done, receiver) = oneshot::channel();
            let cancelled_key = key.clone();
            pending.push(
                receiver
                    .map(move |result| {
                        vec![result.unwrap_or_else(|_| AnimationResult {
                            key: cancelled_key,
                            value: Value::default(),
                            finished: false,
                            cancelled: true,
                        })]
                    })
                    .boxed_local(),
            );

            let step = KeyStep {
                from: from.get(&key).cloned(),
                to: to.get(&key).cloned(),
                config: config_for.get(&key).copied().or(config).unwrap_or(defaults.config),
                delay_ms: delay_ms + extra_delay_ms,
                immediate: immediate || defaults.immediate || immediate_for.contains(&key),
                reset,
                reverse,
                looping,
                callbacks: callbacks.clone(),
                done: Some(done),
            };

            if started.insert(key) {
                self.supersede(spring, effects);
                self.begin_step(spring, step, effects);
            } else if let Some(spring) = self.springs.get_mut(spring) {
                spring.queue.push_back(step);
            }
        }

        if let Some(script) = script {
            let token = CancelToken::new();
            if let Some(controller) = self.controllers.get_mut(id) {
                controller.scripts.retain(|token| !token.is_cancelled() && !token.is_orphaned());
                controller.scripts.push(token.clone());
            }

            let (done, receiver) = oneshot::channel();
            pending.push(receiver.map(|result| result.unwrap_or_default()).boxed_local());

            let task = script_task(script, ScriptContext::new(handle.clone(), token), done);
            let spawner = self.spawner.clone();
            effects.push(Box::new(move || {
                use futures::task::LocalSpawnExt;
                if let Err(err) = spawner.spawn_local(task) {
                    tracing::warn!("cannot start animation script: {}", err);
                }
            }));
        }
        Ok(())
    }

    fn cancel_scripts(&mut self, id: ControllerId) {
        if let Some(controller) = self.controllers.get_mut(id) {
            for token in controller.scripts.drain(..) {
                token.cancel();
            }
        }
    }

    /// Stop every key, cancel scripts, and free the controller's nodes
    pub(crate) fn destroy_controller(&mut self, id: ControllerId, effects: &mut Vec<Effect>) {
        self.cancel_scripts(id);
        let Some(controller) = self.controllers.get_mut(id) else {
            return;
        };
        controller.queue.clear();
        let springs: Vec<SpringId> = controller.springs.values().copied().collect();
        let root = controller.root;

        for spring in &springs {
            self.remove_spring(*spring, effects);
        }
        self.controllers.remove(id);
        self.graph.release(root);
        tracing::debug!("controller {:?} destroyed ({} springs)", id, springs.len());
    }
}

/// Handle to a controller
///
/// Cheap to clone. Does not keep the controller alive; see [`Controller`]
/// for the owning wrapper.
#[derive(Clone)]
pub struct ControllerHandle {
    id: ControllerId,
    scheduler: SchedulerHandle,
    /// Values captured at destruction
    snapshot: Rc<RefCell<Option<PropertyMap>>>,
}

impl ControllerHandle {
    pub fn new<K, V>(
        scheduler: &SchedulerHandle,
        initial: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::with_config(scheduler, initial, ControllerConfig::default())
    }

    pub fn with_config<K, V>(
        scheduler: &SchedulerHandle,
        initial: impl IntoIterator<Item = (K, V)>,
        config: ControllerConfig,
    ) -> Result<Self>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let initial: PropertyMap = initial
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        let id = scheduler.mutate(|state, _| state.create_controller(initial, config))??;
        Ok(Self {
            id,
            scheduler: scheduler.clone(),
            snapshot: Rc::new(RefCell::new(None)),
        })
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Validate `props` and queue it for the next [`start`](Self::start)
    pub fn update(&self, props: UpdateProps) -> Result<()> {
        let id = self.id;
        self.scheduler.read(|state| state.validate_update(id, &props))??;
        self.scheduler.mutate(|state, _| match state.controllers.get_mut(id) {
            Some(controller) => {
                controller.queue.push(props);
                Ok(())
            }
            None => Err(AnimationError::ControllerDestroyed),
        })?
    }

    /// Flush the queue
    pub fn start(&self) -> Result<Completion> {
        self.start_with_delay(0.0)
    }

    /// [`update`](Self::update) then [`start`](Self::start)
    pub fn animate(&self, props: UpdateProps) -> Result<Completion> {
        self.update(props)?;
        self.start()
    }

    pub(crate) fn start_with_delay(&self, extra_delay_ms: f64) -> Result<Completion> {
        self.scheduler
            .mutate(|state, effects| state.flush(self, extra_delay_ms, effects))?
    }

    pub(crate) fn take_queue(&self) -> Result<Vec<UpdateProps>> {
        let id = self.id;
        self.scheduler.mutate(|state, _| {
            state
                .controllers
                .get_mut(id)
                .map(|controller| std::mem::take(&mut controller.queue))
                .ok_or(AnimationError::ControllerDestroyed)
        })?
    }

    /// Put taken patches back ahead of anything queued since
    pub(crate) fn restore_queue(&self, mut queue: Vec<UpdateProps>) -> Result<()> {
        let id = self.id;
        self.scheduler.mutate(|state, _| match state.controllers.get_mut(id) {
            Some(controller) => {
                queue.append(&mut controller.queue);
                controller.queue = queue;
                Ok(())
            }
            None => Err(AnimationError::ControllerDestroyed),
        })?
    }

    /// Jump keys to values without animating
    ///
    /// Steps in flight resolve with `finished: false`.
    pub fn set<K, V>(&self, values: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let id = self.id;
        let values: PropertyMap = values
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self.scheduler.mutate(|state, effects| {
            let config = state.controller(id)?.config.config;
            for (key, value) in &values {
                match state.controller_spring(id, key) {
                    Some(spring) => state.check_spring_value(spring, value)?,
                    None => check_value(key, None, value, None)?,
                }
            }
            for (key, value) in &values {
                match state.controller_spring(id, key) {
                    Some(spring) => state.set_spring(spring, value, effects),
                    None => {
                        state.create_spring(id, key, value, config)?;
                    }
                }
            }
            Ok(())
        })?
    }

    fn springs_for(
        state: &SchedulerState,
        id: ControllerId,
        keys: Option<&[&str]>,
    ) -> Vec<SpringId> {
        let Some(controller) = state.controllers.get(id) else {
            return Vec::new();
        };
        match keys {
            Some(keys) => keys
                .iter()
                .filter_map(|key| controller.springs.get(*key).copied())
                .collect(),
            None => controller.springs.values().copied().collect(),
        }
    }

    /// Halt keys at their current values
    ///
    /// `None` stops every key, drops the queue, and cancels running scripts.
    pub fn stop(&self, keys: Option<&[&str]>) -> Result<()> {
        let id = self.id;
        self.scheduler.mutate(|state, effects| {
            state.controller(id)?;
            if keys.is_none() {
                state.cancel_scripts(id);
                if let Some(controller) = state.controllers.get_mut(id) {
                    controller.queue.clear();
                }
            }
            for spring in Self::springs_for(state, id, keys) {
                state.stop_spring(spring, effects);
            }
            Ok(())
        })?
    }

    pub fn pause(&self, keys: Option<&[&str]>) -> Result<()> {
        let id = self.id;
        self.scheduler.mutate(|state, _| {
            for spring in Self::springs_for(state, id, keys) {
                state.pause_spring(spring);
            }
        })
    }

    pub fn resume(&self, keys: Option<&[&str]>) -> Result<()> {
        let id = self.id;
        self.scheduler.mutate(|state, _| {
            for spring in Self::springs_for(state, id, keys) {
                state.resume_spring(spring);
            }
        })
    }

    /// Current value of `key`, or its last value once destroyed
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(snapshot) = &*self.snapshot.borrow() {
            return snapshot.get(key).cloned();
        }
        let id = self.id;
        self.scheduler
            .read(|state| {
                state
                    .controller_spring(id, key)
                    .and_then(|spring| state.spring_value(spring))
            })
            .ok()
            .flatten()
    }

    pub fn values(&self) -> PropertyMap {
        if let Some(snapshot) = &*self.snapshot.borrow() {
            return snapshot.clone();
        }
        let id = self.id;
        self.scheduler
            .read(|state| state.controller_values(id))
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// Object node holding every key
    pub fn node(&self) -> Result<AnimatedNode> {
        let id = self.id;
        let root = self.scheduler.read(|state| state.controller(id).map(|c| c.root))??;
        Ok(AnimatedNode::new(root, self.scheduler.clone()))
    }

    pub fn key_node(&self, key: &str) -> Option<AnimatedNode> {
        let id = self.id;
        let root = self
            .scheduler
            .read(|state| {
                let spring = state.controller_spring(id, key)?;
                state.springs.get(spring).map(|spring| spring.root)
            })
            .ok()
            .flatten()?;
        Some(AnimatedNode::new(root, self.scheduler.clone()))
    }

    pub fn spring_id(&self, key: &str) -> Option<SpringId> {
        let id = self.id;
        self.scheduler
            .read(|state| state.controller_spring(id, key))
            .ok()
            .flatten()
    }

    /// Whether any key is delayed or moving
    pub fn is_animating(&self) -> bool {
        let id = self.id;
        self.scheduler
            .read(|state| {
                Self::springs_for(state, id, None).into_iter().any(|spring| {
                    state
                        .springs
                        .get(spring)
                        .map_or(false, |spring| spring.is_animating())
                })
            })
            .unwrap_or(false)
    }

    /// Listen for every key's step resolving
    pub fn on_rest(&self, callback: impl Fn(&AnimationResult) + 'static) -> Result<()> {
        let id = self.id;
        self.scheduler.mutate(|state, _| match state.controllers.get_mut(id) {
            Some(controller) => {
                controller.on_rest.push(Rc::new(callback));
                Ok(())
            }
            None => Err(AnimationError::ControllerDestroyed),
        })?
    }

    pub fn on_change(&self, callback: impl Fn(&str, &Value) + 'static) -> Result<()> {
        let id = self.id;
        self.scheduler.mutate(|state, _| match state.controllers.get_mut(id) {
            Some(controller) => {
                controller.on_change.push(Rc::new(callback));
                Ok(())
            }
            None => Err(AnimationError::ControllerDestroyed),
        })?
    }

    /// Apply every key to a render target, the host's default element if `None`
    pub fn bind(&self, target: Option<TargetId>) -> Result<BindingId> {
        let target = match target {
            Some(target) => target,
            None => self.scheduler.upgrade()?.host().default_element(),
        };
        self.scheduler.bind_target(target, &self.node()?)
    }

    /// Stop everything and release the controller's springs
    ///
    /// Reads keep returning the values captured here.
    pub fn destroy(&self) {
        if self.snapshot.borrow().is_some() {
            return;
        }
        let Ok(shared) = self.scheduler.upgrade() else {
            return;
        };
        let id = self.id;
        let values = shared
            .try_read(|state| state.controller_values(id))
            .flatten()
            .unwrap_or_default();
        *self.snapshot.borrow_mut() = Some(values);
        shared.destroy_controller(id);
    }

    pub fn is_destroyed(&self) -> bool {
        if self.snapshot.borrow().is_some() {
            return true;
        }
        let id = self.id;
        self.scheduler
            .read(|state| !state.controllers.contains_key(id))
            .unwrap_or(true)
    }
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("id", &self.id)
            .field("destroyed", &self.snapshot.borrow().is_some())
            .finish()
    }
}

/// Owning controller, destroyed on drop
pub struct Controller {
    handle: ControllerHandle,
}

impl Controller {
    pub fn new<K, V>(
        scheduler: &SchedulerHandle,
        initial: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Self>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Ok(Self {
            handle: ControllerHandle::new(scheduler, initial)?,
        })
    }

    pub fn with_config<K, V>(
        scheduler: &SchedulerHandle,
        initial: impl IntoIterator<Item = (K, V)>,
        config: ControllerConfig,
    ) -> Result<Self>
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Ok(Self {
            handle: ControllerHandle::with_config(scheduler, initial, config)?,
        })
    }

    /// A non-owning handle
    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }
}

impl Deref for Controller {
    type Target = ControllerHandle;

    fn deref(&self) -> &ControllerHandle {
        &self.handle
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.handle.destroy();
    }
}
