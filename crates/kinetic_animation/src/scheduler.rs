//! Animation scheduler
//!
//! One scheduler per UI thread advances every active spring value exactly
//! once per display frame. The frame timing primitive comes from the injected
//! [`Host`]; frames are only requested while something is animating.
//!
//! Registration changes made during a pass (a completion callback starting
//! another animation, a controller being stopped) are queued and applied at
//! the start of the next pass. User callbacks never run while scheduler
//! state is borrowed: they are collected as effects and run once the pass
//! has released it.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::{Rc, Weak};

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::controller::ControllerState;
use crate::error::{AnimationError, Result};
use crate::host::{FrameRequestId, Host};
use crate::node::NodeGraph;
use crate::spring::StepOutcome;
use crate::spring_value::SpringValue;

// ============================================================================
// Global Animation Scheduler State
// ============================================================================

thread_local! {
    static GLOBAL_SCHEDULER: RefCell<Option<SchedulerHandle>> = const { RefCell::new(None) };
}

/// Set the animation scheduler for the current thread
///
/// The engine is single-threaded; each UI thread owns its own scheduler.
///
/// # Panics
///
/// Panics if called more than once on the same thread.
pub fn set_global_scheduler(handle: SchedulerHandle) {
    GLOBAL_SCHEDULER.with(|global| {
        let mut global = global.borrow_mut();
        if global.is_some() {
            panic!("set_global_scheduler() called more than once");
        }
        *global = Some(handle);
    });
}

/// Get the animation scheduler for the current thread
///
/// # Panics
///
/// Panics if `set_global_scheduler()` has not been called.
///
/// # Example
///
/// ```ignore
/// use kinetic_animation::{get_scheduler, ControllerHandle};
///
/// let controller = ControllerHandle::new(&get_scheduler(), [("opacity", 0.0)])?;
/// controller.animate(UpdateProps::new().to("opacity", 1.0))?;
/// ```
pub fn get_scheduler() -> SchedulerHandle {
    try_get_scheduler()
        .expect("Animation scheduler not initialized. Call set_global_scheduler() at app startup.")
}

/// Try to get the scheduler (returns None if not initialized)
pub fn try_get_scheduler() -> Option<SchedulerHandle> {
    GLOBAL_SCHEDULER.with(|global| global.borrow().clone())
}

/// Check if the scheduler has been initialized on this thread
pub fn is_scheduler_initialized() -> bool {
    GLOBAL_SCHEDULER.with(|global| global.borrow().is_some())
}

new_key_type! {
    /// Handle to a spring value owned by a controller
    pub struct SpringId;
    /// Handle to a controller
    pub struct ControllerId;
}

/// Tunable scheduler constants
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Largest frame delta fed to the integrators
    pub max_frame_delta_ms: f64,
    /// Fixed integration increment for physical springs
    pub substep_ms: f64,
    /// Delta assumed when no previous frame timestamp exists
    pub fallback_frame_ms: f64,
    /// Rest threshold when start and target are equal
    pub default_precision: f64,
    /// Rest threshold as a fraction of the travel distance
    pub relative_precision: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_frame_delta_ms: 1000.0 / 30.0,
            substep_ms: 1.0,
            fallback_frame_ms: 1000.0 / 60.0,
            default_precision: 0.005,
            relative_precision: 0.001,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !(positive(self.max_frame_delta_ms)
            && positive(self.substep_ms)
            && positive(self.fallback_frame_ms)
            && positive(self.default_precision)
            && positive(self.relative_precision))
        {
            return Err(AnimationError::InvalidConfig(format!(
                "scheduler constants must be positive: {self:?}"
            )));
        }
        Ok(())
    }
}

/// Work deferred until scheduler state is released
pub(crate) type Effect = Box<dyn FnOnce()>;

fn run_effects(effects: Vec<Effect>) {
    for effect in effects {
        effect();
    }
}

/// Registration change applied at the start of the next pass
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    Start(SpringId),
    Stop(SpringId),
}

/// Everything mutated by a frame pass
pub(crate) struct SchedulerState {
    pub graph: NodeGraph,
    pub springs: SlotMap<SpringId, SpringValue>,
    pub controllers: SlotMap<ControllerId, ControllerState>,
    /// Springs advanced each pass, in registration order
    pub active: IndexSet<SpringId>,
    pub pending: Vec<Op>,
    pub config: SchedulerConfig,
    pub host: Rc<dyn Host>,
    pub spawner: LocalSpawner,
}

impl SchedulerState {
    /// Stops only remove work, so they never keep the loop alive
    fn needs_frames(&self) -> bool {
        !self.active.is_empty()
            || self
                .pending
                .iter()
                .any(|op| matches!(op, Op::Start(_)))
    }

    /// Drop any queued registration and queue removal if `id` is active
    pub(crate) fn queue_stop(&mut self, id: SpringId) {
        self.pending.retain(|op| *op != Op::Start(id));
        if self.active.contains(&id) {
            self.pending.push(Op::Stop(id));
        }
    }

    fn apply_pending(&mut self) {
        for op in std::mem::take(&mut self.pending) {
            match op {
                Op::Start(id) => {
                    let Some(spring) = self.springs.get(id) else {
                        continue;
                    };
                    if spring.wants_frames() {
                        debug_assert!(
                            self.graph.is_attached(spring.root),
                            "registered spring must be attached"
                        );
                        self.active.insert(id);
                    }
                }
                Op::Stop(id) => {
                    self.active.shift_remove(&id);
                }
            }
        }
    }

    /// Advance every active spring once, then settle the finished ones
    fn advance_all(&mut self, dt_ms: f64, effects: &mut Vec<Effect>) {
        self.apply_pending();

        let ids: Vec<SpringId> = self.active.iter().copied().collect();
        let mut settled = Vec::new();
        for id in ids {
            match self.advance_spring(id, dt_ms, effects) {
                Some(StepOutcome::Running) => {}
                Some(StepOutcome::Done) => settled.push(id),
                Some(StepOutcome::Diverged) => {
                    tracing::error!(
                        "spring {:?} produced a non-finite value; stopping it",
                        id
                    );
                    self.active.shift_remove(&id);
                    self.stop_spring(id, effects);
                }
                None => {
                    self.active.shift_remove(&id);
                }
            }
        }

        // Completions run after the whole batch advanced
        for id in settled {
            self.active.shift_remove(&id);
            self.settle(id, effects);
        }
    }

    pub fn drain_notifications(&mut self, effects: &mut Vec<Effect>) {
        let host = self.host.clone();
        self.graph.drain_notifications(&host, effects);
    }
}

// ============================================================================
// Scheduler
// ============================================================================

pub(crate) struct Shared {
    state: RefCell<SchedulerState>,
    host: Rc<dyn Host>,
    config: SchedulerConfig,
    frame: Cell<Option<FrameRequestId>>,
    last_frame: Cell<Option<f64>>,
    warned: Cell<bool>,
    frame_count: Cell<u64>,
    pool: RefCell<LocalPool>,
    pumping: Cell<bool>,
    /// Controllers dropped while state was busy
    doomed: RefCell<Vec<ControllerId>>,
}

impl Shared {
    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    pub fn read<R>(&self, f: impl FnOnce(&SchedulerState) -> R) -> R {
        f(&self.state.borrow())
    }

    /// Read unless a pass or mutation holds the state
    pub fn try_read<R>(&self, f: impl FnOnce(&SchedulerState) -> R) -> Option<R> {
        self.state.try_borrow().ok().map(|state| f(&state))
    }

    /// Mutate state, then run effects, pump scripts, and wake the frame loop
    pub fn mutate<R>(
        self: &Rc<Self>,
        f: impl FnOnce(&mut SchedulerState, &mut Vec<Effect>) -> R,
    ) -> R {
        let mut effects = Vec::new();
        let result = {
            let mut state = self.state.borrow_mut();
            self.reap(&mut state, &mut effects);
            let result = f(&mut state, &mut effects);
            state.drain_notifications(&mut effects);
            result
        };
        run_effects(effects);
        self.pump_tasks();
        self.ensure_frame();
        result
    }

    /// Destroy a controller now, or on the next mutation if state is busy
    pub fn destroy_controller(self: &Rc<Self>, id: ControllerId) {
        if self.state.try_borrow_mut().is_ok() {
            self.mutate(|state, effects| state.destroy_controller(id, effects));
        } else {
            self.doomed.borrow_mut().push(id);
        }
    }

    fn reap(&self, state: &mut SchedulerState, effects: &mut Vec<Effect>) {
        let doomed = std::mem::take(&mut *self.doomed.borrow_mut());
        for id in doomed {
            state.destroy_controller(id, effects);
        }
    }

    /// Run `task` on the scheduler's executor
    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        let spawner = self.state.borrow().spawner.clone();
        if let Err(err) = spawner.spawn_local(task) {
            tracing::warn!("cannot spawn animation task: {}", err);
        }
        self.pump_tasks();
    }

    /// Drive script tasks until they all wait on something
    fn pump_tasks(&self) {
        if self.pumping.replace(true) {
            return;
        }
        if let Ok(mut pool) = self.pool.try_borrow_mut() {
            pool.run_until_stalled();
        }
        self.pumping.set(false);
    }

    fn ensure_frame(self: &Rc<Self>) {
        if self.frame.get().is_some() {
            return;
        }
        if !self.state.borrow().needs_frames() {
            return;
        }

        if self.last_frame.get().is_none() {
            // Start timing from now so the first frame does not see a huge delta
            self.last_frame.set(Some(self.host.now()));
        }

        let weak = Rc::downgrade(self);
        let request = self.host.request_frame(Box::new(move |timestamp| {
            if let Some(shared) = weak.upgrade() {
                shared.on_frame(timestamp);
            }
        }));

        match request {
            Some(id) => {
                tracing::trace!("animation frame requested");
                self.frame.set(Some(id));
            }
            None => {
                if !self.warned.replace(true) {
                    tracing::warn!(
                        "host has no frame timing primitive; animations only advance through tick()"
                    );
                }
            }
        }
    }

    fn on_frame(self: &Rc<Self>, timestamp: f64) {
        self.frame.set(None);
        let dt = match self.last_frame.replace(Some(timestamp)) {
            Some(last) => timestamp - last,
            None => self.config.fallback_frame_ms,
        };
        self.run_pass(dt);
    }

    fn run_pass(self: &Rc<Self>, dt_ms: f64) {
        let dt_ms = dt_ms.clamp(0.0, self.config.max_frame_delta_ms);
        self.frame_count.set(self.frame_count.get() + 1);

        let mut effects = Vec::new();
        {
            let mut state = self.state.borrow_mut();
            self.reap(&mut state, &mut effects);
            state.advance_all(dt_ms, &mut effects);
            state.drain_notifications(&mut effects);
        }
        run_effects(effects);
        self.pump_tasks();

        if self.state.borrow().needs_frames() {
            self.ensure_frame();
        } else if self.frame.get().is_none() {
            self.last_frame.set(None);
            tracing::debug!(
                "animation loop idle after {} frames",
                self.frame_count.get()
            );
        }
    }
}

/// The animation scheduler that advances all active spring values
///
/// Owns the engine state. Hand out [`SchedulerHandle`]s to create nodes and
/// controllers; dropping the scheduler cancels its pending frame and
/// invalidates every handle.
///
/// ```ignore
/// let host = Rc::new(ManualHost::new());
/// let scheduler = AnimationScheduler::new(host.clone());
/// let controller = ControllerHandle::new(&scheduler.handle(), [("x", 0.0)])?;
/// controller.animate(UpdateProps::new().to("x", 100.0))?;
/// host.run_until_idle(16.0, 1000);
/// ```
pub struct AnimationScheduler {
    shared: Rc<Shared>,
}

impl AnimationScheduler {
    pub fn new(host: Rc<dyn Host>) -> Self {
        Self::with_config(host, SchedulerConfig::default())
    }

    /// Create with custom constants; invalid ones fall back to the defaults
    pub fn with_config(host: Rc<dyn Host>, config: SchedulerConfig) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(err) => {
                tracing::warn!("{}; using defaults", err);
                SchedulerConfig::default()
            }
        };
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        let state = SchedulerState {
            graph: NodeGraph::new(),
            springs: SlotMap::with_key(),
            controllers: SlotMap::with_key(),
            active: IndexSet::new(),
            pending: Vec::new(),
            config,
            host: host.clone(),
            spawner,
        };
        Self {
            shared: Rc::new(Shared {
                state: RefCell::new(state),
                host,
                config,
                frame: Cell::new(None),
                last_frame: Cell::new(None),
                warned: Cell::new(false),
                frame_count: Cell::new(0),
                pool: RefCell::new(pool),
                pumping: Cell::new(false),
                doomed: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Get a handle to this scheduler for passing to components
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Rc::downgrade(&self.shared),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.shared.config
    }

    /// Run one pass with an explicit delta, independent of the host clock
    pub fn tick(&self, dt_ms: f64) {
        self.shared.run_pass(dt_ms);
    }

    /// Number of springs advanced by the next pass
    pub fn active_count(&self) -> usize {
        self.shared.read(|state| state.active.len())
    }

    /// No active springs and no queued registrations
    pub fn is_idle(&self) -> bool {
        !self.shared.read(|state| state.needs_frames())
    }

    pub fn frame_count(&self) -> u64 {
        self.shared.frame_count.get()
    }

    pub fn has_pending_frame(&self) -> bool {
        self.shared.frame.get().is_some()
    }
}

impl Drop for AnimationScheduler {
    fn drop(&mut self) {
        if let Some(id) = self.shared.frame.take() {
            self.shared.host.cancel_frame(id);
        }
        tracing::debug!("animation scheduler dropped");
    }
}

/// A weak handle to the animation scheduler
///
/// It won't prevent the scheduler from being dropped; operations on a dead
/// handle return [`AnimationError::SchedulerDropped`].
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Weak<Shared>,
}

impl SchedulerHandle {
    pub(crate) fn upgrade(&self) -> Result<Rc<Shared>> {
        self.shared.upgrade().ok_or(AnimationError::SchedulerDropped)
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&SchedulerState) -> R) -> Result<R> {
        Ok(self.upgrade()?.read(f))
    }

    pub(crate) fn mutate<R>(
        &self,
        f: impl FnOnce(&mut SchedulerState, &mut Vec<Effect>) -> R,
    ) -> Result<R> {
        Ok(self.upgrade()?.mutate(f))
    }

    pub fn is_alive(&self) -> bool {
        self.shared.strong_count() > 0
    }

    pub fn active_count(&self) -> usize {
        self.read(|state| state.active.len()).unwrap_or(0)
    }

    /// Whether `spring` is in the active set
    pub fn is_active(&self, spring: SpringId) -> bool {
        matches!(self.read(|state| state.active.contains(&spring)), Ok(true))
    }

    pub fn is_idle(&self) -> bool {
        self.read(|state| !state.needs_frames()).unwrap_or(true)
    }
}
