//! Host strategy
//!
//! The engine never talks to a renderer or a display clock directly. A
//! [`Host`] is injected into the [`AnimationScheduler`](crate::AnimationScheduler)
//! and supplies the frame timing primitive, applies computed values to render
//! targets, and may customize string interpolation.
//!
//! [`ManualHost`] is a headless host with a hand-driven clock, used by
//! servers and tests.

use std::cell::{Cell, RefCell};

use kinetic_core::PropertyMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::interpolation::{Interpolator, InterpolatorConfig};

/// Callback invoked with the frame timestamp in milliseconds
pub type FrameCallback = Box<dyn FnOnce(f64)>;

/// Identifier of a pending frame request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameRequestId(pub u64);

/// Opaque handle to something the host renders (a DOM node, a scene-graph
/// object, a native view)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub u64);

/// Renderer and clock integration
pub trait Host {
    /// Schedule `callback` for the next display frame
    ///
    /// Returns `None` when the host has no timing primitive; the scheduler then
    /// only advances through explicit [`tick`](crate::AnimationScheduler::tick) calls.
    fn request_frame(&self, callback: FrameCallback) -> Option<FrameRequestId>;

    fn cancel_frame(&self, id: FrameRequestId);

    /// Current time in milliseconds
    fn now(&self) -> f64;

    /// Write a flattened set of values onto a render target
    fn apply_values(&self, target: TargetId, values: &PropertyMap);

    /// Target used when a controller is bound without an explicit one
    fn default_element(&self) -> TargetId {
        TargetId::default()
    }

    /// Build the interpolator for string outputs
    ///
    /// Hosts with their own notion of colors or units can override this.
    fn create_string_interpolator(&self, config: InterpolatorConfig) -> Result<Interpolator> {
        Interpolator::from_config(config)
    }
}

/// Headless host driven by [`advance`](ManualHost::advance)
pub struct ManualHost {
    now: Cell<f64>,
    frames_enabled: bool,
    pending: RefCell<Option<(FrameRequestId, FrameCallback)>>,
    next_id: Cell<u64>,
    requests: Cell<usize>,
    cancels: Cell<usize>,
    applied: RefCell<Vec<(TargetId, PropertyMap)>>,
}

impl ManualHost {
    pub fn new() -> Self {
        Self {
            now: Cell::new(0.0),
            frames_enabled: true,
            pending: RefCell::new(None),
            next_id: Cell::new(1),
            requests: Cell::new(0),
            cancels: Cell::new(0),
            applied: RefCell::new(Vec::new()),
        }
    }

    /// A host with no timing primitive
    pub fn without_frames() -> Self {
        Self {
            frames_enabled: false,
            ..Self::new()
        }
    }

    /// Move the clock forward and fire the pending frame, if any
    ///
    /// Returns whether a frame ran.
    pub fn advance(&self, ms: f64) -> bool {
        self.now.set(self.now.get() + ms);
        let pending = self.pending.borrow_mut().take();
        match pending {
            Some((_, callback)) => {
                callback(self.now.get());
                true
            }
            None => false,
        }
    }

    /// Run up to `count` frames of `ms` each, stopping early when idle
    pub fn run_frames(&self, count: usize, ms: f64) -> usize {
        let mut ran = 0;
        while ran < count && self.advance(ms) {
            ran += 1;
        }
        ran
    }

    /// Run frames until nothing is requested, bounded by `max_frames`
    pub fn run_until_idle(&self, ms: f64, max_frames: usize) -> usize {
        self.run_frames(max_frames, ms)
    }

    pub fn has_pending_frame(&self) -> bool {
        self.pending.borrow().is_some()
    }

    /// Total frame requests received
    pub fn frame_requests(&self) -> usize {
        self.requests.get()
    }

    pub fn frame_cancels(&self) -> usize {
        self.cancels.get()
    }

    /// Drain the values applied to targets since the last call
    pub fn take_applied(&self) -> Vec<(TargetId, PropertyMap)> {
        std::mem::take(&mut *self.applied.borrow_mut())
    }
}

impl Default for ManualHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for ManualHost {
    fn request_frame(&self, callback: FrameCallback) -> Option<FrameRequestId> {
        if !self.frames_enabled {
            return None;
        }
        let id = FrameRequestId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.requests.set(self.requests.get() + 1);
        *self.pending.borrow_mut() = Some((id, callback));
        Some(id)
    }

    fn cancel_frame(&self, id: FrameRequestId) {
        let mut pending = self.pending.borrow_mut();
        if matches!(&*pending, Some((pending_id, _)) if *pending_id == id) {
            *pending = None;
            self.cancels.set(self.cancels.get() + 1);
        }
    }

    fn now(&self) -> f64 {
        self.now.get()
    }

    fn apply_values(&self, target: TargetId, values: &PropertyMap) {
        self.applied.borrow_mut().push((target, values.clone()));
    }
}
