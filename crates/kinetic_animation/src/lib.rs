//! Kinetic Animation
//!
//! Spring-driven values, a dependency graph of derived nodes, and the frame
//! loop that advances them.
//!
//! # Features
//!
//! - **Spring Physics**: damped springs sub-stepped at a fixed increment, plus
//!   duration/easing and velocity-decay models
//! - **Animated Nodes**: derived values (interpolations, templates, objects)
//!   recomputed only while observed
//! - **Interpolation**: numeric ranges with extrapolation policies, strings
//!   with embedded numbers and CSS colors
//! - **Controllers**: declarative per-key updates with delay, loop, reverse,
//!   and async scripts
//! - **Chains**: sequence controllers by completion or by fixed offsets
//! - **Host Strategy**: frame timing and rendering injected through [`Host`]

pub mod chain;
pub mod controller;
pub mod easing;
pub mod error;
pub mod host;
pub mod interpolation;
pub mod node;
pub mod scheduler;
pub mod script;
pub mod spring;
pub mod spring_value;

pub use chain::{Chain, ChainHandle};
pub use controller::{
    AnimationResult, Completion, Controller, ControllerConfig, ControllerHandle,
    KeyChangeCallback, RestCallback, StartCallback, UpdateProps,
};
pub use easing::Easing;
pub use error::{AnimationError, Result};
pub use host::{FrameCallback, FrameRequestId, Host, ManualHost, TargetId};
pub use interpolation::{
    normalize_colors, Extrapolate, Interpolator, InterpolatorConfig, Output, RangeInterpolator,
    StringInterpolator,
};
pub use kinetic_core::{Color, PropertyMap, Value, ValueKind};
pub use node::{AnimatedNode, BindingId, ChangeCallback, ListenerId, NodeId};
pub use scheduler::{
    get_scheduler, is_scheduler_initialized, set_global_scheduler, try_get_scheduler,
    AnimationScheduler, ControllerId, SchedulerConfig, SchedulerHandle, SpringId,
};
pub use script::{CancelToken, ScriptContext};
pub use spring::{Motion, MotionModel, SpringConfig, StepOutcome};
pub use spring_value::LoopPolicy;
