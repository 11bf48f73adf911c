//! Animated node graph
//!
//! Every animated value is a node in an acyclic dependency graph:
//! - `Leaf` holds a number written by the integrator
//! - `Static` holds a value that never animates
//! - `Array` / `Object` compose other nodes
//! - `Template` splices node values into a string pattern
//! - `Interpolation` maps parent values through a function
//!
//! A node is attached while it has at least one listener. Attaching
//! subscribes it to its parents, so unobserved composites cost nothing per
//! frame. Writes to a leaf invalidate cached interpolations downstream and
//! queue notifications for callbacks and render targets, which the scheduler
//! dispatches once the frame pass is complete.
//!
//! The graph must stay acyclic. Debug builds check this on attach.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use kinetic_core::{PropertyMap, Value};
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::error::{AnimationError, Result};
use crate::host::TargetId;
use crate::interpolation::{Interpolator, InterpolatorConfig, Output};
use crate::scheduler::{Effect, SchedulerHandle, SpringId};

new_key_type! {
    /// Handle to a node in the animated graph
    pub struct NodeId;
    /// Handle to a change callback registered on a node
    pub struct ListenerId;
    /// Handle to a node bound to a render target
    pub struct BindingId;
}

/// Function combining parent values into a derived value
pub(crate) type CombineFn = Rc<dyn Fn(&[Value]) -> Value>;

/// Callback receiving a node's value after it changed
pub type ChangeCallback = Rc<dyn Fn(&Value)>;

pub(crate) enum NodeKind {
    Leaf(f64),
    Static(Value),
    Array(SmallVec<[NodeId; 4]>),
    Object(IndexMap<String, NodeId>),
    Template {
        segments: Vec<String>,
        slots: SmallVec<[NodeId; 4]>,
    },
    Interpolation {
        parents: SmallVec<[NodeId; 2]>,
        func: CombineFn,
    },
}

/// Something observing a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Listener {
    /// A dependent node
    Node(NodeId),
    /// A user change callback
    Callback(ListenerId),
    /// A render target binding
    Target(BindingId),
    /// The spring value that owns this node
    Spring(SpringId),
}

struct Node {
    kind: NodeKind,
    /// Multiset: the same child may depend on a parent more than once
    listeners: SmallVec<[Listener; 4]>,
    /// Composite nodes naming this one as a parent, attached or not
    refs: usize,
    cache: RefCell<Option<Value>>,
    dirty: Cell<bool>,
    epoch: u64,
}

struct Binding {
    target: TargetId,
    node: NodeId,
}

/// Storage and propagation for animated nodes
#[derive(Default)]
pub(crate) struct NodeGraph {
    nodes: SlotMap<NodeId, Node>,
    callbacks: SlotMap<ListenerId, (NodeId, ChangeCallback)>,
    bindings: SlotMap<BindingId, Binding>,
    notifications: IndexSet<Listener>,
    epoch: u64,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn insert(&mut self, kind: NodeKind) -> NodeId {
        for parent in kind_parents(&kind) {
            self.retain(parent);
        }
        self.nodes.insert(Node {
            kind,
            listeners: SmallVec::new(),
            refs: 0,
            cache: RefCell::new(None),
            dirty: Cell::new(true),
            epoch: 0,
        })
    }

    fn retain(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.refs += 1;
        }
    }

    /// Drop one structural reference; returns whether none are left
    fn unretain(&mut self, id: NodeId) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.refs = node.refs.saturating_sub(1);
                node.refs == 0
            }
            None => false,
        }
    }

    pub fn leaf(&mut self, value: f64) -> NodeId {
        self.insert(NodeKind::Leaf(value))
    }

    /// Build a template node from a pattern with `{}` placeholders
    pub fn template(&mut self, pattern: &str, slots: &[NodeId]) -> Result<NodeId> {
        let segments: Vec<String> = pattern.split("{}").map(String::from).collect();
        if segments.len() != slots.len() + 1 {
            return Err(AnimationError::InvalidInterpolation(format!(
                "template '{}' has {} placeholders but {} nodes were given",
                pattern,
                segments.len() - 1,
                slots.len()
            )));
        }
        Ok(self.insert(NodeKind::Template {
            segments,
            slots: slots.iter().copied().collect(),
        }))
    }

    fn parents(&self, id: NodeId) -> SmallVec<[NodeId; 4]> {
        self.nodes
            .get(id)
            .map(|node| kind_parents(&node.kind))
            .unwrap_or_default()
    }

    pub fn listener_count(&self, id: NodeId) -> usize {
        self.nodes.get(id).map_or(0, |node| node.listeners.len())
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.listener_count(id) > 0
    }

    /// Register a listener, attaching the node on its first one
    pub fn add_listener(&mut self, id: NodeId, listener: Listener) {
        #[cfg(debug_assertions)]
        if let Listener::Node(child) = listener {
            assert!(
                !self.depends_on(id, child),
                "animated node cycle: {child:?} already feeds {id:?}"
            );
        }

        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        node.listeners.push(listener);
        if node.listeners.len() == 1 {
            self.attach(id);
        }
    }

    /// Remove one registration of `listener`, detaching on the last one
    pub fn remove_listener(&mut self, id: NodeId, listener: Listener) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        let Some(index) = node.listeners.iter().position(|l| *l == listener) else {
            return;
        };
        node.listeners.remove(index);
        if node.listeners.is_empty() {
            self.detach(id);
        }
    }

    fn attach(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get(id) {
            node.dirty.set(true);
        }
        for parent in self.parents(id) {
            self.add_listener(parent, Listener::Node(id));
        }
    }

    fn detach(&mut self, id: NodeId) {
        for parent in self.parents(id) {
            self.remove_listener(parent, Listener::Node(id));
        }
    }

    /// Whether `node` transitively reads from `ancestor`
    #[cfg(debug_assertions)]
    fn depends_on(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut visited = slotmap::SecondaryMap::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            if visited.insert(current, ()).is_none() {
                stack.extend(self.parents(current));
            }
        }
        false
    }

    /// Add a key to an object node, subscribing it if the object is attached
    pub fn object_insert(&mut self, object: NodeId, key: &str, child: NodeId) {
        let attached = self.is_attached(object);
        let previous = match self.nodes.get_mut(object) {
            Some(Node {
                kind: NodeKind::Object(map),
                ..
            }) => map.insert(key.to_string(), child),
            _ => return,
        };
        self.retain(child);
        if let Some(previous) = previous {
            self.unretain(previous);
        }
        if attached {
            if let Some(previous) = previous {
                self.remove_listener(previous, Listener::Node(object));
            }
            self.add_listener(child, Listener::Node(object));
        }
        self.mark_dirty(object);
    }

    /// Remove a key from an object node
    pub fn object_remove(&mut self, object: NodeId, key: &str) {
        let attached = self.is_attached(object);
        let removed = match self.nodes.get_mut(object) {
            Some(Node {
                kind: NodeKind::Object(map),
                ..
            }) => map.shift_remove(key),
            _ => return,
        };
        if let Some(child) = removed {
            self.unretain(child);
        }
        if let (true, Some(child)) = (attached, removed) {
            self.remove_listener(child, Listener::Node(object));
        }
        self.mark_dirty(object);
    }

    /// Write a leaf, propagating only when the value changed
    pub fn set_leaf(&mut self, id: NodeId, value: f64) {
        match self.nodes.get_mut(id) {
            Some(Node {
                kind: NodeKind::Leaf(current),
                ..
            }) if *current != value => *current = value,
            _ => return,
        }
        self.mark_dirty(id);
    }

    /// Replace the function of an interpolation node
    pub fn set_function(&mut self, id: NodeId, new_func: CombineFn) {
        if let Some(Node {
            kind: NodeKind::Interpolation { func, .. },
            ..
        }) = self.nodes.get_mut(id)
        {
            *func = new_func;
            self.mark_dirty(id);
        }
    }

    /// Invalidate `id` and everything downstream of it
    pub fn mark_dirty(&mut self, id: NodeId) {
        self.epoch += 1;
        let epoch = self.epoch;
        let Self {
            nodes,
            notifications,
            ..
        } = self;

        let mut stack: SmallVec<[NodeId; 8]> = SmallVec::new();
        stack.push(id);
        while let Some(current) = stack.pop() {
            let Some(node) = nodes.get_mut(current) else {
                continue;
            };
            if node.epoch == epoch {
                continue;
            }
            node.epoch = epoch;
            node.dirty.set(true);
            for listener in &node.listeners {
                match listener {
                    Listener::Node(child) => stack.push(*child),
                    Listener::Callback(_) | Listener::Target(_) => {
                        notifications.insert(*listener);
                    }
                    Listener::Spring(_) => {}
                }
            }
        }
    }

    pub fn try_value(&self, id: NodeId) -> Option<Value> {
        self.contains(id).then(|| self.value(id))
    }

    /// Resolve the plain value of a node
    pub fn value(&self, id: NodeId) -> Value {
        let Some(node) = self.nodes.get(id) else {
            return Value::default();
        };
        match &node.kind {
            NodeKind::Leaf(value) => Value::Number(*value),
            NodeKind::Static(value) => value.clone(),
            NodeKind::Array(items) => Value::List(items.iter().map(|i| self.value(*i)).collect()),
            NodeKind::Object(map) => Value::Map(
                map.iter()
                    .map(|(key, child)| (key.clone(), self.value(*child)))
                    .collect(),
            ),
            NodeKind::Template { segments, slots } => {
                let mut out = String::new();
                for (i, segment) in segments.iter().enumerate() {
                    out.push_str(segment);
                    if let Some(slot) = slots.get(i) {
                        out.push_str(&self.value(*slot).to_string());
                    }
                }
                Value::Text(out)
            }
            NodeKind::Interpolation { parents, func } => {
                // Only attached nodes receive invalidations
                let cacheable = !node.listeners.is_empty();
                if cacheable && !node.dirty.get() {
                    if let Some(cached) = node.cache.borrow().as_ref() {
                        return cached.clone();
                    }
                }
                let inputs: SmallVec<[Value; 2]> = parents.iter().map(|p| self.value(*p)).collect();
                let value = func(&inputs);
                if cacheable {
                    *node.cache.borrow_mut() = Some(value.clone());
                    node.dirty.set(false);
                }
                value
            }
        }
    }

    /// Resolve only the animated part of a node
    ///
    /// Object keys backed by static values are skipped; arrays and derived
    /// nodes are reported whole when any input animates.
    pub fn animated_value(&self, id: NodeId) -> Option<Value> {
        let node = self.nodes.get(id)?;
        match &node.kind {
            NodeKind::Leaf(value) => Some(Value::Number(*value)),
            NodeKind::Static(_) => None,
            NodeKind::Object(map) => {
                let animated: IndexMap<String, Value> = map
                    .iter()
                    .filter_map(|(key, child)| {
                        self.animated_value(*child).map(|value| (key.clone(), value))
                    })
                    .collect();
                (!animated.is_empty()).then_some(Value::Map(animated))
            }
            NodeKind::Array(_) | NodeKind::Template { .. } | NodeKind::Interpolation { .. } => self
                .parents(id)
                .iter()
                .any(|parent| self.animated_value(*parent).is_some())
                .then(|| self.value(id)),
        }
    }

    /// Drop a node nobody observes or composes, then any parent left orphaned
    ///
    /// Returns whether `id` was removed.
    pub fn release(&mut self, id: NodeId) -> bool {
        match self.nodes.get(id) {
            Some(node) if node.listeners.is_empty() && node.refs == 0 => {}
            _ => return false,
        }
        let parents = self.parents(id);
        self.nodes.remove(id);
        for parent in parents {
            if self.unretain(parent) && !self.is_attached(parent) {
                self.release(parent);
            }
        }
        true
    }

    // ========================================================================
    // Callbacks and render targets
    // ========================================================================

    pub fn add_callback(&mut self, node: NodeId, callback: ChangeCallback) -> ListenerId {
        let id = self.callbacks.insert((node, callback));
        self.add_listener(node, Listener::Callback(id));
        id
    }

    pub fn remove_callback(&mut self, id: ListenerId) -> bool {
        match self.callbacks.remove(id) {
            Some((node, _)) => {
                self.remove_listener(node, Listener::Callback(id));
                self.notifications.shift_remove(&Listener::Callback(id));
                true
            }
            None => false,
        }
    }

    pub fn bind(&mut self, target: TargetId, node: NodeId) -> BindingId {
        let id = self.bindings.insert(Binding { target, node });
        self.add_listener(node, Listener::Target(id));
        id
    }

    pub fn unbind(&mut self, id: BindingId) -> bool {
        match self.bindings.remove(id) {
            Some(binding) => {
                self.remove_listener(binding.node, Listener::Target(id));
                self.notifications.shift_remove(&Listener::Target(id));
                true
            }
            None => false,
        }
    }

    /// Turn queued notifications into deferred effects
    pub fn drain_notifications(
        &mut self,
        host: &Rc<dyn crate::host::Host>,
        effects: &mut Vec<Effect>,
    ) {
        for listener in std::mem::take(&mut self.notifications) {
            match listener {
                Listener::Callback(id) => {
                    if let Some((node, callback)) = self.callbacks.get(id) {
                        let callback = callback.clone();
                        let value = self.value(*node);
                        effects.push(Box::new(move || callback(&value)));
                    }
                }
                Listener::Target(id) => {
                    if let Some(binding) = self.bindings.get(id) {
                        let props: PropertyMap = self
                            .animated_value(binding.node)
                            .map(|value| value.flatten())
                            .unwrap_or_default();
                        if props.is_empty() {
                            continue;
                        }
                        let host = host.clone();
                        let target = binding.target;
                        effects.push(Box::new(move || host.apply_values(target, &props)));
                    }
                }
                Listener::Node(_) | Listener::Spring(_) => {}
            }
        }
    }
}

/// Apply an interpolator to a node value
///
/// Numbers map directly, numeric lists map componentwise, and anything else
/// passes through unchanged.
pub(crate) fn apply_interpolator(interpolator: &Interpolator, value: &Value) -> Value {
    match value {
        Value::Number(n) => interpolator.interpolate(*n),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|item| apply_interpolator(interpolator, item))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn kind_parents(kind: &NodeKind) -> SmallVec<[NodeId; 4]> {
    match kind {
        NodeKind::Array(items) => items.iter().copied().collect(),
        NodeKind::Object(map) => map.values().copied().collect(),
        NodeKind::Template { slots, .. } => slots.iter().copied().collect(),
        NodeKind::Interpolation { parents, .. } => parents.iter().copied().collect(),
        NodeKind::Leaf(_) | NodeKind::Static(_) => SmallVec::new(),
    }
}

// ============================================================================
// Public node handles
// ============================================================================

/// Handle to a node in the animated graph
///
/// Cheap to clone. Nodes live as long as the scheduler unless released.
#[derive(Clone)]
pub struct AnimatedNode {
    id: NodeId,
    scheduler: SchedulerHandle,
}

impl AnimatedNode {
    pub(crate) fn new(id: NodeId, scheduler: SchedulerHandle) -> Self {
        Self { id, scheduler }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Current value, or `None` once the node or its scheduler is gone
    pub fn get(&self) -> Option<Value> {
        self.scheduler
            .read(|state| state.graph.try_value(self.id))
            .ok()
            .flatten()
    }

    /// The animated subset of the current value
    pub fn animated_value(&self) -> Option<Value> {
        self.scheduler
            .read(|state| state.graph.animated_value(self.id))
            .ok()
            .flatten()
    }

    pub fn is_attached(&self) -> bool {
        self.listener_count() > 0
    }

    pub fn listener_count(&self) -> usize {
        self.scheduler
            .read(|state| state.graph.listener_count(self.id))
            .unwrap_or(0)
    }

    /// Derive a node mapping this one through `interpolator`
    ///
    /// Chained calls compose left to right: each link reads the previous one.
    pub fn to(&self, interpolator: Interpolator) -> Result<AnimatedNode> {
        let func: CombineFn = Rc::new(move |inputs: &[Value]| {
            inputs
                .first()
                .map(|value| apply_interpolator(&interpolator, value))
                .unwrap_or_default()
        });
        self.derive(func)
    }

    /// Shorthand for `to(Interpolator::range(..))` or string outputs
    pub fn interpolate(&self, range: Vec<f64>, output: impl Into<Output>) -> Result<AnimatedNode> {
        self.interpolate_with(InterpolatorConfig::new(range, output))
    }

    /// Interpolate with a full config; string outputs go through the host
    pub fn interpolate_with(&self, config: InterpolatorConfig) -> Result<AnimatedNode> {
        let interpolator = match config.output {
            Output::Strings(_) => self
                .scheduler
                .upgrade()?
                .host()
                .create_string_interpolator(config)?,
            Output::Numbers(_) => Interpolator::from_config(config)?,
        };
        self.to(interpolator)
    }

    /// Derive a node from an arbitrary function of this node's value
    pub fn map(&self, f: impl Fn(&Value) -> Value + 'static) -> Result<AnimatedNode> {
        self.derive(Rc::new(move |inputs: &[Value]| {
            inputs.first().map(&f).unwrap_or_default()
        }))
    }

    fn derive(&self, func: CombineFn) -> Result<AnimatedNode> {
        let parent = self.id;
        let id = self.scheduler.mutate(|state, _| {
            if !state.graph.contains(parent) {
                return Err(AnimationError::UnsupportedValue(
                    "node has been released".to_string(),
                ));
            }
            Ok(state.graph.insert(NodeKind::Interpolation {
                parents: smallvec::smallvec![parent],
                func,
            }))
        })??;
        Ok(AnimatedNode::new(id, self.scheduler.clone()))
    }

    /// Call `callback` after every frame in which the value changed
    pub fn on_change(&self, callback: impl Fn(&Value) + 'static) -> Result<ListenerId> {
        let node = self.id;
        self.scheduler
            .mutate(|state, _| state.graph.add_callback(node, Rc::new(callback)))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.scheduler
            .mutate(|state, _| state.graph.remove_callback(id))
            .unwrap_or(false)
    }

    /// Free this node if nothing observes it
    pub fn release(self) -> bool {
        let id = self.id;
        self.scheduler
            .mutate(|state, _| state.graph.release(id))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for AnimatedNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimatedNode").field("id", &self.id).finish()
    }
}

impl SchedulerHandle {
    fn node(&self, kind: NodeKind) -> Result<AnimatedNode> {
        let id = self.mutate(|state, _| state.graph.insert(kind))?;
        Ok(AnimatedNode::new(id, self.clone()))
    }

    /// A node holding a value that never animates
    pub fn constant(&self, value: impl Into<Value>) -> Result<AnimatedNode> {
        self.node(NodeKind::Static(value.into()))
    }

    /// A plain numeric leaf, writable through [`SchedulerHandle::set_leaf`]
    pub fn leaf(&self, value: f64) -> Result<AnimatedNode> {
        self.node(NodeKind::Leaf(value))
    }

    pub fn set_leaf(&self, node: &AnimatedNode, value: f64) -> Result<()> {
        self.mutate(|state, _| state.graph.set_leaf(node.id, value))
    }

    pub fn array(&self, items: &[AnimatedNode]) -> Result<AnimatedNode> {
        self.node(NodeKind::Array(items.iter().map(|n| n.id).collect()))
    }

    pub fn object<K: Into<String>>(
        &self,
        entries: impl IntoIterator<Item = (K, AnimatedNode)>,
    ) -> Result<AnimatedNode> {
        self.node(NodeKind::Object(
            entries
                .into_iter()
                .map(|(key, node)| (key.into(), node.id))
                .collect(),
        ))
    }

    /// Splice node values into `pattern` at each `{}`
    pub fn template(&self, pattern: &str, slots: &[AnimatedNode]) -> Result<AnimatedNode> {
        let ids: SmallVec<[NodeId; 4]> = slots.iter().map(|n| n.id).collect();
        let id = self.mutate(|state, _| state.graph.template(pattern, &ids))??;
        Ok(AnimatedNode::new(id, self.clone()))
    }

    /// Combine several nodes into one derived value
    pub fn combine(
        &self,
        parents: &[AnimatedNode],
        f: impl Fn(&[Value]) -> Value + 'static,
    ) -> Result<AnimatedNode> {
        self.node(NodeKind::Interpolation {
            parents: parents.iter().map(|n| n.id).collect(),
            func: Rc::new(f),
        })
    }

    /// Apply `node` to a render target now and after every change
    pub fn bind_target(&self, target: TargetId, node: &AnimatedNode) -> Result<BindingId> {
        let shared = self.upgrade()?;
        let (binding, initial) = shared.mutate(|state, _| {
            let binding = state.graph.bind(target, node.id);
            (binding, state.graph.value(node.id).flatten())
        });
        shared.host().apply_values(target, &initial);
        Ok(binding)
    }

    pub fn unbind_target(&self, binding: BindingId) -> bool {
        self.mutate(|state, _| state.graph.unbind(binding))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(f: impl Fn(&[Value]) -> Value + 'static) -> CombineFn {
        Rc::new(f)
    }

    #[test]
    fn test_attach_follows_listener_count() {
        let mut graph = NodeGraph::new();
        let leaf = graph.leaf(1.0);
        let double = graph.insert(NodeKind::Interpolation {
            parents: smallvec::smallvec![leaf],
            func: func(|v| Value::Number(v[0].as_number().unwrap_or(0.0) * 2.0)),
        });

        // Constructing a derived node does not subscribe it
        assert_eq!(graph.listener_count(leaf), 0);

        let cb = graph.add_callback(double, Rc::new(|_| {}));
        assert!(graph.is_attached(double));
        assert_eq!(graph.listener_count(leaf), 1);

        graph.remove_callback(cb);
        assert!(!graph.is_attached(double));
        assert_eq!(graph.listener_count(leaf), 0);
    }

    #[test]
    fn test_listener_multiset() {
        let mut graph = NodeGraph::new();
        let leaf = graph.leaf(0.0);
        let pair = graph.insert(NodeKind::Array(smallvec::smallvec![leaf, leaf]));
        graph.add_callback(pair, Rc::new(|_| {}));
        assert_eq!(graph.listener_count(leaf), 2);
        assert_eq!(graph.value(pair), Value::from([0.0, 0.0]));
    }

    #[test]
    fn test_interpolation_cache_is_shared() {
        let mut graph = NodeGraph::new();
        let leaf = graph.leaf(1.0);
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let link = graph.insert(NodeKind::Interpolation {
            parents: smallvec::smallvec![leaf],
            func: func(move |v| {
                counter.set(counter.get() + 1);
                v[0].clone()
            }),
        });
        let a = graph.insert(NodeKind::Array(smallvec::smallvec![link]));
        let b = graph.insert(NodeKind::Array(smallvec::smallvec![link]));
        graph.add_callback(a, Rc::new(|_| {}));
        graph.add_callback(b, Rc::new(|_| {}));

        graph.set_leaf(leaf, 2.0);
        assert_eq!(graph.value(a), Value::from([2.0]));
        assert_eq!(graph.value(b), Value::from([2.0]));
        assert_eq!(calls.get(), 1);

        graph.set_leaf(leaf, 3.0);
        assert_eq!(graph.value(b), Value::from([3.0]));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_notifications_deduplicate() {
        let mut graph = NodeGraph::new();
        let x = graph.leaf(0.0);
        let y = graph.leaf(0.0);
        let point = graph.insert(NodeKind::Array(smallvec::smallvec![x, y]));
        graph.add_callback(point, Rc::new(|_| {}));

        graph.set_leaf(x, 1.0);
        graph.set_leaf(y, 1.0);
        // Unchanged writes do not notify
        graph.set_leaf(y, 1.0);
        assert_eq!(graph.notifications.len(), 1);
    }

    #[test]
    fn test_animated_value_skips_static_keys() {
        let mut graph = NodeGraph::new();
        let opacity = graph.leaf(0.5);
        let color = graph.insert(NodeKind::Static(Value::from("red")));
        let style = graph.insert(NodeKind::Object(
            [("opacity".to_string(), opacity), ("color".to_string(), color)]
                .into_iter()
                .collect(),
        ));

        let full = graph.value(style);
        assert_eq!(full.as_map().map(|m| m.len()), Some(2));

        let animated = graph.animated_value(style).unwrap();
        let keys: Vec<&String> = animated.as_map().unwrap().keys().collect();
        assert_eq!(keys, vec!["opacity"]);
    }

    #[test]
    fn test_template() {
        let mut graph = NodeGraph::new();
        let x = graph.leaf(10.0);
        let y = graph.leaf(-2.5);
        let transform = graph.template("translate({}px, {}px)", &[x, y]).unwrap();
        assert_eq!(graph.value(transform), Value::from("translate(10px, -2.5px)"));
        assert!(graph.template("{}", &[]).is_err());
    }

    #[test]
    fn test_object_insert_subscribes_when_attached() {
        let mut graph = NodeGraph::new();
        let object = graph.insert(NodeKind::Object(IndexMap::new()));
        graph.add_callback(object, Rc::new(|_| {}));
        let leaf = graph.leaf(1.0);
        graph.object_insert(object, "x", leaf);
        assert!(graph.is_attached(leaf));
        graph.object_remove(object, "x");
        assert!(!graph.is_attached(leaf));
    }

    #[test]
    fn test_release_collects_unobserved_parents() {
        let mut graph = NodeGraph::new();
        let leaf = graph.leaf(1.0);
        let derived = graph.insert(NodeKind::Array(smallvec::smallvec![leaf]));
        assert!(graph.release(derived));
        assert!(!graph.contains(leaf));
        assert!(graph.nodes.is_empty());
    }

    #[test]
    fn test_release_keeps_parent_shared_by_another_node() {
        let mut graph = NodeGraph::new();
        let leaf = graph.leaf(5.0);
        let same = graph.insert(NodeKind::Interpolation {
            parents: smallvec::smallvec![leaf],
            func: func(|v| v[0].clone()),
        });
        let double = graph.insert(NodeKind::Interpolation {
            parents: smallvec::smallvec![leaf],
            func: func(|v| Value::Number(v[0].as_number().unwrap_or(0.0) * 2.0)),
        });

        // A parent still composed by another node cannot be released directly
        assert!(!graph.release(leaf));

        assert!(graph.release(same));
        assert!(graph.contains(leaf));
        assert_eq!(graph.try_value(double), Some(Value::Number(10.0)));

        assert!(graph.release(double));
        assert!(!graph.contains(leaf));
    }

    #[test]
    fn test_object_keys_hold_references() {
        let mut graph = NodeGraph::new();
        let object = graph.insert(NodeKind::Object(IndexMap::new()));
        let leaf = graph.leaf(1.0);
        graph.object_insert(object, "x", leaf);
        assert!(!graph.release(leaf));

        graph.object_remove(object, "x");
        assert!(graph.release(leaf));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "cycle")]
    fn test_cycle_detected_in_debug() {
        let mut graph = NodeGraph::new();
        let a = graph.insert(NodeKind::Object(IndexMap::new()));
        let b = graph.insert(NodeKind::Array(smallvec::smallvec![a]));
        graph.add_callback(b, Rc::new(|_| {}));
        graph.object_insert(a, "loop", b);
    }
}
