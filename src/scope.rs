//! Scope tree and the digest engine.
//!
//! A [`Scope`] is a node in a tree of mutable evaluation contexts. Each node
//! owns its watchers, event listeners and children; the tree root owns the
//! shared digest state (the async, apply and post-digest queues, the phase
//! guard and the last-dirty-watcher marker). Dirty checking walks the
//! subtree repeatedly until every watcher reports clean, firing listeners on
//! each observed change.
//!
//! Scope storage is an [`ObjectRef`] whose prototype link points at the
//! parent's storage, so non-isolated children read through to ancestor state
//! while writes always land in their own map. Isolated children simply get a
//! storage object with no prototype.
//!
//! ```
//! use fennel::scope::Scope;
//! use fennel::value::Value;
//!
//! let scope = Scope::new();
//! scope.set("counter", Value::Integer(0));
//! scope
//!     .watch(
//!         |s| Ok(s.get("name")),
//!         |_new, _old, s| {
//!             let n = s.get("counter").as_number().unwrap_or(0.0);
//!             s.set("counter", Value::Integer(n as i64 + 1));
//!             Ok(())
//!         },
//!     );
//! scope.set("name", Value::String("bert".into()));
//! scope.digest().unwrap();
//! assert_eq!(scope.get("counter"), Value::Integer(1));
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use thiserror::Error;
use tracing::{debug, error, trace};

use crate::compiler::{CompiledExpression, EvalError};
use crate::scheduler::{Scheduler, TaskId};
use crate::value::{ArrayRef, ObjectRef, Value};

/// Maximum number of dirty passes before a digest is declared
/// non-convergent.
pub const TTL: usize = 10;

/// Errors raised by the digest machinery itself. Watcher and listener
/// failures are logged and isolated, never surfaced here.
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("digest did not converge after {TTL} iterations")]
    IterationsExceeded,

    #[error("{0} already in progress")]
    PhaseInProgress(&'static str),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Digesting,
    Applying,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Digesting => "$digest",
            Phase::Applying => "$apply",
        }
    }
}

pub type WatchFn = Box<dyn Fn(&Scope) -> Result<Value, EvalError>>;
type ListenerFn = Box<dyn FnMut(&Value, &Value, &Scope) -> Result<(), EvalError>>;
type EventListener = Rc<RefCell<dyn FnMut(&Event, &[Value]) -> Result<(), EvalError>>>;
type QueuedTask = Box<dyn FnOnce()>;
type AsyncTask = (Scope, Box<dyn FnOnce(&Scope) -> Result<Value, EvalError>>);

enum WatchValue {
    /// Never evaluated. Distinct from `Undefined` so a first run whose
    /// watched value is itself undefined still fires the listener.
    Uninitialized,
    Known(Value),
}

struct Watcher {
    id: u64,
    watch: WatchFn,
    listener: RefCell<ListenerFn>,
    /// Deep structural comparison instead of reference equality.
    value_eq: bool,
    last: RefCell<WatchValue>,
    removed: Cell<bool>,
}

/// Digest state owned by the tree root and shared by every scope in the
/// tree.
struct RootState {
    phase: Cell<Phase>,
    last_dirty_watch: Cell<Option<u64>>,
    next_watcher_id: Cell<u64>,
    async_queue: RefCell<VecDeque<AsyncTask>>,
    apply_queue: RefCell<VecDeque<QueuedTask>>,
    apply_async_id: Cell<Option<TaskId>>,
    post_digest_queue: RefCell<VecDeque<QueuedTask>>,
    scheduler: Scheduler,
    root_scope: RefCell<Weak<ScopeInner>>,
}

impl RootState {
    fn begin_phase(&self, phase: Phase) -> Result<(), ScopeError> {
        let current = self.phase.get();
        if current != Phase::Idle {
            return Err(ScopeError::PhaseInProgress(current.label()));
        }
        self.phase.set(phase);
        Ok(())
    }

    fn clear_phase(&self) {
        self.phase.set(Phase::Idle);
    }
}

struct ScopeInner {
    data: ObjectRef,
    root: Rc<RootState>,
    parent: RefCell<Weak<ScopeInner>>,
    children: RefCell<Vec<Scope>>,
    watchers: RefCell<Vec<Rc<Watcher>>>,
    listeners: RefCell<HashMap<String, Vec<Option<EventListener>>>>,
    destroyed: Cell<bool>,
}

/// Pre-order traversal outcome, threaded through the subtree walk so the
/// last-dirty short-circuit can abort the remaining visit.
#[derive(PartialEq, Eq, Clone, Copy)]
enum WalkStatus {
    Continue,
    ShortCircuit,
}

/// Handle to one scope node. Clones share the node.
#[derive(Clone)]
pub struct Scope {
    inner: Rc<ScopeInner>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("data", &self.inner.data)
            .field("children", &self.inner.children.borrow().len())
            .finish()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// Creates a new root scope with its own digest state and scheduler.
    pub fn new() -> Scope {
        let root = Rc::new(RootState {
            phase: Cell::new(Phase::Idle),
            last_dirty_watch: Cell::new(None),
            next_watcher_id: Cell::new(0),
            async_queue: RefCell::new(VecDeque::new()),
            apply_queue: RefCell::new(VecDeque::new()),
            apply_async_id: Cell::new(None),
            post_digest_queue: RefCell::new(VecDeque::new()),
            scheduler: Scheduler::new(),
            root_scope: RefCell::new(Weak::new()),
        });
        let inner = Rc::new(ScopeInner {
            data: ObjectRef::new(),
            root: root.clone(),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            watchers: RefCell::new(Vec::new()),
            listeners: RefCell::new(HashMap::new()),
            destroyed: Cell::new(false),
        });
        *root.root_scope.borrow_mut() = Rc::downgrade(&inner);
        Scope { inner }
    }

    /// Creates a child scope. Non-isolated children read through to this
    /// scope's state; isolated children get independent storage but still
    /// share the root digest state and queues.
    pub fn new_child(&self, isolated: bool) -> Scope {
        self.new_child_in(isolated, self)
    }

    /// Like [`new_child`](Self::new_child), but hangs the child under
    /// `hierarchy_parent` for digest and event traversal while state is
    /// still inherited from `self`. The two parents are tracked
    /// independently.
    pub fn new_child_in(&self, isolated: bool, hierarchy_parent: &Scope) -> Scope {
        let data = if isolated {
            ObjectRef::new()
        } else {
            ObjectRef::with_proto(self.inner.data.clone())
        };
        let child = Scope {
            inner: Rc::new(ScopeInner {
                data,
                root: self.inner.root.clone(),
                parent: RefCell::new(Rc::downgrade(&hierarchy_parent.inner)),
                children: RefCell::new(Vec::new()),
                watchers: RefCell::new(Vec::new()),
                listeners: RefCell::new(HashMap::new()),
                destroyed: Cell::new(false),
            }),
        };
        hierarchy_parent
            .inner
            .children
            .borrow_mut()
            .push(child.clone());
        child
    }

    /// Fires a `$destroy` event through this subtree, unlinks the scope
    /// from its structural parent, and drops its watchers and listeners so
    /// no further digest or event delivery touches it.
    pub fn destroy(&self) {
        if self.inner.destroyed.get() {
            return;
        }
        self.broadcast("$destroy", &[]);
        self.inner.destroyed.set(true);
        if let Some(parent) = self.parent() {
            parent
                .inner
                .children
                .borrow_mut()
                .retain(|child| !Rc::ptr_eq(&child.inner, &self.inner));
        }
        self.inner.watchers.borrow_mut().clear();
        self.inner.listeners.borrow_mut().clear();
    }

    pub fn parent(&self) -> Option<Scope> {
        self.inner.parent.borrow().upgrade().map(|inner| Scope { inner })
    }

    /// The root of the tree this scope belongs to.
    pub fn root(&self) -> Scope {
        self.inner
            .root
            .root_scope
            .borrow()
            .upgrade()
            .map(|inner| Scope { inner })
            .unwrap_or_else(|| self.clone())
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// The storage object backing this scope, usable directly as an
    /// expression evaluation context.
    pub fn data(&self) -> ObjectRef {
        self.inner.data.clone()
    }

    /// Reads a key, walking up through inherited ancestor storage.
    pub fn get(&self, name: &str) -> Value {
        self.inner.data.get(name)
    }

    /// Writes a key into this scope's own storage, shadowing any inherited
    /// value. Writes never promote into the parent.
    pub fn set(&self, name: &str, value: Value) {
        self.inner.data.set(name, value);
    }

    /// The shared deferred-task queue for this tree; the embedding host
    /// drains it.
    pub fn scheduler(&self) -> Scheduler {
        self.inner.root.scheduler.clone()
    }

    // ---- watchers -------------------------------------------------------

    /// Registers a watcher with reference (NaN-aware) comparison. Returns
    /// a deregistration function.
    pub fn watch(
        &self,
        watch_fn: impl Fn(&Scope) -> Result<Value, EvalError> + 'static,
        listener: impl FnMut(&Value, &Value, &Scope) -> Result<(), EvalError> + 'static,
    ) -> Box<dyn Fn()> {
        self.add_watcher(Box::new(watch_fn), Box::new(listener), false)
    }

    /// Registers a watcher with deep structural comparison; the stored last
    /// value is a deep copy, so in-place mutation of a watched collection is
    /// observed.
    pub fn watch_value(
        &self,
        watch_fn: impl Fn(&Scope) -> Result<Value, EvalError> + 'static,
        listener: impl FnMut(&Value, &Value, &Scope) -> Result<(), EvalError> + 'static,
    ) -> Box<dyn Fn()> {
        self.add_watcher(Box::new(watch_fn), Box::new(listener), true)
    }

    fn add_watcher(
        &self,
        watch: WatchFn,
        listener: ListenerFn,
        value_eq: bool,
    ) -> Box<dyn Fn()> {
        let root = &self.inner.root;
        let id = root.next_watcher_id.get();
        root.next_watcher_id.set(id + 1);

        let watcher = Rc::new(Watcher {
            id,
            watch,
            listener: RefCell::new(listener),
            value_eq,
            last: RefCell::new(WatchValue::Uninitialized),
            removed: Cell::new(false),
        });
        self.inner.watchers.borrow_mut().push(watcher.clone());
        // A new watcher must not be skipped by a stale short-circuit marker
        root.last_dirty_watch.set(None);

        let inner = Rc::downgrade(&self.inner);
        Box::new(move || {
            watcher.removed.set(true);
            if let Some(inner) = inner.upgrade() {
                inner.watchers.borrow_mut().retain(|w| w.id != watcher.id);
                inner.root.last_dirty_watch.set(None);
            }
        })
    }

    /// Watches several expressions as a unit: however many of them change
    /// in one digest, the listener runs once, with aggregated new and old
    /// value arrays. On the first run both arrays are the new values. An
    /// empty group still calls the listener a single time, asynchronously,
    /// unless deregistered first.
    pub fn watch_group(
        &self,
        watch_fns: Vec<WatchFn>,
        listener: impl FnMut(&[Value], &[Value], &Scope) -> Result<(), EvalError> + 'static,
    ) -> Box<dyn Fn()> {
        let listener: Rc<RefCell<dyn FnMut(&[Value], &[Value], &Scope) -> Result<(), EvalError>>> =
            Rc::new(RefCell::new(listener));

        if watch_fns.is_empty() {
            let should_call = Rc::new(Cell::new(true));
            let flag = should_call.clone();
            let listener = listener.clone();
            self.eval_async(move |scope| {
                if flag.get() {
                    (listener.borrow_mut())(&[], &[], scope)?;
                }
                Ok(Value::Undefined)
            });
            return Box::new(move || should_call.set(false));
        }

        struct GroupState {
            new_values: Vec<Value>,
            old_values: Vec<Value>,
            scheduled: bool,
            first_run: bool,
        }
        let state = Rc::new(RefCell::new(GroupState {
            new_values: vec![Value::Undefined; watch_fns.len()],
            old_values: vec![Value::Undefined; watch_fns.len()],
            scheduled: false,
            first_run: true,
        }));

        let mut deregs = Vec::with_capacity(watch_fns.len());
        for (i, watch_fn) in watch_fns.into_iter().enumerate() {
            let state = state.clone();
            let listener = listener.clone();
            deregs.push(self.watch(
                move |scope| watch_fn(scope),
                move |new, old, scope| {
                    {
                        let mut s = state.borrow_mut();
                        s.new_values[i] = new.clone();
                        s.old_values[i] = old.clone();
                        if s.scheduled {
                            return Ok(());
                        }
                        s.scheduled = true;
                    }
                    let state = state.clone();
                    let listener = listener.clone();
                    scope.eval_async(move |scope| {
                        let (news, olds, first) = {
                            let mut s = state.borrow_mut();
                            s.scheduled = false;
                            let first = s.first_run;
                            s.first_run = false;
                            (s.new_values.clone(), s.old_values.clone(), first)
                        };
                        if first {
                            (listener.borrow_mut())(&news, &news, scope)?;
                        } else {
                            (listener.borrow_mut())(&news, &olds, scope)?;
                        }
                        Ok(Value::Undefined)
                    });
                    Ok(())
                },
            ));
        }

        Box::new(move || {
            for dereg in &deregs {
                dereg();
            }
        })
    }

    /// Watches an array or object for shallow changes: length, membership,
    /// and per-slot reference changes, without the cost of full deep
    /// comparison. The listener receives the current value and the previous
    /// shallow snapshot; on the first run both are the current value.
    pub fn watch_collection(
        &self,
        watch_fn: impl Fn(&Scope) -> Result<Value, EvalError> + 'static,
        listener: impl FnMut(&Value, &Value, &Scope) -> Result<(), EvalError> + 'static,
    ) -> Box<dyn Fn()> {
        enum Snapshot {
            None,
            Primitive(Value),
            Array(Vec<Value>),
            Object(HashMap<String, Value>),
        }
        struct CollectionState {
            snapshot: Snapshot,
            change_count: i64,
            current: Value,
            previous: Value,
            first_run: bool,
        }
        let state = Rc::new(RefCell::new(CollectionState {
            snapshot: Snapshot::None,
            change_count: 0,
            current: Value::Undefined,
            previous: Value::Undefined,
            first_run: true,
        }));

        let watch_state = state.clone();
        let internal_watch = move |scope: &Scope| -> Result<Value, EvalError> {
            let new = watch_fn(scope)?;
            let mut s = watch_state.borrow_mut();

            match &new {
                Value::Array(arr) => {
                    let items = arr.to_vec();
                    if !matches!(s.snapshot, Snapshot::Array(_)) {
                        s.change_count += 1;
                        s.snapshot = Snapshot::Array(Vec::new());
                    }
                    let mut changes = 0;
                    if let Snapshot::Array(old) = &mut s.snapshot {
                        if old.len() != items.len() {
                            changes += 1;
                            old.resize(items.len(), Value::Undefined);
                        }
                        for (i, item) in items.iter().enumerate() {
                            if !item.watch_eq(&old[i]) {
                                changes += 1;
                                old[i] = item.clone();
                            }
                        }
                    }
                    s.change_count += changes;
                }
                Value::Object(obj) => {
                    if !matches!(s.snapshot, Snapshot::Object(_)) {
                        s.change_count += 1;
                        s.snapshot = Snapshot::Object(HashMap::new());
                    }
                    let entries = obj.entries();
                    let mut changes = 0;
                    if let Snapshot::Object(old) = &mut s.snapshot {
                        for (key, value) in &entries {
                            match old.get(key) {
                                Some(previous) => {
                                    if !value.watch_eq(previous) {
                                        changes += 1;
                                        old.insert(key.clone(), value.clone());
                                    }
                                }
                                None => {
                                    changes += 1;
                                    old.insert(key.clone(), value.clone());
                                }
                            }
                        }
                        if old.len() > entries.len() {
                            changes += 1;
                            old.retain(|key, _| entries.iter().any(|(k, _)| k == key));
                        }
                    }
                    s.change_count += changes;
                }
                other => {
                    let clean = match &s.snapshot {
                        Snapshot::Primitive(previous) => other.watch_eq(previous),
                        _ => false,
                    };
                    if !clean {
                        s.change_count += 1;
                    }
                    s.snapshot = Snapshot::Primitive(other.clone());
                }
            }

            s.current = new;
            Ok(Value::Integer(s.change_count))
        };

        let listener = RefCell::new(listener);
        let listen_state = state;
        let internal_listener = move |_new: &Value, _old: &Value, scope: &Scope| {
            let (current, previous, first) = {
                let s = listen_state.borrow();
                (s.current.clone(), s.previous.clone(), s.first_run)
            };
            let result = if first {
                (listener.borrow_mut())(&current, &current, scope)
            } else {
                (listener.borrow_mut())(&current, &previous, scope)
            };
            let mut s = listen_state.borrow_mut();
            s.first_run = false;
            s.previous = shallow_copy(&current);
            result
        };

        self.watch(internal_watch, internal_listener)
    }

    // ---- digest ---------------------------------------------------------

    /// Runs the dirty-checking loop over this scope's subtree until every
    /// watcher reports clean, or fails after [`TTL`] dirty passes.
    pub fn digest(&self) -> Result<(), ScopeError> {
        let root = self.inner.root.clone();
        root.begin_phase(Phase::Digesting)?;
        root.last_dirty_watch.set(None);

        // A pending coalesced apply flush runs now instead of later
        if let Some(id) = root.apply_async_id.take() {
            root.scheduler.cancel(id);
            self.flush_apply_queue();
        }

        let mut remaining = TTL;
        loop {
            self.drain_async_queue();
            let dirty = self.digest_once();
            remaining -= 1;
            trace!(pass = TTL - remaining, dirty, "digest pass complete");
            if dirty || !root.async_queue.borrow().is_empty() {
                if remaining == 0 {
                    root.clear_phase();
                    return Err(ScopeError::IterationsExceeded);
                }
                continue;
            }
            break;
        }
        root.clear_phase();
        debug!(passes = TTL - remaining, "digest converged");

        loop {
            let task = root.post_digest_queue.borrow_mut().pop_front();
            match task {
                Some(task) => task(),
                None => break,
            }
        }
        Ok(())
    }

    /// One full pass: every scope in the subtree in pre-order, watchers in
    /// reverse registration order. Returns whether anything was dirty.
    fn digest_once(&self) -> bool {
        let root = self.inner.root.clone();
        let mut dirty = false;

        walk(self, &mut |scope| {
            let watchers: Vec<Rc<Watcher>> = scope.inner.watchers.borrow().clone();
            for watcher in watchers.iter().rev() {
                if watcher.removed.get() {
                    continue;
                }
                let new = match (watcher.watch)(scope) {
                    Ok(value) => value,
                    Err(e) => {
                        error!(error = %e, "watch function failed");
                        continue;
                    }
                };

                let (clean, old_for_listener) = {
                    let last = watcher.last.borrow();
                    match &*last {
                        WatchValue::Uninitialized => (false, new.clone()),
                        WatchValue::Known(old) => {
                            let clean = if watcher.value_eq {
                                new.deep_eq(old)
                            } else {
                                new.watch_eq(old)
                            };
                            (clean, old.clone())
                        }
                    }
                };

                if clean {
                    if root.last_dirty_watch.get() == Some(watcher.id) {
                        // The last watcher to change is stable again, so
                        // everything after it must be stable too
                        return WalkStatus::ShortCircuit;
                    }
                    continue;
                }

                dirty = true;
                root.last_dirty_watch.set(Some(watcher.id));
                let stored = if watcher.value_eq {
                    new.deep_clone()
                } else {
                    new.clone()
                };
                *watcher.last.borrow_mut() = WatchValue::Known(stored);
                if let Err(e) = (watcher.listener.borrow_mut())(&new, &old_for_listener, scope) {
                    error!(error = %e, "watch listener failed");
                }
            }
            WalkStatus::Continue
        });

        dirty
    }

    fn drain_async_queue(&self) {
        loop {
            let task = self.inner.root.async_queue.borrow_mut().pop_front();
            let Some((scope, task)) = task else { break };
            if let Err(e) = task(&scope) {
                error!(error = %e, "async task failed");
            }
        }
    }

    fn flush_apply_queue(&self) {
        loop {
            let task = self.inner.root.apply_queue.borrow_mut().pop_front();
            match task {
                Some(task) => task(),
                None => break,
            }
        }
        self.inner.root.apply_async_id.set(None);
    }

    /// Invokes `f` against this scope. No phase tracking; this is just a
    /// uniform entry point for code that works on scopes.
    pub fn eval<R>(&self, f: impl FnOnce(&Scope) -> R) -> R {
        f(self)
    }

    /// Evaluates a compiled expression against this scope's state, with
    /// keys in `locals` shadowing it.
    pub fn eval_expr(
        &self,
        expr: &CompiledExpression,
        locals: Option<&ObjectRef>,
    ) -> Result<Value, EvalError> {
        expr.eval(&self.inner.data, locals)
    }

    /// Invokes `f` under the apply phase guard, then digests from the tree
    /// root. The digest runs even when `f` fails; `f`'s own error takes
    /// precedence in the returned result.
    pub fn apply(
        &self,
        f: impl FnOnce(&Scope) -> Result<Value, EvalError>,
    ) -> Result<Value, ScopeError> {
        self.inner.root.begin_phase(Phase::Applying)?;
        let result = f(self);
        self.inner.root.clear_phase();
        let digest_result = self.root().digest();
        match result {
            Ok(value) => {
                digest_result?;
                Ok(value)
            }
            Err(e) => {
                if let Err(digest_err) = digest_result {
                    error!(error = %digest_err, "digest after failed apply also failed");
                }
                Err(ScopeError::Eval(e))
            }
        }
    }

    /// Defers `f` onto the shared async queue, to run against this scope
    /// before the next digest pass declares convergence. If no digest is in
    /// progress and the queue was idle, a root digest is scheduled so the
    /// work is never stranded.
    pub fn eval_async(&self, f: impl FnOnce(&Scope) -> Result<Value, EvalError> + 'static) {
        let root = &self.inner.root;
        if root.phase.get() == Phase::Idle && root.async_queue.borrow().is_empty() {
            let state = root.clone();
            root.scheduler.schedule(move || {
                if state.async_queue.borrow().is_empty() {
                    return;
                }
                if let Some(inner) = state.root_scope.borrow().upgrade() {
                    let root_scope = Scope { inner };
                    if let Err(e) = root_scope.digest() {
                        error!(error = %e, "scheduled digest failed");
                    }
                }
            });
        }
        root.async_queue
            .borrow_mut()
            .push_back((self.clone(), Box::new(f)));
    }

    /// Defers `f` onto the shared apply queue. All tasks queued before the
    /// single scheduled flush fires are drained by one apply, and so by one
    /// digest.
    pub fn apply_async(&self, f: impl FnOnce(&Scope) -> Result<Value, EvalError> + 'static) {
        let scope = self.clone();
        self.inner.root.apply_queue.borrow_mut().push_back(Box::new(move || {
            if let Err(e) = f(&scope) {
                error!(error = %e, "apply-async task failed");
            }
        }));

        let root = &self.inner.root;
        if root.apply_async_id.get().is_none() {
            let scope = self.clone();
            let id = root.scheduler.schedule(move || {
                let result = scope.apply(|s| {
                    s.flush_apply_queue();
                    Ok(Value::Undefined)
                });
                if let Err(e) = result {
                    error!(error = %e, "apply-async flush failed");
                }
            });
            root.apply_async_id.set(Some(id));
        }
    }

    /// Runs `f` once, after the next digest fully converges.
    pub fn post_digest(&self, f: impl FnOnce(&Scope) -> Result<Value, EvalError> + 'static) {
        let scope = self.clone();
        self.inner
            .root
            .post_digest_queue
            .borrow_mut()
            .push_back(Box::new(move || {
                if let Err(e) = f(&scope) {
                    error!(error = %e, "post-digest task failed");
                }
            }));
    }

    // ---- events ---------------------------------------------------------

    /// Registers an event listener. Returns a deregistration function;
    /// deregistering during delivery leaves a tombstone that is compacted
    /// on the next delivery rather than shifting live listeners mid-fire.
    pub fn on(
        &self,
        name: &str,
        listener: impl FnMut(&Event, &[Value]) -> Result<(), EvalError> + 'static,
    ) -> Box<dyn Fn()> {
        let listener: EventListener = Rc::new(RefCell::new(listener));
        self.inner
            .listeners
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(Some(listener.clone()));

        let inner = Rc::downgrade(&self.inner);
        let name = name.to_string();
        Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                let mut map = inner.listeners.borrow_mut();
                if let Some(list) = map.get_mut(&name) {
                    for slot in list.iter_mut() {
                        if slot.as_ref().is_some_and(|l| Rc::ptr_eq(l, &listener)) {
                            *slot = None;
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Fires `name` on this scope, then up through structural ancestors.
    /// [`Event::stop_propagation`] halts the upward walk after the current
    /// scope's listeners finish.
    pub fn emit(&self, name: &str, args: &[Value]) -> Rc<Event> {
        let event = Rc::new(Event {
            name: name.to_string(),
            target: self.clone(),
            current: RefCell::new(None),
            stopped: Cell::new(false),
            default_prevented: Cell::new(false),
        });

        let mut scope = Some(self.clone());
        while let Some(current) = scope {
            *event.current.borrow_mut() = Some(current.clone());
            current.fire_listeners(name, &event, args);
            if event.stopped.get() {
                break;
            }
            scope = current.parent();
        }
        *event.current.borrow_mut() = None;
        event
    }

    /// Fires `name` on this scope and every descendant in pre-order,
    /// isolated children included. Broadcasts cannot be stopped.
    pub fn broadcast(&self, name: &str, args: &[Value]) -> Rc<Event> {
        let event = Rc::new(Event {
            name: name.to_string(),
            target: self.clone(),
            current: RefCell::new(None),
            stopped: Cell::new(false),
            default_prevented: Cell::new(false),
        });

        walk(self, &mut |scope| {
            *event.current.borrow_mut() = Some(scope.clone());
            scope.fire_listeners(name, &event, args);
            WalkStatus::Continue
        });
        *event.current.borrow_mut() = None;
        event
    }

    fn fire_listeners(&self, name: &str, event: &Event, args: &[Value]) {
        let mut i = 0;
        loop {
            let next = {
                let mut map = self.inner.listeners.borrow_mut();
                let Some(list) = map.get_mut(name) else { break };
                loop {
                    if i >= list.len() {
                        break None;
                    }
                    match &list[i] {
                        None => {
                            list.remove(i);
                        }
                        Some(listener) => break Some(listener.clone()),
                    }
                }
            };
            let Some(listener) = next else { break };
            if let Err(e) = (listener.borrow_mut())(event, args) {
                error!(error = %e, event = name, "event listener failed");
            }
            i += 1;
        }
    }
}

fn walk(scope: &Scope, f: &mut impl FnMut(&Scope) -> WalkStatus) -> WalkStatus {
    if f(scope) == WalkStatus::ShortCircuit {
        return WalkStatus::ShortCircuit;
    }
    let children: Vec<Scope> = scope.inner.children.borrow().clone();
    for child in &children {
        if walk(child, f) == WalkStatus::ShortCircuit {
            return WalkStatus::ShortCircuit;
        }
    }
    WalkStatus::Continue
}

/// One-level copy for collection-watch snapshots: fresh container, shared
/// element identity.
fn shallow_copy(value: &Value) -> Value {
    match value {
        Value::Array(arr) => Value::Array(ArrayRef::from_vec(arr.to_vec())),
        Value::Object(obj) => {
            let copy = ObjectRef::new();
            for (key, value) in obj.entries() {
                copy.set(&key, value);
            }
            Value::Object(copy)
        }
        other => other.clone(),
    }
}

/// A single event delivery, shared by every listener it visits.
pub struct Event {
    name: String,
    target: Scope,
    current: RefCell<Option<Scope>>,
    stopped: Cell<bool>,
    default_prevented: Cell<bool>,
}

impl Event {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scope `emit`/`broadcast` was called on.
    pub fn target(&self) -> Scope {
        self.target.clone()
    }

    /// The scope whose listeners are currently being fired; `None` once
    /// delivery has finished.
    pub fn current_scope(&self) -> Option<Scope> {
        self.current.borrow().clone()
    }

    /// Stops an emit from walking further up the tree. Remaining listeners
    /// on the current scope still fire; broadcasts ignore this entirely.
    pub fn stop_propagation(&self) {
        self.stopped.set(true);
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }
}
