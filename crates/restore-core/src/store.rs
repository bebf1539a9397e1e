use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use slotmap::SlotMap;

use crate::action::{Action, ActionKind, CancelTask, OnObserve, StoreView};
use crate::error::StoreError;
use crate::event::{DynEvent, Either, Event, Payload, StoreEvent};
use crate::job::{Job, JobKey, JobRegistry, TaskTag};
use crate::middleware::{Interceptor, Middleware, Next, Transition};
use crate::observer::{
    ActionCallback, ActionObservers, EventCallback, EventObservers, Notification, ObserverId,
    StateCallback, StateObservers, Subscription,
};
use crate::outcome::Outcome;
use crate::promise::Promise;
use crate::remote::{Envelope, Mailbox, RemoteDispatcher, RemoteKey, RemoteResolver, Settler};
use crate::state::{State, StateRegistry, StateSlot, StateWrite};

#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Prefix for this store's log lines.
    pub label: String,
    /// Log dispatch steps at debug level instead of trace.
    pub trace_dispatch: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            label: "store".to_string(),
            trace_dispatch: false,
        }
    }
}

impl StoreConfig {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }
}

/// Tables shared by a default store and every local store created from it.
pub(crate) struct Shared {
    next_observer: Cell<u64>,
    pub(crate) action_observers: RefCell<ActionObservers>,
    jobs: Rc<RefCell<JobRegistry>>,
    middleware: RefCell<Vec<Rc<dyn Middleware>>>,
    interceptors: RefCell<Vec<Rc<dyn Interceptor>>>,
    providers: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
    // dispatches currently on the stack, family-wide
    depth: Cell<u32>,
    deferred: RefCell<VecDeque<Box<dyn FnOnce()>>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            next_observer: Cell::new(1),
            action_observers: RefCell::new(ActionObservers::default()),
            jobs: Rc::new(RefCell::new(JobRegistry::default())),
            middleware: RefCell::new(Vec::new()),
            interceptors: RefCell::new(Vec::new()),
            providers: RefCell::new(HashMap::new()),
            depth: Cell::new(0),
            deferred: RefCell::new(VecDeque::new()),
        }
    }

    fn next_id(&self) -> ObserverId {
        let id = self.next_observer.get();
        self.next_observer.set(id + 1);
        ObserverId(id)
    }
}

struct DepthGuard<'a>(&'a Cell<u32>);

impl<'a> DepthGuard<'a> {
    fn enter(depth: &'a Cell<u32>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

pub(crate) struct StoreInner {
    config: StoreConfig,
    fallback: Option<Store>,
    states: RefCell<StateRegistry>,
    pub(crate) state_observers: RefCell<StateObservers>,
    pub(crate) event_observers: RefCell<EventObservers>,
    shared: Rc<Shared>,
    mailbox: Arc<Mailbox>,
    pending: RefCell<SlotMap<RemoteKey, Settler>>,
}

/// Holds application state and runs the dispatch pipeline.
///
/// Cloning is cheap and yields another handle to the same store. A store is
/// bound to the thread that created it; use [`Store::remote`] to reach it
/// from elsewhere.
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

/// Non-owning handle, used by provider completions.
#[derive(Clone)]
pub struct WeakStore {
    inner: Weak<StoreInner>,
}

impl WeakStore {
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self::build(config, None, Rc::new(Shared::new()))
    }

    /// A store that reads through to `self` for any state type it does not
    /// hold itself. Action observers, jobs, middleware and providers are
    /// shared with `self`.
    pub fn local(&self) -> Store {
        self.local_with_config(StoreConfig::labelled(format!("{}/local", self.label())))
    }

    pub fn local_with_config(&self, config: StoreConfig) -> Store {
        Self::build(config, Some(self.clone()), self.inner.shared.clone())
    }

    fn build(config: StoreConfig, fallback: Option<Store>, shared: Rc<Shared>) -> Self {
        log::debug!("{}: created (local={})", config.label, fallback.is_some());
        Self {
            inner: Rc::new(StoreInner {
                config,
                fallback,
                states: RefCell::new(StateRegistry::default()),
                state_observers: RefCell::new(StateObservers::default()),
                event_observers: RefCell::new(EventObservers::default()),
                shared,
                mailbox: Arc::new(Mailbox::default()),
                pending: RefCell::new(SlotMap::with_key()),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.config.label
    }

    pub fn is_local(&self) -> bool {
        self.inner.fallback.is_some()
    }

    pub fn fallback(&self) -> Option<&Store> {
        self.inner.fallback.as_ref()
    }

    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn ptr_eq(&self, other: &Store) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn trace(&self, args: fmt::Arguments<'_>) {
        if self.inner.config.trace_dispatch {
            log::debug!("{}: {}", self.label(), args);
        } else {
            log::trace!("{}: {}", self.label(), args);
        }
    }

    // State

    /// Registers `value` in this store, replacing any previous value of the
    /// same type. Does not notify observers.
    pub fn register_state<S: State>(&self, value: S) {
        let replaced = self
            .inner
            .states
            .borrow_mut()
            .insert(TypeId::of::<S>(), StateSlot::new(value))
            .is_some();
        log::debug!(
            "{}: registered state {} (replaced={replaced})",
            self.label(),
            std::any::type_name::<S>()
        );
    }

    /// Current value of `S`.
    ///
    /// # Panics
    /// If neither this store nor its fallback chain holds an `S`. Every state
    /// type an action touches must be registered during setup.
    pub fn state<S: State>(&self) -> S {
        match self.try_state::<S>() {
            Ok(state) => state,
            Err(err) => panic!("{}: {err}", self.label()),
        }
    }

    pub fn try_state<S: State>(&self) -> Result<S, StoreError> {
        if let Some(state) = self.inner.states.borrow().get::<S>() {
            return Ok(state);
        }
        match &self.inner.fallback {
            Some(fallback) => fallback.try_state::<S>(),
            None => Err(StoreError::UnregisteredState(std::any::type_name::<S>())),
        }
    }

    pub fn contains_state<S: State>(&self) -> bool {
        self.owner_of(TypeId::of::<S>()).is_some()
    }

    /// Borrows the current `S` without cloning it. Panics like [`Store::state`].
    pub fn with_state<S: State, R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let id = TypeId::of::<S>();
        let slot = match self.owner_of(id) {
            Some(owner) => owner.inner.states.borrow().slot(id),
            None => None,
        };
        match slot.as_ref().and_then(|s| s.value.downcast_ref::<S>()) {
            Some(state) => f(state),
            None => panic!(
                "{}: {}",
                self.label(),
                StoreError::UnregisteredState(std::any::type_name::<S>())
            ),
        }
    }

    /// First store in the fallback chain that holds a value for `id`.
    fn owner_of(&self, id: TypeId) -> Option<Store> {
        if self.inner.states.borrow().contains(id) {
            return Some(self.clone());
        }
        self.inner.fallback.as_ref().and_then(|f| f.owner_of(id))
    }

    /// Writes to the holder of the type, or to this store if nobody holds it.
    fn apply(&self, id: TypeId, slot: StateSlot) {
        let owner = self.owner_of(id).unwrap_or_else(|| self.clone());
        owner.inner.states.borrow_mut().insert(id, slot.clone());
        self.trace(format_args!("state {} written to {}", slot.name, owner.label()));
        owner.notify_state(id, &slot);
    }

    fn notify_state(&self, id: TypeId, slot: &StateSlot) {
        let observers = self.inner.state_observers.borrow().matching(id);
        for (observer, callback) in observers {
            if !self.inner.state_observers.borrow().contains(observer) {
                continue;
            }
            callback(&*slot.value);
        }
    }

    // Observers

    /// Observes `S`. The callback runs once right away with the current value,
    /// then after every successful mutation of `S`.
    ///
    /// The observer lives on whichever store in the fallback chain holds `S`.
    pub fn subscribe_state<S: State>(&self, f: impl Fn(&S) + 'static) -> Subscription {
        let current = self.state::<S>();
        let owner = self
            .owner_of(TypeId::of::<S>())
            .unwrap_or_else(|| self.clone());
        let id = self.inner.shared.next_id();
        let callback: StateCallback = Rc::new(move |value: &dyn Any| {
            if let Some(state) = value.downcast_ref::<S>() {
                f(state)
            }
        });
        owner
            .inner
            .state_observers
            .borrow_mut()
            .add(id, TypeId::of::<S>(), callback.clone());
        log::debug!(
            "{}: state observer {id:?} for {}",
            owner.label(),
            std::any::type_name::<S>()
        );
        callback(&current as &dyn Any);
        Subscription::state(id, &owner.inner)
    }

    /// Observes dispatches whose event type is `E`, plus every internal event
    /// addressed to this observer.
    pub fn subscribe_event<E: Event>(&self, f: impl Fn(&Either<E>) + 'static) -> Subscription {
        let callback: EventCallback = Rc::new(move |event: &Either<DynEvent>, _: &Store| {
            if let Some(event) = event.downcast::<E>() {
                f(&event)
            }
        });
        self.add_event_observer(Some(TypeId::of::<E>()), callback)
    }

    /// Observes every dispatch regardless of event type.
    pub fn subscribe_all(&self, f: impl Fn(&Either<DynEvent>) + 'static) -> Subscription {
        let callback: EventCallback = Rc::new(move |event: &Either<DynEvent>, _: &Store| f(event));
        self.add_event_observer(None, callback)
    }

    /// Like [`Store::subscribe_event`], with the post-transition value of `S`.
    pub fn observe<E: Event, S: State>(
        &self,
        f: impl Fn(&Notification<E, S>) + 'static,
    ) -> Subscription {
        let callback: EventCallback = Rc::new(move |event: &Either<DynEvent>, store: &Store| {
            if let Some(event) = event.downcast::<E>() {
                let state = store.state::<S>();
                f(&Notification { event, state })
            }
        });
        self.add_event_observer(Some(TypeId::of::<E>()), callback)
    }

    fn add_event_observer(&self, event: Option<TypeId>, callback: EventCallback) -> Subscription {
        let id = self.inner.shared.next_id();
        self.inner
            .event_observers
            .borrow_mut()
            .add(id, event, callback.clone());
        log::debug!("{}: event observer {id:?}", self.label());
        // only the new observer hears about its own registration
        callback(
            &Either::Internal(StoreEvent::OnObserve, Payload::new(id)),
            self,
        );
        Subscription::event(id, &self.inner)
    }

    /// Observes dispatched action kinds. Include `ActionKind::of::<OnObserve>()`
    /// to be called once right away, `ActionKind::error_of::<A>()` to hear
    /// about failed `A` mutations, `ActionKind::of::<CancelTask>()` for sweeps.
    pub fn subscribe_actions(
        &self,
        kinds: &[ActionKind],
        f: impl Fn(ActionKind) + 'static,
    ) -> Subscription {
        let shared = &self.inner.shared;
        let id = shared.next_id();
        let callback: ActionCallback = Rc::new(f);
        shared
            .action_observers
            .borrow_mut()
            .add(id, kinds, callback.clone());
        log::debug!("{}: action observer {id:?} for {kinds:?}", self.label());
        let on_observe = ActionKind::of::<OnObserve>();
        if kinds.contains(&on_observe) {
            callback(on_observe);
        }
        Subscription::action(id, shared)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        subscription.unsubscribe()
    }

    /// Drops this store's state and event observers and the family's action
    /// observers.
    pub fn remove_observers(&self) {
        self.inner.state_observers.borrow_mut().clear();
        self.inner.event_observers.borrow_mut().clear();
        self.inner.shared.action_observers.borrow_mut().clear();
    }

    fn notify_event(&self, event_type: TypeId, event: &Either<DynEvent>) {
        let observers = self.inner.event_observers.borrow().matching(event_type);
        self.deliver(observers, event);
    }

    fn deliver(&self, observers: Vec<(ObserverId, EventCallback)>, event: &Either<DynEvent>) {
        for (observer, callback) in observers {
            if !self.inner.event_observers.borrow().contains(observer) {
                continue;
            }
            callback(event, self);
        }
    }

    fn notify_actions(&self, kind: ActionKind) {
        let shared = &self.inner.shared;
        let observers = shared.action_observers.borrow().matching(kind);
        for (observer, callback) in observers {
            if !shared.action_observers.borrow().contains(observer) {
                continue;
            }
            callback(kind);
        }
    }

    // Jobs

    /// Registers a cancellable handle under `tag` (and [`TaskTag::ALL`]).
    pub fn submit_job(&self, job: impl Job + 'static, tag: TaskTag) -> JobKey {
        log::debug!("{}: job submitted under {tag}", self.label());
        self.inner.shared.jobs.borrow_mut().insert(tag, Rc::new(job))
    }

    /// Registers `promise` under `tag`; its entry goes away once it settles.
    pub fn provide<T: 'static>(&self, tag: TaskTag, promise: Promise<T>) -> Promise<T> {
        let jobs = &self.inner.shared.jobs;
        let key = jobs.borrow_mut().insert(tag, Rc::new(promise.clone()));
        let weak = Rc::downgrade(jobs);
        promise.on_settle(move || {
            if let Some(jobs) = weak.upgrade() {
                jobs.borrow_mut().remove(key);
            }
        });
        promise
    }

    /// Cancels every live job tagged `tag`, then reports the sweep to every
    /// event observer of this store and of each store it falls back to, and
    /// to `CancelTask` action observers, even when nothing was running.
    ///
    /// Local stores derived from `self` are not told; they hear about sweeps
    /// started from themselves or from their own locals.
    pub fn cancel_job(&self, tag: &TaskTag) {
        let handles = self.inner.shared.jobs.borrow_mut().take_tagged(tag);
        log::debug!(
            "{}: cancelling {} job(s) tagged {tag}",
            self.label(),
            handles.len()
        );
        for handle in handles {
            handle.cancel();
        }
        let event = Either::Internal(StoreEvent::CancelTask, Payload::new(tag.clone()));
        let mut holder = Some(self);
        while let Some(store) = holder {
            let observers = store.inner.event_observers.borrow().all();
            store.deliver(observers, &event);
            holder = store.fallback();
        }
        self.notify_actions(ActionKind::of::<CancelTask>());
    }

    pub fn live_jobs(&self, tag: &TaskTag) -> usize {
        self.inner.shared.jobs.borrow().count(tag)
    }

    // Middleware and providers

    pub fn register_middleware(&self, middleware: impl Middleware + 'static) {
        self.inner
            .shared
            .middleware
            .borrow_mut()
            .push(Rc::new(middleware));
    }

    /// Interceptors wrap dispatch; the first registered is the outermost.
    pub fn register_interceptor(&self, interceptor: impl Interceptor + 'static) {
        self.inner
            .shared
            .interceptors
            .borrow_mut()
            .push(Rc::new(interceptor));
    }

    /// Registers a capability (API client, clock, ...) for `executor_with`.
    pub fn register_provider<P: Any>(&self, provider: P) {
        self.inner
            .shared
            .providers
            .borrow_mut()
            .insert(TypeId::of::<P>(), Rc::new(provider));
    }

    pub fn try_provider<P: Any>(&self) -> Result<Rc<P>, StoreError> {
        let provider = self
            .inner
            .shared
            .providers
            .borrow()
            .get(&TypeId::of::<P>())
            .cloned();
        provider
            .and_then(|p| p.downcast::<P>().ok())
            .ok_or(StoreError::MissingProvider(std::any::type_name::<P>()))
    }

    /// # Panics
    /// If no `P` was registered.
    pub fn provider<P: Any>(&self) -> Rc<P> {
        match self.try_provider::<P>() {
            Ok(p) => p,
            Err(err) => panic!("{}: {err}", self.label()),
        }
    }

    // Remote

    pub fn remote(&self) -> RemoteDispatcher {
        RemoteDispatcher::new(self.inner.mailbox.clone())
    }

    /// A promise that another thread settles through the returned resolver.
    /// The settlement takes effect during [`Store::pump`].
    pub fn remote_promise<T: Send + 'static>(&self) -> (Promise<T>, RemoteResolver<T>) {
        let promise = Promise::new();
        let target = promise.clone();
        let settler: Settler = Box::new(move |boxed: Box<dyn Any + Send>| {
            match boxed.downcast::<Outcome<T>>() {
                Ok(outcome) => target.settle(*outcome),
                Err(_) => log::error!(
                    "{}",
                    StoreError::SettlementMismatch(std::any::type_name::<T>())
                ),
            }
        });
        let key = self.inner.pending.borrow_mut().insert(settler);
        let weak = Rc::downgrade(&self.inner);
        promise.on_settle(move || {
            if let Some(inner) = weak.upgrade() {
                inner.pending.borrow_mut().remove(key);
            }
        });
        (promise, RemoteResolver::new(key, self.inner.mailbox.clone()))
    }

    /// Applies everything posted from other threads. Returns how many
    /// envelopes were processed.
    pub fn pump(&self) -> usize {
        let batch = self.inner.mailbox.drain();
        let count = batch.len();
        for envelope in batch {
            match envelope {
                Envelope::Run(f) => f(self),
                Envelope::Settle(key, outcome) => {
                    let settler = self.inner.pending.borrow_mut().remove(key);
                    match settler {
                        Some(settle) => settle(outcome),
                        None => log::debug!(
                            "{}: dropping settlement for a promise that already settled",
                            self.label()
                        ),
                    }
                }
            }
        }
        count
    }

    /// Cancels outstanding jobs without emitting events, forgets pending
    /// remote settlements and clears state, middleware, interceptors and
    /// providers. Observers stay registered.
    pub fn reset(&self) {
        let handles = self.inner.shared.jobs.borrow_mut().drain();
        for handle in handles {
            handle.cancel();
        }
        self.inner.pending.borrow_mut().clear();
        drop(self.inner.mailbox.drain());
        self.inner.states.borrow_mut().clear();
        self.inner.shared.middleware.borrow_mut().clear();
        self.inner.shared.interceptors.borrow_mut().clear();
        self.inner.shared.providers.borrow_mut().clear();
        self.inner.shared.deferred.borrow_mut().clear();
        log::debug!("{}: reset", self.label());
    }

    // Dispatch

    /// Runs one action through the pipeline. Never fails from the caller's
    /// point of view: errors surface as `Internal(Error, ..)` events.
    ///
    /// Provider follow-ups that become ready while this runs are dispatched
    /// once the outermost dispatch of the family returns.
    pub fn dispatch<A: 'static>(&self, action: Action<A>) {
        let depth = &self.inner.shared.depth;
        let guard = DepthGuard::enter(depth);
        self.intercept(action);
        drop(guard);
        if depth.get() == 0 {
            self.flush_deferred();
        }
    }

    /// Runs `f` now, or after the outermost dispatch in flight has reported
    /// its own events and transitions.
    pub(crate) fn after_dispatch(&self, f: impl FnOnce() + 'static) {
        let shared = &self.inner.shared;
        if shared.depth.get() == 0 {
            f();
            return;
        }
        shared.deferred.borrow_mut().push_back(Box::new(f));
    }

    fn flush_deferred(&self) {
        loop {
            let next = self.inner.shared.deferred.borrow_mut().pop_front();
            let Some(f) = next else {
                break;
            };
            f();
        }
    }

    fn intercept<A: 'static>(&self, action: Action<A>) {
        let kind = ActionKind::of::<A>();
        let chain = self.inner.shared.interceptors.borrow().clone();
        if chain.is_empty() {
            self.run(action);
            return;
        }

        let slot = RefCell::new(Some(action));
        let innermost = || -> anyhow::Result<()> {
            let action = slot.borrow_mut().take();
            match action {
                Some(action) => self.run(action),
                None => log::warn!(
                    "{}: interceptor resumed {} more than once",
                    self.label(),
                    kind.name()
                ),
            }
            Ok(())
        };
        if let Err(err) = Next::new(&chain, kind, &innermost).run() {
            log::error!(
                "{}: unhandled error while dispatching {}: {err:#}",
                self.label(),
                kind.name()
            );
        }
    }

    fn run<A: 'static>(&self, action: Action<A>) {
        let Action {
            value,
            event,
            mutator,
            executor,
            provider,
        } = action;
        let kind = ActionKind::of::<A>();
        let event_type = event.type_id();
        self.trace(format_args!("dispatch {}", kind.name()));

        let mut payload = Payload::none();
        let mut failure = None;
        if let Some(mutator) = mutator {
            match mutator(&value, &StoreView::new(self)) {
                Outcome::Ready(StateWrite { id, slot, payload: p }) => {
                    payload = p;
                    self.apply(id, slot);
                }
                Outcome::Failed(err) => {
                    log::debug!("{}: {} mutator failed: {err:#}", self.label(), kind.name());
                    failure = Some(err);
                }
                Outcome::Cancelled => {
                    self.trace(format_args!("{} cancelled, dropped", kind.name()));
                    return;
                }
            }
        }

        if failure.is_none() {
            if let Some(executor) = executor {
                self.trace(format_args!("executor {}", kind.name()));
                executor(self, &value);
            }
            if let Some(provider) = provider {
                self.trace(format_args!("provider {}", kind.name()));
                provider(self, &value);
            }
        }

        let (reported, event) = match failure {
            None => (kind, Either::Domain(event, payload)),
            Some(err) => (
                kind.error_kind(),
                Either::Internal(StoreEvent::Error, Payload::new(err)),
            ),
        };
        self.notify_event(event_type, &event);
        self.notify_actions(reported);

        let middleware = self.inner.shared.middleware.borrow().clone();
        if middleware.is_empty() {
            return;
        }
        let transition = Transition {
            kind: reported,
            value: &value,
            event: &event,
            view: StoreView::new(self),
        };
        for m in middleware {
            m.on_transition(&transition);
        }
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("label", &self.label())
            .field("local", &self.is_local())
            .field("states", &self.inner.states.borrow().len())
            .field("state_observers", &self.inner.state_observers.borrow().len())
            .field("event_observers", &self.inner.event_observers.borrow().len())
            .field(
                "action_observers",
                &self.inner.shared.action_observers.borrow().len(),
            )
            .field("jobs", &self.live_jobs(&TaskTag::ALL))
            .finish()
    }
}
