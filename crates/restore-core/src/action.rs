use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::rc::Rc;

use crate::error::StoreError;
use crate::event::{DynEvent, Event};
use crate::job::TaskTag;
use crate::outcome::Outcome;
use crate::promise::Promise;
use crate::state::{Commit, State, StateWrite};
use crate::store::Store;

/// Runtime identity of an action type, used to filter action observers.
#[derive(Clone, Copy)]
pub struct ActionKind {
    id: TypeId,
    name: &'static str,
    error: Option<fn() -> ActionKind>,
}

impl ActionKind {
    pub fn of<A: 'static>() -> Self {
        Self {
            id: TypeId::of::<A>(),
            name: std::any::type_name::<A>(),
            error: Some(Self::error_of::<A> as fn() -> ActionKind),
        }
    }

    /// Kind reported when a mutator of an `A` action fails.
    pub fn error_of<A: 'static>() -> Self {
        Self {
            id: TypeId::of::<ErrorAction<A>>(),
            name: std::any::type_name::<ErrorAction<A>>(),
            error: None,
        }
    }

    pub fn error_kind(&self) -> ActionKind {
        match self.error {
            Some(f) => f(),
            None => *self,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ActionKind {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActionKind {}

impl Hash for ActionKind {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionKind({})", self.name)
    }
}

/// Synthetic kind reported when a mutator of `A` fails.
pub struct ErrorAction<A>(PhantomData<fn() -> A>);

/// Synthetic kind delivered to an action observer that asked to see its own
/// registration.
pub struct OnObserve;

/// Synthetic kind reported after a job cancellation sweep.
pub struct CancelTask;

/// Read-only access to the store for mutators and middleware.
///
/// Has no `dispatch`: a mutator must not re-enter the store.
#[derive(Clone, Copy)]
pub struct StoreView<'a> {
    store: &'a Store,
}

impl<'a> StoreView<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn state<S: State>(&self) -> S {
        self.store.state::<S>()
    }

    pub fn try_state<S: State>(&self) -> Result<S, StoreError> {
        self.store.try_state::<S>()
    }

    pub fn contains<S: State>(&self) -> bool {
        self.store.contains_state::<S>()
    }

    pub fn with_state<S: State, R>(&self, f: impl FnOnce(&S) -> R) -> R {
        self.store.with_state(f)
    }

    pub fn label(&self) -> &str {
        self.store.label()
    }
}

pub(crate) type MutatorFn<A> = Box<dyn FnOnce(&A, &StoreView<'_>) -> Outcome<StateWrite>>;
pub(crate) type ExecutorFn<A> = Box<dyn FnOnce(&Store, &A)>;

/// One intended state transition.
///
/// Built with chained calls and consumed by [`Store::dispatch`]. Each of
/// mutator, executor and provider holds at most one closure; attaching
/// another replaces the previous one.
pub struct Action<A: 'static> {
    pub(crate) value: A,
    pub(crate) event: DynEvent,
    pub(crate) mutator: Option<MutatorFn<A>>,
    pub(crate) executor: Option<ExecutorFn<A>>,
    pub(crate) provider: Option<ExecutorFn<A>>,
}

impl<A: 'static> Action<A> {
    pub fn new<E: Event>(value: A, event: E) -> Self {
        Self {
            value,
            event: DynEvent::new(event),
            mutator: None,
            executor: None,
            provider: None,
        }
    }

    pub fn value(&self) -> &A {
        &self.value
    }

    pub fn event(&self) -> &DynEvent {
        &self.event
    }

    pub fn kind(&self) -> ActionKind {
        ActionKind::of::<A>()
    }

    pub fn has_mutator(&self) -> bool {
        self.mutator.is_some()
    }

    pub fn has_executor(&self) -> bool {
        self.executor.is_some()
    }

    /// Attaches the mutator: computes the new state of `S` (and an optional
    /// payload) from the action and a read-only view of the store.
    pub fn mutator<S: State>(
        mut self,
        f: impl FnOnce(&A, &StoreView<'_>) -> Outcome<Commit<S>> + 'static,
    ) -> Self {
        if self.mutator.is_some() {
            log::warn!("{}: replacing an earlier mutator", self.kind().name());
        }
        self.mutator = Some(Box::new(move |action: &A, view: &StoreView<'_>| {
            f(action, view).map(Commit::into_write)
        }));
        self
    }

    /// Mutator shim for the common case: no payload, fallible.
    pub fn reducer<S, E>(self, f: impl FnOnce(&StoreView<'_>) -> Result<S, E> + 'static) -> Self
    where
        S: State,
        E: Into<anyhow::Error>,
    {
        self.mutator(move |_: &A, view: &StoreView<'_>| Outcome::from(f(view)).map(Commit::new))
    }

    /// Attaches the executor, run after a successful (or absent) mutator.
    pub fn executor(mut self, f: impl FnOnce(&Store, &A) + 'static) -> Self {
        if self.executor.is_some() {
            log::warn!("{}: replacing an earlier executor", self.kind().name());
        }
        self.executor = Some(Box::new(f));
        self
    }

    /// Executor shim that first resolves a provider capability registered
    /// with [`Store::register_provider`]. A missing capability is a
    /// programmer error and panics at dispatch.
    pub fn executor_with<P: Any>(self, f: impl FnOnce(Rc<P>, &Store, &A) + 'static) -> Self {
        self.executor(move |store: &Store, action: &A| {
            let provider = store.provider::<P>();
            f(provider, store, action)
        })
    }

    /// Attaches asynchronous work. The store runs `work` after the executor,
    /// registers the returned promise under `tag`, and once it settles
    /// dispatches `finish(outcome)`. A promise that settles while a dispatch
    /// is still running has its follow-up dispatched after that dispatch
    /// completes, so observers always hear this action before `finish`'s.
    pub fn provider<T, B>(
        mut self,
        tag: TaskTag,
        work: impl FnOnce(&Store, &A) -> Promise<T> + 'static,
        finish: impl FnOnce(Outcome<T>) -> Action<B> + 'static,
    ) -> Self
    where
        T: 'static,
        B: 'static,
    {
        if self.provider.is_some() {
            log::warn!("{}: replacing an earlier provider", self.kind().name());
        }
        self.provider = Some(Box::new(move |store: &Store, action: &A| {
            let promise = store.provide(tag, work(store, action));
            let weak = store.downgrade();
            promise.then(move |outcome| match weak.upgrade() {
                Some(store) => {
                    let target = store.clone();
                    store.after_dispatch(move || target.dispatch(finish(outcome)));
                }
                None => log::debug!("provider settled after its store was dropped"),
            });
        }));
        self
    }
}

impl<A: fmt::Debug + 'static> fmt::Debug for Action<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("value", &self.value)
            .field("event", &self.event)
            .field("mutator", &self.mutator.is_some())
            .field("executor", &self.executor.is_some())
            .field("provider", &self.provider.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Load;
    struct Save;

    #[test]
    fn test_kind_identity() {
        assert_eq!(ActionKind::of::<Load>(), ActionKind::of::<Load>());
        assert_ne!(ActionKind::of::<Load>(), ActionKind::of::<Save>());
        assert_eq!(ActionKind::of::<Load>().error_kind(), ActionKind::error_of::<Load>());
        assert_ne!(ActionKind::error_of::<Load>(), ActionKind::error_of::<Save>());
        // an error kind has no further error kind
        let err = ActionKind::error_of::<Load>();
        assert_eq!(err.error_kind(), err);
    }

    #[test]
    fn test_last_attachment_wins() {
        let action = Action::new(Load, "loaded")
            .reducer(|_| Ok::<_, anyhow::Error>(1u8))
            .reducer(|_| Ok::<_, anyhow::Error>(2u8))
            .executor(|_, _| {});
        assert!(action.has_mutator());
        assert!(action.has_executor());
        assert!(action.event().is::<&'static str>());
    }
}
