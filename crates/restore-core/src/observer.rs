//! Observer registries and subscription tokens.
//!
//! Three independent tables live here: state observers (keyed by state type),
//! event observers (keyed by event type, or the catch-all sentinel) and
//! action observers (keyed by a set of [`ActionKind`]s). Entries are kept in
//! registration order; fan-out snapshots the matching callbacks first so a
//! callback may subscribe, unsubscribe or dispatch freely.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::action::ActionKind;
use crate::event::{DynEvent, Either};
use crate::store::{Shared, Store, StoreInner};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub(crate) u64);

/// An event notification paired with the snapshot of state `S` taken right
/// after the transition that produced it.
#[derive(Clone, Debug)]
pub struct Notification<E, S> {
    pub event: Either<E>,
    pub state: S,
}

pub(crate) type StateCallback = Rc<dyn Fn(&dyn Any)>;
pub(crate) type EventCallback = Rc<dyn Fn(&Either<DynEvent>, &Store)>;
pub(crate) type ActionCallback = Rc<dyn Fn(ActionKind)>;

struct StateEntry {
    id: ObserverId,
    state: TypeId,
    callback: StateCallback,
}

#[derive(Default)]
pub(crate) struct StateObservers {
    entries: Vec<StateEntry>,
}

impl StateObservers {
    pub fn add(&mut self, id: ObserverId, state: TypeId, callback: StateCallback) {
        self.entries.push(StateEntry {
            id,
            state,
            callback,
        });
    }

    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        before != self.entries.len()
    }

    pub fn contains(&self, id: ObserverId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn matching(&self, state: TypeId) -> Vec<(ObserverId, StateCallback)> {
        self.entries
            .iter()
            .filter(|e| e.state == state)
            .map(|e| (e.id, e.callback.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// `None` is the internal sentinel: it matches every dispatch.
struct EventEntry {
    id: ObserverId,
    event: Option<TypeId>,
    callback: EventCallback,
}

#[derive(Default)]
pub(crate) struct EventObservers {
    entries: Vec<EventEntry>,
}

impl EventObservers {
    pub fn add(&mut self, id: ObserverId, event: Option<TypeId>, callback: EventCallback) {
        self.entries.push(EventEntry {
            id,
            event,
            callback,
        });
    }

    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        before != self.entries.len()
    }

    pub fn contains(&self, id: ObserverId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Sentinel observers plus those declared for `event`.
    pub fn matching(&self, event: TypeId) -> Vec<(ObserverId, EventCallback)> {
        self.entries
            .iter()
            .filter(|e| e.event.is_none_or(|t| t == event))
            .map(|e| (e.id, e.callback.clone()))
            .collect()
    }

    pub fn all(&self) -> Vec<(ObserverId, EventCallback)> {
        self.entries
            .iter()
            .map(|e| (e.id, e.callback.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

struct ActionEntry {
    id: ObserverId,
    kinds: SmallVec<[ActionKind; 4]>,
    callback: ActionCallback,
}

#[derive(Default)]
pub(crate) struct ActionObservers {
    entries: Vec<ActionEntry>,
}

impl ActionObservers {
    pub fn add(&mut self, id: ObserverId, kinds: &[ActionKind], callback: ActionCallback) {
        self.entries.push(ActionEntry {
            id,
            kinds: SmallVec::from_slice(kinds),
            callback,
        });
    }

    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        before != self.entries.len()
    }

    pub fn contains(&self, id: ObserverId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn matching(&self, kind: ActionKind) -> Vec<(ObserverId, ActionCallback)> {
        self.entries
            .iter()
            .filter(|e| e.kinds.contains(&kind))
            .map(|e| (e.id, e.callback.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Clone)]
enum Target {
    State(Weak<StoreInner>),
    Event(Weak<StoreInner>),
    Action(Weak<Shared>),
}

/// Unsubscribe token. Dropping it keeps the observer registered; call
/// [`Subscription::unsubscribe`] (or [`Store::unsubscribe`]) to remove it.
#[must_use = "dropping a Subscription leaves the observer registered forever"]
pub struct Subscription {
    id: ObserverId,
    target: Target,
}

impl Subscription {
    pub(crate) fn state(id: ObserverId, owner: &Rc<StoreInner>) -> Self {
        Self {
            id,
            target: Target::State(Rc::downgrade(owner)),
        }
    }

    pub(crate) fn event(id: ObserverId, owner: &Rc<StoreInner>) -> Self {
        Self {
            id,
            target: Target::Event(Rc::downgrade(owner)),
        }
    }

    pub(crate) fn action(id: ObserverId, shared: &Rc<Shared>) -> Self {
        Self {
            id,
            target: Target::Action(Rc::downgrade(shared)),
        }
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Returns false if the observer was already gone (or its store dropped).
    pub fn unsubscribe(self) -> bool {
        let removed = match &self.target {
            Target::State(w) => w
                .upgrade()
                .is_some_and(|s| s.state_observers.borrow_mut().remove(self.id)),
            Target::Event(w) => w
                .upgrade()
                .is_some_and(|s| s.event_observers.borrow_mut().remove(self.id)),
            Target::Action(w) => w
                .upgrade()
                .is_some_and(|s| s.action_observers.borrow_mut().remove(self.id)),
        };
        log::trace!("unsubscribe {:?}: removed={removed}", self.id);
        removed
    }

    pub fn is_active(&self) -> bool {
        match &self.target {
            Target::State(w) => w
                .upgrade()
                .is_some_and(|s| s.state_observers.borrow().contains(self.id)),
            Target::Event(w) => w
                .upgrade()
                .is_some_and(|s| s.event_observers.borrow().contains(self.id)),
            Target::Action(w) => w
                .upgrade()
                .is_some_and(|s| s.action_observers.borrow().contains(self.id)),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Subscription").field(&self.id).finish()
    }
}

/// Collects subscriptions owned by one consumer (a screen, a view model) and
/// removes them together.
#[derive(Clone, Default)]
pub struct Scope {
    inner: Rc<RefCell<Vec<Subscription>>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, subscription: Subscription) {
        self.inner.borrow_mut().push(subscription);
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Unsubscribes everything collected so far. The scope stays usable.
    pub fn dispose(&self) {
        let subs = std::mem::take(&mut *self.inner.borrow_mut());
        for sub in subs {
            let _ = sub.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Load;
    struct Save;

    #[test]
    fn test_event_matching_includes_sentinel() {
        let mut obs = EventObservers::default();
        let noop: EventCallback = Rc::new(|_, _| {});
        obs.add(ObserverId(1), Some(TypeId::of::<u8>()), noop.clone());
        obs.add(ObserverId(2), None, noop.clone());
        obs.add(ObserverId(3), Some(TypeId::of::<u16>()), noop);

        let ids: Vec<_> = obs
            .matching(TypeId::of::<u8>())
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![ObserverId(1), ObserverId(2)]);
    }

    #[test]
    fn test_action_matching_by_set() {
        let mut obs = ActionObservers::default();
        let noop: ActionCallback = Rc::new(|_| {});
        obs.add(
            ObserverId(1),
            &[ActionKind::of::<Load>(), ActionKind::of::<Save>()],
            noop.clone(),
        );
        obs.add(ObserverId(2), &[ActionKind::error_of::<Load>()], noop);

        assert_eq!(obs.matching(ActionKind::of::<Save>()).len(), 1);
        assert_eq!(obs.matching(ActionKind::of::<Load>().error_kind())[0].0, ObserverId(2));
        assert!(obs.remove(ObserverId(1)));
        assert!(!obs.remove(ObserverId(1)));
        assert!(obs.matching(ActionKind::of::<Save>()).is_empty());
    }

    #[test]
    fn test_state_observers_keep_registration_order() {
        let mut obs = StateObservers::default();
        let noop: StateCallback = Rc::new(|_| {});
        for i in [3, 1, 2] {
            obs.add(ObserverId(i), TypeId::of::<i32>(), noop.clone());
        }
        let ids: Vec<_> = obs
            .matching(TypeId::of::<i32>())
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![ObserverId(3), ObserverId(1), ObserverId(2)]);
    }
}
