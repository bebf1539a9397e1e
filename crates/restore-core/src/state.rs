use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::rc::Rc;

use crate::event::Payload;

/// Marker for values the store can hold. One live value per concrete type.
pub trait State: Clone + 'static {}
impl<T> State for T where T: Clone + 'static {}

/// A new state value plus the payload that travels with the resulting event.
pub struct Commit<S> {
    state: S,
    payload: Payload,
}

impl<S: State> Commit<S> {
    pub fn new(state: S) -> Self {
        Self {
            state,
            payload: Payload::none(),
        }
    }

    pub fn with_payload<P: 'static>(state: S, payload: P) -> Self {
        Self {
            state,
            payload: Payload::new(payload),
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub(crate) fn into_write(self) -> StateWrite {
        StateWrite {
            id: TypeId::of::<S>(),
            slot: StateSlot::new(self.state),
            payload: self.payload,
        }
    }
}

impl<S: State> From<S> for Commit<S> {
    fn from(state: S) -> Self {
        Commit::new(state)
    }
}

#[derive(Clone)]
pub(crate) struct StateSlot {
    pub name: &'static str,
    pub value: Rc<dyn Any>,
}

impl StateSlot {
    pub fn new<S: State>(state: S) -> Self {
        Self {
            name: std::any::type_name::<S>(),
            value: Rc::new(state),
        }
    }
}

/// Erased result of a successful mutator, applied by the store.
pub(crate) struct StateWrite {
    pub id: TypeId,
    pub slot: StateSlot,
    pub payload: Payload,
}

#[derive(Default)]
pub(crate) struct StateRegistry {
    slots: HashMap<TypeId, StateSlot>,
}

impl StateRegistry {
    pub fn contains(&self, id: TypeId) -> bool {
        self.slots.contains_key(&id)
    }

    pub fn get<S: State>(&self) -> Option<S> {
        self.slots
            .get(&TypeId::of::<S>())
            .and_then(|slot| slot.value.downcast_ref::<S>())
            .cloned()
    }

    pub fn slot(&self, id: TypeId) -> Option<StateSlot> {
        self.slots.get(&id).cloned()
    }

    /// Replaces whatever was stored for `id`; there is no merge.
    pub fn insert(&mut self, id: TypeId, slot: StateSlot) -> Option<StateSlot> {
        self.slots.insert(id, slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
