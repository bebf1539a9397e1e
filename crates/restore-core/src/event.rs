//! Event model: application events and store-internal events share one
//! tagged union, [`Either`].
//!
//! Domain events are any `Clone + PartialEq + Debug` type. Observers subscribe
//! to a concrete event type and receive `Either<E>`; the store itself moves
//! events around type-erased as [`DynEvent`] and narrows them once, at the
//! subscriber boundary.

use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;

use crate::job::TaskTag;
use crate::observer::ObserverId;

pub trait Event: Clone + PartialEq + fmt::Debug + 'static {}
impl<T> Event for T where T: Clone + PartialEq + fmt::Debug + 'static {}

/// Events synthesized by the store rather than by actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreEvent {
    /// Payload: the [`ObserverId`] that was just registered.
    OnObserve,
    /// Payload: the [`TaskTag`] that was swept.
    CancelTask,
    /// Payload: the `anyhow::Error` a mutator failed with.
    Error,
}

/// Optional, type-erased data attached to an event.
#[derive(Clone, Default)]
pub struct Payload(Option<Rc<dyn Any>>);

impl Payload {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new<T: 'static>(value: T) -> Self {
        Self(Some(Rc::new(value)))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.0.as_deref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(_) => f.write_str("Payload(..)"),
            None => f.write_str("Payload(None)"),
        }
    }
}

trait AnyEvent: fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn eq_dyn(&self, other: &dyn AnyEvent) -> bool;
}

impl<E: Event> AnyEvent for E {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn AnyEvent) -> bool {
        other.as_any().downcast_ref::<E>().is_some_and(|o| o == self)
    }
}

/// A domain event with its concrete type erased.
#[derive(Clone)]
pub struct DynEvent {
    event: Rc<dyn AnyEvent>,
    type_id: TypeId,
    name: &'static str,
}

impl DynEvent {
    pub fn new<E: Event>(event: E) -> Self {
        Self {
            event: Rc::new(event),
            type_id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.name
    }

    pub fn is<E: Event>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.event.as_any().downcast_ref::<E>()
    }
}

impl PartialEq for DynEvent {
    fn eq(&self, other: &Self) -> bool {
        self.event.eq_dyn(other.event.as_ref())
    }
}

impl fmt::Debug for DynEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.event, f)
    }
}

/// Either an application event or a store-internal one, each with a payload.
#[derive(Clone, Debug)]
pub enum Either<E> {
    Domain(E, Payload),
    Internal(StoreEvent, Payload),
}

impl<E> Either<E> {
    pub fn payload(&self) -> &Payload {
        match self {
            Either::Domain(_, p) | Either::Internal(_, p) => p,
        }
    }

    pub fn domain(&self) -> Option<&E> {
        match self {
            Either::Domain(e, _) => Some(e),
            Either::Internal(..) => None,
        }
    }

    pub fn internal(&self) -> Option<StoreEvent> {
        match self {
            Either::Internal(kind, _) => Some(*kind),
            Either::Domain(..) => None,
        }
    }

    /// Matches internal events only; a domain event never matches.
    pub fn is_internal(&self, kind: StoreEvent) -> bool {
        self.internal() == Some(kind)
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        match self {
            Either::Internal(StoreEvent::Error, p) => p.get::<anyhow::Error>(),
            _ => None,
        }
    }

    pub fn observer(&self) -> Option<ObserverId> {
        match self {
            Either::Internal(StoreEvent::OnObserve, p) => p.get::<ObserverId>().copied(),
            _ => None,
        }
    }

    pub fn task(&self) -> Option<&TaskTag> {
        match self {
            Either::Internal(StoreEvent::CancelTask, p) => p.get::<TaskTag>(),
            _ => None,
        }
    }
}

impl<E: PartialEq> Either<E> {
    /// Matches domain events only; an internal event never matches.
    pub fn is(&self, candidate: &E) -> bool {
        self.domain() == Some(candidate)
    }
}

impl Either<DynEvent> {
    /// Narrows to a concrete event type. Internal events always narrow;
    /// domain events only when `E` is their concrete type.
    pub fn downcast<E: Event>(&self) -> Option<Either<E>> {
        match self {
            Either::Domain(event, p) => event
                .downcast_ref::<E>()
                .map(|e| Either::Domain(e.clone(), p.clone())),
            Either::Internal(kind, p) => Some(Either::Internal(*kind, p.clone())),
        }
    }

    pub fn is_event<E: Event>(&self, candidate: &E) -> bool {
        match self {
            Either::Domain(event, _) => event.downcast_ref::<E>() == Some(candidate),
            Either::Internal(..) => false,
        }
    }
}
