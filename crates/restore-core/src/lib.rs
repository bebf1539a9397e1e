//! # Stores, Actions, and Events
//!
//! Restore keeps application state in a [`Store`] and changes it only through
//! dispatched [`Action`]s. There are three main pieces:
//!
//! - `Store`: typed state registry plus the dispatch pipeline.
//! - `Action<A>`: a value carrying a mutator, an executor and a provider.
//! - `Either<E>`: what observers hear about, either a domain event or an internal one.
//!
//! ## State
//!
//! Any `Clone + 'static` type can be state. A store holds at most one value
//! per type:
//!
//! ```rust
//! use restore_core::prelude::*;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Counter(i32);
//!
//! let store = Store::new();
//! store.register_state(Counter(0));
//! assert_eq!(store.state::<Counter>(), Counter(0));
//! assert!(store.try_state::<String>().is_err());
//! ```
//!
//! Reading a type nobody registered through [`Store::state`] panics; it is a
//! setup mistake, not a runtime condition.
//!
//! ## Dispatch
//!
//! A mutator computes the next state from a read-only [`StoreView`]. On
//! success the store writes it, then tells observers:
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use restore_core::prelude::*;
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Counter(i32);
//!
//! #[derive(Clone, Debug, PartialEq)]
//! enum CounterEvent {
//!     Changed,
//! }
//!
//! struct Increment(i32);
//!
//! let store = Store::new();
//! store.register_state(Counter(0));
//!
//! let seen = Rc::new(Cell::new(0));
//! let sub = store.subscribe_event({
//!     let seen = seen.clone();
//!     move |event: &Either<CounterEvent>| {
//!         if event.is(&CounterEvent::Changed) {
//!             seen.set(seen.get() + 1);
//!         }
//!     }
//! });
//!
//! store.dispatch(
//!     Action::new(Increment(2), CounterEvent::Changed).mutator(|inc: &Increment, view: &StoreView<'_>| {
//!         let Counter(n) = view.state::<Counter>();
//!         Outcome::Ready(Commit::new(Counter(n + inc.0)))
//!     }),
//! );
//!
//! assert_eq!(store.state::<Counter>(), Counter(2));
//! assert_eq!(seen.get(), 1);
//! sub.unsubscribe();
//! ```
//!
//! - A failed mutator leaves state alone and reports `Internal(Error, ..)`.
//! - A cancelled mutator makes the whole dispatch a silent no-op.
//! - Executors and providers run only after a successful (or absent) mutator.
//!
//! ## Jobs
//!
//! Long-running work is registered under a [`TaskTag`] and cancelled by tag
//! with [`Store::cancel_job`]. Providers do this for you: their promise lives
//! in the job table until it settles.
//!
//! ## Threads
//!
//! A store never leaves its thread. Other threads reach it through
//! [`Store::remote`] and [`Store::remote_promise`]; what they post is applied
//! when the owning thread calls [`Store::pump`].

pub mod action;
pub mod error;
pub mod event;
pub mod job;
pub mod middleware;
pub mod observer;
pub mod outcome;
pub mod prelude;
pub mod promise;
pub mod registry;
pub mod remote;
pub mod state;
pub mod store;


pub use prelude::*;
