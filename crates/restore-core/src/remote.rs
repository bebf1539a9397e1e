//! Cross-thread entry points.
//!
//! A [`Store`] is `Rc`-based and never leaves its owning thread. Work that
//! completes elsewhere goes through a [`Mailbox`]: other threads enqueue
//! closures or settlements, and the owning thread applies them during
//! [`Store::pump`], in the order they were posted.

use std::any::Any;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::new_key_type;

use crate::error::StoreError;
use crate::outcome::Outcome;
use crate::store::Store;

new_key_type! {
    pub(crate) struct RemoteKey;
}

pub(crate) type Settler = Box<dyn FnOnce(Box<dyn Any + Send>)>;

pub(crate) enum Envelope {
    Run(Box<dyn FnOnce(&Store) + Send>),
    Settle(RemoteKey, Box<dyn Any + Send>),
}

#[derive(Default)]
pub(crate) struct Mailbox {
    queue: Mutex<VecDeque<Envelope>>,
}

impl Mailbox {
    pub fn post(&self, envelope: Envelope) {
        self.queue.lock().push_back(envelope);
    }

    pub fn drain(&self) -> VecDeque<Envelope> {
        std::mem::take(&mut *self.queue.lock())
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }
}

/// `Send + Sync` handle for scheduling work on a store's owning thread.
#[derive(Clone)]
pub struct RemoteDispatcher {
    mailbox: Arc<Mailbox>,
}

impl RemoteDispatcher {
    pub(crate) fn new(mailbox: Arc<Mailbox>) -> Self {
        Self { mailbox }
    }

    /// Runs `f` with the store at its next `pump`.
    pub fn post(&self, f: impl FnOnce(&Store) + Send + 'static) {
        self.mailbox.post(Envelope::Run(Box::new(f)));
    }

    pub fn pending(&self) -> usize {
        self.mailbox.len()
    }
}

/// `Send` half of a promise created by [`Store::remote_promise`].
///
/// Dropping a resolver without settling it (a worker that bails out early
/// or panics) fails the promise at the next `pump`.
pub struct RemoteResolver<T: Send + 'static> {
    key: RemoteKey,
    mailbox: Option<Arc<Mailbox>>,
    _value: PhantomData<fn(T)>,
}

impl<T: Send + 'static> RemoteResolver<T> {
    pub(crate) fn new(key: RemoteKey, mailbox: Arc<Mailbox>) -> Self {
        Self {
            key,
            mailbox: Some(mailbox),
            _value: PhantomData,
        }
    }

    pub fn resolve(self, value: T) {
        self.settle(Outcome::Ready(value));
    }

    pub fn reject(self, err: impl Into<anyhow::Error>) {
        self.settle(Outcome::Failed(err.into()));
    }

    pub fn settle(mut self, outcome: Outcome<T>) {
        self.post(outcome);
    }

    fn post(&mut self, outcome: Outcome<T>) {
        if let Some(mailbox) = self.mailbox.take() {
            mailbox.post(Envelope::Settle(self.key, Box::new(outcome)));
        }
    }
}

impl<T: Send + 'static> Drop for RemoteResolver<T> {
    fn drop(&mut self) {
        if self.mailbox.is_none() {
            return;
        }
        log::debug!(
            "remote resolver for {} dropped unsettled",
            std::any::type_name::<T>()
        );
        self.post(Outcome::Failed(StoreError::ResolverDropped.into()));
    }
}
