use std::cell::RefCell;
use std::rc::Rc;

use crate::job::Job;
use crate::outcome::Outcome;

/// Single-threaded completion cell for asynchronous provider work.
///
/// A promise settles exactly once: resolved, rejected or cancelled. Later
/// settlements are ignored. Its consumer (`then`) receives the owned
/// [`Outcome`]; cancellation runs the `on_cancel` hooks first so the
/// underlying work can stop, then settles with [`Outcome::Cancelled`].
pub struct Promise<T: 'static> {
    inner: Rc<RefCell<Inner<T>>>,
}

struct Inner<T> {
    settled: bool,
    outcome: Option<Outcome<T>>,
    consumer: Option<Box<dyn FnOnce(Outcome<T>)>>,
    on_settle: Vec<Box<dyn FnOnce()>>,
    on_cancel: Vec<Box<dyn FnOnce()>>,
}

impl<T: 'static> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Promise<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                settled: false,
                outcome: None,
                consumer: None,
                on_settle: Vec::new(),
                on_cancel: Vec::new(),
            })),
        }
    }

    pub fn resolved(value: T) -> Self {
        let p = Self::new();
        p.resolve(value);
        p
    }

    pub fn rejected(err: impl Into<anyhow::Error>) -> Self {
        let p = Self::new();
        p.reject(err);
        p
    }

    pub fn resolve(&self, value: T) {
        self.settle(Outcome::Ready(value));
    }

    pub fn reject(&self, err: impl Into<anyhow::Error>) {
        self.settle(Outcome::Failed(err.into()));
    }

    pub fn is_settled(&self) -> bool {
        self.inner.borrow().settled
    }

    /// Hook run when the promise is cancelled, before it settles.
    pub fn on_cancel(&self, f: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        if !inner.settled {
            inner.on_cancel.push(Box::new(f));
        }
    }

    pub fn cancel(&self) {
        let hooks = {
            let mut inner = self.inner.borrow_mut();
            if inner.settled {
                return;
            }
            std::mem::take(&mut inner.on_cancel)
        };
        for hook in hooks {
            hook();
        }
        self.settle(Outcome::Cancelled);
    }

    /// Installs the consumer. Runs immediately if the promise already settled.
    pub fn then(&self, f: impl FnOnce(Outcome<T>) + 'static) {
        let ready = {
            let mut inner = self.inner.borrow_mut();
            if inner.consumer.is_some() {
                log::warn!("Promise::then: replacing an earlier consumer");
            }
            match inner.outcome.take() {
                Some(outcome) => Some(outcome),
                None if inner.settled => {
                    log::warn!("Promise::then: outcome was already consumed");
                    return;
                }
                None => {
                    inner.consumer = Some(Box::new(f));
                    return;
                }
            }
        };
        if let Some(outcome) = ready {
            f(outcome);
        }
    }

    pub fn settle(&self, outcome: Outcome<T>) {
        let (hooks, delivery) = {
            let mut inner = self.inner.borrow_mut();
            if inner.settled {
                return;
            }
            inner.settled = true;
            inner.on_cancel.clear();
            let hooks = std::mem::take(&mut inner.on_settle);
            match inner.consumer.take() {
                Some(consumer) => (hooks, Some((consumer, outcome))),
                None => {
                    inner.outcome = Some(outcome);
                    (hooks, None)
                }
            }
        };
        for hook in hooks {
            hook();
        }
        if let Some((consumer, outcome)) = delivery {
            consumer(outcome);
        }
    }

    /// Bookkeeping hook (registry removal). Runs immediately when settled.
    pub(crate) fn on_settle(&self, f: impl FnOnce() + 'static) {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.settled {
                inner.on_settle.push(Box::new(f));
                return;
            }
        }
        f();
    }
}

impl<T: 'static> Job for Promise<T> {
    fn cancel(&self) {
        Promise::cancel(self);
    }

    fn is_finished(&self) -> bool {
        self.is_settled()
    }
}
