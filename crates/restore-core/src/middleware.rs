use std::any::Any;
use std::rc::Rc;

use crate::action::{ActionKind, StoreView};
use crate::event::{DynEvent, Either};

/// One completed dispatch as seen by middleware.
pub struct Transition<'a> {
    /// `A` on success, `ErrorAction<A>` when the mutator failed.
    pub kind: ActionKind,
    /// The dispatched action's value (`&A`).
    pub value: &'a dyn Any,
    pub event: &'a Either<DynEvent>,
    /// State as it stands after the transition.
    pub view: StoreView<'a>,
}

impl Transition<'_> {
    pub fn value<A: 'static>(&self) -> Option<&A> {
        self.value.downcast_ref::<A>()
    }

    pub fn is_error(&self) -> bool {
        self.event.error().is_some()
    }
}

/// Observation-only middleware, invoked after observers in registration order.
pub trait Middleware {
    fn on_transition(&self, transition: &Transition<'_>);
}

impl<F> Middleware for F
where
    F: Fn(&Transition<'_>),
{
    fn on_transition(&self, transition: &Transition<'_>) {
        self(transition)
    }
}

/// Wrapping middleware. Receives the dispatch as a continuation; not calling
/// `next.run()` blocks the action entirely. Errors are logged at the top of
/// the chain and never reach the caller of `dispatch`.
pub trait Interceptor {
    fn intercept(&self, kind: ActionKind, next: Next<'_>) -> anyhow::Result<()>;
}

impl<F> Interceptor for F
where
    F: Fn(ActionKind, Next<'_>) -> anyhow::Result<()>,
{
    fn intercept(&self, kind: ActionKind, next: Next<'_>) -> anyhow::Result<()> {
        self(kind, next)
    }
}

/// The remainder of the interceptor chain.
pub struct Next<'a> {
    rest: &'a [Rc<dyn Interceptor>],
    kind: ActionKind,
    innermost: &'a dyn Fn() -> anyhow::Result<()>,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        chain: &'a [Rc<dyn Interceptor>],
        kind: ActionKind,
        innermost: &'a dyn Fn() -> anyhow::Result<()>,
    ) -> Self {
        Self {
            rest: chain,
            kind,
            innermost,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn run(self) -> anyhow::Result<()> {
        match self.rest.split_first() {
            Some((first, rest)) => first.intercept(
                self.kind,
                Next {
                    rest,
                    kind: self.kind,
                    innermost: self.innermost,
                },
            ),
            None => (self.innermost)(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Ping;

    #[test]
    fn test_chain_runs_outermost_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let make = |name: &'static str| -> Rc<dyn Interceptor> {
            let log = log.clone();
            Rc::new(move |_: ActionKind, next: Next<'_>| {
                log.borrow_mut().push(format!("{name}:before"));
                let r = next.run();
                log.borrow_mut().push(format!("{name}:after"));
                r
            })
        };
        let chain = vec![make("a"), make("b")];
        let inner_log = log.clone();
        let innermost = move || -> anyhow::Result<()> {
            inner_log.borrow_mut().push("dispatch".to_string());
            Ok(())
        };
        Next::new(&chain, ActionKind::of::<Ping>(), &innermost)
            .run()
            .expect("chain ok");

        assert_eq!(
            *log.borrow(),
            vec!["a:before", "b:before", "dispatch", "b:after", "a:after"]
        );
    }

    #[test]
    fn test_chain_short_circuits() {
        let reached = Rc::new(RefCell::new(false));
        let blocker: Rc<dyn Interceptor> =
            Rc::new(|_: ActionKind, _next: Next<'_>| -> anyhow::Result<()> { Ok(()) });
        let chain = vec![blocker];
        let r = reached.clone();
        let innermost = move || -> anyhow::Result<()> {
            *r.borrow_mut() = true;
            Ok(())
        };
        Next::new(&chain, ActionKind::of::<Ping>(), &innermost)
            .run()
            .expect("chain ok");
        assert!(!*reached.borrow());
    }
}
