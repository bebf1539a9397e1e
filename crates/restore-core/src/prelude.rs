pub use crate::action::{Action, ActionKind, CancelTask, ErrorAction, OnObserve, StoreView};
pub use crate::error::StoreError;
pub use crate::event::{DynEvent, Either, Event, Payload, StoreEvent};
pub use crate::job::{Dispose, Job, JobKey, TaskTag};
pub use crate::middleware::{Interceptor, Middleware, Next, Transition};
pub use crate::observer::{Notification, ObserverId, Scope, Subscription};
pub use crate::outcome::Outcome;
pub use crate::promise::Promise;
pub use crate::registry::StoreRegistry;
pub use crate::remote::{RemoteDispatcher, RemoteResolver};
pub use crate::state::{Commit, State};
pub use crate::store::{Store, StoreConfig, WeakStore};
