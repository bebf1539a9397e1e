use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::Serialize;
use web_time::Instant;

use restore_core::{ActionKind, Interceptor, Middleware, Next, Store, Transition};

#[derive(Clone, Debug)]
pub struct InspectorConfig {
    /// Oldest records are dropped beyond this many.
    pub history_limit: usize,
    pub enabled: bool,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            history_limit: 256,
            enabled: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Domain,
    Error,
    /// Cancelled by its mutator or blocked by an interceptor further in.
    Silent,
}

#[derive(Clone, Debug, Serialize)]
pub struct Record {
    pub seq: u64,
    pub action: &'static str,
    pub kind: RecordKind,
    /// Debug form of the domain event, or the error chain.
    pub event: Option<String>,
    pub elapsed_ms: f32,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Metrics {
    pub dispatches: u64,
    pub errors: u64,
    pub silent: u64,
    /// Smoothed dispatch time.
    pub dispatch_ms: f32,
}

struct Pending {
    seq: u64,
    action: &'static str,
    started: Instant,
    outcome: Option<(RecordKind, String)>,
}

struct InspectorState {
    config: InspectorConfig,
    next_seq: u64,
    // one entry per dispatch in flight; executors may dispatch re-entrantly
    pending: Vec<Pending>,
    history: VecDeque<Record>,
    metrics: Metrics,
}

/// Records every dispatch that passes through a store.
///
/// [`Inspector::install`] registers it both as an interceptor (to time the
/// dispatch and notice silent ones) and as middleware (to see the result).
/// Install it before any blocking interceptor so blocked actions show up as
/// [`RecordKind::Silent`].
#[derive(Clone)]
pub struct Inspector {
    inner: Rc<RefCell<InspectorState>>,
}

impl Default for Inspector {
    fn default() -> Self {
        Self::new(InspectorConfig::default())
    }
}

impl Inspector {
    pub fn new(config: InspectorConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(InspectorState {
                config,
                next_seq: 0,
                pending: Vec::new(),
                history: VecDeque::new(),
                metrics: Metrics::default(),
            })),
        }
    }

    pub fn install(&self, store: &Store) {
        store.register_interceptor(self.clone());
        store.register_middleware(self.clone());
        log::debug!("inspector installed on {}", store.label());
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.borrow_mut().config.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.borrow().config.enabled
    }

    pub fn history(&self) -> Vec<Record> {
        self.inner.borrow().history.iter().cloned().collect()
    }

    pub fn metrics(&self) -> Metrics {
        self.inner.borrow().metrics.clone()
    }

    pub fn clear(&self) {
        let mut s = self.inner.borrow_mut();
        s.history.clear();
        s.metrics = Metrics::default();
    }

    /// Metrics plus history as JSON. A debugging aid, not a stable format.
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct Snapshot<'a> {
            metrics: &'a Metrics,
            history: &'a VecDeque<Record>,
        }

        let s = self.inner.borrow();
        let snapshot = Snapshot {
            metrics: &s.metrics,
            history: &s.history,
        };
        serde_json::to_string(&snapshot).unwrap_or("{}".into())
    }

    fn begin(&self, kind: ActionKind) -> bool {
        let mut s = self.inner.borrow_mut();
        if !s.config.enabled {
            return false;
        }
        let seq = s.next_seq;
        s.next_seq += 1;
        s.pending.push(Pending {
            seq,
            action: kind.name(),
            started: Instant::now(),
            outcome: None,
        });
        true
    }

    fn finish(&self) {
        let mut s = self.inner.borrow_mut();
        let Some(p) = s.pending.pop() else {
            return;
        };
        let elapsed_ms = (Instant::now() - p.started).as_secs_f32() * 1000.0;
        let (kind, event) = match p.outcome {
            Some((kind, event)) => (kind, Some(event)),
            None => (RecordKind::Silent, None),
        };

        let m = &mut s.metrics;
        m.dispatches += 1;
        match kind {
            RecordKind::Error => m.errors += 1,
            RecordKind::Silent => m.silent += 1,
            RecordKind::Domain => {}
        }
        // simple EMA
        let a = 0.2;
        m.dispatch_ms = if m.dispatches == 1 {
            elapsed_ms
        } else {
            (1.0 - a) * m.dispatch_ms + a * elapsed_ms
        };

        s.history.push_back(Record {
            seq: p.seq,
            action: p.action,
            kind,
            event,
            elapsed_ms,
        });
        while s.history.len() > s.config.history_limit {
            s.history.pop_front();
        }
    }
}

impl Interceptor for Inspector {
    fn intercept(&self, kind: ActionKind, next: Next<'_>) -> anyhow::Result<()> {
        if !self.begin(kind) {
            return next.run();
        }
        let result = next.run();
        self.finish();
        result
    }
}

impl Middleware for Inspector {
    fn on_transition(&self, t: &Transition<'_>) {
        let mut s = self.inner.borrow_mut();
        let Some(top) = s.pending.last_mut() else {
            return;
        };
        top.outcome = Some(match t.event.error() {
            Some(err) => (RecordKind::Error, format!("{err:#}")),
            None => (
                RecordKind::Domain,
                t.event
                    .domain()
                    .map(|e| format!("{e:?}"))
                    .unwrap_or_default(),
            ),
        });
    }
}
