use std::time::Duration;

use restore_core::prelude::*;
use restore_devtools::{Inspector, InspectorConfig, LogFilter, LoggingMiddleware};

#[derive(Clone, Debug, Default, PartialEq)]
struct CounterState {
    count: i64,
    synced: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
enum CounterEvent {
    Changed,
    SyncStarted,
    Synced,
}

struct Increment(i64);
struct Upload;
struct UploadDone;

const SYNC: TaskTag = TaskTag::new("sync");

fn increment(by: i64) -> Action<Increment> {
    Action::new(Increment(by), CounterEvent::Changed).mutator(
        |inc: &Increment, view: &StoreView<'_>| {
            let state = view.state::<CounterState>();
            match state.count.checked_add(inc.0) {
                Some(count) => Outcome::Ready(Commit::with_payload(
                    CounterState { count, ..state },
                    inc.0,
                )),
                None => Outcome::failed(anyhow::anyhow!("counter overflow")),
            }
        },
    )
}

/// Pretends to upload the count from a worker thread.
fn upload(latency: Duration) -> Action<Upload> {
    Action::new(Upload, CounterEvent::SyncStarted).provider(
        SYNC,
        move |store: &Store, _: &Upload| {
            let (promise, resolver) = store.remote_promise::<i64>();
            let count = store.state::<CounterState>().count;
            std::thread::spawn(move || {
                std::thread::sleep(latency);
                resolver.resolve(count);
            });
            promise
        },
        |outcome: Outcome<i64>| {
            Action::new(UploadDone, CounterEvent::Synced).mutator(
                move |_: &UploadDone, view: &StoreView<'_>| {
                    let state = view.state::<CounterState>();
                    outcome.map(|n| {
                        Commit::new(CounterState {
                            synced: Some(n),
                            ..state
                        })
                    })
                },
            )
        },
    )
}

fn pump_until_idle(store: &Store) {
    while store.live_jobs(&SYNC) > 0 {
        store.pump();
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let registry = StoreRegistry::new();
    let store = registry.default_store();
    store.register_state(CounterState::default());

    let inspector = Inspector::new(InspectorConfig::default());
    inspector.install(store);
    store.register_middleware(
        LoggingMiddleware::new(LogFilter::all()).with_level(log::Level::Info),
    );

    let scope = Scope::new();
    scope.add(store.subscribe_state(|s: &CounterState| {
        log::info!("count = {} (synced: {:?})", s.count, s.synced);
    }));
    scope.add(store.subscribe_event(|e: &Either<CounterEvent>| {
        if let Some(tag) = e.task() {
            log::info!("cancelled everything tagged {tag}");
        } else if let Some(err) = e.error() {
            log::warn!("rejected: {err}");
        }
    }));

    store.dispatch(increment(1));
    store.dispatch(increment(41));
    store.dispatch(increment(i64::MAX));

    store.dispatch(upload(Duration::from_millis(20)));
    pump_until_idle(store);

    store.dispatch(increment(1));
    store.dispatch(upload(Duration::from_secs(1)));
    store.cancel_job(&SYNC);

    let state = store.try_state::<CounterState>()?;
    log::info!("final: {state:?}");
    println!("{}", inspector.to_json());

    scope.dispose();
    Ok(())
}
