//! The parallel key store: owns the slots, tracks which one is current, and
//! exposes the aggregate view.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use fetchlane_cache::SlidingCache;
use fetchlane_core::{
    FetchData, FetchParams, Invoker, Request, RequestState, Result, DEFAULT_PARALLEL_KEY,
};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::options::FetchOptions;
use crate::slot::Slot;

/// Tracing target for store operations.
pub const TRACING_TARGET: &str = "fetchlane_engine::store";

struct StoreInner<P, R> {
    options: Arc<FetchOptions<P, R>>,
    invoker: Arc<Invoker<P, R>>,
    cache: SlidingCache,
    slots: Mutex<HashMap<String, Slot<P, R>>>,
    current_key: Mutex<String>,
    aggregate: watch::Sender<RequestState<P, R>>,
    forward: Mutex<Option<AbortHandle>>,
    pending_ready: Mutex<Option<P>>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl<P, R> Drop for StoreInner<P, R> {
    fn drop(&mut self) {
        if let Some(handle) = self.forward.lock().unwrap().take() {
            handle.abort();
        }
        for handle in self.tasks.lock().unwrap().drain(..) {
            handle.abort();
        }
    }
}

/// A request-state engine for one request descriptor.
///
/// Tracks the full load lifecycle across parallel keys: each distinct key
/// owns a slot with its own `loading`/`error`/`data`/`nothing`/`params`,
/// while the aggregate accessors always read through the slot addressed by
/// the current key. Cheap to clone; clones share state.
///
/// Constructed inside a tokio runtime — the readiness gate, dependency
/// refresh, delay timers and cache expiry all schedule tasks.
pub struct Fetcher<P, R> {
    inner: Arc<StoreInner<P, R>>,
}

impl<P, R> Clone for Fetcher<P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P, R> Fetcher<P, R>
where
    P: FetchParams,
    R: FetchData,
{
    /// Builds a store around a request descriptor.
    ///
    /// Seeds slots from the cache when a cache identity is configured,
    /// arms the readiness and dependency watchers, and issues the automatic
    /// initial load unless `manual` is set.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::UnsupportedRequest`](fetchlane_core::ErrorKind)
    /// error when the request descriptor is malformed. Nothing else is ever
    /// returned synchronously; load failures surface through state.
    pub fn new(request: Request<P, R>, options: FetchOptions<P, R>) -> Result<Self> {
        let invoker = Arc::new(Invoker::resolve(request, options.transport.clone())?);
        let cache = options
            .cache
            .clone()
            .unwrap_or_else(|| SlidingCache::global().clone());
        let options = Arc::new(options);

        let (aggregate, _) = watch::channel(RequestState::default());
        let store = Self {
            inner: Arc::new(StoreInner {
                options: options.clone(),
                invoker,
                cache,
                slots: Mutex::new(HashMap::new()),
                current_key: Mutex::new(DEFAULT_PARALLEL_KEY.to_owned()),
                aggregate,
                forward: Mutex::new(None),
                pending_ready: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
        };

        store.seed_from_cache();

        if let Some(ready) = options.ready.clone() {
            store.spawn_ready_watcher(ready);
        }
        if let Some(deps) = options.refresh_deps.clone() {
            store.spawn_deps_watcher(deps);
        }

        if !options.manual {
            match options.default_params.clone() {
                Some(args) => {
                    let weak = Arc::downgrade(&store.inner);
                    let handle = tokio::spawn(async move {
                        if let Some(inner) = weak.upgrade() {
                            (Fetcher { inner }).load(args).await;
                        }
                    })
                    .abort_handle();
                    store.inner.tasks.lock().unwrap().push(handle);
                }
                None => tracing::trace!(
                    target: TRACING_TARGET,
                    "No default params, skipping the automatic initial load"
                ),
            }
        }

        Ok(store)
    }

    /// Pre-creates one slot per cached parallel sub-entry and restores the
    /// recorded current key.
    fn seed_from_cache(&self) {
        let Some(cache_id) = self.inner.options.effective_cache_id() else {
            return;
        };
        let Some(snapshot) = self.inner.cache.get(cache_id) else {
            return;
        };

        {
            let mut slots = self.inner.slots.lock().unwrap();
            for (key, serialized) in &snapshot.parallel_results {
                slots.insert(
                    key.clone(),
                    Slot::from_serialized(
                        key.clone(),
                        self.inner.invoker.clone(),
                        self.inner.options.clone(),
                        self.inner.cache.clone(),
                        serialized,
                    ),
                );
            }
        }

        tracing::debug!(
            target: TRACING_TARGET,
            cache_id = %cache_id,
            slots = snapshot.parallel_results.len(),
            current_key = %snapshot.current_parallel_key,
            "Store seeded from cache"
        );
        self.point_current(snapshot.current_parallel_key);
    }

    fn spawn_ready_watcher(&self, mut ready: watch::Receiver<bool>) {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                if *ready.borrow_and_update() {
                    break;
                }
                if ready.changed().await.is_err() {
                    return;
                }
            }
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let store = Fetcher { inner };
            let pending = store.inner.pending_ready.lock().unwrap().take();
            match pending {
                // Exactly one replay of the most recent deferred call, then
                // the watcher ends: one-shot, not a recurring gate.
                Some(args) => {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        "Ready condition opened, replaying the deferred load"
                    );
                    store.load(args).await;
                }
                None => tracing::trace!(
                    target: TRACING_TARGET,
                    "Ready condition opened with no deferred load"
                ),
            }
        })
        .abort_handle();
        self.inner.tasks.lock().unwrap().push(handle);
    }

    fn spawn_deps_watcher(&self, mut deps: watch::Receiver<u64>) {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            while deps.changed().await.is_ok() {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let store = Fetcher { inner };
                if store.suppress_dep_refresh() {
                    tracing::trace!(
                        target: TRACING_TARGET,
                        "Dependency refresh suppressed by policy"
                    );
                    continue;
                }
                store.refresh().await;
            }
        })
        .abort_handle();
        self.inner.tasks.lock().unwrap().push(handle);
    }

    fn suppress_dep_refresh(&self) -> bool {
        use crate::options::DepRefreshPolicy;
        self.inner.options.dep_refresh == DepRefreshPolicy::SkipWithDefaultParams
            && self.inner.options.default_params.is_some()
    }

    fn is_ready(&self) -> bool {
        self.inner
            .options
            .ready
            .as_ref()
            .map(|ready| *ready.borrow())
            .unwrap_or(true)
    }

    fn key_for(&self, args: &P) -> String {
        self.inner
            .options
            .parallel_key
            .as_ref()
            .map(|f| f(args))
            .unwrap_or_else(|| DEFAULT_PARALLEL_KEY.to_owned())
    }

    /// Resolves the slot for a key, creating (and cache-seeding) it when
    /// missing.
    fn slot_for(&self, key: &str) -> Slot<P, R> {
        let mut slots = self.inner.slots.lock().unwrap();
        if let Some(slot) = slots.get(key) {
            return slot.clone();
        }

        let seeded = self
            .inner
            .options
            .effective_cache_id()
            .and_then(|cache_id| self.inner.cache.get(cache_id))
            .and_then(|snapshot| snapshot.parallel_results.get(key).cloned());

        let slot = match seeded {
            Some(serialized) => Slot::from_serialized(
                key.to_owned(),
                self.inner.invoker.clone(),
                self.inner.options.clone(),
                self.inner.cache.clone(),
                &serialized,
            ),
            None => Slot::new(
                key.to_owned(),
                self.inner.invoker.clone(),
                self.inner.options.clone(),
                self.inner.cache.clone(),
            ),
        };
        slots.insert(key.to_owned(), slot.clone());
        slot
    }

    /// Moves the current key and re-points the aggregate forwarder at the
    /// addressed slot.
    fn point_current(&self, key: String) {
        {
            let mut current = self.inner.current_key.lock().unwrap();
            if *current == key && self.inner.forward.lock().unwrap().is_some() {
                return;
            }
            *current = key.clone();
        }

        let slot = self.inner.slots.lock().unwrap().get(&key).cloned();
        let Some(slot) = slot else {
            return;
        };

        let mut state = slot.subscribe();
        let aggregate = self.inner.aggregate.clone();
        let handle = tokio::spawn(async move {
            loop {
                let snapshot = state.borrow_and_update().clone();
                let _ = aggregate.send(snapshot);
                if state.changed().await.is_err() {
                    return;
                }
            }
        })
        .abort_handle();

        if let Some(previous) = self.inner.forward.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    /// Loads with the given arguments.
    ///
    /// Derives the parallel key, resolves or creates the owning slot, makes
    /// it current and runs its lifecycle. While the readiness condition is
    /// closed, the call is recorded (most recent wins) instead of
    /// dispatched.
    ///
    /// Never returns an error: failures settle into [`Fetcher::error`].
    ///
    /// # Concurrency
    ///
    /// There is no per-slot call-token guard by default: two overlapping
    /// loads on the *same* key race, and whichever settles last commits
    /// last, even if it was issued earlier. Give logically distinct
    /// concurrent calls distinct parallel keys, or opt into
    /// [`FetchOptions::discard_stale`].
    pub async fn load(&self, args: P) {
        if !self.is_ready() {
            if let Some(hook) = &self.inner.options.on_before {
                hook(&args);
            }
            tracing::debug!(
                target: TRACING_TARGET,
                "Load deferred until the ready condition opens"
            );
            *self.inner.pending_ready.lock().unwrap() = Some(args);
            return;
        }

        let key = self.key_for(&args);
        let slot = self.slot_for(&key);
        self.point_current(key);
        slot.load(args).await;
    }

    /// Re-runs the current slot's last load; a no-op when nothing was
    /// dispatched yet.
    pub async fn refresh(&self) {
        match self.current_slot() {
            Some(slot) => slot.refresh().await,
            None => tracing::trace!(
                target: TRACING_TARGET,
                "Refresh skipped, no current slot"
            ),
        }
    }

    /// Replaces the current slot's data in place, leaving `loading`/`error`
    /// untouched.
    pub fn mutate(&self, value: R) {
        match self.current_slot() {
            Some(slot) => slot.mutate(value),
            None => tracing::trace!(
                target: TRACING_TARGET,
                "Mutate skipped, no current slot"
            ),
        }
    }

    /// Derives new data for the current slot from its current value.
    pub fn mutate_with(&self, f: impl FnOnce(Option<R>) -> Option<R>) {
        match self.current_slot() {
            Some(slot) => slot.mutate_with(f),
            None => tracing::trace!(
                target: TRACING_TARGET,
                "Mutate skipped, no current slot"
            ),
        }
    }

    fn current_slot(&self) -> Option<Slot<P, R>> {
        let key = self.inner.current_key.lock().unwrap().clone();
        self.inner.slots.lock().unwrap().get(&key).cloned()
    }

    /// The aggregate state: the current slot's state, or the idle default
    /// before any load.
    pub fn state(&self) -> RequestState<P, R> {
        self.current_slot()
            .map(|slot| slot.state())
            .unwrap_or_default()
    }

    /// Whether the current slot is loading.
    pub fn loading(&self) -> bool {
        self.state().loading
    }

    /// Whether the current slot recorded an empty response.
    pub fn nothing(&self) -> bool {
        self.state().nothing
    }

    /// The current slot's captured error, if any.
    pub fn error(&self) -> Option<Arc<fetchlane_core::Error>> {
        self.state().error
    }

    /// The current slot's data, if any.
    pub fn data(&self) -> Option<R> {
        self.state().data
    }

    /// The current slot's last dispatched arguments, if any.
    pub fn params(&self) -> Option<P> {
        self.state().params
    }

    /// The parallel key the aggregate view currently follows.
    pub fn current_key(&self) -> String {
        self.inner.current_key.lock().unwrap().clone()
    }

    /// Subscribes to aggregate state changes.
    ///
    /// The receiver re-notifies both on slot-state commits and on current-key
    /// moves; this is the observable contract the UI-binding layer consumes.
    pub fn subscribe(&self) -> watch::Receiver<RequestState<P, R>> {
        self.inner.aggregate.subscribe()
    }

    /// A snapshot of every slot's state by parallel key, for list
    /// aggregation layered on top of the engine.
    pub fn parallel_results(&self) -> HashMap<String, RequestState<P, R>> {
        self.inner
            .slots
            .lock()
            .unwrap()
            .iter()
            .map(|(key, slot)| (key.clone(), slot.state()))
            .collect()
    }
}

impl<P, R> std::fmt::Debug for Fetcher<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("current_key", &*self.inner.current_key.lock().unwrap())
            .field("slots", &self.inner.slots.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use fetchlane_core::mock::MockTransport;
    use fetchlane_core::{ErrorKind, TransportResponse};
    use fetchlane_hydrate::{self as hydrate, Phase};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::FetchOptions;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct PageArgs {
        page: u32,
    }

    fn page_items(page: u32) -> Vec<String> {
        vec![format!("page-{page}-a"), format!("page-{page}-b")]
    }

    #[test]
    fn test_unsupported_descriptor_fails_synchronously() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let _guard = runtime.enter();

        let err = Fetcher::<(), Vec<String>>::new(
            Request::url(""),
            FetchOptions::new()
                .manual(true)
                .transport(MockTransport::new().clone_arc()),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedRequest);

        let err =
            Fetcher::<(), Vec<String>>::new(Request::url("/api/items"), FetchOptions::new())
                .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedRequest);
    }

    #[tokio::test]
    async fn test_url_request_dispatches_through_transport() {
        let transport = MockTransport::new();
        transport.enqueue(TransportResponse::ok(json!(["a", "b"])));

        let fetcher: Fetcher<(), Vec<String>> = Fetcher::new(
            Request::url("/api/items"),
            FetchOptions::new()
                .manual(true)
                .transport(transport.clone_arc()),
        )
        .unwrap();

        fetcher.load(()).await;

        assert_eq!(fetcher.data(), Some(vec!["a".to_owned(), "b".to_owned()]));
        assert_eq!(transport.calls()[0].url, "/api/items");
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_keys_track_independent_slots() {
        let fetcher = Fetcher::new(
            Request::handler(|args: PageArgs| async move {
                // Page 1 settles after page 2.
                let delay = if args.page == 1 { 100 } else { 10 };
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(page_items(args.page))
            }),
            FetchOptions::new()
                .manual(true)
                .parallel_key(|args: &PageArgs| args.page.to_string()),
        )
        .unwrap();

        let first = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { fetcher.load(PageArgs { page: 1 }).await })
        };
        let second = {
            let fetcher = fetcher.clone();
            tokio::spawn(async move { fetcher.load(PageArgs { page: 2 }).await })
        };
        first.await.unwrap();
        second.await.unwrap();

        // Both slots exist; the aggregate follows the last issued key even
        // though its response arrived first.
        assert_eq!(fetcher.current_key(), "2");
        assert_eq!(fetcher.data(), Some(page_items(2)));
        assert_eq!(fetcher.params(), Some(PageArgs { page: 2 }));

        let results = fetcher.parallel_results();
        assert_eq!(results.len(), 2);
        assert_eq!(results["1"].data, Some(page_items(1)));
        assert_eq!(results["2"].data, Some(page_items(2)));
    }

    #[tokio::test]
    async fn test_refresh_and_mutate_act_on_current_slot() {
        let fetcher = Fetcher::new(
            Request::handler(|args: PageArgs| async move { Ok(page_items(args.page)) }),
            FetchOptions::new()
                .manual(true)
                .parallel_key(|args: &PageArgs| args.page.to_string()),
        )
        .unwrap();

        fetcher.load(PageArgs { page: 1 }).await;
        fetcher.load(PageArgs { page: 2 }).await;

        fetcher.mutate(vec!["mutated".to_owned()]);
        assert_eq!(
            fetcher.parallel_results()["2"].data,
            Some(vec!["mutated".to_owned()]),
            "mutation lands on the current slot"
        );
        assert_eq!(fetcher.parallel_results()["1"].data, Some(page_items(1)));

        fetcher.refresh().await;
        assert_eq!(fetcher.data(), Some(page_items(2)));
    }

    #[tokio::test]
    async fn test_aggregate_subscription_follows_commits() {
        let fetcher = Fetcher::new(
            Request::handler(|args: PageArgs| async move { Ok(page_items(args.page)) }),
            FetchOptions::new().manual(true),
        )
        .unwrap();
        let mut subscription = fetcher.subscribe();

        fetcher.load(PageArgs { page: 3 }).await;

        // Drain until the settled state shows up; the forwarder republishes
        // asynchronously.
        let settled = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                subscription.changed().await.unwrap();
                let state = subscription.borrow_and_update().clone();
                if state.data.is_some() {
                    break state;
                }
            }
        })
        .await
        .expect("aggregate subscription observed the settled state");

        assert_eq!(settled.data, Some(page_items(3)));
        assert_eq!(settled.params, Some(PageArgs { page: 3 }));
    }

    #[tokio::test]
    async fn test_ready_gate_defers_and_replays_once() {
        let (ready_tx, ready_rx) = tokio::sync::watch::channel(false);
        let count = Arc::new(AtomicUsize::new(0));
        let fetcher = {
            let count = count.clone();
            Fetcher::new(
                Request::handler(move |n: u32| {
                    count.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(vec![n.to_string()]) }
                }),
                FetchOptions::new().manual(true).ready(ready_rx),
            )
            .unwrap()
        };

        fetcher.load(1).await;
        fetcher.load(2).await;
        assert_eq!(count.load(Ordering::SeqCst), 0, "no dispatch while closed");
        assert!(fetcher.params().is_none());

        ready_tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Exactly one replay, with the most recent deferred arguments.
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.params(), Some(2));

        // The gate is one-shot: a later close/open cycle replays nothing.
        ready_tx.send(false).unwrap();
        fetcher.load(3).await;
        ready_tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auto_load_uses_default_params() {
        let count = Arc::new(AtomicUsize::new(0));
        let fetcher = {
            let count = count.clone();
            Fetcher::new(
                Request::handler(move |n: u32| {
                    count.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(vec![n.to_string()]) }
                }),
                FetchOptions::new().default_params(9),
            )
            .unwrap()
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.params(), Some(9));
    }

    #[tokio::test]
    async fn test_manual_suppresses_auto_load() {
        let count = Arc::new(AtomicUsize::new(0));
        let _fetcher = {
            let count = count.clone();
            Fetcher::new(
                Request::handler(move |n: u32| {
                    count.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(vec![n.to_string()]) }
                }),
                FetchOptions::<u32, Vec<String>>::new()
                    .manual(true)
                    .default_params(9),
            )
            .unwrap()
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_write_through_and_seeding() {
        let cache = SlidingCache::new();

        {
            let fetcher = Fetcher::new(
                Request::handler(|args: PageArgs| async move { Ok(page_items(args.page)) }),
                FetchOptions::new()
                    .manual(true)
                    .cache_id("feed")
                    .cache(cache.clone())
                    .parallel_key(|args: &PageArgs| args.page.to_string()),
            )
            .unwrap();
            fetcher.load(PageArgs { page: 1 }).await;
            fetcher.load(PageArgs { page: 2 }).await;
        }

        let snapshot = cache.get("feed").expect("entry persisted");
        assert_eq!(snapshot.current_parallel_key, "2");
        assert_eq!(snapshot.parallel_results.len(), 2);

        // A fresh store over the same identity comes up pre-seeded, with the
        // recorded current key, before any load.
        let restored: Fetcher<PageArgs, Vec<String>> = Fetcher::new(
            Request::handler(|args: PageArgs| async move { Ok(page_items(args.page)) }),
            FetchOptions::new()
                .manual(true)
                .cache_id("feed")
                .cache(cache.clone())
                .parallel_key(|args: &PageArgs| args.page.to_string()),
        )
        .unwrap();

        assert_eq!(restored.current_key(), "2");
        assert_eq!(restored.data(), Some(page_items(2)));
        assert_eq!(restored.params(), Some(PageArgs { page: 2 }));
        assert_eq!(restored.parallel_results().len(), 2);
    }

    #[tokio::test]
    async fn test_mutation_persists_through_cache() {
        let cache = SlidingCache::new();
        let fetcher = Fetcher::new(
            Request::handler(|args: PageArgs| async move { Ok(page_items(args.page)) }),
            FetchOptions::new()
                .manual(true)
                .cache_id("feed-mutate")
                .cache(cache.clone()),
        )
        .unwrap();

        fetcher.load(PageArgs { page: 1 }).await;
        fetcher.mutate(vec!["mutated".to_owned()]);

        let snapshot = cache.get("feed-mutate").unwrap();
        let entry = &snapshot.parallel_results[DEFAULT_PARALLEL_KEY];
        assert_eq!(entry.data, json!(["mutated"]));
    }

    // The hydration tests flip the process-wide phase, so they serialize
    // behind one lock.
    static PHASE_LOCK: Mutex<()> = Mutex::new(());

    #[tokio::test]
    async fn test_server_to_client_handoff_is_one_shot() {
        let _guard = PHASE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let count = Arc::new(AtomicUsize::new(0));
        let handler = {
            let count = count.clone();
            move |args: PageArgs| {
                count.fetch_add(1, Ordering::SeqCst);
                async move { Ok(page_items(args.page)) }
            }
        };

        hydrate::set_phase(Phase::Server);
        let server = Fetcher::new(
            Request::handler(handler.clone()),
            FetchOptions::new()
                .manual(true)
                .ssr(true)
                .hydration_id("handoff-test"),
        )
        .unwrap();

        // Registration is synchronous-observably inert: no dispatch, no
        // state change.
        server.load(PageArgs { page: 7 }).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(server.data().is_none());

        assert_eq!(hydrate::run_server_pass().await, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(server.data(), Some(page_items(7)));

        hydrate::set_phase(Phase::Client);
        let client = Fetcher::new(
            Request::handler(handler.clone()),
            FetchOptions::new()
                .manual(true)
                .hydration_id("handoff-test"),
        )
        .unwrap();

        // First client load adopts the record without a network call.
        client.load(PageArgs { page: 7 }).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(client.data(), Some(page_items(7)));
        assert_eq!(client.params(), Some(PageArgs { page: 7 }));
        assert!(client.error().is_none());

        // The record was consumed: the next matching load hits the network.
        let second = Fetcher::new(
            Request::handler(handler),
            FetchOptions::new()
                .manual(true)
                .hydration_id("handoff-test"),
        )
        .unwrap();
        second.load(PageArgs { page: 7 }).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_hydration_key_mismatch_falls_through() {
        let _guard = PHASE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        hydrate::set_phase(Phase::Client);

        let count = Arc::new(AtomicUsize::new(0));
        let fetcher = {
            let count = count.clone();
            Fetcher::new(
                Request::handler(move |args: PageArgs| {
                    count.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(page_items(args.page)) }
                }),
                FetchOptions::new()
                    .manual(true)
                    .hydration_id("mismatch-test"),
            )
            .unwrap()
        };

        // A record exists for different arguments; the load must not adopt
        // it.
        hydrate::publish(
            hydrate::hydration_key("mismatch-test", &json!({"page": 99})),
            json!(["stale"]),
        );
        fetcher.load(PageArgs { page: 1 }).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.data(), Some(page_items(1)));
        hydrate::consume(&hydrate::hydration_key("mismatch-test", &json!({"page": 99})));
    }
}
