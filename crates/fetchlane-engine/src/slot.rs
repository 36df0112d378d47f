//! One request slot: the load/success/error/mutate lifecycle of a single
//! parallel lane.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use fetchlane_cache::SlidingCache;
use fetchlane_core::{emptiness, Error, FetchData, FetchParams, Invoker, RequestState};
use fetchlane_hydrate::{self as hydrate, Phase};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::options::{DelayPolicy, FetchOptions};

/// Tracing target for slot operations.
pub const TRACING_TARGET: &str = "fetchlane_engine::slot";

pub(crate) struct SlotInner<P, R> {
    key: String,
    state: watch::Sender<RequestState<P, R>>,
    invoker: Arc<Invoker<P, R>>,
    options: Arc<FetchOptions<P, R>>,
    cache: SlidingCache,
    delay_timer: Mutex<Option<AbortHandle>>,
    generation: AtomicU64,
}

/// State plus behavior for one parallel key.
///
/// Slots are created lazily by the store, live as long as it does, and are
/// the only writers of their state.
pub(crate) struct Slot<P, R> {
    inner: Arc<SlotInner<P, R>>,
}

impl<P, R> Clone for Slot<P, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P, R> Slot<P, R>
where
    P: FetchParams,
    R: FetchData,
{
    pub(crate) fn new(
        key: String,
        invoker: Arc<Invoker<P, R>>,
        options: Arc<FetchOptions<P, R>>,
        cache: SlidingCache,
    ) -> Self {
        Self::with_state(key, invoker, options, cache, RequestState::default())
    }

    /// Creates a slot pre-seeded from a persisted cache sub-entry.
    pub(crate) fn from_serialized(
        key: String,
        invoker: Arc<Invoker<P, R>>,
        options: Arc<FetchOptions<P, R>>,
        cache: SlidingCache,
        serialized: &fetchlane_core::SerializedState,
    ) -> Self {
        let state = RequestState::deserialize(serialized);
        tracing::debug!(
            target: TRACING_TARGET,
            key = %key,
            has_data = state.data.is_some(),
            "Slot seeded from cache"
        );
        Self::with_state(key, invoker, options, cache, state)
    }

    fn with_state(
        key: String,
        invoker: Arc<Invoker<P, R>>,
        options: Arc<FetchOptions<P, R>>,
        cache: SlidingCache,
        state: RequestState<P, R>,
    ) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            inner: Arc::new(SlotInner {
                key,
                state,
                invoker,
                options,
                cache,
                delay_timer: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<RequestState<P, R>> {
        self.inner.state.subscribe()
    }

    pub(crate) fn state(&self) -> RequestState<P, R> {
        self.inner.state.borrow().clone()
    }

    /// Applies a transition and persists the result.
    ///
    /// Every commit, including mutations, writes through to the cache when a
    /// cache identity is configured.
    fn commit(&self, transition: impl FnOnce(&mut RequestState<P, R>)) {
        self.inner.state.send_modify(transition);
        self.persist();
    }

    fn persist(&self) {
        let Some(cache_id) = self.inner.options.effective_cache_id() else {
            return;
        };
        let snapshot = self.inner.state.borrow().clone();
        let Some(serialized) = snapshot.serialize() else {
            return;
        };
        self.inner.cache.update(
            cache_id,
            serialized,
            self.inner.options.cache_time,
            &self.inner.key,
        );
    }

    /// Runs one load through the full lifecycle.
    ///
    /// Never fails from the caller's point of view; failures are captured
    /// into state. See the store for the concurrency caveats of overlapping
    /// calls on one slot.
    pub(crate) async fn load(&self, args: P) {
        let options = &self.inner.options;
        if let Some(hook) = &options.on_before {
            hook(&args);
        }

        if options.ssr && hydrate::phase() == Phase::Server {
            let slot = self.clone();
            let args = args.clone();
            hydrate::register_server_load(Box::pin(async move {
                let value = slot.run_network(args.clone()).await;
                let options = &slot.inner.options;
                let (Some(identity), Some(value)) = (&options.hydration_id, value) else {
                    return;
                };
                match serde_json::to_value(&args) {
                    Ok(params) => {
                        hydrate::publish(hydrate::hydration_key(identity, &params), value);
                    }
                    Err(err) => tracing::warn!(
                        target: TRACING_TARGET,
                        error = %err,
                        "Params are not serializable, skipping hydration publish"
                    ),
                }
            }));
            tracing::debug!(
                target: TRACING_TARGET,
                key = %self.inner.key,
                "Load registered for the server-evaluation pass"
            );
            return;
        }

        if let Some(identity) = &options.hydration_id {
            if hydrate::phase() == Phase::Client && self.adopt_hydrated(identity, &args) {
                return;
            }
        }

        self.run_network(args).await;
    }

    /// Adopts a pending hydration record, if one matches the arguments.
    ///
    /// Adoption sets `params` and `data` (and recomputes `nothing`) without
    /// touching `loading`/`error`; the record is deleted either way once
    /// read.
    fn adopt_hydrated(&self, identity: &str, args: &P) -> bool {
        let Ok(params) = serde_json::to_value(args) else {
            return false;
        };
        let key = hydrate::hydration_key(identity, &params);
        let Some(value) = hydrate::consume(&key) else {
            return false;
        };
        let nothing = emptiness::is_nothing(&value);
        match serde_json::from_value::<R>(value) {
            Ok(data) => {
                let args = args.clone();
                self.commit(move |state| {
                    state.params = Some(args);
                    state.data = Some(data);
                    state.nothing = nothing;
                });
                tracing::debug!(
                    target: TRACING_TARGET,
                    key = %self.inner.key,
                    "Hydration record adopted, network call skipped"
                );
                true
            }
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    key = %self.inner.key,
                    error = %err,
                    "Hydration record does not deserialize, falling back to the network"
                );
                false
            }
        }
    }

    /// The network path: dispatch, delay policy, settlement, hooks.
    ///
    /// Returns the serialized response data on success, for hydration
    /// publishing.
    pub(crate) async fn run_network(&self, args: P) -> Option<Value> {
        let options = self.inner.options.clone();
        let policy = options.delay_loading;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        {
            let args = args.clone();
            self.commit(move |state| {
                state.loading = policy.shows_loading_at_start();
                state.params = Some(args);
                state.error = None;
            });
        }

        if let DelayPolicy::Deferred(delay) = policy {
            self.arm_deferred_timer(delay);
        }

        let outcome = self.inner.invoker.invoke(args.clone()).await;
        let outcome = match (outcome, &options.format_result) {
            (Ok(data), Some(transform)) => transform(data).await,
            (outcome, _) => outcome,
        };

        let published = match outcome {
            Ok(data) => {
                let value = match serde_json::to_value(&data) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        tracing::warn!(
                            target: TRACING_TARGET,
                            key = %self.inner.key,
                            error = %err,
                            "Response data is not serializable"
                        );
                        None
                    }
                };
                let nothing = value.as_ref().map(emptiness::is_nothing).unwrap_or(false);

                if let DelayPolicy::MinimumVisible(min) = policy {
                    let elapsed = started.elapsed();
                    if elapsed < min {
                        tokio::time::sleep(min - elapsed).await;
                    }
                }

                if self.is_stale(generation) {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        key = %self.inner.key,
                        "Stale settlement discarded"
                    );
                    None
                } else {
                    let committed = data.clone();
                    self.commit(move |state| {
                        state.data = Some(committed);
                        state.nothing = nothing;
                        state.loading = false;
                        state.error = None;
                    });
                    if let Some(hook) = &options.on_success {
                        hook(&data, &args);
                    }
                    value
                }
            }
            Err(err) => {
                if self.is_stale(generation) {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        key = %self.inner.key,
                        "Stale failure discarded"
                    );
                } else {
                    let err = Arc::new(informative(err));
                    let committed = err.clone();
                    self.commit(move |state| {
                        state.data = None;
                        state.nothing = false;
                        state.loading = false;
                        state.error = Some(committed);
                    });
                    tracing::debug!(
                        target: TRACING_TARGET,
                        key = %self.inner.key,
                        error = %err,
                        "Load settled with error"
                    );
                    if let Some(hook) = &options.on_error {
                        hook(&err, &args);
                    }
                }
                None
            }
        };

        if let Some(timer) = self.inner.delay_timer.lock().unwrap().take() {
            timer.abort();
        }
        if let Some(hook) = &options.on_after {
            hook(&args);
        }
        published
    }

    fn arm_deferred_timer(&self, delay: std::time::Duration) {
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            tracing::debug!(
                target: TRACING_TARGET,
                key = %inner.key,
                "Deferred loading window elapsed, showing indicator"
            );
            let slot = Slot { inner };
            slot.commit(|state| state.loading = true);
        })
        .abort_handle();

        if let Some(previous) = self.inner.delay_timer.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.inner.options.discard_stale
            && generation != self.inner.generation.load(Ordering::SeqCst)
    }

    /// Replaces the slot data in place, leaving `loading`/`error` untouched.
    pub(crate) fn mutate(&self, value: R) {
        self.commit(move |state| state.data = Some(value));
    }

    /// Derives new slot data from the current value.
    pub(crate) fn mutate_with(&self, f: impl FnOnce(Option<R>) -> Option<R>) {
        self.commit(move |state| state.data = f(state.data.take()));
    }

    /// Re-runs the last load; a no-op when nothing was dispatched yet.
    pub(crate) async fn refresh(&self) {
        let params = self.inner.state.borrow().params.clone();
        match params {
            Some(args) => self.load(args).await,
            None => tracing::trace!(
                target: TRACING_TARGET,
                key = %self.inner.key,
                "Refresh skipped, no recorded params"
            ),
        }
    }
}

/// Failures always commit an informative error: a bare kind with neither
/// message nor source gets a sentinel message attached.
fn informative(err: Error) -> Error {
    if err.message.is_none() && err.source.is_none() {
        err.with_message("request failed")
    } else {
        err
    }
}
