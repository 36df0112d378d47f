//! Configuration surface of a [`Fetcher`](crate::Fetcher).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use fetchlane_cache::{SlidingCache, DEFAULT_CACHE_TIME};
use fetchlane_core::{Error, Result, Transport};
use futures::future::BoxFuture;
use tokio::sync::watch;

/// Derives the parallel key for a set of call arguments.
pub type ParallelKeyFn<P> = Arc<dyn Fn(&P) -> String + Send + Sync>;

/// Asynchronous transform applied to successful response data before commit.
pub type ResultTransform<R> = Arc<dyn Fn(R) -> BoxFuture<'static, Result<R>> + Send + Sync>;

/// Side-effect hook fired with the raw call arguments before dispatch.
pub type BeforeHook<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Side-effect hook fired with the committed data and call arguments.
pub type SuccessHook<P, R> = Arc<dyn Fn(&R, &P) + Send + Sync>;

/// Side-effect hook fired with the captured error and call arguments.
pub type ErrorHook<P> = Arc<dyn Fn(&Error, &P) + Send + Sync>;

/// Side-effect hook fired with the raw call arguments after settlement.
pub type AfterHook<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Anti-flicker policy for the loading indicator, selected once per slot
/// from the sign of the configured millisecond value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelayPolicy {
    /// No special handling: `loading` flips directly at call start and
    /// settlement.
    #[default]
    Immediate,
    /// Loading shows at call start; a call settling sooner than this has its
    /// final commit postponed until the window has elapsed, so a spinner
    /// never flashes and disappears instantly.
    MinimumVisible(Duration),
    /// Loading is not shown at call start; a timer flips it on only if the
    /// call is still pending once the window elapses.
    Deferred(Duration),
}

impl DelayPolicy {
    /// Maps the signed millisecond configuration onto a policy.
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            0 => Self::Immediate,
            n if n > 0 => Self::MinimumVisible(Duration::from_millis(n as u64)),
            n => Self::Deferred(Duration::from_millis(n.unsigned_abs())),
        }
    }

    /// Whether `loading` becomes true at call start under this policy.
    pub(crate) fn shows_loading_at_start(&self) -> bool {
        !matches!(self, Self::Deferred(_))
    }
}

/// When a dependency signal should refresh the current slot.
///
/// The default only refreshes when no default parameters were configured;
/// callers that want dependency signals honored unconditionally opt into
/// [`DepRefreshPolicy::Always`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepRefreshPolicy {
    /// Skip the refresh when `default_params` are configured.
    #[default]
    SkipWithDefaultParams,
    /// Refresh on every signal.
    Always,
}

/// Options accepted by [`Fetcher::new`](crate::Fetcher::new).
///
/// Plain data with chainable setters; everything is optional.
pub struct FetchOptions<P, R> {
    /// Suppresses the automatic initial load.
    pub manual: bool,
    /// Arguments for the automatic initial load (and the dependency-refresh
    /// asymmetry, see [`DepRefreshPolicy`]).
    pub default_params: Option<P>,
    /// Derives the parallel key from call arguments; absent means a single
    /// slot under the default key.
    pub parallel_key: Option<ParallelKeyFn<P>>,
    /// External readiness condition deferring the first dispatch.
    pub ready: Option<watch::Receiver<bool>>,
    /// Change signal triggering a refresh of the current slot.
    pub refresh_deps: Option<watch::Receiver<u64>>,
    /// Policy applied to `refresh_deps` signals.
    pub dep_refresh: DepRefreshPolicy,
    /// Anti-flicker loading policy.
    pub delay_loading: DelayPolicy,
    /// Cache identity; empty or absent disables persistence.
    pub cache_id: Option<String>,
    /// Sliding expiry window for cache writes.
    pub cache_time: Duration,
    /// Cache instance override; the process-wide cache when absent.
    pub cache: Option<SlidingCache>,
    /// Registers loads into the server-evaluation pass when the process is
    /// in the server phase.
    pub ssr: bool,
    /// Identity under which server results hand off to the client.
    pub hydration_id: Option<String>,
    /// Transform applied to successful response data before commit.
    pub format_result: Option<ResultTransform<R>>,
    /// Fired with the raw arguments before dispatch, even when the call is
    /// deferred or served from hydration.
    pub on_before: Option<BeforeHook<P>>,
    /// Fired after a successful commit.
    pub on_success: Option<SuccessHook<P, R>>,
    /// Fired after a failure commit.
    pub on_error: Option<ErrorHook<P>>,
    /// Fired after every settlement, success or failure.
    pub on_after: Option<AfterHook<P>>,
    /// Transport backing URL-style requests.
    pub transport: Option<Arc<dyn Transport>>,
    /// Discards settlements of calls that are no longer the slot's newest
    /// dispatch instead of letting the last settlement win.
    pub discard_stale: bool,
}

impl<P, R> Default for FetchOptions<P, R> {
    fn default() -> Self {
        Self {
            manual: false,
            default_params: None,
            parallel_key: None,
            ready: None,
            refresh_deps: None,
            dep_refresh: DepRefreshPolicy::default(),
            delay_loading: DelayPolicy::default(),
            cache_id: None,
            cache_time: DEFAULT_CACHE_TIME,
            cache: None,
            ssr: false,
            hydration_id: None,
            format_result: None,
            on_before: None,
            on_success: None,
            on_error: None,
            on_after: None,
            transport: None,
            discard_stale: false,
        }
    }
}

impl<P, R> FetchOptions<P, R> {
    /// Creates the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppresses the automatic initial load.
    pub fn manual(mut self, manual: bool) -> Self {
        self.manual = manual;
        self
    }

    /// Sets the arguments of the automatic initial load.
    pub fn default_params(mut self, params: P) -> Self {
        self.default_params = Some(params);
        self
    }

    /// Derives parallel keys from call arguments.
    pub fn parallel_key(mut self, f: impl Fn(&P) -> String + Send + Sync + 'static) -> Self {
        self.parallel_key = Some(Arc::new(f));
        self
    }

    /// Defers the first dispatch until the condition becomes true.
    pub fn ready(mut self, ready: watch::Receiver<bool>) -> Self {
        self.ready = Some(ready);
        self
    }

    /// Refreshes the current slot when the signal changes.
    pub fn refresh_deps(mut self, deps: watch::Receiver<u64>) -> Self {
        self.refresh_deps = Some(deps);
        self
    }

    /// Overrides the dependency-refresh policy.
    pub fn dep_refresh(mut self, policy: DepRefreshPolicy) -> Self {
        self.dep_refresh = policy;
        self
    }

    /// Configures the anti-flicker policy from a signed millisecond value.
    pub fn delay_loading_millis(mut self, millis: i64) -> Self {
        self.delay_loading = DelayPolicy::from_millis(millis);
        self
    }

    /// Configures the anti-flicker policy directly.
    pub fn delay_loading(mut self, policy: DelayPolicy) -> Self {
        self.delay_loading = policy;
        self
    }

    /// Persists slot state under this cache identity.
    pub fn cache_id(mut self, cache_id: impl Into<String>) -> Self {
        self.cache_id = Some(cache_id.into());
        self
    }

    /// Overrides the sliding expiry window.
    pub fn cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    /// Persists into this cache instance instead of the process-wide one.
    pub fn cache(mut self, cache: SlidingCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Enables server-evaluation registration for this fetcher.
    pub fn ssr(mut self, ssr: bool) -> Self {
        self.ssr = ssr;
        self
    }

    /// Hands server results off to the client under this identity.
    pub fn hydration_id(mut self, hydration_id: impl Into<String>) -> Self {
        self.hydration_id = Some(hydration_id.into());
        self
    }

    /// Transforms successful response data before commit.
    pub fn format_result<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.format_result = Some(Arc::new(move |data| Box::pin(f(data))));
        self
    }

    /// Fires before dispatch with the raw arguments.
    pub fn on_before(mut self, hook: impl Fn(&P) + Send + Sync + 'static) -> Self {
        self.on_before = Some(Arc::new(hook));
        self
    }

    /// Fires after a successful commit.
    pub fn on_success(mut self, hook: impl Fn(&R, &P) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    /// Fires after a failure commit.
    pub fn on_error(mut self, hook: impl Fn(&Error, &P) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Fires after every settlement.
    pub fn on_after(mut self, hook: impl Fn(&P) + Send + Sync + 'static) -> Self {
        self.on_after = Some(Arc::new(hook));
        self
    }

    /// Backs URL-style requests with this transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Discards stale settlements instead of letting the last one win.
    ///
    /// Extension point over the documented last-settled-wins race; see the
    /// concurrency notes on [`Fetcher::load`](crate::Fetcher::load).
    pub fn discard_stale(mut self, discard_stale: bool) -> Self {
        self.discard_stale = discard_stale;
        self
    }

    /// The effective cache identity, if persistence is enabled.
    pub(crate) fn effective_cache_id(&self) -> Option<&str> {
        self.cache_id.as_deref().filter(|id| !id.is_empty())
    }
}

impl<P, R> std::fmt::Debug for FetchOptions<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOptions")
            .field("manual", &self.manual)
            .field("has_default_params", &self.default_params.is_some())
            .field("parallel", &self.parallel_key.is_some())
            .field("gated", &self.ready.is_some())
            .field("delay_loading", &self.delay_loading)
            .field("cache_id", &self.cache_id)
            .field("ssr", &self.ssr)
            .field("hydration_id", &self.hydration_id)
            .field("discard_stale", &self.discard_stale)
            .finish_non_exhaustive()
    }
}
