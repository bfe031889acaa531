//! Deferred actions run just before a response leaves the middleware

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::response::Response;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Response extension telling the middleware the response is already on the
/// wire (for example an upgraded or streamed response); hooks are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseWritten;

/// Scoped callback invoked once at response finalization
#[async_trait]
pub trait FinalizeHook: Send {
    fn name(&self) -> &'static str;

    /// Called with the outgoing response headers
    async fn before_write(self: Box<Self>, headers: &mut HeaderMap);
}

/// Per-request registry of [`FinalizeHook`]s
///
/// Clones share the same registry. [`FinalizeHooks::run`] drains it, so hooks
/// run at most once even if `run` is called again.
#[derive(Clone, Default)]
pub struct FinalizeHooks {
    hooks: Arc<Mutex<Vec<Box<dyn FinalizeHook>>>>,
}

impl std::fmt::Debug for FinalizeHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&'static str> = self.hooks.lock().iter().map(|h| h.name()).collect();
        f.debug_struct("FinalizeHooks").field("hooks", &names).finish()
    }
}

impl FinalizeHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, hook: impl FinalizeHook + 'static) {
        self.hooks.lock().push(Box::new(hook));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.lock().is_empty()
    }

    /// Drain and run the registered hooks against `response`
    ///
    /// Returns how many hooks ran. Nothing runs when the response carries
    /// [`ResponseWritten`] or `cancel` has fired; the hooks are dropped either way.
    pub async fn run(&self, response: &mut Response, cancel: &CancellationToken) -> usize {
        let hooks = std::mem::take(&mut *self.hooks.lock());
        if hooks.is_empty() {
            return 0;
        }

        if response.extensions().get::<ResponseWritten>().is_some() {
            tracing::debug!(skipped = hooks.len(), "Response already written, skipping finalizers");
            return 0;
        }

        let mut ran = 0;
        for hook in hooks {
            if cancel.is_cancelled() {
                tracing::debug!(hook = hook.name(), "Request cancelled, skipping finalizer");
                continue;
            }
            hook.before_write(response.headers_mut()).await;
            ran += 1;
        }
        ran
    }
}
