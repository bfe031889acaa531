//! Render-service key strategy

use std::sync::Arc;

use async_trait::async_trait;

use super::error::AuthFailure;
use super::strategy::{AuthStrategy, Outcome, RequestScope};
use crate::clock::SharedClock;
use crate::constants::{ERR_INVALID_RENDER_KEY, RENDER_KEY_COOKIE};
use crate::store::RenderService;

/// Signs in the image renderer through the `renderKey` cookie
pub struct RenderKeyStrategy {
    renderer: Arc<dyn RenderService>,
    clock: SharedClock,
}

impl std::fmt::Debug for RenderKeyStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderKeyStrategy").finish_non_exhaustive()
    }
}

impl RenderKeyStrategy {
    #[must_use]
    pub fn new(renderer: Arc<dyn RenderService>, clock: SharedClock) -> Self {
        Self { renderer, clock }
    }
}

#[async_trait]
impl AuthStrategy for RenderKeyStrategy {
    fn name(&self) -> &'static str {
        "render_key"
    }

    async fn try_handle(&self, scope: &mut RequestScope<'_>) -> Outcome {
        let Some(key) = scope.cookie(RENDER_KEY_COOKIE) else {
            return Outcome::NotHandled;
        };

        let Some(user) = self.renderer.get_render_user(&key) else {
            tracing::debug!(strategy = self.name(), "Unknown or expired render key");
            return Outcome::Rejected(AuthFailure::unauthorized(ERR_INVALID_RENDER_KEY));
        };

        let now = self.clock.now();
        scope.context_mut().sign_in_renderer(&user, now);
        tracing::debug!(
            strategy = self.name(),
            user_id = user.user_id,
            org_id = user.org_id,
            "Render call authenticated"
        );
        Outcome::Handled
    }
}
