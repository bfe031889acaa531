//! Render keys handed to the image renderer

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::clock::SharedClock;
use crate::helpers::random_token;
use crate::types::RenderUser;

const RENDER_KEY_LENGTH: usize = 32;

/// Resolves render keys to the user the renderer acts as
pub trait RenderService: Send + Sync {
    fn get_render_user(&self, key: &str) -> Option<RenderUser>;
}

/// Short-lived render keys kept in memory
#[derive(Debug, Clone)]
pub struct InMemoryRenderKeys {
    keys: Arc<RwLock<HashMap<String, (RenderUser, DateTime<Utc>)>>>,
    clock: SharedClock,
    ttl: Duration,
}

impl InMemoryRenderKeys {
    #[must_use]
    pub fn new(clock: SharedClock, ttl: Duration) -> Self {
        Self {
            keys: Arc::new(RwLock::new(HashMap::new())),
            clock,
            ttl,
        }
    }

    /// Issue a key for `user`, valid for the configured ttl
    pub fn issue(&self, user: RenderUser) -> String {
        let key = random_token(RENDER_KEY_LENGTH);
        let expires_at = self.clock.now() + self.ttl;
        let mut keys = self.keys.write();
        keys.retain(|_, (_, exp)| *exp > self.clock.now());
        keys.insert(key.clone(), (user, expires_at));
        key
    }

    pub fn revoke(&self, key: &str) -> bool {
        self.keys.write().remove(key).is_some()
    }
}

impl RenderService for InMemoryRenderKeys {
    fn get_render_user(&self, key: &str) -> Option<RenderUser> {
        let now = self.clock.now();
        self.keys
            .read()
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(user, _)| user.clone())
    }
}
