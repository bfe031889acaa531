//! Session cookie serialization

use std::fmt::Write as _;
use std::time::Duration;

use axum::http::HeaderValue;

use crate::config::SessionConfig;

/// Build a `Set-Cookie` value for the login cookie
///
/// A `max_age` of zero expires the cookie immediately.
pub fn session_cookie(
    config: &SessionConfig,
    value: &str,
    max_age: Duration,
) -> Option<HeaderValue> {
    let mut cookie = format!(
        "{}={}; Path={}; Max-Age={}; HttpOnly",
        config.login_cookie_name,
        value,
        config.cookie_path,
        max_age.as_secs()
    );
    if config.cookie_secure {
        cookie.push_str("; Secure");
    }
    if let Some(same_site) = config.cookie_same_site.as_attribute() {
        let _ = write!(cookie, "; SameSite={same_site}");
    }

    match HeaderValue::from_str(&cookie) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(
                error = %e,
                cookie = %config.login_cookie_name,
                "Unable to encode session cookie"
            );
            None
        }
    }
}

/// Cookie that removes the login cookie from the browser
pub fn clear_session_cookie(config: &SessionConfig) -> Option<HeaderValue> {
    session_cookie(config, "", Duration::ZERO)
}
