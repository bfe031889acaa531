//! Constants for the context handler

/// Default header carrying the requested organization id
pub const DEFAULT_ORG_ID_HEADER: &str = "X-Grafana-Org-Id";

/// Cookie carrying a render-service key
pub const RENDER_KEY_COOKIE: &str = "renderKey";

/// Default session cookie name
pub const DEFAULT_LOGIN_COOKIE_NAME: &str = "grafana_session";

/// Default auth proxy trust header
pub const DEFAULT_AUTH_PROXY_HEADER: &str = "X-WEBAUTH-USER";

/// Default organization assigned to anonymous users
pub const DEFAULT_ANONYMOUS_ORG_NAME: &str = "Main Org.";

/// Username that marks a basic-auth encoded API key
pub const API_KEY_BASIC_USERNAME: &str = "api_key";

/// Auth module recorded on users synced through the auth proxy
pub const AUTH_PROXY_MODULE: &str = "authproxy";

pub const ERR_INVALID_USERNAME_PASSWORD: &str = "Invalid username or password";
pub const ERR_INVALID_API_KEY: &str = "Invalid API key";
pub const ERR_EXPIRED_API_KEY: &str = "Expired API key";
pub const ERR_VALIDATING_API_KEY: &str = "Validating API key failed";
pub const ERR_INVALID_BASIC_HEADER: &str = "Invalid Basic Auth Header";
pub const ERR_INVALID_RENDER_KEY: &str = "Invalid Render Key";
pub const ERR_PROXY_AUTH_REQUIRED: &str = "Proxy authentication required";
pub const ERR_PROXY_LOGIN_FAILED: &str = "Failed to login as user specified in auth proxy header";
pub const ERR_PROXY_USER_LOOKUP: &str = "Failed to get the user";
pub const ERR_PROXY_CACHE_STORE: &str = "Failed to cache the user";
pub const ERR_UNAUTHORIZED: &str = "Unauthorized";
pub const ERR_FORBIDDEN: &str = "Permission denied";
