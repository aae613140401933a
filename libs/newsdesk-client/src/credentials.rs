use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Durable storage key for the raw bearer token
pub const TOKEN_STORAGE_KEY: &str = "token";

/// Name of the token cookie
pub const TOKEN_COOKIE_NAME: &str = "token";

/// Token cookie lifetime (7 days)
pub const TOKEN_COOKIE_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Sign-in location used for the forced-logout redirect
pub const SIGN_IN_PATH: &str = "/login";

/// Maximum length of the sanitized return path, in characters
pub const RETURN_PATH_MAX_CHARS: usize = 800;

/// Views that must never become a `return` target (prevents redirect loops)
const AUTH_VIEW_PREFIXES: &[&str] = &["/login", "/register", "/password-reset", "/verify-email"];

/// Durable client-side key-value storage.
///
/// In the browser this is backed by the page's persistent storage; on the
/// server and in tests an in-memory implementation is used. The credential
/// store is the sole writer of the `token` key.
pub trait ClientStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-memory [`ClientStorage`] implementation
#[derive(Default)]
pub struct MemoryStorage {
    map: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.map.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.map.write().insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.map.write().remove(key);
    }
}

/// Receives the rendered token cookie, or the instruction to drop it.
pub trait CookieSink: Send + Sync {
    /// Apply a rendered `Set-Cookie` value
    fn set(&self, cookie: &str);
    /// Drop the token cookie
    fn clear(&self);
}

/// In-memory [`CookieSink`] that records the last rendered cookie
#[derive(Default)]
pub struct MemoryCookieSink {
    last: RwLock<Option<String>>,
}

impl MemoryCookieSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently applied cookie, if any
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.last.read().clone()
    }
}

impl CookieSink for MemoryCookieSink {
    fn set(&self, cookie: &str) {
        *self.last.write() = Some(cookie.to_owned());
    }

    fn clear(&self) {
        *self.last.write() = None;
    }
}

/// Supplies the current browser location and performs external navigation.
pub trait Navigator: Send + Sync {
    /// Current navigation path (browser context), e.g. `/admin/articles/5`
    fn current_path(&self) -> Option<String>;
    /// Navigate to an external location (the sign-in redirect)
    fn redirect(&self, location: &str);
}

/// [`Navigator`] for contexts with no navigation surface (server, tests)
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn current_path(&self) -> Option<String> {
        None
    }

    fn redirect(&self, _location: &str) {}
}

/// Render the token cookie value: 7-day expiry, whole-site path, lax
/// same-site policy.
#[must_use]
fn render_token_cookie(token: &str) -> String {
    format!(
        "{TOKEN_COOKIE_NAME}={token}; Max-Age={}; Path=/; SameSite=Lax",
        TOKEN_COOKIE_MAX_AGE.as_secs()
    )
}

/// Sanitize a path for use as the `return` query parameter of the sign-in
/// redirect.
///
/// Accepts only same-origin absolute paths: exactly one leading `/`
/// (protocol-relative `//` is rejected), not an auth view itself, truncated
/// to [`RETURN_PATH_MAX_CHARS`] characters. Returns `None` when the path is
/// unusable, in which case no `return` parameter is appended.
#[must_use]
pub fn sanitize_return_path(path: &str) -> Option<String> {
    if !path.starts_with('/') || path.starts_with("//") {
        return None;
    }

    if AUTH_VIEW_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return None;
    }

    Some(path.chars().take(RETURN_PATH_MAX_CHARS).collect())
}

/// Build the sign-in redirect target, appending the sanitized return path
/// when one is available.
#[must_use]
pub fn sign_in_redirect(current_path: Option<&str>) -> String {
    match current_path.and_then(sanitize_return_path) {
        Some(path) => format!("{SIGN_IN_PATH}?return={}", urlencoding::encode(&path)),
        None => SIGN_IN_PATH.to_owned(),
    }
}

enum TokenState {
    /// Durable storage has not been consulted yet
    Unhydrated,
    /// In-memory value is authoritative
    Known(Option<String>),
}

/// Holds the bearer token and mirrors it into durable storage and the token
/// cookie. Exactly one instance exists per process/tab; it is the sole
/// writer of both sinks.
pub struct CredentialStore {
    state: RwLock<TokenState>,
    storage: Arc<dyn ClientStorage>,
    cookies: Arc<dyn CookieSink>,
}

impl CredentialStore {
    #[must_use]
    pub fn new(storage: Arc<dyn ClientStorage>, cookies: Arc<dyn CookieSink>) -> Self {
        Self {
            state: RwLock::new(TokenState::Unhydrated),
            storage,
            cookies,
        }
    }

    /// Current token.
    ///
    /// On first access the in-memory value is hydrated from durable storage,
    /// so a fresh page load recovers the token without an explicit load step.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        {
            let state = self.state.read();
            if let TokenState::Known(token) = &*state {
                return token.clone();
            }
        }

        let mut state = self.state.write();
        // Another caller may have hydrated while we waited for the lock
        if let TokenState::Known(token) = &*state {
            return token.clone();
        }

        let token = self.storage.get(TOKEN_STORAGE_KEY);
        *state = TokenState::Known(token.clone());
        token
    }

    /// Set or clear the token, updating both sinks.
    pub fn set_token(&self, token: Option<&str>) {
        match token {
            Some(token) => {
                self.storage.set(TOKEN_STORAGE_KEY, token);
                self.cookies.set(&render_token_cookie(token));
            }
            None => {
                self.storage.remove(TOKEN_STORAGE_KEY);
                self.cookies.clear();
            }
        }
        *self.state.write() = TokenState::Known(token.map(ToOwned::to_owned));
    }

    /// React to an authentication-failure response.
    ///
    /// When the current location is under a protected section, the token is
    /// cleared from every sink and the sign-in redirect target is returned
    /// for the caller to navigate to. Outside protected sections nothing
    /// happens (public pages tolerate anonymous API failures).
    #[must_use]
    pub fn handle_auth_failure(
        &self,
        current_path: Option<&str>,
        protected_prefixes: &[String],
    ) -> Option<String> {
        let path = current_path?;
        if !protected_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
            return None;
        }

        tracing::debug!(path, "authentication failure on protected path; signing out");
        self.set_token(None);
        Some(sign_in_redirect(Some(path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_sinks() -> (CredentialStore, Arc<MemoryStorage>, Arc<MemoryCookieSink>) {
        let storage = Arc::new(MemoryStorage::new());
        let cookies = Arc::new(MemoryCookieSink::new());
        let store = CredentialStore::new(storage.clone(), cookies.clone());
        (store, storage, cookies)
    }

    #[test]
    fn set_then_get_roundtrips() {
        let (store, storage, cookies) = store_with_sinks();
        store.set_token(Some("abc123"));

        assert_eq!(store.token().as_deref(), Some("abc123"));
        assert_eq!(storage.get(TOKEN_STORAGE_KEY).as_deref(), Some("abc123"));

        let cookie = cookies.current().expect("cookie should be set");
        assert!(cookie.starts_with("token=abc123;"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("SameSite=Lax"));
    }

    #[test]
    fn fresh_store_hydrates_from_durable_storage() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(TOKEN_STORAGE_KEY, "persisted-token");
        let store = CredentialStore::new(storage, Arc::new(MemoryCookieSink::new()));

        // No explicit load step: first access recovers the persisted value
        assert_eq!(store.token().as_deref(), Some("persisted-token"));
    }

    #[test]
    fn clearing_removes_both_sinks() {
        let (store, storage, cookies) = store_with_sinks();
        store.set_token(Some("abc123"));
        store.set_token(None);

        assert_eq!(store.token(), None);
        assert_eq!(storage.get(TOKEN_STORAGE_KEY), None);
        assert_eq!(cookies.current(), None);
    }

    #[test]
    fn hydration_happens_once() {
        let (store, storage, _) = store_with_sinks();
        assert_eq!(store.token(), None);

        // A later external write to storage is not observed: memory is
        // authoritative after hydration
        storage.set(TOKEN_STORAGE_KEY, "late-write");
        assert_eq!(store.token(), None);
    }

    #[test]
    fn sanitize_accepts_plain_paths() {
        assert_eq!(
            sanitize_return_path("/admin/articles/5").as_deref(),
            Some("/admin/articles/5")
        );
    }

    #[test]
    fn sanitize_rejects_protocol_relative() {
        assert_eq!(sanitize_return_path("//evil.example/phish"), None);
        assert_eq!(sanitize_return_path("https://evil.example"), None);
        assert_eq!(sanitize_return_path("admin"), None);
    }

    #[test]
    fn sanitize_rejects_auth_views() {
        assert_eq!(sanitize_return_path("/login"), None);
        assert_eq!(sanitize_return_path("/login?return=%2Fadmin"), None);
        assert_eq!(sanitize_return_path("/register"), None);
        assert_eq!(sanitize_return_path("/password-reset"), None);
        assert_eq!(sanitize_return_path("/verify-email/abc"), None);
    }

    #[test]
    fn sanitize_truncates_long_paths() {
        let long = format!("/admin/{}", "x".repeat(2000));
        let sanitized = sanitize_return_path(&long).expect("long path still valid");
        assert_eq!(sanitized.chars().count(), RETURN_PATH_MAX_CHARS);
    }

    #[test]
    fn redirect_encodes_return_path() {
        assert_eq!(
            sign_in_redirect(Some("/admin/articles/5")),
            "/login?return=%2Fadmin%2Farticles%2F5"
        );
        assert_eq!(sign_in_redirect(Some("/login")), "/login");
        assert_eq!(sign_in_redirect(None), "/login");
    }

    #[test]
    fn auth_failure_on_protected_path_clears_and_redirects() {
        let (store, storage, cookies) = store_with_sinks();
        store.set_token(Some("abc123"));

        let redirect = store
            .handle_auth_failure(Some("/admin/articles/5"), &["/admin".to_owned()])
            .expect("protected path should trigger sign-out");

        assert_eq!(redirect, "/login?return=%2Fadmin%2Farticles%2F5");
        assert_eq!(store.token(), None);
        assert_eq!(storage.get(TOKEN_STORAGE_KEY), None);
        assert_eq!(cookies.current(), None);
    }

    #[test]
    fn auth_failure_outside_protected_path_is_ignored() {
        let (store, _, _) = store_with_sinks();
        store.set_token(Some("abc123"));

        let redirect = store.handle_auth_failure(Some("/articles/5"), &["/admin".to_owned()]);
        assert_eq!(redirect, None);
        assert_eq!(store.token().as_deref(), Some("abc123"));
    }

    #[test]
    fn auth_failure_without_location_is_ignored() {
        let (store, _, _) = store_with_sinks();
        store.set_token(Some("abc123"));

        let redirect = store.handle_auth_failure(None, &["/admin".to_owned()]);
        assert_eq!(redirect, None);
        assert_eq!(store.token().as_deref(), Some("abc123"));
    }
}
