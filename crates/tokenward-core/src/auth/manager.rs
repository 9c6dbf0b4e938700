//! Session token manager.
//!
//! Owns the credential store and the request executor, and drives login,
//! logout, authenticated dispatch and refresh-on-expiry. Expiry is never
//! predicted locally: a `401` from the service is the only signal.
//!
//! Each authenticated request follows a bounded two-step dispatch:
//!
//! ```text
//! Initial -> Sent -> {Success, NeedsRefresh, Failed}
//! NeedsRefresh -> RefreshAttempted -> {RetrySent -> {Success, Failed},
//!                                      RefreshFailed -> Failed(SessionExpired)}
//! ```
//!
//! Refresh is single-flight: while one refresh call is outstanding, every
//! other caller awaits the same shared future instead of spending the
//! refresh token again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::api::{Request, RequestExecutor, Response};
use crate::models::{
    Credential, LoginRequest, ProfileSummary, ProtectedMessage, RefreshRequest, RefreshResponse,
    RegisterRequest, TokenResponse, UserProfile,
};

use super::{CredentialStore, SessionError};

// ============================================================================
// Constants
// ============================================================================

pub const REGISTER_PATH: &str = "/auth/register";
pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const PROFILE_PATH: &str = "/auth/me";
pub const PROTECTED_PATH: &str = "/auth/protected";

const REGISTRATION_FAILED: &str = "Registration failed";
const LOGIN_FAILED: &str = "Login failed";

type RefreshFuture = Shared<BoxFuture<'static, Result<(), SessionError>>>;

/// An outstanding refresh and the refresh token it is spending
struct Flight {
    refresh_token: String,
    future: RefreshFuture,
}

/// What the refresh endpoint said, before it is applied to the store
enum RefreshOutcome {
    Renewed(String),
    Rejected { status: u16 },
}

struct Inner {
    store: Arc<dyn CredentialStore>,
    executor: Arc<dyn RequestExecutor>,
    /// Outstanding refresh, if any. Store writes made on behalf of a refresh
    /// happen while this lock is held, together with emptying the slot.
    in_flight: Mutex<Option<Flight>>,
}

/// Session handle shared by everything that issues authenticated calls.
/// Clone is cheap and clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn CredentialStore>, executor: Arc<dyn RequestExecutor>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                executor,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Optimistic local hint: an access token is stored. No network I/O.
    pub fn is_authenticated(&self) -> bool {
        self.inner.store.get().is_some()
    }

    // ===== Account =====

    /// Create an account. Does not log in.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<ProfileSummary, SessionError> {
        let request = Request::post(REGISTER_PATH).json(&RegisterRequest {
            email,
            username,
            password,
        })?;

        let response = self.inner.executor.send(&request).await?;
        if !response.is_success() {
            let reason = response
                .detail()
                .unwrap_or_else(|| REGISTRATION_FAILED.to_string());
            warn!(status = response.status().as_u16(), %reason, "Registration rejected");
            return Err(SessionError::Registration { reason });
        }

        info!(username, "Account registered");
        response.json()
    }

    /// Exchange an email/username and password for a credential and persist it.
    /// On failure any existing credential is left as it was.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Credential, SessionError> {
        let request = Request::post(LOGIN_PATH).json(&LoginRequest {
            email_or_username: identifier,
            password,
        })?;

        let response = self.inner.executor.send(&request).await?;
        if !response.is_success() {
            let reason = response.detail().unwrap_or_else(|| LOGIN_FAILED.to_string());
            warn!(status = response.status().as_u16(), %reason, "Login rejected");
            return Err(SessionError::Authentication { reason });
        }

        let tokens: TokenResponse = response.json()?;
        debug!(token_type = %tokens.token_type, expires_in = ?tokens.expires_in, "Tokens issued");
        let credential = tokens.into_credential();

        {
            let _guard = self.inner.lock_in_flight();
            self.inner.store.set(&credential)?;
        }

        info!(identifier, "Login successful");
        Ok(credential)
    }

    /// Revoke the refresh token (best effort) and always clear the store.
    /// Never fails; calling it without a session is a no-op.
    pub async fn logout(&self) {
        match self.inner.store.get() {
            Some(credential) => self.revoke(&credential.refresh_token).await,
            None => debug!("No session to revoke"),
        }

        let _guard = self.inner.lock_in_flight();
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear stored credentials");
        }
        info!("Logged out");
    }

    async fn revoke(&self, refresh_token: &str) {
        let request = match Request::post(LOGOUT_PATH).json(&RefreshRequest { refresh_token }) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Failed to build logout request");
                return;
            }
        };

        match self.inner.executor.send(&request).await {
            Ok(response) if response.is_success() => debug!("Refresh token revoked"),
            Ok(response) => {
                warn!(status = response.status().as_u16(), "Service refused logout, clearing locally")
            }
            Err(e) => warn!(error = %e, "Logout request failed, clearing locally"),
        }
    }

    // ===== Refresh =====

    /// Trade the refresh token for a new access token.
    ///
    /// Joins an outstanding refresh instead of starting another one. A
    /// rejected refresh token clears the store and yields `SessionExpired`.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let flight = {
            let mut slot = self.inner.lock_in_flight();
            let credential = self.inner.store.get().ok_or(SessionError::NoSession)?;
            Inner::join_or_start(&self.inner, &mut slot, credential)
        };
        flight.await
    }

    /// Refresh on behalf of a request whose `rejected` access token got a `401`.
    /// If the store already holds a different access token, a refresh has
    /// completed since that request was sent and no new call is needed.
    async fn refresh_after_rejection(&self, rejected: &str) -> Result<(), SessionError> {
        let flight = {
            let mut slot = self.inner.lock_in_flight();
            let current = self.inner.store.get();
            if current.as_ref().is_some_and(|c| c.access_token != rejected) {
                debug!("Access token already renewed, skipping refresh");
                return Ok(());
            }

            let current = current.ok_or(SessionError::SessionExpired)?;
            Inner::join_or_start(&self.inner, &mut slot, current)
        };
        flight.await
    }

    // ===== Authenticated requests =====

    /// Send `request` with the current access token attached.
    ///
    /// A `401` triggers exactly one refresh and one retry. The retry's own
    /// `401` is final and ends the session. Every other status is handed back
    /// to the caller as-is.
    pub async fn authenticated_request(&self, request: Request) -> Result<Response, SessionError> {
        let credential = self.inner.store.get().ok_or(SessionError::NoSession)?;
        let response = self.send_authorized(&request, &credential.access_token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(path = %request.path, "Access token rejected, refreshing");
        self.refresh_after_rejection(&credential.access_token).await?;

        let credential = self.inner.store.get().ok_or(SessionError::SessionExpired)?;
        let response = self.send_authorized(&request, &credential.access_token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(path = %request.path, "Renewed access token rejected, ending session");
            self.inner.discard(&credential);
            return Err(SessionError::SessionExpired);
        }

        Ok(response)
    }

    /// Profile of the logged-in user, fetched fresh every time
    pub async fn current_user(&self) -> Result<UserProfile, SessionError> {
        self.authenticated_request(Request::get(PROFILE_PATH))
            .await?
            .error_for_status()?
            .json()
    }

    /// Message from the service's protected demo route
    pub async fn protected_message(&self) -> Result<ProtectedMessage, SessionError> {
        self.authenticated_request(Request::get(PROTECTED_PATH))
            .await?
            .error_for_status()?
            .json()
    }

    async fn send_authorized(&self, request: &Request, access_token: &str) -> Result<Response, SessionError> {
        let request = request.with_bearer(access_token)?;
        Ok(self.inner.executor.send(&request).await?)
    }
}

impl Inner {
    fn lock_in_flight(&self) -> MutexGuard<'_, Option<Flight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the outstanding refresh if it is spending `credential`'s refresh
    /// token, otherwise start one for `credential`. A flight left over from a
    /// session that has since been replaced is never joined.
    fn join_or_start(
        inner: &Arc<Inner>,
        slot: &mut Option<Flight>,
        credential: Credential,
    ) -> RefreshFuture {
        if let Some(flight) = slot.as_ref() {
            if flight.refresh_token == credential.refresh_token {
                return flight.future.clone();
            }
            debug!("Outstanding refresh belongs to a replaced session, starting a new one");
        }

        let refresh_token = credential.refresh_token.clone();
        let future = Inner::start_refresh(Arc::clone(inner), credential);
        *slot = Some(Flight {
            refresh_token,
            future: future.clone(),
        });
        future
    }

    /// Build the shared refresh future for `credential`. The caller stores it
    /// in the slot; the future empties the slot when it finishes, unless a
    /// newer flight has taken its place.
    fn start_refresh(inner: Arc<Inner>, credential: Credential) -> RefreshFuture {
        async move {
            debug!("Refreshing access token");
            let outcome = inner.exchange(&credential.refresh_token).await;

            let mut slot = inner.lock_in_flight();
            let result = inner.apply_refresh(&credential, outcome);
            if slot
                .as_ref()
                .is_some_and(|f| f.refresh_token == credential.refresh_token)
            {
                *slot = None;
            }
            result
        }
        .boxed()
        .shared()
    }

    async fn exchange(&self, refresh_token: &str) -> Result<RefreshOutcome, SessionError> {
        let request = Request::post(REFRESH_PATH).json(&RefreshRequest { refresh_token })?;
        let response = self.executor.send(&request).await?;
        if !response.is_success() {
            return Ok(RefreshOutcome::Rejected {
                status: response.status().as_u16(),
            });
        }
        let renewed: RefreshResponse = response.json()?;
        Ok(RefreshOutcome::Renewed(renewed.access_token))
    }

    /// Apply a refresh result to the store. Must run with the in-flight lock held.
    ///
    /// `used` is the credential the refresh was started from. If the session
    /// changed in the meantime (logout, or a fresh login) the result is not
    /// written over it.
    fn apply_refresh(
        &self,
        used: &Credential,
        outcome: Result<RefreshOutcome, SessionError>,
    ) -> Result<(), SessionError> {
        let current = self.store.get();
        let unchanged = current
            .as_ref()
            .is_some_and(|c| c.refresh_token == used.refresh_token);

        match outcome {
            Ok(RefreshOutcome::Renewed(access_token)) => {
                if !unchanged {
                    debug!("Session changed during refresh, discarding renewed token");
                    return match current {
                        Some(_) => Ok(()),
                        None => Err(SessionError::SessionExpired),
                    };
                }
                self.store.set(&used.with_access_token(access_token))?;
                info!("Access token refreshed");
                Ok(())
            }
            Ok(RefreshOutcome::Rejected { status }) => {
                warn!(status, "Refresh token rejected, session expired");
                if unchanged {
                    if let Err(e) = self.store.clear() {
                        warn!(error = %e, "Failed to clear stored credentials");
                    }
                }
                Err(SessionError::SessionExpired)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                Err(e)
            }
        }
    }

    /// Clear the store if it still holds `credential`
    fn discard(&self, credential: &Credential) {
        let _guard = self.lock_in_flight();
        if self.store.get().as_ref() == Some(credential) {
            if let Err(e) = self.store.clear() {
                warn!(error = %e, "Failed to clear stored credentials");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use reqwest::{header, Method};
    use serde_json::{json, Value};

    use super::*;
    use crate::api::TransportError;
    use crate::auth::MemoryStore;

    /// In-process stand-in for the authentication service
    struct FakeService {
        state: Mutex<FakeState>,
        calls: Mutex<Vec<Call>>,
    }

    struct FakeState {
        valid_access: String,
        refresh_token: String,
        next_access: String,
        refresh_delay: Duration,
        refresh_transport_error: bool,
        logout_fails: bool,
        reject_every_access: bool,
        profile_status: Option<u16>,
    }

    #[derive(Debug, Clone)]
    struct Call {
        method: Method,
        path: String,
        authorization: Option<String>,
    }

    impl FakeService {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(FakeState {
                    valid_access: "A1".to_string(),
                    refresh_token: "R1".to_string(),
                    next_access: "A2".to_string(),
                    refresh_delay: Duration::ZERO,
                    refresh_transport_error: false,
                    logout_fails: false,
                    reject_every_access: false,
                    profile_status: None,
                }),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn configure(&self, f: impl FnOnce(&mut FakeState)) {
            f(&mut self.state.lock().unwrap());
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_to(&self, path: &str) -> Vec<Call> {
            self.calls().into_iter().filter(|c| c.path == path).collect()
        }
    }

    fn reply(status: u16, body: Value) -> Response {
        Response::new(StatusCode::from_u16(status).unwrap(), body.to_string())
    }

    #[async_trait]
    impl RequestExecutor for FakeService {
        async fn send(&self, request: &Request) -> Result<Response, TransportError> {
            let authorization = request
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            self.calls.lock().unwrap().push(Call {
                method: request.method.clone(),
                path: request.path.clone(),
                authorization: authorization.clone(),
            });

            let body: Value = request
                .body
                .as_deref()
                .map(|b| serde_json::from_slice(b).unwrap())
                .unwrap_or(Value::Null);

            match request.path.as_str() {
                REGISTER_PATH => {
                    if body["username"] == "taken" {
                        Ok(reply(400, json!({"detail": "Username already exists"})))
                    } else {
                        Ok(reply(201, json!({"message": "Registration successful", "user_id": "u-1"})))
                    }
                }
                LOGIN_PATH => {
                    if body["password"] == "correct" {
                        Ok(reply(200, json!({
                            "access_token": "A1",
                            "refresh_token": "R1",
                            "token_type": "Bearer",
                            "expires_in": 900
                        })))
                    } else {
                        Ok(reply(401, json!({"detail": "Invalid credentials"})))
                    }
                }
                REFRESH_PATH => {
                    let (delay, transport_error) = {
                        let state = self.state.lock().unwrap();
                        (state.refresh_delay, state.refresh_transport_error)
                    };
                    tokio::time::sleep(delay).await;
                    if transport_error {
                        return Err(TransportError::Timeout("refresh timed out".into()));
                    }
                    let mut state = self.state.lock().unwrap();
                    if body["refresh_token"] == state.refresh_token.as_str() {
                        state.valid_access = state.next_access.clone();
                        Ok(reply(200, json!({"access_token": state.next_access})))
                    } else {
                        Ok(reply(401, json!({"detail": "Invalid refresh token"})))
                    }
                }
                LOGOUT_PATH => {
                    if self.state.lock().unwrap().logout_fails {
                        Err(TransportError::Unreachable("connection refused".into()))
                    } else {
                        Ok(reply(200, json!({"message": "Logged out"})))
                    }
                }
                path => {
                    let state = self.state.lock().unwrap();
                    let expected = format!("Bearer {}", state.valid_access);
                    if state.reject_every_access || authorization.as_deref() != Some(expected.as_str()) {
                        return Ok(reply(401, json!({"detail": "Token expired"})));
                    }
                    if path == PROFILE_PATH {
                        if let Some(status) = state.profile_status {
                            return Ok(reply(status, json!({"detail": "boom"})));
                        }
                        return Ok(reply(200, json!({
                            "user_id": "u-1",
                            "email": "alice@example.com",
                            "username": "alice",
                            "is_verified": true
                        })));
                    }
                    Ok(reply(200, json!({"path": path})))
                }
            }
        }
    }

    fn manager_with(service: &Arc<FakeService>, credential: Option<Credential>) -> (SessionManager, Arc<MemoryStore>) {
        let store = Arc::new(match credential {
            Some(credential) => MemoryStore::with_credential(credential),
            None => MemoryStore::new(),
        });
        let manager = SessionManager::new(store.clone(), service.clone());
        (manager, store)
    }

    // -------------------------------------------------------------------------
    // Login / register / logout
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_login_persists_both_tokens() {
        let service = FakeService::new();
        let (manager, store) = manager_with(&service, None);

        let credential = manager.login("alice", "correct").await.unwrap();

        assert_eq!(credential, Credential::new("A1", "R1"));
        assert!(manager.is_authenticated());
        assert_eq!(store.get(), Some(Credential::new("A1", "R1")));
    }

    #[tokio::test]
    async fn test_login_failure_keeps_prior_credential() {
        let service = FakeService::new();
        let (manager, store) = manager_with(&service, Some(Credential::new("old-a", "old-r")));

        let err = manager.login("alice", "wrong").await.unwrap_err();

        assert_eq!(err, SessionError::Authentication { reason: "Invalid credentials".into() });
        assert_eq!(store.get(), Some(Credential::new("old-a", "old-r")));
    }

    #[tokio::test]
    async fn test_register_reports_service_reason() {
        let service = FakeService::new();
        let (manager, store) = manager_with(&service, None);

        let err = manager.register("a@example.com", "taken", "long-enough-pw").await.unwrap_err();
        assert_eq!(err, SessionError::Registration { reason: "Username already exists".into() });

        let summary = manager.register("a@example.com", "alice", "long-enough-pw").await.unwrap();
        assert_eq!(summary.user_id.as_deref(), Some("u-1"));
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_revoke_fails() {
        let service = FakeService::new();
        service.configure(|s| s.logout_fails = true);
        let (manager, _store) = manager_with(&service, Some(Credential::new("A1", "R1")));

        manager.logout().await;

        assert!(!manager.is_authenticated());
        assert_eq!(service.calls_to(LOGOUT_PATH).len(), 1);
    }

    #[tokio::test]
    async fn test_logout_twice_is_safe() {
        let service = FakeService::new();
        let (manager, _store) = manager_with(&service, Some(Credential::new("A1", "R1")));

        manager.logout().await;
        manager.logout().await;

        assert!(!manager.is_authenticated());
        // The second call had no refresh token and so made no network call
        assert_eq!(service.calls_to(LOGOUT_PATH).len(), 1);
    }

    // -------------------------------------------------------------------------
    // Refresh
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_refresh_without_session_makes_no_call() {
        let service = FakeService::new();
        let (manager, _store) = manager_with(&service, None);

        assert_eq!(manager.refresh().await, Err(SessionError::NoSession));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_replaces_only_access_token() {
        let service = FakeService::new();
        let (manager, store) = manager_with(&service, Some(Credential::new("A1", "R1")));

        manager.refresh().await.unwrap();

        assert_eq!(store.get(), Some(Credential::new("A2", "R1")));
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_session() {
        let service = FakeService::new();
        let (manager, store) = manager_with(&service, Some(Credential::new("A1", "revoked")));

        assert_eq!(manager.refresh().await, Err(SessionError::SessionExpired));
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_refresh_transport_error_keeps_credential() {
        let service = FakeService::new();
        service.configure(|s| s.refresh_transport_error = true);
        let (manager, store) = manager_with(&service, Some(Credential::new("A1", "R1")));

        let err = manager.refresh().await.unwrap_err();

        assert!(matches!(err, SessionError::Transport(TransportError::Timeout(_))));
        assert_eq!(store.get(), Some(Credential::new("A1", "R1")));
    }

    #[tokio::test]
    async fn test_logout_during_refresh_is_not_undone() {
        let service = FakeService::new();
        service.configure(|s| s.refresh_delay = Duration::from_millis(50));
        let (manager, store) = manager_with(&service, Some(Credential::new("A1", "R1")));

        let (refreshed, ()) = tokio::join!(manager.refresh(), manager.logout());

        assert_eq!(refreshed, Err(SessionError::SessionExpired));
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_new_session_does_not_join_old_refresh() {
        let service = FakeService::new();
        service.configure(|s| {
            s.refresh_delay = Duration::from_millis(100);
            s.valid_access = "expired".to_string();
            s.refresh_token = "R9".to_string();
            s.next_access = "A10".to_string();
        });
        let (manager, store) = manager_with(&service, Some(Credential::new("A1", "R1")));

        let new_session = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            store.set(&Credential::new("A9", "R9")).unwrap();
            manager.authenticated_request(Request::get("/orders")).await
        };
        let (old_refresh, response) = tokio::join!(manager.refresh(), new_session);

        assert_eq!(old_refresh, Err(SessionError::SessionExpired));
        assert!(response.unwrap().is_success());
        assert_eq!(store.get(), Some(Credential::new("A10", "R9")));
        assert_eq!(service.calls_to(REFRESH_PATH).len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_after_relogin_starts_its_own_flight() {
        let service = FakeService::new();
        service.configure(|s| {
            s.refresh_delay = Duration::from_millis(100);
            s.refresh_token = "R9".to_string();
            s.next_access = "A10".to_string();
        });
        let (manager, store) = manager_with(&service, Some(Credential::new("A1", "R1")));

        let new_session = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            store.set(&Credential::new("A9", "R9")).unwrap();
            manager.refresh().await
        };
        let (old_refresh, new_refresh) = tokio::join!(manager.refresh(), new_session);

        assert_eq!(old_refresh, Err(SessionError::SessionExpired));
        assert_eq!(new_refresh, Ok(()));
        assert_eq!(store.get(), Some(Credential::new("A10", "R9")));
    }

    #[tokio::test]
    async fn test_stale_rejection_skips_refresh() {
        let service = FakeService::new();
        let (manager, _store) = manager_with(&service, Some(Credential::new("A1", "R1")));
        manager.refresh().await.unwrap();

        // A request that was sent with A1 before the refresh landed
        manager.refresh_after_rejection("A1").await.unwrap();

        assert_eq!(service.calls_to(REFRESH_PATH).len(), 1);
    }

    // -------------------------------------------------------------------------
    // Authenticated dispatch
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_authenticated_request_without_session() {
        let service = FakeService::new();
        let (manager, _store) = manager_with(&service, None);

        let err = manager.authenticated_request(Request::get("/orders")).await.unwrap_err();

        assert_eq!(err, SessionError::NoSession);
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_authenticated_request_attaches_bearer() {
        let service = FakeService::new();
        let (manager, _store) = manager_with(&service, None);
        manager.login("alice", "correct").await.unwrap();

        let response = manager.authenticated_request(Request::get("/orders")).await.unwrap();

        assert!(response.is_success());
        let orders = service.calls_to("/orders");
        assert_eq!(orders[0].authorization.as_deref(), Some("Bearer A1"));
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_retried() {
        let service = FakeService::new();
        let (manager, store) = manager_with(&service, Some(Credential::new("A0", "R1")));
        service.configure(|s| s.valid_access = "A-expired-elsewhere".into());

        let response = manager.authenticated_request(Request::get("/orders")).await.unwrap();

        assert!(response.is_success());
        let orders = service.calls_to("/orders");
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].authorization.as_deref(), Some("Bearer A0"));
        assert_eq!(orders[1].authorization.as_deref(), Some("Bearer A2"));
        assert_eq!(service.calls_to(REFRESH_PATH).len(), 1);
        assert_eq!(store.get(), Some(Credential::new("A2", "R1")));
    }

    #[tokio::test]
    async fn test_current_user_refreshes_once() {
        let service = FakeService::new();
        service.configure(|s| s.valid_access = "nothing-yet".into());
        let (manager, _store) = manager_with(&service, Some(Credential::new("A1", "R1")));

        let profile = manager.current_user().await.unwrap();

        assert_eq!(profile.username, "alice");
        assert_eq!(service.calls_to(REFRESH_PATH).len(), 1);
        assert_eq!(service.calls_to(PROFILE_PATH).len(), 2);
    }

    #[tokio::test]
    async fn test_second_unauthorized_is_terminal() {
        let service = FakeService::new();
        service.configure(|s| s.reject_every_access = true);
        let (manager, store) = manager_with(&service, Some(Credential::new("A1", "R1")));

        let err = manager.current_user().await.unwrap_err();

        assert_eq!(err, SessionError::SessionExpired);
        assert_eq!(service.calls_to(REFRESH_PATH).len(), 1);
        assert_eq!(service.calls_to(PROFILE_PATH).len(), 2);
        assert!(store.get().is_none());
    }

    #[tokio::test]
    async fn test_current_user_with_rejected_refresh_token() {
        let service = FakeService::new();
        service.configure(|s| s.valid_access = "nothing-yet".into());
        let (manager, store) = manager_with(&service, Some(Credential::new("A1", "revoked")));

        let err = manager.current_user().await.unwrap_err();

        assert_eq!(err, SessionError::SessionExpired);
        assert!(store.get().is_none());
        assert_eq!(service.calls_to(PROFILE_PATH).len(), 1);
    }

    #[tokio::test]
    async fn test_current_user_other_status_is_request_error() {
        let service = FakeService::new();
        service.configure(|s| s.profile_status = Some(500));
        let (manager, store) = manager_with(&service, Some(Credential::new("A1", "R1")));

        let err = manager.current_user().await.unwrap_err();

        assert!(matches!(err, SessionError::Request { status: 500, .. }));
        assert!(service.calls_to(REFRESH_PATH).is_empty());
        assert!(store.get().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_rejections_share_one_refresh() {
        let service = FakeService::new();
        service.configure(|s| {
            s.valid_access = "not-A1".into();
            s.refresh_delay = Duration::from_millis(50);
        });
        let (manager, store) = manager_with(&service, Some(Credential::new("A1", "R1")));

        let (first, second) = tokio::join!(
            manager.authenticated_request(Request::get("/orders")),
            manager.authenticated_request(Request::get("/invoices")),
        );

        assert!(first.unwrap().is_success());
        assert!(second.unwrap().is_success());
        assert_eq!(service.calls_to(REFRESH_PATH).len(), 1);

        for path in ["/orders", "/invoices"] {
            let calls = service.calls_to(path);
            assert_eq!(calls.len(), 2);
            assert_eq!(calls[1].authorization.as_deref(), Some("Bearer A2"));
        }
        assert_eq!(store.get(), Some(Credential::new("A2", "R1")));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_calls_are_single_flight() {
        let service = FakeService::new();
        service.configure(|s| s.refresh_delay = Duration::from_millis(50));
        let (manager, _store) = manager_with(&service, Some(Credential::new("A1", "R1")));
        let other = manager.clone();

        let (a, b, c) = tokio::join!(manager.refresh(), other.refresh(), manager.refresh());

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(service.calls_to(REFRESH_PATH).len(), 1);
        assert!(service.calls().iter().all(|call| call.method == Method::POST));
    }
}
