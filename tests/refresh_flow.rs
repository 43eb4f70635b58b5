//! End-to-end tests of the authenticated request flow
//!
//! A fake resource server (`FakeApi`) accepts exactly one bearer token and
//! answers 401 to everything else; a fake authority hands out renewed
//! tokens with a small delay so concurrent requests pile up on the refresh
//! gate deterministically under the single-threaded test runtime.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use futures::future::join_all;
use hivefund_session::{
    AuthResponse, Authority, CredentialStore, Dispatch, ErrorKind, HttpRequest, HttpResponse,
    LoginRequest, MemoryMedium, PersistenceScope, Principal, RefreshResponse, RegisterRequest,
    RegisterResponse, RequestAuthMediator, RequestFailure, ResendOtpRequest, ResendOtpResponse,
    SessionConfig, SessionCoordinator, TokenPair, TransportError, VerifyOtpRequest,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const API: &str = "https://api.test/api";

fn jwt(offset_secs: i64) -> String {
    jwt_labeled("user-1", offset_secs)
}

/// Token with a distinguishing `sub` claim, for tests that need two
/// different tokens carrying the same expiry
fn jwt_labeled(sub: &str, offset_secs: i64) -> String {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
        + offset_secs;
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{sub}","exp":{exp}}}"#));
    format!("{header}.{payload}.sig")
}

fn principal() -> Principal {
    Principal {
        id: "user-1".to_string(),
        name: "Rudo Moyo".to_string(),
        phone_number: "+263 77 000 0000".to_string(),
        email: None,
        verified: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// Resource server accepting exactly one bearer token
struct FakeApi {
    accepted_token: Mutex<String>,
    /// Bearer of every dispatched request, in dispatch order
    seen_bearers: Mutex<Vec<Option<String>>>,
}

impl FakeApi {
    fn accepting(token: &str) -> Arc<Self> {
        Arc::new(Self {
            accepted_token: Mutex::new(token.to_string()),
            seen_bearers: Mutex::new(Vec::new()),
        })
    }

    fn bearers(&self) -> Vec<Option<String>> {
        self.seen_bearers.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dispatch for FakeApi {
    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.seen_bearers.lock().unwrap().push(request.bearer.clone());
        let accepted = self.accepted_token.lock().unwrap().clone();
        if request.bearer.as_deref() == Some(accepted.as_str()) {
            Ok(HttpResponse {
                status: 200,
                body: Some(serde_json::json!({"ok": true})),
            })
        } else {
            Ok(HttpResponse { status: 401, body: None })
        }
    }
}

/// Authority whose refresh endpoint is scripted per test
struct FakeAuthority {
    /// `Ok(token)` to renew, `Err(status)` to fail the refresh call
    refresh_result: Result<String, u16>,
    refresh_delay: Duration,
    refresh_calls: AtomicUsize,
    login_tokens: Option<(String, String)>,
}

impl FakeAuthority {
    fn renewing(token: &str, delay: Duration) -> Self {
        Self {
            refresh_result: Ok(token.to_string()),
            refresh_delay: delay,
            refresh_calls: AtomicUsize::new(0),
            login_tokens: None,
        }
    }

    fn failing(status: u16) -> Self {
        Self {
            refresh_result: Err(status),
            refresh_delay: Duration::ZERO,
            refresh_calls: AtomicUsize::new(0),
            login_tokens: None,
        }
    }

    fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authority for FakeAuthority {
    async fn login(&self, _: &LoginRequest) -> Result<AuthResponse, RequestFailure> {
        let (access, refresh) = self
            .login_tokens
            .clone()
            .ok_or(RequestFailure::Response { status: 401, body: None })?;
        Ok(AuthResponse {
            success: true,
            access_token: access,
            refresh_token: refresh,
            user: principal(),
        })
    }

    async fn register(&self, _: &RegisterRequest) -> Result<RegisterResponse, RequestFailure> {
        Err(RequestFailure::Response { status: 400, body: None })
    }

    async fn verify_otp(&self, _: &VerifyOtpRequest) -> Result<AuthResponse, RequestFailure> {
        Err(RequestFailure::Response { status: 400, body: None })
    }

    async fn resend_otp(&self, _: &ResendOtpRequest) -> Result<ResendOtpResponse, RequestFailure> {
        Err(RequestFailure::Response { status: 400, body: None })
    }

    async fn refresh(&self, _: &str) -> Result<RefreshResponse, RequestFailure> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        match &self.refresh_result {
            Ok(token) => Ok(RefreshResponse { access_token: token.clone() }),
            Err(status) => Err(RequestFailure::Response { status: *status, body: None }),
        }
    }

    async fn logout(&self, _: &str) -> Result<(), RequestFailure> {
        Ok(())
    }
}

struct Harness {
    api: Arc<FakeApi>,
    authority: Arc<FakeAuthority>,
    session: Arc<SessionCoordinator>,
    mediator: RequestAuthMediator,
}

fn harness(api: Arc<FakeApi>, authority: FakeAuthority) -> Harness {
    let config = SessionConfig::builder().api_url(API).build();
    let store = CredentialStore::in_memory();
    let authority = Arc::new(authority);
    let session = Arc::new(SessionCoordinator::new(authority.clone(), store.clone()));
    let mediator = RequestAuthMediator::new(api.clone(), store, session.clone(), &config);
    Harness { api, authority, session, mediator }
}

fn establish_session(harness: &Harness, access_token: &str) {
    harness.session.set_session(
        TokenPair::new(access_token, "refresh-1"),
        principal(),
        PersistenceScope::Ephemeral,
    );
}

// ---------------------------------------------------------------------------
// Scenario A: valid token is attached, no refresh happens
// ---------------------------------------------------------------------------

#[tokio::test]
async fn valid_token_is_attached_without_refresh() {
    let token = jwt(3600);
    let h = harness(FakeApi::accepting(&token), FakeAuthority::failing(500));
    establish_session(&h, &token);

    let response = h.mediator.send(HttpRequest::get(format!("{API}/wallet"))).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(h.api.bearers(), vec![Some(token)]);
    assert_eq!(h.authority.refresh_calls(), 0);
}

// ---------------------------------------------------------------------------
// Scenario B: expired token, successful refresh, single retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn expired_token_is_renewed_and_request_retried_once() {
    let renewed = jwt(3600);
    let h = harness(
        FakeApi::accepting(&renewed),
        FakeAuthority::renewing(&renewed, Duration::ZERO),
    );
    establish_session(&h, &jwt(-60));

    let response = h.mediator.send(HttpRequest::get(format!("{API}/wallet"))).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body.unwrap()["ok"], true);
    assert_eq!(h.authority.refresh_calls(), 1);
    // Expired token must not be attached: first attempt bare, retry renewed
    assert_eq!(h.api.bearers(), vec![None, Some(renewed.clone())]);
    // Store now holds the renewed token alongside the original refresh token
    let pair = h.session.store().token_pair().unwrap();
    assert_eq!(pair.access_token, renewed);
    assert_eq!(pair.refresh_token, "refresh-1");
}

// ---------------------------------------------------------------------------
// Scenario C: refresh fails, session is invalidated
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_refresh_invalidates_session() {
    let h = harness(FakeApi::accepting(&jwt(3600)), FakeAuthority::failing(401));
    establish_session(&h, &jwt(-60));

    let err = h.mediator.send(HttpRequest::get(format!("{API}/wallet"))).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Auth);
    assert!(!h.session.is_authenticated());
    assert!(h.session.store().token_pair().is_none());
    assert!(h.session.current_principal().is_none());
}

// ---------------------------------------------------------------------------
// Scenario D / single-flight invariant
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_auth_failures_share_one_refresh() {
    let renewed = jwt_labeled("renewed", 3600);
    // Delay the refresh so all three requests observe their 401 and join the
    // same cycle before it settles
    let h = harness(
        FakeApi::accepting(&renewed),
        FakeAuthority::renewing(&renewed, Duration::from_millis(50)),
    );
    // A token the server has revoked: passes local validation, gets 401
    establish_session(&h, &jwt_labeled("revoked", 3600));

    let requests = (0..3).map(|i| h.mediator.send(HttpRequest::get(format!("{API}/circles/{i}"))));
    let results = join_all(requests).await;

    for result in results {
        assert_eq!(result.unwrap().status, 200);
    }
    assert_eq!(h.authority.refresh_calls(), 1);
    // All three were retried with the single renewed token
    let renewed_dispatches = h
        .api
        .bearers()
        .iter()
        .filter(|bearer| bearer.as_deref() == Some(renewed.as_str()))
        .count();
    assert_eq!(renewed_dispatches, 3);
}

#[tokio::test]
async fn concurrent_failures_observe_uniform_invalidation() {
    let mut authority = FakeAuthority::failing(401);
    authority.refresh_delay = Duration::from_millis(50);
    let h = harness(FakeApi::accepting(&jwt_labeled("accepted", 3600)), authority);
    establish_session(&h, &jwt_labeled("revoked", 3600));

    let requests = (0..3).map(|i| h.mediator.send(HttpRequest::get(format!("{API}/circles/{i}"))));
    let results = join_all(requests).await;

    for result in results {
        assert_eq!(result.unwrap_err().kind, ErrorKind::Auth);
    }
    assert_eq!(h.authority.refresh_calls(), 1);
    assert!(!h.session.is_authenticated());
}

// ---------------------------------------------------------------------------
// At-most-one-retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_auth_failure_is_terminal() {
    let renewed = jwt(3600);
    // Server rejects even the renewed token
    let h = harness(
        FakeApi::accepting("nothing-is-accepted"),
        FakeAuthority::renewing(&renewed, Duration::ZERO),
    );
    establish_session(&h, &jwt(3600));

    let err = h.mediator.send(HttpRequest::get(format!("{API}/wallet"))).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Auth);
    // Original attempt plus exactly one retry, one refresh, then terminal
    assert_eq!(h.api.bearers().len(), 2);
    assert_eq!(h.authority.refresh_calls(), 1);
    assert!(!h.session.is_authenticated());
}

// ---------------------------------------------------------------------------
// Scenario E: remember-me scope precedence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ephemeral_login_survives_durable_clear_only() {
    let access = jwt(3600);
    let durable = Arc::new(MemoryMedium::new());
    let ephemeral = Arc::new(MemoryMedium::new());
    let store = CredentialStore::with_media(durable.clone(), ephemeral.clone(), "hivefund_");

    let mut authority = FakeAuthority::failing(500);
    authority.login_tokens = Some((access.clone(), "refresh-1".to_string()));
    let session = SessionCoordinator::new(Arc::new(authority), store.clone());

    session.login("+263 77 000 0000", "secret", false).await.unwrap();
    assert_eq!(store.access_token(), Some(access.clone()));

    // Clearing the durable medium directly must not lose the session
    use hivefund_session::StorageMedium;
    durable.remove("hivefund_tokens");
    assert_eq!(store.access_token(), Some(access));

    ephemeral.remove("hivefund_tokens");
    assert!(store.token_pair().is_none());
}

// ---------------------------------------------------------------------------
// Non-auth failures pass through without refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_auth_failures_do_not_trigger_refresh() {
    struct NotFoundApi;

    #[async_trait]
    impl Dispatch for NotFoundApi {
        async fn dispatch(&self, _: HttpRequest) -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse {
                status: 404,
                body: Some(serde_json::json!({"message": "No such circle"})),
            })
        }
    }

    let config = SessionConfig::builder().api_url(API).build();
    let store = CredentialStore::in_memory();
    let authority = Arc::new(FakeAuthority::failing(500));
    let session = Arc::new(SessionCoordinator::new(authority.clone(), store.clone()));
    let mediator =
        RequestAuthMediator::new(Arc::new(NotFoundApi), store, session.clone(), &config);
    session.set_session(TokenPair::new(jwt(3600), "r1"), principal(), PersistenceScope::Ephemeral);

    let err = mediator.send(HttpRequest::get(format!("{API}/circles/9"))).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.message, "No such circle");
    assert_eq!(authority.refresh_calls(), 0);
    // The session stays intact
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn transport_failure_is_network_kind_and_skips_refresh() {
    struct DownApi;

    #[async_trait]
    impl Dispatch for DownApi {
        async fn dispatch(&self, _: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Timeout("30s elapsed".to_string()))
        }
    }

    let config = SessionConfig::builder().api_url(API).build();
    let store = CredentialStore::in_memory();
    let authority = Arc::new(FakeAuthority::failing(500));
    let session = Arc::new(SessionCoordinator::new(authority.clone(), store.clone()));
    let mediator = RequestAuthMediator::new(Arc::new(DownApi), store, session.clone(), &config);
    session.set_session(TokenPair::new(jwt(3600), "r1"), principal(), PersistenceScope::Ephemeral);

    let err = mediator.send(HttpRequest::get(format!("{API}/wallet"))).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(authority.refresh_calls(), 0);
    assert!(session.is_authenticated());
}

// ---------------------------------------------------------------------------
// Bootstrap endpoints bypass token handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bootstrap_endpoints_are_sent_bare() {
    let token = jwt(3600);
    let h = harness(FakeApi::accepting(&token), FakeAuthority::failing(500));
    establish_session(&h, &token);

    // The fake API 401s the bare request; that must surface directly as an
    // auth error without entering the refresh protocol
    let err = h
        .mediator
        .send(HttpRequest::post(
            format!("{API}/auth/login"),
            serde_json::json!({"phoneNumber": "+263", "password": "x"}),
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Auth);
    assert_eq!(h.api.bearers(), vec![None]);
    assert_eq!(h.authority.refresh_calls(), 0);
}

// ---------------------------------------------------------------------------
// Preemptive renewal
// ---------------------------------------------------------------------------

#[tokio::test]
async fn near_expiry_token_is_renewed_before_dispatch() {
    let renewed = jwt(3600);
    let h = harness(
        FakeApi::accepting(&renewed),
        FakeAuthority::renewing(&renewed, Duration::ZERO),
    );
    // Valid but inside the default five-minute refresh buffer
    establish_session(&h, &jwt(60));

    let response = h.mediator.send(HttpRequest::get(format!("{API}/wallet"))).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(h.authority.refresh_calls(), 1);
    // Renewed before dispatch: the old token never went over the wire
    assert_eq!(h.api.bearers(), vec![Some(renewed)]);
}

#[tokio::test]
async fn failed_preemptive_renewal_keeps_valid_session() {
    let current = jwt(60);
    let h = harness(FakeApi::accepting(&current), FakeAuthority::failing(503));
    establish_session(&h, &current);

    let response = h.mediator.send(HttpRequest::get(format!("{API}/wallet"))).await.unwrap();

    // The still-valid token carried the request; nothing was invalidated
    assert_eq!(response.status, 200);
    assert_eq!(h.authority.refresh_calls(), 1);
    assert!(h.session.is_authenticated());
    assert!(h.session.store().token_pair().is_some());
}

// ---------------------------------------------------------------------------
// Cancellation: a dropped request does not abandon the refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancelled_request_does_not_cancel_refresh() {
    let renewed = jwt_labeled("renewed", 3600);
    let h = harness(
        FakeApi::accepting(&renewed),
        FakeAuthority::renewing(&renewed, Duration::from_millis(50)),
    );
    establish_session(&h, &jwt_labeled("revoked", 3600));

    let mediator = h.mediator.clone();
    let first = tokio::spawn(async move {
        mediator.send(HttpRequest::get(format!("{API}/wallet"))).await
    });
    // Let the first request hit its 401 and lead the refresh, then drop it
    tokio::time::sleep(Duration::from_millis(10)).await;
    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());

    // The detached refresh still settles and persists the renewed token
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.authority.refresh_calls(), 1);
    assert_eq!(h.session.store().access_token(), Some(renewed.clone()));

    // A later request uses the renewed token without another refresh
    let response = h.mediator.send(HttpRequest::get(format!("{API}/wallet"))).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(h.authority.refresh_calls(), 1);
    assert_eq!(h.api.bearers().last().unwrap().as_deref(), Some(renewed.as_str()));
}
