//! Authenticated request mediation
//!
//! Every outbound request passes through [`RequestAuthMediator::send`]. The
//! mediator attaches the current access token when it is valid, reacts to
//! HTTP 401 responses by running the single-flight refresh protocol, replays
//! the failed request exactly once with the renewed token, and invalidates
//! the session when renewal is terminal.
//!
//! Concurrency model: the [`RefreshCoordinator`] gate is checked and set
//! under a synchronous lock that is never held across an await, so at most
//! one refresh call is in flight at any time. Requests that observe a 401
//! while a refresh is running enqueue a oneshot continuation and are resumed
//! in FIFO order with that refresh's outcome. The refresh itself runs on a
//! detached task: cancelling an individual request drops only its own
//! continuation, never the renewal other waiters depend on.

use crate::classify::{ErrorClassifier, REFRESH_ENDPOINT};
use crate::config::SessionConfig;
use crate::error::{ClassifiedError, RequestFailure};
use crate::session::SessionCoordinator;
use crate::store::CredentialStore;
use crate::token::TokenValidator;
use crate::transport::{Dispatch, HttpRequest, HttpResponse};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// Endpoints that bootstrap authentication and are sent without a token
const BOOTSTRAP_ENDPOINTS: &[&str] = &[
    "/auth/login",
    "/auth/register",
    "/auth/verify-otp",
    "/auth/resend-otp",
];

fn is_bootstrap_endpoint(url: &str) -> bool {
    BOOTSTRAP_ENDPOINTS.iter().any(|path| url.contains(path))
}

/// Outcome of one refresh cycle, delivered to every participant
#[derive(Debug, Clone)]
enum RefreshOutcome {
    /// A new access token was issued and persisted
    Renewed(String),
    /// The refresh call failed terminally
    Failed(ClassifiedError),
}

#[derive(Debug, Default)]
struct GateState {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// Single-flight gate for token renewal
///
/// Only `begin_or_join` and `settle` are exposed; the waiter queue is never
/// reachable from outside.
#[derive(Debug, Default)]
struct RefreshCoordinator {
    state: Mutex<GateState>,
}

impl RefreshCoordinator {
    /// Join the current refresh cycle, reporting whether the caller leads it
    ///
    /// The returned receiver resolves with the cycle's outcome. The flag
    /// check-and-set happens atomically under the lock, so exactly one
    /// caller per cycle observes `lead == true`.
    fn begin_or_join(&self) -> (bool, oneshot::Receiver<RefreshOutcome>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (tx, rx) = oneshot::channel();
        state.waiters.push(tx);
        let lead = !state.in_flight;
        state.in_flight = true;
        (lead, rx)
    }

    /// Clear the flag and resume all waiters in FIFO enqueue order
    ///
    /// Waiters whose request was cancelled have dropped their receiver; the
    /// failed send is ignored.
    fn settle(&self, outcome: &RefreshOutcome) {
        let waiters = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Interceptor that mediates token attachment and renewal for all requests
///
/// Collaborators are passed explicitly at construction; the mediator is
/// cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct RequestAuthMediator {
    dispatch: Arc<dyn Dispatch>,
    store: CredentialStore,
    session: Arc<SessionCoordinator>,
    gate: Arc<RefreshCoordinator>,
    refresh_buffer: Duration,
}

impl RequestAuthMediator {
    /// Create a mediator over the given transport, store, and session
    pub fn new(
        dispatch: Arc<dyn Dispatch>,
        store: CredentialStore,
        session: Arc<SessionCoordinator>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            dispatch,
            store,
            session,
            gate: Arc::new(RefreshCoordinator::default()),
            refresh_buffer: config.refresh_buffer,
        }
    }

    /// Send a request with token attachment and renewal handling
    ///
    /// # Errors
    /// Every failure surfaces as a [`ClassifiedError`]; only `auth`-kind
    /// failures are intercepted for refresh handling, all other kinds pass
    /// through classification unchanged.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClassifiedError> {
        // Bootstrap endpoints are sent bare and never enter the refresh
        // protocol
        if is_bootstrap_endpoint(&request.url) {
            let response = self.dispatch_once(&request, None).await?;
            return finish(response, &request.url);
        }

        let mut token = self.store.access_token().filter(|t| TokenValidator::is_valid(t));

        // Renew slightly before hard expiry instead of waiting for a 401. A
        // failed preemptive renewal is not terminal: the current token is
        // still valid, so the request proceeds with it.
        if let Some(current) = &token {
            if TokenValidator::should_preemptively_refresh(current, self.refresh_buffer) {
                tracing::debug!("Access token expires soon, renewing preemptively");
                match self.run_refresh_protocol().await {
                    RefreshOutcome::Renewed(renewed) => token = Some(renewed),
                    RefreshOutcome::Failed(err) => {
                        tracing::warn!(error = %err, "Preemptive renewal failed");
                    }
                }
            }
        }

        let response = self.dispatch_once(&request, token.as_deref()).await?;

        // The refresh call itself is never retried through the protocol
        if !response.is_auth_failure() || request.url.contains(REFRESH_ENDPOINT) {
            return finish(response, &request.url);
        }

        match self.run_refresh_protocol().await {
            RefreshOutcome::Renewed(renewed) => {
                let retry = self.dispatch_once(&request, Some(&renewed)).await?;
                if retry.is_auth_failure() {
                    // Retried at most once; a second rejection is terminal
                    self.session.clear_session();
                    return Err(ErrorClassifier::classify(
                        &RequestFailure::Response {
                            status: retry.status,
                            body: retry.body,
                        },
                        &request.url,
                    ));
                }
                finish(retry, &request.url)
            }
            RefreshOutcome::Failed(_) => {
                self.session.clear_session();
                Err(ClassifiedError::session_invalid())
            }
        }
    }

    /// Dispatch with an optional bearer credential, classifying transport
    /// failures
    async fn dispatch_once(
        &self,
        request: &HttpRequest,
        bearer: Option<&str>,
    ) -> Result<HttpResponse, ClassifiedError> {
        let outbound = match bearer {
            Some(token) => request.with_bearer(token),
            None => request.clone(),
        };
        self.dispatch
            .dispatch(outbound)
            .await
            .map_err(|err| {
                ErrorClassifier::classify(&RequestFailure::Transport(err), &request.url)
            })
    }

    /// Run or join the single-flight refresh cycle and await its outcome
    async fn run_refresh_protocol(&self) -> RefreshOutcome {
        let (lead, rx) = self.gate.begin_or_join();
        if lead {
            tracing::debug!("Leading token refresh");
            let session = Arc::clone(&self.session);
            let gate = Arc::clone(&self.gate);
            // Detached so that cancelling the leading request cannot abandon
            // the waiters
            tokio::spawn(async move {
                let outcome = match session.refresh().await {
                    Ok(token) => RefreshOutcome::Renewed(token),
                    Err(err) => RefreshOutcome::Failed(err),
                };
                gate.settle(&outcome);
            });
        }

        match rx.await {
            Ok(outcome) => outcome,
            // Settle task lost; treat as a failed cycle
            Err(_) => RefreshOutcome::Failed(ClassifiedError::session_invalid()),
        }
    }
}

/// Map a completed response to the caller's result
fn finish(response: HttpResponse, url: &str) -> Result<HttpResponse, ClassifiedError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ErrorClassifier::classify(
            &RequestFailure::Response {
                status: response.status,
                body: response.body,
            },
            url,
        ))
    }
}
