//! Navigation guard for protected views
//!
//! Thin collaborator over the session coordinator: a navigation attempt to a
//! protected view is allowed only with an established session. A denied
//! attempt records the target URL so the presentation layer can resume there
//! after the next successful login. No valid session means denial - there is
//! no automatic login of any kind.

use crate::session::SessionCoordinator;
use crate::store::CredentialStore;
use std::sync::Arc;

/// Gate for navigation to protected views
#[derive(Clone)]
pub struct NavigationGuard {
    session: Arc<SessionCoordinator>,
    store: CredentialStore,
}

impl NavigationGuard {
    /// Guard backed by the given session coordinator
    pub fn new(session: Arc<SessionCoordinator>) -> Self {
        let store = session.store().clone();
        Self { session, store }
    }

    /// Whether navigation to `attempted_url` is allowed
    ///
    /// On denial the URL is stored as the pending redirect target; callers
    /// should then send the user to the login surface.
    #[must_use]
    pub fn allow(&self, attempted_url: &str) -> bool {
        if self.session.is_authenticated() {
            return true;
        }
        tracing::debug!(attempted_url, "Navigation denied, redirect recorded");
        self.store.set_pending_redirect(attempted_url);
        false
    }

    /// Where to resume after login, clearing the stored slot
    #[must_use]
    pub fn take_pending_redirect(&self) -> Option<String> {
        let url = self.store.pending_redirect();
        if url.is_some() {
            self.store.clear_pending_redirect();
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::Authority;
    use crate::error::RequestFailure;
    use crate::types::{
        AuthResponse, LoginRequest, RefreshResponse, RegisterRequest, RegisterResponse,
        ResendOtpRequest, ResendOtpResponse, VerifyOtpRequest,
    };
    use async_trait::async_trait;

    struct NoAuthority;

    #[async_trait]
    impl Authority for NoAuthority {
        async fn login(&self, _: &LoginRequest) -> Result<AuthResponse, RequestFailure> {
            Err(RequestFailure::Response { status: 401, body: None })
        }
        async fn register(&self, _: &RegisterRequest) -> Result<RegisterResponse, RequestFailure> {
            Err(RequestFailure::Response { status: 400, body: None })
        }
        async fn verify_otp(&self, _: &VerifyOtpRequest) -> Result<AuthResponse, RequestFailure> {
            Err(RequestFailure::Response { status: 400, body: None })
        }
        async fn resend_otp(
            &self,
            _: &ResendOtpRequest,
        ) -> Result<ResendOtpResponse, RequestFailure> {
            Err(RequestFailure::Response { status: 400, body: None })
        }
        async fn refresh(&self, _: &str) -> Result<RefreshResponse, RequestFailure> {
            Err(RequestFailure::Response { status: 401, body: None })
        }
        async fn logout(&self, _: &str) -> Result<(), RequestFailure> {
            Ok(())
        }
    }

    #[test]
    fn test_denied_navigation_records_redirect() {
        let session = Arc::new(SessionCoordinator::new(
            Arc::new(NoAuthority),
            crate::store::CredentialStore::in_memory(),
        ));
        let guard = NavigationGuard::new(Arc::clone(&session));

        assert!(!guard.allow("/circles/42"));
        assert_eq!(guard.take_pending_redirect().as_deref(), Some("/circles/42"));
        // Slot is single-use
        assert!(guard.take_pending_redirect().is_none());
    }
}
