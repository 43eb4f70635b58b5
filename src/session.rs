//! Process-wide session state and its lifecycle
//!
//! The coordinator owns the single [`SessionState`] instance and is the only
//! component that talks to the remote authority. Login, OTP verification,
//! and refresh update the credential store and the in-memory state together;
//! there is no intermediate state where one is updated and the other is not.
//! `clear_session` is also the invalidation path used by the request
//! mediator on terminal refresh failure, so it touches no network and is
//! safe to call from a failure callback.

use crate::authority::Authority;
use crate::classify::{ErrorClassifier, REFRESH_ENDPOINT};
use crate::error::{ClassifiedError, ErrorKind};
use crate::store::CredentialStore;
use crate::token::TokenValidator;
use crate::types::{
    LoginRequest, PersistenceScope, Principal, RegisterRequest, RegisterResponse,
    ResendOtpRequest, ResendOtpResponse, SessionState, TokenPair, VerifyOtpRequest,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Coordinates session state, credential persistence, and authority calls
pub struct SessionCoordinator {
    authority: Arc<dyn Authority>,
    store: CredentialStore,
    state: Mutex<SessionState>,
}

impl SessionCoordinator {
    /// Create a coordinator over the given authority and credential store
    pub fn new(authority: Arc<dyn Authority>, store: CredentialStore) -> Self {
        Self {
            authority,
            store,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Rehydrate session state from storage at process start
    ///
    /// The stored session is trusted only if its access token still passes
    /// validation; anything stale is cleared instead.
    pub fn initialize(&self) {
        let principal = self.store.principal();
        let access_token = self.store.access_token();

        match (principal, access_token) {
            (Some(principal), Some(token)) if TokenValidator::is_valid(&token) => {
                tracing::debug!(user = %principal.id, "Rehydrated session from storage");
                let mut state = self.state();
                state.principal = Some(principal);
                state.authenticated = true;
            }
            _ => self.clear_session(),
        }
    }

    /// Authenticate with phone number and password
    ///
    /// `remember_me` selects the storage lifetime for the issued credentials.
    ///
    /// # Errors
    /// Returns a [`ClassifiedError`] describing the failure; the session is
    /// left unchanged.
    pub async fn login(
        &self,
        phone_number: &str,
        password: &str,
        remember_me: bool,
    ) -> Result<Principal, ClassifiedError> {
        let request = LoginRequest {
            phone_number: phone_number.to_string(),
            password: password.to_string(),
        };
        let response = self
            .authority
            .login(&request)
            .await
            .map_err(|failure| ErrorClassifier::classify(&failure, "/auth/login"))?;

        if !response.success {
            return Err(ClassifiedError::new(
                ErrorKind::Auth,
                "Login failed. Please check your credentials.",
            ));
        }

        let pair = token_pair_from(&response.access_token, &response.refresh_token);
        let scope = PersistenceScope::from_remember_me(remember_me);
        self.set_session(pair, response.user.clone(), scope);
        Ok(response.user)
    }

    /// Register a new account; the issued `user_id` feeds OTP verification
    ///
    /// # Errors
    /// Returns a [`ClassifiedError`] (typically `validation` with field
    /// errors) on rejection.
    pub async fn register(
        &self,
        request: &RegisterRequest,
    ) -> Result<RegisterResponse, ClassifiedError> {
        self.authority
            .register(request)
            .await
            .map_err(|failure| ErrorClassifier::classify(&failure, "/auth/register"))
    }

    /// Verify the OTP code sent at registration, establishing a session
    ///
    /// Credentials are persisted under the scope remembered from the login
    /// form's "remember me" choice.
    ///
    /// # Errors
    /// Returns a [`ClassifiedError`] on rejection; the session is left
    /// unchanged.
    pub async fn verify_otp(
        &self,
        user_id: &str,
        code: &str,
    ) -> Result<Principal, ClassifiedError> {
        let request = VerifyOtpRequest {
            user_id: user_id.to_string(),
            code: code.to_string(),
        };
        let response = self
            .authority
            .verify_otp(&request)
            .await
            .map_err(|failure| ErrorClassifier::classify(&failure, "/auth/verify-otp"))?;

        if !response.success {
            return Err(ClassifiedError::new(
                ErrorKind::Validation,
                "Verification failed. Please check the code and try again.",
            ));
        }

        let pair = token_pair_from(&response.access_token, &response.refresh_token);
        let scope = self.store.remembered_scope();
        self.set_session(pair, response.user.clone(), scope);
        Ok(response.user)
    }

    /// Request a new OTP code
    ///
    /// # Errors
    /// Returns a [`ClassifiedError`] on rejection.
    pub async fn resend_otp(&self, user_id: &str) -> Result<ResendOtpResponse, ClassifiedError> {
        let request = ResendOtpRequest {
            user_id: user_id.to_string(),
        };
        self.authority
            .resend_otp(&request)
            .await
            .map_err(|failure| ErrorClassifier::classify(&failure, "/auth/resend-otp"))
    }

    /// Exchange the stored refresh token for a new access token
    ///
    /// On success the renewed pair is persisted under the previously chosen
    /// scope and the new access token is returned. The caller (the request
    /// mediator) decides whether a failure invalidates the session.
    ///
    /// # Errors
    /// Returns an `auth`-kind error when no refresh token is stored, or the
    /// classified authority failure.
    pub async fn refresh(&self) -> Result<String, ClassifiedError> {
        let Some(refresh_token) = self.store.refresh_token() else {
            tracing::debug!("Refresh requested with no stored refresh token");
            return Err(ClassifiedError::session_invalid());
        };

        let response = self
            .authority
            .refresh(&refresh_token)
            .await
            .map_err(|failure| ErrorClassifier::classify(&failure, REFRESH_ENDPOINT))?;

        let pair = self
            .store
            .token_pair()
            .map(|pair| {
                let mut renewed = pair.with_access_token(response.access_token.as_str());
                renewed.expires_at = expiry_claim(&response.access_token);
                renewed
            })
            .unwrap_or_else(|| token_pair_from(&response.access_token, &refresh_token));

        self.store.save_token_pair(&pair, self.store.remembered_scope());
        tracing::debug!("Access token renewed");
        Ok(response.access_token)
    }

    /// End the session
    ///
    /// The authority is notified best-effort; a failed notification is
    /// logged and never blocks local clearing.
    pub async fn logout(&self) {
        if let Some(token) = self.store.access_token() {
            if let Err(failure) = self.authority.logout(&token).await {
                tracing::warn!(?failure, "Logout notification failed");
            }
        }
        self.clear_session();
    }

    /// Atomically persist credentials and update in-memory state
    pub fn set_session(&self, pair: TokenPair, principal: Principal, scope: PersistenceScope) {
        self.store.save_token_pair(&pair, scope);
        self.store.save_principal(&principal, scope);

        let mut state = self.state();
        state.principal = Some(principal);
        state.authenticated = true;
    }

    /// Drop all credentials and reset state to unauthenticated
    ///
    /// Idempotent and network-free; also the invalidation path invoked on
    /// terminal refresh failure.
    pub fn clear_session(&self) {
        self.store.clear_all();

        let mut state = self.state();
        state.principal = None;
        state.authenticated = false;
    }

    /// Replace the stored and in-memory principal (profile update)
    pub fn update_principal(&self, principal: Principal) {
        self.store
            .save_principal(&principal, self.store.remembered_scope());
        self.state().principal = Some(principal);
    }

    /// Currently authenticated principal, if any
    #[must_use]
    pub fn current_principal(&self) -> Option<Principal> {
        self.state().principal.clone()
    }

    /// Whether a session is currently established
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state().authenticated
    }

    /// Credential store shared with the mediator and guards
    #[must_use]
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }
}

/// Build a pair whose expiry mirrors the access token's `exp` claim
fn token_pair_from(access_token: &str, refresh_token: &str) -> TokenPair {
    let mut pair = TokenPair::new(access_token, refresh_token);
    pair.expires_at = expiry_claim(access_token);
    pair
}

fn expiry_claim(access_token: &str) -> Option<i64> {
    TokenValidator::decode(access_token).and_then(|claims| claims.exp)
}
