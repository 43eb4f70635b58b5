//! # HiveFund Session Layer
//!
//! Client-side session layer for the HiveFund API: transparently attaches
//! bearer credentials to outgoing requests, detects token expiry, and
//! coordinates renewal without duplicating refresh calls or losing in-flight
//! requests.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hivefund_session::{
//!     CredentialStore, HttpAuthority, HttpRequest, ReqwestDispatch,
//!     RequestAuthMediator, SessionConfig, SessionCoordinator,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::default();
//!     let store = CredentialStore::new(&config);
//!     let authority = Arc::new(HttpAuthority::new(config.clone())?);
//!     let session = Arc::new(SessionCoordinator::new(authority, store.clone()));
//!
//!     // Rehydrate a remembered session, if the stored token is still valid
//!     session.initialize();
//!     if !session.is_authenticated() {
//!         session.login("+263 77 000 0000", "password", true).await?;
//!     }
//!
//!     // All outbound calls go through the mediator
//!     let dispatch = Arc::new(ReqwestDispatch::new(&config)?);
//!     let mediator = RequestAuthMediator::new(dispatch, store, session, &config);
//!     let response = mediator
//!         .send(HttpRequest::get(config.endpoint("/wallet")))
//!         .await?;
//!     println!("wallet: {:?}", response.body);
//!     Ok(())
//! }
//! ```
//!
//! ## How it works
//!
//! Every request passes through [`RequestAuthMediator`], which consults
//! [`TokenValidator`] and [`CredentialStore`] to attach the current access
//! token. An HTTP 401 triggers the single-flight refresh protocol: exactly
//! one refresh call is issued no matter how many requests fail concurrently,
//! every failed request observes that refresh's outcome, and each one is
//! retried at most once with the renewed token. A terminal refresh failure
//! invalidates the session through [`SessionCoordinator::clear_session`].
//!
//! Credentials live in one of two [`CredentialStore`] media depending on the
//! "remember me" choice at login: a durable one that survives restarts or an
//! ephemeral in-process one. Reads prefer the durable tier.
//!
//! All failures surface as a [`ClassifiedError`] with a stable
//! [`ErrorKind`] - callers decide how to present each kind.

pub mod authority;
pub mod classify;
pub mod config;
pub mod error;
pub mod guard;
pub mod mediator;
pub mod session;
pub mod store;
pub mod token;
pub mod transport;
pub mod types;

pub use authority::{Authority, HttpAuthority};
pub use classify::ErrorClassifier;
pub use config::SessionConfig;
pub use error::{ClassifiedError, ErrorKind, RequestFailure, TransportError};
pub use guard::NavigationGuard;
pub use mediator::RequestAuthMediator;
pub use session::SessionCoordinator;
pub use store::{CredentialStore, FileMedium, MemoryMedium, StorageMedium};
pub use token::{TokenClaims, TokenValidator};
pub use transport::{Dispatch, HttpRequest, HttpResponse, Method, ReqwestDispatch};
pub use types::{
    AuthResponse, LoginRequest, PersistenceScope, Principal, RefreshRequest, RefreshResponse,
    RegisterRequest, RegisterResponse, ResendOtpRequest, ResendOtpResponse, SessionState,
    TokenPair, VerifyOtpRequest,
};
