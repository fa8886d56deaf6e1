//! Session manager — owns the authenticated connection to the platform.
//!
//! Every remote call goes through [`SessionManager::call`], which layers three
//! behaviors over the raw transport:
//!
//! 1. proactive re-authentication when the session is older than the
//!    configured cadence (platform sessions expire after a few hours, and a
//!    long polling loop must not die at the boundary);
//! 2. transparent re-authentication on a 401: one re-login and one retry of
//!    the original request, a second consecutive 401 surfaces [`AuthError`];
//! 3. the shared [`RetryPolicy`] for transient failures (network, 5xx, 429).
//!
//! Session state lives behind a single mutex carrying an auth epoch, so two
//! threads that observe an expired session at the same time produce one
//! login, not two — the second waits on the first and rides on its result.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::retry::{Retry, RetryFailure, RetryPolicy};
use crate::transport::{ApiRequest, ApiResponse, Transport, TransportError};

/// Login credentials. Consumed by the session manager; the Debug impl
/// deliberately omits the password.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Session-level configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Re-authenticate proactively once the session is this old.
    pub reauth_interval: Duration,
    /// Retry policy applied to every remote call.
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            // Platform sessions last about four hours; refresh well before.
            reauth_interval: Duration::from_secs(3 * 60 * 60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Authentication failures — fatal to the whole run.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("authentication endpoint unreachable: {0}")]
    Unreachable(String),
}

/// Failures surfaced by [`SessionManager::call`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("transient failures exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("transport error: {0}")]
    Transport(String),
}

struct SessionState {
    epoch: u64,
    authenticated_at: Instant,
}

/// Owns the authenticated session and wraps all outbound calls.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    config: SessionConfig,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("credentials", &self.credentials)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Authenticate eagerly and return a ready session manager.
    pub fn login(
        transport: Arc<dyn Transport>,
        credentials: Credentials,
        config: SessionConfig,
    ) -> Result<Self, AuthError> {
        let resp = transport
            .authenticate(&credentials)
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;
        if !resp.is_success() {
            return Err(AuthError::Rejected {
                status: resp.status,
                body: resp.body_excerpt(),
            });
        }

        Ok(Self {
            transport,
            credentials,
            config,
            state: Mutex::new(SessionState {
                epoch: 0,
                authenticated_at: Instant::now(),
            }),
        })
    }

    /// Execute a request with retry and transparent re-authentication.
    ///
    /// Returns `Ok` for any non-401 response the retry policy lets through;
    /// mapping remaining 4xx statuses to domain errors is the caller's job.
    pub fn call(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let epoch = self.refresh_if_stale()?;

        let first = self.execute_with_retry(request)?;
        if first.status != 401 {
            return Ok(first);
        }

        // Session expired mid-flight: one transparent re-login, one retry.
        self.reauthenticate(epoch)?;
        let second = self.execute_with_retry(request)?;
        if second.status == 401 {
            return Err(ApiError::Auth(AuthError::Rejected {
                status: 401,
                body: second.body_excerpt(),
            }));
        }
        Ok(second)
    }

    /// Proactive cadence check. Returns the epoch the caller observed, for
    /// the duplicate-login guard in [`Self::reauthenticate`].
    fn refresh_if_stale(&self) -> Result<u64, AuthError> {
        let (epoch, stale) = {
            let state = self.state.lock().unwrap();
            (
                state.epoch,
                state.authenticated_at.elapsed() >= self.config.reauth_interval,
            )
        };
        if stale {
            self.reauthenticate(epoch)?;
            return Ok(epoch + 1);
        }
        Ok(epoch)
    }

    /// Re-authenticate, unless another caller already did so since
    /// `observed_epoch` was read — then this is a no-op and the caller rides
    /// on that login.
    fn reauthenticate(&self, observed_epoch: u64) -> Result<(), AuthError> {
        let mut state = self.state.lock().unwrap();
        if state.epoch != observed_epoch {
            return Ok(());
        }

        let resp = self
            .transport
            .authenticate(&self.credentials)
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;
        if !resp.is_success() {
            return Err(AuthError::Rejected {
                status: resp.status,
                body: resp.body_excerpt(),
            });
        }

        state.epoch += 1;
        state.authenticated_at = Instant::now();
        Ok(())
    }

    fn execute_with_retry(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let outcome = self.config.retry.run(|_attempt| {
            match self.transport.execute(request) {
                Ok(resp) if resp.status == 429 || resp.status >= 500 => Err(Retry::Transient(
                    format!("HTTP {}: {}", resp.status, resp.body_excerpt()),
                )),
                Ok(resp) => Ok(resp),
                Err(TransportError::Network(e)) => Err(Retry::Transient(e)),
                Err(e) => Err(Retry::Fatal(e.to_string())),
            }
        });

        match outcome {
            Ok(resp) => Ok(resp),
            Err(RetryFailure::Fatal(e)) => Err(ApiError::Transport(e)),
            Err(RetryFailure::Exhausted { attempts, last }) => {
                Err(ApiError::RetriesExhausted { attempts, last })
            }
        }
    }
}
