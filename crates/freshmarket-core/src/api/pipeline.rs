//! Request pipeline that keeps API calls authenticated.
//!
//! Every authenticated request passes two stages:
//! 1. the credential attacher adds the stored access token as a bearer
//!    credential;
//! 2. the refresh stage catches a 401, exchanges the refresh token for a
//!    new access token, and re-issues the request exactly once.
//!
//! If the exchange fails, both tokens are erased and a
//! `SessionEvent::LoginRequired` is published before the refresh error is
//! returned to the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::json;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::auth::{SessionEvent, TokenStore};
use crate::models::RefreshedToken;

use super::transport::{ApiRequest, ApiResponse, HttpTransport};
use super::ApiError;

/// Token refresh endpoint, relative to the API base URL
pub const REFRESH_PATH: &str = "auth/refresh/";

/// Capacity of the session event channel
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Attach the stored access token, if any, as the request's bearer credential.
pub fn attach_credentials(request: &ApiRequest, tokens: &dyn TokenStore) -> ApiRequest {
    let mut request = request.clone();
    match tokens.access_token() {
        Ok(Some(token)) => request.bearer = Some(token),
        Ok(None) => request.bearer = None,
        Err(e) => {
            warn!(error = %e, "Failed to read access token, sending request unauthenticated");
            request.bearer = None;
        }
    }
    request
}

/// Outcome of the most recent refresh, kept for requests that waited on it
#[derive(Default)]
struct RefreshState {
    last_failure: Option<ApiError>,
}

pub struct RequestPipeline {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenStore>,
    events: broadcast::Sender<SessionEvent>,
    // Bumped under `refresh_state` each time a refresh settles
    refresh_generation: AtomicU64,
    // Held for the duration of a refresh exchange so concurrent 401s coalesce
    refresh_state: Mutex<RefreshState>,
}

impl RequestPipeline {
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: Arc<dyn TokenStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transport,
            tokens,
            events,
            refresh_generation: AtomicU64::new(0),
            refresh_state: Mutex::new(RefreshState::default()),
        }
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Send an authenticated request, refreshing the access token once on 401.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let generation = self.refresh_generation.load(Ordering::Acquire);
        let authenticated = attach_credentials(request, self.tokens.as_ref());

        match self.send_checked(&authenticated).await {
            Err(err) if err.is_unauthorized() => {
                debug!(path = %request.path, "Request unauthorized, refreshing access token");
                let access = self
                    .refresh_access_token(authenticated.bearer.as_deref(), generation)
                    .await?;
                let retried = request.clone().with_bearer(access);
                // A second failure, 401 included, goes straight to the caller
                self.send_checked(&retried).await
            }
            other => other,
        }
    }

    /// Send a request without credentials or refresh handling.
    pub async fn execute_public(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.send_checked(request).await
    }

    async fn send_checked(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let response = self.transport.send(request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            debug!(path = %request.path, status = response.status(), "Request failed");
            Err(ApiError::from_status(response.status(), response.body()))
        }
    }

    /// Obtain a fresh access token for a request rejected while carrying `stale`.
    ///
    /// `generation` is the refresh generation observed before the request was
    /// sent. If a refresh settled since then, its outcome is reused.
    async fn refresh_access_token(
        &self,
        stale: Option<&str>,
        generation: u64,
    ) -> Result<String, ApiError> {
        let mut state = self.refresh_state.lock().await;

        if self.refresh_generation.load(Ordering::Acquire) != generation {
            if let Some(ref failure) = state.last_failure {
                debug!("Concurrent token refresh failed, reusing its error");
                return Err(failure.replay());
            }
        }

        // Another request may have refreshed while this one waited for the lock
        match self.tokens.access_token() {
            Ok(Some(current)) if Some(current.as_str()) != stale => {
                debug!("Access token already refreshed by a concurrent request");
                return Ok(current);
            }
            Ok(_) => {}
            Err(e) => return Err(self.fail_refresh(&mut state, e.into())),
        }

        match self.exchange_refresh_token().await {
            Ok(access) => {
                info!("Access token refreshed");
                state.last_failure = None;
                self.refresh_generation.fetch_add(1, Ordering::AcqRel);
                self.publish(SessionEvent::TokenRefreshed);
                Ok(access)
            }
            Err(err) => Err(self.fail_refresh(&mut state, err)),
        }
    }

    /// Drop the session after an unrecoverable refresh and record why.
    fn fail_refresh(&self, state: &mut RefreshState, err: ApiError) -> ApiError {
        warn!(error = %err, "Token refresh failed, login required");
        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "Failed to clear stored tokens");
        }
        state.last_failure = Some(err.replay());
        self.refresh_generation.fetch_add(1, Ordering::AcqRel);
        self.publish(SessionEvent::LoginRequired);
        err
    }

    async fn exchange_refresh_token(&self) -> Result<String, ApiError> {
        let refresh = self
            .tokens
            .refresh_token()?
            .ok_or(ApiError::NoRefreshToken)?;

        let request = ApiRequest::post(REFRESH_PATH, json!({ "refresh": refresh }));
        let response = self.send_checked(&request).await?;
        let renewed: RefreshedToken = response.json()?;

        self.tokens.set_access_token(&renewed.access)?;
        if let Some(ref rotated) = renewed.refresh {
            self.tokens.set_refresh_token(rotated)?;
        }
        Ok(renewed.access)
    }
}
