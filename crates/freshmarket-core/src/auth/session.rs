use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::config::Config;
use crate::models::{Credentials, ProfileUpdate, RegisterRequest, User};

use super::TokenStore;

/// Fallback message when a failed login carries no `detail`
const LOGIN_FAILED: &str = "Login failed";

/// Fallback message when a failed registration carries no field message
const REGISTRATION_FAILED: &str = "Registration failed";

/// Session transitions published to interested front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new access token was minted from the refresh token
    TokenRefreshed,
    /// The refresh token was rejected; the user must sign in again
    LoginRequired,
    LoggedIn,
    LoggedOut,
}

/// Result of a login or registration attempt. Failures carry a message fit
/// for showing inline next to the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    Failed(String),
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AuthOutcome::Success => None,
            AuthOutcome::Failed(message) => Some(message),
        }
    }
}

/// Owns the signed-in identity and mediates every session transition.
///
/// Operations take `&mut self`, so a caller cannot start a second login
/// while one is still in flight.
pub struct SessionManager {
    api: ApiClient,
    user: Option<User>,
    loading: bool,
    error: Option<String>,
}

impl SessionManager {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            user: None,
            loading: true,
            error: None,
        }
    }

    /// Build the session context for the configured API and token storage
    pub fn from_config(config: &Config) -> Result<Self> {
        let tokens = config.token_store()?;
        let api = ApiClient::from_config(config, tokens)?;
        Ok(Self::new(api))
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// True until `initialize` has run
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Message of the last failed login or registration
    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.api.pipeline().subscribe()
    }

    fn tokens(&self) -> &Arc<dyn TokenStore> {
        self.api.tokens()
    }

    fn clear_tokens(&self) {
        if let Err(e) = self.tokens().clear() {
            warn!(error = %e, "Failed to clear stored tokens");
        }
    }

    /// Restore the session from a stored access token, if there is one.
    ///
    /// Any failure to fetch the profile clears the stored tokens; the
    /// session then simply starts signed out.
    pub async fn initialize(&mut self) {
        let has_token = match self.tokens().access_token() {
            Ok(token) => token.is_some(),
            Err(e) => {
                warn!(error = %e, "Failed to read stored access token");
                false
            }
        };

        if has_token {
            match self.api.get_profile().await {
                Ok(user) => {
                    info!(user_id = user.id, "Session restored");
                    self.user = Some(user);
                }
                Err(e) => {
                    warn!(error = %e, "Stored session rejected, clearing tokens");
                    self.clear_tokens();
                    self.user = None;
                }
            }
        } else {
            debug!("No stored access token");
        }

        self.loading = false;
    }

    pub async fn login(&mut self, credentials: &Credentials) -> AuthOutcome {
        self.error = None;

        match self.sign_in(credentials).await {
            Ok(user) => {
                info!(user_id = user.id, "Login successful");
                self.user = Some(user);
                self.api.pipeline().publish(SessionEvent::LoggedIn);
                AuthOutcome::Success
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                let message = e.detail().unwrap_or_else(|| LOGIN_FAILED.to_string());
                self.error = Some(message.clone());
                AuthOutcome::Failed(message)
            }
        }
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<User, ApiError> {
        let pair = self.api.login(credentials).await?;
        self.tokens().store_pair(&pair)?;

        match self.api.get_profile().await {
            Ok(user) => Ok(user),
            Err(e) => {
                // Tokens without a profile are not a session
                self.clear_tokens();
                Err(e)
            }
        }
    }

    /// Create an account, then sign in with the new credentials.
    pub async fn register(&mut self, data: &RegisterRequest) -> AuthOutcome {
        self.error = None;

        if let Err(e) = self.api.register(data).await {
            warn!(error = %e, "Registration failed");
            let message = e
                .first_field_message()
                .unwrap_or_else(|| REGISTRATION_FAILED.to_string());
            self.error = Some(message.clone());
            return AuthOutcome::Failed(message);
        }

        info!(name = %data.name, "Account registered");
        self.login(&data.credentials()).await
    }

    /// Forget the tokens and the identity. Purely local.
    pub fn logout(&mut self) {
        self.clear_tokens();
        self.user = None;
        self.api.pipeline().publish(SessionEvent::LoggedOut);
        info!("Logged out");
    }

    /// Apply a partial profile update and keep the returned profile.
    ///
    /// An empty update sends nothing; the held profile is kept, or fetched
    /// if there is none yet.
    pub async fn update_profile(&mut self, update: &ProfileUpdate) -> Result<&User, ApiError> {
        let user = if update.is_empty() {
            debug!("Empty profile update, nothing to send");
            match self.user.take() {
                Some(user) => user,
                None => self.api.get_profile().await?,
            }
        } else {
            self.api.update_profile(update).await?
        };
        Ok(self.user.insert(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::pipeline::REFRESH_PATH;
    use crate::api::transport::mock::MockTransport;
    use crate::api::transport::Method;
    use crate::api::RequestPipeline;
    use crate::auth::MemoryTokenStore;
    use crate::models::{CredentialPair, UserRole};
    use serde_json::json;

    const LOGIN: &str = "auth/login/";
    const REGISTER: &str = "auth/register/";
    const PROFILE: &str = "auth/profile/";

    fn session_with(
        transport: &Arc<MockTransport>,
        tokens: &Arc<MemoryTokenStore>,
    ) -> SessionManager {
        let pipeline = RequestPipeline::new(transport.clone(), tokens.clone());
        SessionManager::new(ApiClient::new(Arc::new(pipeline)))
    }

    fn stored(access: &str, refresh: &str) -> Arc<MemoryTokenStore> {
        Arc::new(MemoryTokenStore::with_pair(&CredentialPair {
            access: access.to_string(),
            refresh: refresh.to_string(),
        }))
    }

    fn assert_signed_out(session: &SessionManager, tokens: &MemoryTokenStore) {
        assert!(session.user().is_none());
        assert_eq!(tokens.access_token().unwrap(), None);
        assert_eq!(tokens.refresh_token().unwrap(), None);
    }

    #[tokio::test]
    async fn test_initialize_without_tokens_makes_no_request() {
        let transport = Arc::new(MockTransport::new());
        let tokens = Arc::new(MemoryTokenStore::new());
        let mut session = session_with(&transport, &tokens);
        assert!(session.is_loading());

        session.initialize().await;

        assert!(!session.is_loading());
        assert!(session.user().is_none());
        assert_eq!(transport.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_initialize_restores_identity() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            Method::Get,
            PROFILE,
            200,
            json!({"id": 7, "name": "bob", "user_type": "buyer"}),
        );
        let tokens = stored("A1", "R1");
        let mut session = session_with(&transport, &tokens);

        session.initialize().await;

        let user = session.user().expect("identity restored");
        assert_eq!(user.id, 7);
        assert_eq!(user.role, Some(UserRole::Buyer));
        assert!(session.is_authenticated());
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_initialize_with_rejected_token_clears_session() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(Method::Get, PROFILE, 401, json!({}));
        transport.respond(Method::Post, REFRESH_PATH, 401, json!({"detail": "expired"}));
        let tokens = stored("A1", "R1");
        let mut session = session_with(&transport, &tokens);
        let mut events = session.subscribe();

        session.initialize().await;

        assert_signed_out(&session, &tokens);
        assert!(!session.is_loading());
        assert_eq!(events.try_recv().ok(), Some(SessionEvent::LoginRequired));

        // Running it again is a no-op: nothing stored, nothing fetched
        let before = transport.total_requests();
        session.initialize().await;
        assert_signed_out(&session, &tokens);
        assert_eq!(transport.total_requests(), before);
    }

    #[tokio::test]
    async fn test_initialize_clears_tokens_on_server_error() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(Method::Get, PROFILE, 500, json!({"detail": "boom"}));
        let tokens = stored("A1", "R1");
        let mut session = session_with(&transport, &tokens);

        session.initialize().await;

        assert_signed_out(&session, &tokens);
        assert_eq!(transport.count(Method::Post, REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn test_initialize_clears_tokens_on_transport_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.fail(Method::Get, PROFILE, "connection refused");
        let tokens = stored("A1", "R1");
        let mut session = session_with(&transport, &tokens);

        session.initialize().await;

        assert_signed_out(&session, &tokens);
        assert!(!session.is_loading());
        assert_eq!(transport.count(Method::Post, REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn test_initialize_refreshes_expired_access_token() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(Method::Get, PROFILE, 401, json!({}));
        transport.respond(Method::Post, REFRESH_PATH, 200, json!({"access": "A2"}));
        transport.respond(Method::Get, PROFILE, 200, json!({"id": 7, "name": "bob"}));
        let tokens = stored("A1", "R1");
        let mut session = session_with(&transport, &tokens);

        session.initialize().await;

        assert_eq!(session.user().map(|u| u.id), Some(7));
        assert_eq!(tokens.access_token().unwrap().as_deref(), Some("A2"));
        assert_eq!(tokens.refresh_token().unwrap().as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_login_stores_tokens_and_identity() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(Method::Post, LOGIN, 200, json!({"access": "A1", "refresh": "R1"}));
        transport.respond(Method::Get, PROFILE, 200, json!({"id": 7, "name": "bob"}));
        let tokens = Arc::new(MemoryTokenStore::new());
        let mut session = session_with(&transport, &tokens);
        let mut events = session.subscribe();

        let outcome = session.login(&Credentials::new("bob", "secret")).await;

        assert_eq!(outcome, AuthOutcome::Success);
        assert_eq!(tokens.access_token().unwrap().as_deref(), Some("A1"));
        assert_eq!(tokens.refresh_token().unwrap().as_deref(), Some("R1"));
        let user = session.user().expect("identity");
        assert_eq!((user.id, user.name.as_str()), (7, "bob"));
        assert_eq!(session.last_error(), None);
        assert_eq!(events.try_recv().ok(), Some(SessionEvent::LoggedIn));

        // The profile fetch carries the new access token
        let profile_request = &transport.requests()[1];
        assert_eq!(profile_request.bearer.as_deref(), Some("A1"));
    }

    #[tokio::test]
    async fn test_login_rejected_reports_detail_and_leaves_storage() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(Method::Post, LOGIN, 400, json!({"detail": "Invalid credentials"}));
        let tokens = Arc::new(MemoryTokenStore::new());
        let mut session = session_with(&transport, &tokens);

        let outcome = session.login(&Credentials::new("bob", "wrong")).await;

        assert_eq!(outcome, AuthOutcome::Failed("Invalid credentials".to_string()));
        assert_eq!(outcome.error(), Some("Invalid credentials"));
        assert_eq!(session.last_error(), Some("Invalid credentials"));
        assert_signed_out(&session, &tokens);
        assert_eq!(transport.total_requests(), 1);
    }

    #[tokio::test]
    async fn test_login_rejected_keeps_existing_tokens() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(Method::Post, LOGIN, 401, json!({"detail": "No active account"}));
        let tokens = stored("OLD", "OLDR");
        let mut session = session_with(&transport, &tokens);

        let outcome = session.login(&Credentials::new("bob", "wrong")).await;

        assert_eq!(outcome.error(), Some("No active account"));
        assert_eq!(tokens.access_token().unwrap().as_deref(), Some("OLD"));
        assert_eq!(transport.count(Method::Post, REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn test_login_without_detail_uses_fallback() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(Method::Post, LOGIN, 502, json!("Bad Gateway"));
        let tokens = Arc::new(MemoryTokenStore::new());
        let mut session = session_with(&transport, &tokens);

        let outcome = session.login(&Credentials::new("bob", "secret")).await;

        assert_eq!(outcome, AuthOutcome::Failed("Login failed".to_string()));
    }

    #[tokio::test]
    async fn test_login_with_unreadable_profile_is_no_session() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(Method::Post, LOGIN, 200, json!({"access": "A1", "refresh": "R1"}));
        transport.respond(Method::Get, PROFILE, 404, json!({"detail": "Profile missing"}));
        let tokens = Arc::new(MemoryTokenStore::new());
        let mut session = session_with(&transport, &tokens);

        let outcome = session.login(&Credentials::new("bob", "secret")).await;

        assert_eq!(outcome.error(), Some("Profile missing"));
        assert_signed_out(&session, &tokens);
    }

    #[tokio::test]
    async fn test_register_then_signs_in() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(Method::Post, REGISTER, 201, json!({"id": 11, "name": "ann"}));
        transport.respond(Method::Post, LOGIN, 200, json!({"access": "A1", "refresh": "R1"}));
        transport.respond(
            Method::Get,
            PROFILE,
            200,
            json!({"id": 11, "name": "ann", "user_type": "farmer"}),
        );
        let tokens = Arc::new(MemoryTokenStore::new());
        let mut session = session_with(&transport, &tokens);

        let data = RegisterRequest::new("ann", "longpassword", UserRole::Farmer);
        let outcome = session.register(&data).await;

        assert!(outcome.is_success());
        assert!(session.user().map(|u| u.is_farmer()).unwrap_or(false));
        let login_request = &transport.requests()[1];
        assert_eq!(
            login_request.body,
            Some(json!({"username": "ann", "password": "longpassword"}))
        );
    }

    #[tokio::test]
    async fn test_register_reports_first_field_message() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            Method::Post,
            REGISTER,
            400,
            json!({"name": ["already taken"], "password": ["too common"]}),
        );
        let tokens = Arc::new(MemoryTokenStore::new());
        let mut session = session_with(&transport, &tokens);

        let data = RegisterRequest::new("ann", "password", UserRole::Buyer);
        let outcome = session.register(&data).await;

        assert_eq!(outcome, AuthOutcome::Failed("already taken".to_string()));
        assert_eq!(transport.count(Method::Post, LOGIN), 0);
    }

    #[tokio::test]
    async fn test_register_without_payload_uses_fallback() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(Method::Post, REGISTER, 500, json!(null));
        let tokens = Arc::new(MemoryTokenStore::new());
        let mut session = session_with(&transport, &tokens);

        let data = RegisterRequest::new("ann", "longpassword", UserRole::Buyer);
        let outcome = session.register(&data).await;

        assert_eq!(outcome.error(), Some("Registration failed"));
        assert_eq!(session.last_error(), Some("Registration failed"));
    }

    #[tokio::test]
    async fn test_register_surfaces_login_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(Method::Post, REGISTER, 201, json!({"id": 11}));
        transport.respond(Method::Post, LOGIN, 400, json!({"detail": "Account inactive"}));
        let tokens = Arc::new(MemoryTokenStore::new());
        let mut session = session_with(&transport, &tokens);

        let data = RegisterRequest::new("ann", "longpassword", UserRole::Buyer);
        let outcome = session.register(&data).await;

        assert_eq!(outcome.error(), Some("Account inactive"));
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(Method::Post, LOGIN, 200, json!({"access": "A1", "refresh": "R1"}));
        transport.respond(Method::Get, PROFILE, 200, json!({"id": 7, "name": "bob"}));
        let tokens = Arc::new(MemoryTokenStore::new());
        let mut session = session_with(&transport, &tokens);
        session.login(&Credentials::new("bob", "secret")).await;
        let requests_before = transport.total_requests();

        session.logout();

        assert_signed_out(&session, &tokens);
        assert_eq!(transport.total_requests(), requests_before);

        // Also from a signed-out state with stray tokens
        tokens.set_refresh_token("stray").unwrap();
        session.logout();
        assert_signed_out(&session, &tokens);
    }

    #[tokio::test]
    async fn test_update_profile_replaces_identity() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(
            Method::Patch,
            PROFILE,
            200,
            json!({"id": 7, "name": "bob", "location": "eldoret"}),
        );
        let tokens = stored("A1", "R1");
        let mut session = session_with(&transport, &tokens);

        let update = ProfileUpdate {
            location: Some("eldoret".to_string()),
            ..Default::default()
        };
        let user = session.update_profile(&update).await.expect("updated");

        assert_eq!(user.location.as_deref(), Some("eldoret"));
        assert_eq!(transport.requests()[0].body, Some(json!({"location": "eldoret"})));
    }

    #[tokio::test]
    async fn test_empty_profile_update_sends_nothing() {
        let transport = Arc::new(MockTransport::new());
        transport.respond(Method::Get, PROFILE, 200, json!({"id": 7, "name": "bob"}));
        let tokens = stored("A1", "R1");
        let mut session = session_with(&transport, &tokens);
        session.initialize().await;

        let user = session
            .update_profile(&ProfileUpdate::default())
            .await
            .expect("kept");

        assert_eq!(user.name, "bob");
        assert_eq!(transport.count(Method::Patch, PROFILE), 0);
        assert_eq!(transport.total_requests(), 1);
    }
}
