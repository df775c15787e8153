//! Authentication module for managing the user session and tokens.
//!
//! This module provides:
//! - `SessionManager`: login/registration/logout transitions and the
//!   in-memory user identity
//! - `TokenStore`: durable storage for the access/refresh token pair, with
//!   file, OS keychain and in-memory backends
//!
//! The identity is never persisted; it is rebuilt from the profile endpoint
//! whenever a stored access token is found at startup.

pub mod credentials;
pub mod session;
pub mod store;

pub use credentials::KeyringTokenStore;
pub use session::{AuthOutcome, SessionEvent, SessionManager};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
