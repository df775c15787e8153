//! Core library for freshmarket, a produce marketplace client.
//!
//! - `api`: request pipeline with bearer credentials and token refresh,
//!   plus the typed marketplace client
//! - `auth`: session manager and token storage
//! - `cart`: client-side shopping cart
//! - `config`: configuration file and environment overrides
//! - `models`: API data types

pub mod api;
pub mod auth;
pub mod cart;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError};
pub use auth::{AuthOutcome, SessionEvent, SessionManager, TokenStore};
pub use cart::{Cart, CartError};
pub use config::Config;
