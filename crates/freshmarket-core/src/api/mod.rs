//! REST API client module for the produce marketplace.
//!
//! Requests flow through a `RequestPipeline`, which attaches the stored
//! bearer token and transparently refreshes it on a 401, over an
//! `HttpTransport` (reqwest in production, a scripted mock in tests).
//! `ApiClient` exposes the typed marketplace operations on top.

pub mod client;
pub mod error;
pub mod pipeline;
pub mod transport;

pub use client::ApiClient;
pub use error::ApiError;
pub use pipeline::{attach_credentials, RequestPipeline};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, ReqwestTransport};
