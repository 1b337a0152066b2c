//! REST API client for the Converse backend.
//!
//! `ApiClient` handles bearer-token attachment and one-shot 401 recovery
//! for the auth and chat endpoints, and opens the chat completion stream
//! consumed by the `stream` module.
//!
//! Authentication uses a short-lived JWT access token renewed through the
//! refresh endpoint; see the `auth` module for the lifecycle rules.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
