//! Network access layer for the Converse chat application.
//!
//! Three pieces, layered bottom-up:
//!
//! - [`auth`]: the credential pair (short-lived JWT access token plus a
//!   refresh token), its storage backends, and a lifecycle manager that
//!   renews expired tokens with a single-flight guarantee - concurrent
//!   callers share one renewal call and its result.
//! - [`api`]: an authenticated REST client with one-shot 401 recovery
//!   (forced renewal + single retry, login exempt).
//! - [`stream`]: a decoder for the chat completion stream that turns
//!   chunked bytes into typed events - session info, content chunks, and
//!   a clean terminator - with a hard frame bound and guaranteed handle
//!   release on every exit path, including cancellation.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use converse_client::auth::MemoryTokenStore;
//! use converse_client::models::ChatRequest;
//! use converse_client::stream::StreamHandler;
//! use converse_client::{ApiClient, ApiConfig};
//!
//! struct Printer;
//!
//! impl StreamHandler for Printer {
//!     fn on_chunk(&mut self, text: &str) {
//!         print!("{text}");
//!     }
//! }
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ApiConfig::from_env()?;
//! let client = ApiClient::new(config, Arc::new(MemoryTokenStore::default()))?;
//! client
//!     .stream_chat(&ChatRequest::new("hello there"), &mut Printer)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod stream;

pub use api::{ApiClient, ApiError};
pub use auth::{Navigator, TokenManager, TokenStore};
pub use config::ApiConfig;
