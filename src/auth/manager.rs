//! Credential lifecycle management.
//!
//! [`TokenManager`] owns every mutation of the stored credential pair.
//! Reads go straight to the store; renewal is funneled through a
//! single-flight slot so any number of concurrent callers produce at most
//! one renewal request against the server, all receiving the same result.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::api::ApiError;
use crate::auth::claims;
use crate::auth::store::TokenStore;
use crate::config::ApiConfig;
use crate::models::auth::{RefreshRequest, TokenGrant};
use crate::models::ApiEnvelope;

/// Host-environment navigation boundary.
///
/// Session invalidation ends with a redirect to the login view. What the
/// login view is and how to get there belongs to the embedding
/// application, so the manager only talks to this trait.
pub trait Navigator: Send + Sync {
    /// Whether the login view is already active.
    fn at_login(&self) -> bool;

    /// Perform a hard navigation to the login view.
    fn redirect_to_login(&self);
}

type RenewalHandle = Shared<BoxFuture<'static, Option<String>>>;

/// Manages the access/refresh pair held in a [`TokenStore`].
///
/// Clone is cheap: clones share the store, the HTTP connection pool, and
/// the single-flight renewal slot.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

struct Inner {
    http: Client,
    config: ApiConfig,
    store: Arc<dyn TokenStore>,
    navigator: Option<Box<dyn Navigator>>,
    /// In-flight renewal, if any. Checking the slot and installing a new
    /// handle happen under this lock, so two callers can never both start
    /// a renewal.
    renewal: Mutex<Option<RenewalHandle>>,
}

impl TokenManager {
    pub fn new(config: ApiConfig, store: Arc<dyn TokenStore>) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(http, config, store, None))
    }

    pub fn with_navigator(
        config: ApiConfig,
        store: Arc<dyn TokenStore>,
        navigator: Box<dyn Navigator>,
    ) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(http, config, store, Some(navigator)))
    }

    /// Share an existing client's connection pool.
    pub(crate) fn with_client(
        http: Client,
        config: ApiConfig,
        store: Arc<dyn TokenStore>,
        navigator: Option<Box<dyn Navigator>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                config,
                store,
                navigator,
                renewal: Mutex::new(None),
            }),
        }
    }

    /// Raw read of the stored access token, no expiry evaluation.
    pub fn current_token(&self) -> Option<String> {
        self.inner.store.access_token()
    }

    /// Whether a non-expired access token is currently stored.
    pub fn is_authenticated(&self) -> bool {
        self.current_token().map_or(false, |t| !claims::is_expired(&t))
    }

    /// Return a usable access token, renewing first if the stored one has
    /// expired. `None` when no token is stored or renewal fails.
    ///
    /// Expiry is re-evaluated on every call; a token is never trusted
    /// across more than one logical operation.
    pub async fn get_valid_token(&self) -> Option<String> {
        let token = self.inner.store.access_token()?;
        if !claims::is_expired(&token) {
            return Some(token);
        }
        self.renew_shared().await
    }

    /// Renew regardless of local expiry. Used after the server rejects a
    /// token that still looks valid here (clock skew, revocation).
    pub async fn force_renew(&self) -> Option<String> {
        self.renew_shared().await
    }

    /// Persist a freshly issued pair (login). The refresh slot is only
    /// written when the grant carries one.
    pub fn persist_grant(&self, grant: &TokenGrant) -> Result<()> {
        self.inner.store.store_access(&grant.access_token)?;
        if let Some(refresh) = &grant.refresh_token {
            self.inner.store.store_refresh(refresh)?;
        }
        Ok(())
    }

    /// Clear both credentials and send the host to the login view unless
    /// it is already there. Idempotent.
    pub fn invalidate_session(&self) {
        invalidate(&self.inner);
    }

    /// End the session server-side and clear local credentials.
    ///
    /// The network call is best-effort; local state is cleared either way.
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.inner.store.refresh_token() {
            let url = self.inner.config.auth_url("/logout");
            let mut request = self
                .inner
                .http
                .post(&url)
                .timeout(self.inner.config.request_timeout)
                .json(&RefreshRequest { refresh_token });
            if let Some(token) = self.current_token() {
                request = request.bearer_auth(token);
            }
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "logout request rejected");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "logout request failed"),
            }
        }
        self.invalidate_session();
    }

    /// Join the in-flight renewal or start one. The slot is freed before
    /// the result reaches any waiter, so the next expiry observed after
    /// settlement starts a fresh operation.
    async fn renew_shared(&self) -> Option<String> {
        let handle = {
            let mut slot = self.inner.renewal.lock().await;
            match slot.as_ref() {
                Some(existing) => {
                    debug!("joining in-flight token renewal");
                    existing.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let handle: RenewalHandle = async move {
                        let result = renew(&inner).await;
                        inner.renewal.lock().await.take();
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(handle.clone());
                    handle
                }
            }
        };
        handle.await
    }
}

/// Perform one renewal: read the refresh credential, call the server,
/// persist the grant. Every failure path invalidates the session and
/// yields `None`; nothing is thrown past this boundary.
async fn renew(inner: &Inner) -> Option<String> {
    let Some(refresh_token) = inner.store.refresh_token() else {
        warn!("no refresh token stored; invalidating session");
        invalidate(inner);
        return None;
    };

    match request_renewal(inner, &refresh_token).await {
        Ok(grant) => {
            if let Err(e) = inner.store.store_access(&grant.access_token) {
                error!(error = %e, "failed to persist renewed access token");
                invalidate(inner);
                return None;
            }
            if let Some(rotated) = &grant.refresh_token {
                if inner.config.persist_rotated_refresh {
                    if let Err(e) = inner.store.store_refresh(rotated) {
                        error!(error = %e, "failed to persist rotated refresh token");
                        invalidate(inner);
                        return None;
                    }
                } else {
                    debug!("ignoring rotated refresh token per config");
                }
            }
            debug!("access token renewed");
            Some(grant.access_token)
        }
        Err(e) => {
            error!(error = %e, "token renewal failed; invalidating session");
            invalidate(inner);
            None
        }
    }
}

async fn request_renewal(inner: &Inner, refresh_token: &str) -> Result<TokenGrant> {
    let url = inner.config.auth_url("/refresh");
    let response = inner
        .http
        .post(&url)
        .timeout(inner.config.request_timeout)
        .json(&RefreshRequest {
            refresh_token: refresh_token.to_string(),
        })
        .send()
        .await
        .context("Failed to send renewal request")?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::from_status(status, &body).into());
    }

    let envelope: ApiEnvelope<TokenGrant> = response
        .json()
        .await
        .context("Failed to parse renewal response")?;
    let grant = envelope.data;
    if grant.access_token.is_empty() {
        anyhow::bail!("renewal response carried no access token");
    }
    Ok(grant)
}

fn invalidate(inner: &Inner) {
    if let Err(e) = inner.store.clear() {
        warn!(error = %e, "failed to clear stored tokens");
    }
    if let Some(nav) = &inner.navigator {
        if !nav.at_login() {
            nav.redirect_to_login();
        }
    }
}
