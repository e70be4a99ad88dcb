//! Authenticated request pipeline.

use crate::{ApiError, ApiRequest, ApiResponse, ApiResult, HttpTransport};
use dropmate_auth::SessionManager;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sends requests with the session's bearer token.
///
/// A 401 triggers one forced token refresh and one reissue of the same
/// request. If the refresh itself fails the session is signed out and the
/// original 401 is returned.
#[derive(Clone)]
pub struct AuthenticatedClient {
    transport: Arc<dyn HttpTransport>,
    session: Option<SessionManager>,
}

impl AuthenticatedClient {
    /// Client without a session; requests go out unauthenticated.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            session: None,
        }
    }

    pub fn with_session(mut self, session: SessionManager) -> Self {
        self.session = Some(session);
        self
    }

    /// Send `request` and return its response if the status is 2xx.
    pub async fn send(&self, mut request: ApiRequest) -> ApiResult<ApiResponse> {
        request.bearer = self.current_token().await;
        let mut retried = false;

        loop {
            debug!(method = request.method.as_str(), path = %request.path(), retried, "Sending request");
            let response = self.transport.execute(&request).await?;

            if response.is_success() {
                return Ok(response);
            }

            let error = ApiError::from_response(response.status, &response.body);
            if !error.is_unauthorized() || retried {
                debug!(
                    path = %request.path(),
                    status = response.status,
                    error = %error,
                    "Request failed"
                );
                return Err(error);
            }

            retried = true;
            match self.refreshed_token().await {
                Some(token) => {
                    info!(path = %request.path(), "Retrying request with refreshed token");
                    request.bearer = Some(token);
                }
                None => return Err(error),
            }
        }
    }

    async fn current_token(&self) -> Option<String> {
        let Some(session) = &self.session else {
            warn!("No session attached, sending request without token");
            return None;
        };
        if !session.is_hydrated() {
            warn!("Session not initialized yet, sending request without token");
            return None;
        }
        match session.get_token(false).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Could not read session token, sending request without it");
                None
            }
        }
    }

    async fn refreshed_token(&self) -> Option<String> {
        let session = self.session.as_ref()?;
        match session.get_token(true).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Token refresh after 401 failed, signing out");
                session.sign_out().await;
                None
            }
        }
    }
}
