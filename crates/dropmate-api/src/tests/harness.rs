//! Test harness for the request pipeline.

use crate::{ApiError, ApiRequest, ApiResponse, ApiResult, AuthenticatedClient, HttpTransport};
use async_trait::async_trait;
use dropmate_auth::{MemoryIdentityProvider, SessionManager};
use dropmate_storage::TokenVault;
use dropmate_types::Identity;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;

/// Transport that replays queued outcomes and records every request.
///
/// When the queue is empty it answers `200 {}`.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<ApiResult<ApiResponse>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn push_status(&self, status: u16, body: Value) {
        self.script
            .lock()
            .push_back(Ok(ApiResponse::json_body(status, &body)));
    }

    pub fn push_error(&self, error: ApiError) {
        self.script.lock().push_back(Err(error));
    }

    pub fn push_unauthorized(&self) {
        self.push_status(401, json!({"message": "Token expired"}));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn bearers(&self) -> Vec<Option<String>> {
        self.requests.lock().iter().map(|r| r.bearer.clone()).collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        self.requests.lock().push(request.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(ApiResponse::json_body(200, &json!({}))))
    }
}

pub struct TestHarness {
    pub transport: Arc<ScriptedTransport>,
    pub provider: Arc<MemoryIdentityProvider>,
    pub session: SessionManager,
    pub client: AuthenticatedClient,
}

impl TestHarness {
    /// Session restored for `u1` and hydrated.
    pub async fn signed_in() -> Self {
        let harness = Self::unhydrated();
        harness.provider.sign_in_as(Identity::new("u1"));
        harness.session.hydrate().await.unwrap();
        harness
    }

    /// Session attached but never hydrated.
    pub fn unhydrated() -> Self {
        let transport = ScriptedTransport::new();
        let provider = Arc::new(MemoryIdentityProvider::new());
        let session = SessionManager::new(provider.clone(), TokenVault::in_memory());
        let client = AuthenticatedClient::new(transport.clone()).with_session(session.clone());
        Self {
            transport,
            provider,
            session,
            client,
        }
    }

    pub fn current_token(&self) -> Option<String> {
        self.session.snapshot().token
    }
}
