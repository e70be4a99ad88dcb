//! Session manager: the single owner of the signed-in session.
//!
//! All mutations go through [`SessionManager::transition`], which drives the
//! session FSM, applies the change and notifies subscribers outside the lock.

use crate::session_fsm::{SessionMachine, SessionMachineInput, SessionMachineState, SessionStatus};
use crate::{AuthError, AuthResult, IdentityProvider, ProviderError};
use dropmate_config_and_utils::{Listeners, Subscription};
use dropmate_storage::TokenVault;
use dropmate_types::{Credentials, Identity};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Snapshot of the signed-in session.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub identity: Option<Identity>,
    pub token: Option<String>,
    pub status: SessionStatus,
    /// User-displayable message from the last failed sign-in.
    pub last_error: Option<String>,
}

impl Session {
    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|identity| identity.uid.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.status.is_authenticated()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("status", &self.status)
            .field("last_error", &self.last_error)
            .finish()
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<Option<String>, ProviderError>>>;

struct InFlightRefresh {
    id: u64,
    future: RefreshFuture,
}

struct SessionState {
    machine: SessionMachine,
    session: Session,
}

struct SessionInner {
    provider: Arc<dyn IdentityProvider>,
    vault: TokenVault,
    state: Mutex<SessionState>,
    listeners: Listeners<Session>,
    hydrated: AtomicBool,
    refresh: Mutex<Option<InFlightRefresh>>,
    next_refresh_id: AtomicU64,
}

/// Owns the session and mediates every interaction with the identity
/// provider. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, vault: TokenVault) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                provider,
                vault,
                state: Mutex::new(SessionState {
                    machine: SessionMachine::new(),
                    session: Session::default(),
                }),
                listeners: Listeners::new(),
                hydrated: AtomicBool::new(false),
                refresh: Mutex::new(None),
                next_refresh_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn snapshot(&self) -> Session {
        self.inner.state.lock().session.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.lock().session.status
    }

    pub fn is_authenticated(&self) -> bool {
        self.status().is_authenticated()
    }

    /// Whether [`SessionManager::hydrate`] has completed at least once.
    pub fn is_hydrated(&self) -> bool {
        self.inner.hydrated.load(Ordering::SeqCst)
    }

    /// Observe every session change. The handler runs synchronously on the
    /// task that caused the change.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(handler)
    }

    pub fn clear_error(&self) {
        let snapshot = {
            let mut state = self.inner.state.lock();
            if state.session.last_error.is_none() {
                return;
            }
            state.session.last_error = None;
            state.session.clone()
        };
        self.inner.listeners.emit(&snapshot);
    }

    fn transition<F>(&self, input: SessionMachineInput, mutate: F) -> AuthResult<Session>
    where
        F: FnOnce(&mut Session),
    {
        let snapshot = {
            let mut state = self.inner.state.lock();
            let from = state.machine.state().clone();
            state.machine.consume(&input).map_err(|_| {
                AuthError::InvalidStateTransition(format!("{input:?} from {from:?}"))
            })?;
            mutate(&mut state.session);
            state.session.status = SessionStatus::from(state.machine.state());
            debug!(
                input = ?input,
                from = ?from,
                to = ?state.machine.state(),
                "Session transition"
            );
            state.session.clone()
        };
        self.inner.listeners.emit(&snapshot);
        Ok(snapshot)
    }

    /// Sign in with email and password.
    ///
    /// On failure the session returns to `Idle` with `last_error` set, and the
    /// same user-displayable message is returned as [`AuthError::Rejected`].
    pub async fn sign_in(&self, credentials: &Credentials) -> AuthResult<Session> {
        self.begin_sign_in()?;
        info!(email = %credentials.email, "Signing in");

        let result = async {
            let identity = self
                .inner
                .provider
                .sign_in_with_credentials(credentials)
                .await?;
            let token = self.initial_token().await?;
            Ok::<_, ProviderError>((identity, token))
        }
        .await;
        self.complete_sign_in(result)
    }

    /// Create an account, then continue exactly like [`SessionManager::sign_in`].
    pub async fn sign_up(
        &self,
        credentials: &Credentials,
        display_name: Option<&str>,
    ) -> AuthResult<Session> {
        self.begin_sign_in()?;
        info!(email = %credentials.email, "Creating account");

        let result = async {
            let identity = self
                .inner
                .provider
                .create_account(credentials, display_name)
                .await?;
            let token = self.initial_token().await?;
            Ok::<_, ProviderError>((identity, token))
        }
        .await;
        self.complete_sign_in(result)
    }

    fn begin_sign_in(&self) -> AuthResult<Session> {
        self.transition(SessionMachineInput::SignInAttempt, |session| {
            session.identity = None;
            session.token = None;
            session.last_error = None;
        })
    }

    async fn initial_token(&self) -> Result<String, ProviderError> {
        self.inner
            .provider
            .get_id_token(false)
            .await?
            .ok_or_else(|| ProviderError::new("auth/no-current-user", "provider issued no token"))
    }

    fn complete_sign_in(
        &self,
        result: Result<(Identity, String), ProviderError>,
    ) -> AuthResult<Session> {
        match result {
            Ok((identity, token)) => {
                if let Err(e) = self.inner.vault.set_session_token(&token) {
                    warn!(error = %e, "Failed to persist session token");
                }
                let user_id = identity.uid.clone();
                let session = self.transition(SessionMachineInput::SignInSucceeded, |session| {
                    session.identity = Some(identity);
                    session.token = Some(token);
                })?;
                info!(user_id = %user_id, "Signed in");
                Ok(session)
            }
            Err(e) => {
                let message = e.user_message().to_string();
                warn!(code = %e.code, error = %e, "Sign-in rejected by identity provider");
                self.transition(SessionMachineInput::SignInFailed, |session| {
                    session.last_error = Some(message.clone());
                })?;
                Err(AuthError::Rejected(message))
            }
        }
    }

    /// Ask the provider to email a password reset link.
    pub async fn reset_password(&self, email: &str) -> AuthResult<()> {
        let email = email.trim();
        self.inner
            .provider
            .send_password_reset(email)
            .await
            .map_err(|e| {
                warn!(code = %e.code, "Password reset rejected");
                AuthError::Rejected(e.user_message().to_string())
            })?;
        info!(email = %email, "Password reset sent");
        Ok(())
    }

    pub async fn update_display_name(&self, display_name: &str) -> AuthResult<Session> {
        if !self.is_authenticated() {
            return Err(AuthError::NotSignedIn);
        }
        let identity = self
            .inner
            .provider
            .update_display_name(display_name.trim())
            .await
            .map_err(|e| AuthError::Rejected(e.user_message().to_string()))?;
        self.transition(SessionMachineInput::ProfileUpdated, |session| {
            session.identity = Some(identity);
        })
    }

    /// Sign out locally and at the provider. Safe to call in any state;
    /// provider and storage failures are logged.
    pub async fn sign_out(&self) {
        info!(user_id = ?self.snapshot().user_id(), "Signing out");
        if let Err(e) = self.inner.provider.sign_out().await {
            warn!(error = %e, "Identity provider sign-out failed");
        }
        if let Err(e) = self.inner.vault.clear_session_token() {
            warn!(error = %e, "Failed to clear persisted session token");
        }
        self.reset_local();
    }

    /// Returns true if the session was not already idle.
    fn reset_local(&self) -> bool {
        if *self.inner.state.lock().machine.state() == SessionMachineState::Idle {
            return false;
        }
        match self.transition(SessionMachineInput::SignOut, |session| {
            *session = Session::default();
        }) {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Session already reset");
                false
            }
        }
    }

    /// Current bearer token.
    ///
    /// Returns the cached token unless `force_refresh` is set. `Ok(None)` when
    /// nobody is signed in. Concurrent forced refreshes share one provider
    /// call.
    pub async fn get_token(&self, force_refresh: bool) -> AuthResult<Option<String>> {
        {
            let state = self.inner.state.lock();
            if state.session.identity.is_none() {
                debug!("No identity, proceeding without token");
                return Ok(None);
            }
            if !force_refresh {
                if let Some(token) = &state.session.token {
                    return Ok(Some(token.clone()));
                }
            }
        }
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> AuthResult<Option<String>> {
        let (id, future) = {
            let mut slot = self.inner.refresh.lock();
            match slot.as_ref() {
                Some(in_flight) => {
                    debug!(refresh_id = in_flight.id, "Joining in-flight token refresh");
                    (in_flight.id, in_flight.future.clone())
                }
                None => {
                    let id = self.inner.next_refresh_id.fetch_add(1, Ordering::SeqCst);
                    let provider = Arc::clone(&self.inner.provider);
                    let future = async move { provider.get_id_token(true).await }
                        .boxed()
                        .shared();
                    *slot = Some(InFlightRefresh {
                        id,
                        future: future.clone(),
                    });
                    debug!(refresh_id = id, "Starting token refresh");
                    (id, future)
                }
            }
        };

        let result = future.await;

        {
            let mut slot = self.inner.refresh.lock();
            if slot.as_ref().is_some_and(|in_flight| in_flight.id == id) {
                *slot = None;
            }
        }

        match result {
            Ok(Some(token)) => {
                self.apply_refreshed_token(&token);
                Ok(Some(token))
            }
            Ok(None) => {
                debug!(refresh_id = id, "Provider has no signed-in user");
                Ok(None)
            }
            Err(e) => {
                warn!(refresh_id = id, code = %e.code, error = %e, "Token refresh failed");
                Err(AuthError::RefreshFailed(e.to_string()))
            }
        }
    }

    fn apply_refreshed_token(&self, token: &str) {
        {
            let state = self.inner.state.lock();
            if state.session.identity.is_none() || state.session.token.as_deref() == Some(token) {
                return;
            }
        }
        match self.transition(SessionMachineInput::TokenRefreshed, |session| {
            session.token = Some(token.to_string());
        }) {
            Ok(_) => {
                if let Err(e) = self.inner.vault.set_session_token(token) {
                    warn!(error = %e, "Failed to persist refreshed token");
                }
            }
            Err(e) => debug!(error = %e, "Discarding refreshed token"),
        }
    }

    /// Restore the session from the provider at startup.
    ///
    /// Always marks the manager hydrated, even when restoration fails.
    pub async fn hydrate(&self) -> AuthResult<Session> {
        let result = match self.inner.provider.current_identity() {
            Some(identity) => self.restore(identity).await,
            None => self.discard_stale_token().map(|_| self.snapshot()),
        };
        self.inner.hydrated.store(true, Ordering::SeqCst);
        info!(status = ?self.status(), "Session hydrated");
        result
    }

    fn discard_stale_token(&self) -> AuthResult<()> {
        if self.inner.vault.clear_session_token()? {
            debug!("Removed stale persisted session token");
        }
        Ok(())
    }

    async fn restore(&self, identity: Identity) -> AuthResult<Session> {
        let Some(token) = self.inner.provider.get_id_token(false).await? else {
            debug!(user_id = %identity.uid, "Provider identity has no token");
            return Ok(self.snapshot());
        };
        self.inner.vault.set_session_token(&token)?;

        let user_id = identity.uid.clone();
        let session = self.transition(SessionMachineInput::ProviderRestored, |session| {
            session.identity = Some(identity);
            session.token = Some(token);
            session.last_error = None;
        })?;
        info!(user_id = %user_id, "Session restored from identity provider");
        Ok(session)
    }

    /// Follow the provider's auth-state stream until the returned guard is
    /// dropped. A signed-in identity restores the session; a signed-out
    /// provider resets it.
    pub fn watch_provider(&self) -> ProviderWatch {
        let mut changes = self.inner.provider.auth_state_changes();
        let weak = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let next = changes.borrow_and_update().clone();
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                SessionManager { inner }.on_provider_change(next).await;
            }
            debug!("Provider watch stopped");
        });

        ProviderWatch { task }
    }

    async fn on_provider_change(&self, identity: Option<Identity>) {
        let Some(identity) = identity else {
            if self.reset_local() {
                if let Err(e) = self.inner.vault.clear_session_token() {
                    warn!(error = %e, "Failed to clear persisted session token");
                }
                info!("Identity provider signed out, session reset");
            }
            return;
        };

        let current = self.snapshot();
        if current.is_authenticated() && current.user_id() == Some(identity.uid.as_str()) {
            if current.identity.as_ref() != Some(&identity) {
                if let Err(e) = self.transition(SessionMachineInput::ProfileUpdated, |session| {
                    session.identity = Some(identity);
                }) {
                    debug!(error = %e, "Ignoring profile update");
                }
            }
            return;
        }

        match self.restore(identity).await {
            Ok(_) => {}
            Err(AuthError::InvalidStateTransition(detail)) => {
                debug!(%detail, "Ignoring provider restore during sign-in");
            }
            Err(e) => warn!(error = %e, "Failed to restore session from identity provider"),
        }
    }
}

/// Guard for [`SessionManager::watch_provider`]. Dropping it stops the watch.
#[must_use = "the provider watch stops when this guard is dropped"]
pub struct ProviderWatch {
    task: JoinHandle<()>,
}

impl ProviderWatch {
    pub fn stop(self) {}
}

impl Drop for ProviderWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}
