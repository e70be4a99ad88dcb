//! In-process identity provider for offline runs and tests.

use crate::{IdentityProvider, ProviderError, ProviderResult};
use async_trait::async_trait;
use dropmate_types::{Credentials, Identity};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    password: String,
    identity: Identity,
}

struct SignedIn {
    identity: Identity,
    token: Option<String>,
}

/// Identity provider that keeps accounts in memory and mints opaque tokens
/// (`<uid>-token-<n>`).
///
/// Refresh latency and failures can be injected, and refreshes are counted,
/// which makes it the reference provider for exercising the session layer.
pub struct MemoryIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    current: Mutex<Option<SignedIn>>,
    token_seq: AtomicU64,
    uid_seq: AtomicU64,
    refresh_calls: AtomicUsize,
    refresh_delay: Mutex<Duration>,
    refresh_failure: Mutex<Option<ProviderError>>,
    sign_in_failure: Mutex<Option<ProviderError>>,
    password_resets: Mutex<Vec<String>>,
    changes: watch::Sender<Option<Identity>>,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            token_seq: AtomicU64::new(1),
            uid_seq: AtomicU64::new(1),
            refresh_calls: AtomicUsize::new(0),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_failure: Mutex::new(None),
            sign_in_failure: Mutex::new(None),
            password_resets: Mutex::new(Vec::new()),
            changes,
        }
    }

    /// Register an account.
    pub fn with_account(self, email: &str, password: &str, uid: &str) -> Self {
        self.accounts.lock().insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                identity: Identity::new(uid).with_email(email),
            },
        );
        self
    }

    /// Simulate a user restored by the provider outside of this process's
    /// sign-in flow (persisted login, another screen).
    pub fn sign_in_as(&self, identity: Identity) {
        let token = self.mint_token(&identity.uid);
        *self.current.lock() = Some(SignedIn {
            identity: identity.clone(),
            token: Some(token),
        });
        self.changes.send_replace(Some(identity));
    }

    /// Simulate the provider dropping the user (revoked, signed out elsewhere).
    pub fn revoke(&self) {
        *self.current.lock() = None;
        self.changes.send_replace(None);
    }

    /// Number of token refreshes that reached the provider.
    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Delay every refresh by `delay`.
    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock() = delay;
    }

    /// Make refreshes fail with `error` until cleared with `None`.
    pub fn set_refresh_failure(&self, error: Option<ProviderError>) {
        *self.refresh_failure.lock() = error;
    }

    /// Make sign-in and account creation fail with `error` until cleared.
    pub fn set_sign_in_failure(&self, error: Option<ProviderError>) {
        *self.sign_in_failure.lock() = error;
    }

    /// Emails that password resets were sent to.
    pub fn password_resets(&self) -> Vec<String> {
        self.password_resets.lock().clone()
    }

    fn mint_token(&self, uid: &str) -> String {
        let n = self.token_seq.fetch_add(1, Ordering::SeqCst);
        format!("{uid}-token-{n}")
    }

    fn establish(&self, identity: Identity) -> Identity {
        let token = self.mint_token(&identity.uid);
        *self.current.lock() = Some(SignedIn {
            identity: identity.clone(),
            token: Some(token),
        });
        self.changes.send_replace(Some(identity.clone()));
        identity
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in_with_credentials(&self, credentials: &Credentials) -> ProviderResult<Identity> {
        if let Some(err) = self.sign_in_failure.lock().clone() {
            return Err(err);
        }

        let identity = {
            let accounts = self.accounts.lock();
            let account = accounts
                .get(&credentials.email)
                .ok_or_else(|| ProviderError::new("EMAIL_NOT_FOUND", "no such account"))?;
            if account.password != credentials.password {
                return Err(ProviderError::new("INVALID_PASSWORD", "password mismatch"));
            }
            account.identity.clone()
        };

        Ok(self.establish(identity))
    }

    async fn create_account(
        &self,
        credentials: &Credentials,
        display_name: Option<&str>,
    ) -> ProviderResult<Identity> {
        if let Some(err) = self.sign_in_failure.lock().clone() {
            return Err(err);
        }
        if !credentials.email.contains('@') {
            return Err(ProviderError::new("INVALID_EMAIL", "malformed email"));
        }
        if credentials.password.len() < MIN_PASSWORD_LEN {
            return Err(ProviderError::new("WEAK_PASSWORD", "password too short"));
        }

        let identity = {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(&credentials.email) {
                return Err(ProviderError::new("EMAIL_EXISTS", "account exists"));
            }
            let uid = format!("uid-{}", self.uid_seq.fetch_add(1, Ordering::SeqCst));
            let identity = Identity {
                uid,
                email: Some(credentials.email.clone()),
                display_name: display_name.map(str::to_string),
            };
            accounts.insert(
                credentials.email.clone(),
                Account {
                    password: credentials.password.clone(),
                    identity: identity.clone(),
                },
            );
            identity
        };

        Ok(self.establish(identity))
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        self.revoke();
        Ok(())
    }

    async fn get_id_token(&self, force_refresh: bool) -> ProviderResult<Option<String>> {
        let uid = {
            let current = self.current.lock();
            match current.as_ref() {
                None => return Ok(None),
                Some(signed_in) => {
                    if !force_refresh {
                        if let Some(token) = &signed_in.token {
                            return Ok(Some(token.clone()));
                        }
                    }
                    signed_in.identity.uid.clone()
                }
            }
        };

        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.refresh_failure.lock().clone() {
            return Err(err);
        }

        let token = self.mint_token(&uid);
        let mut current = self.current.lock();
        match current.as_mut() {
            Some(signed_in) if signed_in.identity.uid == uid => {
                signed_in.token = Some(token.clone());
                Ok(Some(token))
            }
            _ => Ok(None),
        }
    }

    async fn send_password_reset(&self, email: &str) -> ProviderResult<()> {
        if !self.accounts.lock().contains_key(email) {
            return Err(ProviderError::new("EMAIL_NOT_FOUND", "no such account"));
        }
        self.password_resets.lock().push(email.to_string());
        Ok(())
    }

    async fn update_display_name(&self, display_name: &str) -> ProviderResult<Identity> {
        let identity = {
            let mut current = self.current.lock();
            let signed_in = current
                .as_mut()
                .ok_or_else(|| ProviderError::new("auth/no-current-user", "not signed in"))?;
            signed_in.identity.display_name = Some(display_name.to_string());
            signed_in.identity.clone()
        };

        if let Some(email) = &identity.email {
            if let Some(account) = self.accounts.lock().get_mut(email) {
                account.identity = identity.clone();
            }
        }
        self.changes.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    fn current_identity(&self) -> Option<Identity> {
        self.current.lock().as_ref().map(|s| s.identity.clone())
    }

    fn auth_state_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.changes.subscribe()
    }
}
