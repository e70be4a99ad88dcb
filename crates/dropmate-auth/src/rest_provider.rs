//! Identity provider backed by a Firebase-style identity REST API.
//!
//! Endpoints:
//! - `{identity_url}/v1/accounts:signInWithPassword?key=…`
//! - `{identity_url}/v1/accounts:signUp?key=…`
//! - `{identity_url}/v1/accounts:update?key=…`
//! - `{identity_url}/v1/accounts:sendOobCode?key=…`
//! - `{secure_token_url}/v1/token?key=…` (refresh-token grant)
//!
//! The refresh credential is persisted in the [`TokenVault`] so a restarted
//! process can [`RestIdentityProvider::restore`] the user.

use crate::{AuthError, AuthResult, IdentityProvider, ProviderError, ProviderResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dropmate_config_and_utils::Config;
use dropmate_storage::{ProviderSession, TokenVault};
use dropmate_types::{Credentials, Identity};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

/// Refresh a cached token this long before it expires.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Retry behavior for transient refresh failures.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum number of attempts.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// Delay for a given attempt number (0-indexed), doubling up to the cap.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Endpoints and credentials for [`RestIdentityProvider`].
#[derive(Debug, Clone)]
pub struct RestProviderConfig {
    pub identity_url: Url,
    pub secure_token_url: Url,
    pub api_key: String,
    pub timeout: Duration,
    pub refresh: RefreshConfig,
}

impl RestProviderConfig {
    pub fn from_config(config: &Config) -> AuthResult<Self> {
        let api_key = config
            .auth_api_key
            .clone()
            .ok_or_else(|| AuthError::Config("auth_api_key is not set".into()))?;
        let parse = |raw: &str| {
            Url::parse(raw).map_err(|e| AuthError::Config(format!("invalid URL {raw}: {e}")))
        };
        Ok(Self {
            identity_url: parse(&config.identity_url)?,
            secure_token_url: parse(&config.secure_token_url)?,
            api_key,
            timeout: config.api_timeout(),
            refresh: RefreshConfig::default(),
        })
    }
}

#[derive(Debug, Clone)]
struct ProviderState {
    identity: Identity,
    id_token: Option<String>,
    expires_at: DateTime<Utc>,
    refresh_token: String,
}

impl ProviderState {
    fn fresh_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let usable_until = self.expires_at - ChronoDuration::seconds(EXPIRY_SKEW_SECS);
        self.id_token.as_deref().filter(|_| now < usable_until)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileRequest<'a> {
    id_token: &'a str,
    display_name: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OobRequest<'a> {
    request_type: &'static str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn expiry_from(expires_in: &str) -> DateTime<Utc> {
    let secs = expires_in.parse::<i64>().unwrap_or(3600);
    Utc::now() + ChronoDuration::seconds(secs)
}

/// REST identity provider.
pub struct RestIdentityProvider {
    http_client: Client,
    config: RestProviderConfig,
    vault: TokenVault,
    state: Mutex<Option<ProviderState>>,
    changes: watch::Sender<Option<Identity>>,
}

impl RestIdentityProvider {
    pub fn new(config: RestProviderConfig, vault: TokenVault) -> AuthResult<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))?;
        let (changes, _) = watch::channel(None);
        Ok(Self {
            http_client,
            config,
            vault,
            state: Mutex::new(None),
            changes,
        })
    }

    /// Load a persisted refresh credential. The id token is fetched lazily
    /// on the next [`IdentityProvider::get_id_token`] call.
    pub fn restore(&self) -> AuthResult<Option<Identity>> {
        let Some(stored) = self.vault.get_provider_session()? else {
            debug!("No persisted provider session");
            return Ok(None);
        };

        let identity = Identity {
            uid: stored.uid,
            email: stored.email,
            display_name: stored.display_name,
        };
        *self.state.lock() = Some(ProviderState {
            identity: identity.clone(),
            id_token: None,
            expires_at: Utc::now(),
            refresh_token: stored.refresh_token,
        });
        info!(user_id = %identity.uid, "Provider session restored");
        self.changes.send_replace(Some(identity.clone()));
        Ok(Some(identity))
    }

    fn endpoint(&self, base: &Url, path: &str) -> ProviderResult<Url> {
        let mut url = base
            .join(path)
            .map_err(|e| ProviderError::new("INVALID_ENDPOINT", e.to_string()))?;
        url.query_pairs_mut().append_pair("key", &self.config.api_key);
        Ok(url)
    }

    async fn post<B, R>(&self, url: Url, body: &B) -> ProviderResult<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self.http_client.post(url).json(body).send().await?;
        let status = response.status();

        if !status.is_success() {
            if status.is_server_error() {
                return Err(ProviderError::unavailable(status.as_u16()));
            }
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(envelope) => ProviderError::from_rest_message(&envelope.error.message),
                Err(_) => ProviderError::new(format!("HTTP_{}", status.as_u16()), body),
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ProviderError::new("UNEXPECTED_RESPONSE", e.to_string()))
    }

    fn establish(&self, account: AccountResponse) -> Identity {
        let identity = Identity {
            uid: account.local_id,
            email: account.email,
            display_name: account.display_name,
        };
        let state = ProviderState {
            identity: identity.clone(),
            id_token: Some(account.id_token),
            expires_at: expiry_from(&account.expires_in),
            refresh_token: account.refresh_token,
        };
        self.persist(&state);
        *self.state.lock() = Some(state);
        self.changes.send_replace(Some(identity.clone()));
        identity
    }

    fn persist(&self, state: &ProviderState) {
        let stored = ProviderSession {
            uid: state.identity.uid.clone(),
            email: state.identity.email.clone(),
            display_name: state.identity.display_name.clone(),
            refresh_token: state.refresh_token.clone(),
        };
        if let Err(e) = self.vault.set_provider_session(&stored) {
            warn!(error = %e, "Failed to persist provider session");
        }
    }

    async fn refresh_with_backoff(&self, refresh_token: &str) -> ProviderResult<RefreshResponse> {
        let url = self.endpoint(&self.config.secure_token_url, "v1/token")?;
        let retry = &self.config.refresh;
        let mut attempt = 0;

        loop {
            let request = RefreshRequest {
                grant_type: "refresh_token",
                refresh_token,
            };
            match self.post::<_, RefreshResponse>(url.clone(), &request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt + 1 < retry.max_retries => {
                    let delay = retry.delay_for_attempt(attempt);
                    debug!(
                        attempt = attempt + 1,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Token refresh failed with transient error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn sign_in_with_credentials(&self, credentials: &Credentials) -> ProviderResult<Identity> {
        let url = self.endpoint(&self.config.identity_url, "v1/accounts:signInWithPassword")?;
        debug!(email = %credentials.email, "Signing in with password");

        let account: AccountResponse = self
            .post(
                url,
                &PasswordRequest {
                    email: &credentials.email,
                    password: &credentials.password,
                    return_secure_token: true,
                },
            )
            .await?;
        Ok(self.establish(account))
    }

    async fn create_account(
        &self,
        credentials: &Credentials,
        display_name: Option<&str>,
    ) -> ProviderResult<Identity> {
        let url = self.endpoint(&self.config.identity_url, "v1/accounts:signUp")?;
        let account: AccountResponse = self
            .post(
                url,
                &PasswordRequest {
                    email: &credentials.email,
                    password: &credentials.password,
                    return_secure_token: true,
                },
            )
            .await?;
        let identity = self.establish(account);

        match display_name {
            Some(name) => self.update_display_name(name).await,
            None => Ok(identity),
        }
    }

    async fn sign_out(&self) -> ProviderResult<()> {
        *self.state.lock() = None;
        if let Err(e) = self.vault.clear_provider_session() {
            warn!(error = %e, "Failed to clear provider session");
        }
        self.changes.send_replace(None);
        Ok(())
    }

    async fn get_id_token(&self, force_refresh: bool) -> ProviderResult<Option<String>> {
        let (uid, refresh_token) = {
            let state = self.state.lock();
            let Some(state) = state.as_ref() else {
                return Ok(None);
            };
            if !force_refresh {
                if let Some(token) = state.fresh_token(Utc::now()) {
                    return Ok(Some(token.to_string()));
                }
            }
            (state.identity.uid.clone(), state.refresh_token.clone())
        };

        debug!(user_id = %uid, force_refresh, "Refreshing id token");
        let refreshed = self.refresh_with_backoff(&refresh_token).await?;

        let mut guard = self.state.lock();
        match guard.as_mut() {
            Some(state) if state.identity.uid == uid => {
                state.id_token = Some(refreshed.id_token.clone());
                state.refresh_token = refreshed.refresh_token;
                state.expires_at = expiry_from(&refreshed.expires_in);
                let snapshot = state.clone();
                drop(guard);
                self.persist(&snapshot);
                Ok(Some(refreshed.id_token))
            }
            _ => {
                debug!(user_id = %uid, "User changed during refresh, discarding token");
                Ok(None)
            }
        }
    }

    async fn send_password_reset(&self, email: &str) -> ProviderResult<()> {
        let url = self.endpoint(&self.config.identity_url, "v1/accounts:sendOobCode")?;
        let _: serde_json::Value = self
            .post(
                url,
                &OobRequest {
                    request_type: "PASSWORD_RESET",
                    email,
                },
            )
            .await?;
        info!(email = %email, "Password reset email requested");
        Ok(())
    }

    async fn update_display_name(&self, display_name: &str) -> ProviderResult<Identity> {
        let id_token = self
            .get_id_token(false)
            .await?
            .ok_or_else(|| ProviderError::new("auth/no-current-user", "not signed in"))?;
        let url = self.endpoint(&self.config.identity_url, "v1/accounts:update")?;
        let _: serde_json::Value = self
            .post(
                url,
                &UpdateProfileRequest {
                    id_token: &id_token,
                    display_name,
                    return_secure_token: false,
                },
            )
            .await?;

        let identity = {
            let mut guard = self.state.lock();
            let state = guard
                .as_mut()
                .ok_or_else(|| ProviderError::new("auth/no-current-user", "not signed in"))?;
            state.identity.display_name = Some(display_name.to_string());
            let snapshot = state.clone();
            drop(guard);
            self.persist(&snapshot);
            snapshot.identity
        };
        self.changes.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    fn current_identity(&self) -> Option<Identity> {
        self.state.lock().as_ref().map(|s| s.identity.clone())
    }

    fn auth_state_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> RestIdentityProvider {
        let config = RestProviderConfig {
            identity_url: Url::parse("https://identity.example.com").unwrap(),
            secure_token_url: Url::parse("https://token.example.com").unwrap(),
            api_key: "key-1".into(),
            timeout: Duration::from_secs(1),
            refresh: RefreshConfig::default(),
        };
        RestIdentityProvider::new(config, TokenVault::in_memory()).unwrap()
    }

    #[test]
    fn test_refresh_config_delay_exponential_backoff() {
        let config = RefreshConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(5000));
        assert_eq!(config.delay_for_attempt(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_endpoint_appends_api_key() {
        let provider = provider();
        let url = provider
            .endpoint(&provider.config.identity_url, "v1/accounts:signInWithPassword")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://identity.example.com/v1/accounts:signInWithPassword?key=key-1"
        );
    }

    #[test]
    fn test_from_config_requires_api_key() {
        let config = Config::default();
        assert!(matches!(
            RestProviderConfig::from_config(&config),
            Err(AuthError::Config(_))
        ));

        let config = Config {
            auth_api_key: Some("abc".into()),
            ..Config::default()
        };
        let rest = RestProviderConfig::from_config(&config).unwrap();
        assert_eq!(rest.api_key, "abc");
        assert_eq!(rest.timeout, Duration::from_millis(8000));
    }

    #[test]
    fn test_fresh_token_respects_skew() {
        let now = Utc::now();
        let mut state = ProviderState {
            identity: Identity::new("u1"),
            id_token: Some("tok".into()),
            expires_at: now + ChronoDuration::seconds(30),
            refresh_token: "r".into(),
        };
        assert!(state.fresh_token(now).is_none());

        state.expires_at = now + ChronoDuration::seconds(600);
        assert_eq!(state.fresh_token(now), Some("tok"));
    }

    #[tokio::test]
    async fn test_restore_from_vault() {
        let vault = TokenVault::in_memory();
        vault
            .set_provider_session(&ProviderSession {
                uid: "u9".into(),
                email: Some("rider@example.com".into()),
                display_name: None,
                refresh_token: "refresh-9".into(),
            })
            .unwrap();

        let config = RestProviderConfig {
            identity_url: Url::parse("https://identity.example.com").unwrap(),
            secure_token_url: Url::parse("https://token.example.com").unwrap(),
            api_key: "key-1".into(),
            timeout: Duration::from_secs(1),
            refresh: RefreshConfig::default(),
        };
        let provider = RestIdentityProvider::new(config, vault.clone()).unwrap();

        let restored = provider.restore().unwrap().unwrap();
        assert_eq!(restored.uid, "u9");
        assert_eq!(provider.current_identity(), Some(restored));

        provider.sign_out().await.unwrap();
        assert!(provider.current_identity().is_none());
        assert!(vault.get_provider_session().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_id_token_signed_out_is_none() {
        let provider = provider();
        assert_eq!(provider.get_id_token(true).await.unwrap(), None);
    }
}
