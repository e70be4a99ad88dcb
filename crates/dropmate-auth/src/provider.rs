//! Identity provider seam.

use crate::ProviderResult;
use async_trait::async_trait;
use dropmate_types::{Credentials, Identity};
use tokio::sync::watch;

/// External identity service that owns credentials and issues id tokens.
///
/// The [`crate::SessionManager`] never talks to a backend directly; it drives
/// one of these.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_with_credentials(&self, credentials: &Credentials) -> ProviderResult<Identity>;

    /// Create an account and sign it in.
    async fn create_account(
        &self,
        credentials: &Credentials,
        display_name: Option<&str>,
    ) -> ProviderResult<Identity>;

    async fn sign_out(&self) -> ProviderResult<()>;

    /// Current id token, refreshed when `force_refresh` is set or the cached
    /// one is near expiry. `Ok(None)` when nobody is signed in.
    async fn get_id_token(&self, force_refresh: bool) -> ProviderResult<Option<String>>;

    async fn send_password_reset(&self, email: &str) -> ProviderResult<()>;

    /// Change the signed-in user's display name.
    async fn update_display_name(&self, display_name: &str) -> ProviderResult<Identity>;

    fn current_identity(&self) -> Option<Identity>;

    /// Receiver that observes every sign-in and sign-out the provider makes.
    fn auth_state_changes(&self) -> watch::Receiver<Option<Identity>>;
}
