//! Construction of the core's components for one run.

use super::RunOptions;
use dropmate_api::{AuthenticatedClient, HttpTransport, LocalBackend, ReqwestTransport, ShipmentsClient};
use dropmate_auth::{
    IdentityProvider, MemoryIdentityProvider, ProviderWatch, RestIdentityProvider, RestProviderConfig,
    SessionManager,
};
use dropmate_cache::QueryCache;
use dropmate_config_and_utils::{Config, Paths};
use dropmate_lifecycle::{AppState, AppStateSource};
use dropmate_realtime::{
    ChannelController, ChannelTransport, LoopbackTransport, WebSocketConfig, WebSocketTransport,
};
use dropmate_storage::{open_file_vault, TokenVault};
use dropmate_sync::CacheReconciler;
use dropmate_types::Credentials;
use std::sync::Arc;
use tracing::info;

const OFFLINE_USER_ID: &str = "offline-user";

pub struct Services {
    pub session: SessionManager,
    pub controller: ChannelController,
    pub shipments: ShipmentsClient,
    pub reconciler: CacheReconciler,
    pub app_state: AppStateSource,
    /// Set in offline runs, where it stands in for the realtime server.
    pub loopback: Option<Arc<LoopbackTransport>>,
    pub provider_watch: ProviderWatch,
}

impl Services {
    /// Build every component and leave the session authenticated.
    pub async fn build(
        config: &Config,
        paths: &Paths,
        options: &RunOptions,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (provider, vault, channel, loopback): (
            Arc<dyn IdentityProvider>,
            TokenVault,
            Arc<dyn ChannelTransport>,
            Option<Arc<LoopbackTransport>>,
        ) = if options.offline {
            let password = options.password.clone().unwrap_or_default();
            let provider =
                MemoryIdentityProvider::new().with_account(&options.email, &password, OFFLINE_USER_ID);
            let loopback = Arc::new(LoopbackTransport::new());
            info!("Running offline");
            (
                Arc::new(provider),
                TokenVault::in_memory(),
                loopback.clone(),
                Some(loopback),
            )
        } else {
            let vault = open_file_vault(paths.secure_store_file())?;
            let provider = RestIdentityProvider::new(RestProviderConfig::from_config(config)?, vault.clone())?;
            if let Some(identity) = provider.restore()? {
                info!(user_id = %identity.uid, "Restored provider session");
            }
            let channel = WebSocketTransport::new(WebSocketConfig::from_config(config)?);
            (Arc::new(provider), vault, Arc::new(channel), None)
        };

        let http: Arc<dyn HttpTransport> = if config.use_http && !options.offline {
            Arc::new(ReqwestTransport::from_config(config)?)
        } else {
            info!("Using bundled shipment data");
            Arc::new(LocalBackend::seeded())
        };

        let session = SessionManager::new(provider, vault);
        let provider_watch = session.watch_provider();
        session.hydrate().await?;

        if !session.is_authenticated() {
            let password = options
                .password
                .as_deref()
                .ok_or("a password is required to sign in (--password or DROPMATE_PASSWORD)")?;
            session
                .sign_in(&Credentials::new(options.email.as_str(), password))
                .await?;
        }
        info!(user_id = ?session.snapshot().user_id(), "Session ready");

        let cache = QueryCache::new();
        let client = AuthenticatedClient::new(http).with_session(session.clone());
        Ok(Self {
            controller: ChannelController::new(channel, session.clone()),
            shipments: ShipmentsClient::new(client, cache.clone()),
            reconciler: CacheReconciler::new(cache),
            app_state: AppStateSource::new(AppState::Active),
            session,
            loopback,
            provider_watch,
        })
    }
}
