use anyhow::{Context, Result};
use std::sync::Arc;

use crate::server::auth::Authenticator;
use crate::server::issuer::{build_kube_client, KubeTokenIssuer, TokenIssuer};
use crate::server::roles::RoleTable;
use crate::server::settings::Settings;
use crate::server::token::{IssuanceConfig, TokenBroker};

/// Shared, read-only state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<TokenBroker>,
    pub authenticator: Arc<Authenticator>,
}

impl AppState {
    /// Assemble state from already-built parts
    pub fn new(
        settings: &Settings,
        roles: RoleTable,
        issuer: Arc<dyn TokenIssuer>,
    ) -> Self {
        let broker = TokenBroker::new(roles, issuer, IssuanceConfig::from(&settings.token));

        Self {
            broker: Arc::new(broker),
            authenticator: Arc::new(Authenticator::new(settings.auth_token())),
        }
    }

    /// Build the role table and the Kubernetes issuer; any failure is fatal
    pub async fn new_for_server(settings: &Settings) -> Result<Self> {
        let roles = RoleTable::from_settings(&settings.roles).context("Invalid role table")?;

        let kube_client = build_kube_client(&settings.kubernetes).await?;
        let issuer = KubeTokenIssuer::new(kube_client, settings.token.audiences.clone());

        let state = Self::new(settings, roles, Arc::new(issuer));

        let roles = state.broker.roles();
        tracing::info!("Loaded {} roles", roles.len());
        for (role, entry) in roles.roles() {
            tracing::info!(
                role = %role,
                service_account = %entry.service_account,
                namespace = %entry.namespace,
                "Registered role"
            );
        }

        if !state.authenticator.is_enabled() {
            tracing::warn!(
                "No auth token configured; /token accepts unauthenticated requests. Only run this on a trusted network"
            );
        }

        Ok(state)
    }
}
