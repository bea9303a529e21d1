use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::authentication::v1::{TokenRequest, TokenRequestSpec, TokenRequestStatus};
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::api::{Api, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use tracing::{debug, info};

use super::{IssuanceError, IssuedToken, TokenIssuer};
use crate::server::settings::KubernetesSettings;

/// Build a Kubernetes client from settings and verify the API server is reachable
///
/// An explicit kubeconfig (and optional context) wins; otherwise the config is
/// inferred (`KUBECONFIG` or `~/.kube/config` first, then the in-cluster service account).
pub async fn build_kube_client(settings: &KubernetesSettings) -> Result<Client> {
    // Install default CryptoProvider for rustls (required for kube-rs HTTPS connections)
    rustls::crypto::ring::default_provider()
        .install_default()
        .ok();

    let kube_config = match &settings.kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig from {}", path))?;
            kube::Config::from_custom_kubeconfig(
                kubeconfig,
                &KubeConfigOptions {
                    context: settings.context.clone(),
                    cluster: None,
                    user: None,
                },
            )
            .await
            .context("Failed to load kubeconfig")?
        }
        None => kube::Config::infer()
            .await
            .context("Failed to infer Kubernetes config (KUBECONFIG, ~/.kube/config or in-cluster)")?,
    };

    let cluster_url = kube_config.cluster_url.to_string();
    let client = Client::try_from(kube_config).context("Failed to create Kubernetes client")?;

    // Test Kubernetes API connection before serving traffic
    let version = client
        .apiserver_version()
        .await
        .with_context(|| format!("Failed to reach Kubernetes API server at {}", cluster_url))?;
    info!(
        cluster_url = %cluster_url,
        version = %version.git_version,
        "Connected to Kubernetes API server"
    );

    Ok(client)
}

/// Issues tokens through the ServiceAccount `token` subresource (TokenRequest API)
pub struct KubeTokenIssuer {
    client: Client,
    audiences: Vec<String>,
}

impl KubeTokenIssuer {
    pub fn new(client: Client, audiences: Vec<String>) -> Self {
        Self { client, audiences }
    }
}

/// TokenRequest body for the given lifetime and audiences
fn token_request(expiration_seconds: i64, audiences: &[String]) -> TokenRequest {
    TokenRequest {
        spec: TokenRequestSpec {
            audiences: audiences.to_vec(),
            expiration_seconds: Some(expiration_seconds),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn issued_token(status: TokenRequestStatus) -> IssuedToken {
    IssuedToken {
        token: status.token,
        expiration_timestamp: Some(status.expiration_timestamp.0),
    }
}

#[async_trait]
impl TokenIssuer for KubeTokenIssuer {
    async fn mint(
        &self,
        service_account: &str,
        namespace: &str,
        expiration_seconds: i64,
    ) -> Result<IssuedToken, IssuanceError> {
        debug!(
            service_account = %service_account,
            namespace = %namespace,
            expiration_seconds,
            "Creating TokenRequest"
        );

        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let response = api
            .create_token_request(
                service_account,
                &PostParams::default(),
                &token_request(expiration_seconds, &self.audiences),
            )
            .await?;

        response
            .status
            .map(issued_token)
            .ok_or_else(|| IssuanceError::MissingStatus {
                service_account: service_account.to_string(),
                namespace: namespace.to_string(),
            })
    }
}
