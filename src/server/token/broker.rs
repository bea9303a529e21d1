use axum::http::Method;
use std::sync::Arc;
use tracing::{debug, info};

use super::models::{ExecCredential, TokenRequestPayload};
use crate::server::error::ServerError;
use crate::server::issuer::{IssuanceError, TokenIssuer};
use crate::server::roles::{RoleTable, UnknownRole};
use crate::server::settings::TokenSettings;

/// Lifetime bound applied to every minted token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuanceConfig {
    pub expiration_seconds: i64,
}

impl From<&TokenSettings> for IssuanceConfig {
    fn from(settings: &TokenSettings) -> Self {
        Self {
            expiration_seconds: settings.expiration_seconds(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Invalid request body")]
    InvalidBody(#[source] serde_json::Error),

    #[error(transparent)]
    UnknownRole(#[from] UnknownRole),

    #[error("Failed to create token")]
    Issuance {
        role: String,
        service_account: String,
        namespace: String,
        #[source]
        source: IssuanceError,
    },
}

impl From<BrokerError> for ServerError {
    fn from(err: BrokerError) -> Self {
        let message = err.to_string();
        match err {
            BrokerError::MethodNotAllowed => ServerError::method_not_allowed(message),
            BrokerError::InvalidBody(e) => {
                tracing::debug!("Rejected token request body: {}", e);
                ServerError::bad_request(message)
            }
            BrokerError::UnknownRole(e) => {
                tracing::info!(role = %e.role, "Rejected token request for unknown role");
                ServerError::bad_request(message)
            }
            BrokerError::Issuance {
                role,
                service_account,
                namespace,
                source,
            } => ServerError::internal_anyhow(source.into(), message)
                .with_context("role", role)
                .with_context("service_account", service_account)
                .with_context("namespace", namespace),
        }
    }
}

/// Resolves roles and mints one token per request
pub struct TokenBroker {
    roles: RoleTable,
    issuer: Arc<dyn TokenIssuer>,
    config: IssuanceConfig,
}

impl TokenBroker {
    pub fn new(roles: RoleTable, issuer: Arc<dyn TokenIssuer>, config: IssuanceConfig) -> Self {
        Self {
            roles,
            issuer,
            config,
        }
    }

    pub fn roles(&self) -> &RoleTable {
        &self.roles
    }

    /// Handle one token request
    ///
    /// Nothing is minted unless the method, body and role are all valid.
    pub async fn handle(&self, method: &Method, body: &[u8]) -> Result<ExecCredential, BrokerError> {
        if *method != Method::POST {
            return Err(BrokerError::MethodNotAllowed);
        }

        let request: TokenRequestPayload =
            serde_json::from_slice(body).map_err(BrokerError::InvalidBody)?;

        let entry = self.roles.resolve(&request.role)?;

        debug!(
            role = %request.role,
            service_account = %entry.service_account,
            namespace = %entry.namespace,
            expiration_seconds = self.config.expiration_seconds,
            "Minting token"
        );

        let issued = self
            .issuer
            .mint(
                &entry.service_account,
                &entry.namespace,
                self.config.expiration_seconds,
            )
            .await
            .map_err(|source| BrokerError::Issuance {
                role: request.role.clone(),
                service_account: entry.service_account.clone(),
                namespace: entry.namespace.clone(),
                source,
            })?;

        info!(
            role = %request.role,
            service_account = %entry.service_account,
            namespace = %entry.namespace,
            "Issued token"
        );

        Ok(ExecCredential::from(issued))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::issuer::testing::{MintCall, RecordingIssuer};
    use crate::server::roles::RoleEntry;
    use axum::http::StatusCode;

    fn broker(issuer: Arc<RecordingIssuer>) -> TokenBroker {
        let roles = RoleTable::from_json(
            r#"{
                "read-only": {"serviceAccount": "viewer", "namespace": "tools"},
                "admin": {"serviceAccount": "root", "namespace": "kube-system"},
                "deployer": {"serviceAccount": "ci", "namespace": "ci"}
            }"#,
        )
        .unwrap();

        TokenBroker::new(
            roles,
            issuer,
            IssuanceConfig {
                expiration_seconds: 45 * 60,
            },
        )
    }

    #[tokio::test]
    async fn test_every_role_mints_once_with_its_binding() {
        let issuer = Arc::new(RecordingIssuer::new());
        let broker = broker(issuer.clone());

        let bindings: Vec<(String, RoleEntry)> = broker
            .roles()
            .roles()
            .map(|(role, entry)| (role.to_string(), entry.clone()))
            .collect();

        for (i, (role, entry)) in bindings.iter().enumerate() {
            let body = serde_json::json!({ "role": role }).to_string();
            let credential = broker.handle(&Method::POST, body.as_bytes()).await.unwrap();

            assert_eq!(credential.kind, "ExecCredential");
            assert_eq!(credential.api_version, "client.authentication.k8s.io/v1beta1");
            assert_eq!(
                credential.token,
                RecordingIssuer::token_for(&entry.service_account, &entry.namespace)
            );
            assert_eq!(credential.expiration_timestamp, issuer.expiration_timestamp);

            let calls = issuer.calls();
            assert_eq!(calls.len(), i + 1);
            assert_eq!(
                calls[i],
                MintCall {
                    service_account: entry.service_account.clone(),
                    namespace: entry.namespace.clone(),
                    expiration_seconds: 2700,
                }
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_role_does_not_mint() {
        let issuer = Arc::new(RecordingIssuer::new());
        let broker = broker(issuer.clone());

        for role in ["", "Admin", "read_only", "superuser"] {
            let body = serde_json::json!({ "role": role }).to_string();
            let err = broker.handle(&Method::POST, body.as_bytes()).await.unwrap_err();

            match err {
                BrokerError::UnknownRole(e) => {
                    assert_eq!(e.role, role);
                    assert_eq!(e.known, vec!["admin", "deployer", "read-only"]);
                }
                other => panic!("expected unknown role, got {:?}", other),
            }
        }

        assert!(issuer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_non_post_methods_are_rejected() {
        let issuer = Arc::new(RecordingIssuer::new());
        let broker = broker(issuer.clone());

        for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH, Method::HEAD] {
            let err = broker
                .handle(&method, br#"{"role": "admin"}"#)
                .await
                .unwrap_err();
            assert!(matches!(err, BrokerError::MethodNotAllowed));
        }

        assert!(issuer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let issuer = Arc::new(RecordingIssuer::new());
        let broker = broker(issuer.clone());

        let bodies: [&[u8]; 4] = [b"", b"{", b"role=admin", br#"{"role": ["admin"]}"#];
        for body in bodies {
            let err = broker.handle(&Method::POST, body).await.unwrap_err();
            assert!(matches!(err, BrokerError::InvalidBody(_)));
        }

        assert!(issuer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_body_field_names_are_case_sensitive_and_exact() {
        let issuer = Arc::new(RecordingIssuer::new());
        let broker = broker(issuer.clone());

        let err = broker
            .handle(&Method::POST, br#"{"Role": "admin"}"#)
            .await
            .unwrap_err();
        assert!(matches!(&err, BrokerError::UnknownRole(e) if e.role.is_empty()));

        let err = broker
            .handle(&Method::POST, br#"{"role": "admin"} {}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::InvalidBody(_)));

        assert!(issuer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_issuance_failure_does_not_poison_later_requests() {
        let issuer = Arc::new(RecordingIssuer::new());
        let broker = broker(issuer.clone());
        issuer.fail_next("serviceaccounts \"root\" not found");

        let err = broker
            .handle(&Method::POST, br#"{"role": "admin"}"#)
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            BrokerError::Issuance { role, service_account, namespace, .. }
                if role == "admin" && service_account == "root" && namespace == "kube-system"
        ));

        let credential = broker
            .handle(&Method::POST, br#"{"role": "admin"}"#)
            .await
            .unwrap();
        assert_eq!(credential.token, "token-kube-system-root");
        assert_eq!(issuer.calls().len(), 2);
    }

    #[test]
    fn test_error_status_mapping() {
        let unknown = RoleTable::builtin_default().resolve("nope").unwrap_err();

        let cases: Vec<(BrokerError, StatusCode, &str)> = vec![
            (
                BrokerError::MethodNotAllowed,
                StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed",
            ),
            (
                BrokerError::InvalidBody(serde_json::from_str::<u8>("x").unwrap_err()),
                StatusCode::BAD_REQUEST,
                "Invalid request body",
            ),
            (
                BrokerError::UnknownRole(unknown),
                StatusCode::BAD_REQUEST,
                "Invalid role specified: 'nope' (known roles: admin, read-only)",
            ),
            (
                BrokerError::Issuance {
                    role: "admin".into(),
                    service_account: "admin".into(),
                    namespace: "default".into(),
                    source: IssuanceError::Simulated("connection refused".into()),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create token",
            ),
        ];

        for (err, status, message) in cases {
            let server_err = ServerError::from(err);
            assert_eq!(server_err.status, status);
            assert_eq!(server_err.message, message);
        }
    }

    #[test]
    fn test_issuance_config_from_settings() {
        let settings = TokenSettings {
            expiry_minutes: 60,
            audiences: vec!["vault".to_string()],
        };

        assert_eq!(
            IssuanceConfig::from(&settings),
            IssuanceConfig {
                expiration_seconds: 3600,
            }
        );

        let unbounded = TokenSettings {
            expiry_minutes: i64::MAX,
            audiences: Vec::new(),
        };
        assert_eq!(IssuanceConfig::from(&unbounded).expiration_seconds, i64::MAX);
    }
}
