mod kubernetes;

pub use kubernetes::{build_kube_client, KubeTokenIssuer};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A token minted by the issuance authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expiration_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum IssuanceError {
    #[error("Kubernetes API request failed")]
    Api(#[from] kube::Error),

    #[error("TokenRequest for {namespace}/{service_account} returned no status")]
    MissingStatus {
        service_account: String,
        namespace: String,
    },

    #[cfg(test)]
    #[error("simulated issuance failure: {0}")]
    Simulated(String),
}

/// Mints short-lived tokens for a ServiceAccount
///
/// Implementations make exactly one attempt per call; retries are up to the client.
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Mint a token for `service_account` in `namespace` valid for at most
    /// `expiration_seconds`
    async fn mint(
        &self,
        service_account: &str,
        namespace: &str,
        expiration_seconds: i64,
    ) -> Result<IssuedToken, IssuanceError>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Arguments of a single `mint` call
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MintCall {
        pub service_account: String,
        pub namespace: String,
        pub expiration_seconds: i64,
    }

    /// Issuer fake that records calls and returns queued failures before succeeding
    pub struct RecordingIssuer {
        calls: Mutex<Vec<MintCall>>,
        failures: Mutex<VecDeque<String>>,
        pub expiration_timestamp: Option<DateTime<Utc>>,
    }

    impl RecordingIssuer {
        pub fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failures: Mutex::new(VecDeque::new()),
                expiration_timestamp: Some(
                    DateTime::parse_from_rfc3339("2026-10-18T13:00:00Z")
                        .unwrap()
                        .with_timezone(&Utc),
                ),
            }
        }

        /// Make the next call fail with `reason`
        pub fn fail_next(&self, reason: &str) {
            self.failures.lock().unwrap().push_back(reason.to_string());
        }

        pub fn calls(&self) -> Vec<MintCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Token returned for a given ServiceAccount
        pub fn token_for(service_account: &str, namespace: &str) -> String {
            format!("token-{}-{}", namespace, service_account)
        }
    }

    #[async_trait]
    impl TokenIssuer for RecordingIssuer {
        async fn mint(
            &self,
            service_account: &str,
            namespace: &str,
            expiration_seconds: i64,
        ) -> Result<IssuedToken, IssuanceError> {
            self.calls.lock().unwrap().push(MintCall {
                service_account: service_account.to_string(),
                namespace: namespace.to_string(),
                expiration_seconds,
            });

            if let Some(reason) = self.failures.lock().unwrap().pop_front() {
                return Err(IssuanceError::Simulated(reason));
            }

            Ok(IssuedToken {
                token: Self::token_for(service_account, namespace),
                expiration_timestamp: self.expiration_timestamp,
            })
        }
    }
}
