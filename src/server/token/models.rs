use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::server::issuer::IssuedToken;

pub const EXEC_CREDENTIAL_KIND: &str = "ExecCredential";
pub const EXEC_CREDENTIAL_API_VERSION: &str = "client.authentication.k8s.io/v1beta1";

/// Request to mint a token for a role
#[derive(Debug, Deserialize)]
pub struct TokenRequestPayload {
    /// A missing role is treated as the empty role and fails lookup
    #[serde(default)]
    pub role: String,
}

/// Exec credential returned to credential plugins
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCredential {
    pub kind: &'static str,
    pub api_version: &'static str,
    pub token: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_rfc3339_seconds"
    )]
    pub expiration_timestamp: Option<DateTime<Utc>>,
}

impl From<IssuedToken> for ExecCredential {
    fn from(issued: IssuedToken) -> Self {
        Self {
            kind: EXEC_CREDENTIAL_KIND,
            api_version: EXEC_CREDENTIAL_API_VERSION,
            token: issued.token,
            expiration_timestamp: issued.expiration_timestamp,
        }
    }
}

/// Kubernetes timestamps are RFC3339 with whole seconds and a `Z` suffix
fn serialize_rfc3339_seconds<S>(
    timestamp: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match timestamp {
        Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        None => serializer.serialize_none(),
    }
}
