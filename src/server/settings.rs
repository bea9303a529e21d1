use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

/// Flat environment variables honoured for compatibility with plain container deployments.
/// Each maps onto a nested settings key; empty values are ignored.
const LEGACY_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("AUTH_TOKEN", "auth.token"),
    ("READONLY_SA", "roles.read_only.service_account"),
    ("READONLY_NS", "roles.read_only.namespace"),
    ("ADMIN_SA", "roles.admin.service_account"),
    ("ADMIN_NS", "roles.admin.namespace"),
    ("ROLES_CONFIG", "roles.config"),
    ("TOKEN_EXPIRY_MINUTES", "token.expiry_minutes"),
];

/// The API server refuses TokenRequests shorter than ten minutes
const MIN_ACCEPTED_EXPIRY_MINUTES: i64 = 10;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub roles: RoleSettings,
    #[serde(default)]
    pub token: TokenSettings,
    #[serde(default)]
    pub kubernetes: KubernetesSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthSettings {
    /// Shared secret expected as `Authorization: Token <secret>`.
    /// Unset or empty disables authentication for trusted-network deployments.
    #[serde(default)]
    pub token: Option<String>,
}

/// Which role table strategy to use
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoleMode {
    /// Two roles (`read-only`, `admin`) bound from discrete settings
    Fixed,
    /// Arbitrary JSON table from `roles.config`, or the built-in default
    Table,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoleSettings {
    /// Explicit strategy. When unset, `table` is chosen if `config` is present, otherwise `fixed`.
    #[serde(default)]
    pub mode: Option<RoleMode>,

    /// JSON-encoded role table, e.g. `{"admin": {"serviceAccount": "admin", "namespace": "default"}}`
    #[serde(default)]
    pub config: Option<String>,

    #[serde(default = "default_read_only_role")]
    pub read_only: FixedRoleSettings,

    #[serde(default = "default_admin_role")]
    pub admin: FixedRoleSettings,
}

impl Default for RoleSettings {
    fn default() -> Self {
        Self {
            mode: None,
            config: None,
            read_only: default_read_only_role(),
            admin: default_admin_role(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FixedRoleSettings {
    pub service_account: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenSettings {
    /// Lifetime requested for minted tokens, in minutes (default: 60)
    #[serde(default = "default_expiry_minutes")]
    pub expiry_minutes: i64,

    /// Audiences for minted tokens. Empty means the API server's default audience.
    #[serde(default)]
    pub audiences: Vec<String>,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            expiry_minutes: default_expiry_minutes(),
            audiences: Vec::new(),
        }
    }
}

impl TokenSettings {
    pub fn expiration_seconds(&self) -> i64 {
        self.expiry_minutes.saturating_mul(60)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KubernetesSettings {
    /// Path to a single kubeconfig file. When unset the config is inferred from
    /// `KUBECONFIG` (colon-separated lists allowed), `~/.kube/config` or the in-cluster service account.
    #[serde(default)]
    pub kubeconfig: Option<String>,

    /// Kubeconfig context to use (only with an explicit kubeconfig)
    #[serde(default)]
    pub context: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_read_only_role() -> FixedRoleSettings {
    FixedRoleSettings {
        service_account: "readonly".to_string(),
        namespace: default_namespace(),
    }
}

fn default_admin_role() -> FixedRoleSettings {
    FixedRoleSettings {
        service_account: "admin".to_string(),
        namespace: default_namespace(),
    }
}

fn default_expiry_minutes() -> i64 {
    60
}

impl Settings {
    /// Try to add a config file with multiple extension attempts (.toml, .yaml, .yml)
    /// Returns true if a file was found
    fn try_add_config_file(
        builder: &mut config::ConfigBuilder<config::builder::DefaultState>,
        config_dir: &str,
        name: &str,
    ) -> bool {
        for ext in ["toml", "yaml", "yml"] {
            let path = format!("{}/{}.{}", config_dir, name, ext);
            if std::path::Path::new(&path).exists() {
                tracing::info!("Loading config file: {}", path);
                *builder = builder
                    .clone()
                    .add_source(config::File::with_name(&format!("{}/{}", config_dir, name)));
                return true;
            }
        }

        tracing::debug!(
            "Optional config file not found: {}/{}.{{toml,yaml,yml}}",
            config_dir,
            name
        );
        false
    }

    /// Load settings from the config directory and the process environment
    pub fn new() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars().collect();
        let config_dir = vars
            .get("BROKER_CONFIG_DIR")
            .cloned()
            .unwrap_or_else(|| "config".into());

        Self::load(&config_dir, vars)
    }

    /// Load settings from `config_dir` and the given environment
    ///
    /// Layers, later wins: `default.*`, `local.*`, `BROKER_<SECTION>__<KEY>`
    /// variables, then the flat legacy variables.
    pub fn load(config_dir: &str, vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        // Per-field role defaults so a partial override (e.g. only ADMIN_NS) keeps the rest
        let mut builder = Config::builder()
            .set_default("roles.read_only.service_account", "readonly")?
            .set_default("roles.read_only.namespace", default_namespace())?
            .set_default("roles.admin.service_account", "admin")?
            .set_default("roles.admin.namespace", default_namespace())?;

        Self::try_add_config_file(&mut builder, config_dir, "default");
        Self::try_add_config_file(&mut builder, config_dir, "local");

        let prefixed: HashMap<String, String> = vars
            .iter()
            .filter(|(key, _)| key.starts_with("BROKER_") && key.as_str() != "BROKER_CONFIG_DIR")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        builder = builder.add_source(
            Environment::with_prefix("BROKER")
                .prefix_separator("_")
                .separator("__")
                .source(Some(prefixed)),
        );

        for (var, key) in LEGACY_ENV_OVERRIDES {
            let value = vars.get(*var).filter(|value| !value.is_empty());
            builder = builder.set_override_option(*key, value.cloned())?;
        }

        let config = builder.build()?;

        // Deserialize and collect unused fields
        let mut unused_fields = Vec::new();
        let settings: Settings = serde_ignored::deserialize(config, |path| {
            unused_fields.push(path.to_string());
        })
        .map_err(|e| ConfigError::Message(format!("Failed to deserialize settings: {}", e)))?;

        for field in &unused_fields {
            tracing::warn!("Unknown configuration field: {}", field);
        }

        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.token.expiry_minutes <= 0 {
            return Err(ConfigError::Message(format!(
                "token.expiry_minutes must be greater than zero. Got: {}",
                self.token.expiry_minutes
            )));
        }

        if self.token.expiry_minutes.checked_mul(60).is_none() {
            return Err(ConfigError::Message(format!(
                "token.expiry_minutes is too large to express in seconds. Got: {}",
                self.token.expiry_minutes
            )));
        }

        if self.token.expiry_minutes < MIN_ACCEPTED_EXPIRY_MINUTES {
            tracing::warn!(
                expiry_minutes = self.token.expiry_minutes,
                "Token lifetime is below the {} minute minimum accepted by the Kubernetes API server; token requests will likely fail",
                MIN_ACCEPTED_EXPIRY_MINUTES
            );
        }

        if self.roles.mode == Some(RoleMode::Fixed)
            && self.roles.config.as_deref().is_some_and(|c| !c.trim().is_empty())
        {
            return Err(ConfigError::Message(
                "roles.mode is 'fixed' but roles.config (ROLES_CONFIG) is also set. Use one or the other".to_string(),
            ));
        }

        if self.kubernetes.context.is_some() && self.kubernetes.kubeconfig.is_none() {
            return Err(ConfigError::Message(
                "kubernetes.context requires kubernetes.kubeconfig to be set".to_string(),
            ));
        }

        Ok(())
    }

    /// Shared secret, if authentication is enabled
    pub fn auth_token(&self) -> Option<&str> {
        self.auth.token.as_deref().filter(|token| !token.is_empty())
    }
}
