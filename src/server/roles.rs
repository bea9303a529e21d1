//! Role table
//!
//! Maps the opaque role names clients ask for to the ServiceAccount (and its
//! namespace) a token gets minted for. The table is built once at startup and
//! never changes afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::server::settings::{FixedRoleSettings, RoleMode, RoleSettings};

/// Role name used for the fixed read-only binding and the built-in default table
pub const READ_ONLY_ROLE: &str = "read-only";
/// Role name used for the fixed admin binding and the built-in default table
pub const ADMIN_ROLE: &str = "admin";

const DEFAULT_READ_ONLY_SERVICE_ACCOUNT: &str = "readonly";
const DEFAULT_ADMIN_SERVICE_ACCOUNT: &str = "admin";
const DEFAULT_NAMESPACE: &str = "default";

/// ServiceAccount binding for a single role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleEntry {
    #[serde(alias = "service_account")]
    pub service_account: String,
    pub namespace: String,
}

impl RoleEntry {
    pub fn new(service_account: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            service_account: service_account.into(),
            namespace: namespace.into(),
        }
    }
}

impl From<&FixedRoleSettings> for RoleEntry {
    fn from(settings: &FixedRoleSettings) -> Self {
        Self::new(&settings.service_account, &settings.namespace)
    }
}

/// Errors raised while building a role table
#[derive(Debug, thiserror::Error)]
pub enum RoleTableError {
    #[error("roles config is not a valid role table: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("role table is empty")]
    Empty,

    #[error("role table contains an empty role name")]
    EmptyRoleName,

    #[error("role '{role}' must name both a service account and a namespace")]
    IncompleteEntry { role: String },

    #[error("roles.mode is 'fixed' but a roles config table was also supplied")]
    ConflictingSources,
}

/// Returned when a role is not part of the table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid role specified: '{role}' (known roles: {})", .known.join(", "))]
pub struct UnknownRole {
    pub role: String,
    pub known: Vec<String>,
}

/// Immutable role name -> ServiceAccount lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTable {
    entries: BTreeMap<String, RoleEntry>,
}

impl RoleTable {
    /// Build the two-role table from discrete read-only and admin bindings
    pub fn fixed(read_only: RoleEntry, admin: RoleEntry) -> Result<Self, RoleTableError> {
        let mut entries = BTreeMap::new();
        entries.insert(READ_ONLY_ROLE.to_string(), read_only);
        entries.insert(ADMIN_ROLE.to_string(), admin);
        Self::from_entries(entries)
    }

    /// Decode a JSON object of `{"<role>": {"serviceAccount": .., "namespace": ..}}`
    pub fn from_json(raw: &str) -> Result<Self, RoleTableError> {
        let entries: BTreeMap<String, RoleEntry> = serde_json::from_str(raw)?;
        Self::from_entries(entries)
    }

    /// Table used when no roles config is supplied
    pub fn builtin_default() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            READ_ONLY_ROLE.to_string(),
            RoleEntry::new(DEFAULT_READ_ONLY_SERVICE_ACCOUNT, DEFAULT_NAMESPACE),
        );
        entries.insert(
            ADMIN_ROLE.to_string(),
            RoleEntry::new(DEFAULT_ADMIN_SERVICE_ACCOUNT, DEFAULT_NAMESPACE),
        );
        Self { entries }
    }

    /// Build the table selected by the role settings
    ///
    /// Without an explicit mode, a supplied `roles.config` selects the table
    /// strategy and its absence selects the fixed strategy.
    pub fn from_settings(settings: &RoleSettings) -> Result<Self, RoleTableError> {
        let table_json = settings
            .config
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty());

        let mode = settings.mode.unwrap_or(if table_json.is_some() {
            RoleMode::Table
        } else {
            RoleMode::Fixed
        });

        match (mode, table_json) {
            (RoleMode::Fixed, Some(_)) => Err(RoleTableError::ConflictingSources),
            (RoleMode::Fixed, None) => Self::fixed(
                RoleEntry::from(&settings.read_only),
                RoleEntry::from(&settings.admin),
            ),
            (RoleMode::Table, Some(raw)) => Self::from_json(raw),
            (RoleMode::Table, None) => Ok(Self::builtin_default()),
        }
    }

    fn from_entries(entries: BTreeMap<String, RoleEntry>) -> Result<Self, RoleTableError> {
        if entries.is_empty() {
            return Err(RoleTableError::Empty);
        }

        for (role, entry) in &entries {
            if role.is_empty() {
                return Err(RoleTableError::EmptyRoleName);
            }
            if entry.service_account.is_empty() || entry.namespace.is_empty() {
                return Err(RoleTableError::IncompleteEntry { role: role.clone() });
            }
        }

        Ok(Self { entries })
    }

    /// Exact, case-sensitive lookup
    pub fn resolve(&self, role: &str) -> Result<&RoleEntry, UnknownRole> {
        self.entries.get(role).ok_or_else(|| UnknownRole {
            role: role.to_string(),
            known: self.role_names(),
        })
    }

    /// Sorted list of known role names
    pub fn role_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn roles(&self) -> impl Iterator<Item = (&str, &RoleEntry)> {
        self.entries.iter().map(|(role, entry)| (role.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
