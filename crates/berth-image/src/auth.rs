//! Per-registry credential records for build requests.
//!
//! Credentials are passed through exactly as declared: no field is derived
//! from another, so a declared `auth` token is never re-encoded from
//! `user_name`/`password` and vice versa.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::spec::AuthConfig;

/// Engine-facing credential record, in the Docker `auths` entry format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryAuth {
    /// Username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Base64-encoded auth string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    /// Email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Server address.
    #[serde(
        default,
        rename = "serveraddress",
        skip_serializing_if = "Option::is_none"
    )]
    pub server_address: Option<String>,
    /// Identity token.
    #[serde(
        default,
        rename = "identitytoken",
        skip_serializing_if = "Option::is_none"
    )]
    pub identity_token: Option<String>,
    /// Registry token.
    #[serde(
        default,
        rename = "registrytoken",
        skip_serializing_if = "Option::is_none"
    )]
    pub registry_token: Option<String>,
}

impl From<&AuthConfig> for RegistryAuth {
    fn from(config: &AuthConfig) -> Self {
        Self {
            username: config.user_name.clone(),
            password: config.password.clone(),
            auth: config.auth.clone(),
            email: config.email.clone(),
            server_address: config.server_address.clone(),
            identity_token: config.identity_token.clone(),
            registry_token: config.registry_token.clone(),
        }
    }
}

impl RegistryAuth {
    /// Whether any credential field is populated.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.username.is_some()
            || self.password.is_some()
            || self.auth.is_some()
            || self.identity_token.is_some()
            || self.registry_token.is_some()
    }
}

/// Docker client `config.json` carrying only `auths`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerConfigFile {
    /// Authentication entries keyed by registry host.
    #[serde(default)]
    pub auths: BTreeMap<String, RegistryAuth>,
}

impl DockerConfigFile {
    /// Build a config file from translated credentials.
    #[must_use]
    pub fn from_auths(auths: &BTreeMap<String, RegistryAuth>) -> Self {
        Self {
            auths: auths.clone(),
        }
    }

    /// Render as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error, which cannot happen for string maps.
    pub fn to_json(&self) -> berth_common::BerthResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
