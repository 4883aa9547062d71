// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Defines the configuration schema for a Sandgate gateway, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Base filesystem root shared by all sandboxes
// - Directory lookup timeout and password scheme
// - Statically configured users

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::credential::{parse_authorized_key, PasswordScheme};
use crate::domain::identity::IdentityRecord;

pub const API_VERSION: &str = "sandgate/v1";
pub const KIND: &str = "GatewayConfig";

/// Top-level Kubernetes-style gateway configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigManifest {
    /// API version (must be "sandgate/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GatewayConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: GatewayConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable gateway name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Gateway configuration specification (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigSpec {
    /// Directory under which every session root is derived
    #[serde(default = "default_base_root")]
    pub base_root: PathBuf,

    /// Upper bound on a single user-directory lookup
    #[serde(default = "default_lookup_timeout", with = "humantime_serde")]
    pub lookup_timeout: Duration,

    #[serde(default)]
    pub password_scheme: PasswordScheme,

    #[serde(default)]
    pub users: Vec<IdentityRecord>,
}

fn default_base_root() -> PathBuf {
    PathBuf::from("./data/fs")
}

fn default_lookup_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for GatewayConfigSpec {
    fn default() -> Self {
        Self {
            base_root: default_base_root(),
            lookup_timeout: default_lookup_timeout(),
            password_scheme: PasswordScheme::default(),
            users: Vec::new(),
        }
    }
}

impl Default for GatewayConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "sandgate".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: GatewayConfigSpec::default(),
        }
    }
}

impl GatewayConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SANDGATE_CONFIG_PATH environment variable
    /// 2. ./sandgate-config.yaml (working directory)
    /// 3. ~/.sandgate/config.yaml (user home)
    /// 4. /etc/sandgate/config.yaml (Unix) or C:\ProgramData\Sandgate\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SANDGATE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./sandgate-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".sandgate").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/sandgate/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Sandgate\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path: fail if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Same as [`Self::apply_env_overrides`] with an injectable lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("SANDGATE_BASE_FS_ROOT").filter(|v| !v.trim().is_empty()) {
            tracing::info!("Environment override: SANDGATE_BASE_FS_ROOT={}", val);
            self.spec.base_root = PathBuf::from(val);
        }

        if let Some(val) = lookup("SANDGATE_LOOKUP_TIMEOUT") {
            match humantime_serde::re::humantime::parse_duration(val.trim()) {
                Ok(timeout) => {
                    tracing::info!("Environment override: SANDGATE_LOOKUP_TIMEOUT={}", val);
                    self.spec.lookup_timeout = timeout;
                }
                Err(e) => {
                    tracing::warn!(
                        "Invalid value for SANDGATE_LOOKUP_TIMEOUT: '{}' ({}). Ignoring.",
                        val,
                        e
                    );
                }
            }
        }

        if let Some(val) = lookup("SANDGATE_PASSWORD_SCHEME") {
            match val.parse::<PasswordScheme>() {
                Ok(scheme) => {
                    tracing::info!("Environment override: SANDGATE_PASSWORD_SCHEME={}", scheme);
                    self.spec.password_scheme = scheme;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for SANDGATE_PASSWORD_SCHEME: '{}'. Expected bcrypt/scrypt. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.base_root.as_os_str().is_empty() {
            anyhow::bail!("spec.base_root cannot be empty");
        }

        if self.spec.lookup_timeout.is_zero() {
            anyhow::bail!("spec.lookup_timeout must be greater than zero");
        }

        let mut seen = HashSet::new();
        for user in &self.spec.users {
            if user.username.trim().is_empty() {
                anyhow::bail!("User username cannot be empty");
            }
            if !seen.insert(user.username.as_str()) {
                anyhow::bail!("Duplicate username: {}", user.username);
            }
            if let Some(key) = user.public_key_material() {
                if let Err(e) = parse_authorized_key(key) {
                    anyhow::bail!("Unparseable public key for user {}: {}", user.username, e);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::permission::Permissions;

    #[test]
    fn test_default_manifest() {
        let manifest = GatewayConfigManifest::default();
        assert_eq!(manifest.api_version, "sandgate/v1");
        assert_eq!(manifest.kind, "GatewayConfig");
        assert_eq!(manifest.spec.base_root, PathBuf::from("./data/fs"));
        assert_eq!(manifest.spec.lookup_timeout, Duration::from_secs(5));
        assert_eq!(manifest.spec.password_scheme, PasswordScheme::Bcrypt);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parse_manifest_with_users() {
        let yaml = r#"
apiVersion: sandgate/v1
kind: GatewayConfig
metadata:
  name: edge-gateway
spec:
  base_root: /srv/sandgate
  lookup_timeout: 250ms
  password_scheme: scrypt
  users:
    - username: alice
      password_hash: "$scrypt$ln=4,r=8,p=1$c2FsdA$aGFzaA"
      permissions: [read, list]
    - username: bob
      root_path: /srv/sandgate/shared
      permissions: 15
      disabled: true
"#;
        let manifest = GatewayConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "edge-gateway");
        assert_eq!(manifest.spec.lookup_timeout, Duration::from_millis(250));
        assert_eq!(manifest.spec.password_scheme, PasswordScheme::Scrypt);
        assert_eq!(manifest.spec.users.len(), 2);
        assert_eq!(manifest.spec.users[0].permissions, Permissions::READ | Permissions::LIST);
        assert!(manifest.spec.users[1].disabled);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut manifest = GatewayConfigManifest::default();
        let env: HashMap<&str, &str> = HashMap::from([
            ("SANDGATE_BASE_FS_ROOT", "/var/lib/sandgate"),
            ("SANDGATE_LOOKUP_TIMEOUT", "2s"),
            ("SANDGATE_PASSWORD_SCHEME", "scrypt"),
        ]);
        manifest.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(manifest.spec.base_root, PathBuf::from("/var/lib/sandgate"));
        assert_eq!(manifest.spec.lookup_timeout, Duration::from_secs(2));
        assert_eq!(manifest.spec.password_scheme, PasswordScheme::Scrypt);
    }

    #[test]
    fn test_invalid_env_overrides_are_ignored() {
        let mut manifest = GatewayConfigManifest::default();
        manifest.apply_overrides_from(|k| match k {
            "SANDGATE_LOOKUP_TIMEOUT" => Some("soon".to_string()),
            "SANDGATE_PASSWORD_SCHEME" => Some("md5".to_string()),
            _ => None,
        });
        assert_eq!(manifest.spec.lookup_timeout, Duration::from_secs(5));
        assert_eq!(manifest.spec.password_scheme, PasswordScheme::Bcrypt);
    }

    #[test]
    fn test_validation() {
        let mut manifest = GatewayConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "NodeConfig".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.metadata.name = String::new();
        assert!(manifest.validate().is_err());
        manifest.metadata.name = "gw".to_string();

        manifest.spec.lookup_timeout = Duration::ZERO;
        assert!(manifest.validate().is_err());
        manifest.spec.lookup_timeout = Duration::from_secs(1);

        manifest.spec.users.push(IdentityRecord::new("alice", Permissions::READ));
        manifest.spec.users.push(IdentityRecord::new("alice", Permissions::ALL));
        assert!(manifest.validate().is_err());
        manifest.spec.users.pop();

        manifest.spec.users.push(IdentityRecord::new("", Permissions::READ));
        assert!(manifest.validate().is_err());
        manifest.spec.users.pop();

        manifest
            .spec
            .users
            .push(IdentityRecord::new("carol", Permissions::READ).with_public_key("ssh-rsa ???"));
        assert!(manifest.validate().is_err());
    }
}
