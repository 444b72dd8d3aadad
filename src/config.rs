use crate::credentials::CredentialRegistry;
use crate::error::{ProbeError, Result};
use crate::scenario::{Expectation, Scenario};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Prefix of environment variables overlaid on the config file,
/// e.g. `ACL_PROBE__CREDENTIALS__ADMIN__SECRET_KEY`
pub const ENV_PREFIX: &str = "ACL_PROBE";

/// Conventional RocketMQ variable used when no name server is configured
pub const NAMESRV_ADDR_ENV: &str = "NAMESRV_ADDR";

/// RocketMQ `NO_PERMISSION`
pub const NO_PERMISSION_CODE: i32 = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub broker: BrokerSettings,
    #[serde(default)]
    pub denial: DenialConfig,
    #[serde(default)]
    pub credentials: HashMap<String, CredentialConfig>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// Delimited name server list, `;` or `,` separated
    #[serde(default)]
    pub name_server_addrs: String,
    #[serde(default = "default_group_prefix")]
    pub group_prefix: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Upper bound for one whole publish attempt
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            name_server_addrs: String::new(),
            group_prefix: default_group_prefix(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

fn default_group_prefix() -> String {
    "acl-probe".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    3_000
}

fn default_request_timeout_ms() -> u64 {
    3_000
}

fn default_attempt_timeout_ms() -> u64 {
    10_000
}

/// Broker replies that count as an authorization rejection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DenialConfig {
    /// Response codes that always mean "denied"
    #[serde(default = "default_denial_codes")]
    pub response_codes: Vec<i32>,
    /// Substrings of the response remark that mark an ACL rejection carried by a generic code
    #[serde(default = "default_remark_markers")]
    pub remark_markers: Vec<String>,
}

impl Default for DenialConfig {
    fn default() -> Self {
        Self {
            response_codes: default_denial_codes(),
            remark_markers: default_remark_markers(),
        }
    }
}

fn default_denial_codes() -> Vec<i32> {
    vec![NO_PERMISSION_CODE]
}

fn default_remark_markers() -> Vec<String> {
    vec!["AclException".to_string()]
}

impl DenialConfig {
    pub fn is_denial(&self, code: i32, remark: &str) -> bool {
        self.response_codes.contains(&code)
            || self
                .remark_markers
                .iter()
                .any(|marker| !marker.is_empty() && remark.contains(marker.as_str()))
    }
}

/// Keys are optional so that one incomplete identity only fails the scenarios using it
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialConfig {
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

impl CredentialConfig {
    /// Names of the empty keys, `None` when the credential is usable
    pub fn missing_fields(&self) -> Option<String> {
        match (self.access_key.is_empty(), self.secret_key.is_empty()) {
            (false, false) => None,
            (true, false) => Some("access_key".to_string()),
            (false, true) => Some("secret_key".to_string()),
            (true, true) => Some("access_key and secret_key".to_string()),
        }
    }
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Credential labels are case-insensitive: the config loader lowercases table keys, so
/// `[credentials.Admin]` and `credential = "Admin"` must meet on the same form.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    /// Registry label; mutually exclusive with `anonymous`
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
    pub topic: String,
    /// UTF-8 payload
    #[serde(default)]
    pub payload: String,
    /// Arbitrary payload bytes, standard base64; exclusive with a non-empty `payload`
    #[serde(default)]
    pub payload_base64: Option<String>,
    pub expect: Expectation,
}

impl ScenarioConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ProbeError::InvalidConfig(
                "scenario name cannot be empty".to_string(),
            ));
        }

        if self.topic.trim().is_empty() {
            return Err(ProbeError::InvalidConfig(format!(
                "scenario '{}': topic cannot be empty",
                self.name
            )));
        }

        match (&self.credential, self.anonymous) {
            (Some(_), true) => {
                return Err(ProbeError::InvalidConfig(format!(
                    "scenario '{}': credential and anonymous are mutually exclusive",
                    self.name
                )))
            }
            (None, false) => {
                return Err(ProbeError::InvalidConfig(format!(
                    "scenario '{}': either credential or anonymous = true is required",
                    self.name
                )))
            }
            _ => {}
        }

        if self.payload_base64.is_some() && !self.payload.is_empty() {
            return Err(ProbeError::InvalidConfig(format!(
                "scenario '{}': payload and payload_base64 are mutually exclusive",
                self.name
            )));
        }
        self.payload_bytes().map(|_| ())
    }

    pub fn payload_bytes(&self) -> Result<Bytes> {
        match &self.payload_base64 {
            Some(encoded) => STANDARD.decode(encoded.trim()).map(Bytes::from).map_err(|e| {
                ProbeError::InvalidConfig(format!(
                    "scenario '{}': payload_base64 is not valid base64: {}",
                    self.name, e
                ))
            }),
            None => Ok(Bytes::from(self.payload.clone())),
        }
    }

    pub fn to_scenario(&self) -> Result<Scenario> {
        let payload = self.payload_bytes()?;
        Ok(match &self.credential {
            Some(label) => Scenario::new(
                &self.name,
                normalize_label(label),
                &self.topic,
                payload,
                self.expect,
            ),
            None => Scenario::anonymous(&self.name, &self.topic, payload, self.expect),
        })
    }
}

/// Resolved, read-only broker connection parameters shared by every scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConnectionConfig {
    pub name_servers: Vec<String>,
    pub group_prefix: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub attempt_timeout: Duration,
}

impl BrokerConnectionConfig {
    /// Resolve the name server list from the settings, falling back to `fallback_addrs`.
    /// An empty result is fatal for the whole run.
    pub fn resolve(settings: &BrokerSettings, fallback_addrs: Option<&str>) -> Result<Self> {
        let mut name_servers = parse_addresses(&settings.name_server_addrs);
        if name_servers.is_empty() {
            if let Some(fallback) = fallback_addrs {
                name_servers = parse_addresses(fallback);
            }
        }

        if name_servers.is_empty() {
            return Err(ProbeError::MissingBrokerAddresses);
        }

        Ok(Self {
            name_servers,
            group_prefix: settings.group_prefix.clone(),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            request_timeout: Duration::from_millis(settings.request_timeout_ms),
            attempt_timeout: Duration::from_millis(settings.attempt_timeout_ms),
        })
    }

    pub fn with_name_servers(name_servers: Vec<String>) -> Self {
        let settings = BrokerSettings::default();
        Self {
            name_servers,
            group_prefix: settings.group_prefix,
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            request_timeout: Duration::from_millis(settings.request_timeout_ms),
            attempt_timeout: Duration::from_millis(settings.attempt_timeout_ms),
        }
    }
}

/// Split a delimited address list into endpoints, dropping blanks
pub fn parse_addresses(raw: &str) -> Vec<String> {
    raw.split(|c| c == ';' || c == ',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .collect()
}

impl ProbeConfig {
    /// Load the TOML file at `path` with the `ACL_PROBE__*` environment overlay
    pub fn load(path: &Path) -> Result<Self> {
        let path = path.to_str().ok_or_else(|| {
            ProbeError::InvalidConfig(format!("config path is not valid UTF-8: {}", path.display()))
        })?;

        let settings = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.broker.group_prefix.trim().is_empty() {
            return Err(ProbeError::InvalidConfig(
                "broker.group_prefix cannot be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("broker.connect_timeout_ms", self.broker.connect_timeout_ms),
            ("broker.request_timeout_ms", self.broker.request_timeout_ms),
            ("broker.attempt_timeout_ms", self.broker.attempt_timeout_ms),
        ] {
            if value == 0 {
                return Err(ProbeError::InvalidConfig(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            scenario.validate()?;
            if !seen.insert(scenario.name.as_str()) {
                warn!(scenario = %scenario.name, "Duplicate scenario name, later result will replace the earlier one");
            }
        }

        Ok(())
    }

    /// Registry of every declared credential. Incomplete ones are kept as such so the
    /// scenarios using them fail on their own while the rest of the run continues.
    pub fn credential_registry(&self) -> CredentialRegistry {
        let mut registry = CredentialRegistry::new();
        for (label, credential) in &self.credentials {
            let label = normalize_label(label);
            match credential.missing_fields() {
                None => registry.register(label, &credential.access_key, &credential.secret_key),
                Some(missing) => {
                    warn!(credential = %label, missing = %missing, "Incomplete credential");
                    registry.register_incomplete(label, missing);
                }
            }
        }
        registry
    }

    /// Scenarios in declaration order
    pub fn scenarios(&self) -> Result<Vec<Scenario>> {
        self.scenarios.iter().map(ScenarioConfig::to_scenario).collect()
    }

    /// Resolve connection parameters, consulting `NAMESRV_ADDR` when the file has none
    pub fn connection(&self) -> Result<BrokerConnectionConfig> {
        let fallback = std::env::var(NAMESRV_ADDR_ENV).ok();
        BrokerConnectionConfig::resolve(&self.broker, fallback.as_deref())
    }
}
