use anyhow::{Context, Result};
use config::{Config, Environment, File as ConfigFile};
use peerlink_crypto::{EpochSalt, DEFAULT_ROUNDS, MAX_ROUNDS};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/peerlink.toml";
pub const ENV_PREFIX: &str = "PEERLINK";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub node: NodeSection,
    pub rpc: RpcSection,
    pub daemon: DaemonSection,
    pub ledger: LedgerSection,
    pub registry: RegistrySection,
    pub cipher: CipherSection,
    pub sync: SyncSection,
    pub probe: ProbeSection,
    pub log: LogSection,
    pub metrics: MetricsSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Identifier advertised over RPC. Empty means "ask the daemon".
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcSection {
    pub host: String,
    pub port: u16,
    /// Address other nodes use to reach this one.
    pub public_addr: String,
    pub timeout_secs: u64,
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 14009,
            public_addr: "127.0.0.1".into(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub api_url: String,
    /// When set, the API address is read from `<repo_path>/api` instead.
    pub repo_path: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5001".into(),
            repo_path: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub enabled: bool,
    pub rpc_url: String,
    pub timeout_secs: u64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            enabled: false,
            rpc_url: "http://127.0.0.1:8545".into(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackendKind {
    Memory,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    pub backend: RegistryBackendKind,
    pub url: String,
    pub account: String,
    pub token: String,
    pub timeout_secs: u64,
    pub content_namespace: String,
    pub ledger_namespace: String,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            backend: RegistryBackendKind::Memory,
            url: String::new(),
            account: String::new(),
            token: String::new(),
            timeout_secs: 10,
            content_namespace: "content".into(),
            ledger_namespace: "ledger".into(),
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CipherSection {
    pub private_key: String,
    pub public_key: String,
    pub rounds: u32,
    pub epoch: String,
}

impl Default for CipherSection {
    fn default() -> Self {
        Self {
            private_key: String::new(),
            public_key: String::new(),
            rounds: DEFAULT_ROUNDS,
            epoch: EpochSalt::PROTOCOL.to_rfc3339(),
        }
    }
}

impl std::fmt::Debug for CipherSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherSection")
            .field("private_key", &"<redacted>")
            .field("public_key", &"<redacted>")
            .field("rounds", &self.rounds)
            .field("epoch", &self.epoch)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub content_schedule: String,
    pub ledger_schedule: String,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            content_schedule: "0/5 * * * * *".into(),
            ledger_schedule: "0 * * * * *".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    pub timeout_secs: u64,
    pub concurrency: usize,
    pub content_port: u16,
    pub ledger_port: u16,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            timeout_secs: 3,
            concurrency: 16,
            content_port: 4001,
            ledger_port: 30303,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
    pub format: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    pub enabled: bool,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl AppConfig {
    /// Layer the optional TOML file under `PEERLINK_*` variables
    /// (`PEERLINK_RPC__PORT=15000` sets `rpc.port`).
    pub fn load(config_path_override: Option<&str>) -> Result<Self> {
        let resolved_path = match config_path_override {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    anyhow::bail!(
                        "Configuration file {} not found (specified via --config)",
                        path.display()
                    );
                }
                Some(path)
            }
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_PATH);
                path.exists().then_some(path)
            }
        };

        let mut builder = Config::builder();
        if let Some(path) = &resolved_path {
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("failed to assemble configuration")?;
        let mut app: AppConfig = config
            .try_deserialize()
            .context("configuration has invalid values")?;
        app.fill_local_registry_auth();
        Ok(app)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::load(Some(&path.to_string_lossy()))
    }

    /// The in-memory registry accepts any credentials; give it a local
    /// identity so the client's authorization check passes.
    fn fill_local_registry_auth(&mut self) {
        if self.registry.backend != RegistryBackendKind::Memory {
            return;
        }
        if self.registry.account.trim().is_empty() {
            self.registry.account = "local".into();
        }
        if self.registry.token.trim().is_empty() {
            self.registry.token = "local".into();
        }
    }

    pub fn validate(&self) -> Result<()> {
        let id = self.node.id.trim();
        if id.contains('@') || id.chars().any(char::is_whitespace) {
            anyhow::bail!("node.id must not contain '@' or whitespace");
        }
        if self.rpc.port == 0 {
            anyhow::bail!("rpc.port must be greater than zero");
        }
        if self.rpc.public_addr.trim().is_empty() {
            anyhow::bail!("rpc.public_addr must not be empty");
        }
        if self.probe.content_port == 0 || self.probe.ledger_port == 0 {
            anyhow::bail!("probe ports must be greater than zero");
        }
        if self.probe.concurrency == 0 {
            anyhow::bail!("probe.concurrency must be greater than zero");
        }
        if self.probe.timeout_secs == 0 {
            anyhow::bail!("probe.timeout_secs must be greater than zero");
        }
        if self.daemon.repo_path.is_none() && self.daemon.api_url.trim().is_empty() {
            anyhow::bail!("daemon.api_url or daemon.repo_path must be set");
        }
        if self.ledger.enabled && self.ledger.rpc_url.trim().is_empty() {
            anyhow::bail!("ledger.rpc_url must be set when ledger.enabled is true");
        }
        if self.cipher.private_key.is_empty() || self.cipher.public_key.is_empty() {
            anyhow::bail!("cipher.private_key and cipher.public_key must both be set");
        }
        if self.cipher.private_key != self.cipher.public_key {
            anyhow::bail!(
                "cipher.private_key and cipher.public_key must hold the same shared secret"
            );
        }
        if self.cipher.rounds == 0 || self.cipher.rounds > MAX_ROUNDS {
            anyhow::bail!("cipher.rounds must be between 1 and {MAX_ROUNDS}");
        }
        self.epoch()?;
        if self.registry.backend == RegistryBackendKind::Http {
            if self.registry.url.trim().is_empty() {
                anyhow::bail!("registry.url must be set for the http backend");
            }
            if self.registry.account.trim().is_empty() || self.registry.token.trim().is_empty() {
                anyhow::bail!("registry.account and registry.token must be set for the http backend");
            }
        }
        for (name, expression) in [
            ("sync.content_schedule", &self.sync.content_schedule),
            ("sync.ledger_schedule", &self.sync.ledger_schedule),
        ] {
            cron::Schedule::from_str(expression)
                .map_err(|err| anyhow::anyhow!("{name} {expression:?} is invalid: {err}"))?;
        }
        if !matches!(self.log.format.as_str(), "pretty" | "json") {
            anyhow::bail!("log.format must be 'pretty' or 'json'");
        }
        Ok(())
    }

    pub fn epoch(&self) -> Result<EpochSalt> {
        EpochSalt::from_rfc3339(&self.cipher.epoch)
            .with_context(|| format!("cipher.epoch {:?} is not RFC 3339", self.cipher.epoch))
    }

    pub fn rpc_bind_addr(&self) -> String {
        if self.rpc.host.contains(':') && !self.rpc.host.starts_with('[') {
            format!("[{}]:{}", self.rpc.host, self.rpc.port)
        } else {
            format!("{}:{}", self.rpc.host, self.rpc.port)
        }
    }

    /// Endpoint of this node's own RPC server, used by the CLI subcommands.
    pub fn local_rpc_url(&self) -> String {
        let host = match self.rpc.host.as_str() {
            "0.0.0.0" => "127.0.0.1",
            "::" | "[::]" => "[::1]",
            other => other,
        };
        if host.contains(':') && !host.starts_with('[') {
            format!("http://[{host}]:{}/rpc", self.rpc.port)
        } else {
            format!("http://{host}:{}/rpc", self.rpc.port)
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs.max(1))
    }

    pub fn daemon_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon.timeout_secs.max(1))
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger.timeout_secs.max(1))
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry.timeout_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn keyed() -> AppConfig {
        let mut config = AppConfig::default();
        config.cipher.private_key = "fleet-secret".into();
        config.cipher.public_key = "fleet-secret".into();
        config.fill_local_registry_auth();
        config
    }

    #[test]
    fn defaults_need_only_keys() {
        let config = keyed();
        config.validate().unwrap();
        assert_eq!(config.registry.account, "local");
        assert_eq!(config.sync.content_schedule, "0/5 * * * * *");
        assert_eq!(config.probe.content_port, 4001);
        assert_eq!(config.probe.ledger_port, 30303);
        assert!(AppConfig::default().validate().is_err());
    }

    #[test]
    fn file_values_override_defaults() {
        let file = write_config(
            r#"
[node]
id = "QmNode"

[rpc]
port = 15000
public_addr = "203.0.113.7"

[registry]
backend = "http"
url = "https://registry.example"
account = "node-7"
token = "secret"

[cipher]
private_key = "fleet-secret"
public_key = "fleet-secret"
rounds = 4

[sync]
ledger_schedule = "0 */2 * * * *"
"#,
        );

        let config = AppConfig::from_file(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.node.id, "QmNode");
        assert_eq!(config.rpc.port, 15000);
        assert_eq!(config.rpc.host, "127.0.0.1");
        assert_eq!(config.registry.backend, RegistryBackendKind::Http);
        assert_eq!(config.registry.account, "node-7");
        assert_eq!(config.cipher.rounds, 4);
        assert_eq!(config.sync.ledger_schedule, "0 */2 * * * *");
        assert_eq!(config.sync.content_schedule, "0/5 * * * * *");
    }

    #[test]
    fn shipped_sample_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/peerlink.toml");
        let config = AppConfig::from_file(&path).unwrap();
        config.validate().unwrap();
        assert_eq!(config.cipher.private_key, config.cipher.public_key);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(AppConfig::load(Some("/definitely/not/here.toml")).is_err());
    }

    #[test]
    fn http_backend_requires_credentials() {
        let mut config = keyed();
        config.registry.backend = RegistryBackendKind::Http;
        config.registry.url = "https://registry.example".into();
        config.registry.account = String::new();
        assert!(config.validate().is_err());

        config.registry.account = "node".into();
        config.registry.token = "token".into();
        config.validate().unwrap();
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = keyed();
        config.sync.content_schedule = "every five seconds".into();
        assert!(config.validate().is_err());

        let mut config = keyed();
        config.cipher.epoch = "yesterday".into();
        assert!(config.validate().is_err());

        let mut config = keyed();
        config.node.id = "bad@id".into();
        assert!(config.validate().is_err());

        let mut config = keyed();
        config.cipher.public_key = "another-secret".into();
        assert!(config.validate().is_err());

        let mut config = keyed();
        config.rpc.port = 0;
        assert!(config.validate().is_err());

        let mut config = keyed();
        config.log.format = "xml".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn local_rpc_url_rewrites_wildcard_hosts() {
        let mut config = keyed();
        config.rpc.host = "0.0.0.0".into();
        config.rpc.port = 14009;
        assert_eq!(config.local_rpc_url(), "http://127.0.0.1:14009/rpc");
        assert_eq!(config.rpc_bind_addr(), "0.0.0.0:14009");

        config.rpc.host = "::".into();
        assert_eq!(config.local_rpc_url(), "http://[::1]:14009/rpc");
        assert_eq!(config.rpc_bind_addr(), "[::]:14009");
    }
}
