//! Configuration file handling.
//!
//! The file is YAML. Every key is optional; missing keys take the built-in
//! defaults, unknown keys are rejected.
//!
//! ```yaml
//! namespace: ha-test
//! interface: ha-0-0
//! address: 2.2.2.3/24
//! gateway: 2.2.2.2
//! bring_up: true
//! probe:
//!   targets: [2.2.2.2, 8.8.8.8, 192.168.7.1]
//!   iperf:
//!     host: 216.218.207.42
//!     port: 5201
//! service:
//!   reapply_interval_secs: 300
//! ```

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use netns_keeper::probe::{IperfServer, ProbeConfig};
use netns_keeper::reconcile::{AddressPolicy, NamespaceTarget, ReconcileError};
use netns_keeper::util::{Cidr, MacAddr};
use serde::{Deserialize, Serialize};

/// Where the configuration is looked up when `--config` is not given.
pub const SYSTEM_CONFIG: &str = "/etc/netns-keeper/config.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid {field} '{value}': {reason}")]
    Invalid {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Target(#[from] ReconcileError),
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "{}", path.display()),
            ConfigSource::Defaults => f.write_str("built-in defaults"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub namespace: String,
    pub interface: String,
    pub address: String,
    pub gateway: Option<IpAddr>,
    /// Install the default route even if the gateway is outside the prefix.
    pub gateway_onlink: bool,
    /// Only accept the interface with this MAC address.
    pub hw_address: Option<String>,
    pub address_policy: AddressPolicy,
    /// Set the interface and loopback up.
    pub bring_up: bool,
    pub probe: ProbeSection,
    pub service: ServiceSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "ha-test".into(),
            interface: "ha-0-0".into(),
            address: "2.2.2.3/24".into(),
            gateway: Some(IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2))),
            gateway_onlink: false,
            hw_address: None,
            address_policy: AddressPolicy::Additive,
            bring_up: true,
            probe: ProbeSection::default(),
            service: ServiceSection::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeSection {
    /// Ping targets; the gateway is always tried first.
    pub targets: Vec<IpAddr>,
    pub count: u32,
    pub timeout_secs: u64,
    pub iperf: Option<IperfSection>,
    pub iperf_timeout_secs: u64,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            targets: vec![
                IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)),
                IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
                IpAddr::V4(Ipv4Addr::new(192, 168, 7, 1)),
            ],
            count: 4,
            timeout_secs: 2,
            iperf: Some(IperfSection::default()),
            iperf_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IperfSection {
    pub host: String,
    pub port: u16,
}

impl Default for IperfSection {
    fn default() -> Self {
        Self {
            host: "216.218.207.42".into(),
            port: 5201,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceSection {
    /// Directory for the unit files.
    pub unit_dir: Option<PathBuf>,
    /// Where `install` copies the binary. Default `/usr/local/bin/ns-<namespace>`.
    pub install_path: Option<PathBuf>,
    /// Where `install` writes this configuration for the service to read.
    pub config_path: Option<PathBuf>,
    /// Re-run the pass periodically from a timer instead of once at boot.
    pub reapply_interval_secs: Option<u64>,
}

impl Config {
    /// Load from `explicit`, else the system path if present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSource), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, ConfigSource::File(path.to_path_buf())));
        }

        let system = Path::new(SYSTEM_CONFIG);
        if system.exists() {
            return Ok((Self::from_file(system)?, ConfigSource::File(system.to_path_buf())));
        }

        tracing::debug!("no configuration file, using built-in defaults");
        Ok((Self::default(), ConfigSource::Defaults))
    }

    /// Parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Write the configuration to `path`, creating parent directories.
    pub fn write_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        let text = self.to_yaml().map_err(|e| ConfigError::Invalid {
            field: "configuration",
            value: path.display().to_string(),
            reason: e.to_string(),
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, text).map_err(write_err)
    }

    /// Build the validated reconciliation target.
    pub fn target(&self) -> Result<NamespaceTarget, ConfigError> {
        let address: Cidr = self.address.parse().map_err(|e| ConfigError::Invalid {
            field: "address",
            value: self.address.clone(),
            reason: format!("{}", e),
        })?;

        let hw_address = match &self.hw_address {
            Some(mac) => Some(mac.parse::<MacAddr>().map_err(|e| ConfigError::Invalid {
                field: "hw_address",
                value: mac.clone(),
                reason: e.to_string(),
            })?),
            None => None,
        };

        Ok(
            NamespaceTarget::builder(&self.namespace, &self.interface, address)
                .gateway_opt(self.gateway)
                .gateway_onlink(self.gateway_onlink)
                .hw_address(hw_address)
                .address_policy(self.address_policy)
                .bring_up(self.bring_up)
                .build()?,
        )
    }

    /// Probe settings, with the gateway prepended to the ping targets.
    pub fn probe_config(&self) -> ProbeConfig {
        let mut targets = Vec::with_capacity(self.probe.targets.len() + 1);
        if let Some(gw) = self.gateway {
            targets.push(gw);
        }
        for t in &self.probe.targets {
            if !targets.contains(t) {
                targets.push(*t);
            }
        }

        let mut config = ProbeConfig::new(targets);
        config.count = self.probe.count.max(1);
        config.timeout = Duration::from_secs(self.probe.timeout_secs.max(1));
        config.iperf_timeout = Duration::from_secs(self.probe.iperf_timeout_secs.max(1));
        if let Some(iperf) = &self.probe.iperf {
            config = config.with_iperf(IperfServer {
                host: iperf.host.clone(),
                port: iperf.port,
            });
        }
        config
    }

    pub fn install_path(&self) -> PathBuf {
        self.service
            .install_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("/usr/local/bin/ns-{}", self.namespace)))
    }

    pub fn config_path(&self) -> PathBuf {
        self.service
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SYSTEM_CONFIG))
    }

    pub fn unit_dir(&self) -> PathBuf {
        self.service
            .unit_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("/etc/systemd/system"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_build_target() {
        let config = Config::default();
        let target = config.target().unwrap();
        assert_eq!(target.namespace(), "ha-test");
        assert_eq!(target.interface(), "ha-0-0");
        assert_eq!(target.address().to_string(), "2.2.2.3/24");
        assert_eq!(target.gateway(), Some("2.2.2.2".parse().unwrap()));
        assert!(target.bring_up());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("namespace: lab\naddress: 10.0.0.2/24\ngateway: 10.0.0.1\n")
            .unwrap();
        assert_eq!(config.namespace, "lab");
        assert_eq!(config.interface, "ha-0-0");
        assert_eq!(config.probe.count, 4);
    }

    #[test]
    fn test_empty_yaml_is_defaults() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::from_yaml("namespce: typo\n").is_err());
        assert!(Config::from_yaml("probe:\n  tagrets: []\n").is_err());
    }

    #[test]
    fn test_address_policy_parsing() {
        let config = Config::from_yaml("address_policy: exclusive\n").unwrap();
        assert_eq!(config.address_policy, AddressPolicy::Exclusive);
    }

    #[test]
    fn test_invalid_values() {
        let config = Config {
            address: "2.2.2.3".into(),
            ..Config::default()
        };
        assert!(matches!(
            config.target(),
            Err(ConfigError::Invalid { field: "address", .. })
        ));

        let config = Config {
            hw_address: Some("zz:00".into()),
            ..Config::default()
        };
        assert!(matches!(
            config.target(),
            Err(ConfigError::Invalid { field: "hw_address", .. })
        ));

        let config = Config {
            gateway: Some("9.9.9.9".parse().unwrap()),
            ..Config::default()
        };
        assert!(matches!(config.target(), Err(ConfigError::Target(_))));
    }

    #[test]
    fn test_probe_targets_gateway_first() {
        let config = Config::default();
        let probe = config.probe_config();
        let targets: Vec<String> = probe.targets.iter().map(|t| t.to_string()).collect();
        assert_eq!(targets, vec!["2.2.2.2", "8.8.8.8", "192.168.7.1"]);
        assert_eq!(probe.iperf.unwrap().port, 5201);
    }

    #[test]
    fn test_paths() {
        let config = Config::default();
        assert_eq!(config.install_path(), PathBuf::from("/usr/local/bin/ns-ha-test"));
        assert_eq!(config.config_path(), PathBuf::from(SYSTEM_CONFIG));
        assert_eq!(config.unit_dir(), PathBuf::from("/etc/systemd/system"));
    }

    #[test]
    fn test_write_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.yaml");

        let config = Config {
            namespace: "lab".into(),
            ..Config::default()
        };
        config.write_to(&path).unwrap();

        let (loaded, source) = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(source, ConfigSource::File(path));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/netns-keeper.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
