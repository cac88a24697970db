use std::path::Path;
use std::time::Duration;

use configparser::ini::Ini;

mod args;

pub use args::ConfigArgs;

/// Log configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
  /// Log file path, if not set, logs will be printed to stdout
  pub file: Option<String>,
  /// Log level, default is "info"
  pub level: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      file: None,
      level: defaults::LOG_LEVEL.to_string(),
    }
  }
}

/// Where the store lives and how sessions prove they may use it.
///
/// No secret is built in: `authkey` must come from the config file or the
/// command line.
#[derive(Clone, PartialEq)]
pub struct Endpoint {
  pub host: String,
  pub port: u16,
  pub authkey: Option<String>,
}

impl std::fmt::Debug for Endpoint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Endpoint")
      .field("host", &self.host)
      .field("port", &self.port)
      .field("authkey", &self.authkey.as_ref().map(|_| "<redacted>"))
      .finish()
  }
}

impl Endpoint {
  pub fn addr(&self) -> String {
    format!("{}:{}", self.host, self.port)
  }

  /// The shared secret, or an error if none was configured
  pub fn authkey(&self) -> Result<&[u8], ConfigError> {
    match self.authkey.as_deref() {
      Some(key) if !key.is_empty() => Ok(key.as_bytes()),
      _ => Err(ConfigError::MissingAuthkey),
    }
  }
}

impl Default for Endpoint {
  fn default() -> Self {
    Self {
      host: defaults::HOST.to_string(),
      port: defaults::PORT,
      authkey: None,
    }
  }
}

/// Client-side timeouts
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
  /// Bound on TCP connect plus handshake
  pub connect_timeout: Duration,
  /// Bound on a single request/reply exchange
  pub request_timeout: Duration,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      connect_timeout: Duration::from_millis(defaults::CONNECT_TIMEOUT_MS),
      request_timeout: Duration::from_millis(defaults::REQUEST_TIMEOUT_MS),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
  pub poll_interval: Duration,
}

impl Default for BridgeConfig {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
    }
  }
}

/// ctrlstore configuration, shared by the server, controllers and recorders
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
  pub endpoint: Endpoint,
  pub client: ClientConfig,
  pub bridge: BridgeConfig,
  pub log: LogConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config file '{path}': {reason}")]
  Read { path: String, reason: String },

  #[error("invalid value for [{section}] {key}: {reason}")]
  Invalid {
    section: &'static str,
    key: &'static str,
    reason: String,
  },

  #[error("no authkey configured; set [server] authkey or pass --authkey")]
  MissingAuthkey,
}

mod defaults {
  pub const HOST: &str = "127.0.0.1";
  pub const PORT: u16 = 50000;
  pub const CONNECT_TIMEOUT_MS: u64 = 2000;
  pub const REQUEST_TIMEOUT_MS: u64 = 2000;
  pub const POLL_INTERVAL_MS: u64 = 1000;
  pub const LOG_LEVEL: &str = "info";
}

impl Config {
  /// Load configuration from an INI file
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let mut ini = Ini::new();
    ini.load(path).map_err(|reason| ConfigError::Read {
      path: path.display().to_string(),
      reason,
    })?;
    Self::from_ini(&ini)
  }

  /// Parse configuration from INI text
  pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
    let mut ini = Ini::new();
    ini.read(text.to_string()).map_err(|reason| ConfigError::Read {
      path: "<inline>".to_string(),
      reason,
    })?;
    Self::from_ini(&ini)
  }

  fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
    let mut config = Config::default();

    if let Some(host) = ini.get("server", "host") {
      config.endpoint.host = host;
    }
    if let Some(port) = uint(ini, "server", "port")? {
      config.endpoint.port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
        section: "server",
        key: "port",
        reason: format!("{} is out of range", port),
      })?;
    }
    config.endpoint.authkey = ini.get("server", "authkey").filter(|k| !k.is_empty());

    if let Some(ms) = uint(ini, "client", "connect_timeout_ms")? {
      config.client.connect_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = uint(ini, "client", "request_timeout_ms")? {
      config.client.request_timeout = Duration::from_millis(ms);
    }
    if let Some(ms) = uint(ini, "bridge", "poll_interval_ms")? {
      if ms == 0 {
        return Err(ConfigError::Invalid {
          section: "bridge",
          key: "poll_interval_ms",
          reason: "must be greater than zero".to_string(),
        });
      }
      config.bridge.poll_interval = Duration::from_millis(ms);
    }

    if let Some(level) = ini.get("log", "level") {
      config.log.level = level;
    }
    config.log.file = ini.get("log", "file").filter(|f| !f.is_empty());

    Ok(config)
  }
}

fn uint(ini: &Ini, section: &'static str, key: &'static str) -> Result<Option<u64>, ConfigError> {
  ini
    .getuint(section, key)
    .map_err(|reason| ConfigError::Invalid {
      section,
      key,
      reason,
    })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_full_config() {
    let config_str = r#"
[server]
host = 0.0.0.0
port = 50001
authkey = lab-secret

[client]
connect_timeout_ms = 500
request_timeout_ms = 750

[bridge]
poll_interval_ms = 250

[log]
level = debug
file = /tmp/ctrlstore.log
"#;

    let config = Config::from_ini_str(config_str).unwrap();
    assert_eq!(config.endpoint.addr(), "0.0.0.0:50001");
    assert_eq!(config.endpoint.authkey().unwrap(), b"lab-secret");
    assert_eq!(config.client.connect_timeout, Duration::from_millis(500));
    assert_eq!(config.client.request_timeout, Duration::from_millis(750));
    assert_eq!(config.bridge.poll_interval, Duration::from_millis(250));
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.log.file.as_deref(), Some("/tmp/ctrlstore.log"));
  }

  #[test]
  fn test_defaults_and_missing_authkey() {
    let config = Config::from_ini_str("[server]\nport = 50000\n").unwrap();
    assert_eq!(config.endpoint.addr(), "127.0.0.1:50000");
    assert_eq!(config.bridge.poll_interval, Duration::from_secs(1));
    assert!(matches!(config.endpoint.authkey(), Err(ConfigError::MissingAuthkey)));
  }

  #[test]
  fn test_invalid_values() {
    assert!(matches!(
      Config::from_ini_str("[server]\nport = 70000\n"),
      Err(ConfigError::Invalid { key: "port", .. })
    ));
    assert!(matches!(
      Config::from_ini_str("[server]\nport = many\n"),
      Err(ConfigError::Invalid { key: "port", .. })
    ));
    assert!(matches!(
      Config::from_ini_str("[bridge]\npoll_interval_ms = 0\n"),
      Err(ConfigError::Invalid { key: "poll_interval_ms", .. })
    ));
  }

  #[test]
  fn test_debug_redacts_authkey() {
    let endpoint = Endpoint {
      authkey: Some("lab-secret".to_string()),
      ..Endpoint::default()
    };
    let rendered = format!("{:?}", endpoint);
    assert!(!rendered.contains("lab-secret"));
    assert!(rendered.contains("<redacted>"));
  }

  #[test]
  fn test_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ctrlstore.ini");
    std::fs::write(&path, "[server]\nauthkey = from-file\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.endpoint.authkey().unwrap(), b"from-file");

    assert!(matches!(
      Config::from_file(dir.path().join("missing.ini")),
      Err(ConfigError::Read { .. })
    ));
  }
}
