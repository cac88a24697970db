use std::path::PathBuf;

use clap::Args;

use super::{Config, ConfigError};

/// Command-line options shared by every ctrlstore binary. Anything given
/// here overrides the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
  /// INI configuration file
  #[arg(short, long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// Store server host
  #[arg(long)]
  pub host: Option<String>,

  /// Store server port
  #[arg(long)]
  pub port: Option<u16>,

  /// Shared secret for session authentication
  #[arg(long, value_name = "SECRET")]
  pub authkey: Option<String>,

  /// Log level (overridden by RUST_LOG)
  #[arg(long, value_name = "LEVEL")]
  pub log_level: Option<String>,
}

impl ConfigArgs {
  /// Read the config file, if any, then apply command-line overrides
  pub fn load(&self) -> Result<Config, ConfigError> {
    let mut config = match &self.config {
      Some(path) => Config::from_file(path)?,
      None => Config::default(),
    };

    if let Some(host) = &self.host {
      config.endpoint.host = host.clone();
    }
    if let Some(port) = self.port {
      config.endpoint.port = port;
    }
    if let Some(authkey) = &self.authkey {
      config.endpoint.authkey = Some(authkey.clone());
    }
    if let Some(level) = &self.log_level {
      config.log.level = level.clone();
    }
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_overrides_win_over_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ctrlstore.ini");
    std::fs::write(&path, "[server]\nhost = 10.0.0.5\nport = 6000\nauthkey = file-key\n").unwrap();

    let args = ConfigArgs {
      config: Some(path),
      port: Some(6001),
      authkey: Some("cli-key".to_string()),
      ..ConfigArgs::default()
    };
    let config = args.load().unwrap();
    assert_eq!(config.endpoint.addr(), "10.0.0.5:6001");
    assert_eq!(config.endpoint.authkey().unwrap(), b"cli-key");
  }

  #[test]
  fn test_no_file_uses_defaults() {
    let config = ConfigArgs::default().load().unwrap();
    assert_eq!(config, Config::default());
  }
}
