//! Configuration management for the CYBERON MCP server.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::{Cli, TransportKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(String),
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Configuration for the CYBERON MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to a persisted ontology document to load at startup.
    pub data_file: Option<PathBuf>,
    /// Transport binding to serve on.
    pub transport: TransportKind,
    /// Named-pipe transport: path of the inbound FIFO.
    pub named_pipe_in: PathBuf,
    /// Named-pipe transport: path of the outbound FIFO.
    pub named_pipe_out: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_file: None,
            transport: TransportKind::Stdio,
            named_pipe_in: PathBuf::from(cyberon_mcp::transport::named_pipe::DEFAULT_IN_PATH),
            named_pipe_out: PathBuf::from(cyberon_mcp::transport::named_pipe::DEFAULT_OUT_PATH),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a default or explicit file, then environment
    /// variables prefixed with `CYBERON_`.
    pub fn load(config_path: &Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(figment::providers::Serialized::defaults(
            ServerConfig::default(),
        ));

        let default_config_paths = ["cyberon.yaml", "cyberon.yml", ".cyberon.yaml", ".cyberon.yml"];
        for path in &default_config_paths {
            if Path::new(path).exists() {
                figment = figment.merge(Yaml::file(path));
                break;
            }
        }

        if let Some(path) = config_path {
            if path.exists() {
                figment = figment.merge(Yaml::file(path));
            } else {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
        }

        figment = figment.merge(Env::prefixed("CYBERON_"));

        figment
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_overrides(mut self, args: &Cli) -> Self {
        if let Some(ref data_file) = args.data_file {
            self.data_file = Some(data_file.clone());
        }
        if let Some(transport) = args.transport {
            self.transport = transport;
        }
        if let Some(ref in_path) = args.named_pipe_in {
            self.named_pipe_in = in_path.clone();
        }
        if let Some(ref out_path) = args.named_pipe_out {
            self.named_pipe_out = out_path.clone();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_uses_stdio() {
        let config = ServerConfig::default();
        assert_eq!(config.transport, TransportKind::Stdio);
        assert!(config.data_file.is_none());
    }

    #[test]
    fn config_from_file_overrides_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "transport: named-pipe").unwrap();
        writeln!(temp_file, "named_pipe_in: /tmp/in.pipe").unwrap();
        writeln!(temp_file, "named_pipe_out: /tmp/out.pipe").unwrap();

        let config = ServerConfig::load(&Some(temp_file.path().to_path_buf())).unwrap();
        assert_eq!(config.transport, TransportKind::NamedPipe);
        assert_eq!(config.named_pipe_in, PathBuf::from("/tmp/in.pipe"));
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let missing = PathBuf::from("/nonexistent/cyberon.yaml");
        assert!(ServerConfig::load(&Some(missing)).is_err());
    }

    #[test]
    fn cli_overrides_win_over_file_config() {
        let config = ServerConfig::default();
        let cli = Cli {
            config: None,
            data_file: Some(PathBuf::from("ontology.json")),
            transport: Some(TransportKind::NamedPipe),
            named_pipe_in: None,
            named_pipe_out: None,
            verbose: 0,
        };
        let config = config.with_overrides(&cli);
        assert_eq!(config.data_file, Some(PathBuf::from("ontology.json")));
        assert_eq!(config.transport, TransportKind::NamedPipe);
    }
}
