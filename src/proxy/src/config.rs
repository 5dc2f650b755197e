//! Ambient configuration: CLI flags merged over an optional TOML file.
//!
//! None of this is part of the wire protocol; it only decides how the
//! `proxy` binary is told where to listen, which backends make up the
//! cluster, and how aggressively to health-check and time out.

use crate::errors::ConfigError;
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "proxy", about = "Transparent MySQL/MariaDB proxy")]
pub struct CliArgs {
    /// Path to a TOML config file; CLI flags below override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub listen: Option<SocketAddr>,

    #[arg(long = "backend", value_name = "ADDR")]
    pub backends: Vec<SocketAddr>,

    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    #[arg(long)]
    pub control_addr: Option<SocketAddr>,

    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    listen_addr: Option<SocketAddr>,
    cluster: Vec<SocketAddr>,
    health_check_interval_secs: Option<u64>,
    health_check_timeout_secs: Option<u64>,
    idle_timeout_secs: Option<u64>,
    metrics_addr: Option<SocketAddr>,
    control_addr: Option<SocketAddr>,
    log_level: Option<String>,
}

/// Fully resolved runtime configuration, CLI-over-file-over-defaults.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub cluster: Vec<SocketAddr>,
    pub health_check_interval: Duration,
    pub health_check_timeout: Duration,
    pub idle_timeout: Duration,
    pub metrics_addr: Option<SocketAddr>,
    pub control_addr: Option<SocketAddr>,
    pub log_level: String,
}

impl ProxyConfig {
    pub fn load(args: CliArgs) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => read_file_config(path)?,
            None => FileConfig::default(),
        };

        let cluster = if !args.backends.is_empty() {
            args.backends
        } else {
            file.cluster
        };
        if cluster.is_empty() {
            return Err(ConfigError::EmptyCluster);
        }

        let listen_addr = args
            .listen
            .or(file.listen_addr)
            .unwrap_or_else(|| "0.0.0.0:3306".parse().unwrap());

        Ok(ProxyConfig {
            listen_addr,
            cluster,
            health_check_interval: Duration::from_secs(
                file.health_check_interval_secs.unwrap_or(5),
            ),
            health_check_timeout: Duration::from_secs(
                file.health_check_timeout_secs.unwrap_or(10),
            ),
            idle_timeout: Duration::from_secs(file.idle_timeout_secs.unwrap_or(60)),
            metrics_addr: args.metrics_addr.or(file.metrics_addr),
            control_addr: args.control_addr.or(file.control_addr),
            log_level: if args.log_level != "info" {
                args.log_level
            } else {
                file.log_level.unwrap_or(args.log_level)
            },
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_backends_win_over_file() {
        let file = FileConfig {
            cluster: vec!["10.0.0.1:3306".parse().unwrap()],
            ..Default::default()
        };
        let cli_backend: SocketAddr = "10.0.0.2:3306".parse().unwrap();
        let cluster = if !vec![cli_backend].is_empty() {
            vec![cli_backend]
        } else {
            file.cluster
        };
        assert_eq!(cluster, vec![cli_backend]);
    }
}
