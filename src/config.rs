//! Validated, immutable daemon configuration.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use crate::cli::DaemonOpts;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("root directory does not exist: {0}")]
    RootMissing(PathBuf),
    #[error("root path is not a directory: {0}")]
    RootNotDirectory(PathBuf),
    #[error("cannot canonicalize root {path}: {source}")]
    RootCanonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid webhook URL {url:?}: {reason}")]
    Webhook { url: String, reason: String },
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("invalid passive port range {0:?} (expected LOW-HIGH with 0 < LOW <= HIGH)")]
    PassivePorts(String),
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub root: PathBuf,
    pub webhook: Option<Url>,
    pub webhook_timeout: Duration,
    pub idle_timeout: Duration,
    pub passive_ports: RangeInclusive<u16>,
    pub log_file: Option<PathBuf>,
}

impl RelayConfig {
    pub fn from_opts(opts: &DaemonOpts) -> Result<Self, ConfigError> {
        if !opts.root.exists() {
            return Err(ConfigError::RootMissing(opts.root.clone()));
        }
        if !opts.root.is_dir() {
            return Err(ConfigError::RootNotDirectory(opts.root.clone()));
        }
        let root = std::fs::canonicalize(&opts.root).map_err(|source| {
            ConfigError::RootCanonicalize {
                path: opts.root.clone(),
                source,
            }
        })?;

        let webhook = opts.webhook.as_deref().map(parse_webhook).transpose()?;

        if opts.timeout == 0 {
            return Err(ConfigError::ZeroTimeout("--timeout"));
        }
        if opts.webhook_timeout == 0 {
            return Err(ConfigError::ZeroTimeout("--webhook-timeout"));
        }

        Ok(Self {
            host: opts.host.clone(),
            port: opts.port,
            root,
            webhook,
            webhook_timeout: Duration::from_secs(opts.webhook_timeout),
            idle_timeout: Duration::from_secs(opts.timeout),
            passive_ports: parse_port_range(&opts.passive_ports)?,
            log_file: opts.log_file.clone(),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_webhook(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Webhook {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme {:?}", other))),
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

pub fn parse_port_range(raw: &str) -> Result<RangeInclusive<u16>, ConfigError> {
    let bad = || ConfigError::PassivePorts(raw.to_string());
    let (lo, hi) = raw.split_once('-').ok_or_else(bad)?;
    let lo: u16 = lo.trim().parse().map_err(|_| bad())?;
    let hi: u16 = hi.trim().parse().map_err(|_| bad())?;
    if lo == 0 || lo > hi {
        return Err(bad());
    }
    Ok(lo..=hi)
}
