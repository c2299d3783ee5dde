// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! Application configuration loaded from `config.json`

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::CONFIG_PATH;

/// A single DNS redirect rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedirectRule {
    /// Domain pattern, exact (`foo.example.com`) or wildcard (`*.example.com`)
    pub domain: String,
    /// Target IP literal, usually `127.0.0.1`
    pub target: String,
    #[serde(default)]
    pub description: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    #[serde(default)]
    pub redirects: Vec<RedirectRule>,
    #[serde(default)]
    pub upstream_dns: String,
    /// Advisory only; the resolver picks from its fallback list
    #[serde(default)]
    pub port: String,
    #[serde(default)]
    pub auto_manage_system: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub upstream_url: String,
    #[serde(default)]
    pub port: String,
    /// Custom headers injected into every proxied request
    #[serde(default)]
    pub headers: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleModeConfig {
    pub enabled: bool,
    /// Domain the certificate identity is named after (e.g. `*.example.com`)
    #[serde(default)]
    pub domain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub dns: DnsConfig,
    pub proxy: ProxyConfig,
    pub simple_mode: SimpleModeConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Configuration used when no `config.json` exists yet
    pub fn default_config() -> Self {
        Self {
            log_level: "info".to_string(),
            dns: DnsConfig {
                redirects: vec![RedirectRule {
                    domain: "*.ol.epicgames.com".to_string(),
                    target: "127.0.0.1".to_string(),
                    description: "Epic Games Online Services".to_string(),
                    enabled: true,
                }],
                upstream_dns: "1.1.1.1:53".to_string(),
                port: "53".to_string(),
                auto_manage_system: true,
            },
            proxy: ProxyConfig {
                upstream_url: "http://localhost:8787".to_string(),
                port: "443".to_string(),
                headers: [("X-Telemachus-Identifier".to_string(), String::new())]
                    .into_iter()
                    .collect(),
            },
            simple_mode: SimpleModeConfig {
                enabled: true,
                domain: "*.ol.epicgames.com".to_string(),
            },
        }
    }

    /// Load the configuration, creating the default document when the file
    /// does not exist yet
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_PATH))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No existing config found, creating default configuration");
            let config = Self::default_config();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Check required fields and fill defaults for optional ones
    pub fn validate(&self) -> Result<()> {
        if self.proxy.upstream_url.is_empty() {
            bail!("proxy upstream_url is required");
        }

        for (i, redirect) in self.dns.redirects.iter().enumerate() {
            if redirect.domain.is_empty() {
                bail!("redirect {}: domain is required", i);
            }
            if redirect.target.is_empty() {
                bail!("redirect {}: target is required", i);
            }
        }

        Ok(())
    }

    /// Upstream DNS endpoint, defaulted when the document leaves it empty
    pub fn upstream_dns(&self) -> String {
        if self.dns.upstream_dns.is_empty() {
            "1.1.1.1:53".to_string()
        } else {
            self.dns.upstream_dns.clone()
        }
    }

    /// HTTPS listener port, defaulted when the document leaves it empty
    pub fn proxy_port(&self) -> u16 {
        self.proxy
            .port
            .parse()
            .unwrap_or(crate::constants::PROXY_PORT)
    }

    /// Only the redirects that are currently enabled
    pub fn enabled_redirects(&self) -> Vec<RedirectRule> {
        self.dns
            .redirects
            .iter()
            .filter(|r| r.enabled)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.dns.redirects.len(), 1);
        assert!(config.dns.redirects[0].enabled);
        assert_eq!(config.upstream_dns(), "1.1.1.1:53");
        assert_eq!(config.proxy_port(), 443);
    }

    #[test]
    fn test_missing_upstream_url_rejected() {
        let mut config = AppConfig::default_config();
        config.proxy.upstream_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redirect_without_target_rejected() {
        let mut config = AppConfig::default_config();
        config.dns.redirects[0].target = String::new();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("target is required"));
    }

    #[test]
    fn test_empty_upstream_dns_defaults() {
        let mut config = AppConfig::default_config();
        config.dns.upstream_dns = String::new();
        assert_eq!(config.upstream_dns(), "1.1.1.1:53");
    }

    #[test]
    fn test_enabled_redirects_filters_disabled() {
        let mut config = AppConfig::default_config();
        config.dns.redirects.push(RedirectRule {
            domain: "foo.example.com".to_string(),
            target: "10.0.0.1".to_string(),
            description: String::new(),
            enabled: false,
        });
        let enabled = config.enabled_redirects();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].domain, "*.ol.epicgames.com");
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = AppConfig::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.proxy.upstream_url, "http://localhost:8787");

        // A second load reads the file it just wrote
        let reloaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(reloaded.dns.upstream_dns, "1.1.1.1:53");
    }
}
