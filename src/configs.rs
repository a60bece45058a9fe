use crate::certificate_model::{CertificateModel, DEFAULT_AUTHORITY_KEY_ID, DEFAULT_SUBJECT};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub exports: Exports,
    #[serde(default)]
    pub defaults: ModelDefaults,
    #[serde(default)]
    pub content_signature: ContentSignature,
    #[serde(default)]
    pub logging: Logging,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Exports {
    #[serde(default = "default_export_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_chain_file_name")]
    pub chain_file_name: String,
    #[serde(default = "default_fingerprint_file_name")]
    pub fingerprint_file_name: String,
}

impl Default for Exports {
    fn default() -> Self {
        Self {
            directory: default_export_dir(),
            chain_file_name: default_chain_file_name(),
            fingerprint_file_name: default_fingerprint_file_name(),
        }
    }
}

impl Exports {
    pub fn chain_path(&self) -> PathBuf {
        self.directory.join(&self.chain_file_name)
    }

    pub fn fingerprint_path(&self) -> PathBuf {
        self.directory.join(&self.fingerprint_file_name)
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}

fn default_chain_file_name() -> String {
    "chain.pem".to_string()
}

fn default_fingerprint_file_name() -> String {
    "root_fingerprint.txt".to_string()
}

/// Model the binary builds at start-up.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelDefaults {
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Hex; empty omits the root's authority key identifier.
    #[serde(default = "default_authority_key_id")]
    pub authority_key_id: String,
    #[serde(default = "default_not_before_days_ago")]
    pub not_before_days_ago: i64,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            subject: default_subject(),
            authority_key_id: default_authority_key_id(),
            not_before_days_ago: default_not_before_days_ago(),
        }
    }
}

impl ModelDefaults {
    pub fn model(&self) -> Result<CertificateModel> {
        let authority_key_id = hex::decode(self.authority_key_id.trim())
            .context(format!("Invalid authority_key_id hex: {}", self.authority_key_id))?;
        Ok(CertificateModel {
            authority_key_id,
            not_before: Utc::now() - Duration::days(self.not_before_days_ago),
            subject: self.subject.clone(),
            ..CertificateModel::default()
        })
    }
}

fn default_subject() -> String {
    DEFAULT_SUBJECT.to_string()
}

fn default_authority_key_id() -> String {
    hex::encode(DEFAULT_AUTHORITY_KEY_ID)
}

fn default_not_before_days_ago() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentSignature {
    /// Where clients fetch the PEM bundle; must not contain `;` or `=`.
    #[serde(default = "default_x5u")]
    pub x5u: String,
}

impl Default for ContentSignature {
    fn default() -> Self {
        Self { x5u: default_x5u() }
    }
}

fn default_x5u() -> String {
    "http://localhost:8080/chain.pem".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct Logging {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig =
            toml::from_str(&config_str).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise the built-in defaults. The flag
    /// reports whether the file was found.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<(Self, bool)> {
        let path = path.as_ref();
        if path.exists() {
            Ok((Self::from_file(path)?, true))
        } else {
            Ok((Self::default(), false))
        }
    }
}
