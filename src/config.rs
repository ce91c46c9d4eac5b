// File: config.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::errors::ConfigError;
use crate::http::HeaderSet;
use log::{error, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SCANNER_CONFIG_FILE: &str = "config.yaml";
pub const PAYLOAD_CONFIG_FILE: &str = "payloads.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ScanMode {
    /// One attempt per payload header, after a combined probe.
    #[default]
    Single,
    /// All payload headers in one attempt.
    Multi,
}

impl From<String> for ScanMode {
    fn from(mode: String) -> Self {
        ScanMode::parse_lossy(&mode)
    }
}

impl ScanMode {
    pub fn parse_lossy(mode: &str) -> Self {
        match mode {
            "single" | "" => ScanMode::Single,
            "multi" => ScanMode::Multi,
            other => {
                error!("invalid scan mode: {}, defaulting to single header scan", other);
                ScanMode::Single
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum LogMode {
    #[default]
    Pretty,
    Json,
}

impl From<String> for LogMode {
    fn from(mode: String) -> Self {
        LogMode::parse_lossy(&mode)
    }
}

impl LogMode {
    pub fn parse_lossy(mode: &str) -> Self {
        match mode {
            "pretty" | "" => LogMode::Pretty,
            "json" => LogMode::Json,
            other => {
                error!("invalid log mode: {}, defaulting to pretty", other);
                LogMode::Pretty
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum LogTarget {
    #[default]
    Stdout,
    File,
    Both,
}

impl From<String> for LogTarget {
    fn from(target: String) -> Self {
        LogTarget::parse_lossy(&target)
    }
}

impl LogTarget {
    pub fn parse_lossy(target: &str) -> Self {
        match target {
            "stdout" | "" => LogTarget::Stdout,
            "file" => LogTarget::File,
            "both" => LogTarget::Both,
            other => {
                error!("invalid log target: {}, defaulting to stdout", other);
                LogTarget::Stdout
            }
        }
    }

    pub fn to_stdout(&self) -> bool {
        matches!(self, LogTarget::Stdout | LogTarget::Both)
    }

    pub fn to_file(&self) -> bool {
        matches!(self, LogTarget::File | LogTarget::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub dial_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub response_timeout_secs: u64,
    /// Overrides the summed total request timeout when set.
    pub request_timeout_secs: Option<u64>,
    pub proxy_url: Option<String>,
    /// Requests per second across all tasks, 0 disables limiting.
    pub rate_limit_rps: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dial_timeout_secs: 5,
            handshake_timeout_secs: 5,
            response_timeout_secs: 5,
            request_timeout_secs: None,
            proxy_url: None,
            rate_limit_rps: 0,
        }
    }
}

impl ClientConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn total_timeout(&self) -> Duration {
        let secs = self.request_timeout_secs.unwrap_or(
            self.dial_timeout_secs + self.handshake_timeout_secs + self.response_timeout_secs,
        );
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub requests: usize,
    pub threads: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: 10,
            threads: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub log_mode: LogMode,
    pub log_target: LogTarget,
    pub output_file: Option<PathBuf>,
    pub skip_tentative: bool,
    pub log_error: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    scan_mode: ScanMode,
    threads: usize,
    client: ClientConfig,
    persistence: PersistenceConfig,
    logger: LoggerConfig,
    request_headers: HeaderSet,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        let mut request_headers = HeaderSet::new();
        request_headers.insert(
            "User-Agent".to_string(),
            "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0".to_string(),
        );
        Self {
            scan_mode: ScanMode::Single,
            threads: 25,
            client: ClientConfig::default(),
            persistence: PersistenceConfig::default(),
            logger: LoggerConfig::default(),
            request_headers,
        }
    }
}

impl ScannerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan_mode(&self) -> ScanMode {
        self.scan_mode
    }

    pub fn set_scan_mode(&mut self, scan_mode: ScanMode) {
        self.scan_mode = scan_mode;
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn set_threads(&mut self, threads: usize) {
        self.threads = threads;
    }

    pub fn client(&self) -> &ClientConfig {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut ClientConfig {
        &mut self.client
    }

    pub fn persistence(&self) -> &PersistenceConfig {
        &self.persistence
    }

    pub fn persistence_mut(&mut self) -> &mut PersistenceConfig {
        &mut self.persistence
    }

    pub fn logger(&self) -> &LoggerConfig {
        &self.logger
    }

    pub fn logger_mut(&mut self) -> &mut LoggerConfig {
        &mut self.logger
    }

    pub fn request_headers(&self) -> &HeaderSet {
        &self.request_headers
    }

    pub fn set_request_header(&mut self, name: &str, value: &str) {
        self.request_headers
            .insert(name.to_string(), value.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    pub headers: HeaderSet,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        let headers = [
            ("X-Forwarded-Host", "cacheprobe.example"),
            ("X-Host", "cacheprobe.example"),
            ("X-Forwarded-Server", "cacheprobe.example"),
            ("X-Forwarded-Scheme", "http"),
            ("X-Original-URL", "/cacheprobe"),
            ("X-Rewrite-URL", "/cacheprobe"),
            ("X-Forwarded-Port", "1337"),
            ("X-HTTP-Method-Override", "POST"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { headers }
    }
}

/// Both configuration documents as read from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub scanner: ScannerConfig,
    pub payloads: PayloadConfig,
}

pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|d| d.join(env!("CARGO_PKG_NAME")))
        .ok_or(ConfigError::NoConfigDir)
}

/// Reads `config.yaml` and `payloads.yaml` from `dir`, writing defaults for
/// any file that does not exist yet.
pub fn load_or_init(dir: &Path) -> Result<Config, ConfigError> {
    fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let scanner = ensure_file(&dir.join(SCANNER_CONFIG_FILE), ScannerConfig::default)?;
    let payloads = ensure_file(&dir.join(PAYLOAD_CONFIG_FILE), PayloadConfig::default)?;
    Ok(Config { scanner, payloads })
}

pub fn load_payloads(path: &Path) -> Result<PayloadConfig, ConfigError> {
    read_yaml(path)
}

fn ensure_file<T, F>(path: &Path, default: F) -> Result<T, ConfigError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> T,
{
    if !path.exists() {
        save_yaml(path, &default())?;
        info!("created {}", path.display());
    }
    read_yaml(path)
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&data).map_err(|source| ConfigError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

pub fn save_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let data = serde_yaml::to_string(value).map_err(|source| ConfigError::Yaml {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, data).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}
