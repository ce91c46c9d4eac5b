// File: cli.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::config::{Config, LogMode, LogTarget, ScanMode};
use clap::Parser;
use log::warn;
use std::io::{self, BufRead};
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[arg(short = 'u', long = "url", help = "URL to scan")]
    pub url: Option<String>,

    #[arg(
        short = 'l',
        long = "list",
        help = "File with one URL per line (default: stdin)"
    )]
    pub list: Option<PathBuf>,

    #[arg(short = 'm', long = "scan-mode", help = "Scan mode: single or multi")]
    pub scan_mode: Option<String>,

    #[arg(short = 't', long = "threads", help = "Number of concurrent scan workers")]
    pub threads: Option<usize>,

    #[arg(long = "rate-limit", help = "Max HTTP requests per second, 0 = unlimited")]
    pub rate_limit: Option<u32>,

    #[arg(
        long = "timeout",
        visible_alias = "request-timeout",
        help = "Total request timeout in seconds (default: dial + handshake + response timeouts)"
    )]
    pub timeout: Option<u64>,

    #[arg(long = "proxy", help = "Proxy URL to use for requests")]
    pub proxy: Option<String>,

    #[arg(long = "no-persistence", help = "Disable the persistence checker")]
    pub no_persistence: bool,

    #[arg(long = "persistence-requests", help = "Requests sent to poison the cache")]
    pub persistence_requests: Option<usize>,

    #[arg(long = "persistence-threads", help = "Concurrent poisoning workers")]
    pub persistence_threads: Option<usize>,

    #[arg(short = 'j', long = "json", help = "Write JSON lines")]
    pub json: bool,

    #[arg(short = 'o', long = "output", help = "Append results to this file")]
    pub output: Option<PathBuf>,

    #[arg(long = "both", help = "With --output, also print results to stdout")]
    pub both: bool,

    #[arg(long = "payload-config", help = "Payload headers YAML file")]
    pub payload_config: Option<PathBuf>,

    #[arg(long = "config-dir", help = "Directory holding config.yaml and payloads.yaml")]
    pub config_dir: Option<PathBuf>,

    #[arg(
        short = 'H',
        long = "header",
        help = "Extra request header 'Name: value', repeatable"
    )]
    pub headers: Vec<String>,

    #[arg(long = "skip-tentative", help = "Only report confirmed poisoning")]
    pub skip_tentative: bool,

    #[arg(long = "log-errors", help = "Log per-target errors as they happen")]
    pub log_errors: bool,

    #[arg(long = "log-level", default_value = "warn")]
    pub log_level: String,

    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short = 'q', long = "quiet", help = "Reduce output verbosity")]
    pub quiet: bool,

    #[arg(long = "no-color", help = "Disable colored output")]
    pub no_color: bool,

    #[arg(
        short = 's',
        long = "suppress-stats",
        help = "Suppress scan summary and statistics"
    )]
    pub suppress_stats: bool,

    #[arg(long = "progress", help = "Show a progress bar on stderr")]
    pub progress: bool,
}

impl Cli {
    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            return log::LevelFilter::Debug;
        }
        if self.quiet {
            return log::LevelFilter::Error;
        }
        self.log_level
            .parse()
            .unwrap_or(log::LevelFilter::Warn)
    }

    /// Overlays the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        let scanner = &mut config.scanner;

        if let Some(mode) = &self.scan_mode {
            scanner.set_scan_mode(ScanMode::parse_lossy(mode));
        }
        if let Some(threads) = self.threads {
            scanner.set_threads(threads);
        }

        let client = scanner.client_mut();
        if let Some(rate_limit) = self.rate_limit {
            client.rate_limit_rps = rate_limit;
        }
        if let Some(timeout) = self.timeout {
            client.request_timeout_secs = Some(timeout);
        }
        if let Some(proxy) = &self.proxy {
            client.proxy_url = Some(proxy.clone());
        }

        let persistence = scanner.persistence_mut();
        if self.no_persistence {
            persistence.enabled = false;
        }
        if let Some(requests) = self.persistence_requests {
            persistence.requests = requests;
        }
        if let Some(threads) = self.persistence_threads {
            persistence.threads = threads;
        }

        let logger = scanner.logger_mut();
        if self.json {
            logger.log_mode = LogMode::Json;
        }
        if let Some(output) = &self.output {
            logger.output_file = Some(output.clone());
            logger.log_target = if self.both {
                LogTarget::Both
            } else {
                LogTarget::File
            };
        }
        if self.skip_tentative {
            logger.skip_tentative = true;
        }
        if self.log_errors {
            logger.log_error = true;
        }

        for raw in &self.headers {
            match parse_header(raw) {
                Some((name, value)) => scanner.set_request_header(name, value),
                None => warn!("ignoring malformed header {:?}", raw),
            }
        }
    }
}

pub fn parse_header(raw: &str) -> Option<(&str, &str)> {
    let (name, value) = raw.split_once(':')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

/// Normalizes one input line to a URL. Blank lines and comments yield `None`.
pub fn normalize_target(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Some(trimmed.to_string())
    } else {
        Some(format!("https://{}", trimmed))
    }
}

pub fn read_targets<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut targets = Vec::new();
    for line in reader.lines() {
        if let Some(target) = normalize_target(&line?) {
            targets.push(target);
        }
    }
    Ok(targets)
}
