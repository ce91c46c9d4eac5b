// File: scanner.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::config::{Config, PersistenceConfig, ScanMode};
use crate::detector::{classify, ChangeKind, CACHE_BUSTER_PARAM};
use crate::errors::{DetectError, ScanError, TransportError};
use crate::http::{Gateway, HeaderSet};
use crate::persistence::{PersistenceChecker, PersistenceVerdict};
use crate::report::ResultSink;
use crate::response::ResponseSnapshot;
use log::{debug, info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

const CACHE_BUSTER_LEN: usize = 10;

/// One URL together with everything needed to probe it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    url: String,
    request_headers: HeaderSet,
    payload_headers: HeaderSet,
    scan_mode: ScanMode,
    persistence: PersistenceConfig,
}

impl ScanTarget {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            request_headers: HeaderSet::new(),
            payload_headers: HeaderSet::new(),
            scan_mode: ScanMode::Multi,
            persistence: PersistenceConfig::default(),
        }
    }

    /// Template target carrying the settings of `config`, without a URL.
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: String::new(),
            request_headers: config.scanner.request_headers().clone(),
            payload_headers: config.payloads.headers.clone(),
            scan_mode: config.scanner.scan_mode(),
            persistence: config.scanner.persistence().clone(),
        }
    }

    pub fn for_url(&self, url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..self.clone()
        }
    }

    pub fn with_request_headers(mut self, headers: HeaderSet) -> Self {
        self.request_headers = headers;
        self
    }

    pub fn with_payload_headers(mut self, headers: HeaderSet) -> Self {
        self.payload_headers = headers;
        self
    }

    pub fn with_scan_mode(mut self, scan_mode: ScanMode) -> Self {
        self.scan_mode = scan_mode;
        self
    }

    pub fn with_persistence(mut self, persistence: PersistenceConfig) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_persistence_enabled(mut self, enabled: bool) -> Self {
        self.persistence.enabled = enabled;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn request_headers(&self) -> &HeaderSet {
        &self.request_headers
    }

    pub fn payload_headers(&self) -> &HeaderSet {
        &self.payload_headers
    }

    pub fn scan_mode(&self) -> ScanMode {
        self.scan_mode
    }

    pub fn persistence(&self) -> &PersistenceConfig {
        &self.persistence
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScanResult {
    #[serde(rename = "URL")]
    pub url: String,
    pub is_vulnerable: bool,
    pub is_response_manipulable: bool,
    pub manipulation_type: ChangeKind,
    pub request_headers: HeaderSet,
    pub payload_headers: HeaderSet,
    pub original_response: ResponseSnapshot,
    pub modified_response: ResponseSnapshot,
    pub persistence_check_result: Option<PersistenceVerdict>,
}

impl ScanResult {
    /// Manipulable, but not confirmed to persist in cache.
    pub fn is_tentative(&self) -> bool {
        self.is_response_manipulable && !self.is_vulnerable
    }
}

/// Adds a fresh `cache=<random>` parameter to `raw_url`, replacing any
/// existing one.
pub fn cache_buster_url(raw_url: &str) -> Result<String, TransportError> {
    let mut parsed = Url::parse(raw_url).map_err(|e| TransportError::InvalidUrl {
        url: raw_url.to_string(),
        reason: e.to_string(),
    })?;

    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CACHE_BUSTER_LEN)
        .map(char::from)
        .collect();

    if parsed.query_pairs().any(|(key, _)| key == CACHE_BUSTER_PARAM) {
        let kept: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(key, _)| key != CACHE_BUSTER_PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    parsed
        .query_pairs_mut()
        .append_pair(CACHE_BUSTER_PARAM, &token);

    Ok(parsed.into())
}

/// Request headers overlaid with payload headers. Payload values win.
pub fn merge_headers(request: &HeaderSet, payload: &HeaderSet) -> HeaderSet {
    let mut merged = request.clone();
    merged.extend(payload.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Runs baseline, injection, detection and persistence checks for single targets.
pub struct Scanner {
    gateway: Arc<dyn Gateway>,
    sink: Arc<dyn ResultSink>,
}

impl Scanner {
    pub fn new(gateway: Arc<dyn Gateway>, sink: Arc<dyn ResultSink>) -> Self {
        Self { gateway, sink }
    }

    /// Clean response of `target`, fetched with the request headers only.
    pub async fn fetch_baseline(&self, target: &ScanTarget) -> Result<ResponseSnapshot, ScanError> {
        let url = cache_buster_url(target.url()).map_err(ScanError::InvalidTarget)?;
        let baseline = self
            .gateway
            .fetch(&url, target.request_headers())
            .await
            .map_err(ScanError::Baseline)?;
        debug!("Received original response: {:?}", baseline);
        Ok(baseline)
    }

    /// Injects the payload headers of `target` once and compares against `baseline`.
    pub async fn run_one(
        &self,
        target: &ScanTarget,
        baseline: &ResponseSnapshot,
    ) -> Result<ScanResult, ScanError> {
        let url = cache_buster_url(target.url()).map_err(ScanError::InvalidTarget)?;
        let headers = merge_headers(target.request_headers(), target.payload_headers());

        let modified = self
            .gateway
            .fetch(&url, &headers)
            .await
            .map_err(ScanError::Modified)?;
        debug!("Received modified response: {:?}", modified);

        let kind = match classify(baseline, &modified) {
            Ok(kind) => kind,
            Err(DetectError::RateLimited) => {
                warn!(
                    "429 status code detected while scanning {}. Consider lower concurrency or a proxy",
                    target.url()
                );
                ChangeKind::NoChange
            }
            Err(e) => return Err(e.into()),
        };

        let mut result = ScanResult {
            url: target.url().to_string(),
            is_vulnerable: false,
            is_response_manipulable: kind.is_change(),
            manipulation_type: kind,
            request_headers: target.request_headers().clone(),
            payload_headers: target.payload_headers().clone(),
            original_response: baseline.clone(),
            modified_response: modified,
            persistence_check_result: None,
        };

        if result.is_response_manipulable && target.persistence().enabled {
            let verdict = PersistenceChecker::new(target, Arc::clone(&self.gateway))
                .check(&result.modified_response, kind)
                .await?;
            if let Some(burst_error) = &verdict.burst_error {
                warn!("{} poisoning attempts failed on {}", burst_error.len(), target.url());
            }
            result.is_vulnerable = verdict.is_persistent;
            result.persistence_check_result = Some(verdict);
        }

        if result.is_vulnerable {
            info!("{} is vulnerable to cache poisoning ({})", result.url, kind);
        }

        self.sink.write(&result)?;
        Ok(result)
    }

    /// Fetches one baseline and probes it according to the scan mode.
    pub async fn run(&self, target: &ScanTarget) -> Result<Vec<ScanResult>, ScanError> {
        let baseline = self.fetch_baseline(target).await?;

        match target.scan_mode() {
            ScanMode::Multi => Ok(vec![self.run_one(target, &baseline).await?]),
            ScanMode::Single => {
                // Cheap combined probe decides whether per-header runs are worth it.
                let probe_target = target.clone().with_persistence_enabled(false);
                let probe = self.run_one(&probe_target, &baseline).await?;
                if !probe.is_response_manipulable {
                    return Ok(vec![probe]);
                }

                let mut names: Vec<&String> = target.payload_headers().keys().collect();
                names.sort();

                let mut results = Vec::with_capacity(names.len());
                for name in names {
                    let mut single = HeaderSet::new();
                    single.insert(name.clone(), target.payload_headers()[name].clone());
                    let header_target = target.clone().with_payload_headers(single);
                    results.push(self.run_one(&header_target, &baseline).await?);
                }
                Ok(results)
            }
        }
    }
}
