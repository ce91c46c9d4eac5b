// File: errors.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid request header {0}")]
    InvalidHeader(String),

    #[error("error sending HTTP request: {0}")]
    Request(#[from] reqwest::Error),

    #[error("error reading response body: {0}")]
    Body(String),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DetectError {
    #[error("original or modified response is empty")]
    EmptyResponse,

    /// Either side answered 429. The comparison is unreliable and counts as no change.
    #[error("unreliable response due to 429 status code detected")]
    RateLimited,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub attempt: usize,
    pub error: String,
}

/// Failed attempts collected during a poisoning burst.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoisoningError {
    pub failures: Vec<AttemptFailure>,
}

impl PoisoningError {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }
}

impl fmt::Display for PoisoningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.is_empty() {
            return Ok(());
        }
        writeln!(f, "errors during poisoning:")?;
        for failure in &self.failures {
            writeln!(f, " - attempt {}: {}", failure.attempt, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for PoisoningError {}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no configuration directory available")]
    NoConfigDir,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid target URL: {0}")]
    InvalidTarget(#[source] TransportError),

    #[error("failed to fetch baseline response: {0}")]
    Baseline(#[source] TransportError),

    #[error("failed to fetch modified response: {0}")]
    Modified(#[source] TransportError),

    #[error("error detecting response changes: {0}")]
    Detection(#[from] DetectError),

    #[error("error while fetching response without payload headers: {0}")]
    Verification(#[source] TransportError),

    #[error("error logging scan result: {0}")]
    Sink(#[from] SinkError),

    #[error("scan worker exited without reporting")]
    WorkerLost,
}
