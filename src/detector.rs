// File: detector.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::errors::DetectError;
use crate::response::ResponseSnapshot;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Query key carrying the cache buster on every probe.
pub const CACHE_BUSTER_PARAM: &str = "cache";

static RELATIVE_BASE: Lazy<Url> =
    Lazy::new(|| Url::parse("http://relative.invalid/").unwrap());

static BODY_CACHE_BUSTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r#"[?&]{}=[^&\s">]{{5,}}"#, CACHE_BUSTER_PARAM)).unwrap()
});

/// Kind of difference between a baseline and an injected response.
///
/// Variants are listed in precedence order; only the first matching
/// difference is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    LocationChanged,
    StatusChanged,
    BodyChanged,
    NoChange,
}

impl ChangeKind {
    pub fn is_change(&self) -> bool {
        !matches!(self, ChangeKind::NoChange)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::LocationChanged => "location-changed",
            ChangeKind::StatusChanged => "status-changed",
            ChangeKind::BodyChanged => "body-changed",
            ChangeKind::NoChange => "no-change",
        };
        f.write_str(name)
    }
}

/// Compares two snapshots after stripping cache-buster artifacts.
///
/// `Err(DetectError::RateLimited)` stands for `ChangeKind::NoChange` with an
/// unreliable comparison; callers warn and carry on.
pub fn classify(
    original: &ResponseSnapshot,
    modified: &ResponseSnapshot,
) -> Result<ChangeKind, DetectError> {
    if original.is_empty() || modified.is_empty() {
        return Err(DetectError::EmptyResponse);
    }

    let original = normalize(original);
    debug!("Normalized original response: {:?}", original);
    let modified = normalize(modified);
    debug!("Normalized modified response: {:?}", modified);

    if original.status_code() == 429 || modified.status_code() == 429 {
        return Err(DetectError::RateLimited);
    }

    let kind = if original.location() != modified.location() {
        ChangeKind::LocationChanged
    } else if original.status_code() != modified.status_code() {
        ChangeKind::StatusChanged
    } else if original.body() != modified.body() {
        ChangeKind::BodyChanged
    } else {
        ChangeKind::NoChange
    };

    Ok(kind)
}

/// Returns a copy with the cache buster removed from location and body.
pub fn normalize(snapshot: &ResponseSnapshot) -> ResponseSnapshot {
    let mut normalized = snapshot.clone();
    normalized.set_location(strip_query_param(snapshot.location(), CACHE_BUSTER_PARAM));
    normalized.set_body(strip_cache_buster_from_body(snapshot.body()));
    normalized
}

/// Drops `param` from the query of `raw_url`. Relative references are
/// resolved against a placeholder origin and returned relative again;
/// protocol-relative references keep their authority. Unparseable input is
/// returned as is.
pub fn strip_query_param(raw_url: &str, param: &str) -> String {
    if raw_url.is_empty() {
        return String::new();
    }

    let (mut parsed, relative) = match Url::parse(raw_url) {
        Ok(url) => (url, false),
        Err(url::ParseError::RelativeUrlWithoutBase) => match RELATIVE_BASE.join(raw_url) {
            Ok(url) => (url, true),
            Err(_) => return raw_url.to_string(),
        },
        Err(_) => return raw_url.to_string(),
    };

    if parsed.query().is_none() {
        return raw_url.to_string();
    }

    let remaining: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| key != param)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if remaining.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(remaining);
    }

    let stripped = if !relative {
        parsed.as_str()
    } else if raw_url.starts_with("//") {
        parsed[url::Position::AfterScheme..].trim_start_matches(':')
    } else {
        &parsed[url::Position::BeforePath..]
    };
    stripped.strip_suffix('?').unwrap_or(stripped).to_string()
}

pub fn strip_cache_buster_from_body(body: &str) -> String {
    BODY_CACHE_BUSTER.replace_all(body, "").into_owned()
}
