// File: response.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Captured view of a single HTTP response.
///
/// A status of `0` marks the absent/default snapshot, which never takes part
/// in a comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseSnapshot {
    status_code: u16,
    headers: HashMap<String, Vec<String>>,
    body: String,
    location: String,
}

impl ResponseSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_all(
        status_code: u16,
        headers: HashMap<String, Vec<String>>,
        body: String,
        location: String,
    ) -> Self {
        ResponseSnapshot {
            status_code,
            headers,
            body,
            location,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn headers(&self) -> &HashMap<String, Vec<String>> {
        &self.headers
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn is_empty(&self) -> bool {
        self.status_code == 0
    }

    pub fn set_status_code(&mut self, status_code: u16) {
        self.status_code = status_code;
    }

    pub fn set_headers(&mut self, headers: HashMap<String, Vec<String>>) {
        self.headers = headers;
    }

    pub fn set_body(&mut self, body: String) {
        self.body = body;
    }

    pub fn set_location(&mut self, location: String) {
        self.location = location;
    }

    #[cfg(test)]
    pub(crate) fn with_status(status_code: u16, body: &str, location: &str) -> Self {
        Self::new_with_all(
            status_code,
            HashMap::new(),
            body.to_string(),
            location.to_string(),
        )
    }
}
