// File: common/mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

#![allow(dead_code)]

use cacheprobe::config::PersistenceConfig;
use cacheprobe::http::HeaderSet;
use cacheprobe::scanner::ScanTarget;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const REFLECTED_HEADER: &str = "X-Forwarded-Host";
pub const EVIL_HOST: &str = "evil.example";

pub async fn setup_mock_server() -> MockServer {
    MockServer::start().await
}

/// What the origin does with the reflected header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reflection {
    /// Host ends up in an asset link in the body.
    Body,
    /// Host ends up in a redirect target.
    Redirect,
    /// Header is ignored.
    None,
}

/// Origin behind a naive shared cache keyed on the full request URL.
#[derive(Clone)]
pub struct CachingOrigin {
    reflection: Reflection,
    cache_enabled: bool,
    store: Arc<Mutex<HashMap<String, (u16, String, Option<String>)>>>,
    hits: Arc<AtomicUsize>,
}

impl CachingOrigin {
    pub fn new(reflection: Reflection, cache_enabled: bool) -> Self {
        Self {
            reflection,
            cache_enabled,
            store: Arc::default(),
            hits: Arc::default(),
        }
    }

    pub fn cache_hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn origin(&self, request: &Request) -> (u16, String, Option<String>) {
        let host = request
            .headers
            .get(REFLECTED_HEADER.to_ascii_lowercase().as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match (self.reflection, host) {
            (Reflection::Body, Some(host)) => (
                200,
                format!("<script src=\"https://{}/app.js\"></script>", host),
                None,
            ),
            (Reflection::Redirect, Some(host)) => {
                (302, String::new(), Some(format!("https://{}/login", host)))
            }
            _ => (200, "<script src=\"/app.js\"></script>".to_string(), None),
        }
    }
}

impl Respond for CachingOrigin {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let key = request.url.to_string();
        let (status, body, location) = {
            let mut store = self.store.lock().unwrap();
            match store.get(&key) {
                Some(hit) => {
                    self.hits.fetch_add(1, Ordering::SeqCst);
                    hit.clone()
                }
                None => {
                    let fresh = self.origin(request);
                    if self.cache_enabled {
                        store.insert(key, fresh.clone());
                    }
                    fresh
                }
            }
        };

        let mut response = ResponseTemplate::new(status).set_body_string(body);
        if let Some(location) = location {
            response = response.append_header("location", location.as_str());
        }
        response
    }
}

pub async fn mount_origin(server: &MockServer, origin: CachingOrigin) {
    Mock::given(method("GET"))
        .respond_with(origin)
        .mount(server)
        .await;
}

pub fn payload_headers() -> HeaderSet {
    let mut headers = HeaderSet::new();
    headers.insert(REFLECTED_HEADER.to_string(), EVIL_HOST.to_string());
    headers.insert("X-Forwarded-Scheme".to_string(), "http".to_string());
    headers
}

pub fn target_for(url: &str, persistence: bool) -> ScanTarget {
    ScanTarget::new(url)
        .with_payload_headers(payload_headers())
        .with_persistence(PersistenceConfig {
            enabled: persistence,
            requests: 5,
            threads: 2,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_setup() {
        let server = setup_mock_server().await;
        assert!(!server.uri().is_empty());
    }
}
