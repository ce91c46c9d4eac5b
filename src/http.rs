// File: http.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::config::ClientConfig;
use crate::errors::TransportError;
use crate::response::ResponseSnapshot;
use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Request headers keyed by header name.
pub type HeaderSet = HashMap<String, String>;

/// Request/response gateway used by the scanner. Implementations must be
/// usable from many tasks at once.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// GET `url` without following redirects and capture the response.
    async fn fetch(&self, url: &str, headers: &HeaderSet)
        -> Result<ResponseSnapshot, TransportError>;

    /// GET `url` and discard the response.
    async fn send(&self, url: &str, headers: &HeaderSet) -> Result<(), TransportError>;
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Clone)]
pub struct Http {
    client: reqwest::Client,
    rate_limiter: Option<Arc<DirectLimiter>>,
}

impl Http {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.dial_timeout())
            .timeout(config.total_timeout())
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none());

        if let Some(proxy_url) = config.proxy_url.as_deref().filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| TransportError::InvalidUrl {
                url: proxy_url.to_string(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;
        let rate_limiter = NonZeroU32::new(config.rate_limit_rps)
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Ok(Http {
            client,
            rate_limiter,
        })
    }

    async fn dispatch(
        &self,
        url: &str,
        headers: &HeaderSet,
    ) -> Result<reqwest::Response, TransportError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }

        let response = self
            .client
            .get(url)
            .headers(to_header_map(headers)?)
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait]
impl Gateway for Http {
    async fn fetch(
        &self,
        url: &str,
        headers: &HeaderSet,
    ) -> Result<ResponseSnapshot, TransportError> {
        debug!("Fetching response of {}", url);
        let resp = self.dispatch(url, headers).await?;

        let status = resp.status().as_u16();
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let headers = from_header_map(resp.headers());
        let body = resp
            .text()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        Ok(ResponseSnapshot::new_with_all(status, headers, body, location))
    }

    async fn send(&self, url: &str, headers: &HeaderSet) -> Result<(), TransportError> {
        debug!("Sending GET request to {}", url);
        self.dispatch(url, headers).await?;
        Ok(())
    }
}

fn to_header_map(headers: &HeaderSet) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidHeader(format!("{}: {}", name, value)))?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

fn from_header_map(headers: &HeaderMap) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers {
        map.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}
