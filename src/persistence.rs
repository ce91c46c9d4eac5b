// File: persistence.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::detector::{normalize, ChangeKind};
use crate::errors::{AttemptFailure, PoisoningError, ScanError};
use crate::http::Gateway;
use crate::response::ResponseSnapshot;
use crate::scanner::{cache_buster_url, merge_headers, ScanTarget};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PersistenceVerdict {
    pub is_persistent: bool,
    /// Cache-buster URL that serves the poisoned response. Set only when persistent.
    #[serde(rename = "PoCLink")]
    pub poc_link: Option<String>,
    pub final_response: Option<ResponseSnapshot>,
    #[serde(rename = "Err", skip_serializing_if = "Option::is_none", default)]
    pub burst_error: Option<PoisoningError>,
}

/// Tries to get a manipulated response stored in cache and checks whether a
/// clean request is served that response afterwards.
pub struct PersistenceChecker<'a> {
    target: &'a ScanTarget,
    gateway: Arc<dyn Gateway>,
}

impl<'a> PersistenceChecker<'a> {
    pub fn new(target: &'a ScanTarget, gateway: Arc<dyn Gateway>) -> Self {
        Self { target, gateway }
    }

    /// Burst-attempt failures end up in `burst_error` of an otherwise valid
    /// verdict. A failed verification fetch is returned as `Err`.
    pub async fn check(
        &self,
        modified: &ResponseSnapshot,
        kind: ChangeKind,
    ) -> Result<PersistenceVerdict, ScanError> {
        let settings = self.target.persistence();
        if !settings.enabled {
            return Ok(PersistenceVerdict::default());
        }

        let url = cache_buster_url(self.target.url()).map_err(ScanError::InvalidTarget)?;
        debug!(
            "Poisoning {} with {} requests over {} workers",
            url, settings.requests, settings.threads
        );

        let failures = self.poison(&url, settings.requests, settings.threads).await;

        let final_response = self
            .gateway
            .fetch(&url, self.target.request_headers())
            .await
            .map_err(ScanError::Verification)?;

        let is_persistent = matches_change(&final_response, modified, kind);
        if is_persistent {
            info!("Response change {} persisted at {}", kind, url);
        }

        Ok(PersistenceVerdict {
            is_persistent,
            poc_link: is_persistent.then_some(url),
            final_response: Some(final_response),
            burst_error: (!failures.is_empty()).then_some(failures),
        })
    }

    /// Sends `requests` poisoning requests, at most `threads` at a time, and
    /// returns once every one of them has finished.
    async fn poison(&self, url: &str, requests: usize, threads: usize) -> PoisoningError {
        let semaphore = Arc::new(Semaphore::new(threads.max(1)));
        let url: Arc<str> = Arc::from(url);
        let headers = Arc::new(merge_headers(
            self.target.request_headers(),
            self.target.payload_headers(),
        ));

        let mut attempts = FuturesUnordered::new();
        for attempt in 1..=requests {
            let permit = Arc::clone(&semaphore).acquire_owned().await.ok();
            let gateway = Arc::clone(&self.gateway);
            let url = Arc::clone(&url);
            let headers = Arc::clone(&headers);

            let handle = tokio::spawn(async move {
                let _permit = permit;
                gateway.send(&url, &headers).await
            });
            attempts.push(async move { (attempt, handle.await) });
        }

        let mut failures = Vec::new();
        while let Some((attempt, joined)) = attempts.next().await {
            let error = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(e) => e.to_string(),
            };
            debug!("Poisoning attempt {} failed: {}", attempt, error);
            failures.push(AttemptFailure { attempt, error });
        }
        failures.sort_by_key(|f| f.attempt);

        PoisoningError { failures }
    }
}

/// Compares the field that changed during detection, ignoring cache busters.
fn matches_change(
    final_response: &ResponseSnapshot,
    modified: &ResponseSnapshot,
    kind: ChangeKind,
) -> bool {
    let observed = normalize(final_response);
    let expected = normalize(modified);
    match kind {
        ChangeKind::LocationChanged => observed.location() == expected.location(),
        ChangeKind::StatusChanged => observed.status_code() == expected.status_code(),
        ChangeKind::BodyChanged => observed.body() == expected.body(),
        ChangeKind::NoChange => false,
    }
}
