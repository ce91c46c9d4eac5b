// File: test_support.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::errors::{SinkError, TransportError};
use crate::http::{Gateway, HeaderSet};
use crate::report::ResultSink;
use crate::response::ResponseSnapshot;
use crate::scanner::ScanResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type FetchFn = dyn Fn(&str, &HeaderSet) -> Result<ResponseSnapshot, TransportError> + Send + Sync;
type SendFn = dyn Fn(&str, &HeaderSet, usize) -> Result<(), TransportError> + Send + Sync;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Fetch { url: String, headers: HeaderSet },
    SendDone { url: String, headers: HeaderSet },
}

/// In-memory gateway answering from closures and recording every call.
pub(crate) struct ScriptedGateway {
    fetch: Box<FetchFn>,
    send: Box<SendFn>,
    delay: Duration,
    sends: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedGateway {
    pub(crate) fn new<F>(fetch: F) -> Self
    where
        F: Fn(&str, &HeaderSet) -> Result<ResponseSnapshot, TransportError> + Send + Sync + 'static,
    {
        Self {
            fetch: Box::new(fetch),
            send: Box::new(|_, _, _| Ok(())),
            delay: Duration::ZERO,
            sends: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Origin reflecting `header` into the body, behind a cache keyed on the
    /// URL only. With `cache` off every request reaches the origin.
    pub(crate) fn caching_origin(header: &'static str, cache: bool) -> Self {
        let store: Arc<Mutex<HashMap<String, ResponseSnapshot>>> = Arc::default();

        let respond = move |url: &str, headers: &HeaderSet| -> ResponseSnapshot {
            let mut store = store.lock().unwrap();
            if let Some(hit) = store.get(url) {
                return hit.clone();
            }
            let body = match headers.get(header) {
                Some(value) => format!("<link href=\"https://{}/app.js\">", value),
                None => "<link href=\"/app.js\">".to_string(),
            };
            let response = ResponseSnapshot::with_status(200, &body, "");
            if cache {
                store.insert(url.to_string(), response.clone());
            }
            response
        };
        let respond = Arc::new(respond);
        let for_send = Arc::clone(&respond);

        let mut gateway = Self::new(move |url, headers| Ok(respond(url, headers)));
        gateway.send = Box::new(move |url, headers, _| {
            for_send(url, headers);
            Ok(())
        });
        gateway
    }

    pub(crate) fn with_send<F>(mut self, send: F) -> Self
    where
        F: Fn(&str, &HeaderSet, usize) -> Result<(), TransportError> + Send + Sync + 'static,
    {
        self.send = Box::new(send);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Fetch { .. }))
            .count()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Gateway for ScriptedGateway {
    async fn fetch(
        &self,
        url: &str,
        headers: &HeaderSet,
    ) -> Result<ResponseSnapshot, TransportError> {
        self.calls.lock().unwrap().push(Call::Fetch {
            url: url.to_string(),
            headers: headers.clone(),
        });
        self.enter().await;
        let result = (self.fetch)(url, headers);
        self.leave();
        result
    }

    async fn send(&self, url: &str, headers: &HeaderSet) -> Result<(), TransportError> {
        let index = self.sends.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        let result = (self.send)(url, headers, index);
        self.leave();
        self.calls.lock().unwrap().push(Call::SendDone {
            url: url.to_string(),
            headers: headers.clone(),
        });
        result
    }
}

pub(crate) struct FailingSink;

impl ResultSink for FailingSink {
    fn write(&self, _result: &ScanResult) -> Result<(), SinkError> {
        Err(SinkError::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "output closed",
        )))
    }
}
