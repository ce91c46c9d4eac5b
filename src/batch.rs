// File: batch.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::errors::ScanError;
use crate::getstate::ScanStats;
use crate::scanner::{ScanResult, ScanTarget, Scanner};
use indicatif::ProgressBar;
use log::{debug, error};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

#[derive(Debug)]
pub struct TargetError {
    pub url: String,
    pub error: ScanError,
}

#[derive(Debug, Default)]
pub struct BatchResult {
    pub results: Vec<ScanResult>,
    pub errors: Vec<TargetError>,
}

struct Report {
    index: usize,
    outcome: Result<Vec<ScanResult>, ScanError>,
}

/// Scans many URLs with the settings of one template target.
pub struct BatchRunner {
    scanner: Arc<Scanner>,
    template: ScanTarget,
    stats: Arc<ScanStats>,
    progress: Option<ProgressBar>,
    log_errors: bool,
}

impl BatchRunner {
    pub fn new(scanner: Arc<Scanner>, template: ScanTarget) -> Self {
        Self {
            scanner,
            template,
            stats: Arc::new(ScanStats::new()),
            progress: None,
            log_errors: false,
        }
    }

    pub fn with_stats(mut self, stats: Arc<ScanStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_error_logging(mut self, log_errors: bool) -> Self {
        self.log_errors = log_errors;
        self
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    /// Scans `urls` with at most `workers` targets in flight. One failing
    /// target never cancels the others.
    pub async fn run_batch(&self, urls: &[String], workers: usize) -> BatchResult {
        self.stats.start(urls.len());

        let semaphore = Arc::new(Semaphore::new(workers.max(1)));
        let (tx, mut rx) = mpsc::channel::<Report>(urls.len().max(1));

        for (index, url) in urls.iter().enumerate() {
            let permit = Arc::clone(&semaphore).acquire_owned().await.ok();
            let scanner = Arc::clone(&self.scanner);
            let target = self.template.for_url(url);
            let tx = tx.clone();

            tokio::spawn(async move {
                let _permit = permit;
                let outcome = scanner.run(&target).await;
                if tx.send(Report { index, outcome }).await.is_err() {
                    debug!("Batch receiver gone before {} reported", target.url());
                }
            });
        }
        drop(tx);

        let mut reported = vec![false; urls.len()];
        let mut batch = BatchResult::default();

        while let Some(report) = rx.recv().await {
            reported[report.index] = true;
            let url = &urls[report.index];
            match report.outcome {
                Ok(results) => {
                    self.stats.add_success(&results);
                    batch.results.extend(results);
                }
                Err(e) => {
                    if self.log_errors {
                        error!("failed to scan endpoint {}: {}", url, e);
                    }
                    self.stats.add_failure();
                    batch.errors.push(TargetError {
                        url: url.clone(),
                        error: e,
                    });
                }
            }
            if let Some(pb) = &self.progress {
                pb.inc(1);
            }
        }

        // A worker that panicked drops its sender without reporting.
        for (index, done) in reported.iter().enumerate() {
            if !done {
                error!("scan of {} ended without a report", urls[index]);
                self.stats.add_failure();
                batch.errors.push(TargetError {
                    url: urls[index].clone(),
                    error: ScanError::WorkerLost,
                });
            }
        }

        if let Some(pb) = &self.progress {
            pb.finish();
        }
        self.stats.finish();
        batch
    }
}
