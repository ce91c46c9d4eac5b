/*
Copyright 2022 Volker Schwaberow <volker@schwaberow.de>
Permission is hereby granted, free of charge, to any person obtaining a
copy of this software and associated documentation files (the
"Software"), to deal in the Software without restriction, including without
limitation the rights to use, copy, modify, merge, publish, distribute,
sublicense, and/or sell copies of the Software, and to permit persons to whom the
Software is furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be
included in all copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF
MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT
SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR
OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE,
ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
DEALINGS IN THE SOFTWARE.
Author(s): Volker Schwaberow
*/

use crate::scanner::ScanResult;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

/// Counters for one batch run, shared between scan tasks.
#[derive(Debug, Default)]
pub struct ScanStats {
    total_targets: AtomicUsize,
    scanned_targets: AtomicUsize,
    failed_targets: AtomicUsize,
    manipulable_results: AtomicUsize,
    vulnerable_results: AtomicUsize,
    start_time: AtomicI64,
    end_time: AtomicI64,
}

impl ScanStats {
    pub fn new() -> ScanStats {
        ScanStats::default()
    }

    pub fn start(&self, total_targets: usize) {
        self.total_targets.store(total_targets, Ordering::Relaxed);
        self.start_time
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.end_time
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn add_success(&self, results: &[ScanResult]) {
        self.scanned_targets.fetch_add(1, Ordering::Relaxed);
        let manipulable = results.iter().filter(|r| r.is_response_manipulable).count();
        let vulnerable = results.iter().filter(|r| r.is_vulnerable).count();
        self.manipulable_results
            .fetch_add(manipulable, Ordering::Relaxed);
        self.vulnerable_results
            .fetch_add(vulnerable, Ordering::Relaxed);
    }

    pub fn add_failure(&self) {
        self.failed_targets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_targets(&self) -> usize {
        self.total_targets.load(Ordering::Relaxed)
    }

    pub fn scanned_targets(&self) -> usize {
        self.scanned_targets.load(Ordering::Relaxed)
    }

    pub fn failed_targets(&self) -> usize {
        self.failed_targets.load(Ordering::Relaxed)
    }

    pub fn manipulable_results(&self) -> usize {
        self.manipulable_results.load(Ordering::Relaxed)
    }

    pub fn vulnerable_results(&self) -> usize {
        self.vulnerable_results.load(Ordering::Relaxed)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        to_datetime(self.start_time.load(Ordering::Relaxed))
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        to_datetime(self.end_time.load(Ordering::Relaxed))
    }

    pub fn elapsed_ms(&self) -> i64 {
        let start = self.start_time.load(Ordering::Relaxed);
        let end = self.end_time.load(Ordering::Relaxed);
        if start == 0 || end < start {
            0
        } else {
            end - start
        }
    }

    pub fn summary(&self) -> String {
        let fmt_time = |t: Option<DateTime<Utc>>| {
            t.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        format!(
            "{} targets. Started at {} / Ended at {}. {} ms. Scanned: {}. Failed: {}. Manipulable: {}. Vulnerable: {}.",
            self.total_targets(),
            fmt_time(self.start_time()),
            fmt_time(self.end_time()),
            self.elapsed_ms(),
            self.scanned_targets(),
            self.failed_targets(),
            self.manipulable_results(),
            self.vulnerable_results()
        )
    }
}

fn to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    if millis == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}
