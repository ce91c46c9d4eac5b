// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use crate::batch::BatchResult;
use crate::config::{LogMode, LogTarget, LoggerConfig};
use crate::errors::SinkError;
use crate::http::HeaderSet;
use crate::scanner::ScanResult;
use colored::*;
use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

/// Destination for finished scan results. Called concurrently from scan tasks.
pub trait ResultSink: Send + Sync {
    fn write(&self, result: &ScanResult) -> Result<(), SinkError>;
}

pub struct ReportWriter {
    mode: LogMode,
    target: LogTarget,
    skip_tentative: bool,
    file: Option<Mutex<File>>,
}

impl ReportWriter {
    pub fn new(config: &LoggerConfig) -> Result<Self, SinkError> {
        let file = if config.log_target.to_file() {
            let path = config.output_file.as_ref().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "file output requested without an output path",
                )
            })?;
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(Mutex::new(file))
        } else {
            None
        };

        Ok(Self {
            mode: config.log_mode,
            target: config.log_target,
            skip_tentative: config.skip_tentative,
            file,
        })
    }

    fn render(&self, result: &ScanResult, color: bool) -> Result<String, SinkError> {
        match self.mode {
            LogMode::Json => Ok(serde_json::to_string(result)?),
            LogMode::Pretty => Ok(render_pretty(result, color)),
        }
    }
}

impl ResultSink for ReportWriter {
    fn write(&self, result: &ScanResult) -> Result<(), SinkError> {
        if !result.is_response_manipulable {
            debug!("No response change on {}", result.url);
            return Ok(());
        }
        if self.skip_tentative && result.is_tentative() {
            debug!("Skipping tentative result for {}", result.url);
            return Ok(());
        }

        if self.target.to_stdout() {
            let line = self.render(result, true)?;
            let mut out = io::stdout().lock();
            writeln!(out, "{}", line)?;
        }

        if let Some(file) = &self.file {
            let line = self.render(result, false)?;
            let mut file = lock(file);
            writeln!(file, "{}", line)?;
            file.flush()?;
        }

        Ok(())
    }
}

/// Keeps results in memory.
#[derive(Default)]
pub struct MemorySink {
    results: Mutex<Vec<ScanResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<ScanResult> {
        lock(&self.results).clone()
    }
}

impl ResultSink for MemorySink {
    fn write(&self, result: &ScanResult) -> Result<(), SinkError> {
        lock(&self.results).push(result.clone());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn format_headers(headers: &HeaderSet) -> String {
    let mut pairs: Vec<String> = headers
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect();
    pairs.sort();
    pairs.join(", ")
}

pub fn render_pretty(result: &ScanResult, color: bool) -> String {
    let tag = if result.is_vulnerable {
        "[vulnerable]"
    } else {
        "[tentative]"
    };
    let tag = match (color, result.is_vulnerable) {
        (false, _) => tag.to_string(),
        (true, true) => tag.bright_red().bold().to_string(),
        (true, false) => tag.yellow().to_string(),
    };

    let kind = result.manipulation_type.to_string();
    let kind = if color { kind.cyan().to_string() } else { kind };

    let mut line = format!(
        "{} {} [{}] [{}]",
        tag,
        result.url,
        kind,
        format_headers(&result.payload_headers)
    );

    if let Some(verdict) = &result.persistence_check_result {
        if let Some(link) = &verdict.poc_link {
            line.push_str(&format!(" PoC: {}", link));
        }
        if let Some(burst_error) = &verdict.burst_error {
            line.push_str(&format!(" ({} poisoning requests failed)", burst_error.len()));
        }
    }
    line
}

/// Writes the end-of-run report. Failed targets are always listed; the
/// summary line only when one is given.
pub fn write_batch_outcome<W: Write>(
    out: &mut W,
    batch: &BatchResult,
    summary: Option<&str>,
) -> io::Result<()> {
    if !batch.errors.is_empty() {
        writeln!(out)?;
        writeln!(out, "{}", "Failed targets:".red().bold())?;
        for failure in &batch.errors {
            writeln!(out, "  {} {}", failure.url, failure.error)?;
        }
    }
    if let Some(summary) = summary {
        writeln!(out)?;
        writeln!(out, "{}", summary)?;
    }
    Ok(())
}
