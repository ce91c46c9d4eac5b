// File: e2e_tests.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

mod common;

use cacheprobe::batch::BatchRunner;
use cacheprobe::config::{ClientConfig, LogMode, LogTarget, LoggerConfig, ScanMode};
use cacheprobe::detector::ChangeKind;
use cacheprobe::errors::ScanError;
use cacheprobe::http::Http;
use cacheprobe::report::{MemorySink, ReportWriter};
use cacheprobe::scanner::{ScanResult, Scanner};
use common::{mount_origin, target_for, CachingOrigin, Reflection, EVIL_HOST, REFLECTED_HEADER};
use serial_test::serial;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn scanner() -> (Scanner, Arc<MemorySink>) {
    let gateway = Arc::new(Http::new(&ClientConfig::default()).unwrap());
    let sink = Arc::new(MemorySink::new());
    (Scanner::new(gateway, sink.clone()), sink)
}

#[tokio::test]
#[serial]
async fn test_reflected_header_poisons_cache() {
    let server = MockServer::start().await;
    let origin = CachingOrigin::new(Reflection::Body, true);
    mount_origin(&server, origin.clone()).await;

    let (scanner, sink) = scanner();
    let target = target_for(&format!("{}/home?lang=en", server.uri()), true);

    let results = scanner.run(&target).await.unwrap();

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.is_response_manipulable);
    assert!(result.is_vulnerable);
    assert_eq!(result.manipulation_type, ChangeKind::BodyChanged);
    assert!(result.modified_response.body().contains(EVIL_HOST));

    let verdict = result.persistence_check_result.as_ref().unwrap();
    assert!(verdict.is_persistent);
    let poc = verdict.poc_link.as_deref().unwrap();
    assert!(poc.contains("lang=en"));
    assert!(poc.contains("cache="));
    assert!(verdict
        .final_response
        .as_ref()
        .unwrap()
        .body()
        .contains(EVIL_HOST));
    // all but the first poisoning request and the verification hit the cache
    assert_eq!(origin.cache_hits(), 5);
    assert_eq!(sink.results().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_reflected_redirect_is_location_change() {
    let server = MockServer::start().await;
    mount_origin(&server, CachingOrigin::new(Reflection::Redirect, true)).await;

    let (scanner, _) = scanner();
    let target = target_for(&format!("{}/", server.uri()), true);

    let results = scanner.run(&target).await.unwrap();

    assert_eq!(results[0].manipulation_type, ChangeKind::LocationChanged);
    assert_eq!(results[0].modified_response.status_code(), 302);
    assert!(results[0].is_vulnerable);
}

#[tokio::test]
#[serial]
async fn test_uncached_reflection_is_tentative() {
    let server = MockServer::start().await;
    mount_origin(&server, CachingOrigin::new(Reflection::Body, false)).await;

    let (scanner, _) = scanner();
    let target = target_for(&format!("{}/", server.uri()), true);

    let results = scanner.run(&target).await.unwrap();

    assert!(results[0].is_tentative());
    let verdict = results[0].persistence_check_result.as_ref().unwrap();
    assert!(!verdict.is_persistent);
    assert!(verdict.poc_link.is_none());
}

#[tokio::test]
#[serial]
async fn test_single_mode_reports_offending_header() {
    let server = MockServer::start().await;
    mount_origin(&server, CachingOrigin::new(Reflection::Body, true)).await;

    let (scanner, _) = scanner();
    let target = target_for(&format!("{}/", server.uri()), true).with_scan_mode(ScanMode::Single);

    let results = scanner.run(&target).await.unwrap();

    assert_eq!(results.len(), 2);
    let vulnerable: Vec<&ScanResult> = results.iter().filter(|r| r.is_vulnerable).collect();
    assert_eq!(vulnerable.len(), 1);
    assert!(vulnerable[0].payload_headers.contains_key(REFLECTED_HEADER));
    assert_eq!(vulnerable[0].payload_headers.len(), 1);
}

#[tokio::test]
#[serial]
async fn test_ignored_headers_report_no_change() {
    let server = MockServer::start().await;
    mount_origin(&server, CachingOrigin::new(Reflection::None, true)).await;

    let (scanner, sink) = scanner();
    let target = target_for(&format!("{}/", server.uri()), true).with_scan_mode(ScanMode::Single);

    let results = scanner.run(&target).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].manipulation_type, ChangeKind::NoChange);
    assert!(!results[0].is_vulnerable);
    assert!(results[0].persistence_check_result.is_none());
    assert_eq!(sink.results().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_throttled_origin_is_not_flagged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .mount(&server)
        .await;

    let (scanner, _) = scanner();
    let target = target_for(&format!("{}/", server.uri()), true);

    let results = scanner.run(&target).await.unwrap();

    assert_eq!(results[0].manipulation_type, ChangeKind::NoChange);
    assert!(!results[0].is_response_manipulable);
}

#[tokio::test]
#[serial]
async fn test_batch_survives_unreachable_target() {
    let server = MockServer::start().await;
    mount_origin(&server, CachingOrigin::new(Reflection::Body, true)).await;

    let (scanner, _) = scanner();
    let runner = BatchRunner::new(Arc::new(scanner), target_for("", true));
    let urls = vec![
        format!("{}/a", server.uri()),
        "http://127.0.0.1:1/".to_string(),
        format!("{}/b", server.uri()),
    ];

    let batch = runner.run_batch(&urls, 2).await;

    assert_eq!(batch.results.len(), 2);
    assert!(batch.results.iter().all(|r| r.is_vulnerable));
    assert_eq!(batch.errors.len(), 1);
    assert_eq!(batch.errors[0].url, "http://127.0.0.1:1/");
    assert!(matches!(batch.errors[0].error, ScanError::Baseline(_)));
    assert_eq!(runner.stats().vulnerable_results(), 2);
    assert_eq!(runner.stats().failed_targets(), 1);
}

#[tokio::test]
#[serial]
async fn test_json_report_written_to_file() {
    let server = MockServer::start().await;
    mount_origin(&server, CachingOrigin::new(Reflection::Body, true)).await;

    let dir = tempdir().unwrap();
    let output = dir.path().join("results.jsonl");
    let writer = ReportWriter::new(&LoggerConfig {
        log_mode: LogMode::Json,
        log_target: LogTarget::File,
        output_file: Some(output.clone()),
        skip_tentative: false,
        log_error: false,
    })
    .unwrap();

    let gateway = Arc::new(Http::new(&ClientConfig::default()).unwrap());
    let scanner = Scanner::new(gateway, Arc::new(writer));
    scanner
        .run(&target_for(&format!("{}/", server.uri()), true))
        .await
        .unwrap();

    let written = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 1);

    let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(parsed["IsVulnerable"], true);
    assert_eq!(parsed["ManipulationType"], "body-changed");
    assert!(parsed["PersistenceCheckResult"]["PoCLink"]
        .as_str()
        .unwrap()
        .contains("cache="));
}
