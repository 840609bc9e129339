// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn first_sample_seeds_the_average() {
    let mut metrics = CollectorMetrics::default();
    metrics.record_processing_time(50.0);
    assert!((metrics.avg_processing_time_ms - 50.0).abs() < f64::EPSILON);
}

#[test]
fn ema_weights_new_samples_at_one_tenth() {
    let mut metrics = CollectorMetrics::default();
    metrics.record_processing_time(100.0);
    metrics.record_processing_time(200.0);
    // 0.1 * 200 + 0.9 * 100
    assert!((metrics.avg_processing_time_ms - 110.0).abs() < 1e-9);
}

#[test]
fn test_report_round_trips_to_json() {
    let report = TestReport::ok("bound to 0.0.0.0:514")
        .with_details(serde_json::json!({"protocol": "udp"}));
    let v = serde_json::to_value(&report).unwrap();
    assert_eq!(v["success"], true);
    assert_eq!(v["details"]["protocol"], "udp");
}
