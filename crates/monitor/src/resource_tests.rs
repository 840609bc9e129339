// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn limits() -> ResourceLimits {
    ResourceLimits {
        max_memory_mb: 100,
        max_cpu_percent: 50.0,
        max_disk_mb: 1_024,
        max_file_handles: 1_024,
        max_network_connections: 100,
        max_threads: 64,
        max_events_per_minute: 1_000,
    }
}

fn governor() -> ResourceGovernor {
    ResourceGovernor::new(limits(), Duration::from_secs(5))
}

fn sample(memory_mb: f64, cpu: f64) -> ResourceUsage {
    ResourceUsage { memory_mb, cpu_percent: cpu, ..ResourceUsage::default() }
}

#[test]
fn unthrottled_components_report_level_one() {
    let governor = governor();
    assert_eq!(governor.throttle_level("collectors"), 1.0);
    assert!(!governor.is_throttled("collectors"));
}

#[test]
fn memory_pressure_throttles_collectors_to_half() {
    let governor = governor();
    governor.apply_sample(sample(120.0, 10.0));

    assert!(governor.throttle_level("collectors") <= 0.5);
    assert!(governor.is_throttled("collectors"));
    assert!(!governor.has_sufficient_resources());
}

#[test]
fn event_rate_pressure_throttles_event_processing() {
    let governor = governor();
    governor.apply_sample(ResourceUsage { event_rate: 2_000, ..ResourceUsage::default() });
    assert!((governor.throttle_level("event_processing") - 0.3).abs() < f64::EPSILON);
}

#[test]
fn connection_pressure_throttles_transport() {
    let governor = governor();
    governor.apply_sample(ResourceUsage { network_connections: 150, ..ResourceUsage::default() });
    assert!((governor.throttle_level("transport") - 0.7).abs() < f64::EPSILON);
}

#[test]
fn file_handle_pressure_throttles_buffer() {
    let governor = governor();
    governor.apply_sample(ResourceUsage { file_handles: 2_000, ..ResourceUsage::default() });
    assert!((governor.throttle_level("buffer") - 0.6).abs() < f64::EPSILON);
}

#[test]
fn throttles_only_tighten_while_active() {
    let governor = governor();
    governor.apply_throttle("collectors", 0.5, "memory");
    governor.apply_throttle("collectors", 0.8, "later, milder violation");
    assert_eq!(governor.throttle_level("collectors"), 0.5);

    governor.apply_throttle("collectors", 0.3, "worse violation");
    assert!((governor.throttle_level("collectors") - 0.3).abs() < f64::EPSILON);
}

#[test]
fn recovery_steps_up_by_fifth_until_removed() {
    let governor = governor();
    governor.apply_sample(sample(120.0, 10.0));
    assert!((governor.throttle_level("collectors") - 0.5).abs() < f64::EPSILON);

    // Usage back below 70% of every limit
    governor.apply_sample(sample(60.0, 10.0));

    governor.recover_once();
    assert!((governor.throttle_level("collectors") - 0.7).abs() < 1e-9);
    governor.recover_once();
    assert!((governor.throttle_level("collectors") - 0.9).abs() < 1e-9);
    governor.recover_once();
    // 0.9 + 0.2 >= 1.0: removed entirely
    assert_eq!(governor.throttle_level("collectors"), 1.0);
    assert!(governor.throttle_status().is_empty());
}

#[test]
fn no_recovery_above_watermark() {
    let governor = governor();
    governor.apply_sample(sample(120.0, 10.0));
    // 80 MB is above the 70 MB watermark
    governor.apply_sample(sample(80.0, 10.0));
    governor.recover_once();
    assert!((governor.throttle_level("collectors") - 0.5).abs() < f64::EPSILON);
}

#[test]
fn extreme_memory_triggers_emergency_signal() {
    let governor = governor();
    let signal = ShutdownSignal::new();
    governor.set_emergency_signal(signal.clone());

    governor.apply_sample(sample(160.0, 10.0)); // > 150% of 100 MB
    assert!(signal.is_shutdown());
}

#[test]
fn sustained_cpu_triggers_emergency_only_after_five_samples() {
    let governor = governor();
    let signal = ShutdownSignal::new();
    governor.set_emergency_signal(signal.clone());

    for _ in 0..4 {
        governor.apply_sample(sample(10.0, 98.0));
        assert!(!signal.is_shutdown());
    }
    governor.apply_sample(sample(10.0, 98.0));
    assert!(signal.is_shutdown());
}

#[test]
fn event_window_prunes_entries_older_than_a_minute() {
    let governor = governor();
    for _ in 0..5 {
        governor.record_event();
    }
    let usage = governor.collect_usage();
    assert_eq!(usage.event_rate, 5);
}

#[test]
fn sample_ring_is_bounded() {
    let governor = governor();
    for _ in 0..100 {
        governor.apply_sample(sample(10.0, 10.0));
    }
    let state = governor.inner.state.lock();
    assert_eq!(state.samples.len(), 60);
}
