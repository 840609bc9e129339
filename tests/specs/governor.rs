// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource-governor scenario specs.

use std::time::Duration;
use sw_config::ResourceLimits;
use sw_monitor::{ResourceGovernor, ResourceUsage};

/// S6: a 120 MB sample against a 100 MB limit throttles `collectors` to at
/// most 0.5 within one cycle; once usage drops to 60 MB, recovery raises
/// the level by 0.2 per tick until it reaches 1.0 and is removed.
#[test]
fn memory_pressure_throttles_then_recovers() {
    let governor = ResourceGovernor::new(
        ResourceLimits { max_memory_mb: 100, ..ResourceLimits::default() },
        Duration::from_secs(5),
    );

    governor.apply_sample(ResourceUsage { memory_mb: 120.0, ..ResourceUsage::default() });
    assert!(governor.throttle_level("collectors") <= 0.5);

    governor.apply_sample(ResourceUsage { memory_mb: 60.0, ..ResourceUsage::default() });

    let mut levels = Vec::new();
    for _ in 0..3 {
        governor.recover_once();
        levels.push(governor.throttle_level("collectors"));
    }
    assert!(levels[1] > levels[0]);
    assert_eq!(*levels.last().unwrap(), 1.0);
    assert!(governor.throttle_status().is_empty());
}

/// While a violation is active, throttle levels never rise except through
/// the recovery path.
#[test]
fn throttle_levels_are_monotone_under_stress() {
    let governor = ResourceGovernor::new(
        ResourceLimits { max_memory_mb: 100, ..ResourceLimits::default() },
        Duration::from_secs(5),
    );

    governor.apply_sample(ResourceUsage { memory_mb: 120.0, ..ResourceUsage::default() });
    let level_after_first = governor.throttle_level("collectors");

    // Continued stress: recovery is gated on the watermark, so the level
    // must not increase
    for _ in 0..3 {
        governor.apply_sample(ResourceUsage { memory_mb: 130.0, ..ResourceUsage::default() });
        governor.recover_once();
        assert!(governor.throttle_level("collectors") <= level_after_first);
    }
}
