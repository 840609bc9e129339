// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sw-collect: Collector framework and the production collectors.
//!
//! A collector is a capability set (`initialize`, `collect_events`,
//! `test_connection`, ...) satisfied by the three production variants
//! (file, syslog, windows_event) plus a test-only mock. The collection
//! loop lives once in [`runner`] and is parameterized by the capability.

mod collector;
mod factory;
mod filter;
mod runner;

pub mod file;
pub mod mock;
pub mod syslog;
pub mod windows;

pub use collector::{Collector, CollectorMetrics, RawEvent, TestReport};
pub use factory::build_collector;
pub use filter::FilterChain;
pub use runner::{spawn_collector, CollectorContext, CollectorHandle, CollectorSnapshot, RunState};
