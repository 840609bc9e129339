// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sw-config: Typed, validated, hot-reloadable agent configuration.

mod store;
mod types;
mod validate;

pub use store::{collector_hash, config_hash, ConfigStore};
pub use types::{
    AgentConfig, AuthConfig, BufferConfig, CollectorConfig, CompressionAlgorithm,
    CompressionConfig, FilterOp, FilterSpec, FilterType, HealthConfig, LoggingConfig, QueueConfig,
    ResourceLimits, RetryConfig, SecurityConfig, TransportConfig,
};
pub use validate::validate;
