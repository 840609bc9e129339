// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Collector construction from config descriptors.

use crate::collector::Collector;
use crate::file::FileCollector;
use crate::syslog::SyslogCollector;
use crate::windows::WindowsEventCollector;
use sw_config::CollectorConfig;
use sw_core::{CollectorError, CollectorKind};

/// Build a collector from its descriptor.
///
/// The `registry` and `process` types validate in config but have no
/// implementation; instantiating one is an error (skipped upstream when
/// the descriptor is disabled).
pub fn build_collector(descriptor: &CollectorConfig) -> Result<Box<dyn Collector>, CollectorError> {
    match descriptor.kind {
        CollectorKind::File => Ok(Box::new(FileCollector::new(&descriptor.name, &descriptor.config)?)),
        CollectorKind::Syslog => Ok(Box::new(SyslogCollector::new(
            &descriptor.name,
            &descriptor.config,
            descriptor.batch_size,
        )?)),
        CollectorKind::WindowsEvent => Ok(Box::new(WindowsEventCollector::new(
            &descriptor.name,
            &descriptor.config,
            descriptor.batch_size,
        )?)),
        CollectorKind::Registry | CollectorKind::Process => {
            Err(CollectorError::UnknownType(descriptor.kind.to_string()))
        }
    }
}

#[cfg(test)]
#[path = "factory_tests.rs"]
mod tests;
