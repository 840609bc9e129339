// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client certificate lifecycle awareness.
//!
//! Renewal itself is an out-of-band concern; the transport only warns when
//! the certificate is inside the rotation window.

use chrono::{DateTime, TimeZone, Utc};
use std::path::Path;
use sw_core::TransportError;
use tracing::warn;
use x509_parser::prelude::{FromDer, X509Certificate};

/// `not_valid_after` of the first certificate in a PEM file.
pub fn certificate_expiry(path: &Path) -> Result<DateTime<Utc>, TransportError> {
    let pem_data = std::fs::read(path)
        .map_err(|e| TransportError::Tls(format!("cannot read {}: {e}", path.display())))?;
    let (_, pem) = x509_parser::pem::parse_x509_pem(&pem_data)
        .map_err(|e| TransportError::Tls(format!("invalid PEM in {}: {e}", path.display())))?;
    let (_, cert) = X509Certificate::from_der(&pem.contents)
        .map_err(|e| TransportError::Tls(format!("invalid certificate in {}: {e}", path.display())))?;

    let not_after = cert.validity().not_after.timestamp();
    Utc.timestamp_opt(not_after, 0)
        .single()
        .ok_or_else(|| TransportError::Tls("certificate expiry out of range".into()))
}

/// Warn when the certificate expires within `rotation_days`.
///
/// Returns the expiry when it could be determined; a parse failure is
/// logged rather than propagated so lazy provisioning still works.
pub fn check_certificate_expiry(path: &Path, rotation_days: u32) -> Option<DateTime<Utc>> {
    match certificate_expiry(path) {
        Ok(expiry) => {
            let threshold = Utc::now() + chrono::Duration::days(rotation_days as i64);
            if expiry <= threshold {
                warn!(
                    path = %path.display(),
                    expires = %expiry,
                    rotation_days,
                    "client certificate expires soon"
                );
            }
            Some(expiry)
        }
        Err(e) => {
            warn!(error = %e, "certificate expiry check failed");
            None
        }
    }
}
