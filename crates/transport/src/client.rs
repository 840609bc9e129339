// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! mTLS HTTPS client for the ingestion endpoint.

use crate::certs;
use crate::compress::compress_body;
use crate::retry::RetryPolicy;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use sw_config::TransportConfig;
use sw_core::{Event, TransportError};
use tracing::{debug, error, info, warn};

/// Pool and timeout policy.
const POOL_IDLE_PER_HOST: usize = 10;
const KEEPALIVE: Duration = Duration::from_secs(30);
const TOTAL_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivery statistics; `success_rate` feeds the transport health probe.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransportStats {
    pub events_sent: u64,
    pub bytes_sent: u64,
    pub requests_sent: u64,
    pub requests_failed: u64,
    pub success_rate: f64,
    pub last_success_time: Option<f64>,
}

#[derive(Default)]
struct Counters {
    events_sent: AtomicU64,
    bytes_sent: AtomicU64,
    requests_sent: AtomicU64,
    requests_failed: AtomicU64,
    last_success_ms: AtomicU64,
}

/// HTTPS transport with compression and retry.
pub struct Transport {
    endpoint: String,
    agent_id: String,
    config: TransportConfig,
    retry: RetryPolicy,
    client: reqwest::Client,
    counters: Counters,
}

impl Transport {
    /// Build the pooled client.
    ///
    /// For `https://` endpoints the mTLS material must exist on disk;
    /// `http://` endpoints skip TLS setup entirely.
    pub fn new(config: &TransportConfig, agent_id: &str) -> Result<Self, TransportError> {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();

        let mut headers = reqwest::header::HeaderMap::new();
        let agent_header = format!("SecureWatch-Agent/{agent_id}");
        headers.insert(
            reqwest::header::USER_AGENT,
            agent_header
                .parse()
                .map_err(|_| TransportError::Request("invalid agent id for header".into()))?,
        );
        headers.insert(
            "X-Agent-ID",
            agent_id
                .parse()
                .map_err(|_| TransportError::Request("invalid agent id for header".into()))?,
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(POOL_IDLE_PER_HOST)
            .tcp_keepalive(KEEPALIVE)
            .timeout(TOTAL_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT);

        if endpoint.starts_with("https://") {
            builder = Self::configure_tls(builder, config)?;
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Request(format!("client build failed: {e}")))?;

        Ok(Self {
            endpoint,
            agent_id: agent_id.to_string(),
            config: config.clone(),
            retry: RetryPolicy::new(config.retry.clone()),
            client,
            counters: Counters::default(),
        })
    }

    fn configure_tls(
        mut builder: reqwest::ClientBuilder,
        config: &TransportConfig,
    ) -> Result<reqwest::ClientBuilder, TransportError> {
        let auth = &config.auth;
        let ca = std::fs::read(&auth.ca_cert_path).map_err(|e| {
            TransportError::Tls(format!("CA certificate {}: {e}", auth.ca_cert_path.display()))
        })?;
        let cert = std::fs::read(&auth.client_cert_path).map_err(|e| {
            TransportError::Tls(format!("client certificate {}: {e}", auth.client_cert_path.display()))
        })?;
        let key = std::fs::read(&auth.client_key_path).map_err(|e| {
            TransportError::Tls(format!("client key {}: {e}", auth.client_key_path.display()))
        })?;

        let ca_cert = reqwest::Certificate::from_pem(&ca)
            .map_err(|e| TransportError::Tls(format!("invalid CA certificate: {e}")))?;

        let mut identity_pem = cert;
        identity_pem.extend_from_slice(&key);
        let identity = reqwest::Identity::from_pem(&identity_pem)
            .map_err(|e| TransportError::Tls(format!("invalid client identity: {e}")))?;

        builder = builder
            .add_root_certificate(ca_cert)
            .identity(identity)
            .min_tls_version(reqwest::tls::Version::TLS_1_2);

        if !auth.verify_hostname {
            // The rustls backend has no hostname-only toggle; disabling
            // verification entirely is the closest supported behavior.
            warn!("hostname verification disabled for transport TLS");
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(builder)
    }

    /// Probe `GET /health` and check certificate expiry. A non-200 probe
    /// fails initialization.
    pub async fn initialize(&self) -> Result<(), TransportError> {
        if self.endpoint.starts_with("https://") {
            certs::check_certificate_expiry(
                &self.config.auth.client_cert_path,
                self.config.auth.cert_rotation_days,
            );
        }

        let status = self.probe_health().await?;
        if status != 200 {
            return Err(TransportError::Unhealthy(format!("health check returned {status}")));
        }
        info!(endpoint = %self.endpoint, "transport initialized");
        Ok(())
    }

    /// `GET /health` returning the status code (does not fail initialization).
    pub async fn probe_health(&self) -> Result<u16, TransportError> {
        let response = self
            .client
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
            .map_err(|e| TransportError::Unhealthy(e.to_string()))?;
        Ok(response.status().as_u16())
    }

    /// Re-check client certificate expiry (periodic task).
    pub fn check_certificate(&self) {
        if self.endpoint.starts_with("https://") {
            certs::check_certificate_expiry(
                &self.config.auth.client_cert_path,
                self.config.auth.cert_rotation_days,
            );
        }
    }

    /// POST a batch to `/events`. Returns `(true, bytes_on_wire)` on 2xx.
    ///
    /// Auth rejections (401/403) surface immediately as
    /// [`TransportError::Auth`]; other failures consume the retry budget
    /// first.
    pub async fn send_events(&self, events: &[Event]) -> Result<(bool, u64), TransportError> {
        if events.is_empty() {
            return Ok((true, 0));
        }

        let payload = json!({
            "agent_id": self.agent_id,
            "timestamp": Utc::now().timestamp(),
            "events": events,
        });
        let raw = serde_json::to_vec(&payload)
            .map_err(|e| TransportError::Request(format!("payload serialization failed: {e}")))?;
        let (body, encoding) = compress_body(raw, &self.config.compression);
        let bytes_on_wire = body.len() as u64;

        let mut headers = vec![("X-Event-Count", events.len().to_string())];
        if let Some(encoding) = encoding {
            headers.push(("Content-Encoding", encoding.to_string()));
        }

        let result = self
            .send_with_retry(&format!("{}/events", self.endpoint), body, &headers)
            .await;
        match result {
            Ok(()) => {
                self.counters.events_sent.fetch_add(events.len() as u64, Ordering::Relaxed);
                self.counters.bytes_sent.fetch_add(bytes_on_wire, Ordering::Relaxed);
                self.counters.requests_sent.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .last_success_ms
                    .store(Utc::now().timestamp_millis() as u64, Ordering::Relaxed);
                Ok((true, bytes_on_wire))
            }
            Err(e) => {
                self.counters.requests_failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// POST the status snapshot to `/heartbeat`.
    pub async fn send_heartbeat(&self, status: &Value) -> Result<(), TransportError> {
        let payload = json!({
            "agent_id": self.agent_id,
            "timestamp": Utc::now().timestamp(),
            "type": "heartbeat",
            "status": status,
        });
        let raw = serde_json::to_vec(&payload)
            .map_err(|e| TransportError::Request(format!("heartbeat serialization failed: {e}")))?;
        let (body, encoding) = compress_body(raw, &self.config.compression);
        let bytes = body.len() as u64;

        let mut headers = Vec::new();
        if let Some(encoding) = encoding {
            headers.push(("Content-Encoding", encoding.to_string()));
        }

        self.send_with_retry(&format!("{}/heartbeat", self.endpoint), body, &headers)
            .await?;
        self.counters.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        self.counters
            .last_success_ms
            .store(Utc::now().timestamp_millis() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// `GET /agents/{id}/config`: 200 yields the new document, 304 means
    /// unchanged, anything else is warned about and ignored.
    pub async fn fetch_config(&self) -> Result<Option<Value>, TransportError> {
        let url = format!("{}/agents/{}/config", self.endpoint, self.agent_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        match response.status().as_u16() {
            200 => {
                let doc = response
                    .json::<Value>()
                    .await
                    .map_err(|e| TransportError::Request(format!("invalid config body: {e}")))?;
                Ok(Some(doc))
            }
            304 => Ok(None),
            status => {
                warn!(status, "config update check failed");
                Ok(None)
            }
        }
    }

    pub fn stats(&self) -> TransportStats {
        let sent = self.counters.requests_sent.load(Ordering::Relaxed);
        let failed = self.counters.requests_failed.load(Ordering::Relaxed);
        let last_ms = self.counters.last_success_ms.load(Ordering::Relaxed);
        TransportStats {
            events_sent: self.counters.events_sent.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            requests_sent: sent,
            requests_failed: failed,
            success_rate: if sent + failed > 0 {
                sent as f64 / (sent + failed) as f64 * 100.0
            } else {
                100.0
            },
            last_success_time: if last_ms > 0 { Some(last_ms as f64 / 1_000.0) } else { None },
        }
    }

    /// Drop pooled connections.
    pub async fn close(&self) {
        info!("transport closed");
    }

    async fn send_with_retry(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: &[(&str, String)],
    ) -> Result<(), TransportError> {
        let mut last_error = TransportError::Request("no attempts made".into());

        for attempt in 0..self.retry.max_attempts() {
            let mut request = self
                .client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
            for (name, value) in headers {
                request = request.header(*name, value.as_str());
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        debug!(url, attempt, "request delivered");
                        return Ok(());
                    }

                    let text = response.text().await.unwrap_or_default();
                    if status == 401 || status == 403 {
                        // Never retried
                        return Err(TransportError::Auth(format!("{status}: {text}")));
                    }
                    let err = TransportError::Status { status: status.as_u16(), body: text };
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_error = err;
                }
                Err(e) => last_error = TransportError::Request(e.to_string()),
            }

            if attempt + 1 < self.retry.max_attempts() {
                let delay = self.retry.delay_for(attempt);
                warn!(
                    url,
                    attempt = attempt + 1,
                    max_attempts = self.retry.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "request failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        error!(url, error = %last_error, "request failed after all attempts");
        Err(TransportError::RetriesExhausted {
            attempts: self.retry.max_attempts(),
            last_error: last_error.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
