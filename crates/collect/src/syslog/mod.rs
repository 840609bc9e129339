// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Syslog collector: UDP/TCP/TLS receivers feeding a bounded in-memory
//! channel, drained and parsed on each poll tick.

mod parser;

pub use parser::{
    emit_structured_data, facility_name, parse_message, parse_structured_data, severity_name,
    RfcTag, SyslogMessage,
};

use crate::collector::{Collector, RawEvent, TestReport};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use sw_core::{CollectorError, CollectorKind, ShutdownSignal};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpSocket, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Bounded channel capacity between receivers and the poll loop.
const CHANNEL_CAPACITY: usize = 10_000;

/// TCP accept backlog.
const ACCEPT_BACKLOG: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    Tcp,
    Tls,
}

sw_core::simple_display! {
    Protocol {
        Udp => "udp",
        Tcp => "tcp",
        Tls => "tls",
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

/// Collector-specific settings from the descriptor's `config` object.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyslogSettings {
    pub protocol: Protocol,
    pub bind_address: String,
    pub port: u16,
    pub max_message_size: usize,
    pub tls: TlsSettings,
}

impl Default for SyslogSettings {
    fn default() -> Self {
        Self {
            protocol: Protocol::Udp,
            bind_address: "0.0.0.0".to_string(),
            port: 514,
            max_message_size: 8_192,
            tls: TlsSettings::default(),
        }
    }
}

/// One raw message as received from the network.
struct RawMessage {
    raw: String,
    source_ip: String,
    source_port: u16,
    protocol: Protocol,
    received_at: f64,
}

#[derive(Default)]
struct Stats {
    received: AtomicU64,
    dropped: AtomicU64,
    parsed: AtomicU64,
    parse_errors: AtomicU64,
    connections: AtomicU64,
}

/// RFC 3164/5424 syslog receiver.
pub struct SyslogCollector {
    name: String,
    settings: SyslogSettings,
    batch_size: usize,
    tx: mpsc::Sender<RawMessage>,
    rx: mpsc::Receiver<RawMessage>,
    stats: Arc<Stats>,
    server_shutdown: ShutdownSignal,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl SyslogCollector {
    pub fn new(name: impl Into<String>, config: &Value, batch_size: usize) -> Result<Self, CollectorError> {
        let settings: SyslogSettings = serde_json::from_value(crate::collector::settings_source(config))
            .map_err(|e| CollectorError::Collect(format!("invalid syslog collector config: {e}")))?;
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        Ok(Self {
            name: name.into(),
            settings,
            batch_size,
            tx,
            rx,
            stats: Arc::new(Stats::default()),
            server_shutdown: ShutdownSignal::new(),
            tasks: Vec::new(),
        })
    }

    fn bind_addr(&self) -> Result<SocketAddr, CollectorError> {
        format!("{}:{}", self.settings.bind_address, self.settings.port)
            .parse()
            .map_err(|e| CollectorError::Collect(format!("invalid bind address: {e}")))
    }

    async fn start_udp(&mut self, addr: SocketAddr) -> Result<(), CollectorError> {
        let socket = UdpSocket::bind(addr).await?;
        info!(collector = %self.name, %addr, "UDP syslog receiver bound");

        let tx = self.tx.clone();
        let stats = Arc::clone(&self.stats);
        let shutdown = self.server_shutdown.clone();
        let max_size = self.settings.max_message_size;
        self.tasks.push(tokio::spawn(async move {
            let mut buf = vec![0u8; max_size];
            loop {
                tokio::select! {
                    result = socket.recv_from(&mut buf) => match result {
                        Ok((len, peer)) => {
                            let raw = String::from_utf8_lossy(&buf[..len]).into_owned();
                            enqueue(&tx, &stats, raw, peer, Protocol::Udp);
                        }
                        Err(e) => {
                            error!(error = %e, "UDP receive failed");
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        }
                    },
                    _ = shutdown.wait() => break,
                }
            }
        }));
        Ok(())
    }

    async fn start_tcp(&mut self, addr: SocketAddr) -> Result<(), CollectorError> {
        let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(ACCEPT_BACKLOG)?;

        let acceptor = if self.settings.protocol == Protocol::Tls {
            Some(self.build_tls_acceptor()?)
        } else {
            None
        };
        info!(collector = %self.name, %addr, protocol = %self.settings.protocol, "TCP syslog receiver bound");

        let tx = self.tx.clone();
        let stats = Arc::clone(&self.stats);
        let shutdown = self.server_shutdown.clone();
        let protocol = self.settings.protocol;
        let max_size = self.settings.max_message_size;
        self.tasks.push(tokio::spawn(accept_loop(
            listener, acceptor, tx, stats, shutdown, protocol, max_size,
        )));
        Ok(())
    }

    fn build_tls_acceptor(&self) -> Result<TlsAcceptor, CollectorError> {
        use tokio_rustls::rustls::ServerConfig;

        let cert_path = self.settings.tls.cert_file.as_ref().ok_or_else(|| {
            CollectorError::Collect("tls.cert_file is required for the tls protocol".into())
        })?;
        let key_path = self.settings.tls.key_file.as_ref().ok_or_else(|| {
            CollectorError::Collect("tls.key_file is required for the tls protocol".into())
        })?;

        let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(std::fs::File::open(cert_path)?))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CollectorError::Collect(format!("cannot read server certificate: {e}")))?;
        let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(std::fs::File::open(key_path)?))
            .map_err(|e| CollectorError::Collect(format!("cannot read server key: {e}")))?
            .ok_or_else(|| CollectorError::Collect("no private key in key file".into()))?;

        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| CollectorError::Collect(format!("invalid TLS material: {e}")))?;
        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn enqueue(
    tx: &mpsc::Sender<RawMessage>,
    stats: &Stats,
    raw: String,
    peer: SocketAddr,
    protocol: Protocol,
) {
    let message = RawMessage {
        raw,
        source_ip: peer.ip().to_string(),
        source_port: peer.port(),
        protocol,
        received_at: Utc::now().timestamp_millis() as f64 / 1_000.0,
    };
    match tx.try_send(message) {
        Ok(()) => {
            stats.received.fetch_add(1, Ordering::Relaxed);
        }
        Err(_) => {
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            warn!("syslog channel full, dropping message");
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn accept_loop(
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    tx: mpsc::Sender<RawMessage>,
    stats: Arc<Stats>,
    shutdown: ShutdownSignal,
    protocol: Protocol,
    max_size: usize,
) {
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    stats.connections.fetch_add(1, Ordering::Relaxed);
                    debug!(%peer, "syslog connection accepted");
                    spawn_client(stream, acceptor.clone(), tx.clone(), Arc::clone(&stats), shutdown.clone(), peer, protocol, max_size);
                }
                Err(e) => {
                    error!(error = %e, "accept failed");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            },
            _ = shutdown.wait() => break,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_client(
    stream: TcpStream,
    acceptor: Option<TlsAcceptor>,
    tx: mpsc::Sender<RawMessage>,
    stats: Arc<Stats>,
    shutdown: ShutdownSignal,
    peer: SocketAddr,
    protocol: Protocol,
    max_size: usize,
) {
    tokio::spawn(async move {
        match acceptor {
            Some(acceptor) => match acceptor.accept(stream).await {
                Ok(tls_stream) => {
                    client_loop(tls_stream, tx, stats, shutdown, peer, protocol, max_size).await
                }
                Err(e) => warn!(%peer, error = %e, "TLS handshake failed"),
            },
            None => client_loop(stream, tx, stats, shutdown, peer, protocol, max_size).await,
        }
        debug!(%peer, "syslog connection closed");
    });
}

/// Read newline-delimited frames from one connection.
async fn client_loop<S>(
    stream: S,
    tx: mpsc::Sender<RawMessage>,
    stats: Arc<Stats>,
    shutdown: ShutdownSignal,
    peer: SocketAddr,
    protocol: Protocol,
    max_size: usize,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(mut raw)) => {
                    if raw.len() > max_size {
                        raw.truncate(max_size);
                    }
                    if !raw.trim().is_empty() {
                        enqueue(&tx, &stats, raw, peer, protocol);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(%peer, error = %e, "connection read failed");
                    break;
                }
            },
            _ = shutdown.wait() => break,
        }
    }
}

#[async_trait]
impl Collector for SyslogCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> CollectorKind {
        CollectorKind::Syslog
    }

    async fn initialize(&mut self) -> Result<(), CollectorError> {
        let addr = self.bind_addr()?;
        match self.settings.protocol {
            Protocol::Udp => self.start_udp(addr).await?,
            Protocol::Tcp | Protocol::Tls => self.start_tcp(addr).await?,
        }
        Ok(())
    }

    /// Drain up to one batch from the channel and parse each message.
    async fn collect_events(&mut self) -> Result<Vec<RawEvent>, CollectorError> {
        let mut events = Vec::new();
        while events.len() < self.batch_size {
            let Ok(message) = self.rx.try_recv() else { break };

            let parsed = parse_message(&message.raw);
            if parsed.rfc == RfcTag::ParseError {
                self.stats.parse_errors.fetch_add(1, Ordering::Relaxed);
            } else {
                self.stats.parsed.fetch_add(1, Ordering::Relaxed);
            }

            let mut fields = parsed.to_fields();
            fields.insert("id".to_string(), Value::String(syslog_event_id()));
            fields.insert("source_ip".to_string(), Value::String(message.source_ip));
            fields.insert("source_port".to_string(), Value::from(message.source_port));
            fields.insert("protocol".to_string(), Value::String(message.protocol.to_string()));
            fields.insert("received_at".to_string(), Value::from(message.received_at));
            fields.insert("collector_name".to_string(), Value::String(self.name.clone()));
            events.push(fields);
        }
        Ok(events)
    }

    async fn cleanup(&mut self) {
        self.server_shutdown.trigger();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    async fn test_connection(&self) -> TestReport {
        if !self.tasks.is_empty() {
            return TestReport::ok(format!(
                "receiver listening on {}:{} ({})",
                self.settings.bind_address, self.settings.port, self.settings.protocol
            ))
            .with_details(json!({
                "messages_received": self.stats.received.load(Ordering::Relaxed),
                "parse_errors": self.stats.parse_errors.load(Ordering::Relaxed),
            }));
        }

        // Not started yet: probe that the address is bindable
        let addr = format!("{}:{}", self.settings.bind_address, self.settings.port);
        let result = match self.settings.protocol {
            Protocol::Udp => UdpSocket::bind(&addr).await.map(|_| ()),
            Protocol::Tcp | Protocol::Tls => TcpListener::bind(&addr).await.map(|_| ()),
        };
        match result {
            Ok(()) => TestReport::ok(format!("can bind {addr}")),
            Err(e) => TestReport::failed(format!("cannot bind {addr}: {e}")),
        }
    }

    fn collector_info(&self) -> Value {
        json!({
            "type": "syslog",
            "description": "RFC 3164/5424 syslog receiver",
            "capabilities": [
                "udp_receiver",
                "tcp_receiver",
                "tls_receiver",
                "rfc3164_parsing",
                "rfc5424_parsing",
                "structured_data_parsing",
            ],
            "supported_protocols": ["udp", "tcp", "tls"],
            "supported_rfcs": ["rfc3164", "rfc5424"],
            "configuration": {
                "protocol": self.settings.protocol.to_string(),
                "bind_address": self.settings.bind_address,
                "port": self.settings.port,
                "max_message_size": self.settings.max_message_size,
            },
            "statistics": {
                "messages_received": self.stats.received.load(Ordering::Relaxed),
                "messages_parsed": self.stats.parsed.load(Ordering::Relaxed),
                "parse_errors": self.stats.parse_errors.load(Ordering::Relaxed),
                "messages_dropped": self.stats.dropped.load(Ordering::Relaxed),
                "connection_count": self.stats.connections.load(Ordering::Relaxed),
            },
        })
    }
}

fn syslog_event_id() -> String {
    format!("syslog-{}", Utc::now().timestamp_micros())
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
