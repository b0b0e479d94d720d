//! The UDP agent loop.
//!
//! One task owns the socket, the registry, and the receive buffer. Each
//! datagram is processed to completion before the next is read, so the ODB
//! and registry need no locking: receive, filter by source address, decode,
//! check the community, resolve, encode, send.
//!
//! Pre-authentication failures (bad source, malformed packet, wrong
//! community) are logged and the datagram is dropped without a response;
//! SNMPv1 has nothing to say to an unauthenticated peer. Once a request
//! authenticates, the only thing that prevents a response is a transmit
//! failure.

mod config;
mod response;

pub use config::{Config, Netmask, SNMP_PORT};
pub use response::encode_response;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use subtle::ConstantTimeEq;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::message::{MAX_DATAGRAM_SIZE, RequestPdu};
use crate::module::{MibModule, Placement, Registry, SystemMib};
use crate::stats::{SnmpStats, bump};
use crate::util::bind_udp_socket;

/// A bound SNMPv1 agent, ready to serve.
pub struct Agent {
    socket: UdpSocket,
    community: Vec<u8>,
    allow: Vec<Netmask>,
    cache: Duration,
    registry: Registry,
    stats: Arc<SnmpStats>,
    cancel: CancellationToken,
}

impl Agent {
    /// Start building an agent programmatically.
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Bind an agent from a parsed configuration and a prepared registry.
    pub async fn from_config(
        config: &Config,
        registry: Registry,
        stats: Arc<SnmpStats>,
        cancel: CancellationToken,
    ) -> Result<Agent> {
        let socket = bind_udp_socket(config.listen, None).await?;
        tracing::info!(
            target: "minisnmpd::agent",
            listen = %config.listen,
            "listening [udp]"
        );
        Ok(Agent {
            socket,
            community: config.community.as_bytes().to_vec(),
            allow: config.allow.clone(),
            cache: config.cache,
            registry,
            stats,
            cancel,
        })
    }

    /// The address the agent is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Shared statistics handle.
    pub fn stats(&self) -> Arc<SnmpStats> {
        self.stats.clone()
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Serve requests until cancelled.
    pub async fn run(mut self) -> Result<()> {
        let cancel = self.cancel.clone();
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buf) => received,
            };

            match received {
                Ok((len, peer)) => {
                    let datagram = Bytes::copy_from_slice(&buf[..len]);
                    self.process(datagram, peer).await;
                }
                Err(e) => {
                    tracing::warn!(target: "minisnmpd::agent", error = %e, "recvfrom failed");
                }
            }
        }

        self.registry.close();
        Ok(())
    }

    /// Handle one datagram to completion.
    async fn process(&mut self, data: Bytes, peer: SocketAddr) {
        if data.is_empty() {
            tracing::warn!(target: "minisnmpd::agent", peer = %peer, "received empty packet");
            return;
        }
        bump(&self.stats.in_pkts);

        if !self.source_allowed(peer) {
            tracing::warn!(
                target: "minisnmpd::agent",
                peer = %peer,
                "rejected packet: not in list of allowed clients"
            );
            return;
        }

        let pdu = match RequestPdu::decode(data, &self.stats) {
            Ok(pdu) => pdu,
            Err(e) => {
                tracing::warn!(
                    target: "minisnmpd::agent",
                    peer = %peer,
                    error = %e,
                    "failed to decode packet"
                );
                return;
            }
        };

        let community_ok: bool = self.community.as_slice().ct_eq(&pdu.community).into();
        if !community_ok {
            bump(&self.stats.in_bad_community_names);
            tracing::warn!(
                target: "minisnmpd::agent",
                peer = %peer,
                "rejected packet: invalid community string"
            );
            return;
        }

        let response =
            match encode_response(&pdu, &mut self.registry, &self.stats, self.cache) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(
                        target: "minisnmpd::agent",
                        peer = %peer,
                        error = %e,
                        "failed to encode response"
                    );
                    return;
                }
            };

        match self.socket.send_to(&response, peer).await {
            Ok(sent) => {
                if sent > 0 {
                    bump(&self.stats.out_pkts);
                }
                if sent != response.len() {
                    tracing::warn!(
                        target: "minisnmpd::agent",
                        peer = %peer,
                        sent,
                        size = response.len(),
                        "short write"
                    );
                } else {
                    tracing::debug!(
                        target: "minisnmpd::agent",
                        peer = %peer,
                        pdu = %pdu.kind,
                        size = sent,
                        "sent reply"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    target: "minisnmpd::agent",
                    peer = %peer,
                    pdu = %pdu.kind,
                    error = %e,
                    "reply failed"
                );
            }
        }
    }

    fn source_allowed(&self, peer: SocketAddr) -> bool {
        let ip = match peer {
            SocketAddr::V4(addr) => *addr.ip(),
            // Dual-stack sockets hand IPv4 peers back as mapped addresses.
            SocketAddr::V6(addr) => match addr.ip().to_ipv4_mapped() {
                Some(ip) => ip,
                None => return false,
            },
        };
        self.allow.iter().any(|net| net.matches(ip))
    }
}

/// Builder for [`Agent`], for programmatic and test use.
///
/// The configuration file path is the production route
/// ([`Agent::from_config`]); the builder covers embedding the agent and
/// integration tests that need an ephemeral port.
pub struct AgentBuilder {
    bind_addr: String,
    community: Vec<u8>,
    allow: Vec<Netmask>,
    cache: Duration,
    recv_buffer_size: Option<usize>,
    contact: String,
    location: String,
    modules: Vec<(Box<dyn MibModule>, Placement)>,
    cancel: Option<CancellationToken>,
}

impl AgentBuilder {
    /// Create a builder with defaults: loopback-only access, community
    /// `public`, refresh on every query.
    pub fn new() -> Self {
        Self {
            bind_addr: "0.0.0.0:161".to_string(),
            community: b"public".to_vec(),
            allow: Vec::new(),
            cache: Duration::ZERO,
            recv_buffer_size: None,
            contact: String::new(),
            location: String::new(),
            modules: Vec::new(),
            cancel: None,
        }
    }

    /// Set the UDP bind address (default `0.0.0.0:161`).
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Set the accepted community string.
    pub fn community(mut self, community: &[u8]) -> Self {
        self.community = community.to_vec();
        self
    }

    /// Add an allowed source network. Defaults to loopback only.
    pub fn allow(mut self, netmask: Netmask) -> Self {
        self.allow.push(netmask);
        self
    }

    /// Set the module cache lifetime (default: refresh on every query).
    pub fn cache(mut self, cache: Duration) -> Self {
        self.cache = cache;
        self
    }

    /// Request a kernel receive buffer size.
    pub fn recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = Some(size);
        self
    }

    /// Set sysContact.
    pub fn contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = contact.into();
        self
    }

    /// Set sysLocation.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Register an additional module.
    pub fn module(mut self, module: Box<dyn MibModule>, placement: Placement) -> Self {
        self.modules.push((module, placement));
        self
    }

    /// Use an external cancellation token.
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Bind the socket and assemble the agent.
    pub async fn build(self) -> Result<Agent> {
        let started = Instant::now();
        let stats = Arc::new(SnmpStats::new());

        let system = SystemMib::new(started)
            .with_contact(self.contact)
            .with_location(self.location);
        let mut registry = Registry::with_builtins(started, system, stats.clone())?;

        for (module, placement) in self.modules {
            match placement {
                Placement::Internal => registry.register(module, placement)?,
                Placement::External => {
                    if let Err(e) = registry.register(module, placement) {
                        tracing::warn!(
                            target: "minisnmpd::module",
                            error = %e,
                            "not loading module"
                        );
                    }
                }
            }
        }

        let addr: SocketAddr = self
            .bind_addr
            .parse()
            .map_err(|_| Error::config(format!("failed to parse {}", self.bind_addr)))?;
        let socket = bind_udp_socket(addr, self.recv_buffer_size).await?;

        let allow = if self.allow.is_empty() {
            vec![Netmask {
                network: std::net::Ipv4Addr::LOCALHOST,
                mask: 0xFF00_0000,
            }]
        } else {
            self.allow
        };

        Ok(Agent {
            socket,
            community: self.community,
            allow,
            cache: self.cache,
            registry,
            stats,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
