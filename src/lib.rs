//! # minisnmpd
//!
//! A small SNMPv1 agent: it listens for UDP requests, decodes BER-encoded
//! GetRequest/GetNextRequest messages, resolves each requested OID against
//! a tree of pluggable MIB modules, and encodes a GetResponse.
//!
//! The two load-bearing pieces are:
//!
//! - [`odb::Odb`] - a variable-arity trie over OID arcs with exact-match and
//!   lexicographic-successor lookup (the GetNext operation SNMP tree walks
//!   are built on);
//! - the protocol layer ([`message`] and [`agent::encode_response`]) -
//!   decoding untrusted datagrams with full counter accounting, and
//!   single-pass reverse-buffer response encoding.
//!
//! MIB modules implement [`module::MibModule`] and register with a
//! [`module::Registry`], which routes queries by OID range and refreshes
//! each module's cached subtree on a pull basis.
//!
//! ## Embedding
//!
//! ```rust,no_run
//! use minisnmpd::Agent;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> minisnmpd::Result<()> {
//!     let agent = Agent::builder()
//!         .bind("127.0.0.1:1161")
//!         .community(b"public")
//!         .contact("noc@example.net")
//!         .location("rack 4")
//!         .build()
//!         .await?;
//!     agent.run().await
//! }
//! ```

pub mod agent;
pub mod ber;
pub mod error;
pub mod message;
pub mod module;
pub mod odb;
pub mod oid;
pub mod stats;
pub mod value;
pub mod varbind;

pub(crate) mod util;

// Re-exports for convenience
pub use agent::{Agent, AgentBuilder, Config, Netmask, encode_response};
pub use error::{DecodeErrorKind, Error, ErrorStatus, Result};
pub use message::{MAX_DATAGRAM_SIZE, PduKind, RequestPdu, SNMP_VERSION_1};
pub use module::{MibModule, ParseOutcome, Placement, Registry, SnmpMib, SystemMib};
pub use odb::Odb;
pub use oid::Oid;
pub use stats::SnmpStats;
pub use value::Value;
pub use varbind::VarBind;
