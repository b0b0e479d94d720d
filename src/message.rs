//! SNMPv1 request message decoding.
//!
//! A message is `SEQUENCE { version INTEGER, community OCTET STRING, pdu }`
//! where the pdu is an implicitly tagged `SEQUENCE { request-id INTEGER,
//! error-status INTEGER, error-index INTEGER, varbind-list }`. This agent
//! only receives requests, so error-status and error-index must decode as
//! zero and every request varbind carries a placeholder NULL.
//!
//! The decoder operates on untrusted datagrams. Rejections update the snmp
//! group counters: BER-level failures count as ASN.1 parse errors, a wrong
//! version counts against snmpInBadVersions, and a non-zero error-status is
//! attributed to the matching snmpIn* counter even though the packet is
//! dropped.

use bytes::Bytes;

use crate::ber::{Decoder, tag};
use crate::error::{DecodeErrorKind, Error, ErrorStatus, Result};
use crate::oid::Oid;
use crate::stats::{SnmpStats, bump};

/// SNMPv1 version field value.
pub const SNMP_VERSION_1: i32 = 0;

/// Maximum UDP datagram size, inbound and outbound.
pub const MAX_DATAGRAM_SIZE: usize = 65536;

/// Request PDU type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduKind {
    GetRequest,
    GetNextRequest,
    // ...more types to follow
}

impl std::fmt::Display for PduKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetRequest => write!(f, "GetRequest"),
            Self::GetNextRequest => write!(f, "GetNextRequest"),
        }
    }
}

/// A decoded request, alive for one datagram.
#[derive(Debug, Clone)]
pub struct RequestPdu {
    /// Request type.
    pub kind: PduKind,
    /// Opaque ID echoed back in the response.
    pub request_id: i32,
    /// Community string, still borrowing the receive buffer.
    pub community: Bytes,
    /// Requested OIDs in wire order.
    pub oids: Vec<Oid>,
}

impl RequestPdu {
    /// Decode one datagram into a request PDU.
    ///
    /// Counters on `stats` are updated for both accepted and rejected
    /// packets; see the module docs for the attribution rules.
    pub fn decode(data: Bytes, stats: &SnmpStats) -> Result<RequestPdu> {
        let mut outer = Decoder::new(data);

        let mut msg = asn(stats, outer.read_sequence())?;
        let version = asn(stats, msg.read_integer())?;

        if version != SNMP_VERSION_1 {
            bump(&stats.in_bad_versions);
            return Err(Error::UnsupportedVersion(version));
        }

        let community = asn(stats, msg.read_octet_string())?;

        let pdu_tag = asn(stats, msg.read_tag())?;
        let kind = match pdu_tag {
            tag::pdu::GET_REQUEST => {
                bump(&stats.in_get_requests);
                PduKind::GetRequest
            }
            tag::pdu::GET_NEXT_REQUEST => {
                bump(&stats.in_get_nexts);
                PduKind::GetNextRequest
            }
            other => {
                bump(&stats.in_asn_parse_errs);
                return Err(Error::decode(
                    msg.offset() - 1,
                    DecodeErrorKind::UnknownPduType(other),
                ));
            }
        };

        let pdu_len = asn(stats, msg.read_length())?;
        let mut pdu = asn(stats, msg.sub_decoder(pdu_len))?;

        let request_id = asn(stats, pdu.read_integer())?;
        let error_status = asn(stats, pdu.read_integer())?;
        let error_index = asn(stats, pdu.read_integer())?;

        if error_status != 0 {
            match ErrorStatus::from_i32(error_status) {
                Some(ErrorStatus::TooBig) => bump(&stats.in_too_bigs),
                Some(ErrorStatus::NoSuchName) => bump(&stats.in_no_such_names),
                Some(ErrorStatus::BadValue) => bump(&stats.in_bad_values),
                Some(ErrorStatus::ReadOnly) => bump(&stats.in_read_onlys),
                Some(ErrorStatus::GenErr) => bump(&stats.in_gen_errs),
                _ => {}
            }
            return Err(Error::NonZeroErrorField {
                field: "error-status",
                value: error_status,
            });
        }
        if error_index != 0 {
            return Err(Error::NonZeroErrorField {
                field: "error-index",
                value: error_index,
            });
        }

        let oids = decode_varbind_oids(&mut pdu, stats)?;

        if kind == PduKind::GetRequest && oids.is_empty() {
            return Err(Error::EmptyRequest);
        }

        let trailing = pdu.remaining() + msg.remaining() + outer.remaining();
        if trailing > 0 {
            return Err(Error::TrailingBytes(trailing));
        }

        Ok(RequestPdu {
            kind,
            request_id,
            community,
            oids,
        })
    }
}

/// Parse the varbind list of a request.
///
/// Request varbinds are (OID, NULL) pairs; anything else is malformed. The
/// declared length of each inner pair sequence is consumed but not
/// re-validated, matching the flat scan the wire format was designed for.
fn decode_varbind_oids(pdu: &mut Decoder, stats: &SnmpStats) -> Result<Vec<Oid>> {
    let list_len = asn(stats, pdu.expect_tag(tag::universal::SEQUENCE))?;
    let mut list = asn(stats, pdu.sub_decoder(list_len))?;

    let mut oids = Vec::new();
    while !list.is_empty() {
        let _ = asn(stats, list.expect_tag(tag::universal::SEQUENCE))?;
        let oid = asn(stats, list.read_oid())?;
        asn(stats, list.read_null())?;
        oids.push(oid);
    }

    Ok(oids)
}

/// Attribute a BER failure to snmpInASNParseErrs.
fn asn<T>(stats: &SnmpStats, result: Result<T>) -> Result<T> {
    if result.is_err() {
        bump(&stats.in_asn_parse_errs);
    }
    result
}
