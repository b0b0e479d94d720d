//! GetResponse encoding.
//!
//! The response is built back to front in an [`EncodeBuf`]: varbinds go in
//! first (in reverse request order, so they come out in request order), then
//! the PDU header integers, the GetResponse wrapper, community, version,
//! and the outer message sequence, each prepending its own length.

use std::time::Duration;

use bytes::Bytes;

use crate::ber::{EncodeBuf, tag};
use crate::error::{Error, ErrorStatus, Result};
use crate::message::{MAX_DATAGRAM_SIZE, PduKind, RequestPdu, SNMP_VERSION_1};
use crate::module::Registry;
use crate::oid::Oid;
use crate::stats::{SnmpStats, bump};

/// Resolve a request against the registry and encode the response message.
///
/// Missing OIDs become NULL varbinds with `noSuchName` status. The varbind
/// loop runs back to front, and each miss overwrites the recorded
/// error-index, so the lowest-positioned failing varbind is the one
/// reported.
pub fn encode_response(
    pdu: &RequestPdu,
    registry: &mut Registry,
    stats: &SnmpStats,
    timeout: Duration,
) -> Result<Bytes> {
    let mut buf = EncodeBuf::with_capacity(1024);
    let mut status = ErrorStatus::NoError;
    let mut index: u32 = 0;

    bump(&stats.out_get_responses);

    match pdu.kind {
        PduKind::GetRequest => {
            for (pos, oid) in pdu.oids.iter().enumerate().rev() {
                encode_value(&mut buf, registry, stats, timeout, oid, pos as u32 + 1, &mut status, &mut index);
            }
        }
        PduKind::GetNextRequest if !pdu.oids.is_empty() => {
            for (pos, oid) in pdu.oids.iter().enumerate().rev() {
                encode_next_value(&mut buf, registry, stats, timeout, oid, pos as u32 + 1, &mut status, &mut index);
            }
        }
        PduKind::GetNextRequest => {
            // No varbinds: answer with the very first object in the tree.
            match registry.get_next(&Oid::empty(), timeout) {
                Some((next_oid, value)) => {
                    buf.push_sequence(|buf| {
                        value.encode(buf);
                        buf.push_oid(&next_oid);
                    });
                }
                None => return Err(Error::EmptyTree),
            }
        }
    }

    buf.wrap_sequence(); // varbind list
    buf.push_integer(index as i32);
    buf.push_integer(status.as_i32());
    buf.push_integer(pdu.request_id);
    buf.wrap_constructed(tag::pdu::GET_RESPONSE);
    buf.push_octet_string(&pdu.community);
    buf.push_integer(SNMP_VERSION_1);
    buf.wrap_sequence();

    let bytes = buf.finish();
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(Error::ResponseTooBig {
            size: bytes.len(),
            max: MAX_DATAGRAM_SIZE,
        });
    }
    Ok(bytes)
}

/// Encode one GetRequest varbind: the exact value, or NULL on a miss.
#[allow(clippy::too_many_arguments)]
fn encode_value(
    buf: &mut EncodeBuf,
    registry: &mut Registry,
    stats: &SnmpStats,
    timeout: Duration,
    oid: &Oid,
    position: u32,
    status: &mut ErrorStatus,
    index: &mut u32,
) {
    match registry.get(oid, timeout) {
        Some(value) => {
            bump(&stats.in_total_req_vars);
            buf.push_sequence(|buf| {
                value.encode(buf);
                buf.push_oid(oid);
            });
        }
        None => {
            bump(&stats.out_no_such_names);
            *status = ErrorStatus::NoSuchName;
            *index = position;
            buf.push_sequence(|buf| {
                buf.push_null();
                buf.push_oid(oid);
            });
        }
    }
}

/// Encode one GetNextRequest varbind: the successor pair, or the queried
/// OID with NULL when the walk ran off the end of the tree.
#[allow(clippy::too_many_arguments)]
fn encode_next_value(
    buf: &mut EncodeBuf,
    registry: &mut Registry,
    stats: &SnmpStats,
    timeout: Duration,
    oid: &Oid,
    position: u32,
    status: &mut ErrorStatus,
    index: &mut u32,
) {
    match registry.get_next(oid, timeout) {
        Some((next_oid, value)) => {
            buf.push_sequence(|buf| {
                value.encode(buf);
                buf.push_oid(&next_oid);
            });
        }
        None => {
            bump(&stats.out_no_such_names);
            *status = ErrorStatus::NoSuchName;
            *index = position;
            buf.push_sequence(|buf| {
                buf.push_null();
                buf.push_oid(oid);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::Decoder;
    use crate::module::{MibModule, Placement};
    use crate::odb::Odb;
    use crate::oid;
    use crate::stats::read;
    use crate::value::Value;
    use crate::varbind::{VarBind, decode_varbind_list};
    use std::time::Instant;

    struct FixedModule {
        subtree: Oid,
        rows: Vec<(Oid, Value)>,
    }

    impl MibModule for FixedModule {
        fn name(&self) -> &str {
            "fixed"
        }
        fn subtree(&self) -> Oid {
            self.subtree.clone()
        }
        fn update(&mut self, cache: &mut Odb) -> Result<()> {
            for (oid, value) in &self.rows {
                cache.insert(oid, value.clone())?;
            }
            Ok(())
        }
    }

    fn test_registry(rows: Vec<(Oid, Value)>) -> Registry {
        let mut registry = Registry::new(Instant::now());
        registry
            .register(
                Box::new(FixedModule {
                    subtree: oid!(1),
                    rows,
                }),
                Placement::Internal,
            )
            .unwrap();
        registry
    }

    fn request(kind: PduKind, oids: Vec<Oid>) -> RequestPdu {
        RequestPdu {
            kind,
            request_id: 99,
            community: Bytes::from_static(b"public"),
            oids,
        }
    }

    /// Pull apart an encoded GetResponse message.
    fn parse_response(data: Bytes) -> (i32, i32, i32, Vec<VarBind>) {
        let mut outer = Decoder::new(data);
        let mut msg = outer.read_sequence().unwrap();
        assert!(outer.is_empty());

        assert_eq!(msg.read_integer().unwrap(), SNMP_VERSION_1);
        assert_eq!(&msg.read_octet_string().unwrap()[..], b"public");

        let mut pdu = msg.read_constructed(tag::pdu::GET_RESPONSE).unwrap();
        assert!(msg.is_empty());

        let request_id = pdu.read_integer().unwrap();
        let error_status = pdu.read_integer().unwrap();
        let error_index = pdu.read_integer().unwrap();
        let varbinds = decode_varbind_list(&mut pdu).unwrap();
        assert!(pdu.is_empty());

        (request_id, error_status, error_index, varbinds)
    }

    #[test]
    fn test_get_known_oid() {
        let stats = SnmpStats::new();
        let mut registry = test_registry(vec![(
            oid!(1, 3, 6, 1, 2, 1, 1, 1, 0),
            Value::OctetString(Bytes::from_static(b"Linux test")),
        )]);

        let pdu = request(PduKind::GetRequest, vec![oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]);
        let bytes = encode_response(&pdu, &mut registry, &stats, Duration::ZERO).unwrap();

        let (request_id, status, index, varbinds) = parse_response(bytes);
        assert_eq!(request_id, 99);
        assert_eq!(status, 0);
        assert_eq!(index, 0);
        assert_eq!(
            varbinds,
            vec![VarBind::new(
                oid!(1, 3, 6, 1, 2, 1, 1, 1, 0),
                Value::OctetString(Bytes::from_static(b"Linux test")),
            )]
        );

        assert_eq!(read(&stats.in_total_req_vars), 1);
        assert_eq!(read(&stats.out_get_responses), 1);
    }

    #[test]
    fn test_get_unknown_oid_sets_no_such_name() {
        let stats = SnmpStats::new();
        let mut registry = test_registry(vec![]);

        let pdu = request(PduKind::GetRequest, vec![oid!(1, 3, 6, 1, 9, 9)]);
        let bytes = encode_response(&pdu, &mut registry, &stats, Duration::ZERO).unwrap();

        let (_, status, index, varbinds) = parse_response(bytes);
        assert_eq!(status, ErrorStatus::NoSuchName.as_i32());
        assert_eq!(index, 1);
        assert_eq!(
            varbinds,
            vec![VarBind::null(oid!(1, 3, 6, 1, 9, 9))]
        );
        assert_eq!(read(&stats.out_no_such_names), 1);
    }

    #[test]
    fn test_error_index_lowest_position_wins() {
        let stats = SnmpStats::new();
        let mut registry = test_registry(vec![(oid!(1, 3, 6, 2), Value::Integer(7))]);

        // Positions 1 and 3 miss; position 2 resolves. The reverse-order
        // loop records index 3 first and overwrites it with 1.
        let pdu = request(
            PduKind::GetRequest,
            vec![oid!(1, 3, 6, 1), oid!(1, 3, 6, 2), oid!(1, 3, 6, 3)],
        );
        let bytes = encode_response(&pdu, &mut registry, &stats, Duration::ZERO).unwrap();

        let (_, status, index, varbinds) = parse_response(bytes);
        assert_eq!(status, ErrorStatus::NoSuchName.as_i32());
        assert_eq!(index, 1);
        assert_eq!(varbinds.len(), 3);
        assert_eq!(varbinds[0], VarBind::null(oid!(1, 3, 6, 1)));
        assert_eq!(varbinds[1], VarBind::new(oid!(1, 3, 6, 2), Value::Integer(7)));
        assert_eq!(varbinds[2], VarBind::null(oid!(1, 3, 6, 3)));

        // Every miss counts, not just the recorded one.
        assert_eq!(read(&stats.out_no_such_names), 2);
        assert_eq!(read(&stats.in_total_req_vars), 1);
    }

    #[test]
    fn test_get_next_walks_forward() {
        let stats = SnmpStats::new();
        let mut registry = test_registry(vec![
            (oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::Integer(1)),
            (oid!(1, 3, 6, 1, 2, 1, 1, 3, 0), Value::TimeTicks(12345)),
        ]);

        let pdu = request(
            PduKind::GetNextRequest,
            vec![oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)],
        );
        let bytes = encode_response(&pdu, &mut registry, &stats, Duration::ZERO).unwrap();

        let (_, status, index, varbinds) = parse_response(bytes);
        assert_eq!(status, 0);
        assert_eq!(index, 0);
        assert_eq!(
            varbinds,
            vec![VarBind::new(
                oid!(1, 3, 6, 1, 2, 1, 1, 3, 0),
                Value::TimeTicks(12345),
            )]
        );
    }

    #[test]
    fn test_get_next_past_end_echoes_query_oid() {
        let stats = SnmpStats::new();
        let mut registry = test_registry(vec![(oid!(1, 3, 6), Value::Integer(1))]);

        let pdu = request(PduKind::GetNextRequest, vec![oid!(1, 3, 6)]);
        let bytes = encode_response(&pdu, &mut registry, &stats, Duration::ZERO).unwrap();

        let (_, status, index, varbinds) = parse_response(bytes);
        assert_eq!(status, ErrorStatus::NoSuchName.as_i32());
        assert_eq!(index, 1);
        assert_eq!(varbinds, vec![VarBind::null(oid!(1, 3, 6))]);
    }

    #[test]
    fn test_get_next_zero_varbinds_returns_first_object() {
        let stats = SnmpStats::new();
        let mut registry = test_registry(vec![(oid!(1, 0), Value::Integer(42))]);

        let pdu = request(PduKind::GetNextRequest, vec![]);
        let bytes = encode_response(&pdu, &mut registry, &stats, Duration::ZERO).unwrap();

        let (_, status, index, varbinds) = parse_response(bytes);
        assert_eq!(status, 0);
        assert_eq!(index, 0);
        assert_eq!(varbinds, vec![VarBind::new(oid!(1, 0), Value::Integer(42))]);
    }

    #[test]
    fn test_get_next_zero_varbinds_empty_tree_fails() {
        let stats = SnmpStats::new();
        let mut registry = test_registry(vec![]);

        let pdu = request(PduKind::GetNextRequest, vec![]);
        let result = encode_response(&pdu, &mut registry, &stats, Duration::ZERO);
        assert!(matches!(result, Err(Error::EmptyTree)));
    }

    #[test]
    fn test_response_echoes_community_and_request_id() {
        let stats = SnmpStats::new();
        let mut registry = test_registry(vec![(oid!(1, 1), Value::Integer(1))]);

        let pdu = RequestPdu {
            kind: PduKind::GetRequest,
            request_id: -12345,
            community: Bytes::from_static(b"public"),
            oids: vec![oid!(1, 1)],
        };
        let bytes = encode_response(&pdu, &mut registry, &stats, Duration::ZERO).unwrap();
        let (request_id, _, _, _) = parse_response(bytes);
        assert_eq!(request_id, -12345);
    }
}
