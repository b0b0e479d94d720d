//! Shared helpers for integration tests: build request datagrams the way a
//! manager would, and pull apart GetResponse messages.

// Not every test binary uses every helper.
#![allow(dead_code)]

use bytes::Bytes;

use minisnmpd::ber::{Decoder, EncodeBuf, tag};
use minisnmpd::oid::Oid;
use minisnmpd::varbind::{VarBind, decode_varbind_list};

/// A parsed GetResponse message.
#[derive(Debug)]
pub struct Response {
    pub version: i32,
    pub community: Bytes,
    pub request_id: i32,
    pub error_status: i32,
    pub error_index: i32,
    pub varbinds: Vec<VarBind>,
}

/// Encode a request message with NULL varbind values.
pub fn build_request(pdu_tag: u8, community: &[u8], request_id: i32, oids: &[Oid]) -> Bytes {
    let mut buf = EncodeBuf::new();
    buf.push_sequence(|buf| {
        for oid in oids.iter().rev() {
            buf.push_sequence(|buf| {
                buf.push_null();
                buf.push_oid(oid);
            });
        }
    });
    buf.push_integer(0); // error-index
    buf.push_integer(0); // error-status
    buf.push_integer(request_id);
    buf.wrap_constructed(pdu_tag);
    buf.push_octet_string(community);
    buf.push_integer(0); // version: SNMPv1
    buf.wrap_sequence();
    buf.finish()
}

pub fn build_get_request(community: &[u8], request_id: i32, oids: &[Oid]) -> Bytes {
    build_request(tag::pdu::GET_REQUEST, community, request_id, oids)
}

pub fn build_get_next_request(community: &[u8], request_id: i32, oids: &[Oid]) -> Bytes {
    build_request(tag::pdu::GET_NEXT_REQUEST, community, request_id, oids)
}

/// Decode a GetResponse message, asserting its structure.
pub fn parse_response(data: Bytes) -> Response {
    let mut outer = Decoder::new(data);
    let mut msg = outer.read_sequence().expect("outer sequence");
    assert!(outer.is_empty(), "trailing bytes after message");

    let version = msg.read_integer().expect("version");
    let community = msg.read_octet_string().expect("community");

    let mut pdu = msg
        .read_constructed(tag::pdu::GET_RESPONSE)
        .expect("GetResponse pdu");
    assert!(msg.is_empty(), "trailing bytes after pdu");

    let request_id = pdu.read_integer().expect("request-id");
    let error_status = pdu.read_integer().expect("error-status");
    let error_index = pdu.read_integer().expect("error-index");
    let varbinds = decode_varbind_list(&mut pdu).expect("varbind list");
    assert!(pdu.is_empty(), "trailing bytes after varbinds");

    Response {
        version,
        community,
        request_id,
        error_status,
        error_index,
        varbinds,
    }
}
