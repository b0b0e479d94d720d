//! SNMP group statistics counters (RFC 1213).
//!
//! One relaxed `AtomicU32` per counter so the handle can be shared between
//! the request path and the `snmp` MIB module. The agent is single-stream
//! (one datagram at a time), so the atomics carry no ordering requirements;
//! relaxed increments are exact.

use std::sync::atomic::{AtomicU32, Ordering};

/// Counters of the mib-2 snmp group.
#[derive(Debug, Default)]
pub struct SnmpStats {
    pub in_pkts: AtomicU32,
    pub out_pkts: AtomicU32,
    pub in_bad_versions: AtomicU32,
    pub in_bad_community_names: AtomicU32,
    pub in_bad_community_uses: AtomicU32,
    pub in_asn_parse_errs: AtomicU32,
    pub in_too_bigs: AtomicU32,
    pub in_no_such_names: AtomicU32,
    pub in_bad_values: AtomicU32,
    pub in_read_onlys: AtomicU32,
    pub in_gen_errs: AtomicU32,
    pub in_total_req_vars: AtomicU32,
    pub in_total_set_vars: AtomicU32,
    pub in_get_requests: AtomicU32,
    pub in_get_nexts: AtomicU32,
    pub in_set_requests: AtomicU32,
    pub in_get_responses: AtomicU32,
    pub in_traps: AtomicU32,
    pub out_too_bigs: AtomicU32,
    pub out_no_such_names: AtomicU32,
    pub out_bad_values: AtomicU32,
    pub out_gen_errs: AtomicU32,
    pub out_get_requests: AtomicU32,
    pub out_get_nexts: AtomicU32,
    pub out_set_requests: AtomicU32,
    pub out_get_responses: AtomicU32,
    pub out_traps: AtomicU32,
    pub silent_drops: AtomicU32,
    pub proxy_drops: AtomicU32,
}

impl SnmpStats {
    /// Create a zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Bump a counter by one.
#[inline]
pub fn bump(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Read a counter.
#[inline]
pub fn read(counter: &AtomicU32) -> u32 {
    counter.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_and_read() {
        let stats = SnmpStats::new();
        assert_eq!(read(&stats.in_pkts), 0);
        bump(&stats.in_pkts);
        bump(&stats.in_pkts);
        assert_eq!(read(&stats.in_pkts), 2);
        assert_eq!(read(&stats.out_pkts), 0);
    }
}
