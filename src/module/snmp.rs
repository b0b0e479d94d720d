//! The mib-2 snmp group (1.3.6.1.2.1.11).
//!
//! Serves a snapshot of the agent's statistics counters. Column numbers
//! follow RFC 1213; columns 7 and 23 are not assigned there and are absent
//! here too.

use std::sync::Arc;
use std::sync::atomic::AtomicU32;

use crate::error::Result;
use crate::module::MibModule;
use crate::odb::Odb;
use crate::oid;
use crate::oid::Oid;
use crate::stats::{SnmpStats, read};
use crate::value::Value;

const SNMP_ENABLE_AUTHEN_TRAPS: u32 = 30;

/// snmpEnableAuthenTraps: disabled(2). This agent never originates traps.
const AUTHEN_TRAPS_DISABLED: i32 = 2;

/// The `snmp` module.
pub struct SnmpMib {
    stats: Arc<SnmpStats>,
}

impl SnmpMib {
    pub fn new(stats: Arc<SnmpStats>) -> Self {
        Self { stats }
    }

    fn columns(&self) -> [(u32, &AtomicU32); 29] {
        let s = &self.stats;
        [
            (1, &s.in_pkts),
            (2, &s.out_pkts),
            (3, &s.in_bad_versions),
            (4, &s.in_bad_community_names),
            (5, &s.in_bad_community_uses),
            (6, &s.in_asn_parse_errs),
            (8, &s.in_too_bigs),
            (9, &s.in_no_such_names),
            (10, &s.in_bad_values),
            (11, &s.in_read_onlys),
            (12, &s.in_gen_errs),
            (13, &s.in_total_req_vars),
            (14, &s.in_total_set_vars),
            (15, &s.in_get_requests),
            (16, &s.in_get_nexts),
            (17, &s.in_set_requests),
            (18, &s.in_get_responses),
            (19, &s.in_traps),
            (20, &s.out_too_bigs),
            (21, &s.out_no_such_names),
            (22, &s.out_bad_values),
            (24, &s.out_gen_errs),
            (25, &s.out_get_requests),
            (26, &s.out_get_nexts),
            (27, &s.out_set_requests),
            (28, &s.out_get_responses),
            (29, &s.out_traps),
            (31, &s.silent_drops),
            (32, &s.proxy_drops),
        ]
    }
}

impl MibModule for SnmpMib {
    fn name(&self) -> &str {
        "snmp"
    }

    fn subtree(&self) -> Oid {
        oid!(1, 3, 6, 1, 2, 1, 11)
    }

    fn update(&mut self, cache: &mut Odb) -> Result<()> {
        let base = self.subtree();

        for (column, counter) in self.columns() {
            cache.insert(&base.child(column).child(0), Value::Counter32(read(counter)))?;
        }

        cache.insert(
            &base.child(SNMP_ENABLE_AUTHEN_TRAPS).child(0),
            Value::Integer(AUTHEN_TRAPS_DISABLED),
        )?;

        Ok(())
    }
}
