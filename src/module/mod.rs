//! MIB module plugin boundary and registry.
//!
//! A module contributes one OID subtree to the agent's exposed tree. Each
//! registered module owns a cache [`Odb`](crate::odb::Odb) that the registry
//! refreshes on a pull basis: when a query lands in a stale subtree, the
//! cache is cleared and the module's `update` repopulates it. A module that
//! fails to update serves nothing until its next refresh; other modules are
//! unaffected.

mod registry;
mod snmp;
mod system;

pub use registry::{Placement, Registry};
pub use snmp::SnmpMib;
pub use system::SystemMib;

use crate::error::Result;
use crate::odb::Odb;
use crate::oid::Oid;

/// Outcome of feeding one configuration directive to a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// The module consumed the directive.
    Consumed,
    /// The directive is not one of the module's; its config section is over
    /// and the directive belongs to the surrounding scope.
    EndOfSection,
}

/// A data-source module serving one OID subtree.
pub trait MibModule: Send {
    /// Module name, used by the `module` and `ifdef` config directives.
    fn name(&self) -> &str;

    /// Human-readable description for the sysORTable row.
    fn descr(&self) -> Option<&str> {
        None
    }

    /// The OID subtree this module is authoritative for.
    fn subtree(&self) -> Oid;

    /// Conformance OID advertised in sysORTable. External modules must
    /// declare one; internal modules must not.
    fn conformance(&self) -> Option<Oid> {
        None
    }

    /// Whether this module accepts a configuration section.
    fn has_config(&self) -> bool {
        false
    }

    /// Feed one configuration directive to the module.
    fn parse(&mut self, _tokens: &[&str]) -> Result<ParseOutcome> {
        Ok(ParseOutcome::EndOfSection)
    }

    /// Validate configuration completeness once the whole file is loaded.
    fn finish_parsing(&self) -> Result<()> {
        Ok(())
    }

    /// One-time setup at registration.
    fn open(&mut self) -> Result<()> {
        Ok(())
    }

    /// Repopulate the cache. The registry clears the module's subtree before
    /// calling this (except for the `system` module, whose sysORTable rows
    /// are maintained by the registry, not by `update`). Entries that change
    /// between refreshes must be removed and re-added by the module itself.
    fn update(&mut self, cache: &mut Odb) -> Result<()>;

    /// Teardown at shutdown.
    fn close(&mut self) {}
}
