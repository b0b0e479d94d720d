//! Module registry: routes OID queries to modules and refreshes their
//! caches.

use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::module::{MibModule, ParseOutcome};
use crate::odb::Odb;
use crate::oid;
use crate::oid::Oid;
use crate::value::Value;

/// sysORTable column arcs (1.3.6.1.2.1.1.9.1.<column>.<index>).
const SYS_OR_INDEX: u32 = 1;
const SYS_OR_ID: u32 = 2;
const SYS_OR_DESCR: u32 = 3;
const SYS_OR_UPTIME: u32 = 4;

/// Whether a module is built into the agent or supplied from outside.
///
/// Internal modules must not declare a conformance OID; external modules
/// must, and get a sysORTable row describing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Internal,
    External,
}

struct Entry {
    module: Box<dyn MibModule>,
    cache: Odb,
    refreshed_at: Option<Instant>,
    parsing: bool,
}

/// Ordered collection of registered modules.
///
/// Entries are kept ascending by subtree OID so lookups stop at the first
/// module whose range can contain the query, and `get_next` scans forward
/// across module boundaries in globally correct order.
pub struct Registry {
    entries: Vec<Entry>,
    started: Instant,
    next_or_index: u32,
    closed: bool,
}

impl Registry {
    /// Create an empty registry. `started` anchors sysUpTime/sysORUpTime.
    pub fn new(started: Instant) -> Self {
        Self {
            entries: Vec::new(),
            started,
            next_or_index: 1,
            closed: false,
        }
    }

    /// Create a registry holding the two built-in modules.
    ///
    /// Registration failure of a built-in is fatal, unlike external
    /// modules. The snmpMIB conformance row is added on their behalf.
    pub fn with_builtins(
        started: Instant,
        system: super::SystemMib,
        stats: std::sync::Arc<crate::stats::SnmpStats>,
    ) -> Result<Registry> {
        let mut registry = Registry::new(started);
        registry.register(Box::new(system), Placement::Internal)?;
        registry.register(Box::new(super::SnmpMib::new(stats)), Placement::Internal)?;
        registry.extend(&oid!(1, 3, 6, 1, 6, 3, 1), "The MIB module for SNMP entities")?;
        Ok(registry)
    }

    /// Register a module.
    ///
    /// Validates the module's declared invariants, runs its `open` callback,
    /// and for external modules adds a sysORTable row describing it. On
    /// success the module is spliced into the list in ascending subtree
    /// order. Failures leave the registry unchanged; the caller decides
    /// whether a rejection is fatal (it is for the built-in modules).
    pub fn register(&mut self, mut module: Box<dyn MibModule>, placement: Placement) -> Result<()> {
        let external = placement == Placement::External;

        if module.name().is_empty() {
            return Err(Error::module("?", "name is empty"));
        }
        if module.subtree().is_empty() {
            return Err(Error::module(module.name(), "exported oid range is empty"));
        }
        if external && module.conformance().is_none() {
            return Err(Error::module(module.name(), "conformance oid range is missing"));
        }
        if !external && module.conformance().is_some() {
            return Err(Error::module(
                module.name(),
                "internal module defines a conformance oid",
            ));
        }

        module.open()?;

        if external {
            if let Some(con) = module.conformance() {
                let descr = module.descr().unwrap_or("").to_string();
                if let Err(e) = self.extend(&con, &descr) {
                    module.close();
                    return Err(e);
                }
            }
        }

        let subtree = module.subtree();
        let pos = self
            .entries
            .iter()
            .position(|e| e.module.subtree() > subtree)
            .unwrap_or(self.entries.len());

        tracing::info!(
            target: "minisnmpd::module",
            module = module.name(),
            subtree = %subtree,
            "registered module"
        );

        self.entries.insert(
            pos,
            Entry {
                module,
                cache: Odb::new(),
                refreshed_at: None,
                parsing: false,
            },
        );

        Ok(())
    }

    /// Add a sysORTable row describing a conformance range.
    ///
    /// Called for every external module at registration, and once for the
    /// agent's own snmpMIB compliance.
    pub fn extend(&mut self, con_oid: &Oid, descr: &str) -> Result<()> {
        let n = self.next_or_index;
        self.next_or_index += 1;

        let uptime = self.uptime_ticks();
        let entry_base = oid!(1, 3, 6, 1, 2, 1, 1, 9, 1);
        let last_change = oid!(1, 3, 6, 1, 2, 1, 1, 8, 0);

        let rows = [
            (SYS_OR_INDEX, Value::Integer(n as i32)),
            (SYS_OR_ID, Value::ObjectIdentifier(con_oid.clone())),
            (
                SYS_OR_DESCR,
                Value::OctetString(bytes::Bytes::copy_from_slice(descr.as_bytes())),
            ),
            (SYS_OR_UPTIME, Value::TimeTicks(uptime)),
        ];

        let system = self
            .entries
            .iter_mut()
            .find(|e| e.module.name() == "system")
            .ok_or_else(|| Error::module("system", "not registered"))?;

        for (column, value) in rows {
            system
                .cache
                .insert(&entry_base.child(column).child(n), value)?;
        }

        system.cache.remove(&last_change);
        system
            .cache
            .insert(&last_change, Value::TimeTicks(uptime))?;

        Ok(())
    }

    /// Exact lookup routed to the first module whose subtree contains `oid`.
    pub fn get(&mut self, oid: &Oid, timeout: Duration) -> Option<Value> {
        let idx = self
            .entries
            .iter()
            .position(|e| oid.starts_with(&e.module.subtree()))?;

        self.refresh(idx, timeout);
        self.entries[idx].cache.get(oid).cloned()
    }

    /// Successor lookup across module boundaries.
    ///
    /// Starts at the first module whose range could contain the successor
    /// (its subtree is a prefix of `oid`, or sorts at or after it) and
    /// concatenates the per-module trie scans.
    pub fn get_next(&mut self, oid: &Oid, timeout: Duration) -> Option<(Oid, Value)> {
        let start = self.entries.iter().position(|e| {
            let subtree = e.module.subtree();
            oid.starts_with(&subtree) || subtree >= *oid
        })?;

        for idx in start..self.entries.len() {
            self.refresh(idx, timeout);
            if let Some(hit) = self.entries[idx].cache.get_next(oid) {
                return Some(hit);
            }
        }

        None
    }

    /// Refresh a module's cache if it is stale.
    ///
    /// Stale or failed caches are cleared so a query never sees partial
    /// data. The system module's cache is exempt from clearing: its sysOR
    /// rows are owned by the registry and would not come back from `update`.
    fn refresh(&mut self, idx: usize, timeout: Duration) {
        let entry = &mut self.entries[idx];
        let stale = match entry.refreshed_at {
            None => true,
            Some(at) => at.elapsed() >= timeout,
        };
        if !stale {
            return;
        }
        entry.refreshed_at = Some(Instant::now());

        let preserve =
            entry.module.conformance().is_none() && entry.module.name() == "system";
        let subtree = entry.module.subtree();

        if !preserve {
            entry.cache.remove(&subtree);
        }

        if let Err(e) = entry.module.update(&mut entry.cache) {
            tracing::warn!(
                target: "minisnmpd::module",
                module = entry.module.name(),
                error = %e,
                "failed to update module"
            );
            if !preserve {
                entry.cache.remove(&subtree);
            }
        }
    }

    /// Open a module's configuration section.
    ///
    /// Each module's section may be opened at most once, and only modules
    /// that declare a parser accept one. Returns a handle for
    /// [`directive`](Self::directive).
    pub fn parser_for(&mut self, name: &str) -> Result<usize> {
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            if entry.module.name() == name {
                if entry.parsing {
                    return Err(Error::config(format!("module {} already defined", name)));
                }
                if !entry.module.has_config() {
                    return Err(Error::config(format!(
                        "module {} does not have any configuration",
                        name
                    )));
                }
                entry.parsing = true;
                return Ok(idx);
            }
        }
        Err(Error::config(format!("no such module: {}", name)))
    }

    /// Route one directive to an opened module section.
    pub fn directive(&mut self, handle: usize, tokens: &[&str]) -> Result<ParseOutcome> {
        self.entries[handle].module.parse(tokens)
    }

    /// Verify every module with a parser is satisfied with its
    /// configuration (required directives present).
    pub fn finish_parsing(&self) -> Result<()> {
        for entry in &self.entries {
            if entry.module.has_config() {
                entry.module.finish_parsing()?;
            }
        }
        Ok(())
    }

    /// Whether a module with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.module.name() == name)
    }

    /// Hundredths of a second since the agent started.
    fn uptime_ticks(&self) -> u32 {
        (self.started.elapsed().as_millis() / 10) as u32
    }

    /// Shut down every module and drop the caches. Idempotent: teardown runs
    /// once no matter how many shutdown paths reach it.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for entry in &mut self.entries {
            entry.module.close();
            entry.cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedModule {
        name: &'static str,
        subtree: Oid,
        rows: Vec<(Oid, Value)>,
        fail: bool,
        updates: Arc<AtomicU32>,
    }

    impl FixedModule {
        fn new(name: &'static str, subtree: Oid, rows: Vec<(Oid, Value)>) -> Self {
            Self {
                name,
                subtree,
                rows,
                fail: false,
                updates: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    impl MibModule for FixedModule {
        fn name(&self) -> &str {
            self.name
        }

        fn subtree(&self) -> Oid {
            self.subtree.clone()
        }

        fn update(&mut self, cache: &mut Odb) -> Result<()> {
            self.updates.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(Error::module(self.name, "update failed"));
            }
            for (oid, value) in &self.rows {
                cache.insert(oid, value.clone())?;
            }
            Ok(())
        }
    }

    fn registry_with(modules: Vec<FixedModule>) -> Registry {
        let mut registry = Registry::new(Instant::now());
        for module in modules {
            registry
                .register(Box::new(module), Placement::Internal)
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_get_routes_to_owning_module() {
        let mut registry = registry_with(vec![
            FixedModule::new(
                "alpha",
                oid!(1, 3, 6, 1, 2, 1, 1),
                vec![(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::Integer(1))],
            ),
            FixedModule::new(
                "beta",
                oid!(1, 3, 6, 1, 2, 1, 11),
                vec![(oid!(1, 3, 6, 1, 2, 1, 11, 1, 0), Value::Integer(2))],
            ),
        ]);

        let timeout = Duration::from_secs(60);
        assert_eq!(
            registry.get(&oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), timeout),
            Some(Value::Integer(1))
        );
        assert_eq!(
            registry.get(&oid!(1, 3, 6, 1, 2, 1, 11, 1, 0), timeout),
            Some(Value::Integer(2))
        );
        assert_eq!(registry.get(&oid!(1, 3, 6, 1, 2, 1, 2, 1, 0), timeout), None);
    }

    #[test]
    fn test_registration_order_is_sorted() {
        // Register out of order; get_next must walk ascending.
        let mut registry = registry_with(vec![
            FixedModule::new(
                "high",
                oid!(1, 3, 6, 1, 2, 1, 11),
                vec![(oid!(1, 3, 6, 1, 2, 1, 11, 1, 0), Value::Integer(2))],
            ),
            FixedModule::new(
                "low",
                oid!(1, 3, 6, 1, 2, 1, 1),
                vec![(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::Integer(1))],
            ),
        ]);

        let timeout = Duration::from_secs(60);
        let (first, _) = registry.get_next(&Oid::empty(), timeout).unwrap();
        assert_eq!(first, oid!(1, 3, 6, 1, 2, 1, 1, 1, 0));

        // Successor crosses the module boundary.
        let (next, value) = registry.get_next(&first, timeout).unwrap();
        assert_eq!(next, oid!(1, 3, 6, 1, 2, 1, 11, 1, 0));
        assert_eq!(value, Value::Integer(2));

        assert!(registry.get_next(&next, timeout).is_none());
    }

    #[test]
    fn test_update_failure_clears_cache_and_isolates() {
        let good = FixedModule::new(
            "good",
            oid!(1, 3, 6, 1, 2, 1, 1),
            vec![(oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), Value::Integer(1))],
        );
        let mut bad = FixedModule::new(
            "bad",
            oid!(1, 3, 6, 1, 2, 1, 11),
            vec![(oid!(1, 3, 6, 1, 2, 1, 11, 1, 0), Value::Integer(2))],
        );
        bad.fail = true;

        let mut registry = registry_with(vec![good, bad]);
        let timeout = Duration::from_secs(60);

        // The failing module serves nothing.
        assert_eq!(registry.get(&oid!(1, 3, 6, 1, 2, 1, 11, 1, 0), timeout), None);
        // The sibling module still resolves.
        assert_eq!(
            registry.get(&oid!(1, 3, 6, 1, 2, 1, 1, 1, 0), timeout),
            Some(Value::Integer(1))
        );
    }

    #[test]
    fn test_cache_timeout_throttles_updates() {
        let module = FixedModule::new(
            "counted",
            oid!(1, 3),
            vec![(oid!(1, 3, 1), Value::Integer(1))],
        );
        let updates = module.updates.clone();
        let mut registry = registry_with(vec![module]);

        let timeout = Duration::from_secs(3600);
        registry.get(&oid!(1, 3, 1), timeout);
        registry.get(&oid!(1, 3, 1), timeout);
        registry.get_next(&oid!(1, 3), timeout);

        // Only the first query triggered an update within the window.
        assert_eq!(updates.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_zero_timeout_refreshes_every_query() {
        let module = FixedModule::new(
            "eager",
            oid!(1, 3),
            vec![(oid!(1, 3, 1), Value::Integer(1))],
        );
        let mut registry = registry_with(vec![module]);

        assert_eq!(
            registry.get(&oid!(1, 3, 1), Duration::ZERO),
            Some(Value::Integer(1))
        );
        // Second query forces a clear + repopulate; result is unchanged.
        assert_eq!(
            registry.get(&oid!(1, 3, 1), Duration::ZERO),
            Some(Value::Integer(1))
        );
    }

    #[test]
    fn test_internal_module_with_conformance_rejected() {
        struct Bad;
        impl MibModule for Bad {
            fn name(&self) -> &str {
                "bad"
            }
            fn subtree(&self) -> Oid {
                oid!(1, 3)
            }
            fn conformance(&self) -> Option<Oid> {
                Some(oid!(1, 3, 9))
            }
            fn update(&mut self, _cache: &mut Odb) -> Result<()> {
                Ok(())
            }
        }

        let mut registry = Registry::new(Instant::now());
        assert!(registry.register(Box::new(Bad), Placement::Internal).is_err());
        assert!(!registry.contains("bad"));
    }

    #[test]
    fn test_external_module_needs_conformance() {
        let module = FixedModule::new("ext", oid!(1, 3, 9), vec![]);
        let mut registry = Registry::new(Instant::now());
        assert!(
            registry
                .register(Box::new(module), Placement::External)
                .is_err()
        );
    }

    #[test]
    fn test_external_module_lands_in_sys_or_table() {
        struct Ext;
        impl MibModule for Ext {
            fn name(&self) -> &str {
                "ext"
            }
            fn descr(&self) -> Option<&str> {
                Some("An external module")
            }
            fn subtree(&self) -> Oid {
                oid!(1, 3, 6, 1, 4, 1, 10002)
            }
            fn conformance(&self) -> Option<Oid> {
                Some(oid!(1, 3, 6, 1, 4, 1, 10002, 99))
            }
            fn update(&mut self, _cache: &mut Odb) -> Result<()> {
                Ok(())
            }
        }

        let mut registry = Registry::new(Instant::now());
        let system = FixedModule::new("system", oid!(1, 3, 6, 1, 2, 1, 1), vec![]);
        registry
            .register(Box::new(system), Placement::Internal)
            .unwrap();
        registry
            .register(Box::new(Ext), Placement::External)
            .unwrap();

        let timeout = Duration::from_secs(60);
        assert_eq!(
            registry.get(&oid!(1, 3, 6, 1, 2, 1, 1, 9, 1, 1, 1), timeout),
            Some(Value::Integer(1))
        );
        assert_eq!(
            registry.get(&oid!(1, 3, 6, 1, 2, 1, 1, 9, 1, 2, 1), timeout),
            Some(Value::ObjectIdentifier(oid!(1, 3, 6, 1, 4, 1, 10002, 99)))
        );
        assert_eq!(
            registry.get(&oid!(1, 3, 6, 1, 2, 1, 1, 9, 1, 3, 1), timeout),
            Some(Value::OctetString(bytes::Bytes::from_static(
                b"An external module"
            )))
        );
        // sysORLastChange is present.
        assert!(
            registry
                .get(&oid!(1, 3, 6, 1, 2, 1, 1, 8, 0), timeout)
                .is_some()
        );
    }

    #[test]
    fn test_parser_section_opened_once() {
        struct Configurable;
        impl MibModule for Configurable {
            fn name(&self) -> &str {
                "conf"
            }
            fn subtree(&self) -> Oid {
                oid!(1, 3)
            }
            fn has_config(&self) -> bool {
                true
            }
            fn parse(&mut self, _tokens: &[&str]) -> Result<ParseOutcome> {
                Ok(ParseOutcome::Consumed)
            }
            fn update(&mut self, _cache: &mut Odb) -> Result<()> {
                Ok(())
            }
        }

        let mut registry = Registry::new(Instant::now());
        registry
            .register(Box::new(Configurable), Placement::Internal)
            .unwrap();

        assert!(registry.parser_for("conf").is_ok());
        assert!(registry.parser_for("conf").is_err()); // opened twice
        assert!(registry.parser_for("missing").is_err());
    }

    #[test]
    fn test_module_without_parser_rejects_section() {
        let module = FixedModule::new("plain", oid!(1, 3), vec![]);
        let mut registry = registry_with(vec![module]);
        assert!(registry.parser_for("plain").is_err());
    }

    #[test]
    fn test_close_is_idempotent() {
        let module = FixedModule::new(
            "m",
            oid!(1, 3),
            vec![(oid!(1, 3, 1), Value::Integer(1))],
        );
        let mut registry = registry_with(vec![module]);
        registry.get(&oid!(1, 3, 1), Duration::ZERO);

        registry.close();
        registry.close();
        assert!(registry.entries[0].cache.is_empty());
    }
}
