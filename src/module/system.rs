//! The mib-2 system group (1.3.6.1.2.1.1).
//!
//! Static rows (sysDescr, sysObjectID, sysContact, sysName, sysLocation,
//! sysServices) are inserted once and kept across refreshes; sysUpTime is
//! removed and re-added every update. The registry never bulk-clears this
//! module's cache because the sysORTable rows living in it are not
//! reproduced by `update`.

use std::time::Instant;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::module::{MibModule, ParseOutcome};
use crate::odb::Odb;
use crate::oid;
use crate::oid::Oid;
use crate::value::Value;

/// sysServices: physical + datalink + network + transport + application.
const SYS_SERVICES: i32 = 0x01 | 0x02 | 0x04 | 0x08 | 0x40;

/// Fallback sysObjectID when the config does not carry an `objectid`
/// directive.
fn default_object_id() -> Oid {
    oid!(1, 3, 6, 1, 4, 1, 10002, 1)
}

/// The `system` module.
pub struct SystemMib {
    started: Instant,
    contact: Option<String>,
    location: Option<String>,
    object_id: Option<Oid>,
}

impl SystemMib {
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            contact: None,
            location: None,
            object_id: None,
        }
    }

    /// Preset the contact string (otherwise set via the config section).
    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    /// Preset the location string (otherwise set via the config section).
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    fn uptime_ticks(&self) -> u32 {
        (self.started.elapsed().as_millis() / 10) as u32
    }
}

/// Read a `/proc/sys/kernel` entry, trimmed.
fn kernel_info(name: &str) -> std::io::Result<String> {
    let raw = std::fs::read_to_string(format!("/proc/sys/kernel/{}", name))?;
    Ok(raw.trim_end().to_string())
}

/// Kernel identification string for sysDescr.
fn kernel_descr() -> std::io::Result<String> {
    Ok(format!(
        "{} {} {} {}",
        kernel_info("ostype")?,
        kernel_info("osrelease")?,
        kernel_info("version")?,
        std::env::consts::ARCH,
    ))
}

/// Insert a static row unless a previous update already did.
fn ensure(cache: &mut Odb, oid: &Oid, value: impl FnOnce() -> Result<Value>) -> Result<()> {
    if cache.get(oid).is_none() {
        cache.insert(oid, value()?)?;
    }
    Ok(())
}

impl MibModule for SystemMib {
    fn name(&self) -> &str {
        "system"
    }

    fn subtree(&self) -> Oid {
        oid!(1, 3, 6, 1, 2, 1, 1)
    }

    fn has_config(&self) -> bool {
        true
    }

    fn parse(&mut self, tokens: &[&str]) -> Result<ParseOutcome> {
        match tokens.first().copied() {
            Some("contact") => {
                if self.contact.is_some() {
                    return Err(Error::config("`contact' already defined"));
                }
                if tokens.len() != 2 {
                    return Err(Error::config("usage: contact <contact-string>"));
                }
                self.contact = Some(tokens[1].to_string());
                Ok(ParseOutcome::Consumed)
            }
            Some("location") => {
                if self.location.is_some() {
                    return Err(Error::config("`location' already defined"));
                }
                if tokens.len() != 2 {
                    return Err(Error::config("usage: location <location-string>"));
                }
                self.location = Some(tokens[1].to_string());
                Ok(ParseOutcome::Consumed)
            }
            Some("objectid") => {
                if self.object_id.is_some() {
                    return Err(Error::config("`objectid' already defined"));
                }
                if tokens.len() != 2 {
                    return Err(Error::config("usage: objectid <oid>"));
                }
                self.object_id = Some(Oid::parse(tokens[1])?);
                Ok(ParseOutcome::Consumed)
            }
            _ => Ok(ParseOutcome::EndOfSection),
        }
    }

    fn finish_parsing(&self) -> Result<()> {
        let missing = if self.contact.is_none() {
            Some("contact")
        } else if self.location.is_none() {
            Some("location")
        } else {
            None
        };
        match missing {
            Some(directive) => Err(Error::config(format!(
                "module system: `{}' statement missing",
                directive
            ))),
            None => Ok(()),
        }
    }

    fn update(&mut self, cache: &mut Odb) -> Result<()> {
        let base = self.subtree();

        ensure(cache, &base.child(1).child(0), || {
            Ok(Value::OctetString(kernel_descr()?.into_bytes().into()))
        })?;

        ensure(cache, &base.child(2).child(0), || {
            Ok(Value::ObjectIdentifier(
                self.object_id.clone().unwrap_or_else(default_object_id),
            ))
        })?;

        let sys_uptime = base.child(3).child(0);
        cache.remove(&sys_uptime);
        cache.insert(&sys_uptime, Value::TimeTicks(self.uptime_ticks()))?;

        ensure(cache, &base.child(4).child(0), || {
            Ok(Value::OctetString(Bytes::from(
                self.contact.clone().unwrap_or_default().into_bytes(),
            )))
        })?;

        ensure(cache, &base.child(5).child(0), || {
            Ok(Value::OctetString(kernel_info("hostname")?.into_bytes().into()))
        })?;

        ensure(cache, &base.child(6).child(0), || {
            Ok(Value::OctetString(Bytes::from(
                self.location.clone().unwrap_or_default().into_bytes(),
            )))
        })?;

        ensure(cache, &base.child(7).child(0), || {
            Ok(Value::Integer(SYS_SERVICES))
        })?;

        Ok(())
    }
}
