//! Agent configuration.
//!
//! The configuration file is line oriented: one directive per line, tokens
//! separated by whitespace, `#` starting a comment. Global directives are
//! `user`, `group`, `pidfile`, `listen`, `allow`, `community`, `cache`,
//! `module <name>`, and `ifdef`/`endif`. A `module` directive opens that
//! module's own section, which is closed implicitly by the first directive
//! the module does not consume.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::module::{ParseOutcome, Registry};

/// Default SNMP agent port.
pub const SNMP_PORT: u16 = 161;

/// One `allow` entry: an IPv4 network with its netmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Netmask {
    pub network: Ipv4Addr,
    pub mask: u32,
}

impl Netmask {
    /// Parse `addr` or `addr/prefix`.
    pub fn parse(s: &str) -> Result<Self> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => {
                let prefix: u32 = prefix
                    .parse()
                    .map_err(|_| Error::config(format!("failed to parse {}", s)))?;
                if prefix > 32 {
                    return Err(Error::config(format!("failed to parse {}", s)));
                }
                (addr, prefix)
            }
            None => (s, 32),
        };

        let network: Ipv4Addr = addr
            .parse()
            .map_err(|_| Error::config(format!("failed to parse {}", s)))?;

        let mask = if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix)
        };

        Ok(Self { network, mask })
    }

    /// Whether `addr` falls inside this network.
    pub fn matches(&self, addr: Ipv4Addr) -> bool {
        (u32::from(addr) & self.mask) == (u32::from(self.network) & self.mask)
    }
}

/// Parsed agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unprivileged user to run as (applied by the service manager).
    pub user: Option<String>,
    /// Unprivileged group to run as (applied by the service manager).
    pub group: Option<String>,
    /// Where to write the process ID.
    pub pidfile: Option<PathBuf>,
    /// UDP listen address.
    pub listen: SocketAddr,
    /// Source addresses allowed to query the agent.
    pub allow: Vec<Netmask>,
    /// Community string compared against every request.
    pub community: String,
    /// Module cache lifetime; zero refreshes on every query.
    pub cache: Duration,
}

/// `ifdef` scanner state.
#[derive(PartialEq)]
enum Conditional {
    None,
    Accept,
    Ignore,
}

#[derive(Default)]
struct Builder {
    user: Option<String>,
    group: Option<String>,
    pidfile: Option<PathBuf>,
    listen: Option<SocketAddr>,
    allow: Vec<Netmask>,
    community: Option<String>,
    cache: Option<Duration>,
}

impl Config {
    /// Load a configuration file, routing module sections through the
    /// registry's parser hooks.
    pub fn load(path: &Path, registry: &mut Registry) -> Result<Config> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, registry)
    }

    /// Parse configuration text.
    pub fn parse(text: &str, registry: &mut Registry) -> Result<Config> {
        let mut builder = Builder::default();
        let mut conditional = Conditional::None;
        let mut section: Option<usize> = None;

        for (lineno, line) in text.lines().enumerate() {
            let tokens = tokenize(line)
                .map_err(|e| Error::config(format!("line {}: {}", lineno + 1, e)))?;
            if tokens.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = tokens.iter().map(String::as_str).collect();

            dispatch(
                &mut builder,
                &mut conditional,
                &mut section,
                registry,
                &tokens,
            )
            .map_err(|e| Error::config(format!("line {}: {}", lineno + 1, e)))?;
        }

        if conditional != Conditional::None {
            return Err(Error::config("unexpected end of file. `endif' statement missing"));
        }

        registry.finish_parsing()?;
        builder.finish()
    }
}

/// Split a line into tokens. Double quotes group words, `#` outside quotes
/// starts a comment.
fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut pending = false;
    let mut in_quotes = false;

    for c in line.chars() {
        if in_quotes {
            if c == '"' {
                in_quotes = false;
            } else {
                current.push(c);
            }
        } else {
            match c {
                '"' => {
                    in_quotes = true;
                    pending = true;
                }
                '#' => break,
                c if c.is_whitespace() => {
                    if pending {
                        tokens.push(std::mem::take(&mut current));
                        pending = false;
                    }
                }
                c => {
                    current.push(c);
                    pending = true;
                }
            }
        }
    }

    if in_quotes {
        return Err(Error::config("unterminated quote"));
    }
    if pending {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Route one directive to the open module section or the global scope.
fn dispatch(
    builder: &mut Builder,
    conditional: &mut Conditional,
    section: &mut Option<usize>,
    registry: &mut Registry,
    tokens: &[&str],
) -> Result<()> {
    if let Some(handle) = *section {
        match registry.directive(handle, tokens)? {
            ParseOutcome::Consumed => return Ok(()),
            ParseOutcome::EndOfSection => {
                // The directive belongs to the surrounding scope.
                *section = None;
            }
        }
    }

    // Inside a false `ifdef`, only the conditional directives are live.
    if *conditional == Conditional::Ignore && tokens[0] != "ifdef" && tokens[0] != "endif" {
        return Ok(());
    }

    match tokens[0] {
        "user" => {
            set_once(&mut builder.user, "user", tokens, |v| Ok(v.to_string()))
        }
        "group" => {
            set_once(&mut builder.group, "group", tokens, |v| Ok(v.to_string()))
        }
        "pidfile" => set_once(&mut builder.pidfile, "pidfile", tokens, |v| {
            Ok(PathBuf::from(v))
        }),
        "listen" => set_once(&mut builder.listen, "listen", tokens, parse_listen),
        "allow" => {
            if tokens.len() != 2 {
                return Err(Error::config(
                    "usage: allow { <addr> | <network> [ / <cidr-mask> ] }",
                ));
            }
            builder.allow.push(Netmask::parse(tokens[1])?);
            Ok(())
        }
        "community" => set_once(&mut builder.community, "community", tokens, |v| {
            Ok(v.to_string())
        }),
        "cache" => set_once(&mut builder.cache, "cache", tokens, |v| {
            let seconds: u64 = v
                .parse()
                .map_err(|_| Error::config("usage: cache <timeout-in-seconds>"))?;
            if seconds == 0 {
                return Err(Error::config("usage: cache <timeout-in-seconds>"));
            }
            Ok(Duration::from_secs(seconds))
        }),
        "module" => {
            if tokens.len() != 2 {
                return Err(Error::config("usage: module <module-name>"));
            }
            *section = Some(registry.parser_for(tokens[1])?);
            Ok(())
        }
        "ifdef" => {
            if tokens.len() != 2 {
                return Err(Error::config("usage: ifdef <module-name>"));
            }
            if *conditional != Conditional::None {
                return Err(Error::config("nested ifdef's not allowed"));
            }
            *conditional = if registry.contains(tokens[1]) {
                Conditional::Accept
            } else {
                Conditional::Ignore
            };
            Ok(())
        }
        "endif" => {
            if tokens.len() != 1 {
                return Err(Error::config("usage: endif"));
            }
            if *conditional == Conditional::None {
                return Err(Error::config("endif without ifdef"));
            }
            *conditional = Conditional::None;
            Ok(())
        }
        other => Err(Error::config(format!("unknown statement {}", other))),
    }
}

fn set_once<T>(
    slot: &mut Option<T>,
    name: &str,
    tokens: &[&str],
    parse: impl FnOnce(&str) -> Result<T>,
) -> Result<()> {
    if slot.is_some() {
        return Err(Error::config(format!("`{}' already defined", name)));
    }
    if tokens.len() != 2 {
        return Err(Error::config(format!("usage: {} <value>", name)));
    }
    *slot = Some(parse(tokens[1])?);
    Ok(())
}

/// Parse `addr` or `addr:port`, defaulting to the SNMP port.
fn parse_listen(s: &str) -> Result<SocketAddr> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Ok(ip) = s.parse::<Ipv4Addr>() {
        return Ok(SocketAddr::V4(SocketAddrV4::new(ip, SNMP_PORT)));
    }
    Err(Error::config(format!("failed to parse {}", s)))
}

impl Builder {
    fn finish(self) -> Result<Config> {
        if self.allow.is_empty() {
            return Err(Error::config(
                "unexpected end of file. `allow' statement missing",
            ));
        }
        let community = self.community.ok_or_else(|| {
            Error::config("unexpected end of file. `community' statement missing")
        })?;

        Ok(Config {
            user: self.user,
            group: self.group,
            pidfile: self.pidfile,
            listen: self.listen.unwrap_or_else(|| {
                SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SNMP_PORT))
            }),
            allow: self.allow,
            community,
            cache: self.cache.unwrap_or(Duration::ZERO),
        })
    }
}
