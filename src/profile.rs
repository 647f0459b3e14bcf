//! Registry of supported logging programs.
//!
//! Each profile bundles the UDP port the program broadcasts to and the
//! parser that understands its payload.

use std::fmt;

use thiserror::Error;

use crate::parser::{self, ParseError};
use crate::qso::NormalizedQso;

/// Default port for Log4OM ADIF broadcasts.
pub const LOG4OM_PORT: u16 = 2233;

/// Default port for WSJT-X/JTDX logged-ADIF broadcasts.
pub const WSJTX_PORT: u16 = 2333;

/// Default port for N1MM+ broadcasts.
pub const N1MM_PORT: u16 = 12060;

/// Defaults applied by the lenient WSJT-X parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsjtxDefaults {
    /// Mode used when the record carries none.
    pub default_mode: Option<&'static str>,
    /// Report used when neither RST_SENT nor RST_RCVD is present.
    pub default_report: Option<&'static str>,
    /// Declared for WSJT-X but not enforced by the parser.
    pub require_grid: bool,
}

impl Default for WsjtxDefaults {
    fn default() -> Self {
        Self {
            default_mode: Some("FT8"),
            default_report: Some("+00"),
            require_grid: true,
        }
    }
}

/// Parser selection, carrying the parser-specific defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserSpec {
    /// Strict: all of call/band/mode/date/time must be present.
    Adif,
    /// Lenient: only call is required.
    Wsjtx(WsjtxDefaults),
}

impl ParserSpec {
    pub fn kind(&self) -> ParserKind {
        match self {
            ParserSpec::Adif => ParserKind::Adif,
            ParserSpec::Wsjtx(_) => ParserKind::Wsjtx,
        }
    }

    /// Parse a datagram payload with this parser.
    pub fn parse(&self, text: &str) -> Result<NormalizedQso, ParseError> {
        match self {
            ParserSpec::Adif => parser::parse_adif(text),
            ParserSpec::Wsjtx(defaults) => parser::parse_wsjtx(text, defaults),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserKind {
    Adif,
    Wsjtx,
}

impl fmt::Display for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParserKind::Adif => write!(f, "adif"),
            ParserKind::Wsjtx => write!(f, "wsjtx"),
        }
    }
}

/// One supported logging program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareProfile {
    /// Identifier used by the `software` setting and commands.
    pub id: &'static str,
    pub display_name: &'static str,
    pub listen_port: u16,
    pub parser: ParserSpec,
}

impl fmt::Display for SoftwareProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, port {}, {})",
            self.display_name,
            self.id,
            self.listen_port,
            self.parser.kind()
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown software: {0}")]
    UnknownSoftware(String),

    #[error("Port {port} is already used by {other}")]
    DuplicatePort { port: u16, other: &'static str },
}

/// The set of known profiles. The first profile is the default.
#[derive(Debug, Clone)]
pub struct Registry {
    profiles: Vec<SoftwareProfile>,
}

impl Registry {
    /// Log4OM, WSJT-X/JTDX and N1MM+ on their usual ports.
    pub fn builtin() -> Self {
        Self {
            profiles: vec![
                SoftwareProfile {
                    id: "log4om",
                    display_name: "Log4OM",
                    listen_port: LOG4OM_PORT,
                    parser: ParserSpec::Adif,
                },
                SoftwareProfile {
                    id: "wsjtx",
                    display_name: "WSJT-X/JTDX",
                    listen_port: WSJTX_PORT,
                    parser: ParserSpec::Wsjtx(WsjtxDefaults::default()),
                },
                SoftwareProfile {
                    id: "n1mm",
                    display_name: "N1MM+",
                    listen_port: N1MM_PORT,
                    parser: ParserSpec::Adif,
                },
            ],
        }
    }

    /// Move a profile to a different port.
    pub fn with_port(self, id: &str, port: u16) -> Result<Self, RegistryError> {
        self.with_ports([(id, port)])
    }

    /// Apply several port moves at once.
    ///
    /// Ports are checked for clashes only after every move is applied, so
    /// two profiles may swap ports.
    pub fn with_ports<'a>(
        mut self,
        overrides: impl IntoIterator<Item = (&'a str, u16)>,
    ) -> Result<Self, RegistryError> {
        let mut moved = Vec::new();
        for (id, port) in overrides {
            let profile = self
                .profiles
                .iter_mut()
                .find(|p| p.id.eq_ignore_ascii_case(id))
                .ok_or_else(|| RegistryError::UnknownSoftware(id.to_string()))?;
            profile.listen_port = port;
            moved.push(profile.id);
        }

        for (i, first) in self.profiles.iter().enumerate() {
            if let Some(second) = self.profiles[i + 1..]
                .iter()
                .find(|p| p.listen_port == first.listen_port)
            {
                // Blame the profile that kept its port when only one moved.
                let other = if moved.contains(&first.id) && !moved.contains(&second.id) {
                    second.id
                } else {
                    first.id
                };
                return Err(RegistryError::DuplicatePort {
                    port: first.listen_port,
                    other,
                });
            }
        }
        Ok(self)
    }

    /// Look up a profile by id, ignoring case.
    pub fn get(&self, id: &str) -> Option<&SoftwareProfile> {
        self.profiles.iter().find(|p| p.id.eq_ignore_ascii_case(id))
    }

    /// Like [`Registry::get`], as a `Result`.
    pub fn require(&self, id: &str) -> Result<&SoftwareProfile, RegistryError> {
        self.get(id)
            .ok_or_else(|| RegistryError::UnknownSoftware(id.to_string()))
    }

    pub fn port_for(&self, id: &str) -> Option<u16> {
        self.get(id).map(|p| p.listen_port)
    }

    pub fn by_port(&self, port: u16) -> Option<&SoftwareProfile> {
        self.profiles.iter().find(|p| p.listen_port == port)
    }

    /// Profile for `port`, or the default profile when none matches.
    pub fn resolve(&self, port: u16) -> &SoftwareProfile {
        self.by_port(port).unwrap_or_else(|| self.default_profile())
    }

    pub fn default_profile(&self) -> &SoftwareProfile {
        &self.profiles[0]
    }

    /// `(id, port)` pairs in registry order.
    pub fn ports(&self) -> impl Iterator<Item = (&'static str, u16)> + '_ {
        self.profiles.iter().map(|p| (p.id, p.listen_port))
    }

    pub fn iter(&self) -> impl Iterator<Item = &SoftwareProfile> {
        self.profiles.iter()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
