//! QSO Relay - forwards contacts logged in Log4OM, WSJT-X/JTDX or N1MM+ to
//! the LdA logbook.
//!
//! This crate provides:
//! - A nom-based extractor for ADIF-style `<FIELD:len>value` tags
//! - Strict (ADIF) and lenient (WSJT-X) parsers producing normalized records
//! - A rebindable async UDP listener keyed by software profile
//! - An LdA upload client and the orchestrator tying it all together
//!
//! # Example
//!
//! ```rust
//! use qso_relay::profile::Registry;
//!
//! let registry = Registry::builtin();
//! let profile = registry.resolve(2333);
//!
//! let qso = profile.parser.parse("<call:4>W1AW<mode:3>ft8<EOR>").unwrap();
//! assert_eq!(qso.call, "W1AW");
//! assert_eq!(qso.mode, "FT8");
//! assert_eq!(qso.signal_report, "+00");
//! ```

pub mod config;
pub mod listener;
pub mod metrics;
pub mod parser;
pub mod profile;
pub mod qso;
pub mod relay;
pub mod settings;
pub mod stats;
pub mod tag;
pub mod upload;

pub use config::Config;
pub use listener::{ListenError, ListenerEvent, UdpListener};
pub use parser::{ParseError, parse_adif, parse_wsjtx};
pub use profile::{ParserKind, ParserSpec, Registry, SoftwareProfile, WsjtxDefaults};
pub use qso::{Credentials, NormalizedQso, UploadResult};
pub use relay::{Command, MessageNotice, Relay, RelayEvent, SessionContext};
pub use settings::{Settings, SettingsStore};
pub use stats::{RelayStats, StatsSummary};
pub use upload::{LdaClient, Uploader};
