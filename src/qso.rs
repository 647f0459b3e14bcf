//! Data structures shared by the parsers, the upload client and the relay.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A contact record in the shape the LdA upload expects.
///
/// Only produced by the parsers in [`crate::parser`]; a parser either yields a
/// complete record or an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedQso {
    /// Worked station callsign
    pub call: String,
    pub band: String,
    pub mode: String,
    /// `YYYYMMDD`
    pub date: String,
    /// `HHMM` or `HHMMSS`, UTC
    pub time: String,
    pub signal_report: String,
    pub comment: String,
    /// Callsign the contact was made with, when the sender reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station_callsign: Option<String>,
}

impl fmt::Display for NormalizedQso {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<10} {:>5} {:<6} {} {:<6} RST {}",
            self.call, self.band, self.mode, self.date, self.time, self.signal_report
        )?;
        if let Some(ref station) = self.station_callsign {
            write!(f, " via {}", station)?;
        }
        if !self.comment.is_empty() {
            write!(f, " \"{}\"", self.comment)?;
        }
        Ok(())
    }
}

/// LdA account credentials, loaded fresh for every upload attempt.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub main_callsign: String,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        main_callsign: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            main_callsign: main_callsign.into(),
        }
    }

    /// Names of the settings that are blank. Empty when the credentials are usable.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        if self.main_callsign.trim().is_empty() {
            missing.push("main callsign");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("main_callsign", &self.main_callsign)
            .finish()
    }
}

/// Outcome of one upload attempt. Never retried.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    pub success: bool,
    /// Short human-readable summary.
    pub message: String,
    /// Diagnostic payload, passed through verbatim from the remote service
    /// when it provided one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<NormalizedQso>,
}

impl UploadResult {
    pub fn succeeded(message: impl Into<String>, qso: NormalizedQso) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            data: Some(qso),
        }
    }

    pub fn failed(message: impl Into<String>, error: Option<serde_json::Value>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error,
            data: None,
        }
    }

    /// Attach the record the attempt was about.
    pub fn with_data(mut self, qso: NormalizedQso) -> Self {
        self.data = Some(qso);
        self
    }

    /// Failure for credentials that fail [`Credentials::missing_fields`].
    pub fn missing_configuration(missing: &[&str]) -> Self {
        Self::failed(
            format!("Missing configuration: {}", missing.join(", ")),
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NormalizedQso {
        NormalizedQso {
            call: "LU9WT".to_string(),
            band: "20m".to_string(),
            mode: "SSB".to_string(),
            date: "20240101".to_string(),
            time: "1200".to_string(),
            signal_report: "599".to_string(),
            comment: String::new(),
            station_callsign: None,
        }
    }

    #[test]
    fn test_missing_fields() {
        assert!(Credentials::new("user", "pw", "LU9WT").is_complete());
        assert_eq!(
            Credentials::new("", "pw", "LU9WT").missing_fields(),
            vec!["username"]
        );
        assert_eq!(
            Credentials::default().missing_fields(),
            vec!["username", "password", "main callsign"]
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = Credentials::new("user", "hunter2", "LU9WT");
        let out = format!("{:?}", creds);
        assert!(out.contains("user"));
        assert!(!out.contains("hunter2"));
    }

    #[test]
    fn test_qso_serializes_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["call"], "LU9WT");
        assert_eq!(json["signalReport"], "599");
        assert!(json.get("stationCallsign").is_none());
    }

    #[test]
    fn test_display() {
        let mut qso = sample();
        qso.station_callsign = Some("LU9WT/P".to_string());
        let line = qso.to_string();
        assert!(line.starts_with("LU9WT"));
        assert!(line.contains("RST 599"));
        assert!(line.ends_with("via LU9WT/P"));
    }

    #[test]
    fn test_missing_configuration_message() {
        let result = UploadResult::missing_configuration(&["username", "password"]);
        assert!(!result.success);
        assert_eq!(result.message, "Missing configuration: username, password");
    }
}
