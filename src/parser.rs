//! Parsers turning broadcast payloads into [`NormalizedQso`] records.
//!
//! Two flavours exist:
//!
//! - [`parse_adif`] for Log4OM and N1MM+, which always send complete records.
//!   Call, band, mode, date and time are all required.
//! - [`parse_wsjtx`] for WSJT-X/JTDX, which may send partial records. Only the
//!   call is required; everything else falls back to a default.

use chrono::{NaiveDate, Utc};
use thiserror::Error;

use crate::profile::WsjtxDefaults;
use crate::qso::NormalizedQso;
use crate::tag::{FieldSource, ScannedFields, TagMap};

/// Mode used by the WSJT-X parser when neither the record nor the profile has one.
pub const FALLBACK_MODE: &str = "FT8";

/// Report used by the WSJT-X parser when neither the record nor the profile has one.
pub const FALLBACK_REPORT: &str = "599";

/// Errors that can occur during parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

fn required<'a>(value: Option<&'a str>, name: &'static str) -> ParseResult<&'a str> {
    value.ok_or(ParseError::MissingField(name))
}

/// Parse a complete ADIF record.
///
/// # Example
///
/// ```
/// use qso_relay::parser::parse_adif;
///
/// let text = "<CALL:5>LU9WT<BAND:3>20m<MODE:3>SSB<QSO_DATE:8>20240101<TIME_ON:4>1200<EOR>";
/// let qso = parse_adif(text).unwrap();
/// assert_eq!(qso.call, "LU9WT");
/// assert_eq!(qso.band, "20m");
/// ```
pub fn parse_adif(text: &str) -> ParseResult<NormalizedQso> {
    let fields = ScannedFields::new(text);

    let call = required(fields.field("CALL"), "call")?;
    let band = required(fields.field("BAND"), "band")?;
    let mode = required(fields.field("MODE"), "mode")?;
    let date = required(fields.first_of(&["QSO_DATE", "QSO_DATE_OFF"]), "date")?;
    let time = required(fields.first_of(&["TIME_ON", "TIME_OFF"]), "time")?;

    Ok(NormalizedQso {
        call: call.to_string(),
        band: band.to_string(),
        mode: mode.to_string(),
        date: date.to_string(),
        time: time.to_string(),
        signal_report: fields
            .first_of(&["RST_SENT", "RST_RCVD"])
            .unwrap_or_default()
            .to_string(),
        comment: fields.field("COMMENT").unwrap_or_default().to_string(),
        station_callsign: fields.field("STATION_CALLSIGN").map(str::to_string),
    })
}

/// Parse a possibly partial WSJT-X/JTDX record, dating it today (UTC) when
/// it carries no `qso_date`.
pub fn parse_wsjtx(text: &str, defaults: &WsjtxDefaults) -> ParseResult<NormalizedQso> {
    parse_wsjtx_on(text, defaults, Utc::now().date_naive())
}

/// [`parse_wsjtx`] with an explicit fallback date.
pub fn parse_wsjtx_on(
    text: &str,
    defaults: &WsjtxDefaults,
    today: NaiveDate,
) -> ParseResult<NormalizedQso> {
    let fields = TagMap::new(text);

    let call = required(fields.field("call"), "call")?;

    let mode = fields
        .field("mode")
        .or(defaults.default_mode)
        .unwrap_or(FALLBACK_MODE);

    let signal_report = fields
        .first_of(&["rst_sent", "rst_rcvd"])
        .or(defaults.default_report)
        .unwrap_or(FALLBACK_REPORT);

    let date = match fields.field("qso_date") {
        Some(date) => date.to_string(),
        None => today.format("%Y%m%d").to_string(),
    };

    Ok(NormalizedQso {
        call: call.to_string(),
        band: fields.field("band").unwrap_or_default().to_string(),
        mode: normalize_mode(mode),
        date,
        time: fields.field("time_on").unwrap_or_default().to_string(),
        signal_report: signal_report.to_string(),
        comment: fields.field("comment").unwrap_or_default().to_string(),
        station_callsign: fields.field("station_callsign").map(str::to_string),
    })
}

/// Upper-case a mode written entirely in lower case. Anything else, mixed
/// case included, is passed through untouched.
fn normalize_mode(mode: &str) -> String {
    if mode == mode.to_lowercase() {
        mode.to_uppercase()
    } else {
        mode.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LOG4OM: &str = "<CALL:5>LU9WT<BAND:3>20m<MODE:3>SSB<QSO_DATE:8>20240101<TIME_ON:4>1200<RST_SENT:3>599<EOR>";

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    #[test]
    fn test_parse_adif_log4om() {
        let qso = parse_adif(LOG4OM).expect("Should parse successfully");
        assert_eq!(qso.call, "LU9WT");
        assert_eq!(qso.band, "20m");
        assert_eq!(qso.mode, "SSB");
        assert_eq!(qso.date, "20240101");
        assert_eq!(qso.time, "1200");
        assert_eq!(qso.signal_report, "599");
        assert_eq!(qso.comment, "");
        assert_eq!(qso.station_callsign, None);
    }

    #[test]
    fn test_parse_adif_fallback_fields() {
        let text = "<call:4>W1AW<band:3>40m<mode:2>CW<qso_date_off:8>20240102\
                    <time_off:6>235959<rst_rcvd:3>579<station_callsign:5>LU9WT\
                    <comment:10>nice sigs <eor>";
        let qso = parse_adif(text).expect("Should parse fallback fields");
        assert_eq!(qso.date, "20240102");
        assert_eq!(qso.time, "235959");
        assert_eq!(qso.signal_report, "579");
        assert_eq!(qso.station_callsign.as_deref(), Some("LU9WT"));
        assert_eq!(qso.comment, "nice sigs");
    }

    #[test]
    fn test_parse_adif_prefers_primary_fields() {
        let text = "<CALL:4>W1AW<BAND:3>40m<MODE:2>CW<QSO_DATE_OFF:8>20240102\
                    <QSO_DATE:8>20240101<TIME_OFF:4>1300<TIME_ON:4>1200\
                    <RST_RCVD:3>579<RST_SENT:3>599";
        let qso = parse_adif(text).unwrap();
        assert_eq!(qso.date, "20240101");
        assert_eq!(qso.time, "1200");
        assert_eq!(qso.signal_report, "599");
    }

    #[test]
    fn test_parse_adif_missing_report_is_empty() {
        let text = "<CALL:4>W1AW<BAND:3>40m<MODE:2>CW<QSO_DATE:8>20240101<TIME_ON:4>1200";
        assert_eq!(parse_adif(text).unwrap().signal_report, "");
    }

    #[test]
    fn test_parse_adif_missing_fields() {
        let cases = [
            ("<BAND:3>20m<MODE:3>SSB<QSO_DATE:8>20240101<TIME_ON:4>1200", "call"),
            ("<CALL:5>LU9WT<MODE:3>SSB<QSO_DATE:8>20240101<TIME_ON:4>1200", "band"),
            ("<CALL:5>LU9WT<BAND:3>20m<QSO_DATE:8>20240101<TIME_ON:4>1200", "mode"),
            ("<CALL:5>LU9WT<BAND:3>20m<MODE:3>SSB<TIME_ON:4>1200", "date"),
            ("<CALL:5>LU9WT<BAND:3>20m<MODE:3>SSB<QSO_DATE:8>20240101", "time"),
        ];

        for (text, field) in cases {
            assert_eq!(
                parse_adif(text),
                Err(ParseError::MissingField(field)),
                "input: {}",
                text
            );
        }
    }

    #[test]
    fn test_parse_adif_blank_call_is_missing() {
        let text = "<CALL:3>   <BAND:3>20m<MODE:3>SSB<QSO_DATE:8>20240101<TIME_ON:4>1200";
        assert_eq!(parse_adif(text), Err(ParseError::MissingField("call")));
    }

    #[test]
    fn test_parse_adif_garbage() {
        assert!(parse_adif("").is_err());
        assert!(parse_adif("hello").is_err());
    }

    #[test]
    fn test_parse_wsjtx_call_only_uses_defaults() {
        let qso = parse_wsjtx_on("<call:4>W1AW<eor>", &WsjtxDefaults::default(), today())
            .expect("Call alone is enough");
        assert_eq!(qso.call, "W1AW");
        assert_eq!(qso.band, "");
        assert_eq!(qso.mode, "FT8");
        assert_eq!(qso.date, "20240309");
        assert_eq!(qso.time, "");
        assert_eq!(qso.signal_report, "+00");
        assert_eq!(qso.comment, "");
    }

    #[test]
    fn test_parse_wsjtx_full_record() {
        let text = "<call:5>JA1XX <gridsquare:4>PM95<mode:3>FT4<rst_sent:3>-10<rst_rcvd:3>-05\
                    <qso_date:8>20240601<time_on:6>101530<band:3>20m<comment:7>tnx qso\
                    <station_callsign:5>LU9WT<eor>";
        let qso = parse_wsjtx_on(text, &WsjtxDefaults::default(), today()).unwrap();
        assert_eq!(qso.call, "JA1XX");
        assert_eq!(qso.band, "20m");
        assert_eq!(qso.mode, "FT4");
        assert_eq!(qso.date, "20240601");
        assert_eq!(qso.time, "101530");
        assert_eq!(qso.signal_report, "-10");
        assert_eq!(qso.comment, "tnx qso");
        assert_eq!(qso.station_callsign.as_deref(), Some("LU9WT"));
    }

    #[test]
    fn test_parse_wsjtx_rst_rcvd_fallback() {
        let qso =
            parse_wsjtx_on("<call:4>W1AW<rst_rcvd:3>-05", &WsjtxDefaults::default(), today())
                .unwrap();
        assert_eq!(qso.signal_report, "-05");
    }

    #[test]
    fn test_parse_wsjtx_uppercase_tags() {
        let qso = parse_wsjtx_on("<CALL:4>W1AW<MODE:4>MSK1", &WsjtxDefaults::default(), today())
            .unwrap();
        assert_eq!(qso.call, "W1AW");
        assert_eq!(qso.mode, "MSK1");
    }

    #[test]
    fn test_parse_wsjtx_without_profile_defaults() {
        let defaults = WsjtxDefaults {
            default_mode: None,
            default_report: None,
            require_grid: false,
        };
        let qso = parse_wsjtx_on("<call:4>W1AW", &defaults, today()).unwrap();
        assert_eq!(qso.mode, FALLBACK_MODE);
        assert_eq!(qso.signal_report, FALLBACK_REPORT);
    }

    #[test]
    fn test_parse_wsjtx_custom_defaults() {
        let defaults = WsjtxDefaults {
            default_mode: Some("ft4"),
            default_report: Some("-15"),
            require_grid: false,
        };
        let qso = parse_wsjtx_on("<call:4>W1AW", &defaults, today()).unwrap();
        assert_eq!(qso.mode, "FT4");
        assert_eq!(qso.signal_report, "-15");
    }

    #[test]
    fn test_parse_wsjtx_missing_call() {
        assert_eq!(
            parse_wsjtx_on("<mode:3>FT8<band:3>20m", &WsjtxDefaults::default(), today()),
            Err(ParseError::MissingField("call"))
        );
        assert_eq!(
            parse_wsjtx_on("<call:0><mode:3>FT8", &WsjtxDefaults::default(), today()),
            Err(ParseError::MissingField("call"))
        );
    }

    #[test]
    fn test_parse_wsjtx_grid_not_enforced() {
        let defaults = WsjtxDefaults::default();
        assert!(defaults.require_grid);
        assert!(parse_wsjtx_on("<call:4>W1AW", &defaults, today()).is_ok());
    }

    #[test]
    fn test_mode_normalization() {
        let defaults = WsjtxDefaults::default();
        let mode = |m: &str| {
            parse_wsjtx_on(&format!("<call:4>W1AW<mode:{}>{}", m.len(), m), &defaults, today())
                .unwrap()
                .mode
        };
        assert_eq!(mode("ft8"), "FT8");
        assert_eq!(mode("Ft8"), "Ft8");
        assert_eq!(mode("FT8"), "FT8");
        assert_eq!(mode("jt65"), "JT65");
    }

    #[test]
    fn test_parse_wsjtx_today_default() {
        let qso = parse_wsjtx("<call:4>W1AW", &WsjtxDefaults::default()).unwrap();
        assert_eq!(qso.date.len(), 8);
        assert!(qso.date.chars().all(|c| c.is_ascii_digit()));
    }

    fn adif_tag(name: &str, value: &str) -> String {
        format!("<{}:{}>{}", name, value.len(), value)
    }

    prop_compose! {
        fn complete_record()(
            call in "[A-Z]{1,2}[0-9][A-Z]{1,3}",
            band in "(160|80|40|20|15|10)m",
            mode in "(SSB|CW|FT8|RTTY)",
            date in "20[0-9]{2}(0[1-9]|1[0-2])(0[1-9]|1[0-9]|2[0-8])",
            time in "[01][0-9][0-5][0-9]",
        ) -> [(&'static str, String); 5] {
            [
                ("CALL", call),
                ("BAND", band),
                ("MODE", mode),
                ("QSO_DATE", date),
                ("TIME_ON", time),
            ]
        }
    }

    proptest! {
        #[test]
        fn prop_complete_adif_parses(fields in complete_record(), lowercase in any::<bool>()) {
            let text: String = fields
                .iter()
                .map(|(name, value)| {
                    let name = if lowercase { name.to_lowercase() } else { name.to_string() };
                    adif_tag(&name, value)
                })
                .chain(std::iter::once("<EOR>".to_string()))
                .collect();

            let qso = parse_adif(&text).unwrap();
            prop_assert_eq!(&qso.call, &fields[0].1);
            prop_assert_eq!(&qso.band, &fields[1].1);
            prop_assert_eq!(&qso.mode, &fields[2].1);
            prop_assert_eq!(&qso.date, &fields[3].1);
            prop_assert_eq!(&qso.time, &fields[4].1);
        }

        #[test]
        fn prop_adif_missing_field_is_incomplete(fields in complete_record(), skip in 0usize..5) {
            let text: String = fields
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, (name, value))| adif_tag(name, value))
                .collect();

            prop_assert!(parse_adif(&text).is_err());
        }

        #[test]
        fn prop_wsjtx_call_only(call in "[A-Z]{1,2}[0-9][A-Z]{1,3}") {
            let text = format!("{}<eor>", adif_tag("call", &call));
            let qso = parse_wsjtx_on(&text, &WsjtxDefaults::default(), today()).unwrap();
            prop_assert_eq!(qso.call, call);
            prop_assert_eq!(qso.mode, "FT8");
            prop_assert_eq!(qso.signal_report, "+00");
        }

        #[test]
        fn prop_lowercase_mode_is_uppercased(mode in "[a-z][a-z0-9]{0,5}") {
            let text = format!("<call:4>W1AW{}", adif_tag("mode", &mode));
            let qso = parse_wsjtx_on(&text, &WsjtxDefaults::default(), today()).unwrap();
            prop_assert_eq!(qso.mode, mode.to_uppercase());
        }

        #[test]
        fn prop_mode_with_uppercase_passes_through(mode in "[a-z]{0,3}[A-Z][a-zA-Z0-9]{0,3}") {
            let text = format!("<call:4>W1AW{}", adif_tag("mode", &mode));
            let qso = parse_wsjtx_on(&text, &WsjtxDefaults::default(), today()).unwrap();
            prop_assert_eq!(qso.mode, mode);
        }
    }
}
