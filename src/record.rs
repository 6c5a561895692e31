/// Persisted log record and hourly file naming.
///
/// Each record is one JSON object on its own line (NDJSON), serialized with
/// `serde-json-core` into a fixed buffer. Field names follow the log format
/// already on the SD cards in the field:
///
/// ```text
/// {"bdaddr":"..","rssi":-70,"rpi":"<32 hex>","aem":"<8 hex>",
///  "date":"2026-08-01","time":"23:15:01","sats":7,
///  "lat":51.5,"lon":-0.12,"altitude":20.0,"speed":0.0,"hdop":1.1}
/// ```
///
/// A record only exists when a fresh, valid time sample does; the position
/// block is present whenever a fix is known.
use core::fmt::Write;

use heapless::{String, Vec};
use serde::Serialize;

use crate::defaults::LOG_EXTENSION;
use crate::filter::{AemString, ExposurePayload, MacString, RpiString};
use crate::gps::{PositionSample, TimeSample};

/// "YYYY-MM-DD"
pub type DateString = String<10>;

/// "HH:MM:SS"
pub type TimeString = String<8>;

/// "/YYYYMMDDHH.jsonl"
pub type FileName = String<32>;

/// Maximum size of a serialized record, newline included
pub const MAX_RECORD_LEN: usize = 384;

/// Buffer type for serialized records
pub type RecordBuffer = Vec<u8, MAX_RECORD_LEN>;

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One persisted sighting.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord<'a> {
    pub bdaddr: &'a MacString,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i8>,
    pub rpi: &'a RpiString,
    pub aem: &'a AemString,
    pub date: DateString,
    pub time: TimeString,
    pub sats: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdop: Option<f32>,
}

impl<'a> LogRecord<'a> {
    /// Project a decoded payload, the gating time sample and an optional fix.
    pub fn new(
        payload: &'a ExposurePayload,
        time: &TimeSample,
        position: Option<&PositionSample>,
    ) -> Self {
        Self {
            bdaddr: &payload.addr,
            rssi: payload.rssi,
            rpi: &payload.rpi,
            aem: &payload.aem,
            date: format_date(time),
            time: format_time(time),
            sats: time.satellites,
            lat: position.map(|p| p.lat),
            lon: position.map(|p| p.lon),
            altitude: position.map(|p| p.altitude_m),
            speed: position.map(|p| p.speed_kmph),
            hdop: position.map(|p| p.hdop),
        }
    }
}

/// Serialize a record as one NDJSON line (trailing newline included).
/// Returns None if it does not fit.
pub fn serialize_record(record: &LogRecord) -> Option<RecordBuffer> {
    let mut buf = RecordBuffer::new();
    buf.resize_default(MAX_RECORD_LEN).ok()?;
    let len = serde_json_core::to_slice(record, &mut buf).ok()?;
    if len >= MAX_RECORD_LEN {
        return None;
    }
    buf[len] = b'\n';
    buf.truncate(len + 1);
    Some(buf)
}

/// Hourly file for a time sample: "/YYYYMMDDHH.jsonl". None if the sample
/// is not a real calendar date.
pub fn log_file_name(time: &TimeSample) -> Option<FileName> {
    let dt = time.datetime()?;
    let mut name = FileName::new();
    write!(name, "/{}{}", dt.format("%Y%m%d%H"), LOG_EXTENSION).ok()?;
    Some(name)
}

pub fn format_date(time: &TimeSample) -> DateString {
    let mut s = DateString::new();
    if let Some(dt) = time.datetime() {
        let _ = write!(s, "{}", dt.format("%Y-%m-%d"));
    }
    s
}

pub fn format_time(time: &TimeSample) -> TimeString {
    let mut s = TimeString::new();
    if let Some(dt) = time.datetime() {
        let _ = write!(s, "{}", dt.format("%H:%M:%S"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> ExposurePayload {
        ExposurePayload {
            addr: MacString::try_from("4c:11:ae:01:02:03").unwrap(),
            rssi: Some(-70),
            rpi: RpiString::try_from("00112233445566778899aabbccddeeff").unwrap(),
            aem: AemString::try_from("01020304").unwrap(),
        }
    }

    fn time() -> TimeSample {
        TimeSample {
            year: 2026,
            month: 8,
            day: 1,
            hour: 9,
            minute: 5,
            second: 7,
            satellites: 7,
            valid: true,
            age_ms: 120,
        }
    }

    fn fix() -> PositionSample {
        PositionSample {
            lat: 51.5,
            lon: -0.125,
            altitude_m: 20.0,
            speed_kmph: 0.0,
            hdop: 1.5,
            valid: true,
        }
    }

    fn to_str(buf: &RecordBuffer) -> &str {
        core::str::from_utf8(buf).unwrap()
    }

    // ── File naming ─────────────────────────────────────────────────

    #[test]
    fn file_name_is_zero_padded_hour_bucket() {
        assert_eq!(log_file_name(&time()).unwrap().as_str(), "/2026080109.jsonl");
    }

    #[test]
    fn same_hour_same_file() {
        let later = TimeSample { minute: 59, second: 59, ..time() };
        assert_eq!(log_file_name(&time()), log_file_name(&later));
        let next = TimeSample { hour: 10, minute: 0, ..time() };
        assert_ne!(log_file_name(&time()), log_file_name(&next));
    }

    #[test]
    fn impossible_date_has_no_file() {
        let bad = TimeSample { month: 2, day: 31, ..time() };
        assert!(log_file_name(&bad).is_none());
        assert!(format_date(&bad).is_empty());
    }

    #[test]
    fn date_and_time_strings() {
        assert_eq!(format_date(&time()).as_str(), "2026-08-01");
        assert_eq!(format_time(&time()).as_str(), "09:05:07");
    }

    // ── Serialization ───────────────────────────────────────────────

    #[test]
    fn record_without_position() {
        let p = payload();
        let buf = serialize_record(&LogRecord::new(&p, &time(), None)).unwrap();
        let json = to_str(&buf);
        assert!(json.ends_with("}\n"));
        assert_eq!(json.matches('\n').count(), 1);
        assert!(json.contains(r#""bdaddr":"4c:11:ae:01:02:03""#));
        assert!(json.contains(r#""rssi":-70"#));
        assert!(json.contains(r#""rpi":"00112233445566778899aabbccddeeff""#));
        assert!(json.contains(r#""aem":"01020304""#));
        assert!(json.contains(r#""date":"2026-08-01""#));
        assert!(json.contains(r#""time":"09:05:07""#));
        assert!(json.contains(r#""sats":7"#));
        assert!(!json.contains("lat"));
        assert!(!json.contains("hdop"));
    }

    #[test]
    fn record_with_position() {
        let p = payload();
        let f = fix();
        let buf = serialize_record(&LogRecord::new(&p, &time(), Some(&f))).unwrap();
        let json = to_str(&buf);
        assert!(json.contains(r#""lat":51.5"#));
        assert!(json.contains(r#""lon":-0.125"#));
        assert!(json.contains(r#""altitude":20"#));
        assert!(json.contains(r#""speed":0"#));
        assert!(json.contains(r#""hdop":1.5"#));
    }

    #[test]
    fn record_without_rssi_omits_field() {
        let mut p = payload();
        p.rssi = None;
        let buf = serialize_record(&LogRecord::new(&p, &time(), None)).unwrap();
        assert!(!to_str(&buf).contains("rssi"));
    }

    #[test]
    fn record_with_empty_fields_still_serializes() {
        let p = ExposurePayload {
            rpi: RpiString::new(),
            aem: AemString::new(),
            ..payload()
        };
        let buf = serialize_record(&LogRecord::new(&p, &time(), None)).unwrap();
        assert!(to_str(&buf).contains(r#""rpi":"""#));
    }

    // ── Version constant ────────────────────────────────────────────

    #[test]
    fn version_is_semver() {
        let parts: heapless::Vec<&str, 4> = VERSION.split('.').collect();
        assert_eq!(
            parts.len(),
            3,
            "VERSION should be semver (major.minor.patch)"
        );
        for part in &parts {
            assert!(part.parse::<u32>().is_ok(), "'{part}' is not a number");
        }
    }
}
