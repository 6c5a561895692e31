//! Position and time samples, and the GPS receiver that produces them.
//!
//! The pipeline only sees the `PositionTimeProvider` trait. `GpsReceiver`
//! is the implementation used on the device: it decodes the NMEA 0183
//! stream from the GPS module (GGA and RMC, any talker) byte by byte.
//!
//! Location is "last known": once a fix has been seen it stays valid and
//! keeps its last coordinates, so sightings made indoors still carry an
//! approximate position. Time carries its age instead, and the consumer
//! decides how fresh is fresh enough.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// A position fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub lat: f64,
    pub lon: f64,
    pub altitude_m: f32,
    pub speed_kmph: f32,
    /// Horizontal dilution of precision; lower is better.
    pub hdop: f32,
    pub valid: bool,
}

/// A UTC date and time from the GPS, with the age of the last update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSample {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub satellites: u8,
    pub valid: bool,
    /// Milliseconds since the time was last updated.
    pub age_ms: u32,
}

impl TimeSample {
    /// Valid and updated less than `max_age_ms` ago.
    pub fn is_fresh(&self, max_age_ms: u32) -> bool {
        self.valid && self.age_ms < max_age_ms
    }

    /// The sample as a calendar date and time, if it names a real one.
    pub fn datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year as i32, self.month as u32, self.day as u32)?.and_hms_opt(
            self.hour as u32,
            self.minute as u32,
            self.second as u32,
        )
    }

    /// Seconds since the Unix epoch, UTC.
    pub fn unix_seconds(&self) -> Option<i64> {
        Some(self.datetime()?.and_utc().timestamp())
    }
}

/// Best-effort location and time, queried once each per sighting.
pub trait PositionTimeProvider {
    fn current_position(&self) -> Option<PositionSample>;

    /// `now_ms` is the caller's clock, used to age the sample.
    fn current_time(&self, now_ms: u32) -> Option<TimeSample>;
}

impl<T: PositionTimeProvider + ?Sized> PositionTimeProvider for &T {
    fn current_position(&self) -> Option<PositionSample> {
        (**self).current_position()
    }

    fn current_time(&self, now_ms: u32) -> Option<TimeSample> {
        (**self).current_time(now_ms)
    }
}

// ── Sentence framing ─────────────────────────────────────────────────

/// NMEA allows 82 characters; leave some slack for chatty modules.
pub const MAX_SENTENCE_LEN: usize = 96;

/// Accumulates bytes until a line terminator, then yields the line.
pub struct SentenceReader {
    buf: [u8; MAX_SENTENCE_LEN],
    pos: usize,
}

impl SentenceReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_SENTENCE_LEN],
            pos: 0,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            if self.pos > 0 {
                let line = &self.buf[..self.pos];
                self.pos = 0;
                Some(line)
            } else {
                None
            }
        } else if self.pos < self.buf.len() {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            // Overflow: discard, the tail fails its checksum
            self.pos = 0;
            None
        }
    }
}

impl Default for SentenceReader {
    fn default() -> Self {
        Self::new()
    }
}

// ── Receiver ─────────────────────────────────────────────────────────

/// Decoded GPS state.
#[derive(Debug, Default)]
struct GpsState {
    location: Option<(f64, f64)>,
    altitude_m: f32,
    speed_kmph: f32,
    hdop: f32,
    satellites: u8,
    date: Option<(u16, u8, u8)>,
    time: Option<(u8, u8, u8)>,
    time_updated_ms: u32,
    date_updated: bool,
    sentences: u32,
    checksum_failures: u32,
}

/// NMEA decoder providing position and time.
#[derive(Default)]
pub struct GpsReceiver {
    reader: SentenceReader,
    state: GpsState,
}

impl GpsReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte from the GPS UART, received at `now_ms`.
    pub fn feed(&mut self, byte: u8, now_ms: u32) {
        if let Some(line) = self.reader.feed(byte) {
            self.state.apply_sentence(line, now_ms);
        }
    }

    /// Feed a buffer of bytes received at `now_ms`.
    pub fn feed_all(&mut self, bytes: &[u8], now_ms: u32) {
        for &b in bytes {
            self.feed(b, now_ms);
        }
    }

    /// If a new date/time was committed since the last call, return it.
    pub fn take_date_update(&mut self, now_ms: u32) -> Option<TimeSample> {
        if !self.state.date_updated {
            return None;
        }
        self.state.date_updated = false;
        self.current_time(now_ms).filter(|t| t.valid)
    }

    /// Sentences accepted so far.
    pub fn sentences(&self) -> u32 {
        self.state.sentences
    }

    /// Sentences dropped for a bad or missing checksum.
    pub fn checksum_failures(&self) -> u32 {
        self.state.checksum_failures
    }
}

impl PositionTimeProvider for GpsReceiver {
    fn current_position(&self) -> Option<PositionSample> {
        let (lat, lon) = self.state.location?;
        Some(PositionSample {
            lat,
            lon,
            altitude_m: self.state.altitude_m,
            speed_kmph: self.state.speed_kmph,
            hdop: self.state.hdop,
            valid: true,
        })
    }

    fn current_time(&self, now_ms: u32) -> Option<TimeSample> {
        let (hour, minute, second) = self.state.time?;
        let (year, month, day) = self.state.date.unwrap_or((0, 0, 0));
        Some(TimeSample {
            year,
            month,
            day,
            hour,
            minute,
            second,
            satellites: self.state.satellites,
            valid: self.state.date.is_some(),
            age_ms: age_since(self.state.time_updated_ms, now_ms),
        })
    }
}

/// `now_ms - stamp_ms` on the wrapping clock. A stamp ahead of `now_ms` was
/// taken by another thread after the caller read its clock; its age is 0.
fn age_since(stamp_ms: u32, now_ms: u32) -> u32 {
    let elapsed = now_ms.wrapping_sub(stamp_ms);
    if elapsed > u32::MAX / 2 {
        0
    } else {
        elapsed
    }
}

impl GpsState {
    fn apply_sentence(&mut self, line: &[u8], now_ms: u32) {
        let Some(body) = verify_checksum(line) else {
            self.checksum_failures += 1;
            return;
        };
        let Ok(body) = core::str::from_utf8(body) else {
            return;
        };
        let mut fields: heapless::Vec<&str, 24> = heapless::Vec::new();
        for f in body.split(',') {
            if fields.push(f).is_err() {
                break;
            }
        }
        let kind = fields.first().copied().unwrap_or("");
        if kind.len() < 5 || !kind.is_ascii() {
            return;
        }
        self.sentences += 1;
        match &kind[kind.len() - 3..] {
            "GGA" => self.apply_gga(&fields, now_ms),
            "RMC" => self.apply_rmc(&fields, now_ms),
            _ => {}
        }
    }

    /// $--GGA,time,lat,N,lon,E,quality,sats,hdop,alt,M,...
    fn apply_gga(&mut self, f: &[&str], now_ms: u32) {
        let field = |i: usize| f.get(i).copied().unwrap_or("");
        self.commit_time(field(1), now_ms);
        if let Ok(sats) = field(7).parse::<u8>() {
            self.satellites = sats;
        }
        if let Ok(hdop) = field(8).parse::<f32>() {
            self.hdop = hdop;
        }
        let has_fix = field(6).parse::<u8>().map(|q| q > 0).unwrap_or(false);
        if has_fix {
            if let Some(pos) = parse_position(field(2), field(3), field(4), field(5)) {
                self.location = Some(pos);
            }
            if let Ok(alt) = field(9).parse::<f32>() {
                self.altitude_m = alt;
            }
        }
    }

    /// $--RMC,time,status,lat,N,lon,E,knots,course,ddmmyy,...
    fn apply_rmc(&mut self, f: &[&str], now_ms: u32) {
        let field = |i: usize| f.get(i).copied().unwrap_or("");
        if let Some(date) = parse_date(field(9)) {
            self.date = Some(date);
            self.date_updated = true;
        }
        self.commit_time(field(1), now_ms);
        if field(2) == "A" {
            if let Some(pos) = parse_position(field(3), field(4), field(5), field(6)) {
                self.location = Some(pos);
            }
            if let Ok(knots) = field(7).parse::<f32>() {
                self.speed_kmph = knots * 1.852;
            }
        }
    }

    fn commit_time(&mut self, raw: &str, now_ms: u32) {
        if let Some(time) = parse_time(raw) {
            self.time = Some(time);
            self.time_updated_ms = now_ms;
        }
    }
}

/// Check `$body*hh` and return `body`.
fn verify_checksum(line: &[u8]) -> Option<&[u8]> {
    let line = line.strip_prefix(b"$")?;
    let star = line.iter().position(|&b| b == b'*')?;
    let (body, rest) = line.split_at(star);
    let hex = rest.get(1..3)?;
    let expected = u8::from_str_radix(core::str::from_utf8(hex).ok()?, 16).ok()?;
    let actual = body.iter().fold(0u8, |acc, b| acc ^ b);
    (actual == expected).then_some(body)
}

/// "hhmmss[.ss]"
fn parse_time(raw: &str) -> Option<(u8, u8, u8)> {
    if raw.len() < 6 || !raw.is_ascii() {
        return None;
    }
    let h = raw[0..2].parse::<u8>().ok()?;
    let m = raw[2..4].parse::<u8>().ok()?;
    let s = raw[4..6].parse::<u8>().ok()?;
    NaiveTime::from_hms_opt(h as u32, m as u32, s as u32)?;
    Some((h, m, s))
}

/// "ddmmyy", years 2000 to 2099. Dates that do not exist are rejected.
fn parse_date(raw: &str) -> Option<(u16, u8, u8)> {
    if raw.len() != 6 || !raw.is_ascii() {
        return None;
    }
    let d = raw[0..2].parse::<u8>().ok()?;
    let m = raw[2..4].parse::<u8>().ok()?;
    let y = 2000 + raw[4..6].parse::<u16>().ok()?;
    NaiveDate::from_ymd_opt(y as i32, m as u32, d as u32)?;
    Some((y, m, d))
}

/// "ddmm.mmmm" / "dddmm.mmmm" plus hemisphere into signed degrees.
fn parse_position(lat: &str, ns: &str, lon: &str, ew: &str) -> Option<(f64, f64)> {
    let lat = parse_degrees(lat)?;
    let lon = parse_degrees(lon)?;
    let lat = match ns {
        "N" => lat,
        "S" => -lat,
        _ => return None,
    };
    let lon = match ew {
        "E" => lon,
        "W" => -lon,
        _ => return None,
    };
    Some((lat, lon))
}

fn parse_degrees(raw: &str) -> Option<f64> {
    let value = raw.parse::<f64>().ok()?;
    let degrees = (value / 100.0) as i64 as f64;
    Some(degrees + (value - degrees * 100.0) / 60.0)
}
