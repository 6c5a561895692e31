/// BLE scan event model and advertisement parsing.
///
/// The radio side (NimBLE on the firmware, fakes in tests) turns each
/// advertising report into an `Advertisement` with `AdvParser` and pushes it,
/// followed by a `CycleComplete` once the scan window closes, into the
/// pipeline as `ScanEvent`s. Events are consumed one at a time.
use heapless::Vec;

use crate::defaults;
use crate::error::ScanError;

/// Maximum legacy advertising payload.
pub const MAX_ADV_LEN: usize = 31;

/// A parsed BLE advertisement
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    pub addr: [u8; 6],
    /// Signal strength, when the controller reported one
    pub rssi: Option<i8>,
    /// 16-bit service UUIDs extracted from AD structures
    pub service_uuids_16: Vec<u16, 8>,
    /// UUID of the 16-bit service data structure (0 if not present)
    pub service_data_uuid: u16,
    /// Service data payload following the UUID
    pub service_data: Vec<u8, MAX_ADV_LEN>,
}

impl Advertisement {
    /// Whether the advertisement declares the given 16-bit service.
    pub fn has_service(&self, uuid: u16) -> bool {
        self.service_uuids_16.contains(&uuid)
    }
}

/// Event delivered from the scan engine into the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// One advertisement heard during the current window.
    Advertisement(Advertisement),
    /// The window closed. `heard` counts every advertisement seen in it,
    /// matching or not.
    CycleComplete { heard: u32 },
}

/// Scan parameters, fixed at build time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanConfig {
    pub window_ms: u32,
    pub interval_units: u16,
    pub listen_units: u16,
    /// Passive scans never send scan requests.
    pub active: bool,
    pub forget_after_ms: u32,
    pub time_freshness_ms: u32,
}

impl ScanConfig {
    pub const fn new() -> Self {
        Self {
            window_ms: defaults::SCAN_WINDOW_MS,
            interval_units: defaults::SCAN_INTERVAL_UNITS,
            listen_units: defaults::SCAN_LISTEN_UNITS,
            active: false,
            forget_after_ms: defaults::FORGET_AFTER_MS,
            time_freshness_ms: defaults::TIME_FRESHNESS_MS,
        }
    }

    /// Fraction of each interval spent listening.
    pub fn duty_cycle(&self) -> f32 {
        self.listen_units as f32 / self.interval_units as f32
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The radio scan subsystem as seen by the scan-cycle controller.
pub trait ScanEngine {
    /// Arm one scan window of `window_ms`. Completion is reported later as
    /// `ScanEvent::CycleComplete`.
    fn start(&mut self, window_ms: u32) -> Result<(), ScanError>;

    /// Drop whatever results the radio stack buffered for the last window.
    fn clear_results(&mut self);
}

/// Parse BLE advertisement data (AD structures) to extract service UUIDs
/// and 16-bit service data.
///
/// AD structure format: [length] [type] [data...]
/// Types we care about:
///   0x02/0x03 = Incomplete/Complete list of 16-bit service UUIDs
///   0x16      = Service data, 16-bit UUID (first 2 bytes, little-endian)
pub struct AdvParser;

impl AdvParser {
    /// Parse advertisement data bytes into an Advertisement.
    /// `addr` is the 6-byte advertiser address.
    /// `rssi` is the received signal strength, if reported.
    /// `ad_data` is the raw advertisement data bytes.
    pub fn parse(addr: &[u8; 6], rssi: Option<i8>, ad_data: &[u8]) -> Advertisement {
        let mut adv = Advertisement {
            addr: *addr,
            rssi,
            service_uuids_16: Vec::new(),
            service_data_uuid: 0,
            service_data: Vec::new(),
        };

        let mut pos = 0;
        while pos < ad_data.len() {
            let len = ad_data[pos] as usize;
            if len == 0 || pos + 1 + len > ad_data.len() {
                break;
            }

            let ad_type = ad_data[pos + 1];
            let data = &ad_data[pos + 2..pos + 1 + len];

            match ad_type {
                // 16-bit service UUID lists
                0x02 | 0x03 => {
                    for pair in data.chunks_exact(2) {
                        let _ = adv.service_uuids_16.push(u16::from_le_bytes([pair[0], pair[1]]));
                    }
                }
                // Service data with 16-bit UUID; first one wins
                0x16 => {
                    if data.len() >= 2 && adv.service_data_uuid == 0 {
                        adv.service_data_uuid = u16::from_le_bytes([data[0], data[1]]);
                        let _ = adv.service_data.extend_from_slice(&data[2..]);
                    }
                }
                _ => {}
            }

            pos += 1 + len;
        }

        adv
    }
}
