/// Exposure-notification match rule and payload decode.
///
/// An advertisement qualifies only if it declares the EN service UUID in its
/// 16-bit UUID list. Anything else is dropped here without a trace.
///
/// The service data is decoded positionally: the first 16 bytes are the
/// Rolling Proximity Identifier, the next 4 the Associated Encrypted
/// Metadata. Short payloads are not rejected; the fields come out truncated
/// or empty. `ExposurePayload::is_complete()` tells the two apart.
use core::fmt::Write;

use heapless::String;

use crate::defaults::{AEM_LEN, EN_SERVICE_UUID_16, RPI_LEN};
use crate::scanner::Advertisement;

/// "aa:bb:cc:dd:ee:ff"
pub type MacString = String<17>;

/// Hex-rendered RPI (32 characters when complete)
pub type RpiString = String<{ RPI_LEN * 2 }>;

/// Hex-rendered AEM (8 characters when complete)
pub type AemString = String<{ AEM_LEN * 2 }>;

/// The decoded fields of a qualifying advertisement.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposurePayload {
    pub addr: MacString,
    pub rssi: Option<i8>,
    pub rpi: RpiString,
    pub aem: AemString,
}

impl ExposurePayload {
    /// Whether both fields came out at full width.
    pub fn is_complete(&self) -> bool {
        self.rpi.len() == RPI_LEN * 2 && self.aem.len() == AEM_LEN * 2
    }
}

/// True if the advertisement declares the Exposure Notification service.
pub fn is_exposure_notification(adv: &Advertisement) -> bool {
    adv.has_service(EN_SERVICE_UUID_16)
}

/// Apply the match rule and, on a match, decode the payload.
pub fn filter_advertisement(adv: &Advertisement) -> Option<ExposurePayload> {
    if !is_exposure_notification(adv) {
        return None;
    }

    let mut addr = MacString::new();
    format_mac(&adv.addr, &mut addr);

    let data = adv.service_data.as_slice();
    let mut rpi = RpiString::new();
    hexlify(clamped(data, 0, RPI_LEN), &mut rpi);
    let mut aem = AemString::new();
    hexlify(clamped(data, RPI_LEN, RPI_LEN + AEM_LEN), &mut aem);

    Some(ExposurePayload {
        addr,
        rssi: adv.rssi,
        rpi,
        aem,
    })
}

/// `data[start..end]` with both bounds clamped to the slice length.
fn clamped(data: &[u8], start: usize, end: usize) -> &[u8] {
    let end = end.min(data.len());
    let start = start.min(end);
    &data[start..end]
}

/// Lowercase hex encoding. Bytes that no longer fit are dropped.
pub fn hexlify<const N: usize>(bytes: &[u8], out: &mut String<N>) {
    for b in bytes {
        if write!(out, "{:02x}", b).is_err() {
            break;
        }
    }
}

/// Format a 6-byte MAC address into "aa:bb:cc:dd:ee:ff"
pub fn format_mac(mac: &[u8; 6], buf: &mut MacString) {
    let _ = write!(
        buf,
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
}
