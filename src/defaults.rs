//! Compile-time tunables.
//!
//! Nothing here is adjustable at runtime; the device has no command
//! surface. `scanner::ScanConfig::new()` gathers the timing values into
//! one value that the pipeline carries around.

/// 16-bit service UUID assigned to the Exposure Notification service.
pub const EN_SERVICE_UUID_16: u16 = 0xFD6F;

/// Length of the Rolling Proximity Identifier at the front of the service data.
pub const RPI_LEN: usize = 16;

/// Length of the Associated Encrypted Metadata following the RPI.
pub const AEM_LEN: usize = 4;

/// Duration of one scan window. 10 s seems to be a good value.
pub const SCAN_WINDOW_MS: u32 = 10_000;

/// BLE scan interval, in 0.625 ms units.
pub const SCAN_INTERVAL_UNITS: u16 = 100;

/// BLE scan window, in 0.625 ms units. 99/100 keeps the radio listening
/// almost continuously; meant for vehicle or mains power.
pub const SCAN_LISTEN_UNITS: u16 = 99;

/// Forget an address once it has been silent this long.
pub const FORGET_AFTER_MS: u32 = 20 * 60 * 1000;

/// Restart if no sighting has been classified for this long.
pub const LIVENESS_TIMEOUT_MS: u32 = 10_000;

/// Hardware task-watchdog timeout for the control loop.
pub const HW_WATCHDOG_SECS: u64 = 10;

/// A GPS time older than this is not trusted for persistence.
pub const TIME_FRESHNESS_MS: u32 = 1_500;

/// Control loop tick: GPS feeding, clock sync, liveness check.
pub const CONTROL_LOOP_MS: u64 = 100;

/// Length of the status LED pulse.
pub const PULSE_MS: u64 = 10;

/// Log files are created under this mount point.
pub const LOG_ROOT: &str = "/sdcard";

/// Extension of the hourly log files.
pub const LOG_EXTENSION: &str = ".jsonl";
