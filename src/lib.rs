//! ENScan library: portable exposure-notification sighting logger.
//!
//! This crate contains the whole scan-cycle event pipeline with no platform
//! dependencies, testable on any host with `cargo test`. The ESP32 firmware
//! (`firmware-std/`) is a thin consumer that provides radio access, the GPS
//! UART, the SD card, the status LED and the restart primitive.
//!
//! Pipeline, leaves first:
//! - `registry`: tracked device addresses with last-seen time and aging.
//! - `filter`: exposure-notification match rule and payload decode.
//! - `gps`: position/time samples and an NMEA receiver that provides them.
//! - `logbook`: hourly NDJSON log files behind a `LogSink` seam.
//! - `indicator`: sighting classification and its LED pulse.
//! - `pipeline`: the scan-cycle controller tying the above together.
//! - `liveness`: stall detection that forces a full restart.
//!
//! Built `no_std` + `alloc` unless the `std` feature is enabled.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod board;
pub mod defaults;
pub mod error;
pub mod filter;
pub mod gps;
pub mod indicator;
pub mod liveness;
pub mod logbook;
pub mod pipeline;
pub mod record;
pub mod registry;
pub mod scanner;
