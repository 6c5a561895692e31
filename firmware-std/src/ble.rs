//! NimBLE scan engine.
//!
//! The radio lives on its own thread. The pipeline arms windows through
//! `NimbleScanEngine`, which only queues commands; the scan thread runs each
//! window to completion, pushing one `ScanEvent::Advertisement` per report
//! and a `ScanEvent::CycleComplete` when the window closes.

use std::sync::mpsc::{self, SyncSender, TrySendError};

use esp32_nimble::{BLEDevice, BLEScan};
use esp_idf_svc::hal::task::block_on;

use enscan::error::ScanError;
use enscan::scanner::{AdvParser, ScanConfig, ScanEngine, ScanEvent};

pub enum ScanCommand {
    Start { window_ms: u32 },
    ClearResults,
}

pub struct NimbleScanEngine {
    cmd_tx: SyncSender<ScanCommand>,
}

impl NimbleScanEngine {
    pub fn new(cmd_tx: SyncSender<ScanCommand>) -> Self {
        Self { cmd_tx }
    }
}

impl ScanEngine for NimbleScanEngine {
    fn start(&mut self, window_ms: u32) -> Result<(), ScanError> {
        self.cmd_tx
            .try_send(ScanCommand::Start { window_ms })
            .map_err(|e| match e {
                TrySendError::Full(_) => ScanError::Start("command queue full".into()),
                TrySendError::Disconnected(_) => ScanError::Disconnected,
            })
    }

    fn clear_results(&mut self) {
        let _ = self.cmd_tx.try_send(ScanCommand::ClearResults);
    }
}

pub fn ble_scan_thread(cmd_rx: mpsc::Receiver<ScanCommand>, scan_tx: SyncSender<ScanEvent>) {
    log::info!("BLE scan thread started");

    let config = ScanConfig::new();
    let ble_device = BLEDevice::take();
    let mut scan = BLEScan::new();
    scan.active_scan(config.active)
        .interval(config.interval_units)
        .window(config.listen_units);

    // Reports the pipeline had no room for
    let mut overflow = 0u32;

    while let Ok(cmd) = cmd_rx.recv() {
        let window_ms = match cmd {
            ScanCommand::Start { window_ms } => window_ms,
            ScanCommand::ClearResults => {
                if overflow > 0 {
                    log::warn!("Pipeline busy, {} advertisements discarded", overflow);
                }
                overflow = 0;
                continue;
            }
        };

        let mut heard = 0u32;
        let result = block_on(scan.start(ble_device, window_ms as i32, |device, data| {
            heard += 1;
            let addr_bytes = device.addr().as_be_bytes();
            let adv = AdvParser::parse(&addr_bytes, Some(device.rssi()), data.payload());
            if scan_tx.try_send(ScanEvent::Advertisement(adv)).is_err() {
                overflow += 1;
            }
            None::<()> // Continue scanning
        }));

        match result {
            Ok(_) => {
                if scan_tx.send(ScanEvent::CycleComplete { heard }).is_err() {
                    break;
                }
            }
            // No completion event: the pipeline stays idle until the
            // liveness monitor restarts the device.
            Err(e) => log::error!("BLE scan failed: {:?}", e),
        }
    }

    log::error!("BLE scan thread exiting");
}
