//! ENScan ESP-IDF std firmware
//!
//! Thread-based implementation using FreeRTOS threads and std::sync::mpsc
//! channels. The BLE scan thread feeds the pipeline thread, which owns the
//! sighting registry and the SD log; the LED thread renders pulses. The main
//! thread runs the control loop: GPS UART, clock sync, hardware watchdog and
//! the liveness check that restarts a wedged scanner.

#[cfg(not(feature = "atom-gps"))]
compile_error!("enscan-std needs a board feature, e.g. `atom-gps`");

mod ble;
mod led;
mod storage;

use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use enscan::{board, defaults, gps, indicator, liveness, logbook, pipeline, record, scanner};

use ble::{NimbleScanEngine, ScanCommand};
use esp_idf_svc::hal::delay::NON_BLOCK;
use esp_idf_svc::hal::gpio::AnyIOPin;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::task::watchdog::{TWDTConfig, TWDTDriver};
use esp_idf_svc::hal::uart::{self, UartRxDriver};
use esp_idf_svc::hal::units::Hertz;
use gps::{GpsReceiver, PositionSample, PositionTimeProvider, TimeSample};
use indicator::Classification;
use led::ChannelIndicator;
use liveness::{Liveness, LivenessMonitor};
use logbook::FsSink;
use pipeline::ScanCycleController;
use record::VERSION;
use scanner::{ScanConfig, ScanEvent};

// ── Shared state ─────────────────────────────────────────────────────

/// Stamped by the pipeline, checked by the control loop. Seeded with boot
/// time, which is zero on the uptime clock.
static LIVENESS: LivenessMonitor = LivenessMonitor::new(defaults::LIVENESS_TIMEOUT_MS, 0);

/// Captured once in main; the uptime clock counts from here.
static BOOT_INSTANT: Mutex<Option<Instant>> = Mutex::new(None);

fn uptime_millis_u32() -> u32 {
    BOOT_INSTANT
        .lock()
        .ok()
        .and_then(|i| i.map(|boot| (boot.elapsed().as_millis() & 0xFFFF_FFFF) as u32))
        .unwrap_or(0)
}

/// Period of the GPS receiver health line.
const GPS_REPORT_MS: u32 = 60_000;

/// GPS decoder shared between the control loop (writer) and the pipeline.
#[derive(Clone)]
struct SharedGps(Arc<Mutex<GpsReceiver>>);

impl PositionTimeProvider for SharedGps {
    fn current_position(&self) -> Option<PositionSample> {
        self.0.lock().ok()?.current_position()
    }

    fn current_time(&self, now_ms: u32) -> Option<TimeSample> {
        self.0.lock().ok()?.current_time(now_ms)
    }
}

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();

    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    *BOOT_INSTANT.lock().unwrap() = Some(Instant::now());

    log::info!("ENScan v{} starting on {} (std)", VERSION, board::BOARD_NAME);
    let config = ScanConfig::new();
    log::info!(
        "Scan: {} ms windows, {:.0}% duty, passive; forget after {} min",
        config.window_ms,
        config.duty_cycle() * 100.0,
        config.forget_after_ms / 60_000,
    );

    // ── Peripherals ──────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;

    // ── Channels ─────────────────────────────────────────────────────

    let (scan_tx, scan_rx) = mpsc::sync_channel::<ScanEvent>(16);
    let (cmd_tx, cmd_rx) = mpsc::sync_channel::<ScanCommand>(2);
    let (led_tx, led_rx) = mpsc::sync_channel::<Classification>(1);

    // ── SD card ──────────────────────────────────────────────────────

    // Held for the lifetime of main so the card stays mounted
    let _card = match storage::mount_sd_card(
        peripherals.spi2,
        peripherals.pins.gpio23,
        peripherals.pins.gpio19,
        peripherals.pins.gpio33,
    ) {
        Ok(card) => Some(card),
        Err(e) => {
            log::error!("SD initialization failed: {:?}", e);
            None
        }
    };

    // ── LED thread ───────────────────────────────────────────────────

    {
        let rmt_channel = peripherals.rmt.channel0;
        let led_pin = peripherals.pins.gpio27;
        thread::Builder::new()
            .name("led".into())
            .stack_size(2048)
            .spawn(move || {
                led::led_thread(led_rx, rmt_channel, led_pin);
            })?;
        log::info!("LED thread spawned");
    }

    // ── Pipeline thread ──────────────────────────────────────────────

    let gps = SharedGps(Arc::new(Mutex::new(GpsReceiver::new())));
    let pipeline_gps = gps.clone();
    thread::Builder::new()
        .name("pipeline".into())
        .stack_size(8192)
        .spawn(move || {
            pipeline_thread(scan_rx, cmd_tx, pipeline_gps, led_tx);
        })?;
    log::info!("Pipeline thread spawned");

    // ── BLE scan thread ──────────────────────────────────────────────

    thread::Builder::new()
        .name("blescan".into())
        .stack_size(6144)
        .spawn(move || {
            ble::ble_scan_thread(cmd_rx, scan_tx);
        })?;
    log::info!("BLE scan thread spawned");

    // ── Control loop (main thread) ───────────────────────────────────

    let gps_config = uart::config::Config::default()
        .baudrate(Hertz(board::GPS_BAUD))
        .rx_fifo_size(1024);
    let gps_uart = UartRxDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio22,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &gps_config,
    )?;
    log::info!("GPS on GPIO{} at {} baud", board::GPS_RX_PIN, board::GPS_BAUD);

    let twdt_config = TWDTConfig {
        duration: Duration::from_secs(defaults::HW_WATCHDOG_SECS),
        panic_on_trigger: true,
        ..Default::default()
    };
    let mut twdt = TWDTDriver::new(peripherals.twdt, &twdt_config)?;
    let mut watchdog = twdt.watch_current_task()?;

    let mut buf = [0u8; 128];
    let mut last_gps_report = 0u32;
    loop {
        let now = uptime_millis_u32();

        while let Ok(n) = gps_uart.read(&mut buf, NON_BLOCK) {
            if n == 0 {
                break;
            }
            let Ok(mut receiver) = gps.0.lock() else {
                break;
            };
            receiver.feed_all(&buf[..n], now);
            if let Some(time) = receiver.take_date_update(now) {
                sync_clock(&time);
            }
        }

        if now.wrapping_sub(last_gps_report) >= GPS_REPORT_MS {
            last_gps_report = now;
            if let Ok(receiver) = gps.0.lock() {
                log::info!(
                    "GPS: {} sentences, {} bad checksums, fix {}",
                    receiver.sentences(),
                    receiver.checksum_failures(),
                    if receiver.current_position().is_some() { "yes" } else { "no" },
                );
            }
        }

        if let Err(e) = watchdog.feed() {
            log::warn!("Watchdog feed failed: {:?}", e);
        }

        // Fresh clock read: the pipeline may have stamped since `now`
        if let Liveness::Stalled { silent_ms } = LIVENESS.check(uptime_millis_u32()) {
            log::error!(
                "Application watchdog triggered: no sighting for {} ms (limit {} ms)",
                silent_ms,
                LIVENESS.timeout_ms(),
            );
            esp_idf_svc::hal::reset::restart();
        }

        thread::sleep(Duration::from_millis(defaults::CONTROL_LOOP_MS));
    }
}

// ── Pipeline thread ──────────────────────────────────────────────────

fn pipeline_thread(
    scan_rx: mpsc::Receiver<ScanEvent>,
    cmd_tx: SyncSender<ScanCommand>,
    gps: SharedGps,
    led_tx: SyncSender<Classification>,
) {
    log::info!("Pipeline thread started");

    let mut controller = ScanCycleController::new(
        ScanConfig::new(),
        NimbleScanEngine::new(cmd_tx),
        gps,
        FsSink::new(defaults::LOG_ROOT),
        ChannelIndicator::new(led_tx),
        &LIVENESS,
    );

    match controller.start() {
        Ok(()) => log::info!("Monitoring started"),
        Err(e) => log::error!("Scan start failed: {}", e),
    }

    while let Ok(event) = scan_rx.recv() {
        controller.handle(event, uptime_millis_u32());
    }

    log::error!("Scan event channel closed");
}

// ── Clock sync ───────────────────────────────────────────────────────

/// Set the system clock from a GPS date/time so file timestamps on the
/// card are right.
fn sync_clock(time: &TimeSample) {
    let Some(secs) = time.unix_seconds() else {
        return;
    };
    let tv = esp_idf_svc::sys::timeval {
        tv_sec: secs as _,
        tv_usec: 0,
    };
    // Safety: valid timeval pointer, null timezone
    let rc = unsafe { esp_idf_svc::sys::settimeofday(&tv, core::ptr::null()) };
    if rc != 0 {
        log::warn!("settimeofday failed: {}", rc);
    }
}
