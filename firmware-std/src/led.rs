//! Status LED driver using the ESP-IDF RMT peripheral.
//!
//! Drives the single SK6812 pixel on the ATOM. Receives classifications via
//! mpsc channel and renders each as a short coloured pulse.

use std::sync::mpsc::{self, SyncSender};
use std::thread;
use std::time::Duration;

use esp_idf_svc::hal::gpio::OutputPin;
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::rmt::config::TransmitConfig;
use esp_idf_svc::hal::rmt::{FixedLengthSignal, PinState, Pulse, RmtChannel, TxRmtDriver};
use esp_idf_svc::sys::EspError;

use enscan::board;
use enscan::defaults::PULSE_MS;
use enscan::indicator::{Classification, Rgb, StatusIndicator};

/// Hands pulses to the LED thread without blocking the pipeline.
/// A pulse requested while one is still queued is skipped.
pub struct ChannelIndicator {
    tx: SyncSender<Classification>,
}

impl ChannelIndicator {
    pub fn new(tx: SyncSender<Classification>) -> Self {
        Self { tx }
    }
}

impl StatusIndicator for ChannelIndicator {
    fn signal(&mut self, class: Classification) {
        let _ = self.tx.try_send(class);
    }
}

struct Pixel<'d> {
    tx: TxRmtDriver<'d>,
    bits: [(Pulse, Pulse); 2],
}

impl<'d> Pixel<'d> {
    fn new<C: RmtChannel>(
        channel: impl Peripheral<P = C> + 'd,
        pin: impl Peripheral<P = impl OutputPin> + 'd,
    ) -> Result<Self, EspError> {
        let config = TransmitConfig::new().clock_divider(1);
        let tx = TxRmtDriver::new(channel, pin, &config)?;

        let hz = tx.counter_clock()?;
        let ns = Duration::from_nanos;
        let zero = (
            Pulse::new_with_duration(hz, PinState::High, &ns(350))?,
            Pulse::new_with_duration(hz, PinState::Low, &ns(800))?,
        );
        let one = (
            Pulse::new_with_duration(hz, PinState::High, &ns(700))?,
            Pulse::new_with_duration(hz, PinState::Low, &ns(600))?,
        );
        Ok(Self {
            tx,
            bits: [zero, one],
        })
    }

    fn show(&mut self, color: Rgb) -> Result<(), EspError> {
        let grb = color.to_grb_u32();
        let mut signal = FixedLengthSignal::<24>::new();
        for i in 0..24 {
            let bit = (grb >> (23 - i)) & 1;
            signal.set(i, &self.bits[bit as usize])?;
        }
        self.tx.start_blocking(&signal)
    }
}

pub fn led_thread<C: RmtChannel>(
    led_rx: mpsc::Receiver<Classification>,
    channel: impl Peripheral<P = C> + 'static,
    pin: impl Peripheral<P = impl OutputPin> + 'static,
) {
    let mut pixel = match Pixel::new(channel, pin) {
        Ok(p) => p,
        Err(e) => {
            log::error!("RMT init failed: {:?}", e);
            return;
        }
    };

    pixel.show(Rgb::OFF).ok();
    log::info!("Status LED ready on GPIO{}", board::LED_PIN);

    while let Ok(class) = led_rx.recv() {
        log::trace!("pulse {}", class.as_str());
        pixel.show(class.color()).ok();
        thread::sleep(Duration::from_millis(PULSE_MS));
        pixel.show(Rgb::OFF).ok();
    }
}
