/// Hardware abstraction for supported boards.
///
/// Each board module defines pin assignments and capabilities
/// selected at compile time via feature flags.

/// M5Stack ATOM Lite (ESP32-PICO-D4) in the ATOM GPS kit base.
/// The base carries the GPS module on UART and a micro-SD slot on SPI
/// with no chip-select line.
#[cfg(feature = "board-atom-gps")]
mod hw {
    pub const LED_PIN: u8 = 27; // SK6812 addressable LED
    pub const GPS_RX_PIN: u8 = 22;
    pub const GPS_BAUD: u32 = 9600;
    pub const SD_MISO_PIN: u8 = 33;
    pub const SD_MOSI_PIN: u8 = 19;
    pub const SD_CLK_PIN: u8 = 23;
    pub const SD_SPI_FREQ_KHZ: u32 = 40_000;
    pub const HAS_GPS: bool = true;
    pub const HAS_SD: bool = true;
    pub const BOARD_NAME: &str = "m5_atom_gps";
}

#[cfg(not(feature = "board-atom-gps"))]
mod hw {
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;
