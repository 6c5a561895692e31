//! Micro-SD card on the ATOM GPS base, mounted as FAT under `LOG_ROOT`.
//!
//! The slot has no chip-select or card-detect line. A missing or unreadable
//! card is not fatal: the mount fails, every append then fails to open its
//! file, and records are dropped while the rest of the device keeps running.

use esp_idf_svc::fs::fatfs::Fatfs;
use esp_idf_svc::hal::gpio::{AnyIOPin, AnyInputPin, AnyOutputPin, InputPin, OutputPin};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::sd::spi::SdSpiHostDriver;
use esp_idf_svc::hal::sd::{SdCardConfiguration, SdCardDriver};
use esp_idf_svc::hal::spi::{config::DriverConfig, Dma, SpiAnyPins, SpiDriver};
use esp_idf_svc::io::vfs::MountedFatfs;

use enscan::board;
use enscan::defaults::LOG_ROOT;

/// Keeps the card mounted for as long as it is alive.
pub type MountedCard = MountedFatfs<Fatfs<SdCardDriver<SdSpiHostDriver<'static, SpiDriver<'static>>>>>;

const MAX_OPEN_FILES: usize = 4;

/// OCR bit set by high-capacity cards.
const SD_OCR_SDHC_CAP: u32 = 1 << 30;

pub fn mount_sd_card<S: SpiAnyPins>(
    spi: impl Peripheral<P = S> + 'static,
    sclk: impl Peripheral<P = impl OutputPin> + 'static,
    mosi: impl Peripheral<P = impl OutputPin> + 'static,
    miso: impl Peripheral<P = impl InputPin> + 'static,
) -> anyhow::Result<MountedCard> {
    let spi_driver = SpiDriver::new(
        spi,
        sclk,
        mosi,
        Some(miso),
        &DriverConfig::default().dma(Dma::Auto(4096)),
    )?;

    let host = SdSpiHostDriver::new(
        spi_driver,
        Option::<AnyOutputPin>::None,
        AnyIOPin::none(),
        AnyIOPin::none(),
        Option::<AnyInputPin>::None,
        #[cfg(not(any(
            esp_idf_version_major = "4",
            all(esp_idf_version_major = "5", esp_idf_version_minor = "0"),
            all(esp_idf_version_major = "5", esp_idf_version_minor = "1"),
        )))]
        None,
    )?;

    let mut config = SdCardConfiguration::new();
    config.speed_khz = board::SD_SPI_FREQ_KHZ;
    let card = SdCardDriver::new_spi(host, &config)?;

    let info = card.card();
    let kind = if info.is_mmc() != 0 {
        "MMC"
    } else if info.ocr & SD_OCR_SDHC_CAP != 0 {
        "SDHC/SDXC"
    } else {
        "SDSC"
    };
    let size_mb = info.csd.capacity as u64 * info.csd.sector_size as u64 / (1024 * 1024);
    log::info!("SD card type {}, {} MB", kind, size_mb);

    let mounted = MountedFatfs::mount(Fatfs::new_sdcard(0, card)?, LOG_ROOT, MAX_OPEN_FILES)?;
    log::info!("SD card mounted at {}", LOG_ROOT);
    Ok(mounted)
}
