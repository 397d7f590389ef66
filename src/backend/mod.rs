#[cfg(feature = "hardware-gpio")]
mod libgpiod;
mod mock;

#[cfg(feature = "hardware-gpio")]
pub use libgpiod::{LibgpiodBackend, LibgpiodLine};
pub use mock::{MockGpioBackend, MockLine};

use crate::config::AppConfig;
use crate::error::AppError;

#[cfg(feature = "hardware-gpio")]
pub type SelectedBackend = LibgpiodBackend;
#[cfg(not(feature = "hardware-gpio"))]
pub type SelectedBackend = MockGpioBackend;

/// Backend the binary monitors, chosen at build time: libgpiod with
/// `hardware-gpio`, the in-memory mock only with `mock-gpio` on its own.
#[cfg(feature = "hardware-gpio")]
pub fn open_backend(_config: &AppConfig) -> Result<SelectedBackend, AppError> {
    log::info!("Using libgpiod backend");
    LibgpiodBackend::new()
}

#[cfg(all(not(feature = "hardware-gpio"), feature = "mock-gpio"))]
pub fn open_backend(config: &AppConfig) -> Result<SelectedBackend, AppError> {
    log::warn!("Using mock backend, no hardware edges will be observed");
    let ids: Vec<&str> = config.pins.iter().map(|p| p.gpio.as_str()).collect();
    Ok(MockGpioBackend::with_lines(&ids))
}

#[cfg(not(any(feature = "hardware-gpio", feature = "mock-gpio")))]
pub fn open_backend(_config: &AppConfig) -> Result<SelectedBackend, AppError> {
    Err(AppError::Config(
        "built without a GPIO backend, enable the hardware-gpio or mock-gpio feature".into(),
    ))
}
