mod backend;
mod config;
mod error;
mod gpio;
mod monitor;
mod sink;
mod watcher;

pub use backend::{MockGpioBackend, MockLine, SelectedBackend, open_backend};
pub use config::{AppConfig, EdgeMode, PinConfig, PullMode};
pub use error::AppError;
pub use gpio::{EdgeKind, GpioBackend, GpioLine, Level, PinHandle, PinRegistry, SharedPin};
pub use monitor::TriggerLogger;
pub use sink::{DualSink, LogSink, MemorySink, init_logging};
pub use watcher::{
    EdgeWatcher, Notifications, Notifier, TriggerEvent, WatchMessage, channel,
};

#[cfg(feature = "hardware-gpio")]
pub use backend::{LibgpiodBackend, LibgpiodLine};
