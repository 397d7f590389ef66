use log::error;
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::error::AppError;
use crate::gpio::{GpioLine, PinRegistry};
use crate::sink::LogSink;
use crate::watcher::{Notifications, TriggerEvent, WatchMessage};

/// Single consumer of watcher notifications. Each trigger becomes one block
/// in the sink: the trigger line, then every pin's level in registry order.
pub struct TriggerLogger<L: GpioLine, S: LogSink> {
    registry: PinRegistry<L>,
    sink: S,
}

impl<L: GpioLine, S: LogSink> TriggerLogger<L, S> {
    pub fn new(registry: PinRegistry<L>, sink: S) -> Self {
        Self { registry, sink }
    }

    /// Reads every pin now. A failed read marks that pin and moves on.
    pub fn snapshot(&self, event: &TriggerEvent) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.registry.len() + 1);
        lines.push(format!("Pin triggered: {} ({})", event.name, event.edge));

        for pin in self.registry.pins() {
            let line = match pin.read_level() {
                Ok(level) => format!("\t{}: {}", pin.name(), level),
                Err(e) => format!("\t{}: ERROR ({e})", pin.name()),
            };
            lines.push(line);
        }
        lines
    }

    pub fn log_trigger(&self, event: &TriggerEvent) {
        let block = self.snapshot(event);
        if let Err(e) = self.sink.write_block(&block) {
            error!("failed to write snapshot for {}: {e}", event.name);
        }
    }

    /// Drains `notify` until a watcher reports a fault or every watcher is
    /// gone. Only ever returns the error that ended it.
    pub async fn run(&self, mut notify: Notifications) -> AppError {
        loop {
            match notify.recv().await {
                Some(WatchMessage::Trigger(event)) => blocking(|| self.log_trigger(&event)),
                Some(WatchMessage::Fault { pin, error }) => {
                    error!("watcher for {pin} failed");
                    return error;
                }
                None => return AppError::ChannelClosed,
            }
        }
    }
}

// level reads and the flushed sink write block the worker thread; hand the
// worker's other tasks off when the runtime allows it
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current().map(|h| h.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(f),
        _ => f(),
    }
}
