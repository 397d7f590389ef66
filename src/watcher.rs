use std::thread::JoinHandle;

use log::{debug, error};
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::gpio::{EdgeKind, GpioLine, PinRegistry, SharedPin};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub name: String,
    pub edge: EdgeKind,
}

#[derive(Debug)]
pub enum WatchMessage {
    Trigger(TriggerEvent),
    Fault { pin: String, error: AppError },
}

pub type Notifier = mpsc::UnboundedSender<WatchMessage>;
pub type Notifications = mpsc::UnboundedReceiver<WatchMessage>;

pub fn channel() -> (Notifier, Notifications) {
    mpsc::unbounded_channel()
}

/// Blocking wait loop for one pin.
///
/// Returns `Ok` once nobody is listening on `notify` any more, and the wait
/// error if the hardware fails.
pub fn run<L: GpioLine>(pin: &SharedPin<L>, notify: &Notifier) -> Result<(), AppError> {
    loop {
        let edge = pin.wait_for_edge()?;
        debug!("{} edge on {}", edge, pin.name());

        let event = TriggerEvent {
            name: pin.name().to_string(),
            edge,
        };
        if notify.send(WatchMessage::Trigger(event)).is_err() {
            return Ok(());
        }
    }
}

pub struct EdgeWatcher {
    pin: String,
    handle: JoinHandle<()>,
}

impl EdgeWatcher {
    /// Starts [`run`] on its own thread. A wait error is forwarded to the
    /// consumer as [`WatchMessage::Fault`].
    pub fn spawn<L: GpioLine>(pin: SharedPin<L>, notify: Notifier) -> Result<Self, AppError> {
        let name = pin.name().to_string();
        let handle = std::thread::Builder::new()
            .name(format!("watch-{}", pin.gpio()))
            .spawn(move || {
                if let Err(e) = run(&pin, &notify) {
                    error!("watcher for {} stopped: {e}", pin.name());
                    let _ = notify.send(WatchMessage::Fault {
                        pin: pin.name().to_string(),
                        error: e,
                    });
                }
            })?;

        Ok(Self { pin: name, handle })
    }

    /// One watcher per registered pin, in registry order.
    pub fn spawn_all<L: GpioLine>(
        registry: &PinRegistry<L>,
        notify: &Notifier,
    ) -> Result<Vec<Self>, AppError> {
        registry
            .pins()
            .iter()
            .map(|pin| Self::spawn(pin.clone(), notify.clone()))
            .collect()
    }

    pub fn pin(&self) -> &str {
        &self.pin
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}
