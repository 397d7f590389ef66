use std::fmt;
use std::sync::Arc;

use log::{info, warn};

use crate::config::{EdgeMode, PinConfig, PullMode};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => f.write_str("Low"),
            Level::High => f.write_str("High"),
        }
    }
}

/// Transition reported by the hardware for a single edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Rising,
    Falling,
}

impl EdgeKind {
    pub fn between(old: Level, new: Level) -> Option<Self> {
        match (old, new) {
            (Level::Low, Level::High) => Some(EdgeKind::Rising),
            (Level::High, Level::Low) => Some(EdgeKind::Falling),
            _ => None,
        }
    }

    pub fn matches(&self, mode: EdgeMode) -> bool {
        match mode {
            EdgeMode::None => false,
            EdgeMode::Rising => *self == EdgeKind::Rising,
            EdgeMode::Falling => *self == EdgeKind::Falling,
            EdgeMode::Both => true,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Rising => f.write_str("rising"),
            EdgeKind::Falling => f.write_str("falling"),
        }
    }
}

/// Hardware access: finds lines by identifier.
pub trait GpioBackend: Send + Sync {
    type Line: GpioLine;

    fn lookup_line(&self, identifier: &str) -> Result<Self::Line, AppError>;
}

/// A single input line obtained from a [`GpioBackend`].
///
/// `configure` takes `&mut self` and happens before the line is shared, so the
/// pull and edge settings are fixed for the rest of the line's life. The
/// remaining methods must be callable concurrently: one thread blocked in
/// `wait_for_edge` while another calls `read_level` on the same line.
pub trait GpioLine: Send + Sync + 'static {
    fn configure(&mut self, pull: PullMode, edge: EdgeMode) -> Result<(), AppError>;

    /// Blocks until the configured edge occurs, without timeout. A line
    /// configured with [`EdgeMode::None`] never returns `Ok`.
    fn wait_for_edge(&self) -> Result<EdgeKind, AppError>;

    fn read_level(&self) -> Result<Level, AppError>;
}

pub struct PinHandle<L: GpioLine> {
    config: PinConfig,
    pull: PullMode,
    edge: EdgeMode,
    line: L,
}

impl<L: GpioLine> PinHandle<L> {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn gpio(&self) -> &str {
        &self.config.gpio
    }

    pub fn pull(&self) -> PullMode {
        self.pull
    }

    pub fn edge(&self) -> EdgeMode {
        self.edge
    }

    pub fn wait_for_edge(&self) -> Result<EdgeKind, AppError> {
        self.line.wait_for_edge()
    }

    pub fn read_level(&self) -> Result<Level, AppError> {
        self.line.read_level()
    }
}

impl<L: GpioLine> fmt::Debug for PinHandle<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinHandle")
            .field("name", &self.config.name)
            .field("gpio", &self.config.gpio)
            .field("pull", &self.pull)
            .field("edge", &self.edge)
            .finish()
    }
}

pub type SharedPin<L> = Arc<PinHandle<L>>;

/// Configured pins in configuration order, fixed for the process lifetime.
pub struct PinRegistry<L: GpioLine> {
    pins: Vec<SharedPin<L>>,
}

impl<L: GpioLine> PinRegistry<L> {
    /// Binds one config record to a configured hardware line.
    pub fn resolve<B>(backend: &B, config: &PinConfig) -> Result<PinHandle<L>, AppError>
    where
        B: GpioBackend<Line = L>,
    {
        let pull: PullMode = config.pull.parse()?;
        let edge: EdgeMode = config.edge.parse()?;

        let mut line = backend.lookup_line(&config.gpio)?;
        line.configure(pull, edge)?;

        Ok(PinHandle {
            config: config.clone(),
            pull,
            edge,
            line,
        })
    }

    /// Resolves every record in order, stopping at the first failure. Lines
    /// resolved before the failure are dropped and released.
    pub fn resolve_all<B>(backend: &B, configs: &[PinConfig]) -> Result<Self, AppError>
    where
        B: GpioBackend<Line = L>,
    {
        let mut pins = Vec::with_capacity(configs.len());
        for config in configs {
            let pin = Self::resolve(backend, config)?;
            info!(
                "Resolved pin {:?} on {} (pull {}, edge {})",
                pin.name(),
                pin.gpio(),
                pin.pull(),
                pin.edge()
            );
            if pin.edge() == EdgeMode::None {
                warn!(
                    "Pin {:?} has no edge detection, it is reported in snapshots only",
                    pin.name()
                );
            }
            pins.push(Arc::new(pin));
        }
        Ok(Self { pins })
    }

    pub fn pins(&self) -> &[SharedPin<L>] {
        &self.pins
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}
