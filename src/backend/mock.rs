use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::config::{EdgeMode, PullMode};
use crate::error::AppError;
use crate::gpio::{EdgeKind, GpioBackend, GpioLine, Level};

/// In-memory lines driven by the test (or a dry run) instead of hardware.
#[derive(Default)]
pub struct MockGpioBackend {
    lines: RwLock<FxHashMap<String, Arc<MockLineState>>>, // keyed by line identifier
}

#[derive(Default)]
struct MockLineState {
    pin: Mutex<MockPinState>,
    changed: Condvar,
}

struct MockPinState {
    level: Level,
    configured: bool,
    pull: Option<PullMode>,
    edge: EdgeMode,
    pending: VecDeque<EdgeKind>,
    read_error: Option<String>,
    wait_error: Option<String>,
    rejected_edges: Vec<EdgeMode>,
}

impl Default for MockPinState {
    fn default() -> Self {
        Self {
            level: Level::Low,
            configured: false,
            pull: None,
            edge: EdgeMode::None,
            pending: VecDeque::new(),
            read_error: None,
            wait_error: None,
            rejected_edges: Vec::new(),
        }
    }
}

impl MockGpioBackend {
    pub fn with_lines(identifiers: &[&str]) -> Self {
        let backend = Self::default();
        for id in identifiers {
            backend.add_line(id);
        }
        backend
    }

    pub fn add_line(&self, identifier: &str) {
        self.lines
            .write()
            .entry(identifier.to_string())
            .or_default();
    }

    fn line_state(&self, identifier: &str) -> Result<Arc<MockLineState>, AppError> {
        self.lines
            .read()
            .get(identifier)
            .cloned()
            .ok_or_else(|| AppError::LineNotFound(identifier.to_string()))
    }

    /// Drives the line to `level`, queueing an edge for its watcher when the
    /// transition matches the configured edge mode.
    pub fn set_level(&self, identifier: &str, level: Level) -> Result<(), AppError> {
        let state = self.line_state(identifier)?;
        let mut pin = state.pin.lock();

        let old = pin.level;
        pin.level = level;

        if let Some(edge) = EdgeKind::between(old, level)
            && pin.configured
            && edge.matches(pin.edge)
        {
            pin.pending.push_back(edge);
            state.changed.notify_all();
        }
        Ok(())
    }

    /// Pull mode applied by the last `configure`, if any.
    pub fn pull(&self, identifier: &str) -> Option<PullMode> {
        let state = self.line_state(identifier).ok()?;
        let pull = state.pin.lock().pull;
        pull
    }

    /// Makes every following read fail with `reason`, or recover with `None`.
    pub fn fail_reads(&self, identifier: &str, reason: Option<&str>) -> Result<(), AppError> {
        let state = self.line_state(identifier)?;
        state.pin.lock().read_error = reason.map(str::to_string);
        Ok(())
    }

    /// Wakes the line's watcher with a wait error.
    pub fn fail_wait(&self, identifier: &str, reason: &str) -> Result<(), AppError> {
        let state = self.line_state(identifier)?;
        state.pin.lock().wait_error = Some(reason.to_string());
        state.changed.notify_all();
        Ok(())
    }

    /// Makes `configure` reject `edge` on this line.
    pub fn reject_edge(&self, identifier: &str, edge: EdgeMode) -> Result<(), AppError> {
        let state = self.line_state(identifier)?;
        state.pin.lock().rejected_edges.push(edge);
        Ok(())
    }
}

impl GpioBackend for MockGpioBackend {
    type Line = MockLine;

    fn lookup_line(&self, identifier: &str) -> Result<MockLine, AppError> {
        Ok(MockLine {
            identifier: identifier.to_string(),
            state: self.line_state(identifier)?,
        })
    }
}

pub struct MockLine {
    identifier: String,
    state: Arc<MockLineState>,
}

impl GpioLine for MockLine {
    fn configure(&mut self, pull: PullMode, edge: EdgeMode) -> Result<(), AppError> {
        let mut pin = self.state.pin.lock();

        if pin.rejected_edges.contains(&edge) {
            return Err(AppError::HardwareConfig {
                line: self.identifier.clone(),
                reason: format!("edge detection {edge} not supported"),
            });
        }

        match pull {
            PullMode::PullUp => pin.level = Level::High,
            PullMode::PullDown => pin.level = Level::Low,
            PullMode::Float | PullMode::NoChange => {}
        }
        pin.pull = Some(pull);
        pin.edge = edge;
        pin.pending.clear();
        pin.configured = true;
        Ok(())
    }

    fn wait_for_edge(&self) -> Result<EdgeKind, AppError> {
        let mut pin = self.state.pin.lock();
        loop {
            if let Some(reason) = &pin.wait_error {
                return Err(AppError::HardwareWait {
                    line: self.identifier.clone(),
                    reason: reason.clone(),
                });
            }
            if let Some(edge) = pin.pending.pop_front() {
                return Ok(edge);
            }
            self.state.changed.wait(&mut pin);
        }
    }

    fn read_level(&self) -> Result<Level, AppError> {
        let pin = self.state.pin.lock();

        if !pin.configured {
            return Err(AppError::HardwareRead {
                line: self.identifier.clone(),
                reason: "line not configured".into(),
            });
        }
        if let Some(reason) = &pin.read_error {
            return Err(AppError::HardwareRead {
                line: self.identifier.clone(),
                reason: reason.clone(),
            });
        }
        Ok(pin.level)
    }
}
