use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use libgpiod::{chip::Chip, line, line::EventClock, request};
use log::debug;
use parking_lot::{FairMutex, Mutex};

use crate::config::{EdgeMode, PullMode};
use crate::error::AppError;
use crate::gpio::{EdgeKind, GpioBackend, GpioLine, Level};

// one event per read, the kernel keeps the rest queued
const LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY: usize = 1;
const LIBGPIOD_BACKEND_EVENT_WAIT_SLICE: Duration = Duration::from_millis(10);
const LIBGPIOD_BACKEND_DEFAULT_DEV_DIR: &str = "/dev";

/// GPIO character devices through libgpiod.
///
/// Line identifiers are either `<chip>:<offset>` (`gpiochip0:17`,
/// `/dev/gpiochip0:17`) or a line name such as `GPIO17`, which is searched
/// on every chip in the device directory.
pub struct LibgpiodBackend {
    dev_dir: PathBuf,
}

impl LibgpiodBackend {
    pub fn new() -> Result<Self, AppError> {
        Self::with_dev_dir(LIBGPIOD_BACKEND_DEFAULT_DEV_DIR)
    }

    pub fn with_dev_dir<P: AsRef<Path>>(dev_dir: P) -> Result<Self, AppError> {
        let dev_dir = dev_dir.as_ref().to_path_buf();
        if !dev_dir.is_dir() {
            return Err(AppError::Config(format!(
                "gpio device directory {} does not exist",
                dev_dir.display()
            )));
        }
        Ok(Self { dev_dir })
    }

    fn chip_path(&self, chip: &str) -> PathBuf {
        let p = Path::new(chip);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.dev_dir.join(chip)
        }
    }

    fn chip_paths(&self) -> Result<Vec<PathBuf>, AppError> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dev_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("gpiochip"))
            .map(|entry| entry.path())
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn find_by_offset(&self, identifier: &str, chip: &str, offset: u32) -> Result<PathBuf, AppError> {
        let path = self.chip_path(chip);
        let chip = Chip::open(&path).map_err(|_| AppError::LineNotFound(identifier.to_string()))?;
        let info = chip
            .info()
            .map_err(|_| AppError::LineNotFound(identifier.to_string()))?;
        if offset as usize >= info.num_lines() {
            return Err(AppError::LineNotFound(identifier.to_string()));
        }
        Ok(path)
    }

    fn find_by_name(&self, name: &str) -> Result<(PathBuf, u32), AppError> {
        for path in self.chip_paths()? {
            let Ok(chip) = Chip::open(&path) else {
                continue;
            };
            if let Ok(offset) = chip.line_offset_from_name(name) {
                return Ok((path, offset));
            }
        }
        Err(AppError::LineNotFound(name.to_string()))
    }
}

fn parse_chip_offset(identifier: &str) -> Option<(&str, u32)> {
    let (chip, offset) = identifier.rsplit_once(':')?;
    let offset = offset.parse().ok()?;
    (!chip.is_empty()).then_some((chip, offset))
}

impl GpioBackend for LibgpiodBackend {
    type Line = LibgpiodLine;

    fn lookup_line(&self, identifier: &str) -> Result<LibgpiodLine, AppError> {
        let (chip, offset) = match parse_chip_offset(identifier) {
            Some((chip, offset)) => (self.find_by_offset(identifier, chip, offset)?, offset),
            None => self.find_by_name(identifier)?,
        };
        debug!("{identifier} is line {offset} of {}", chip.display());

        Ok(LibgpiodLine {
            identifier: identifier.to_string(),
            chip,
            offset,
            edge: EdgeMode::None,
            handle: None,
        })
    }
}

struct GpiodHandle {
    request: FairMutex<request::Request>,
    buffer: Mutex<request::Buffer>,
}

pub struct LibgpiodLine {
    identifier: String,
    chip: PathBuf,
    offset: u32,
    edge: EdgeMode,
    handle: Option<GpiodHandle>,
}

impl LibgpiodLine {
    fn config_error(&self, what: &str, e: impl Display) -> AppError {
        AppError::HardwareConfig {
            line: self.identifier.clone(),
            reason: format!("{what}: {e}"),
        }
    }

    fn make_line_settings(&self, pull: PullMode, edge: EdgeMode) -> Result<line::Settings, AppError> {
        let mut ls = line::Settings::new().map_err(|e| self.config_error("line settings", e))?;

        ls.set_direction(line::Direction::Input)
            .map_err(|e| self.config_error("set direction", e))?;

        let bias = match pull {
            PullMode::Float => Some(line::Bias::Disabled),
            PullMode::PullDown => Some(line::Bias::PullDown),
            PullMode::PullUp => Some(line::Bias::PullUp),
            PullMode::NoChange => None,
        };
        ls.set_bias(bias)
            .map_err(|e| self.config_error("set bias", e))?;

        let detection = match edge {
            EdgeMode::None => None,
            EdgeMode::Rising => Some(line::Edge::Rising),
            EdgeMode::Falling => Some(line::Edge::Falling),
            EdgeMode::Both => Some(line::Edge::Both),
        };
        if detection.is_some() {
            ls.set_edge_detection(detection)
                .map_err(|e| self.config_error("set edge detection", e))?;
            ls.set_event_clock(EventClock::Realtime)
                .map_err(|e| self.config_error("set event clock", e))?;
        }

        Ok(ls)
    }

    fn request_line(&self, settings: line::Settings) -> Result<request::Request, AppError> {
        let mut line_cfg = line::Config::new().map_err(|e| self.config_error("line config", e))?;
        line_cfg
            .add_line_settings(&[self.offset], settings)
            .map_err(|e| self.config_error("line config add settings", e))?;

        let mut req_cfg =
            request::Config::new().map_err(|e| self.config_error("request config", e))?;
        req_cfg
            .set_consumer(env!("CARGO_PKG_NAME"))
            .map_err(|e| self.config_error("request consumer", e))?;

        let chip = Chip::open(&self.chip)
            .map_err(|e| self.config_error(&format!("open chip {}", self.chip.display()), e))?;
        chip.request_lines(Some(&req_cfg), &line_cfg)
            .map_err(|e| self.config_error("request lines", e))
    }

    fn handle(&self) -> Option<&GpiodHandle> {
        self.handle.as_ref()
    }

    fn wait_error(&self, reason: impl Display) -> AppError {
        AppError::HardwareWait {
            line: self.identifier.clone(),
            reason: reason.to_string(),
        }
    }
}

impl GpioLine for LibgpiodLine {
    fn configure(&mut self, pull: PullMode, edge: EdgeMode) -> Result<(), AppError> {
        let settings = self.make_line_settings(pull, edge)?;
        let request = self.request_line(settings)?;
        let buffer = request::Buffer::new(LIBGPIOD_BACKEND_EVENT_BUFFER_CAPACITY)
            .map_err(|e| self.config_error("event buffer", e))?;

        self.edge = edge;
        self.handle = Some(GpiodHandle {
            request: FairMutex::new(request),
            buffer: Mutex::new(buffer),
        });
        Ok(())
    }

    fn wait_for_edge(&self) -> Result<EdgeKind, AppError> {
        let handle = self
            .handle()
            .ok_or_else(|| self.wait_error("line not configured"))?;

        // no edge detection requested: nothing will ever arrive
        if self.edge == EdgeMode::None {
            loop {
                std::thread::park();
            }
        }

        let mut buffer = handle.buffer.lock();
        loop {
            // the request lock is released between slices so level reads get through
            let req = handle.request.lock();
            let ready = req
                .wait_edge_events(Some(LIBGPIOD_BACKEND_EVENT_WAIT_SLICE))
                .map_err(|e| self.wait_error(format!("wait edge events: {e}")))?;
            if !ready {
                continue;
            }

            let events = req
                .read_edge_events(&mut *buffer)
                .map_err(|e| self.wait_error(format!("read edge events: {e}")))?;
            for evt in events {
                let evt = evt.map_err(|e| self.wait_error(format!("edge event: {e}")))?;
                match evt.event_type() {
                    Ok(line::EdgeKind::Rising) => return Ok(EdgeKind::Rising),
                    Ok(line::EdgeKind::Falling) => return Ok(EdgeKind::Falling),
                    Err(_) => continue,
                }
            }
        }
    }

    fn read_level(&self) -> Result<Level, AppError> {
        let read_error = |reason: String| AppError::HardwareRead {
            line: self.identifier.clone(),
            reason,
        };
        let handle = self
            .handle()
            .ok_or_else(|| read_error("line not configured".into()))?;

        let value = handle
            .request
            .lock()
            .value(self.offset)
            .map_err(|e| read_error(format!("get value: {e}")))?;
        Ok(match value {
            line::Value::InActive => Level::Low,
            line::Value::Active => Level::High,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::parse_chip_offset;

    #[test]
    fn chip_and_offset() {
        assert_eq!(parse_chip_offset("gpiochip0:17"), Some(("gpiochip0", 17)));
        assert_eq!(
            parse_chip_offset("/dev/gpiochip0:17"),
            Some(("/dev/gpiochip0", 17))
        );
    }

    #[test]
    fn line_names_are_not_offsets() {
        assert_eq!(parse_chip_offset("GPIO17"), None);
        assert_eq!(parse_chip_offset("gpiochip0:GPIO17"), None);
    }

    #[test]
    fn chip_is_required() {
        assert_eq!(parse_chip_offset(":5"), None);
    }
}
