use std::{collections::HashSet, fmt, fs, path::Path, str::FromStr};

use log::warn;
use serde::Deserialize;

use crate::error::AppError;

/// Bias applied to an input line.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq)]
pub enum PullMode {
    Float,
    PullDown,
    PullUp,
    NoChange,
}

impl PullMode {
    pub const ALL: [PullMode; 4] = [
        PullMode::Float,
        PullMode::PullDown,
        PullMode::PullUp,
        PullMode::NoChange,
    ];

    /// Spelling used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            PullMode::Float => "Float",
            PullMode::PullDown => "Down",
            PullMode::PullUp => "Up",
            PullMode::NoChange => "NoChange",
        }
    }
}

impl FromStr for PullMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PullMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| AppError::UnknownPullMode(s.to_string()))
    }
}

impl fmt::Display for PullMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge condition a watcher waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeMode {
    None,
    Rising,
    Falling,
    Both,
}

impl EdgeMode {
    pub const ALL: [EdgeMode; 4] = [
        EdgeMode::None,
        EdgeMode::Rising,
        EdgeMode::Falling,
        EdgeMode::Both,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeMode::None => "None",
            EdgeMode::Rising => "Rising",
            EdgeMode::Falling => "Falling",
            EdgeMode::Both => "Both",
        }
    }
}

impl FromStr for EdgeMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdgeMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| AppError::UnknownEdgeMode(s.to_string()))
    }
}

impl fmt::Display for EdgeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One monitored pin as written in the config file. Pull and edge stay raw
/// strings until the registry resolves them.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PinConfig {
    pub name: String,
    pub gpio: String,
    pub pull: String,
    pub edge: String,
}

impl PinConfig {
    pub fn new(name: &str, gpio: &str, pull: &str, edge: &str) -> Self {
        Self {
            name: name.to_string(),
            gpio: gpio.to_string(),
            pull: pull.to_string(),
            edge: edge.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub pins: Vec<PinConfig>,
}

impl AppConfig {
    /// Loads JSON or YAML. `.yaml`/`.yml` files are read as YAML, `.json` as
    /// JSON; any other extension tries JSON first and falls back to YAML.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml(&contents),
            Some("json") => Self::from_json(&contents),
            _ => Self::from_json(&contents).or_else(|_| Self::from_yaml(&contents)),
        }
    }

    pub fn from_json(contents: &str) -> Result<Self, AppError> {
        let config: AppConfig = serde_json::from_str(contents)
            .map_err(|e| AppError::Config(format!("Invalid config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, AppError> {
        let config: AppConfig = serde_yaml::from_str(contents)
            .map_err(|e| AppError::Config(format!("Invalid config yaml: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.pins.is_empty() {
            return Err(AppError::Config("no pins configured".into()));
        }

        let mut seen = HashSet::new();
        for (idx, pin) in self.pins.iter().enumerate() {
            if pin.name.trim().is_empty() {
                return Err(AppError::Config(format!("pin #{idx} has an empty name")));
            }
            if !seen.insert(pin.name.as_str()) {
                warn!("duplicate pin name {:?}, log lines will be ambiguous", pin.name);
            }
        }

        Ok(())
    }
}
