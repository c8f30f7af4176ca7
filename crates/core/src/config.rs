use crate::launcher::PythonLauncher;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the interpreter to trace with
pub const PYTHON_ENV: &str = "DEPSCAN_PYTHON";

const DEFAULT_INTERPRETER: &str = "python3";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration for scanning
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Python interpreter to launch
    pub interpreter: PathBuf,
    /// Flag that turns on verbose import tracing
    pub trace_flag: String,
    /// Kill a child runtime after this long (None = wait forever)
    pub timeout: Option<Duration>,
    /// Subtract the bare runtime's imports from the target's
    pub baseline: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from(DEFAULT_INTERPRETER),
            trace_flag: "-v".to_string(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            baseline: true,
        }
    }
}

/// On-disk form of [`ScanConfig`]; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    interpreter: Option<PathBuf>,
    trace_flag: Option<String>,
    /// Seconds; 0 disables the timeout
    timeout_secs: Option<u64>,
    baseline: Option<bool>,
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TOML config file on top of the defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::default().merge_toml(&text, path)
    }

    fn merge_toml(mut self, text: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(interpreter) = file.interpreter {
            self.interpreter = interpreter;
        }
        if let Some(flag) = file.trace_flag {
            if flag.trim().is_empty() {
                return Err(ConfigError::InvalidConfig(
                    "trace_flag must not be empty".to_string(),
                ));
            }
            self.trace_flag = flag;
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(baseline) = file.baseline {
            self.baseline = baseline;
        }
        Ok(self)
    }

    /// Apply `DEPSCAN_PYTHON` when it is set
    pub fn with_env(self) -> Self {
        match env::var_os(PYTHON_ENV) {
            Some(python) if !python.is_empty() => self.with_interpreter(PathBuf::from(python)),
            _ => self,
        }
    }

    pub fn with_interpreter(mut self, interpreter: PathBuf) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_trace_flag(mut self, flag: impl Into<String>) -> Self {
        self.trace_flag = flag.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_baseline(mut self, baseline: bool) -> Self {
        self.baseline = baseline;
        self
    }

    /// The launcher this configuration describes
    pub fn launcher(&self) -> PythonLauncher {
        PythonLauncher::new(self.interpreter.clone())
            .with_trace_flag(self.trace_flag.clone())
            .with_timeout(self.timeout)
    }
}
