//! Bridge configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CastError, CastResult};

/// Longest socket path accepted by every supported platform's `sockaddr_un`.
pub const MAX_SOCKET_PATH_LEN: usize = 104;

/// Global bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Where the two processes meet.
    pub rendezvous: RendezvousConfig,

    /// Privilege escalation retry timing.
    pub retry: RetryConfig,

    /// Frame channel tuning.
    pub transport: TransportConfig,

    /// Virtual display recognition.
    pub display: DisplayConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Shared filesystem location of the frame socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendezvousConfig {
    /// Directory shared between the capture process and the main process.
    pub shared_dir: PathBuf,

    /// File name of the socket inside `shared_dir`.
    pub socket_name: String,
}

/// Escalation retry delays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay after the host refuses escalation for lack of consent.
    pub denied_delay_ms: u64,

    /// Delay after any unexpected escalation failure.
    pub error_delay_ms: u64,
}

/// Frame channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Upper bound on a single blocking write from the capture callback.
    pub write_timeout_ms: u64,

    /// Largest `totalLength` the consumer accepts.
    pub max_frame_bytes: u32,
}

/// How virtual capture displays are recognized in OS notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Substrings identifying the capture display by name.
    pub virtual_display_markers: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "castbridge_session=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            rendezvous: RendezvousConfig::default(),
            retry: RetryConfig::default(),
            transport: TransportConfig::default(),
            display: DisplayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            shared_dir: default_shared_dir(),
            socket_name: "rtc_broadcast.socket".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            denied_delay_ms: 10,
            error_delay_ms: 1000,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            write_timeout_ms: 50,
            max_frame_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            virtual_display_markers: vec![
                "ScreenCapture".to_string(),
                "flutter_webrtc".to_string(),
            ],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl RendezvousConfig {
    /// Full path of the frame socket.
    pub fn socket_path(&self) -> PathBuf {
        self.shared_dir.join(&self.socket_name)
    }
}

impl RetryConfig {
    pub fn denied_delay(&self) -> Duration {
        Duration::from_millis(self.denied_delay_ms)
    }

    pub fn error_delay(&self) -> Duration {
        Duration::from_millis(self.error_delay_ms)
    }
}

impl TransportConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl BridgeConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load and validate config from an explicit path.
    pub fn load_from(path: &Path) -> CastResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Reject settings the bridge cannot run with.
    pub fn validate(&self) -> CastResult<()> {
        if self.rendezvous.socket_name.is_empty() {
            return Err(CastError::config("rendezvous.socket_name must not be empty"));
        }
        let path = self.rendezvous.socket_path();
        let path_len = path.as_os_str().len();
        if path_len >= MAX_SOCKET_PATH_LEN {
            return Err(CastError::config(format!(
                "socket path {} is {path_len} bytes, limit is {}",
                path.display(),
                MAX_SOCKET_PATH_LEN - 1
            )));
        }
        if self.retry.denied_delay_ms == 0 || self.retry.error_delay_ms == 0 {
            return Err(CastError::config("retry delays must be non-zero"));
        }
        if self.transport.write_timeout_ms == 0 {
            return Err(CastError::config("transport.write_timeout_ms must be non-zero"));
        }
        if self.transport.max_frame_bytes <= 16 {
            return Err(CastError::config(
                "transport.max_frame_bytes must exceed the 16-byte frame header",
            ));
        }
        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("castbridge").join("config.json")
}

/// Default shared directory for the frame socket.
fn default_shared_dir() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
        .join("castbridge")
}
