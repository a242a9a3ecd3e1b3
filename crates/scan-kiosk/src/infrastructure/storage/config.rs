//! TOML-based configuration persistence for the kiosk application.
//!
//! Reads and writes `KioskConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\MeritScan\config.toml`
//! - Linux:    `~/.config/meritscan/config.toml`
//! - macOS:    `~/Library/Application Support/MeritScan/config.toml`
//!
//! ```toml
//! [kiosk]
//! context = "portal"
//! log_level = "info"
//!
//! [scanner]
//! managed_start_timeout_ms = 5500
//! countdown_ticks = 5
//!
//! [presence]
//! port = 24810
//!
//! [[registry.students]]
//! code = "8JKH3B4O"
//! name = "John Doe"
//! ```
//!
//! Every field carries a `#[serde(default = ...)]`, so an empty or partial
//! file still yields a working kiosk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use scan_core::{AcceptPolicy, StudentRegistry, DEFAULT_CHANNEL};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::scan_engine::EngineConfig;
use crate::infrastructure::decoder::managed::ManagedScanConfig;

/// Failure to read or write the kiosk configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `--config` nor a platform config directory is available.
    #[error("no kiosk config directory on this platform; pass --config")]
    NoPlatformConfigDir,

    #[error("cannot access kiosk config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("kiosk config is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot encode kiosk config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level kiosk configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct KioskConfig {
    #[serde(default)]
    pub kiosk: KioskSection,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// General kiosk settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KioskSection {
    /// Scanning context; keys the remembered camera (`"portal"`, `"admin"`).
    #[serde(default = "default_context")]
    pub context: String,
    /// `tracing` log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Scan engine timings and managed-library tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScannerConfig {
    #[serde(default = "default_managed_start_timeout_ms")]
    pub managed_start_timeout_ms: u64,
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    #[serde(default = "default_switch_delay_ms")]
    pub switch_delay_ms: u64,
    #[serde(default = "default_countdown_ticks")]
    pub countdown_ticks: u32,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Raw backend render-loop cadence.
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default = "default_enumerate_timeout_ms")]
    pub enumerate_timeout_ms: u64,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_qrbox")]
    pub qrbox: u32,
}

/// Presence heartbeat settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceConfig {
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// How often dashboards ask for status; peers silent for three polls are dropped.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// UDP port the kiosk answers presence requests on.
    #[serde(default = "default_presence_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// The badge roster the kiosk accepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryConfig {
    /// Banner name used when a registered code has no display name.
    #[serde(default = "default_fallback_label")]
    pub fallback_label: String,
    #[serde(default = "default_students")]
    pub students: Vec<StudentEntry>,
}

/// One registered badge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentEntry {
    pub code: String,
    #[serde(default)]
    pub name: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_context() -> String {
    "portal".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_managed_start_timeout_ms() -> u64 {
    5500
}
fn default_restart_delay_ms() -> u64 {
    120
}
fn default_switch_delay_ms() -> u64 {
    140
}
fn default_countdown_ticks() -> u32 {
    5
}
fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_frame_interval_ms() -> u64 {
    33
}
fn default_enumerate_timeout_ms() -> u64 {
    3000
}
fn default_fps() -> u32 {
    12
}
fn default_qrbox() -> u32 {
    250
}
fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}
fn default_heartbeat_interval_ms() -> u64 {
    2000
}
fn default_poll_interval_ms() -> u64 {
    3000
}
fn default_presence_port() -> u16 {
    24810
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_fallback_label() -> String {
    "Student".to_string()
}
fn default_students() -> Vec<StudentEntry> {
    vec![StudentEntry {
        code: "8JKH3B4O".to_string(),
        name: "John Doe".to_string(),
    }]
}

impl Default for KioskSection {
    fn default() -> Self {
        Self {
            context: default_context(),
            log_level: default_log_level(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            managed_start_timeout_ms: default_managed_start_timeout_ms(),
            restart_delay_ms: default_restart_delay_ms(),
            switch_delay_ms: default_switch_delay_ms(),
            countdown_ticks: default_countdown_ticks(),
            tick_interval_ms: default_tick_interval_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            enumerate_timeout_ms: default_enumerate_timeout_ms(),
            fps: default_fps(),
            qrbox: default_qrbox(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            port: default_presence_port(),
            bind_address: default_bind_address(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            fallback_label: default_fallback_label(),
            students: default_students(),
        }
    }
}

// ── Conversions into runtime settings ─────────────────────────────────────────

impl KioskConfig {
    /// Engine timings and accept policy for this kiosk.
    pub fn engine_config(&self) -> EngineConfig {
        let s = &self.scanner;
        EngineConfig {
            context: self.kiosk.context.clone(),
            managed_start_timeout: Duration::from_millis(s.managed_start_timeout_ms),
            restart_delay: Duration::from_millis(s.restart_delay_ms),
            switch_delay: Duration::from_millis(s.switch_delay_ms),
            tick_interval: Duration::from_millis(s.tick_interval_ms),
            enumerate_timeout: Duration::from_millis(s.enumerate_timeout_ms),
            policy: AcceptPolicy {
                countdown_ticks: s.countdown_ticks,
                fallback_label: self.registry.fallback_label.clone(),
            },
        }
    }

    /// Configuration handed to the managed scanning library.
    pub fn managed_scan_config(&self) -> ManagedScanConfig {
        ManagedScanConfig {
            fps: self.scanner.fps,
            qrbox: self.scanner.qrbox,
            ..ManagedScanConfig::default()
        }
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.scanner.frame_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.presence.heartbeat_interval_ms)
    }

    /// Peers that have not polled for this long stop receiving pushes.
    pub fn presence_peer_ttl(&self) -> Duration {
        Duration::from_millis(self.presence.poll_interval_ms.saturating_mul(3))
    }

    /// Builds the in-memory roster.
    pub fn student_registry(&self) -> StudentRegistry {
        StudentRegistry::from_entries(
            self.registry
                .students
                .iter()
                .map(|s| (s.code.as_str(), s.name.clone())),
        )
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for kiosk files.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Resolves the path of the kiosk state file next to `config_path`.
pub fn state_file_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(|dir| dir.join("state.toml"))
        .unwrap_or_else(|| PathBuf::from("state.toml"))
}

/// Loads `KioskConfig` from `path`, returning defaults if the file does not
/// exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<KioskConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(KioskConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &KioskConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("MeritScan"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("meritscan"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("MeritScan")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
