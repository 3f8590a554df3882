//! Centralized logging configuration for the emulator core.
//!
//! Diagnostics from inside the chips are gated by a process-global
//! [`LogConfig`] holding one verbosity level per [`LogCategory`]. Message
//! construction is lazy, so a disabled category costs a single atomic load.
//!
//! # Usage
//!
//! ```rust
//! use vcs_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Cpu, LogLevel::Debug, || {
//!     format!("unknown opcode at PC={:04X}", 0x1234)
//! });
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

/// Log level for controlling verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    /// Parse a log level from a string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Some(LogLevel::Off),
            "error" | "err" | "1" => Some(LogLevel::Error),
            "warn" | "warning" | "2" => Some(LogLevel::Warn),
            "info" | "3" => Some(LogLevel::Info),
            "debug" | "4" => Some(LogLevel::Debug),
            "trace" | "5" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }
}

/// Log category, one per emulated component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    Cpu,
    Bus,
    Tia,
    Riot,
    Audio,
}

const CATEGORY_COUNT: usize = 5;

impl LogCategory {
    fn index(self) -> usize {
        match self {
            LogCategory::Cpu => 0,
            LogCategory::Bus => 1,
            LogCategory::Tia => 2,
            LogCategory::Riot => 3,
            LogCategory::Audio => 4,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            LogCategory::Cpu => "CPU",
            LogCategory::Bus => "BUS",
            LogCategory::Tia => "TIA",
            LogCategory::Riot => "RIOT",
            LogCategory::Audio => "AUDIO",
        }
    }
}

/// Global logging configuration, one atomic level per category.
pub struct LogConfig {
    levels: [AtomicU8; CATEGORY_COUNT],
}

impl LogConfig {
    const fn new() -> Self {
        Self {
            levels: [
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
                AtomicU8::new(0),
            ],
        }
    }

    /// The process-global configuration.
    pub fn global() -> &'static LogConfig {
        static CONFIG: OnceLock<LogConfig> = OnceLock::new();
        CONFIG.get_or_init(LogConfig::new)
    }

    /// Set the level for a single category.
    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    /// Set the same level for every category.
    pub fn set_all(&self, level: LogLevel) {
        for l in &self.levels {
            l.store(level as u8, Ordering::Relaxed);
        }
    }

    /// Current level for a category.
    pub fn level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.levels[category.index()].load(Ordering::Relaxed))
    }

    /// Whether a message at `level` would be emitted for `category`.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        level != LogLevel::Off && self.level(category) >= level
    }
}

/// Emit a log message. The closure only runs when the category's level
/// admits the message.
pub fn log<F>(category: LogCategory, level: LogLevel, message: F)
where
    F: FnOnce() -> String,
{
    if LogConfig::global().should_log(category, level) {
        eprintln!("[{}] {}", category.tag(), message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_parse_from_strings() {
        assert_eq!(LogLevel::from_str("off"), Some(LogLevel::Off));
        assert_eq!(LogLevel::from_str("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("trace"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("5"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::from_str("bogus"), None);
    }

    #[test]
    fn default_config_is_silent() {
        let config = LogConfig::new();
        for cat in [
            LogCategory::Cpu,
            LogCategory::Bus,
            LogCategory::Tia,
            LogCategory::Riot,
            LogCategory::Audio,
        ] {
            assert!(!config.should_log(cat, LogLevel::Error));
        }
    }

    #[test]
    fn levels_gate_per_category() {
        let config = LogConfig::new();
        config.set_level(LogCategory::Tia, LogLevel::Info);

        assert!(config.should_log(LogCategory::Tia, LogLevel::Warn));
        assert!(config.should_log(LogCategory::Tia, LogLevel::Info));
        assert!(!config.should_log(LogCategory::Tia, LogLevel::Debug));
        assert!(!config.should_log(LogCategory::Cpu, LogLevel::Error));
    }

    #[test]
    fn set_all_applies_everywhere() {
        let config = LogConfig::new();
        config.set_all(LogLevel::Debug);
        assert!(config.should_log(LogCategory::Riot, LogLevel::Debug));
        assert!(!config.should_log(LogCategory::Riot, LogLevel::Trace));
    }
}
