pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;

pub use commands::{run_backup, BackupRequest};
pub use config::{BackupConfig, BackupSettings, DestinationMode};
pub use crate::core::{RunStats, SyncEngine, SyncReport};
pub use error::{BackupError, Result};

use std::path::PathBuf;

/// 默认配置目录（config.json 和日志所在位置）
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("backuptools"))
        .unwrap_or_else(|| PathBuf::from(".backuptools"))
}

pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}
