//! 备份命令

use crate::config::{BackupConfig, BackupSettings, DestinationMode};
use crate::core::{FileScanner, Manifest, ProgressSink, SyncEngine, SyncReport};
use crate::error::{BackupError, Result};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// 一次备份请求（来自命令行）
#[derive(Debug, Clone, Default)]
pub struct BackupRequest {
    pub source: PathBuf,
    /// ALL / ALT / /DATE / 路径 / 自定义名称
    pub selector: Option<String>,
    /// 本次额外排除的目录名
    pub extra_exclude: Option<String>,
}

impl BackupRequest {
    /// 结合设置解析出本次备份配置
    pub fn resolve(&self, settings: &BackupSettings, today: NaiveDate) -> BackupConfig {
        let mode = DestinationMode::parse(self.selector.as_deref(), today);
        debug!("目标模式: {:?}", mode);
        BackupConfig::resolve(
            self.source.clone(),
            &mode,
            settings,
            self.extra_exclude.as_deref(),
        )
    }
}

/// 执行一次备份：扫描 -> 加载清单 -> 复制 -> 写入清单
pub fn run_backup(config: &BackupConfig, progress: &mut dyn ProgressSink) -> Result<SyncReport> {
    info!(
        "备份 {:?} -> {:?}",
        config.source_root, config.destination_root
    );
    let start = Instant::now();
    progress.started();

    std::fs::create_dir_all(&config.destination_root).map_err(|source| {
        BackupError::DestinationUnavailable {
            path: config.destination_root.clone(),
            source,
        }
    })?;

    let scan = FileScanner::new(config).scan()?;

    let manifest = if config.change_detection {
        Manifest::load(&config.manifest_path())
    } else {
        Manifest::new()
    };

    progress.scanned(scan.files.len(), &config.destination_root);

    let report = SyncEngine::new(config)
        .started_at(start)
        .run(&scan.files, &manifest, progress)?;
    progress.finished(&report);

    Ok(report)
}
