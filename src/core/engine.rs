use crate::config::BackupConfig;
use crate::core::hasher;
use crate::core::manifest::{Manifest, ManifestRecord, ManifestWriter};
use crate::core::progress::ProgressSink;
use crate::core::scanner::FileEntry;
use crate::error::{BackupError, Result};
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// 单个文件的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAction {
    /// 内容未变化，跳过
    Skipped,
    /// 目标不存在，新复制
    New,
    /// 目标已存在，覆盖
    Updated,
    /// 处理失败（原因）
    Failed(String),
}

impl FileAction {
    pub fn tag(&self) -> &'static str {
        match self {
            FileAction::Skipped => "SKIPPING",
            FileAction::New => "NEW",
            FileAction::Updated => "UPDATED",
            FileAction::Failed(_) => "FAILED",
        }
    }
}

/// 运行统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub scanned: usize,
    pub skipped: usize,
    pub new: usize,
    pub updated: usize,
    pub failed: usize,
}

impl RunStats {
    fn record(&mut self, action: &FileAction) {
        self.scanned += 1;
        match action {
            FileAction::Skipped => self.skipped += 1,
            FileAction::New => self.new += 1,
            FileAction::Updated => self.updated += 1,
            FileAction::Failed(_) => self.failed += 1,
        }
    }

    /// 所有文件都被跳过（没有任何更新）
    pub fn is_unchanged(&self) -> bool {
        self.skipped == self.scanned && self.failed == 0
    }
}

/// 失败的文件
#[derive(Debug, Clone)]
pub struct FailedFile {
    pub relative_path: String,
    pub reason: String,
}

/// 备份报告
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub stats: RunStats,
    pub elapsed: Duration,
    pub failures: Vec<FailedFile>,
}

/// 同步引擎：逐个判断文件是否需要复制
pub struct SyncEngine<'a> {
    config: &'a BackupConfig,
    /// 计时起点（报告中的耗时从这里算起）
    started: Instant,
}

impl<'a> SyncEngine<'a> {
    pub fn new(config: &'a BackupConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
        }
    }

    /// 从更早的时间点开始计时（例如扫描之前）
    pub fn started_at(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    /// 按扫描顺序处理所有文件，结束时写入新的校验和清单
    pub fn run(
        &self,
        entries: &[FileEntry],
        manifest: &Manifest,
        progress: &mut dyn ProgressSink,
    ) -> Result<SyncReport> {
        let total = entries.len();
        let mut stats = RunStats::default();
        let mut failures = Vec::new();
        let mut new_manifest = ManifestWriter::new();

        info!(
            "开始备份 {} 个文件 -> {:?} (校验和比较: {})",
            total, self.config.destination_root, self.config.change_detection
        );

        for (index, entry) in entries.iter().enumerate() {
            let action = match self.process_file(entry, manifest, &mut new_manifest) {
                Ok(action) => action,
                Err(e) if e.is_per_file() => {
                    warn!("{}", e);
                    failures.push(FailedFile {
                        relative_path: entry.relative_path.clone(),
                        reason: e.reason(),
                    });
                    FileAction::Failed(e.reason())
                }
                Err(e) => return Err(e),
            };

            stats.record(&action);
            progress.file_done(index + 1, total, &entry.relative_path, &action);
        }

        if self.config.change_detection {
            new_manifest.save(&self.config.manifest_path())?;
        }

        let report = SyncReport {
            stats,
            elapsed: self.started.elapsed(),
            failures,
        };

        info!(
            "备份完成: 新增 {}, 更新 {}, 跳过 {}, 失败 {}",
            report.stats.new, report.stats.updated, report.stats.skipped, report.stats.failed
        );

        Ok(report)
    }

    /// 处理单个文件
    fn process_file(
        &self,
        entry: &FileEntry,
        manifest: &Manifest,
        new_manifest: &mut ManifestWriter,
    ) -> Result<FileAction> {
        let dest_path = self.dest_path(entry);
        let dest_exists = dest_path.exists();

        let fingerprint = if self.config.change_detection {
            Some(hasher::fingerprint(&entry.source_path)?.to_hex())
        } else {
            None
        };

        if let Some(fp) = &fingerprint {
            if dest_exists && manifest.contains(fp, &entry.relative_path) {
                debug!("文件未变化，跳过: {}", entry.relative_path);
                new_manifest.push(ManifestRecord::new(entry.relative_path.as_str(), fp.as_str()));
                return Ok(FileAction::Skipped);
            }
        }

        let action = if dest_exists {
            FileAction::Updated
        } else {
            FileAction::New
        };

        copy_preserving_mtime(&entry.source_path, &dest_path, entry.modified)?;
        debug!("{}: {}", action.tag(), entry.relative_path);

        // 只记录成功复制的文件，失败的下次仍会重新复制
        if let Some(fp) = fingerprint {
            new_manifest.push(ManifestRecord::new(entry.relative_path.as_str(), fp));
        }

        Ok(action)
    }

    fn dest_path(&self, entry: &FileEntry) -> PathBuf {
        self.config.destination_root.join(&entry.relative)
    }
}

/// 复制文件并把目标的修改时间设为源文件的修改时间
fn copy_preserving_mtime(source: &Path, dest: &Path, fallback_mtime: SystemTime) -> Result<()> {
    // 复制前读取，确保是源文件的时间而不是复制时间
    let mtime = fs::metadata(source)
        .and_then(|m| m.modified())
        .unwrap_or(fallback_mtime);

    fs::copy(source, dest).map_err(|e| BackupError::Copy {
        path: source.to_path_buf(),
        source: e,
    })?;

    filetime::set_file_mtime(dest, FileTime::from_system_time(mtime)).map_err(|e| {
        BackupError::Timestamp {
            path: dest.to_path_buf(),
            source: e,
        }
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::MANIFEST_FILE;
    use crate::core::progress::NoProgress;
    use std::collections::BTreeSet;

    fn config(src: &Path, dst: &Path, change_detection: bool) -> BackupConfig {
        BackupConfig {
            source_root: src.to_path_buf(),
            destination_root: dst.to_path_buf(),
            change_detection,
            excluded_dirs: BTreeSet::new(),
            allowed_extensions: BTreeSet::new(),
        }
    }

    fn entry(src: &Path, name: &str) -> FileEntry {
        let source_path = src.join(name);
        FileEntry {
            relative_path: name.to_string(),
            relative: PathBuf::from(name),
            modified: fs::metadata(&source_path).unwrap().modified().unwrap(),
            source_path,
        }
    }

    #[test]
    fn test_classification() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("same.txt"), "same").unwrap();
        fs::write(src.path().join("changed.txt"), "v2").unwrap();
        fs::write(src.path().join("fresh.txt"), "new").unwrap();
        fs::write(dst.path().join("same.txt"), "same").unwrap();
        fs::write(dst.path().join("changed.txt"), "v1").unwrap();

        let mut manifest = Manifest::new();
        let same_fp = hasher::Fingerprint::from_bytes(b"same").to_hex();
        let old_fp = hasher::Fingerprint::from_bytes(b"v1").to_hex();
        manifest.insert(&ManifestRecord::new("same.txt", same_fp));
        manifest.insert(&ManifestRecord::new("changed.txt", old_fp));

        let cfg = config(src.path(), dst.path(), true);
        let entries: Vec<_> = ["same.txt", "changed.txt", "fresh.txt"]
            .iter()
            .map(|n| entry(src.path(), n))
            .collect();

        let report = SyncEngine::new(&cfg)
            .run(&entries, &manifest, &mut NoProgress)
            .unwrap();

        assert_eq!(
            report.stats,
            RunStats {
                scanned: 3,
                skipped: 1,
                new: 1,
                updated: 1,
                failed: 0
            }
        );
        assert_eq!(fs::read_to_string(dst.path().join("changed.txt")).unwrap(), "v2");

        // 新清单按处理顺序包含所有文件
        let saved = fs::read_to_string(dst.path().join(MANIFEST_FILE)).unwrap();
        let paths: Vec<_> = saved.lines().map(|l| l.split("\" ").next().unwrap()).collect();
        assert_eq!(paths, vec!["\"same.txt", "\"changed.txt", "\"fresh.txt"]);
    }

    #[test]
    fn test_manifest_hit_without_dest_file_copies() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.txt"), "a").unwrap();

        let mut manifest = Manifest::new();
        manifest.insert(&ManifestRecord::new(
            "a.txt",
            hasher::Fingerprint::from_bytes(b"a").to_hex(),
        ));

        let cfg = config(src.path(), dst.path(), true);
        let report = SyncEngine::new(&cfg)
            .run(&[entry(src.path(), "a.txt")], &manifest, &mut NoProgress)
            .unwrap();
        assert_eq!(report.stats.new, 1);
        assert!(dst.path().join("a.txt").exists());
    }

    #[test]
    fn test_full_copy_mode_never_skips() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.txt"), "a").unwrap();
        fs::write(dst.path().join("a.txt"), "a").unwrap();

        let cfg = config(src.path(), dst.path(), false);
        let report = SyncEngine::new(&cfg)
            .run(&[entry(src.path(), "a.txt")], &Manifest::new(), &mut NoProgress)
            .unwrap();

        assert_eq!(report.stats.updated, 1);
        assert_eq!(report.stats.skipped, 0);
        assert!(!dst.path().join(MANIFEST_FILE).exists());
    }

    #[test]
    fn test_failed_file_is_recorded_and_run_continues() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("ok.txt"), "ok").unwrap();
        fs::write(src.path().join("gone.txt"), "gone").unwrap();

        let entries = vec![entry(src.path(), "gone.txt"), entry(src.path(), "ok.txt")];
        fs::remove_file(src.path().join("gone.txt")).unwrap();

        let cfg = config(src.path(), dst.path(), true);
        let report = SyncEngine::new(&cfg)
            .run(&entries, &Manifest::new(), &mut NoProgress)
            .unwrap();

        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.new, 1);
        assert_eq!(report.failures[0].relative_path, "gone.txt");
        assert!(!report.stats.is_unchanged());

        let saved = Manifest::load(&dst.path().join(MANIFEST_FILE));
        assert_eq!(saved.len(), 1);
    }

    #[test]
    fn test_elapsed_counts_from_start() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("a.txt"), "a").unwrap();

        let earlier = Instant::now().checked_sub(Duration::from_secs(5)).unwrap();
        let cfg = config(src.path(), dst.path(), true);
        let report = SyncEngine::new(&cfg)
            .started_at(earlier)
            .run(&[entry(src.path(), "a.txt")], &Manifest::new(), &mut NoProgress)
            .unwrap();

        assert!(report.elapsed >= Duration::from_secs(5));
    }

    #[test]
    fn test_directory_in_place_of_file_fails() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        fs::write(src.path().join("clash"), "data").unwrap();
        fs::create_dir(dst.path().join("clash")).unwrap();

        let cfg = config(src.path(), dst.path(), false);
        let report = SyncEngine::new(&cfg)
            .run(&[entry(src.path(), "clash")], &Manifest::new(), &mut NoProgress)
            .unwrap();

        assert_eq!(report.stats.failed, 1);
        assert!(dst.path().join("clash").is_dir());
    }
}
