use crate::config::BackupConfig;
use crate::error::{BackupError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// 扫描得到的源文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// 相对源目录的路径（统一使用 /，用于清单和显示）
    pub relative_path: String,
    /// 相对源目录的原始路径（用于拼接目标路径）
    pub relative: PathBuf,
    pub source_path: PathBuf,
    pub modified: SystemTime,
}

/// 扫描结果
#[derive(Debug, Default)]
pub struct ScanResult {
    pub files: Vec<FileEntry>,
    /// 已镜像的目录数
    pub dirs: usize,
    /// 被排除（未进入）的目录数
    pub excluded_dirs: usize,
    /// 目标目录位于源目录内时被跳过
    pub skipped_destination: bool,
    /// 因扩展名不符被过滤的文件数
    pub filtered_files: usize,
    /// 无法读取的条目数
    pub errors: usize,
}

/// 文件扫描器：遍历源目录，同时在目标目录中镜像目录结构
pub struct FileScanner<'a> {
    config: &'a BackupConfig,
    extension_filter: Option<Regex>,
}

impl<'a> FileScanner<'a> {
    pub fn new(config: &'a BackupConfig) -> Self {
        Self {
            config,
            extension_filter: build_extension_filter(config),
        }
    }

    /// 检查目录是否应该被排除（只比较目录名）
    fn is_excluded_dir(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.config.excluded_dirs.contains(name))
    }

    /// 检查文件扩展名是否在允许列表中
    pub fn matches_extension(&self, file_name: &str) -> bool {
        self.extension_filter
            .as_ref()
            .map_or(true, |re| re.is_match(file_name))
    }

    /// 目标目录中对应的路径
    fn mirror_path(&self, relative: &Path) -> PathBuf {
        self.config.destination_root.join(relative)
    }

    /// 扫描源目录
    pub fn scan(&self) -> Result<ScanResult> {
        let root = &self.config.source_root;
        std::fs::read_dir(root).map_err(|source| BackupError::SourceUnavailable {
            path: root.clone(),
            source,
        })?;

        info!("开始扫描: {:?}", root);

        // 从规范化后的根目录遍历，目录条目的路径可直接与目标根目录比较
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.clone());
        let destination = std::fs::canonicalize(&self.config.destination_root).ok();

        let mut result = ScanResult::default();
        let mut walker = WalkDir::new(&root).follow_links(false).min_depth(1).into_iter();

        // 目录先于其内容返回，因此创建目标目录总在复制其中文件之前
        while let Some(next) = walker.next() {
            let entry = match next {
                Ok(e) => e,
                Err(e) => {
                    warn!("无法读取: {}", e);
                    result.errors += 1;
                    continue;
                }
            };

            if entry.file_type().is_dir() && destination.as_deref() == Some(entry.path()) {
                warn!("目标目录位于源目录内，跳过: {:?}", entry.path());
                result.skipped_destination = true;
                walker.skip_current_dir();
                continue;
            }

            if self.is_excluded_dir(&entry) {
                debug!("排除目录: {:?}", entry.path());
                result.excluded_dirs += 1;
                walker.skip_current_dir();
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };

            if entry.file_type().is_dir() {
                self.mirror_dir(relative);
                result.dirs += 1;
                continue;
            }

            // 符号链接不进入，但指向普通文件的链接按文件处理
            if entry.file_type().is_symlink() && !entry.path().is_file() {
                debug!("跳过非文件链接: {:?}", entry.path());
                continue;
            }

            let file_name = entry.file_name().to_string_lossy();
            if !self.matches_extension(&file_name) {
                result.filtered_files += 1;
                continue;
            }

            let modified = match std::fs::metadata(entry.path()).and_then(|m| m.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!("无法读取文件信息: {:?}: {}", entry.path(), e);
                    result.errors += 1;
                    continue;
                }
            };

            result.files.push(FileEntry {
                relative_path: normalize_path(relative),
                relative: relative.to_path_buf(),
                source_path: entry.path().to_path_buf(),
                modified,
            });
        }

        info!(
            "扫描完成: {} 个文件, {} 个目录, {} 个目录被排除, {} 个文件被过滤, {} 个错误",
            result.files.len(),
            result.dirs,
            result.excluded_dirs,
            result.filtered_files,
            result.errors
        );

        Ok(result)
    }

    /// 在目标中创建对应目录，失败只记录日志（之后复制时会报告）
    fn mirror_dir(&self, relative: &Path) {
        let target = self.mirror_path(relative);
        if target.exists() {
            return;
        }
        if let Err(e) = std::fs::create_dir(&target) {
            debug!("创建目标目录失败: {:?}: {}", target, e);
        }
    }
}

/// 构建扩展名匹配正则，不限制扩展名时返回 None
fn build_extension_filter(config: &BackupConfig) -> Option<Regex> {
    if config.allowed_extensions.is_empty() {
        return None;
    }

    let alternatives: Vec<String> = config
        .allowed_extensions
        .iter()
        .map(|e| regex::escape(e))
        .collect();
    let pattern = format!(r"(?i)\.({})$", alternatives.join("|"));

    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            // 各扩展名已转义，这里只在正则过大时发生
            warn!("扩展名过滤规则无效，不限制扩展名: {}", e);
            None
        }
    }
}

/// 规范化路径分隔符（统一使用 /）
fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
