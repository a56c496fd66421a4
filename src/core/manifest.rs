//! 校验和清单 - 记录上次备份时每个文件的指纹
//!
//! 文件格式（每行一条）：
//! ```text
//! "docs/readme.md" 1c291ca3
//! ```

use crate::error::{BackupError, Result};
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// 清单文件名（位于目标根目录）
pub const MANIFEST_FILE: &str = ".checksums";

/// 清单记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub relative_path: String,
    pub fingerprint: String,
}

impl ManifestRecord {
    pub fn new(relative_path: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            fingerprint: fingerprint.into(),
        }
    }

    /// 解析一行，格式不符时返回 None
    fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches('\r');
        let (path, fingerprint) = line.split_once("\" ")?;
        let path = path.replace('"', "");
        let fingerprint = fingerprint.trim();

        if path.is_empty() || fingerprint.is_empty() {
            return None;
        }

        Some(Self::new(path, fingerprint))
    }

    fn to_line(&self) -> String {
        format!("\"{}\" {}", self.relative_path, self.fingerprint)
    }
}

/// 指纹 + 路径共同计算的查找键
type ManifestKey = [u8; 32];

fn manifest_key(fingerprint: &str, relative_path: &str) -> ManifestKey {
    let mut hasher = blake3::Hasher::new();
    hasher.update(fingerprint.as_bytes());
    // 分隔符避免 "ab"+"c" 与 "a"+"bc" 冲突
    hasher.update(&[0]);
    hasher.update(relative_path.as_bytes());
    *hasher.finalize().as_bytes()
}

/// 上次运行留下的清单（只读）
#[derive(Debug, Default)]
pub struct Manifest {
    entries: HashMap<ManifestKey, String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加载清单；文件不存在或无法读取时返回空清单
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                debug!("未加载校验和清单 {:?}: {}", path, e);
                return Self::default();
            }
        };

        let manifest = Self::parse(&content);
        debug!("已加载校验和清单: {} 条记录", manifest.len());
        manifest
    }

    /// 解析清单内容，忽略格式错误的行
    pub fn parse(content: &str) -> Self {
        let mut manifest = Self::default();
        let mut skipped = 0usize;

        for line in content.lines() {
            match ManifestRecord::parse_line(line) {
                Some(record) => manifest.insert(&record),
                None if line.trim().is_empty() => {}
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!("校验和清单中有 {} 行格式错误，已忽略", skipped);
        }

        manifest
    }

    pub fn insert(&mut self, record: &ManifestRecord) {
        self.entries.insert(
            manifest_key(&record.fingerprint, &record.relative_path),
            record.relative_path.clone(),
        );
    }

    /// 指纹和路径都匹配时才算命中
    pub fn contains(&self, fingerprint: &str, relative_path: &str) -> bool {
        self.entries
            .get(&manifest_key(fingerprint, relative_path))
            .is_some_and(|p| p == relative_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 本次运行新生成的清单（按处理顺序追加）
#[derive(Debug, Default)]
pub struct ManifestWriter {
    records: Vec<ManifestRecord>,
}

impl ManifestWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ManifestRecord) {
        self.records.push(record);
    }

    /// 覆盖写入清单：先写临时文件，再原子重命名
    pub fn save(&self, path: &Path) -> Result<()> {
        let write_err = |source| BackupError::ManifestWrite {
            path: path.to_path_buf(),
            source,
        };

        let temp_path = path.with_extension("tmp");
        {
            let file = fs::File::create(&temp_path).map_err(write_err)?;
            let mut writer = BufWriter::new(file);
            for record in &self.records {
                writeln!(writer, "{}", record.to_line()).map_err(write_err)?;
            }
            writer.flush().map_err(write_err)?;
        }
        fs::rename(&temp_path, path).map_err(write_err)?;

        debug!("已写入校验和清单: {} 条记录 -> {:?}", self.records.len(), path);
        Ok(())
    }
}
