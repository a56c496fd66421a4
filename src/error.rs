//! 备份错误类型

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// 备份过程中可能出现的错误
#[derive(Error, Debug)]
pub enum BackupError {
    /// 源目录不存在或无法读取
    #[error("源目录不可用: {}: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 目标根目录无法创建
    #[error("目标目录不可用: {}: {source}", .path.display())]
    DestinationUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 计算校验和时读取文件失败
    #[error("计算校验和失败: {}: {source}", .path.display())]
    Hash {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 复制文件失败
    #[error("复制失败: {}: {source}", .path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 设置修改时间失败
    #[error("设置修改时间失败: {}: {source}", .path.display())]
    Timestamp {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 写入校验和清单失败
    #[error("写入校验和清单失败: {}: {source}", .path.display())]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BackupError {
    /// 单个文件的错误只记录为失败，不中止整个备份
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            BackupError::Hash { .. } | BackupError::Copy { .. } | BackupError::Timestamp { .. }
        )
    }

    /// 简短原因（用于进度输出）
    pub fn reason(&self) -> String {
        match self {
            BackupError::Hash { source, .. }
            | BackupError::Copy { source, .. }
            | BackupError::Timestamp { source, .. }
            | BackupError::SourceUnavailable { source, .. }
            | BackupError::DestinationUnavailable { source, .. }
            | BackupError::ManifestWrite { source, .. } => source.to_string(),
            BackupError::Io(e) => e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_file_errors() {
        let err = BackupError::Copy {
            path: PathBuf::from("a/b.txt"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.is_per_file());
        assert_eq!(err.reason(), "denied");
        assert!(err.to_string().contains("a/b.txt"));

        let fatal = BackupError::ManifestWrite {
            path: PathBuf::from(".checksums"),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        };
        assert!(!fatal.is_per_file());
    }
}
