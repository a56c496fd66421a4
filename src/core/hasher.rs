//! 文件指纹 - 用于检测内容变化

use crate::error::{BackupError, Result};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// 文件内容指纹（CRC32，8 位十六进制）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u32);

impl Fingerprint {
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(crc32fast::hash(data))
    }

    pub fn to_hex(&self) -> String {
        format!("{:08x}", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// 计算文件的指纹（流式读取，不把整个文件载入内存）
pub fn fingerprint(path: &Path) -> Result<Fingerprint> {
    let hash_err = |source| BackupError::Hash {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(hash_err)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buffer = vec![0u8; 64 * 1024]; // 64KB

    loop {
        let bytes_read = file.read(&mut buffer).map_err(hash_err)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Fingerprint(hasher.finalize()))
}
