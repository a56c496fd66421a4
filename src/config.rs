//! 应用配置模块

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// 配置文件名
pub const CONFIG_FILE: &str = "config.json";

/// 备份设置（config.json 中的 "backup" 段）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSettings {
    /// 默认备份位置（ALL / 无参数）
    #[serde(default = "default_destination")]
    pub default_destination: PathBuf,
    /// 备用备份位置（ALT）
    #[serde(default = "default_alternate_destination")]
    pub alternate_destination: PathBuf,
    /// 全量备份根目录（/DATE 或自定义名称）
    #[serde(default = "default_incremental_root")]
    pub incremental_root: PathBuf,
    /// 仅备份的扩展名（空表示全部）
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// 排除的目录名
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
}

fn default_destination() -> PathBuf {
    PathBuf::from("E:/BCKUP/FINAL_BACKUP")
}

fn default_alternate_destination() -> PathBuf {
    PathBuf::from("G:/MY/FINAL")
}

fn default_incremental_root() -> PathBuf {
    PathBuf::from("E:/BCKUP/FINAL_DATED")
}

fn default_allowed_extensions() -> Vec<String> {
    [
        "htaccess", "bat", "png", "jpg", "jpeg", "ttf", "otf", "svg", "gif", "webp", "zip", "exe",
        "mov", "mp4", "bin", "m", "pdf", "psd", "php", "db", "code", "htm", "html", "txt", "srt",
        "xml", "yml", "xls", "xlsx", "js", "css", "sh", "me", "md", "doc", "ini", "rdf", "conf",
        "cfg", "java", "json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_excluded_dirs() -> Vec<String> {
    [
        "MathJax-master",
        "SOURCES",
        "SOURCES_CATEGORIZED",
        "!RELEASE_CLEAN",
        "!RELEASE_MIRROR",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            default_destination: default_destination(),
            alternate_destination: default_alternate_destination(),
            incremental_root: default_incremental_root(),
            allowed_extensions: default_allowed_extensions(),
            excluded_dirs: default_excluded_dirs(),
        }
    }
}

impl BackupSettings {
    /// 从配置文件加载备份设置
    pub fn load(config_dir: &Path) -> Self {
        read_section(config_dir, "backup").unwrap_or_default()
    }

    /// 保存备份设置
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        write_section(config_dir, "backup", self)
    }
}

/// 读取 config.json 中的某一段，缺失或格式错误时返回 None
pub(crate) fn read_section<T: serde::de::DeserializeOwned>(
    config_dir: &Path,
    key: &str,
) -> Option<T> {
    let content = fs::read_to_string(config_dir.join(CONFIG_FILE)).ok()?;
    let mut config = serde_json::from_str::<serde_json::Value>(&content).ok()?;
    let section = config.get_mut(key)?.take();
    serde_json::from_value(section).ok()
}

/// 更新 config.json 中的某一段，保留其他段
pub(crate) fn write_section<T: Serialize>(config_dir: &Path, key: &str, value: &T) -> io::Result<()> {
    let config_file = config_dir.join(CONFIG_FILE);

    let mut config: serde_json::Value = match fs::read_to_string(&config_file) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({})),
        Err(e) if e.kind() == io::ErrorKind::NotFound => serde_json::json!({}),
        Err(e) => return Err(e),
    };
    if !config.is_object() {
        config = serde_json::json!({});
    }

    config[key] = serde_json::to_value(value).map_err(io::Error::other)?;

    let content = serde_json::to_string_pretty(&config).map_err(io::Error::other)?;
    fs::create_dir_all(config_dir)?;
    fs::write(&config_file, content)
}

/// 备份目标模式（由命令行第一个参数决定）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationMode {
    /// 默认位置
    Default,
    /// 备用位置
    Alternate,
    /// 以日期命名的全量备份目录
    DatedIncremental(NaiveDate),
    /// 自定义名称的全量备份目录
    NamedIncremental(String),
    /// 命令行直接指定的路径
    Explicit(PathBuf),
}

impl DestinationMode {
    /// 解析目标选择参数
    pub fn parse(selector: Option<&str>, today: NaiveDate) -> Self {
        let Some(raw) = selector else {
            return Self::Default;
        };
        let lower = raw.to_lowercase();

        match lower.as_str() {
            "all" => Self::Default,
            "alt" => Self::Alternate,
            "/date" => Self::DatedIncremental(today),
            _ if raw.contains(':') || Path::new(raw).is_absolute() => {
                Self::Explicit(PathBuf::from(raw))
            }
            _ => Self::NamedIncremental(raw.to_string()),
        }
    }

    /// 是否启用校验和比较（全量备份目录每次完整复制）
    pub fn change_detection(&self) -> bool {
        !matches!(
            self,
            Self::DatedIncremental(_) | Self::NamedIncremental(_)
        )
    }

    /// 解析为实际的目标路径
    pub fn destination(&self, settings: &BackupSettings) -> PathBuf {
        match self {
            Self::Default => settings.default_destination.clone(),
            Self::Alternate => settings.alternate_destination.clone(),
            Self::DatedIncremental(date) => settings
                .incremental_root
                .join(date.format("%Y.%m.%d").to_string()),
            Self::NamedIncremental(name) => settings.incremental_root.join(name),
            Self::Explicit(path) => path.clone(),
        }
    }
}

/// 单次备份的完整配置，解析后不再修改
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub source_root: PathBuf,
    pub destination_root: PathBuf,
    pub change_detection: bool,
    pub excluded_dirs: BTreeSet<String>,
    /// 小写，不带点
    pub allowed_extensions: BTreeSet<String>,
}

impl BackupConfig {
    pub fn resolve(
        source_root: PathBuf,
        mode: &DestinationMode,
        settings: &BackupSettings,
        extra_exclude: Option<&str>,
    ) -> Self {
        let mut excluded_dirs: BTreeSet<String> = settings.excluded_dirs.iter().cloned().collect();
        if let Some(dir) = extra_exclude.filter(|d| !d.is_empty()) {
            excluded_dirs.insert(dir.to_string());
        }

        let allowed_extensions = settings
            .allowed_extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Self {
            source_root,
            destination_root: mode.destination(settings),
            change_detection: mode.change_detection(),
            excluded_dirs,
            allowed_extensions,
        }
    }

    /// 目标目录中的清单文件路径
    pub fn manifest_path(&self) -> PathBuf {
        self.destination_root
            .join(crate::core::manifest::MANIFEST_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 5, 8).unwrap()
    }

    #[test]
    fn test_parse_selector() {
        assert_eq!(DestinationMode::parse(None, today()), DestinationMode::Default);
        assert_eq!(DestinationMode::parse(Some("ALL"), today()), DestinationMode::Default);
        assert_eq!(DestinationMode::parse(Some("Alt"), today()), DestinationMode::Alternate);
        assert_eq!(
            DestinationMode::parse(Some("/DATE"), today()),
            DestinationMode::DatedIncremental(today())
        );
        assert_eq!(
            DestinationMode::parse(Some("E:/BACKUP"), today()),
            DestinationMode::Explicit(PathBuf::from("E:/BACKUP"))
        );
        // 空名称即全量备份根目录
        assert_eq!(
            DestinationMode::parse(Some(""), today()),
            DestinationMode::NamedIncremental(String::new())
        );
        assert_eq!(
            DestinationMode::parse(Some("Snapshot_A"), today()),
            DestinationMode::NamedIncremental("Snapshot_A".to_string())
        );
    }

    #[test]
    fn test_change_detection_per_mode() {
        assert!(DestinationMode::Default.change_detection());
        assert!(DestinationMode::Alternate.change_detection());
        assert!(DestinationMode::Explicit(PathBuf::from("X:/b")).change_detection());
        assert!(!DestinationMode::DatedIncremental(today()).change_detection());
        assert!(!DestinationMode::NamedIncremental("n".into()).change_detection());
    }

    #[test]
    fn test_destination_paths() {
        let settings = BackupSettings {
            incremental_root: PathBuf::from("/backups/dated"),
            ..Default::default()
        };
        assert_eq!(
            DestinationMode::DatedIncremental(today()).destination(&settings),
            PathBuf::from("/backups/dated/2021.05.08")
        );
        assert_eq!(
            DestinationMode::NamedIncremental("weekly".into()).destination(&settings),
            PathBuf::from("/backups/dated/weekly")
        );
    }

    #[test]
    fn test_resolve_config() {
        let settings = BackupSettings {
            allowed_extensions: vec!["TXT".into(), ".png".into(), " ".into()],
            ..Default::default()
        };
        let config = BackupConfig::resolve(
            PathBuf::from("/src"),
            &DestinationMode::Default,
            &settings,
            Some("node_modules"),
        );
        assert!(config.change_detection);
        assert!(config.excluded_dirs.contains("node_modules"));
        assert!(config.excluded_dirs.contains("SOURCES"));
        assert_eq!(
            config.allowed_extensions.iter().cloned().collect::<Vec<_>>(),
            vec!["png".to_string(), "txt".to_string()]
        );
        assert!(config.manifest_path().ends_with(".checksums"));
    }

    #[test]
    fn test_settings_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            BackupSettings::load(dir.path()).excluded_dirs,
            default_excluded_dirs()
        );

        // 其他段不受影响
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"log":{"level":"debug"},"backup":{"excludedDirs":["target"]}}"#,
        )
        .unwrap();
        let mut settings = BackupSettings::load(dir.path());
        assert_eq!(settings.excluded_dirs, vec!["target".to_string()]);
        assert_eq!(settings.default_destination, default_destination());

        settings.allowed_extensions.clear();
        settings.save(dir.path()).unwrap();

        let reloaded = BackupSettings::load(dir.path());
        assert!(reloaded.allowed_extensions.is_empty());
        let raw = fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(raw.contains("\"level\": \"debug\""));
    }

    #[test]
    fn test_corrupt_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();
        let settings = BackupSettings::load(dir.path());
        assert_eq!(settings.allowed_extensions, default_allowed_extensions());
    }
}
