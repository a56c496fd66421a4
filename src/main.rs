use anyhow::Context;
use backuptools_lib::core::ConsoleProgress;
use backuptools_lib::logging::{LogConfig, RotatingFileWriter};
use backuptools_lib::{run_backup, BackupRequest, BackupSettings};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

/// 有文件复制失败时的退出码
const EXIT_PARTIAL: u8 = 3;

/// Incremental backup of the current directory tree
#[derive(Parser)]
#[command(name = "backup")]
#[command(version)]
#[command(about = "Copy new and changed files into a backup tree")]
#[command(long_about = "Copy new and changed files into a backup tree.\n\n\
SELECTOR: ALL (default) or ALT back up to the configured locations with checksum \
comparison; a path with a drive letter (E:/BACKUP) or an absolute path backs up there; \
/DATE or any other name makes a full copy into a folder under the incremental root.")]
struct Cli {
    /// ALL | ALT | /DATE | <path> | <folder name>
    selector: Option<String>,

    /// Additional directory name to exclude for this run
    exclude_dir: Option<String>,

    /// Directory to back up (default: current directory)
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Directory holding config.json and the log file
    #[arg(long)]
    config_dir: Option<PathBuf>,
}

/// 初始化日志系统，只写文件（标准输出留给进度）
fn init_logging(config_dir: &Path) -> Option<WorkerGuard> {
    let config = LogConfig::load(config_dir);

    if !config.enabled {
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return None;
    }

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(config.tracing_level().into())
        .from_env_lossy();

    let file_writer = match RotatingFileWriter::new(config_dir, config.max_size_mb) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("无法创建日志文件: {}", e);
            return None;
        }
    };
    let (writer, guard) = tracing_appender::non_blocking(file_writer);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false);

    // debug 模式下同时输出到 stderr
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(if cfg!(debug_assertions) {
            LevelFilter::TRACE
        } else {
            LevelFilter::OFF
        });

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);

    Some(guard)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(backuptools_lib::default_config_dir);
    let _ = std::fs::create_dir_all(&config_dir);
    let _guard = init_logging(&config_dir);

    match run(cli, &config_dir) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("备份失败: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config_dir: &Path) -> anyhow::Result<ExitCode> {
    let source = match cli.source {
        Some(path) => path,
        None => std::env::current_dir().context("无法获取当前目录")?,
    };

    let settings = BackupSettings::load(config_dir);
    let request = BackupRequest {
        source,
        selector: cli.selector,
        extra_exclude: cli.exclude_dir,
    };
    let config = request.resolve(&settings, chrono::Local::now().date_naive());

    let mut progress = ConsoleProgress::stdout();
    let report = run_backup(&config, &mut progress)
        .with_context(|| format!("备份到 {} 未完成", config.destination_root.display()))?;

    if report.stats.failed > 0 {
        for failure in &report.failures {
            eprintln!("Failed: {} ({})", failure.relative_path, failure.reason);
        }
        return Ok(ExitCode::from(EXIT_PARTIAL));
    }

    Ok(ExitCode::SUCCESS)
}
