//! 进度输出
//!
//! 控制台输出格式：
//! ```text
//! 2021.05.08. 10:00:00: Processing ...
//! 2021.05.08. 10:00:01: Found 952 file(s)
//! 2021.05.08. 10:00:01: Copying to E:/BCKUP/FINAL_BACKUP...
//!  src/main.rs [UPDATED]
//! [ 42%] src/lib.rs [NEW]
//! 2021.05.08. 10:00:09: Done in 8 s! (NEW FILES: 3, UPDATED: 1)
//! ```

use crate::core::engine::{FileAction, SyncReport};
use std::io::{self, Write};
use std::path::Path;

/// 获取不到终端宽度时使用的默认宽度
pub const DEFAULT_WIDTH: usize = 128;

/// 进度接收者
pub trait ProgressSink {
    /// 扫描开始
    fn started(&mut self) {}

    /// 扫描完成，开始复制
    fn scanned(&mut self, _total: usize, _destination: &Path) {}

    /// 处理完一个文件
    fn file_done(&mut self, _index: usize, _total: usize, _path: &str, _action: &FileAction) {}

    /// 整个运行完成
    fn finished(&mut self, _report: &SyncReport) {}
}

/// 不输出任何内容
#[derive(Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// 控制台进度输出
pub struct ConsoleProgress<W: Write> {
    out: W,
    width: usize,
}

impl ConsoleProgress<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), terminal_width())
    }
}

impl<W: Write> ConsoleProgress<W> {
    pub fn new(out: W, width: usize) -> Self {
        // 太窄时无法排版
        Self {
            out,
            width: width.max(40),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, message: &str) {
        let _ = writeln!(self.out, "{}: {}", timestamp(), message);
        let _ = self.out.flush();
    }
}

impl<W: Write> ProgressSink for ConsoleProgress<W> {
    fn started(&mut self) {
        self.line("Processing ...");
    }

    fn scanned(&mut self, total: usize, destination: &Path) {
        self.line(&format!("Found {} file(s)", total));
        self.line(&format!("Copying to {}...", destination.display()));
    }

    fn file_done(&mut self, index: usize, total: usize, path: &str, action: &FileAction) {
        let tag = action.tag();
        let width = self.width;

        if !matches!(action, FileAction::Skipped) {
            let label = match action {
                FileAction::Failed(reason) => format!("{}: {}", tag, reason),
                _ => tag.to_string(),
            };
            let text = format!(
                "{} [{}]",
                limit_str(path, width.saturating_sub(5 + label.len()).max(10)),
                label
            );
            let _ = writeln!(self.out, "\r {}", pad_right(&text, width - 2));
        }

        let percent = if total == 0 { 100 } else { (100 * index + total / 2) / total };
        let text = format!("{} [{}]", limit_str(path, width - (11 + tag.len())), tag);
        let _ = write!(self.out, "\r[{:>3}%] {}", percent, pad_right(&text, width - 8));
        let _ = self.out.flush();
    }

    fn finished(&mut self, report: &SyncReport) {
        // 清除实时进度行
        let _ = write!(self.out, "\r       {}", pad_right("", self.width - 8));
        let _ = writeln!(self.out);

        let stats = &report.stats;
        let summary = if stats.is_unchanged() {
            " (NO UPDATES)".to_string()
        } else if stats.failed > 0 {
            format!(
                " (NEW FILES: {}, UPDATED: {}, FAILED: {})",
                stats.new, stats.updated, stats.failed
            )
        } else {
            format!(" (NEW FILES: {}, UPDATED: {})", stats.new, stats.updated)
        };

        self.line(&format!(
            "Done in {} s!{}",
            report.elapsed.as_secs(),
            summary
        ));
    }
}

/// 当前终端宽度
pub fn terminal_width() -> usize {
    console::Term::stdout()
        .size_checked()
        .map(|(_, cols)| cols as usize)
        .filter(|&cols| cols > 0)
        .unwrap_or(DEFAULT_WIDTH)
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y.%m.%d. %H:%M:%S").to_string()
}

/// 超长截断，末尾加 ...
fn limit_str(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let keep = limit.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

fn pad_right(s: &str, width: usize) -> String {
    format!("{:<width$}", s, width = width)
}
