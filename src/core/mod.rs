pub mod engine;
pub mod hasher;
pub mod manifest;
pub mod progress;
pub mod scanner;

pub use engine::{FailedFile, FileAction, RunStats, SyncEngine, SyncReport};
pub use hasher::{fingerprint, Fingerprint};
pub use manifest::{Manifest, ManifestRecord, ManifestWriter, MANIFEST_FILE};
pub use progress::{ConsoleProgress, NoProgress, ProgressSink};
pub use scanner::{FileEntry, FileScanner, ScanResult};
