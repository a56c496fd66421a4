pub mod backup;

pub use backup::{run_backup, BackupRequest};
