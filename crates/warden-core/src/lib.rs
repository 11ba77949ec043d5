//! Foundational low-level utilities shared across Warden crates.
//!
//! Provides atomic file writes, time helpers, size-based log rotation, the
//! agent directory layout, and the filesystem and command-execution
//! capabilities the supervisor is written against.

pub mod atomic_io;
pub mod command_runner;
pub mod directories;
pub mod file_system;
pub mod log_rotation;
pub mod time_utils;

pub use atomic_io::{write_bytes_atomic, write_text_atomic};
pub use command_runner::{CommandOutput, CommandRunner, ExecCommandRunner};
pub use directories::{AgentDirectories, DEFAULT_BASE_DIR};
pub use file_system::{FileSystem, OsFileSystem};
pub use log_rotation::{
    append_line_with_rotation, rotated_backup_path, LogRotationPolicy,
    LOG_ROTATION_MAX_BYTES_ENV, LOG_ROTATION_MAX_FILES_ENV,
};
pub use time_utils::current_unix_timestamp_ms;

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;

    #[test]
    fn unit_current_unix_timestamp_ms_is_monotonic_enough() {
        let first = current_unix_timestamp_ms();
        let second = current_unix_timestamp_ms();
        assert!(first > 1_600_000_000_000);
        assert!(second >= first);
    }

    #[test]
    fn functional_write_text_atomic_writes_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("nested/sample.txt");
        write_text_atomic(&path, "hello world").expect("write");
        let contents = read_to_string(&path).expect("read");
        assert_eq!(contents, "hello world");
    }

    #[test]
    fn regression_write_text_atomic_rejects_directory_destination() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let error = write_text_atomic(tempdir.path(), "x").expect_err("directory target");
        assert!(error.to_string().contains("is a directory"));
    }
}
