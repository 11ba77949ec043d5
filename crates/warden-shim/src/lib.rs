//! The supervising shim installed next to every supervised process.
//!
//! `install`/`uninstall` register the staged unit with systemd. Pipe mode runs
//! the user process, captures its output into rotated log files, and reports
//! unplanned exits to the agent's failure listener.

pub mod cli;
pub mod pipe;
pub mod staging;

pub use cli::{ShimCli, ShimCommand};
pub use pipe::{report_failure, run_pipe, PipeConfig, DEFAULT_STOP_GRACE};
pub use staging::{resolve_process_dir, run_install, run_uninstall};
