//! CLI commands

pub mod apply;
pub mod checkpoint;
pub mod format;
pub mod show;

pub use apply::{ApplyCommand, ApplyOptions};
pub use checkpoint::CheckpointCommand;
pub use format::FormatCommand;
pub use show::{ShowCommand, ShowOptions};

use std::io::{self, Write};

/// Where engine logs go: stderr, or nowhere in quiet mode.
pub fn log_writer(quiet: bool) -> Box<dyn Write + Send> {
    if quiet {
        Box::new(io::sink())
    } else {
        Box::new(io::stderr())
    }
}
