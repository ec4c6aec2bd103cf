//! Operating system collaborators of the client.
//!
//! - `fs` - Directory and file helpers for preparing volume paths
//! - `process` - PID, clock, process naming, and PID files
//!
//! Only Unix targets are supported: the control socket is a Unix domain
//! socket.

pub mod fs;
pub mod process;

pub use fs::{create_dir, dir_exists, file_type, list_dir, remove_dir, remove_file, subfolders, FileType};
pub use process::{current_pid, current_time_ms, host_name, process_name, set_process_name, PidFile};
