//! Shared filesystem utilities.

pub mod temp;
pub mod tree;

pub use temp::{cleanup_work_dir, clear_dir, prepare_work_dir};
pub use tree::{copy_tree, CopyStats};
