//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `compose` - Compose the image layer
//! - `export` - Export the layer into a guest rootfs
//! - `verify` - Verify an exported rootfs
//! - `preflight` - Run preflight checks
//! - `show` - Display information
//! - `clean` - Remove composition outputs

mod clean;
mod compose;
mod export;
mod preflight;
pub mod show;
mod verify;

pub use clean::cmd_clean;
pub use compose::cmd_compose;
pub use export::{cmd_export, resolve_layer};
pub use preflight::cmd_preflight;
pub use show::cmd_show;
pub use verify::cmd_verify;
