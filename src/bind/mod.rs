//! Bind file handling: phantom detection and rebinding.
//!
//! - [`scrubber`] - read-only scan of the host's `binds.cfg` for keys still bound
//!   to one of the action identifiers
//! - [`applier`] - unbind/bind command building and the private cfg script

pub mod applier;
pub mod scrubber;

pub use applier::{
    build_unbind_all, load_config_file, parse_config, render_config, write_config_file,
    ApplyError, BindApplier, ParsedConfig, CONFIG_FILE_NAME,
};
pub use scrubber::{scan, scan_file, unbind_command, PhantomKeys};

/// File name of the host-maintained bind file inside `<data-dir>/cfg`.
pub const BINDS_FILE_NAME: &str = "binds.cfg";
