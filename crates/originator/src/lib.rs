//! Path builder and dial protocol (§4.5).

mod dial;
mod path;

pub use dial::onion_dial;
pub use path::{build_default_path, build_path};
