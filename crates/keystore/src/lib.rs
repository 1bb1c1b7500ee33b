//! Node identity persistence (§4.8).

mod identity;
mod paths;

pub use identity::{load, load_or_generate, save, KeystoreError, Result};
pub use paths::{default_config_dir, default_keystore_dir};
