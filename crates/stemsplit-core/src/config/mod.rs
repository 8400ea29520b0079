//! Configuration file handling
//!
//! YAML load/save helpers and the platform locations of the config file and
//! the model cache.
//!
//! ```ignore
//! use stemsplit_core::config::{default_config_path, load_separation_config};
//!
//! let config = load_separation_config(default_config_path().as_deref());
//! ```

mod io;
mod paths;

pub use io::{load_config, load_separation_config, save_config};
pub use paths::{default_cache_dir, default_config_path, APP_DIR};
