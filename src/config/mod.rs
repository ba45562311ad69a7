//! Configuration module for the layout engine.
//!
//! Settings are injected into the engine as explicit values rather than
//! read from ambient globals. Files may be TOML or YAML.

mod loader;
mod path;
mod schema;

pub use loader::{
    ConfigFormat, load_settings, load_settings_from_str, load_settings_or_default, save_settings,
};
pub use path::{default_config_path, default_state_path, home_dir, resolve_path};
pub use schema::{CaptureConfig, MAX_ATTEMPTS_LIMIT, Settings, TimingConfig, ToleranceConfig};
