//! # hubcast-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`HubcastSettings::default()`]
//! 2. **Settings file** — `~/.hubcast/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables** — `HUBCAST_*` overrides (highest priority)

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
