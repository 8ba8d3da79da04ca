//! Layered settings for synchronization runs
//!
//! Settings are loaded and merged from these sources (later sources override
//! earlier ones):
//!
//! 1. **Global defaults** - `<config_dir>/cfgsync/config.toml`
//! 2. **Project config** - `<root>/cfgsync.toml`
//! 3. **Local overrides** - `<root>/cfgsync.local.toml`
//!
//! Tables are merged key by key; any other value (arrays included) replaces
//! the one below it.
//!
//! # Example
//!
//! ```ignore
//! use cfgsync_core::config::SettingsResolver;
//!
//! let settings = SettingsResolver::new("/path/to/site").resolve()?;
//! println!("Exporting into {}", settings.sync.subdir);
//! ```

mod resolver;
mod settings;

pub use resolver::{GLOBAL_DIR_NAME, LOCAL_FILE, PROJECT_FILE, SettingsResolver};
pub use settings::{NormalizeSection, SiteSection, SyncSection, SyncSettings, WithDependencies};
