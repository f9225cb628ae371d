//! Configuration loading for govscan.
//!
//! Resolves an [`EngineConfig`](govscan_core::EngineConfig) from defaults, an
//! optional TOML file, a `.env` file and the process environment, in that
//! order of increasing precedence. Invalid values fail the load; questionable
//! but usable ones come back as [`ConfigWarnings`].

pub mod loader;
pub mod sources;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigMetadata};
pub use sources::{EnvConfig, FileConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
