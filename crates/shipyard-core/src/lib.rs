//! shipyard-core: shared model for the Shipyard installer.
//!
//! Holds the release and persistence types loaded from an install
//! definition, the user configuration layered on top of it, and the
//! [`RunContext`] that every component receives explicitly instead of
//! reading process-wide settings.

pub mod config;
pub mod context;
pub mod error;
pub mod quantity;
pub mod types;

pub use config::{InstallDefinition, InstallMeta, UserConfig};
pub use context::{RunContext, WaitPolicy};
pub use error::{ConfigError, ConfigResult};
pub use quantity::Quantity;
pub use types::*;
