//! keyward core - shared building blocks
//!
//! Error taxonomy, settings, logging setup and the expiring cache used by the
//! authentication crates.

pub mod cache;
pub mod error;
pub mod logging;
pub mod settings;

pub use cache::ExpiringCache;
pub use error::{KeywardError, KeywardResult};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use settings::{AuthSettings, ServerSettings, Settings, TokenSettings};

// Re-export commonly used external types
pub use tracing;
