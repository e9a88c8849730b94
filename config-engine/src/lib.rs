//! Configuration management for the Learnmap engine
//!
//! Configuration is layered, later sources winning:
//!
//! - **Defaults**: [`EngineConfig::default`]
//! - **YAML file**: optional, usually `learnmap.yaml`
//! - **Environment**: `LEARNMAP_<SECTION>__<KEY>`, e.g.
//!   `LEARNMAP_AUTHZ__LOOKUP_TIMEOUT_MS=500`
//!
//! The merged result is validated before it is handed out.
//!
//! # Example
//!
//! ```rust,no_run
//! use config_engine::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .with_file("learnmap.yaml")
//!     .load()?;
//! println!("traversal deadline: {:?}", config.authz.lookup_timeout());
//! # Ok::<(), config_engine::ConfigError>(())
//! ```

pub mod engine;
pub mod error;
pub mod validation;

pub use engine::*;
pub use error::*;
