//! Hierarchical keyed configuration (§6). Every other crate's
//! `initStats`/`init`-equivalent pulls its parameters out of a shared
//! [`Config`] with dotted string paths (`sys.caches.l2.size`); in strict
//! mode, any key present in the file but never read is a fatal
//! configuration error at close time (§7).

pub mod config;
pub mod error;
pub mod value;

pub use config::Config;
pub use error::ConfigError;
pub use value::FromConfigValue;
