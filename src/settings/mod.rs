//! Configuration tree and typed settings.
//!
//! Configuration is a JSON value tree loaded from TOML or JSON, addressed
//! with `:`-separated section paths (`"netfusion:rabbitMQ"`). Keys match
//! case-insensitively. Environment variables named `NETFUSION__a__b`
//! override `netfusion:a:b`.

mod configuration;

pub use configuration::{Configuration, ENV_PREFIX};

use serde::de::DeserializeOwned;

/// A typed settings section.
///
/// A missing section yields `Default::default()`; a section that does not
/// deserialize or fails `validate` is a `SettingsError`.
pub trait Settings: DeserializeOwned + Default {
    const SECTION: &'static str;

    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
