use toml::{Table, Value};

use crate::config::Config;
use crate::error::ConfigError;

/// Deep-merge `overlay_toml` over `base`.
///
/// Tables merge key by key; any other value, arrays included, replaces the
/// base value outright.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    merge_layer(base, overlay_toml, "overlay")
}

pub(crate) fn merge_layer(base: &Config, text: &str, origin: &str) -> Result<Config, ConfigError> {
    let overlay: Table = text.parse().map_err(|e| ConfigError::parse(origin, e))?;
    let Value::Table(mut merged) =
        Value::try_from(base).map_err(|e| ConfigError::parse("defaults", e))?
    else {
        return Err(ConfigError::parse("defaults", "config did not serialize to a table"));
    };
    overlay_table(&mut merged, overlay);
    Value::Table(merged)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::parse(origin, e))
}

fn overlay_table(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(inner)), Value::Table(patch)) => overlay_table(inner, patch),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
