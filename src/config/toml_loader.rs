//! TOML overlay parsing for the configuration state.
use std::path::Path;

use crate::error::ConfigError;

use super::state::{ConfigurationState, Entry};

/// Load a state overlay from a TOML file.
///
/// A missing file yields an empty overlay. Each top-level key is a group:
///
/// ```toml
/// kernel_params = ["quiet", "loglevel=3"]   # scalar group
///
/// [journald]                                # pair group, order preserved
/// SystemMaxUse = "200M"
/// Compress = true
/// ```
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid TOML, or a group
/// has an unsupported shape.
pub fn load(path: &Path) -> Result<ConfigurationState, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ConfigurationState::new());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };
    parse_from_str(&content, &path.display().to_string())
}

/// Parse an overlay from TOML text. `file` is used in error messages.
///
/// # Errors
///
/// Returns an error if the text is not valid TOML or a group has an
/// unsupported shape.
///
/// # Examples
///
/// ```
/// use syscfg::config::toml_loader::parse_from_str;
///
/// let state = parse_from_str("[system]\nregdom = \"DE\"\n", "inline").unwrap();
/// assert_eq!(state.value("system", "regdom"), Some("DE"));
/// ```
pub fn parse_from_str(content: &str, file: &str) -> Result<ConfigurationState, ConfigError> {
    let table: toml::Table = toml::from_str(content).map_err(|e| ConfigError::InvalidSyntax {
        file: file.to_string(),
        message: e.message().to_string(),
    })?;

    let mut state = ConfigurationState::new();
    for (group, value) in table {
        let entries = match value {
            toml::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    toml::Value::String(s) => Ok(Entry::Scalar(s)),
                    other => Err(invalid(
                        file,
                        &group,
                        &format!("array items must be strings, found {}", other.type_str()),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?,
            toml::Value::Table(pairs) => pairs
                .into_iter()
                .map(|(key, v)| match scalar_to_string(&v) {
                    Some(s) => Ok(Entry::Pair(key, s)),
                    None => Err(invalid(
                        file,
                        &group,
                        &format!(
                            "value for '{key}' must be a string, number or boolean, found {}",
                            v.type_str()
                        ),
                    )),
                })
                .collect::<Result<Vec<_>, _>>()?,
            other => {
                return Err(invalid(
                    file,
                    &group,
                    &format!("expected an array or a table, found {}", other.type_str()),
                ));
            }
        };
        state.set_group(&group, entries);
    }
    Ok(state)
}

fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn invalid(file: &str, group: &str, message: &str) -> ConfigError {
    ConfigError::InvalidGroup {
        file: file.to_string(),
        group: group.to_string(),
        message: message.to_string(),
    }
}
