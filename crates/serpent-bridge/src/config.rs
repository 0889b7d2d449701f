//! Bridge configuration.
//!
//! Configuration comes from defaults, a TOML file, or the environment:
//!
//! ```toml
//! naming = "snake_case"
//! catch_panics = true
//! max_depth = 64
//! ```
//!
//! `SERPENT_CONFIG` names a TOML file to load; `SERPENT_NAMING`
//! (`as_declared` or `snake_case`) overrides the naming style.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{BridgeError, BridgeResult};

/// Environment variable naming a TOML configuration file
pub const CONFIG_ENV: &str = "SERPENT_CONFIG";

/// Environment variable overriding the naming style
pub const NAMING_ENV: &str = "SERPENT_NAMING";

/// How native names are exported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingStyle {
    /// Export names exactly as registered
    #[default]
    AsDeclared,
    /// Export `FunctionReturnInt` as `function_return_int`
    SnakeCase,
}

impl NamingStyle {
    /// Parse `as_declared` / `snake_case`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "as_declared" => Some(NamingStyle::AsDeclared),
            "snake_case" => Some(NamingStyle::SnakeCase),
            _ => None,
        }
    }

    /// Exported form of `name`
    pub fn apply(&self, name: &str) -> SmolStr {
        match self {
            NamingStyle::AsDeclared => SmolStr::new(name),
            NamingStyle::SnakeCase => SmolStr::new(to_snake_case(name)),
        }
    }
}

/// Convert `CamelCase` to `snake_case`.
///
/// A boundary is placed before an uppercase letter that follows a lowercase
/// letter or digit, and before the last capital of an acronym that starts
/// a new word (`HTTPServer` -> `http_server`).
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                let next_is_lower = chars.get(i + 1).map_or(false, |n| n.is_lowercase());
                let boundary = prev.is_lowercase()
                    || prev.is_ascii_digit()
                    || (prev.is_uppercase() && next_is_lower);
                if boundary && prev != '_' {
                    out.push('_');
                }
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Nesting limit used when no configuration says otherwise
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Configuration for a native module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// Naming style for exported functions, classes members and parameters
    pub naming: NamingStyle,

    /// Convert panics escaping native code into native errors
    pub catch_panics: bool,

    /// Deepest container nesting accepted in a function or method argument
    pub max_depth: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            naming: NamingStyle::AsDeclared,
            catch_panics: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl BridgeConfig {
    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> BridgeResult<Self> {
        toml::from_str(text).map_err(|e| BridgeError::config(e.to_string()))
    }

    /// Load from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> BridgeResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| BridgeError::config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Build from `SERPENT_CONFIG` and `SERPENT_NAMING`
    pub fn from_env() -> BridgeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an environment-like lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> BridgeResult<Self> {
        let mut config = match lookup(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(path)?,
            _ => Self::default(),
        };
        if let Some(naming) = lookup(NAMING_ENV) {
            config.naming = NamingStyle::parse(&naming).ok_or_else(|| {
                BridgeError::config(format!(
                    "{} must be 'as_declared' or 'snake_case', got '{}'",
                    NAMING_ENV, naming
                ))
            })?;
        }
        Ok(config)
    }

    /// Serialize to TOML text
    pub fn to_toml_string(&self) -> BridgeResult<String> {
        toml::to_string_pretty(self).map_err(|e| BridgeError::config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("FunctionReturnInt"), "function_return_int");
        assert_eq!(to_snake_case("GetValue"), "get_value");
        assert_eq!(to_snake_case("HTTPServer"), "http_server");
        assert_eq!(to_snake_case("FunctionReturnInt8"), "function_return_int8");
        assert_eq!(to_snake_case("NewExportedType"), "new_exported_type");
        assert_eq!(to_snake_case("arg1"), "arg1");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("Int8Value"), "int8_value");
        assert_eq!(to_snake_case("ID"), "id");
    }

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.naming, NamingStyle::AsDeclared);
        assert!(config.catch_panics);
        assert_eq!(config.max_depth, 64);
    }

    #[test]
    fn test_from_toml() {
        let config = BridgeConfig::from_toml_str("naming = \"snake_case\"\nmax_depth = 8\n").unwrap();
        assert_eq!(config.naming, NamingStyle::SnakeCase);
        assert_eq!(config.max_depth, 8);
        assert!(config.catch_panics);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = BridgeConfig::from_toml_str("naming = \"kebab\"").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
        assert!(BridgeConfig::from_toml_str("unknown_key = 1").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = BridgeConfig {
            naming: NamingStyle::SnakeCase,
            catch_panics: false,
            max_depth: 3,
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(BridgeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_from_lookup() {
        let config = BridgeConfig::from_lookup(|key| match key {
            NAMING_ENV => Some("snake_case".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.naming, NamingStyle::SnakeCase);

        let err = BridgeConfig::from_lookup(|key| match key {
            NAMING_ENV => Some("shouting".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("SERPENT_NAMING"));

        let missing = BridgeConfig::from_lookup(|key| match key {
            CONFIG_ENV => Some("/nonexistent/serpent.toml".to_string()),
            _ => None,
        });
        assert!(missing.is_err());
    }
}
