//! Configuration file parsing for `lucid.toml`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{SchemaError, SchemaResult};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "lucid.toml";

/// Main configuration structure for `lucid.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LucidConfig {
    /// Table naming.
    #[serde(default)]
    pub tables: TableConfig,

    /// Migration settings.
    #[serde(default)]
    pub migrations: MigrationSettings,
}

impl LucidConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SchemaError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> SchemaResult<Self> {
        let expanded = expand_env_vars(content);

        let config: Self =
            toml::from_str(&expanded).map_err(|e| SchemaError::TomlError { source: e })?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> SchemaResult<()> {
        if self.tables.prefix.is_empty() {
            return Err(SchemaError::config("tables.prefix may not be empty"));
        }
        if self.tables.separator.is_empty() {
            return Err(SchemaError::config("tables.separator may not be empty"));
        }
        if self.migrations.max_concurrency == 0 {
            return Err(SchemaError::config(
                "migrations.max_concurrency must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Table naming configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    /// Prefix for every table the engine owns.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Separator joining key segments. Keys may not contain it.
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            separator: default_separator(),
        }
    }
}

fn default_prefix() -> String {
    "ld_".to_string()
}

fn default_separator() -> String {
    "_".to_string()
}

/// Migration execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationSettings {
    /// Maximum DDL operations in flight within one priority batch.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

fn default_max_concurrency() -> usize {
    16
}

/// Expand `${VAR}` references using the process environment.
///
/// Unknown variables are left untouched.
fn expand_env_vars(content: &str) -> String {
    let re = match regex_lite::Regex::new(r"\$\{([^}]+)\}") {
        Ok(re) => re,
        Err(_) => return content.to_string(),
    };

    let mut result = content.to_string();
    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        let full_match = &cap[0];

        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(full_match, &value);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LucidConfig::default();
        assert_eq!(config.tables.prefix, "ld_");
        assert_eq!(config.tables.separator, "_");
        assert_eq!(config.migrations.max_concurrency, 16);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = LucidConfig::parse("").unwrap();
        assert_eq!(config, LucidConfig::default());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [tables]
            prefix = "cms_"
            separator = "__"

            [migrations]
            max_concurrency = 4
        "#;

        let config = LucidConfig::parse(toml).unwrap();
        assert_eq!(config.tables.prefix, "cms_");
        assert_eq!(config.tables.separator, "__");
        assert_eq!(config.migrations.max_concurrency, 4);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = LucidConfig::parse("[tables]\nsuffix = \"x\"\n");
        assert!(matches!(result, Err(SchemaError::TomlError { .. })));
    }

    #[test]
    fn test_empty_separator_rejected() {
        let result = LucidConfig::parse("[tables]\nseparator = \"\"\n");
        assert!(matches!(result, Err(SchemaError::ConfigError { .. })));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[migrations]\nmax_concurrency = 2\n").unwrap();

        let config = LucidConfig::from_file(&path).unwrap();
        assert_eq!(config.migrations.max_concurrency, 2);
    }

    #[test]
    fn test_env_var_expansion() {
        // SAFETY: This test runs single-threaded and we clean up after
        unsafe {
            std::env::set_var("LUCID_TEST_PREFIX", "env_");
        }
        let expanded = expand_env_vars("prefix = \"${LUCID_TEST_PREFIX}\"");
        assert_eq!(expanded, "prefix = \"env_\"");
        unsafe {
            std::env::remove_var("LUCID_TEST_PREFIX");
        }
    }
}
