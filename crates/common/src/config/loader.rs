//! # Configuration Loader
//!
//! Figment-based configuration loading with layered support:
//! 1. Compiled defaults
//! 2. Configuration file (TOML)
//! 3. Environment variable overrides
//!
//! Supports automatic environment variable mapping with prefixes.

use crate::error::ConfigurationError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default configuration file name
const DEFAULT_CONFIG_FILE: &str = "persistence.toml";

/// Environment variable prefix
pub const DEFAULT_ENV_PREFIX: &str = "PERSISTENCE";

/// Load configuration with layered approach
///
/// # Configuration Layer Priority (highest to lowest)
/// 1. Environment variables (PERSISTENCE_*)
/// 2. Configuration file (persistence.toml or PERSISTENCE_CONFIG_PATH)
/// 3. Compiled defaults
///
/// # Environment Variable Mapping
/// - Nested fields use double underscore: `PERSISTENCE_OPTIONS__MAX_PAGE_SIZE`
/// - Case insensitive matching
///
/// # Example
/// ```rust,no_run
/// use common::config::loader::load_config;
/// use common::config::PersistenceConfig;
///
/// let config: PersistenceConfig = load_config().unwrap();
/// ```
pub fn load_config<T>() -> Result<T, ConfigurationError>
where
    T: Default + DeserializeOwned + serde::Serialize,
{
    load_config_with_options::<T>(LoadOptions::default())
}

/// Load configuration from specific file, with environment overrides
pub fn load_from_file<T>(path: &Path) -> Result<T, ConfigurationError>
where
    T: Default + DeserializeOwned + serde::Serialize,
{
    let options = LoadOptions {
        config_path: Some(path.to_path_buf()),
        env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        require_file: true,
    };
    load_config_with_options::<T>(options)
}

/// Configuration loading options
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Optional path to configuration file
    pub config_path: Option<PathBuf>,
    /// Environment variable prefix
    pub env_prefix: String,
    /// Whether configuration file is required
    pub require_file: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            require_file: false,
        }
    }
}

/// Load configuration with custom options
pub fn load_config_with_options<T>(options: LoadOptions) -> Result<T, ConfigurationError>
where
    T: Default + DeserializeOwned + serde::Serialize,
{
    debug!("Loading configuration with options: {:?}", options);

    let mut figment = Figment::new().merge(Serialized::defaults(T::default()));

    let config_path = determine_config_path(options.config_path, &options.env_prefix)?;

    if let Some(path) = &config_path {
        if path.exists() {
            info!("Loading configuration from file: {}", path.display());
            figment = figment.merge(toml_provider(path)?);
        } else if options.require_file {
            return Err(ConfigurationError::FileNotFound {
                path: path.display().to_string(),
            });
        } else {
            warn!(
                "Configuration file not found: {} (using defaults)",
                path.display()
            );
        }
    }

    figment = figment.merge(env_provider(&options.env_prefix));

    let config: T = figment
        .extract()
        .map_err(|err| ConfigurationError::ParseError {
            details: format!("Failed to parse configuration: {err}"),
        })?;

    debug!(
        "Configuration loaded from {} sources",
        figment.metadata().count()
    );

    Ok(config)
}

fn env_provider(prefix: &str) -> Env {
    Env::prefixed(&format!("{prefix}_"))
        .split("__")
        .ignore(&["CONFIG_PATH"])
}

/// Explicit path, then `<PREFIX>_CONFIG_PATH`, then `persistence.toml` in the
/// working directory
fn determine_config_path(
    override_path: Option<PathBuf>,
    prefix: &str,
) -> Result<Option<PathBuf>, ConfigurationError> {
    if let Some(path) = override_path {
        return Ok(Some(path));
    }

    let path_var = format!("{prefix}_CONFIG_PATH");
    if let Ok(env_path) = std::env::var(&path_var) {
        debug!("Using config path from {path_var}: {env_path}");
        return Ok(Some(PathBuf::from(env_path)));
    }

    let local = std::env::current_dir()
        .map_err(|e| ConfigurationError::EnvironmentError {
            var: "current_dir".to_string(),
            details: e.to_string(),
        })?
        .join(DEFAULT_CONFIG_FILE);

    Ok(local.exists().then_some(local))
}

/// Persistence configuration is TOML only
fn toml_provider(path: &Path) -> Result<figment::providers::Data<Toml>, ConfigurationError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        None => Ok(Toml::file(path)),
        Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Toml::file(path)),
        Some(ext) => Err(ConfigurationError::ParseError {
            details: format!("Unsupported configuration file format: {ext} (expected toml)"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersistenceConfig;
    use serial_test::serial;
    use std::env;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn clear_env(prefix: &str) {
        for (key, _) in env::vars() {
            if key.starts_with(&format!("{prefix}_")) {
                env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn test_load_default_config() {
        let prefix = "TEST_DEFAULTS";
        clear_env(prefix);

        let options = LoadOptions {
            config_path: Some(PathBuf::from("/non/existent/persistence.toml")),
            env_prefix: prefix.to_string(),
            require_file: false,
        };

        let config: PersistenceConfig = load_config_with_options(options).unwrap();
        assert_eq!(config, PersistenceConfig::default());
    }

    #[test]
    #[serial]
    fn test_load_from_toml_file() {
        clear_env(DEFAULT_ENV_PREFIX);

        let toml_content = r#"
            table = "dummies"

            [connection]
            host = "localhost"
            port = 5432
            database = "test"

            [credential]
            username = "postgres"
            password = "postgres"

            [options]
            max_page_size = 25
        "#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config: PersistenceConfig = load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.table_name(), Some("dummies"));
        assert_eq!(config.options.max_page_size, 25);
        assert_eq!(config.options.max_pool_size, 2);

        let connection = config.connection.unwrap();
        assert_eq!(connection.host(), Some("localhost"));
        assert_eq!(connection.port(), Some(5432));
        assert_eq!(
            config.credential.unwrap().username(),
            Some("postgres")
        );
    }

    #[test]
    #[serial]
    fn test_env_var_overrides() {
        let prefix = "TEST_ENV_VAR";
        clear_env(prefix);
        env::set_var(format!("{prefix}_TABLE"), "from_env");
        env::set_var(format!("{prefix}_OPTIONS__MAX_PAGE_SIZE"), "7");
        env::set_var(format!("{prefix}_CONNECTION__URI"), "postgres://u:p@db:5432/app");

        let options = LoadOptions {
            config_path: Some(PathBuf::from("/non/existent/persistence.toml")),
            env_prefix: prefix.to_string(),
            require_file: false,
        };

        let config: PersistenceConfig = load_config_with_options(options).unwrap();
        assert_eq!(config.table_name(), Some("from_env"));
        assert_eq!(config.options.max_page_size, 7);
        assert_eq!(
            config.connection.unwrap().uri(),
            Some("postgres://u:p@db:5432/app")
        );

        clear_env(prefix);
    }

    #[test]
    fn test_file_not_found_when_required() {
        let non_existent_path = PathBuf::from("/non/existent/persistence.toml");
        let result: Result<PersistenceConfig, _> = load_from_file(&non_existent_path);

        match result.unwrap_err() {
            ConfigurationError::FileNotFound { path } => {
                assert_eq!(path, "/non/existent/persistence.toml");
            }
            other => panic!("Expected FileNotFound error, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_format() {
        let temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        let result: Result<PersistenceConfig, _> = load_from_file(temp_file.path());
        assert!(matches!(result, Err(ConfigurationError::ParseError { .. })));
    }

    #[test]
    #[serial]
    fn test_config_path_lookup_order() {
        let prefix = "TEST_PATH";
        clear_env(prefix);

        let explicit = PathBuf::from("/explicit/persistence.toml");
        env::set_var(format!("{prefix}_CONFIG_PATH"), "/from/env.toml");
        assert_eq!(
            determine_config_path(Some(explicit.clone()), prefix).unwrap(),
            Some(explicit)
        );
        assert_eq!(
            determine_config_path(None, prefix).unwrap(),
            Some(PathBuf::from("/from/env.toml"))
        );

        clear_env(prefix);
    }
}
