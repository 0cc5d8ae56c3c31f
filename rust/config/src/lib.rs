use async_trait::async_trait;
use figment::providers::{Env, Format, Yaml};
use nes_error::{ErrorCodes, NesError};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// # Description
/// A component that can be constructed from its configuration section.
/// Components that need more than plain configuration (e.g. an injected
/// device probe) take a tuple as `T`.
#[async_trait]
pub trait Configurable<T>: Sized {
    async fn try_from_config(config: &T) -> Result<Self, Box<dyn NesError>>;
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error loading config: {0}")]
    Load(#[from] Box<figment::Error>),
}

impl NesError for ConfigError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::InvalidArgument
    }
}

/// # Description
/// Load a root config object from a YAML file, with environment variables
/// taking precedence over values in the file.
/// # Notes
/// Environment variables must carry `env_prefix` and are uppercase. A double
/// underscore separates nesting levels, so `NES_ENCODER_SERVICE__DUMP_PATH`
/// sets `encoder_service.dump_path`. A missing file is not an error; the
/// config is then read from the environment alone.
pub fn load_from_path<T: DeserializeOwned>(path: &str, env_prefix: &str) -> Result<T, ConfigError> {
    // Figment treats single underscores as part of the key, so nesting is
    // expressed with "__" and mapped to "." here.
    let mut f = figment::Figment::from(
        Env::prefixed(env_prefix).map(|k| k.as_str().replace("__", ".").into()),
    );
    if std::path::Path::new(path).exists() {
        f = figment::Figment::from(Yaml::file(path)).merge(f);
    }
    f.extract().map_err(|e| ConfigError::Load(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use serde::Deserialize;
    use serial_test::serial;

    #[derive(Debug, Deserialize)]
    struct RootConfig {
        service: ServiceConfig,
    }

    #[derive(Debug, Deserialize)]
    struct ServiceConfig {
        service_name: String,
        batch_size: usize,
    }

    #[test]
    #[serial]
    fn test_env_overrides_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r#"
                service:
                    service_name: "encoder"
                    batch_size: 100
                "#,
            )?;
            jail.set_env("TEST_SERVICE__BATCH_SIZE", 7);
            let config: RootConfig =
                load_from_path("config.yaml", "TEST_").expect("config should load");
            assert_eq!(config.service.service_name, "encoder");
            assert_eq!(config.service.batch_size, 7);
            Ok(())
        });
    }

    #[test]
    #[serial]
    fn test_missing_fields_are_reported() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                r#"
                service:
                    service_name: "encoder"
                "#,
            )?;
            let err = load_from_path::<RootConfig>("config.yaml", "TEST_")
                .expect_err("batch_size is required");
            assert_eq!(err.code(), ErrorCodes::InvalidArgument);
            Ok(())
        });
    }
}
